use log::info;

use crate::{
    config::ServerConfig,
    error::{Error, Result},
    ql::{registry::NamedRegistry, schema::Table},
    server::{security::AccessToken, Server},
};

/// In-memory server: tables live as long as the server does
pub struct MemoryServer {
    config: ServerConfig,
    tables: NamedRegistry<Table>,
}

impl MemoryServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            tables: NamedRegistry::new("table"),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Token granting the permissions every client gets by default
    pub fn default_token(&self, token: impl Into<String>) -> AccessToken {
        AccessToken::new(token, self.config.default_token_permissions.clone())
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl Server for MemoryServer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn port(&self) -> u16 {
        self.config.port
    }

    fn change_port(&mut self, port: u16) -> Result<()> {
        if port == 0 {
            return Err(Error::InstructionArgument(
                "port 0 cannot be listened to".to_string(),
            ));
        }
        info!("Server {} moves from port {} to {}", self.config.name, self.config.port, port);
        self.config.port = port;
        Ok(())
    }

    fn create_table(&mut self, table: Table) -> Result<()> {
        self.tables.add(table)
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name)
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables.get_mut(name)
    }
}
