use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Server settings, read from a TOML file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub port: u16,
    /// Permissions granted to every token, like `table.read` or `server.*`
    pub default_token_permissions: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Quark Server".to_string(),
            port: 10000,
            default_token_permissions: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be in 1..=65535".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::Config("server name is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::ServerConfig;
    use crate::error::{Error, Result};

    #[test]
    fn test_defaults() -> Result<()> {
        assert_eq!(ServerConfig::from_toml_str("")?, ServerConfig::default());

        let config = ServerConfig::from_toml_str("port = 8080")?;
        assert_eq!(config.port, 8080);
        assert_eq!(config.name, "Quark Server");
        Ok(())
    }

    #[test]
    fn test_invalid_port() {
        assert!(matches!(ServerConfig::from_toml_str("port = 0"), Err(Error::Config(_))));
        assert!(matches!(ServerConfig::from_toml_str("port = 70000"), Err(Error::Config(_))));
        assert!(matches!(ServerConfig::from_toml_str("port = \"x\""), Err(Error::Config(_))));
    }

    #[test]
    fn test_load() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            "name = \"Test\"\nport = 4000\ndefault_token_permissions = [\"table.read\"]"
        )?;

        let config = ServerConfig::load(file.path())?;
        assert_eq!(
            config,
            ServerConfig {
                name: "Test".to_string(),
                port: 4000,
                default_token_permissions: vec!["table.read".to_string()],
            }
        );

        assert!(matches!(
            ServerConfig::load(file.path().with_extension("missing")),
            Err(Error::Config(_))
        ));
        Ok(())
    }
}
