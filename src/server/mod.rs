use crate::{error::Result, ql::schema::Table};

pub mod memory;
pub mod security;

/// Server state the instructions act on
///
/// Can be backed by memory, by tables persisted on disk or by a remote node.
pub trait Server {
    fn name(&self) -> &str;

    fn port(&self) -> u16;
    fn change_port(&mut self, port: u16) -> Result<()>;

    fn create_table(&mut self, table: Table) -> Result<()>;
    /// Returns the table, or a not found error suggesting the closest table name
    fn table(&self, name: &str) -> Result<&Table>;
    fn table_mut(&mut self, name: &str) -> Result<&mut Table>;
}
