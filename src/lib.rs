//! QuarkDB - the instruction language engine of a small database server
//!
//! This crate provides:
//! - QL lexing and parsing (character and token driven state machines)
//! - Typed entities, entity constructors and name registries with suggestions
//! - Column modifiers validating and preparing records
//! - Permission-checked instruction execution with a uniform result channel

pub mod config;
pub mod error;
pub mod ql;
pub mod server;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use ql::engine::{Engine, Registries, Session};
