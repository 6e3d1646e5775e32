pub mod arguments;
pub mod constructors;
pub mod engine;
pub mod executor;
pub mod modifiers;
pub mod parser;
pub mod registry;
pub mod schema;
pub mod types;
