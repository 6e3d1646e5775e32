use std::sync::Arc;

use log::warn;

use crate::{
    error::Result,
    ql::{
        constructors::{
            columns::{default_column_constructors, ColumnConstructor},
            default_constructors, EntityConstructor,
        },
        executor::{self, instructions::default_instructions, Instruction, InstructionResult},
        modifiers::{default_modifiers, ColumnModifier},
        parser::{ParsedInstruction, Parser},
        registry::NamedRegistry,
        types::{default_types, EntityType},
    },
    server::{
        security::{AccessToken, PermissionCheck, TokenPermissionCheck},
        Server,
    },
};

/// Everything the language knows by name. Filled once at startup, read-only afterwards
#[derive(Clone)]
pub struct Registries {
    pub types: NamedRegistry<Arc<dyn EntityType>>,
    pub constructors: NamedRegistry<Arc<dyn EntityConstructor>>,
    pub instructions: NamedRegistry<Arc<dyn Instruction>>,
    pub modifiers: NamedRegistry<Arc<dyn ColumnModifier>>,
    pub columns: NamedRegistry<Arc<dyn ColumnConstructor>>,
}

impl Registries {
    /// Registries holding all the built-in types, constructors, instructions and modifiers
    pub fn with_defaults() -> Result<Self> {
        let types = default_types()?;
        let instructions = default_instructions(&types)?;
        Ok(Self {
            types,
            constructors: default_constructors()?,
            instructions,
            modifiers: default_modifiers()?,
            columns: default_column_constructors()?,
        })
    }
}

/// Instruction language engine
pub struct Engine {
    registries: Registries,
    permissions: Arc<dyn PermissionCheck>,
}

impl Engine {
    pub fn new(registries: Registries) -> Self {
        Self {
            registries,
            permissions: Arc::new(TokenPermissionCheck),
        }
    }

    /// Replaces the check deciding which tokens may run which instructions
    pub fn with_permission_check(mut self, permissions: Arc<dyn PermissionCheck>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn parse(&self, text: &str) -> Result<ParsedInstruction> {
        Parser::new(&self.registries, text).parse()
    }

    /// Starts a session of a client holding `token` against `server`
    pub fn session<'a>(&'a self, server: &'a mut dyn Server, token: AccessToken) -> Session<'a> {
        Session {
            engine: self,
            server,
            token,
        }
    }
}

/// A client's session executing instructions one at a time
pub struct Session<'a> {
    engine: &'a Engine,
    server: &'a mut dyn Server,
    token: AccessToken,
}

impl Session<'_> {
    /// Executes an instruction. Failures are reported through the result's error status
    pub fn execute(&mut self, text: &str) -> InstructionResult {
        let mut result = InstructionResult::new();
        if let Err(err) = self.run_into(text, &mut result) {
            warn!("Instruction failed: {}", err);
            result.fail(err);
        }
        result
    }

    /// Executes an instruction, returning failures as errors
    pub fn run(&mut self, text: &str) -> Result<InstructionResult> {
        let mut result = InstructionResult::new();
        self.run_into(text, &mut result)?;
        Ok(result)
    }

    fn run_into(&mut self, text: &str, result: &mut InstructionResult) -> Result<()> {
        let parsed = self.engine.parse(text)?;
        executor::execute(
            parsed.instruction.as_ref(),
            &parsed.arguments,
            &mut *self.server,
            &self.token,
            self.engine.permissions.as_ref(),
            result,
        )
    }
}
