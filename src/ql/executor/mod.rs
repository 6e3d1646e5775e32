//! Instruction execution: argument validation, permission checks and the result recorder

use log::{info, warn};

use crate::{
    error::{Error, Result},
    ql::{
        arguments::{self, Arguments, Parameter},
        registry::Named,
    },
    server::{
        security::{AccessToken, PermissionCheck, TokenPermission},
        Server,
    },
};

pub mod instructions;

/// A named, permission-gated server command
pub trait Instruction: Named + Send + Sync {
    fn description(&self) -> &str;

    fn permission(&self) -> TokenPermission;

    fn parameters(&self) -> &[Parameter];

    /// The parameter bound by an `=` written right after the instruction name
    fn general_parameter(&self) -> Option<&Parameter> {
        self.parameters().iter().find(|p| p.general)
    }

    /// Runs the instruction. Arguments are already validated against [`Instruction::parameters`]
    fn action(
        &self,
        arguments: &Arguments,
        server: &mut dyn Server,
        result: &mut InstructionResult,
    ) -> Result<()>;

    /// Usage line, e.g. `select from = <str> [limit = <int>];`
    fn syntax(&self) -> String {
        let mut syntax = self.name().to_string();
        for parameter in self.parameters() {
            let usage = if parameter.general {
                format!(" = <{}>", parameter.types_description())
            } else {
                format!(" {} = <{}>", parameter.name, parameter.types_description())
            };
            if parameter.required {
                syntax.push_str(&usage);
            } else {
                syntax.push_str(&format!(" [{}]", usage.trim_start()));
            }
        }
        syntax.push(';');
        syntax
    }
}

/// Terminal outcome of an instruction
#[derive(Debug, Clone, PartialEq)]
pub enum ResultStatus {
    Ok(String),
    Error(Error),
}

/// Records what an instruction produced: a header, rows and a terminal status
///
/// Header and rows may be written until the status is set. The status is set once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionResult {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    status: Option<ResultStatus>,
}

impl InstructionResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.status {
            Some(_) => Err(Error::Internal(
                "the instruction result is already finalized".to_string(),
            )),
            None => Ok(()),
        }
    }

    pub fn set_header(&mut self, columns: Vec<String>) -> Result<()> {
        self.ensure_open()?;
        self.header = columns;
        Ok(())
    }

    pub fn add_row(&mut self, row: Vec<String>) -> Result<()> {
        self.ensure_open()?;
        if row.len() != self.header.len() {
            return Err(Error::Internal(format!(
                "row has {} values, but the header has {} columns",
                row.len(),
                self.header.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Finalizes the result as a success
    pub fn ok(&mut self, message: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.status = Some(ResultStatus::Ok(message.into()));
        Ok(())
    }

    /// Finalizes the result as a failure
    pub fn error(&mut self, error: Error) -> Result<()> {
        self.ensure_open()?;
        self.fail(error);
        Ok(())
    }

    /// Replaces whatever was recorded with the failure
    pub(crate) fn fail(&mut self, error: Error) {
        self.header.clear();
        self.rows.clear();
        self.status = Some(ResultStatus::Error(error));
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn status(&self) -> Option<&ResultStatus> {
        self.status.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, Some(ResultStatus::Ok(_)))
    }

    pub fn error_cause(&self) -> Option<&Error> {
        match &self.status {
            Some(ResultStatus::Error(err)) => Some(err),
            _ => None,
        }
    }

    /// Human readable status message
    pub fn message(&self) -> String {
        match &self.status {
            Some(ResultStatus::Ok(message)) => message.clone(),
            Some(ResultStatus::Error(err)) => err.to_string(),
            None => String::new(),
        }
    }
}

/// Validates the arguments, checks the permission and runs the instruction.
/// The action never runs when any check fails
pub fn execute(
    instruction: &dyn Instruction,
    arguments: &Arguments,
    server: &mut dyn Server,
    token: &AccessToken,
    permissions: &dyn PermissionCheck,
    result: &mut InstructionResult,
) -> Result<()> {
    arguments::validate(instruction.name(), instruction.parameters(), arguments)?;

    if !permissions.has_permission(token, instruction) {
        warn!(
            "Token {} tried to run '{}' without permission",
            token.token(),
            instruction.name()
        );
        return Err(Error::PermissionDenied {
            instruction: instruction.name().to_string(),
            permission: instruction.permission().to_string(),
        });
    }

    info!("Running '{}'", instruction.name());
    instruction.action(arguments, server, result)?;
    if result.status().is_none() {
        result.ok(format!("'{}' completed", instruction.name()))?;
    }
    info!("'{}' finished: {}", instruction.name(), result.message());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{InstructionResult, ResultStatus};
    use crate::error::{Error, Result};

    #[test]
    fn test_status_is_set_once() -> Result<()> {
        let mut result = InstructionResult::new();
        result.set_header(vec!["a".to_string()])?;
        result.add_row(vec!["1".to_string()])?;
        assert!(result.add_row(vec![]).is_err());
        result.ok("done")?;

        assert!(result.ok("again").is_err());
        assert!(result.add_row(vec!["2".to_string()]).is_err());
        assert_eq!(result.status(), Some(&ResultStatus::Ok("done".to_string())));
        assert_eq!(result.rows().len(), 1);
        Ok(())
    }

    #[test]
    fn test_failure_discards_rows() -> Result<()> {
        let mut result = InstructionResult::new();
        result.set_header(vec!["a".to_string()])?;
        result.add_row(vec!["1".to_string()])?;
        result.error(Error::Internal("boom".to_string()))?;

        assert!(!result.is_ok());
        assert!(result.header().is_empty() && result.rows().is_empty());
        assert_eq!(result.error_cause(), Some(&Error::Internal("boom".to_string())));
        assert_eq!(result.message(), "internal error boom");
        Ok(())
    }
}
