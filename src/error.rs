use std::fmt::Display;

use thiserror::Error as ThisError;

/// Custom Result type for QuarkDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for QuarkDB
///
/// Every failure of a single instruction ends up in one of these variants and is
/// reported back through the result recorder, never by crashing the engine.
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum Error {
    /// A character the current lexer state cannot accept
    #[error("syntax error {0}")]
    LexingSyntax(SyntaxError),
    /// A token the current parser state cannot accept
    #[error("syntax error {0}")]
    ParsingSyntax(SyntaxError),
    /// Literal text is not valid for the type it was given to
    #[error("'{text}' cannot be converted to {type_name}")]
    TypeConversion { type_name: String, text: String },
    /// Two entities of different variants were compared
    #[error("cannot compare {left} with {right}")]
    TypeMismatch { left: String, right: String },
    /// A name is missing from a registry. `message` replaces the default description
    #[error("{}{}", not_found(.kind, .name, .message), did_you_mean(.suggestion))]
    NotFound {
        kind: String,
        name: String,
        suggestion: Option<String>,
        message: Option<String>,
    },
    /// A registry already holds an object with this name
    #[error("{kind} '{name}' is already registered")]
    DuplicateName { kind: String, name: String },
    /// Missing required parameter, unknown parameter or a badly typed argument
    #[error("argument error: {0}")]
    InstructionArgument(String),
    /// The caller's token lacks the permission the instruction requires
    #[error("permission '{permission}' is required to run '{instruction}'")]
    PermissionDenied {
        instruction: String,
        permission: String,
    },
    /// A field failed the validity predicate of a column modifier
    #[error(
        "A table modifier {modifier} checked the validity of a record {record} in the table {table}, but the validation failed."
    )]
    ColumnModifierValidityCheckFailed {
        modifier: String,
        record: String,
        table: String,
    },
    /// A modifier was attached to a column of a type it does not support
    #[error("column modifier '{modifier}' cannot be applied to column '{column}' of type {type_name}")]
    IncompatibleColumnModifier {
        modifier: String,
        column: String,
        type_name: String,
    },
    /// The computation of an entity constructor failed
    #[error("constructor '{constructor}' failed on argument '{argument}': {reason}")]
    ConstructorEvaluation {
        constructor: String,
        argument: String,
        reason: String,
    },
    /// Invalid configuration
    #[error("config error {0}")]
    Config(String),
    /// Internal error (broken invariants, misuse of the result recorder, etc.)
    #[error("internal error {0}")]
    Internal(String),
}

fn not_found(kind: &str, name: &str, message: &Option<String>) -> String {
    match message {
        Some(message) => message.clone(),
        None => format!("{} '{}' does not exist", kind, name),
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(". Did you mean '{}'?", name),
        None => String::new(),
    }
}

impl Error {
    /// Returns the syntax error details if this is a lexing or parsing error
    pub fn syntax(&self) -> Option<&SyntaxError> {
        match self {
            Error::LexingSyntax(err) | Error::ParsingSyntax(err) => Some(err),
            _ => None,
        }
    }
}

/// Position-accurate description of a malformed instruction
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub instruction: String,
    pub message: String,
    pub hint: String,
    /// Character offset of the offending span
    pub offset: usize,
    /// Length of the offending span in characters
    pub length: usize,
}

impl SyntaxError {
    pub fn new(
        instruction: &str,
        message: impl Into<String>,
        hint: impl Into<String>,
        offset: usize,
        length: usize,
    ) -> Self {
        Self {
            instruction: instruction.to_string(),
            message: message.into(),
            hint: hint.into(),
            offset,
            length,
        }
    }
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "at {}: {}", self.offset, self.message)?;
        writeln!(f, "    {}", self.instruction)?;
        writeln!(
            f,
            "    {}{}",
            " ".repeat(self.offset),
            "^".repeat(self.length.max(1))
        )?;
        write!(f, "hint: {}", self.hint)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Config(value.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Error::Config(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, SyntaxError};

    #[test]
    fn test_not_found_message_carries_suggestion() {
        let err = Error::NotFound {
            kind: "instruction".to_string(),
            name: "get srver name".to_string(),
            suggestion: Some("get server name".to_string()),
            message: None,
        };
        assert_eq!(
            err.to_string(),
            "instruction 'get srver name' does not exist. Did you mean 'get server name'?"
        );

        let err = Error::NotFound {
            kind: "type".to_string(),
            name: "integer".to_string(),
            suggestion: None,
            message: Some("column 'id' has an unknown type".to_string()),
        };
        assert_eq!(err.to_string(), "column 'id' has an unknown type");
    }

    #[test]
    fn test_syntax_error_points_at_span() {
        let err = SyntaxError::new("eval = ;", "A value expected, but a semicolon met", "Put a value", 7, 1);
        let rendered = err.to_string();
        assert!(rendered.contains("    eval = ;\n           ^\n"));
        assert!(rendered.ends_with("hint: Put a value"));
    }
}
