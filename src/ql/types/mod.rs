use std::{
    cmp::Ordering,
    fmt::Display,
    hash::{Hash, Hasher},
    sync::Arc,
};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::{
    error::{Error, Result},
    ql::registry::{Named, NamedRegistry},
};

pub mod escape;

pub const INT: &str = "int";
pub const LONG: &str = "long";
pub const FLOAT: &str = "float";
pub const BOOL: &str = "bool";
pub const STR: &str = "str";
pub const DATE: &str = "date";
/// Placeholder accepted by parameters and modifiers that take any type
pub const ANY: &str = "?";

/// An immutable typed value flowing through the query language
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Int(i32),
    Long(i64),
    /// Always finite
    Float(f32),
    Bool(bool),
    Str(String),
    /// Millisecond precision
    Date(DateTime<Utc>),
}

impl Entity {
    /// Creates a date entity, dropping precision below milliseconds
    pub fn date(value: DateTime<Utc>) -> Self {
        Self::Date(value.trunc_subsecs(3))
    }

    /// Returns the tag of the entity's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => INT,
            Self::Long(_) => LONG,
            Self::Float(_) => FLOAT,
            Self::Bool(_) => BOOL,
            Self::Str(_) => STR,
            Self::Date(_) => DATE,
        }
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        type_name == ANY || self.type_name() == type_name
    }

    /// Canonical text that the entity's type parses back into an equal entity
    pub fn to_instruction_form(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Long(v) => v.to_string(),
            // Plain decimal digits with a fractional part, so the lexer reads it back as a float
            Self::Float(v) => {
                let text = v.to_string();
                if text.contains('.') {
                    text
                } else {
                    format!("{}.0", text)
                }
            }
            Self::Bool(v) => v.to_string(),
            Self::Str(v) => escape::quoted(v),
            Self::Date(v) => v.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Canonical text used inside record lines
    pub fn to_record_form(&self) -> String {
        self.to_instruction_form()
    }

    /// Orders two entities of the same variant
    pub fn raw_compare(&self, other: &Entity) -> Result<Ordering> {
        Ok(match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Long(a), Self::Long(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (a, b) => {
                return Err(Error::TypeMismatch {
                    left: a.type_name().to_string(),
                    right: b.type_name().to_string(),
                });
            }
        })
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Widens int entities too
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v as i64),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of int, long and float entities
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Long(v) => Some(*v as f64),
            Self::Float(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl Eq for Entity {}

/// Hashes per primitive kind: the variant first, then the value.
/// Floats hash their bit pattern with -0.0 folded into 0.0, dates their epoch milliseconds.
impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Int(v) => v.hash(state),
            Self::Long(v) => v.hash(state),
            Self::Float(v) => {
                let v = if *v == 0.0 { 0.0f32 } else { *v };
                v.to_bits().hash(state)
            }
            Self::Bool(v) => v.hash(state),
            Self::Str(v) => v.hash(state),
            Self::Date(v) => v.timestamp_millis().hash(state),
        }
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(v) => write!(f, "{}", v),
            other => write!(f, "{}", other.to_instruction_form()),
        }
    }
}

/// A value type: turns literal text into entities of one variant
pub trait EntityType: Named + Send + Sync {
    fn make_entity(&self, text: &str) -> Result<Entity>;

    /// Serializes an entity of this type back into instruction text
    fn to_instruction_form(&self, entity: &Entity) -> Result<String> {
        if !entity.has_type(self.name()) {
            return Err(Error::TypeMismatch {
                left: self.name().to_string(),
                right: entity.type_name().to_string(),
            });
        }
        Ok(entity.to_instruction_form())
    }
}

fn conversion_error(type_name: &str, text: &str) -> Error {
    Error::TypeConversion {
        type_name: type_name.to_string(),
        text: text.to_string(),
    }
}

pub struct IntType;

impl Named for IntType {
    fn name(&self) -> &str {
        INT
    }
}

impl EntityType for IntType {
    fn make_entity(&self, text: &str) -> Result<Entity> {
        text.trim()
            .parse()
            .map(Entity::Int)
            .map_err(|_| conversion_error(INT, text))
    }
}

pub struct LongType;

impl Named for LongType {
    fn name(&self) -> &str {
        LONG
    }
}

impl EntityType for LongType {
    fn make_entity(&self, text: &str) -> Result<Entity> {
        text.trim()
            .parse()
            .map(Entity::Long)
            .map_err(|_| conversion_error(LONG, text))
    }
}

pub struct FloatType;

impl Named for FloatType {
    fn name(&self) -> &str {
        FLOAT
    }
}

impl EntityType for FloatType {
    fn make_entity(&self, text: &str) -> Result<Entity> {
        match text.trim().parse::<f32>() {
            Ok(v) if v.is_finite() => Ok(Entity::Float(v)),
            _ => Err(conversion_error(FLOAT, text)),
        }
    }
}

pub struct BoolType;

impl Named for BoolType {
    fn name(&self) -> &str {
        BOOL
    }
}

impl EntityType for BoolType {
    fn make_entity(&self, text: &str) -> Result<Entity> {
        match text.trim() {
            "true" => Ok(Entity::Bool(true)),
            "false" => Ok(Entity::Bool(false)),
            _ => Err(conversion_error(BOOL, text)),
        }
    }
}

/// Strings are written quoted, with quotes, escapes and delimiters escaped
pub struct StrType;

impl Named for StrType {
    fn name(&self) -> &str {
        STR
    }
}

impl EntityType for StrType {
    fn make_entity(&self, text: &str) -> Result<Entity> {
        escape::unquoted(text.trim())
            .map(Entity::Str)
            .ok_or_else(|| conversion_error(STR, text))
    }
}

/// Dates are written in RFC 3339
pub struct DateType;

impl Named for DateType {
    fn name(&self) -> &str {
        DATE
    }
}

impl EntityType for DateType {
    fn make_entity(&self, text: &str) -> Result<Entity> {
        DateTime::parse_from_rfc3339(text.trim())
            .map(|date| Entity::date(date.with_timezone(&Utc)))
            .map_err(|_| conversion_error(DATE, text))
    }
}

/// Registry of all the types the language understands
pub fn default_types() -> Result<NamedRegistry<Arc<dyn EntityType>>> {
    let mut types: NamedRegistry<Arc<dyn EntityType>> = NamedRegistry::new("type");
    types.add(Arc::new(IntType))?;
    types.add(Arc::new(LongType))?;
    types.add(Arc::new(FloatType))?;
    types.add(Arc::new(BoolType))?;
    types.add(Arc::new(StrType))?;
    types.add(Arc::new(DateType))?;
    Ok(types)
}
