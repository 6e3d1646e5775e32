//! Declared parameters and bound arguments shared by constructors, modifiers and instructions

use crate::{
    error::{Error, Result},
    ql::{registry::Named, types::Entity},
};

/// A declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    /// Accepted type tags, `?` accepts anything
    pub types: &'static [&'static str],
    pub required: bool,
    /// The general parameter is bound by an `=` written right after the instruction name
    pub general: bool,
}

impl Parameter {
    pub const fn required(name: &'static str, types: &'static [&'static str]) -> Self {
        Self {
            name,
            types,
            required: true,
            general: false,
        }
    }

    pub const fn optional(name: &'static str, types: &'static [&'static str]) -> Self {
        Self {
            name,
            types,
            required: false,
            general: false,
        }
    }

    /// Required parameter bound right after the instruction name
    pub const fn general(name: &'static str, types: &'static [&'static str]) -> Self {
        Self {
            name,
            types,
            required: true,
            general: true,
        }
    }

    pub fn accepts(&self, entity: &Entity) -> bool {
        self.types.iter().any(|t| entity.has_type(t))
    }

    /// Human readable list of accepted types: "int or float"
    pub fn types_description(&self) -> String {
        self.types.join(" or ")
    }
}

impl Named for Parameter {
    fn name(&self) -> &str {
        self.name
    }
}

/// Returns the declared parameter with this name
pub fn find_parameter<'a>(parameters: &'a [Parameter], name: &str) -> Option<&'a Parameter> {
    parameters.iter().find(|p| p.name == name)
}

/// Checks bound arguments against a declared parameter list: no unknown names,
/// every argument of an accepted type and every required parameter present.
pub fn validate(owner: &str, parameters: &[Parameter], arguments: &Arguments) -> Result<()> {
    for (name, entity) in arguments.iter() {
        let parameter = find_parameter(parameters, name).ok_or_else(|| {
            Error::InstructionArgument(format!("'{}' has no parameter '{}'", owner, name))
        })?;
        check_type(owner, parameter, entity)?;
    }

    for parameter in parameters.iter().filter(|p| p.required) {
        if !arguments.has(parameter.name) {
            return Err(Error::InstructionArgument(format!(
                "parameter '{}' of '{}' is required, but missing",
                parameter.name, owner
            )));
        }
    }
    Ok(())
}

/// Checks that an entity is acceptable for a parameter
pub fn check_type(owner: &str, parameter: &Parameter, entity: &Entity) -> Result<()> {
    if parameter.accepts(entity) {
        return Ok(());
    }
    Err(Error::InstructionArgument(format!(
        "parameter '{}' of '{}' expects {}, but {} was given",
        parameter.name,
        owner,
        parameter.types_description(),
        entity.type_name()
    )))
}

/// Ordered mapping from parameter names to bound entities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<(String, Entity)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an argument. Binding the same name twice is an error
    pub fn add(&mut self, name: impl Into<String>, entity: Entity) -> Result<()> {
        let name = name.into();
        if self.has(&name) {
            return Err(Error::InstructionArgument(format!(
                "argument '{}' is given twice",
                name
            )));
        }
        self.values.push((name, entity));
        Ok(())
    }

    /// Builder-style [`Arguments::add`]
    pub fn with(mut self, name: impl Into<String>, entity: Entity) -> Result<Self> {
        self.add(name, entity)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entity)| entity)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entity)> {
        self.values.iter().map(|(n, e)| (n.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a required argument
    pub fn require(&self, name: &str) -> Result<&Entity> {
        self.get(name).ok_or_else(|| {
            Error::InstructionArgument(format!("argument '{}' is missing", name))
        })
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        let entity = self.require(name)?;
        entity.as_str().ok_or_else(|| mistyped(name, "str", entity))
    }

    pub fn get_int(&self, name: &str) -> Result<i32> {
        let entity = self.require(name)?;
        entity.as_int().ok_or_else(|| mistyped(name, "int", entity))
    }
}

fn mistyped(name: &str, expected: &str, entity: &Entity) -> Error {
    Error::InstructionArgument(format!(
        "argument '{}' should be {}, not {}",
        name,
        expected,
        entity.type_name()
    ))
}
