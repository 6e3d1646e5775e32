//! Entity constructors: named pure functions computing an entity from arguments,
//! usable as nested literals (`eval = date from format date format = "%Y" formatted date = "2020";`).

use std::sync::Arc;

use chrono::{format::ParseErrorKind, DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;

use crate::{
    error::{Error, Result},
    ql::{
        arguments::{self, Arguments, Parameter},
        registry::{Named, NamedRegistry},
        types::{Entity, BOOL, DATE, LONG, STR},
    },
};

pub mod columns;

/// What a constructor returns
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnDescription {
    pub description: &'static str,
    pub type_name: &'static str,
}

pub const fn returns(description: &'static str, type_name: &'static str) -> ReturnDescription {
    ReturnDescription {
        description,
        type_name,
    }
}

pub trait EntityConstructor: Named + Send + Sync {
    fn returns(&self) -> &ReturnDescription;

    fn parameters(&self) -> &[Parameter];

    /// Computes the entity. Arguments are already validated against [`EntityConstructor::parameters`]
    fn invoke(&self, arguments: &Arguments) -> Result<Entity>;

    /// Usage line, e.g. `matches string to check = <str> regex expression = <str>`
    fn syntax(&self) -> String {
        let mut syntax = self.name().to_string();
        for parameter in self.parameters() {
            let usage = format!("{} = <{}>", parameter.name, parameter.types_description());
            if parameter.required {
                syntax.push_str(&format!(" {}", usage));
            } else {
                syntax.push_str(&format!(" [{}]", usage));
            }
        }
        syntax
    }
}

/// Validates the arguments against the constructor's parameters, then invokes it
pub fn evaluate(constructor: &dyn EntityConstructor, arguments: &Arguments) -> Result<Entity> {
    arguments::validate(constructor.name(), constructor.parameters(), arguments)?;
    constructor.invoke(arguments)
}

fn evaluation_error(constructor: &str, argument: &str, reason: impl ToString) -> Error {
    Error::ConstructorEvaluation {
        constructor: constructor.to_string(),
        argument: argument.to_string(),
        reason: reason.to_string(),
    }
}

/// A constant number of milliseconds in a time unit
pub struct TimeUnitConstructor {
    name: &'static str,
    milliseconds: i64,
    returns: ReturnDescription,
}

impl TimeUnitConstructor {
    pub const fn new(name: &'static str, milliseconds: i64, description: &'static str) -> Self {
        Self {
            name,
            milliseconds,
            returns: returns(description, LONG),
        }
    }
}

impl Named for TimeUnitConstructor {
    fn name(&self) -> &str {
        self.name
    }
}

impl EntityConstructor for TimeUnitConstructor {
    fn returns(&self) -> &ReturnDescription {
        &self.returns
    }

    fn parameters(&self) -> &[Parameter] {
        &[]
    }

    fn invoke(&self, _arguments: &Arguments) -> Result<Entity> {
        Ok(Entity::Long(self.milliseconds))
    }
}

const SECOND: i64 = 1000;
const MINUTE: i64 = SECOND * 60;
const HOUR: i64 = MINUTE * 60;
const DAY: i64 = HOUR * 24;

/// Tests whether the whole string matches a regular expression
pub struct MatchesConstructor;

impl MatchesConstructor {
    const RETURNS: ReturnDescription = returns("is the string matches regex", BOOL);
    const PARAMETERS: &'static [Parameter] = &[
        Parameter::required("string to check", &[STR]),
        Parameter::required("regex expression", &[STR]),
    ];
}

impl Named for MatchesConstructor {
    fn name(&self) -> &str {
        "matches"
    }
}

impl EntityConstructor for MatchesConstructor {
    fn returns(&self) -> &ReturnDescription {
        &Self::RETURNS
    }

    fn parameters(&self) -> &[Parameter] {
        Self::PARAMETERS
    }

    fn invoke(&self, arguments: &Arguments) -> Result<Entity> {
        let string = arguments.get_str("string to check")?;
        let expression = arguments.get_str("regex expression")?;
        let regex = full_match_regex(expression)
            .map_err(|err| evaluation_error(self.name(), "regex expression", err))?;
        Ok(Entity::Bool(regex.is_match(string)))
    }
}

/// Compiles a regex that has to match the whole input
pub fn full_match_regex(expression: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", expression))
}

/// Parses a date written in a strftime-like format
pub struct DateFromFormatConstructor;

impl DateFromFormatConstructor {
    const RETURNS: ReturnDescription = returns("the date from the format passed in", DATE);
    const PARAMETERS: &'static [Parameter] = &[
        Parameter::required("date format", &[STR]),
        Parameter::required("formatted date", &[STR]),
    ];
}

impl Named for DateFromFormatConstructor {
    fn name(&self) -> &str {
        "date from format"
    }
}

impl EntityConstructor for DateFromFormatConstructor {
    fn returns(&self) -> &ReturnDescription {
        &Self::RETURNS
    }

    fn parameters(&self) -> &[Parameter] {
        Self::PARAMETERS
    }

    fn invoke(&self, arguments: &Arguments) -> Result<Entity> {
        let format = arguments.get_str("date format")?;
        let text = arguments.get_str("formatted date")?;

        // Zoned first, then local date-time, then a bare date at midnight UTC
        if let Ok(date) = DateTime::parse_from_str(text, format) {
            return Ok(Entity::date(date.with_timezone(&Utc)));
        }
        if let Ok(date) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Entity::date(date.and_utc()));
        }
        match NaiveDate::parse_from_str(text, format) {
            Ok(date) => Ok(Entity::date(date.and_time(NaiveTime::MIN).and_utc())),
            Err(err) if err.kind() == ParseErrorKind::BadFormat => {
                Err(evaluation_error(self.name(), "date format", err))
            }
            Err(err) => Err(evaluation_error(self.name(), "formatted date", err)),
        }
    }
}

/// Registry of all the built-in constructors
pub fn default_constructors() -> Result<NamedRegistry<Arc<dyn EntityConstructor>>> {
    let mut constructors: NamedRegistry<Arc<dyn EntityConstructor>> =
        NamedRegistry::new("constructor");
    for unit in [
        TimeUnitConstructor::new("second", SECOND, "Milliseconds in 1 second"),
        TimeUnitConstructor::new("minute", MINUTE, "Milliseconds in 1 minute"),
        TimeUnitConstructor::new("hour", HOUR, "Milliseconds in 1 hour"),
        TimeUnitConstructor::new("day", DAY, "Milliseconds in 1 day"),
        TimeUnitConstructor::new("week", DAY * 7, "Milliseconds in 1 week"),
        TimeUnitConstructor::new("month", DAY * 30, "Milliseconds in 1 month"),
        TimeUnitConstructor::new("year", DAY * 365, "Milliseconds in 1 year"),
    ] {
        constructors.add(Arc::new(unit))?;
    }
    constructors.add(Arc::new(MatchesConstructor))?;
    constructors.add(Arc::new(DateFromFormatConstructor))?;
    Ok(constructors)
}
