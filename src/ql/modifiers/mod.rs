//! Column modifiers: named, priority-ordered validation and preparation rules attached to table columns

use std::{cmp::Ordering, sync::Arc};

use regex::Regex;

use crate::{
    error::{Error, Result},
    ql::{
        arguments::{Arguments, Parameter},
        constructors::full_match_regex,
        registry::{Named, NamedRegistry},
        schema::{RecordField, Table},
        types::{Entity, ANY, FLOAT, INT, LONG, STR},
    },
};

/// Order in which the modifiers of a column are applied, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModifierPriority {
    Low,
    Default,
    High,
    /// Reserved for modifiers producing the field value, so the others validate the produced one
    Highest,
}

pub trait ColumnModifier: Named + Send + Sync {
    fn priority(&self) -> ModifierPriority;

    /// Type tags of the columns this modifier can be attached to
    fn supported_types(&self) -> &[&'static str];

    fn parameters(&self) -> &[Parameter] {
        &[]
    }

    /// Whether the modifier is written with a constructor-style argument list
    fn requires_arguments(&self) -> bool {
        self.parameters().iter().any(|p| p.required)
    }

    /// A producing modifier prepares the field before its validity is checked
    fn produces_value(&self) -> bool {
        false
    }

    /// Schema-definition time check of the modifier's arguments
    fn validate_arguments(&self, _arguments: &Arguments) -> Result<()> {
        Ok(())
    }

    fn supports(&self, type_name: &str) -> bool {
        self.supported_types()
            .iter()
            .any(|t| *t == ANY || *t == type_name)
    }

    fn is_field_valid(&self, table: &Table, field: &RecordField, arguments: &Arguments) -> bool;

    fn prepare_field(&self, _table: &Table, _field: &mut RecordField, _arguments: &Arguments) {}
}

const NUMBERS: &[&str] = &[INT, LONG, FLOAT];

/// No two records share the field value
pub struct RequireUniqueModifier;

impl Named for RequireUniqueModifier {
    fn name(&self) -> &str {
        "require unique"
    }
}

impl ColumnModifier for RequireUniqueModifier {
    fn priority(&self) -> ModifierPriority {
        ModifierPriority::High
    }

    fn supported_types(&self) -> &[&'static str] {
        &[ANY]
    }

    fn is_field_valid(&self, table: &Table, field: &RecordField, _arguments: &Arguments) -> bool {
        !table
            .records()
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != field.record)
            .any(|(_, record)| record.get(field.column) == Some(&field.entity))
    }
}

/// The field is strictly greater than zero
pub struct RequirePositiveModifier;

impl Named for RequirePositiveModifier {
    fn name(&self) -> &str {
        "require positive"
    }
}

impl ColumnModifier for RequirePositiveModifier {
    fn priority(&self) -> ModifierPriority {
        ModifierPriority::High
    }

    fn supported_types(&self) -> &[&'static str] {
        NUMBERS
    }

    fn is_field_valid(&self, _table: &Table, field: &RecordField, _arguments: &Arguments) -> bool {
        field.entity.as_number().is_some_and(|v| v > 0.0)
    }
}

/// The field is strictly less than zero
pub struct RequireNegativeModifier;

impl Named for RequireNegativeModifier {
    fn name(&self) -> &str {
        "require negative"
    }
}

impl ColumnModifier for RequireNegativeModifier {
    fn priority(&self) -> ModifierPriority {
        ModifierPriority::High
    }

    fn supported_types(&self) -> &[&'static str] {
        NUMBERS
    }

    fn is_field_valid(&self, _table: &Table, field: &RecordField, _arguments: &Arguments) -> bool {
        field.entity.as_number().is_some_and(|v| v < 0.0)
    }
}

/// The whole string matches the `regex` argument
pub struct RegexModifier;

impl RegexModifier {
    const PARAMETERS: &'static [Parameter] = &[Parameter::required("regex", &[STR])];

    fn regex(arguments: &Arguments) -> Result<Regex> {
        let expression = arguments.get_str("regex")?;
        full_match_regex(expression).map_err(|err| {
            Error::InstructionArgument(format!("'{}' is not a valid regex: {}", expression, err))
        })
    }
}

impl Named for RegexModifier {
    fn name(&self) -> &str {
        "regex"
    }
}

impl ColumnModifier for RegexModifier {
    fn priority(&self) -> ModifierPriority {
        ModifierPriority::High
    }

    fn supported_types(&self) -> &[&'static str] {
        &[STR]
    }

    fn parameters(&self) -> &[Parameter] {
        Self::PARAMETERS
    }

    fn validate_arguments(&self, arguments: &Arguments) -> Result<()> {
        Self::regex(arguments).map(|_| ())
    }

    fn is_field_valid(&self, _table: &Table, field: &RecordField, arguments: &Arguments) -> bool {
        match (Self::regex(arguments), field.entity.as_str()) {
            (Ok(regex), Some(value)) => regex.is_match(value),
            _ => false,
        }
    }
}

/// Numbers within the optional `min` and `max` bounds, both inclusive
pub struct RangeModifier;

impl RangeModifier {
    const PARAMETERS: &'static [Parameter] = &[
        Parameter::optional("min", NUMBERS),
        Parameter::optional("max", NUMBERS),
    ];

    /// Integers compare exactly, anything involving a float compares as `f64`
    fn compare(value: &Entity, bound: &Entity) -> Option<Ordering> {
        match (value.as_long(), bound.as_long()) {
            (Some(value), Some(bound)) => Some(value.cmp(&bound)),
            _ => value.as_number()?.partial_cmp(&bound.as_number()?),
        }
    }
}

impl Named for RangeModifier {
    fn name(&self) -> &str {
        "range"
    }
}

impl ColumnModifier for RangeModifier {
    fn priority(&self) -> ModifierPriority {
        ModifierPriority::Default
    }

    fn supported_types(&self) -> &[&'static str] {
        NUMBERS
    }

    fn parameters(&self) -> &[Parameter] {
        Self::PARAMETERS
    }

    fn validate_arguments(&self, arguments: &Arguments) -> Result<()> {
        if let (Some(min), Some(max)) = (arguments.get("min"), arguments.get("max")) {
            if Self::compare(min, max) == Some(Ordering::Greater) {
                return Err(Error::InstructionArgument(format!(
                    "range minimum {} is greater than its maximum {}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    fn is_field_valid(&self, _table: &Table, field: &RecordField, arguments: &Arguments) -> bool {
        let above_min = arguments.get("min").is_none_or(|min| {
            Self::compare(&field.entity, min).is_some_and(|o| o != Ordering::Less)
        });
        let below_max = arguments.get("max").is_none_or(|max| {
            Self::compare(&field.entity, max).is_some_and(|o| o != Ordering::Greater)
        });
        above_min && below_max
    }
}

/// The field never changes once the record is inserted
pub struct RequireConstantModifier;

impl Named for RequireConstantModifier {
    fn name(&self) -> &str {
        "require constant"
    }
}

impl ColumnModifier for RequireConstantModifier {
    fn priority(&self) -> ModifierPriority {
        ModifierPriority::Default
    }

    fn supported_types(&self) -> &[&'static str] {
        &[ANY]
    }

    fn is_field_valid(&self, _table: &Table, field: &RecordField, _arguments: &Arguments) -> bool {
        field.previous.as_ref().is_none_or(|previous| previous == &field.entity)
    }
}

/// Assigns the next value of the column on insert: one more than the greatest stored value.
/// An insert is rejected once the column type has no next value.
pub struct IncrementingModifier;

impl IncrementingModifier {
    fn next_value(table: &Table, field: &RecordField) -> Option<Entity> {
        let last = table
            .records()
            .iter()
            .filter_map(|record| record.get(field.column).and_then(Entity::as_long))
            .max()
            .unwrap_or(0);
        let next = last.checked_add(1)?;
        match field.entity {
            Entity::Int(_) => i32::try_from(next).ok().map(Entity::Int),
            Entity::Long(_) => Some(Entity::Long(next)),
            _ => None,
        }
    }
}

impl Named for IncrementingModifier {
    fn name(&self) -> &str {
        "incrementing"
    }
}

impl ColumnModifier for IncrementingModifier {
    fn priority(&self) -> ModifierPriority {
        ModifierPriority::Highest
    }

    fn supported_types(&self) -> &[&'static str] {
        &[INT, LONG]
    }

    fn produces_value(&self) -> bool {
        true
    }

    fn is_field_valid(&self, table: &Table, field: &RecordField, _arguments: &Arguments) -> bool {
        match field.previous {
            Some(_) => field.entity.as_long().is_some(),
            None => Self::next_value(table, field).as_ref() == Some(&field.entity),
        }
    }

    fn prepare_field(&self, table: &Table, field: &mut RecordField, _arguments: &Arguments) {
        if field.previous.is_some() {
            return;
        }
        if let Some(next) = Self::next_value(table, field) {
            field.entity = next;
        }
    }
}

/// Registry of all the built-in column modifiers
pub fn default_modifiers() -> Result<NamedRegistry<Arc<dyn ColumnModifier>>> {
    let mut modifiers: NamedRegistry<Arc<dyn ColumnModifier>> = NamedRegistry::new("modifier");
    modifiers.add(Arc::new(IncrementingModifier))?;
    modifiers.add(Arc::new(RequireUniqueModifier))?;
    modifiers.add(Arc::new(RequirePositiveModifier))?;
    modifiers.add(Arc::new(RequireNegativeModifier))?;
    modifiers.add(Arc::new(RegexModifier))?;
    modifiers.add(Arc::new(RangeModifier))?;
    modifiers.add(Arc::new(RequireConstantModifier))?;
    Ok(modifiers)
}

#[cfg(test)]
mod tests {
    use super::{default_modifiers, ModifierPriority};
    use crate::{
        error::Result,
        ql::{
            arguments::Arguments,
            schema::{Column, RecordField, Table},
            types::Entity,
        },
    };

    fn field(entity: Entity) -> RecordField {
        RecordField {
            column: 0,
            entity,
            record: None,
            previous: None,
        }
    }

    fn table() -> Result<Table> {
        Table::new("numbers", vec![Column::new("value", "int")])
    }

    #[test]
    fn test_priorities() -> Result<()> {
        let modifiers = default_modifiers()?;
        assert!(ModifierPriority::Highest > ModifierPriority::High);
        assert!(ModifierPriority::High > ModifierPriority::Default);
        assert_eq!(modifiers.get("incrementing")?.priority(), ModifierPriority::Highest);
        assert_eq!(modifiers.get("require unique")?.priority(), ModifierPriority::High);
        assert_eq!(modifiers.get("range")?.priority(), ModifierPriority::Default);
        Ok(())
    }

    #[test]
    fn test_sign_modifiers() -> Result<()> {
        let modifiers = default_modifiers()?;
        let table = table()?;
        let none = Arguments::new();

        let positive = modifiers.get("require positive")?;
        assert!(positive.is_field_valid(&table, &field(Entity::Int(1)), &none));
        assert!(!positive.is_field_valid(&table, &field(Entity::Int(0)), &none));
        assert!(positive.is_field_valid(&table, &field(Entity::Float(0.5)), &none));

        let negative = modifiers.get("require negative")?;
        assert!(negative.is_field_valid(&table, &field(Entity::Long(-3)), &none));
        assert!(!negative.is_field_valid(&table, &field(Entity::Int(3)), &none));
        assert!(!negative.supports("str"));
        Ok(())
    }

    #[test]
    fn test_regex_modifier() -> Result<()> {
        let modifiers = default_modifiers()?;
        let table = table()?;
        let regex = modifiers.get("regex")?;
        assert!(regex.requires_arguments());

        let args = Arguments::new().with("regex", Entity::Str("[a-z]+@[a-z]+".into()))?;
        regex.validate_arguments(&args)?;
        assert!(regex.is_field_valid(&table, &field(Entity::Str("me@home".into())), &args));
        assert!(!regex.is_field_valid(&table, &field(Entity::Str("me at home".into())), &args));

        let broken = Arguments::new().with("regex", Entity::Str("[".into()))?;
        assert!(regex.validate_arguments(&broken).is_err());
        Ok(())
    }

    #[test]
    fn test_range_modifier() -> Result<()> {
        let modifiers = default_modifiers()?;
        let table = table()?;
        let range = modifiers.get("range")?;
        assert!(!range.requires_arguments());

        let args = Arguments::new()
            .with("min", Entity::Int(1))?
            .with("max", Entity::Float(10.0))?;
        assert!(range.is_field_valid(&table, &field(Entity::Int(1)), &args));
        assert!(range.is_field_valid(&table, &field(Entity::Int(10)), &args));
        assert!(!range.is_field_valid(&table, &field(Entity::Int(11)), &args));

        // Above 2^53 the bound only holds when compared as integers
        let long_max = Arguments::new().with("max", Entity::Long(9_007_199_254_740_992))?;
        assert!(range.is_field_valid(&table, &field(Entity::Long(9_007_199_254_740_992)), &long_max));
        assert!(!range.is_field_valid(&table, &field(Entity::Long(9_007_199_254_740_993)), &long_max));
        assert!(!range.is_field_valid(&table, &field(Entity::Str("1".into())), &args));

        let upside_down = Arguments::new()
            .with("min", Entity::Int(5))?
            .with("max", Entity::Int(1))?;
        assert!(range.validate_arguments(&upside_down).is_err());
        Ok(())
    }

    #[test]
    fn test_constant_modifier() -> Result<()> {
        let modifiers = default_modifiers()?;
        let table = table()?;
        let constant = modifiers.get("require constant")?;
        let none = Arguments::new();

        let mut changed = field(Entity::Int(2));
        changed.previous = Some(Entity::Int(1));
        assert!(!constant.is_field_valid(&table, &changed, &none));

        let mut kept = field(Entity::Int(1));
        kept.previous = Some(Entity::Int(1));
        assert!(constant.is_field_valid(&table, &kept, &none));
        assert!(constant.is_field_valid(&table, &field(Entity::Int(5)), &none));
        Ok(())
    }
}
