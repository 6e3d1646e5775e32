//! Column constructors: named column presets bundling a type with a fixed set of modifiers

use std::sync::Arc;

use crate::{
    error::Result,
    ql::{
        arguments::Arguments,
        modifiers::ColumnModifier,
        registry::{Named, NamedRegistry},
        schema::Column,
        types::INT,
    },
};

pub trait ColumnConstructor: Named + Send + Sync {
    /// Type of the constructed columns
    fn type_name(&self) -> &str;

    /// Modifiers attached, without arguments, to every constructed column
    fn modifiers(&self) -> &[&'static str];

    /// Builds a column named `column_name`, resolving the modifiers in `registry`
    fn construct(
        &self,
        column_name: &str,
        registry: &NamedRegistry<Arc<dyn ColumnModifier>>,
    ) -> Result<Column> {
        let mut column = Column::new(column_name, self.type_name());
        for name in self.modifiers() {
            let message = format!(
                "column constructor '{}' needs the modifier '{}', but it is not registered",
                self.name(),
                name
            );
            let modifier = registry.get_or_throw(name, &message)?.clone();
            column = column.with_modifier(modifier, Arguments::new());
        }
        Ok(column)
    }
}

/// A unique, positive, never changing int assigned on insert
pub struct IdColumnConstructor;

impl IdColumnConstructor {
    const MODIFIERS: &'static [&'static str] = &[
        "require unique",
        "incrementing",
        "require positive",
        "require constant",
    ];
}

impl Named for IdColumnConstructor {
    fn name(&self) -> &str {
        "id"
    }
}

impl ColumnConstructor for IdColumnConstructor {
    fn type_name(&self) -> &str {
        INT
    }

    fn modifiers(&self) -> &[&'static str] {
        Self::MODIFIERS
    }
}

/// Registry of all the built-in column constructors
pub fn default_column_constructors() -> Result<NamedRegistry<Arc<dyn ColumnConstructor>>> {
    let mut columns: NamedRegistry<Arc<dyn ColumnConstructor>> =
        NamedRegistry::new("column constructor");
    columns.add(Arc::new(IdColumnConstructor))?;
    Ok(columns)
}
