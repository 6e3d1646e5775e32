use std::sync::Arc;

use crate::{
    error::{Error, Result},
    ql::{
        arguments::{self, Arguments},
        modifiers::ColumnModifier,
        registry::{Named, NamedRegistry},
        types::{
            escape::{DELIMITER, ESCAPE, QUOTE},
            Entity, EntityType,
        },
    },
};

/// Table schema definition plus its records
#[derive(Clone)]
pub struct Table {
    name: String,
    columns: NamedRegistry<Column>,
    records: Vec<Record>,
}

impl Named for Table {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Table {
    /// Creates an empty table, validating the schema: at least one column, unique
    /// column names and every modifier compatible with its column.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        if columns.is_empty() {
            return Err(Error::Internal(format!("table {} has no columns", name)));
        }

        let mut registry = NamedRegistry::new("column");
        for mut column in columns {
            column.validate()?;
            // Stable sort keeps the declaration order within one priority
            column
                .modifiers
                .sort_by(|a, b| b.modifier.priority().cmp(&a.modifier.priority()));
            registry.add(column)?;
        }

        Ok(Self {
            name,
            columns: registry,
            records: Vec::new(),
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.names().map(str::to_string).collect()
    }

    /// Returns the column with this name, suggesting the closest one if it does not exist
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns.get(name)
    }

    /// Returns the column index for a given column name
    pub fn get_col_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| self.columns.not_found(name))
    }

    /// Returns the type tag and the modifiers (in application order) of a column
    pub fn schema_of(&self, name: &str) -> Result<(&str, &[AppliedModifier])> {
        let column = self.column(name)?;
        Ok((&column.type_name, &column.modifiers))
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Inserts a record after all the column modifiers accepted it
    pub fn insert(&mut self, record: Record) -> Result<()> {
        let fields = self.fields_of(record, None)?;
        let record = self.apply_modifiers(fields)?;
        self.records.push(record);
        Ok(())
    }

    /// Replaces the record at `index` after all the column modifiers accepted the new one
    pub fn update(&mut self, index: usize, record: Record) -> Result<()> {
        if index >= self.records.len() {
            return Err(Error::Internal(format!(
                "table {} has no record {}",
                self.name, index
            )));
        }
        let fields = self.fields_of(record, Some(index))?;
        let record = self.apply_modifiers(fields)?;
        self.records[index] = record;
        Ok(())
    }

    fn fields_of(&self, record: Record, index: Option<usize>) -> Result<Vec<RecordField>> {
        if record.len() != self.columns.len() {
            return Err(Error::Internal(format!(
                "record {} has {} fields, but table {} has {} columns",
                record.to_line(),
                record.len(),
                self.name,
                self.columns.len()
            )));
        }

        let previous = index.map(|i| &self.records[i]);
        let mut fields = Vec::with_capacity(record.len());
        for (column_index, (column, entity)) in self.columns.iter().zip(record.entities).enumerate() {
            if !entity.has_type(&column.type_name) {
                return Err(Error::TypeMismatch {
                    left: column.type_name.clone(),
                    right: entity.type_name().to_string(),
                });
            }
            fields.push(RecordField {
                column: column_index,
                entity,
                record: index,
                previous: previous.and_then(|r| r.get(column_index)).cloned(),
            });
        }
        Ok(fields)
    }

    /// Runs the modifier pipeline on a working copy of the record. Either every modifier of
    /// every column passes and all preparations land in the returned record, or nothing does.
    fn apply_modifiers(&self, mut fields: Vec<RecordField>) -> Result<Record> {
        for (index, column) in self.columns.iter().enumerate() {
            for applied in &column.modifiers {
                let modifier = &applied.modifier;
                if modifier.produces_value() {
                    modifier.prepare_field(self, &mut fields[index], &applied.arguments);
                }
                if !modifier.is_field_valid(self, &fields[index], &applied.arguments) {
                    log::warn!(
                        "Modifier '{}' rejected field '{}' of table {}",
                        modifier.name(),
                        column.name,
                        self.name
                    );
                    return Err(Error::ColumnModifierValidityCheckFailed {
                        modifier: modifier.name().to_string(),
                        record: Record::from_fields(&fields).to_line(),
                        table: self.name.clone(),
                    });
                }
            }
        }

        for (index, column) in self.columns.iter().enumerate() {
            for applied in column.modifiers.iter().filter(|a| !a.modifier.produces_value()) {
                applied
                    .modifier
                    .prepare_field(self, &mut fields[index], &applied.arguments);
            }
        }
        Ok(Record::from_fields(&fields))
    }
}

/// Column schema definition
#[derive(Clone)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    modifiers: Vec<AppliedModifier>,
}

impl Named for Column {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            modifiers: Vec::new(),
        }
    }

    /// Attaches a modifier. Compatibility is checked when the table is created
    pub fn with_modifier(mut self, modifier: Arc<dyn ColumnModifier>, arguments: Arguments) -> Self {
        self.modifiers.push(AppliedModifier {
            modifier,
            arguments,
        });
        self
    }

    /// Modifiers in application order
    pub fn modifiers(&self) -> &[AppliedModifier] {
        &self.modifiers
    }

    fn validate(&self) -> Result<()> {
        for applied in &self.modifiers {
            let modifier = &applied.modifier;
            if !modifier.supports(&self.type_name) {
                return Err(Error::IncompatibleColumnModifier {
                    modifier: modifier.name().to_string(),
                    column: self.name.clone(),
                    type_name: self.type_name.clone(),
                });
            }
            arguments::validate(modifier.name(), modifier.parameters(), &applied.arguments)?;
            modifier.validate_arguments(&applied.arguments)?;
        }
        Ok(())
    }
}

/// A modifier attached to a column together with its arguments
#[derive(Clone)]
pub struct AppliedModifier {
    pub modifier: Arc<dyn ColumnModifier>,
    pub arguments: Arguments,
}

/// One field of a record going through the modifier pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    /// Index of the field's column
    pub column: usize,
    pub entity: Entity,
    /// Index of the record being updated, None on insert
    pub record: Option<usize>,
    /// Value before the update, None on insert
    pub previous: Option<Entity>,
}

/// A table row
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entities: Vec<Entity>,
}

impl Record {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    fn from_fields(fields: &[RecordField]) -> Self {
        Self::new(fields.iter().map(|f| f.entity.clone()).collect())
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Record text format: the fields' record forms joined by the delimiter
    pub fn to_line(&self) -> String {
        self.entities
            .iter()
            .map(Entity::to_record_form)
            .collect::<Vec<_>>()
            .join(&format!("{} ", DELIMITER))
    }

    /// Parses a record line, giving each field to the type of its column
    pub fn parse_line(
        line: &str,
        table: &Table,
        types: &NamedRegistry<Arc<dyn EntityType>>,
    ) -> Result<Self> {
        let fields = split_fields(line)?;
        if fields.len() != table.columns.len() {
            return Err(Error::InstructionArgument(format!(
                "record {} has {} fields, but table {} has {} columns",
                line,
                fields.len(),
                table.name,
                table.columns.len()
            )));
        }

        let mut entities = Vec::with_capacity(fields.len());
        for (column, field) in table.columns().zip(fields) {
            let message = format!("column {} has an unknown type {}", column.name, column.type_name);
            entities.push(types.get_or_throw(&column.type_name, &message)?.make_entity(&field)?);
        }
        Ok(Self::new(entities))
    }
}

/// Splits a record line on the delimiters that are neither escaped nor quoted.
/// The fields keep their quotes and escapes.
fn split_fields(line: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE => {
                current.push(c);
                match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => {
                        return Err(Error::InstructionArgument(format!(
                            "record {} ends with an escape character",
                            line
                        )));
                    }
                }
            }
            QUOTE => {
                quoted = !quoted;
                current.push(c);
            }
            DELIMITER if !quoted => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if quoted {
        return Err(Error::InstructionArgument(format!(
            "record {} has an unclosed quote",
            line
        )));
    }
    fields.push(current.trim().to_string());
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{split_fields, Column, Record, Table};
    use crate::{
        error::{Error, Result},
        ql::{
            arguments::Arguments,
            modifiers::{default_modifiers, ColumnModifier, ModifierPriority, RequireUniqueModifier},
            registry::Named,
            schema::RecordField,
            types::{default_types, Entity},
        },
    };

    fn users() -> Result<Table> {
        let modifiers = default_modifiers()?;
        Table::new(
            "users",
            vec![
                Column::new("id", "int")
                    .with_modifier(modifiers.get("require unique")?.clone(), Arguments::new())
                    .with_modifier(modifiers.get("incrementing")?.clone(), Arguments::new())
                    .with_modifier(modifiers.get("require constant")?.clone(), Arguments::new()),
                Column::new("name", "str"),
                Column::new("age", "int").with_modifier(
                    modifiers.get("range")?.clone(),
                    Arguments::new()
                        .with("min", Entity::Int(0))?
                        .with("max", Entity::Int(150))?,
                ),
            ],
        )
    }

    fn user(id: i32, name: &str, age: i32) -> Record {
        Record::new(vec![
            Entity::Int(id),
            Entity::Str(name.to_string()),
            Entity::Int(age),
        ])
    }

    #[test]
    fn test_schema_of() -> Result<()> {
        let table = users()?;
        let (type_name, modifiers) = table.schema_of("id")?;
        assert_eq!(type_name, "int");
        assert_eq!(
            modifiers.iter().map(|m| m.modifier.name()).collect::<Vec<_>>(),
            vec!["incrementing", "require unique", "require constant"]
        );
        assert_eq!(table.get_col_index("age")?, 2);
        assert!(matches!(
            table.schema_of("nmae"),
            Err(Error::NotFound { suggestion: Some(s), .. }) if s == "name"
        ));
        Ok(())
    }

    #[test]
    fn test_incompatible_modifier() -> Result<()> {
        let modifiers = default_modifiers()?;
        let result = Table::new(
            "t",
            vec![Column::new("name", "str")
                .with_modifier(modifiers.get("require positive")?.clone(), Arguments::new())],
        );
        assert!(matches!(
            result,
            Err(Error::IncompatibleColumnModifier { modifier, column, type_name })
                if modifier == "require positive" && column == "name" && type_name == "str"
        ));

        let missing_regex = Table::new(
            "t",
            vec![Column::new("name", "str")
                .with_modifier(modifiers.get("regex")?.clone(), Arguments::new())],
        );
        assert!(matches!(missing_regex, Err(Error::InstructionArgument(_))));

        let duplicate = Table::new("t", vec![Column::new("a", "int"), Column::new("a", "str")]);
        assert!(matches!(duplicate, Err(Error::DuplicateName { .. })));
        Ok(())
    }

    #[test]
    fn test_insert_runs_modifiers() -> Result<()> {
        let mut table = users()?;
        table.insert(user(0, "alice", 30))?;
        table.insert(user(0, "bob", 40))?;

        // Incrementing assigned the ids before uniqueness was checked
        assert_eq!(table.records()[0], user(1, "alice", 30));
        assert_eq!(table.records()[1], user(2, "bob", 40));

        assert_eq!(
            table.insert(user(0, "carol", 200)),
            Err(Error::ColumnModifierValidityCheckFailed {
                modifier: "range".to_string(),
                record: r#"3, "carol", 200"#.to_string(),
                table: "users".to_string(),
            })
        );
        assert_eq!(table.records().len(), 2);
        Ok(())
    }

    #[test]
    fn test_incrementing_rejects_overflow() -> Result<()> {
        let modifiers = default_modifiers()?;
        let mut table = Table::new(
            "counters",
            vec![Column::new("id", "int")
                .with_modifier(modifiers.get("incrementing")?.clone(), Arguments::new())],
        )?;
        table.insert(Record::new(vec![Entity::Int(0)]))?;
        table.update(0, Record::new(vec![Entity::Int(i32::MAX)]))?;

        assert_eq!(
            table.insert(Record::new(vec![Entity::Int(5)])),
            Err(Error::ColumnModifierValidityCheckFailed {
                modifier: "incrementing".to_string(),
                record: "5".to_string(),
                table: "counters".to_string(),
            })
        );
        assert_eq!(table.records(), &[Record::new(vec![Entity::Int(i32::MAX)])]);
        Ok(())
    }

    #[test]
    fn test_update_keeps_constant_fields() -> Result<()> {
        let mut table = users()?;
        table.insert(user(0, "alice", 30))?;
        table.update(0, user(1, "alice", 31))?;
        assert_eq!(table.records()[0], user(1, "alice", 31));

        assert!(matches!(
            table.update(0, user(7, "alice", 31)),
            Err(Error::ColumnModifierValidityCheckFailed { modifier, .. }) if modifier == "require constant"
        ));
        assert_eq!(table.records()[0], user(1, "alice", 31));
        Ok(())
    }

    #[test]
    fn test_insert_type_mismatch() -> Result<()> {
        let mut table = users()?;
        let record = Record::new(vec![Entity::Int(1), Entity::Int(2), Entity::Int(3)]);
        assert_eq!(
            table.insert(record),
            Err(Error::TypeMismatch {
                left: "str".to_string(),
                right: "int".to_string()
            })
        );
        Ok(())
    }

    /// Unique values, marking every accepted field by upper-casing it
    struct ShoutingUniqueModifier;

    impl Named for ShoutingUniqueModifier {
        fn name(&self) -> &str {
            "shouting unique"
        }
    }

    impl ColumnModifier for ShoutingUniqueModifier {
        fn priority(&self) -> ModifierPriority {
            ModifierPriority::High
        }

        fn supported_types(&self) -> &[&'static str] {
            &["str"]
        }

        fn is_field_valid(&self, table: &Table, field: &RecordField, arguments: &Arguments) -> bool {
            RequireUniqueModifier.is_field_valid(table, field, arguments)
        }

        fn prepare_field(&self, _table: &Table, field: &mut RecordField, _arguments: &Arguments) {
            if let Entity::Str(value) = &field.entity {
                field.entity = Entity::Str(value.to_uppercase());
            }
        }
    }

    #[test]
    fn test_failed_insert_commits_no_preparation() -> Result<()> {
        let modifiers = default_modifiers()?;
        let mut table = Table::new(
            "codes",
            vec![
                Column::new("code", "str").with_modifier(Arc::new(ShoutingUniqueModifier), Arguments::new()),
                Column::new("amount", "int").with_modifier(
                    modifiers.get("range")?.clone(),
                    Arguments::new().with("max", Entity::Int(10))?,
                ),
            ],
        )?;

        table.insert(Record::new(vec![Entity::Str("ab".into()), Entity::Int(1)]))?;
        assert_eq!(table.records()[0].get(0), Some(&Entity::Str("AB".into())));

        // Unique passes, range fails: nothing of the record lands in the table
        let result = table.insert(Record::new(vec![Entity::Str("cd".into()), Entity::Int(11)]));
        assert!(matches!(
            result,
            Err(Error::ColumnModifierValidityCheckFailed { modifier, .. }) if modifier == "range"
        ));
        assert_eq!(table.records().len(), 1);
        Ok(())
    }

    #[test]
    fn test_record_line() -> Result<()> {
        let types = default_types()?;
        let table = users()?;

        let record = user(1, "doe, \"john\"", 42);
        let line = record.to_line();
        assert_eq!(line, r#"1, "doe\, \"john\"", 42"#);
        assert_eq!(Record::parse_line(&line, &table, &types)?, record);

        assert_eq!(
            split_fields(r#" 1 ,"a,b", 2"#)?,
            vec!["1".to_string(), r#""a,b""#.to_string(), "2".to_string()]
        );
        assert!(Record::parse_line("1, \"x\"", &table, &types).is_err());
        assert!(Record::parse_line("1, \"x, 2", &table, &types).is_err());
        Ok(())
    }

    #[test]
    fn test_record_line_with_unknown_column_type() -> Result<()> {
        let types = default_types()?;
        let table = Table::new("scores", vec![Column::new("score", "integer")])?;
        assert_eq!(
            Record::parse_line("7", &table, &types),
            Err(Error::NotFound {
                kind: "type".to_string(),
                name: "integer".to_string(),
                suggestion: Some("int".to_string()),
                message: Some("column score has an unknown type integer".to_string()),
            })
        );
        Ok(())
    }
}
