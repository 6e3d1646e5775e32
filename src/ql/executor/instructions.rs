use std::sync::Arc;

use crate::{
    error::{Error, Result},
    ql::{
        arguments::{Arguments, Parameter},
        executor::{Instruction, InstructionResult},
        registry::{Named, NamedRegistry},
        schema::Record,
        types::{EntityType, ANY, INT, STR},
    },
    server::{security::TokenPermission, Server},
};

pub struct GetServerNameInstruction;

impl Named for GetServerNameInstruction {
    fn name(&self) -> &str {
        "get server name"
    }
}

impl Instruction for GetServerNameInstruction {
    fn description(&self) -> &str {
        "Returns the name of the server"
    }

    fn permission(&self) -> TokenPermission {
        TokenPermission::AllowedForAll
    }

    fn parameters(&self) -> &[Parameter] {
        &[]
    }

    fn action(
        &self,
        _arguments: &Arguments,
        server: &mut dyn Server,
        result: &mut InstructionResult,
    ) -> Result<()> {
        result.set_header(vec!["server name".to_string()])?;
        result.add_row(vec![server.name().to_string()])?;
        result.ok("Server name was returned")
    }
}

pub struct ChangePortToInstruction;

impl ChangePortToInstruction {
    const PARAMETERS: &'static [Parameter] = &[Parameter::general("port", &[INT])];
}

impl Named for ChangePortToInstruction {
    fn name(&self) -> &str {
        "change port to"
    }
}

impl Instruction for ChangePortToInstruction {
    fn description(&self) -> &str {
        "Moves the server to another port"
    }

    fn permission(&self) -> TokenPermission {
        TokenPermission::Required("server.port.change")
    }

    fn parameters(&self) -> &[Parameter] {
        Self::PARAMETERS
    }

    fn action(
        &self,
        arguments: &Arguments,
        server: &mut dyn Server,
        result: &mut InstructionResult,
    ) -> Result<()> {
        let port = arguments.get_int("port")?;
        let port = u16::try_from(port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| {
                Error::InstructionArgument(format!("port {} is not in 1..=65535", port))
            })?;
        server.change_port(port)?;
        result.ok(format!("Server port was changed to {}", port))
    }
}

/// Evaluates a value, most useful with constructors: `eval = month;`
pub struct EvalInstruction;

impl EvalInstruction {
    const PARAMETERS: &'static [Parameter] = &[Parameter::general("object", &[ANY])];
}

impl Named for EvalInstruction {
    fn name(&self) -> &str {
        "eval"
    }
}

impl Instruction for EvalInstruction {
    fn description(&self) -> &str {
        "Returns the type and the value of an entity"
    }

    fn permission(&self) -> TokenPermission {
        TokenPermission::Required("server.eval")
    }

    fn parameters(&self) -> &[Parameter] {
        Self::PARAMETERS
    }

    fn action(
        &self,
        arguments: &Arguments,
        _server: &mut dyn Server,
        result: &mut InstructionResult,
    ) -> Result<()> {
        let object = arguments.require("object")?;
        result.set_header(vec!["type".to_string(), "value".to_string()])?;
        result.add_row(vec![
            object.type_name().to_string(),
            object.to_instruction_form(),
        ])?;
        result.ok("Evaluated")
    }
}

pub struct SelectFromInstruction;

impl SelectFromInstruction {
    const PARAMETERS: &'static [Parameter] = &[
        Parameter::general("table", &[STR]),
        Parameter::optional("limit", &[INT]),
    ];
}

impl Named for SelectFromInstruction {
    fn name(&self) -> &str {
        "select from"
    }
}

impl Instruction for SelectFromInstruction {
    fn description(&self) -> &str {
        "Returns the records of a table"
    }

    fn permission(&self) -> TokenPermission {
        TokenPermission::Required("table.read")
    }

    fn parameters(&self) -> &[Parameter] {
        Self::PARAMETERS
    }

    fn action(
        &self,
        arguments: &Arguments,
        server: &mut dyn Server,
        result: &mut InstructionResult,
    ) -> Result<()> {
        let table = server.table(arguments.get_str("table")?)?;
        let limit = match arguments.get("limit") {
            Some(_) => {
                let limit = arguments.get_int("limit")?;
                usize::try_from(limit).map_err(|_| {
                    Error::InstructionArgument(format!("limit {} is negative", limit))
                })?
            }
            None => usize::MAX,
        };

        result.set_header(table.column_names())?;
        let mut selected = 0;
        for record in table.records().iter().take(limit) {
            result.add_row(record.entities().iter().map(|e| e.to_record_form()).collect())?;
            selected += 1;
        }
        result.ok(format!("{} records selected", selected))
    }
}

/// Inserts one record, written in the record text format
pub struct InsertIntoInstruction {
    types: NamedRegistry<Arc<dyn EntityType>>,
}

impl InsertIntoInstruction {
    const PARAMETERS: &'static [Parameter] = &[
        Parameter::general("table", &[STR]),
        Parameter::required("record", &[STR]),
    ];

    pub fn new(types: NamedRegistry<Arc<dyn EntityType>>) -> Self {
        Self { types }
    }
}

impl Named for InsertIntoInstruction {
    fn name(&self) -> &str {
        "insert into"
    }
}

impl Instruction for InsertIntoInstruction {
    fn description(&self) -> &str {
        "Inserts a record into a table"
    }

    fn permission(&self) -> TokenPermission {
        TokenPermission::Required("table.write")
    }

    fn parameters(&self) -> &[Parameter] {
        Self::PARAMETERS
    }

    fn action(
        &self,
        arguments: &Arguments,
        server: &mut dyn Server,
        result: &mut InstructionResult,
    ) -> Result<()> {
        let table = server.table_mut(arguments.get_str("table")?)?;
        let record = Record::parse_line(arguments.get_str("record")?, table, &self.types)?;
        table.insert(record)?;
        result.ok(format!("Record was inserted into {}", table.name()))
    }
}

/// Registry of all the built-in instructions
pub fn default_instructions(
    types: &NamedRegistry<Arc<dyn EntityType>>,
) -> Result<NamedRegistry<Arc<dyn Instruction>>> {
    let mut instructions: NamedRegistry<Arc<dyn Instruction>> = NamedRegistry::new("instruction");
    instructions.add(Arc::new(GetServerNameInstruction))?;
    instructions.add(Arc::new(ChangePortToInstruction))?;
    instructions.add(Arc::new(EvalInstruction))?;
    instructions.add(Arc::new(SelectFromInstruction))?;
    instructions.add(Arc::new(InsertIntoInstruction::new(types.clone())))?;
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::default_instructions;
    use crate::{
        error::{Error, Result},
        ql::{
            arguments::Arguments,
            executor::InstructionResult,
            schema::{Column, Table},
            types::{default_types, Entity},
        },
        server::{memory::MemoryServer, Server},
    };

    fn run(name: &str, arguments: Arguments, server: &mut MemoryServer) -> Result<InstructionResult> {
        let types = default_types()?;
        let instructions = default_instructions(&types)?;
        let mut result = InstructionResult::new();
        instructions.get(name)?.action(&arguments, server, &mut result)?;
        Ok(result)
    }

    #[test]
    fn test_syntax() -> Result<()> {
        let instructions = default_instructions(&default_types()?)?;
        assert_eq!(
            instructions.get("select from")?.syntax(),
            "select from = <str> [limit = <int>];"
        );
        assert_eq!(
            instructions.get("insert into")?.syntax(),
            "insert into = <str> record = <str>;"
        );
        Ok(())
    }

    #[test]
    fn test_change_port_range() -> Result<()> {
        let mut server = MemoryServer::default();
        let result = run("change port to", Arguments::new().with("port", Entity::Int(8080))?, &mut server)?;
        assert!(result.is_ok());
        assert_eq!(server.port(), 8080);

        for port in [0, -1, 65536] {
            let arguments = Arguments::new().with("port", Entity::Int(port))?;
            assert!(matches!(
                run("change port to", arguments, &mut server),
                Err(Error::InstructionArgument(_))
            ));
        }
        assert_eq!(server.port(), 8080);
        Ok(())
    }

    #[test]
    fn test_insert_and_select() -> Result<()> {
        let mut server = MemoryServer::default();
        server.create_table(Table::new(
            "users",
            vec![Column::new("id", "int"), Column::new("name", "str")],
        )?)?;

        for line in [r#"1, "alice""#, r#"2, "bob, jr.""#] {
            let arguments = Arguments::new()
                .with("table", Entity::Str("users".into()))?
                .with("record", Entity::Str(line.into()))?;
            run("insert into", arguments, &mut server)?;
        }

        let arguments = Arguments::new()
            .with("table", Entity::Str("users".into()))?
            .with("limit", Entity::Int(5))?;
        let result = run("select from", arguments, &mut server)?;
        assert_eq!(result.header(), &["id".to_string(), "name".to_string()]);
        assert_eq!(
            result.rows(),
            &[
                vec!["1".to_string(), r#""alice""#.to_string()],
                vec!["2".to_string(), r#""bob\, jr.""#.to_string()],
            ]
        );
        assert_eq!(result.message(), "2 records selected");
        Ok(())
    }
}
