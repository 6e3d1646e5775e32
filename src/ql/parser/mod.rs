//! Instruction parser: a token-driven state machine resolving the instruction and binding
//! its arguments, nested constructor calls included

use std::sync::Arc;

use log::debug;

use crate::{
    error::{Error, Result, SyntaxError},
    ql::{
        arguments::{find_parameter, Arguments, Parameter},
        constructors::{evaluate, EntityConstructor},
        engine::Registries,
        executor::Instruction,
        registry::{self, Named},
        types::Entity,
    },
};

pub mod lexer;

use lexer::{expectation, Lexer, Token, TokenKind};

/// A resolved instruction with its bound arguments
#[derive(Clone)]
pub struct ParsedInstruction {
    pub instruction: Arc<dyn Instruction>,
    pub arguments: Arguments,
}

impl std::fmt::Debug for ParsedInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedInstruction")
            .field("instruction", &self.instruction.name())
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// What a state did with the current token
#[derive(Debug, PartialEq)]
enum Step {
    Consumed,
    /// Feed the same token to the state below
    Replay,
}

enum ParserState {
    ExpectingInstructionName,
    /// Parameters of the instruction. `awaiting` is the argument whose value is being read
    ReadingInstructionArguments { awaiting: Option<String> },
    ReadingArgumentValue { argument: String, met_equals_sign: bool },
    /// Parameters of a nested constructor whose result is bound to `argument` of the enclosing scope
    ReadingConstructorArguments {
        constructor: Arc<dyn EntityConstructor>,
        argument: String,
        arguments: Arguments,
        awaiting: Option<String>,
    },
    Completed,
}

impl ParserState {
    fn describe(&self) -> &'static str {
        match self {
            ParserState::ExpectingInstructionName => "expecting the instruction name",
            ParserState::ReadingInstructionArguments { .. } => "reading instruction arguments",
            ParserState::ReadingArgumentValue { .. } => "reading an argument value",
            ParserState::ReadingConstructorArguments { .. } => "reading constructor arguments",
            ParserState::Completed => "completed",
        }
    }
}

/// Parser of a single instruction
///
/// Nesting is an explicit stack of states: a constructor call inside an argument value
/// pushes a state, its end pops it and replays the ending token into the state below.
pub struct Parser<'a> {
    registries: &'a Registries,
    text: &'a str,
    states: Vec<ParserState>,
    instruction: Option<Arc<dyn Instruction>>,
    arguments: Arguments,
}

impl<'a> Parser<'a> {
    pub fn new(registries: &'a Registries, text: &'a str) -> Self {
        Self {
            registries,
            text,
            states: vec![ParserState::ExpectingInstructionName],
            instruction: None,
            arguments: Arguments::new(),
        }
    }

    /// Lexes and parses the instruction text
    pub fn parse(self) -> Result<ParsedInstruction> {
        let tokens = Lexer::new(self.registries, self.text).lex()?;
        self.parse_tokens(&tokens)
    }

    pub fn parse_tokens(mut self, tokens: &[Token]) -> Result<ParsedInstruction> {
        let mut index = 0;
        while let Some(token) = tokens.get(index) {
            if self.handle(token)? == Step::Consumed {
                index += 1;
            }
        }

        match (self.states.last(), self.instruction) {
            (Some(ParserState::Completed), Some(instruction)) => Ok(ParsedInstruction {
                instruction,
                arguments: self.arguments,
            }),
            _ => {
                let length = self.text.chars().count();
                Err(Error::ParsingSyntax(SyntaxError::new(
                    self.text,
                    expectation("semicolon", "end of the instruction"),
                    "End the instruction with a semicolon",
                    length,
                    1,
                )))
            }
        }
    }

    fn error(&self, token: &Token, message: impl Into<String>, hint: impl Into<String>) -> Error {
        Error::ParsingSyntax(SyntaxError::new(
            self.text,
            message,
            hint,
            token.offset,
            token.length,
        ))
    }

    fn unexpected(&self, expected: &str, token: &Token) -> Error {
        self.error(
            token,
            expectation(expected, token.kind.describe()),
            "You probably missed something, need to remove something or put something in a bad order",
        )
    }

    fn push_state(&mut self, state: ParserState) {
        debug!("Parser enters state {}", state.describe());
        self.states.push(state);
    }

    fn pop_state(&mut self) -> Result<ParserState> {
        let state = self
            .states
            .pop()
            .ok_or_else(|| Error::Internal("parser state stack is empty".to_string()))?;
        debug!("Parser leaves state {}", state.describe());
        Ok(state)
    }

    fn replace_state(&mut self, state: ParserState) -> Result<()> {
        self.pop_state()?;
        self.push_state(state);
        Ok(())
    }

    fn instruction(&self) -> Result<&Arc<dyn Instruction>> {
        self.instruction
            .as_ref()
            .ok_or_else(|| Error::Internal("instruction is not resolved yet".to_string()))
    }

    fn handle(&mut self, token: &Token) -> Result<Step> {
        let Some(state) = self.states.pop() else {
            return Err(Error::Internal("parser state stack is empty".to_string()));
        };
        // States are taken off the stack while handling and put back unless they end
        match state {
            ParserState::ExpectingInstructionName => {
                self.states.push(state);
                self.expect_instruction_name(token)
            }
            ParserState::ReadingInstructionArguments { awaiting } => {
                self.states.push(ParserState::ReadingInstructionArguments { awaiting: None });
                self.read_instruction_arguments(token, awaiting)
            }
            ParserState::ReadingArgumentValue {
                argument,
                met_equals_sign,
            } => self.read_argument_value(token, argument, met_equals_sign),
            ParserState::ReadingConstructorArguments {
                constructor,
                argument,
                arguments,
                awaiting,
            } => self.read_constructor_arguments(token, constructor, argument, arguments, awaiting),
            ParserState::Completed => {
                self.states.push(state);
                Err(self.error(
                    token,
                    format!("Unexpected {} after the semicolon", token.kind.describe()),
                    "Remove everything after the semicolon",
                ))
            }
        }
    }

    fn expect_instruction_name(&mut self, token: &Token) -> Result<Step> {
        if token.kind != TokenKind::InstructionName {
            return Err(self.unexpected("instruction name", token));
        }
        let instruction = self.registries.instructions.get(&token.text)?.clone();
        debug!("Found instruction '{}', reading its arguments", instruction.name());
        self.instruction = Some(instruction);
        self.replace_state(ParserState::ReadingInstructionArguments { awaiting: None })?;
        Ok(Step::Consumed)
    }

    /// Errors on a token replayed into a scope that still waits for a value
    fn check_not_awaiting(&self, token: &Token, awaiting: &Option<String>) -> Result<()> {
        match awaiting {
            Some(argument) => Err(self.error(
                token,
                expectation("value", token.kind.describe()),
                format!("Give '{}' a value: {} = <value>", argument, argument),
            )),
            None => Ok(()),
        }
    }

    fn read_instruction_arguments(&mut self, token: &Token, awaiting: Option<String>) -> Result<Step> {
        self.check_not_awaiting(token, &awaiting)?;
        let instruction = self.instruction()?.clone();

        match &token.kind {
            TokenKind::EqualsSign => {
                let Some(general) = instruction.general_parameter() else {
                    return Err(self.error(
                        token,
                        expectation("parameter name", "equals sign"),
                        format!("'{}' has no general parameter, write: {}", instruction.name(), instruction.syntax()),
                    ));
                };
                debug!("Found an equals sign after the instruction name, reading the general parameter");
                self.await_value(general.name.to_string(), true)?;
                Ok(Step::Consumed)
            }
            TokenKind::ParameterName => {
                let parameter = self.declared(token, instruction.name(), instruction.parameters())?;
                self.await_value(parameter.name.to_string(), false)?;
                Ok(Step::Consumed)
            }
            TokenKind::Semicolon => {
                debug!("Semicolon found, the instruction is parsed");
                self.replace_state(ParserState::Completed)?;
                Ok(Step::Consumed)
            }
            _ => Err(self.unexpected("parameter name", token)),
        }
    }

    /// Marks the current scope as waiting for `argument` and starts reading its value
    fn await_value(&mut self, argument: String, met_equals_sign: bool) -> Result<()> {
        match self.states.last_mut() {
            Some(ParserState::ReadingInstructionArguments { awaiting })
            | Some(ParserState::ReadingConstructorArguments { awaiting, .. }) => {
                *awaiting = Some(argument.clone());
            }
            _ => return Err(Error::Internal("no scope to bind an argument to".to_string())),
        }
        self.push_state(ParserState::ReadingArgumentValue {
            argument,
            met_equals_sign,
        });
        Ok(())
    }

    /// Returns the declared parameter named by the token, suggesting the closest one otherwise
    fn declared<'p>(&self, token: &Token, owner: &str, parameters: &'p [Parameter]) -> Result<&'p Parameter> {
        if let Some(parameter) = find_parameter(parameters, &token.text) {
            return Ok(parameter);
        }
        let hint = match registry::suggest(parameters, &token.text) {
            Some(parameter) => format!("Did you mean '{}'?", parameter.name()),
            None => format!("'{}' has no parameters", owner),
        };
        Err(self.error(
            token,
            format!("'{}' has no parameter '{}'", owner, token.text),
            hint,
        ))
    }

    /// Whether a scope below the current one declares the parameter
    fn declared_by_enclosing_scope(&self, name: &str) -> Result<bool> {
        for state in self.states.iter().rev() {
            let parameters = match state {
                ParserState::ReadingConstructorArguments { constructor, .. } => constructor.parameters(),
                ParserState::ReadingInstructionArguments { .. } => self.instruction()?.parameters(),
                _ => continue,
            };
            if find_parameter(parameters, name).is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Binds a value into the innermost scope and marks it as no longer waiting
    fn bind(&mut self, argument: String, entity: Entity) -> Result<()> {
        debug!("Binding {} to '{}'", entity, argument);
        match self.states.last_mut() {
            Some(ParserState::ReadingInstructionArguments { awaiting }) => {
                *awaiting = None;
                self.arguments.add(argument, entity)
            }
            Some(ParserState::ReadingConstructorArguments {
                arguments, awaiting, ..
            }) => {
                *awaiting = None;
                arguments.add(argument, entity)
            }
            _ => Err(Error::Internal("no scope to bind an argument to".to_string())),
        }
    }

    fn read_argument_value(&mut self, token: &Token, argument: String, met_equals_sign: bool) -> Result<Step> {
        match &token.kind {
            TokenKind::EqualsSign if !met_equals_sign => {
                self.push_state(ParserState::ReadingArgumentValue {
                    argument,
                    met_equals_sign: true,
                });
                Ok(Step::Consumed)
            }
            TokenKind::Literal(type_name) => {
                debug!("Found a literal, assigning it to '{}'", argument);
                let entity = self.registries.types.get(type_name)?.make_entity(&token.text)?;
                self.bind(argument, entity)?;
                Ok(Step::Consumed)
            }
            TokenKind::ConstructorName => {
                let constructor = self.registries.constructors.get(&token.text)?.clone();
                debug!("Found constructor '{}', reading its arguments", constructor.name());
                self.push_state(ParserState::ReadingConstructorArguments {
                    constructor,
                    argument,
                    arguments: Arguments::new(),
                    awaiting: None,
                });
                Ok(Step::Consumed)
            }
            _ => {
                debug!("Found {}, letting the enclosing state deal with it", token.kind.describe());
                Ok(Step::Replay)
            }
        }
    }

    fn read_constructor_arguments(
        &mut self,
        token: &Token,
        constructor: Arc<dyn EntityConstructor>,
        argument: String,
        arguments: Arguments,
        awaiting: Option<String>,
    ) -> Result<Step> {
        self.check_not_awaiting(token, &awaiting)?;

        if token.kind == TokenKind::ParameterName {
            if let Some(parameter) = find_parameter(constructor.parameters(), &token.text) {
                let name = parameter.name.to_string();
                self.push_state(ParserState::ReadingConstructorArguments {
                    constructor,
                    argument,
                    arguments,
                    awaiting: None,
                });
                self.await_value(name, false)?;
                return Ok(Step::Consumed);
            }
            if !self.declared_by_enclosing_scope(&token.text)? {
                self.declared(token, constructor.name(), constructor.parameters())?;
            }
        }

        // Any other token ends the call and belongs to the enclosing scope
        debug!("Evaluating constructor '{}'", constructor.name());
        let entity = evaluate(constructor.as_ref(), &arguments)?;
        self.bind(argument, entity)?;
        Ok(Step::Replay)
    }
}
