//! Instruction lexer: a character-driven state machine turning instruction text into tokens

use std::fmt::Display;

use chrono::DateTime;
use log::debug;

use crate::{
    error::{Error, Result, SyntaxError},
    ql::{
        engine::Registries,
        registry::Named,
        types::{
            escape::{ESCAPE, QUOTE},
            BOOL, DATE, FLOAT, INT, LONG, STR,
        },
    },
};

const EQUALS_SIGN: char = '=';
const SEMICOLON: char = ';';
const SPACE: char = ' ';

/// Classification of a token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    InstructionName,
    ParameterName,
    ConstructorName,
    /// Literal text of the type with this tag
    Literal(&'static str),
    EqualsSign,
    Semicolon,
}

impl TokenKind {
    /// Human readable name used in syntax errors
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::InstructionName => "instruction name",
            TokenKind::ParameterName => "parameter name",
            TokenKind::ConstructorName => "constructor name",
            TokenKind::Literal(_) => "literal",
            TokenKind::EqualsSign => "equals sign",
            TokenKind::Semicolon => "semicolon",
        }
    }
}

/// A classified piece of instruction text and its position, in characters
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
    pub length: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, offset: usize, length: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            offset,
            length,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind.describe(), self.text)
    }
}

/// Prefixes a noun with its indefinite article
pub fn with_article(noun: &str) -> String {
    match noun.chars().next() {
        Some(c) if "aeiouAEIOU".contains(c) => format!("an {}", noun),
        _ => format!("a {}", noun),
    }
}

/// "An equals sign expected, but a semicolon met"
pub fn expectation(expected: &str, met: &str) -> String {
    let message = format!("{} expected, but {} met", with_article(expected), with_article(met));
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => message,
    }
}

/// Guesses the type of an unquoted literal
pub fn literal_type(text: &str) -> Option<&'static str> {
    if text == "true" || text == "false" {
        return Some(BOOL);
    }
    if text.parse::<i32>().is_ok() {
        return Some(INT);
    }
    if text.parse::<i64>().is_ok() {
        return Some(LONG);
    }
    let numeric = text
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+');
    if numeric && text.contains('.') && text.parse::<f32>().is_ok_and(f32::is_finite) {
        return Some(FLOAT);
    }
    if DateTime::parse_from_rfc3339(text).is_ok() {
        return Some(DATE);
    }
    None
}

/// Characters that extend names
fn is_latin(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Starts of unquoted number and date literals
fn starts_bare_literal(c: char) -> bool {
    c.is_ascii_digit() || c == '-' || c == '+'
}

fn word_count(text: &str) -> usize {
    text.split(SPACE).count()
}

/// What a state did with the current character
#[derive(Debug, PartialEq)]
enum Step {
    Consumed,
    /// Feed the same character to the new state
    Replay,
}

#[derive(Debug, Clone, PartialEq)]
enum LexerState {
    ReadingInstructionName,
    ReadingEqualsSign,
    ReadingArgumentValue,
    ReadingStringLiteral { escaped: bool },
    ReadingBareLiteral,
    /// A constructor name, possibly followed by its first parameter name, or a boolean
    ReadingValueWords,
    ReadingParameters,
    SkippingWhitespace(Box<LexerState>),
    LexingCompleted,
}

/// Characters of the token being read with their source offsets
#[derive(Default)]
struct Buffer {
    chars: Vec<(usize, char)>,
}

impl Buffer {
    fn push(&mut self, offset: usize, c: char) {
        self.chars.push((offset, c));
    }

    /// Collapses a run of whitespace into one space inside a name
    fn push_separator(&mut self, offset: usize) {
        if !self.is_empty() && !self.ends_with_space() {
            self.push(offset, SPACE);
        }
    }

    fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    fn ends_with_space(&self) -> bool {
        self.chars.last().is_some_and(|(_, c)| *c == SPACE)
    }

    fn text(&self) -> String {
        self.chars.iter().map(|(_, c)| c).collect::<String>().trim().to_string()
    }

    /// Offset and length of the trimmed chars in `start..end`
    fn span(&self, start: usize, end: usize) -> (usize, usize) {
        let chars = &self.chars[start..end];
        let mut trimmed = chars.iter().filter(|(_, c)| *c != SPACE);
        match (trimmed.next(), chars.iter().rev().find(|(_, c)| *c != SPACE)) {
            (Some((first, _)), Some((last, _))) => (*first, last - first + 1),
            _ => (chars.first().map_or(0, |(offset, _)| *offset), 0),
        }
    }

    /// Turns `start..end` into a token
    fn token(&self, kind: TokenKind, start: usize, end: usize) -> Token {
        let text: String = self.chars[start..end].iter().map(|(_, c)| c).collect();
        let (offset, length) = self.span(start, end);
        Token::new(kind, text.trim(), offset, length)
    }

    /// Index of the char after the first `words` words
    fn word_boundary(&self, words: usize) -> usize {
        let mut seen = 0;
        for (index, (_, c)) in self.chars.iter().enumerate() {
            if *c == SPACE {
                seen += 1;
                if seen == words {
                    return index;
                }
            }
        }
        self.chars.len()
    }

    fn clear(&mut self) {
        self.chars.clear();
    }
}

/// Character-driven lexer of a single instruction
pub struct Lexer<'a> {
    registries: &'a Registries,
    instruction: &'a str,
    state: LexerState,
    buffer: Buffer,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(registries: &'a Registries, instruction: &'a str) -> Self {
        Self {
            registries,
            instruction,
            state: LexerState::SkippingWhitespace(Box::new(LexerState::ReadingInstructionName)),
            buffer: Buffer::default(),
            tokens: Vec::new(),
        }
    }

    /// Lexes the whole instruction, one character at a time, left to right
    pub fn lex(mut self) -> Result<Vec<Token>> {
        let chars: Vec<char> = self.instruction.chars().collect();
        let mut offset = 0;
        while let Some(&c) = chars.get(offset) {
            if self.handle(offset, c)? == Step::Consumed {
                offset += 1;
            }
        }
        self.finish(chars.len())?;
        Ok(self.tokens)
    }

    fn switch_state(&mut self, state: LexerState) {
        debug!("Lexer switches from {:?} to {:?}", self.state, state);
        self.state = state;
    }

    fn skip_whitespace_then(&mut self, state: LexerState) {
        self.switch_state(LexerState::SkippingWhitespace(Box::new(state)));
    }

    fn push_token(&mut self, token: Token) {
        debug!("Lexer pushes {}", token);
        self.tokens.push(token);
    }

    fn push_char_token(&mut self, kind: TokenKind, offset: usize, c: char) {
        self.push_token(Token::new(kind, c.to_string(), offset, 1));
    }

    fn error(&self, message: impl Into<String>, hint: impl Into<String>, offset: usize, length: usize) -> Error {
        Error::LexingSyntax(SyntaxError::new(self.instruction, message, hint, offset, length))
    }

    fn unexpected(&self, expected: &str, offset: usize, c: char) -> Error {
        self.error(
            expectation(expected, &format!("character '{}'", c)),
            "Did you make a typo? Names consist of latin letters, digits and single spaces",
            offset,
            1,
        )
    }

    fn handle(&mut self, offset: usize, c: char) -> Result<Step> {
        match self.state.clone() {
            LexerState::SkippingWhitespace(next) => {
                if c.is_whitespace() {
                    return Ok(Step::Consumed);
                }
                self.switch_state(*next);
                Ok(Step::Replay)
            }
            LexerState::ReadingInstructionName => self.read_name(offset, c, true),
            LexerState::ReadingParameters => self.read_name(offset, c, false),
            LexerState::ReadingEqualsSign => {
                if c != EQUALS_SIGN {
                    return Err(self.unexpected("equals sign", offset, c));
                }
                self.push_char_token(TokenKind::EqualsSign, offset, c);
                self.skip_whitespace_then(LexerState::ReadingArgumentValue);
                Ok(Step::Consumed)
            }
            LexerState::ReadingArgumentValue => self.read_value_start(offset, c),
            LexerState::ReadingStringLiteral { escaped } => self.read_string(offset, c, escaped),
            LexerState::ReadingBareLiteral => self.read_bare_literal(offset, c),
            LexerState::ReadingValueWords => self.read_value_words(offset, c),
            LexerState::LexingCompleted => {
                if c.is_whitespace() {
                    return Ok(Step::Consumed);
                }
                Err(self.error(
                    format!("Unexpected character '{}' after the semicolon", c),
                    "Only one instruction can be sent at once, remove everything after the semicolon",
                    offset,
                    1,
                ))
            }
        }
    }

    /// Instruction and parameter names: words separated by single spaces, ended by `=` or `;`
    fn read_name(&mut self, offset: usize, c: char, instruction: bool) -> Result<Step> {
        if is_latin(c) {
            self.buffer.push(offset, c);
            return Ok(Step::Consumed);
        }
        if c.is_whitespace() {
            self.buffer.push_separator(offset);
            return Ok(Step::Consumed);
        }

        let expected = if instruction { "instruction name" } else { "parameter name" };
        match c {
            EQUALS_SIGN if self.buffer.is_empty() => Err(self.error(
                expectation(expected, "equals sign"),
                "Write a name before the equals sign",
                offset,
                1,
            )),
            EQUALS_SIGN => {
                debug!("Found an equals sign, completing the name");
                if instruction {
                    self.split_instruction_name();
                } else {
                    let token = self.buffer.token(TokenKind::ParameterName, 0, self.buffer.chars.len());
                    self.push_token(token);
                }
                self.buffer.clear();
                self.switch_state(LexerState::ReadingEqualsSign);
                Ok(Step::Replay)
            }
            SEMICOLON if !instruction && !self.buffer.is_empty() => {
                let (name_offset, length) = self.buffer.span(0, self.buffer.chars.len());
                Err(self.error(
                    expectation("equals sign", "semicolon"),
                    format!("Give parameter '{}' a value: {} = <value>", self.buffer.text(), self.buffer.text()),
                    name_offset + length,
                    1,
                ))
            }
            SEMICOLON => {
                if instruction {
                    if self.buffer.is_empty() {
                        return Err(self.error(
                            expectation("instruction name", "semicolon"),
                            "Start the instruction with its name",
                            offset,
                            1,
                        ));
                    }
                    let token = self.buffer.token(TokenKind::InstructionName, 0, self.buffer.chars.len());
                    self.push_token(token);
                    self.buffer.clear();
                }
                self.complete(offset, c);
                Ok(Step::Consumed)
            }
            _ => Err(self.unexpected(expected, offset, c)),
        }
    }

    /// Splits the words before `=` into the longest registered instruction name and a parameter
    /// name. When the words are exactly an instruction name, the general parameter is bound
    fn split_instruction_name(&mut self) {
        let len = self.buffer.chars.len();
        let text = self.buffer.text();
        let registries = self.registries;
        match self.longest_prefix(&text, |name| registries.instructions.has(name)) {
            Some(words) if words < word_count(&text) => {
                let boundary = self.buffer.word_boundary(words);
                let name = self.buffer.token(TokenKind::InstructionName, 0, boundary);
                let parameter = self.buffer.token(TokenKind::ParameterName, boundary, len);
                self.push_token(name);
                self.push_token(parameter);
            }
            // Exact or unknown instruction name, the parser resolves it
            _ => {
                let name = self.buffer.token(TokenKind::InstructionName, 0, len);
                self.push_token(name);
            }
        }
    }

    /// Number of leading words of `text` forming the longest name accepted by `is_registered`
    fn longest_prefix(&self, text: &str, is_registered: impl Fn(&str) -> bool) -> Option<usize> {
        let words: Vec<&str> = text.split(SPACE).collect();
        (1..=words.len())
            .rev()
            .find(|count| is_registered(&words[..*count].join(" ")))
    }

    fn read_value_start(&mut self, offset: usize, c: char) -> Result<Step> {
        match c {
            QUOTE => {
                self.buffer.push(offset, c);
                self.switch_state(LexerState::ReadingStringLiteral { escaped: false });
                Ok(Step::Consumed)
            }
            SEMICOLON => {
                // The parser reports the missing value, it knows which argument lacks it
                self.complete(offset, c);
                Ok(Step::Consumed)
            }
            c if starts_bare_literal(c) => {
                self.switch_state(LexerState::ReadingBareLiteral);
                Ok(Step::Replay)
            }
            c if c.is_ascii_alphabetic() => {
                self.switch_state(LexerState::ReadingValueWords);
                Ok(Step::Replay)
            }
            _ => Err(self.error(
                expectation("value", &format!("character '{}'", c)),
                "Values are literals like 42, \"text\" or true, or constructors like month",
                offset,
                1,
            )),
        }
    }

    fn read_string(&mut self, offset: usize, c: char, escaped: bool) -> Result<Step> {
        self.buffer.push(offset, c);
        if escaped {
            self.state = LexerState::ReadingStringLiteral { escaped: false };
        } else if c == ESCAPE {
            self.state = LexerState::ReadingStringLiteral { escaped: true };
        } else if c == QUOTE {
            let token = self.raw_token(TokenKind::Literal(STR));
            self.push_token(token);
            self.buffer.clear();
            self.skip_whitespace_then(LexerState::ReadingParameters);
        }
        Ok(Step::Consumed)
    }

    /// Token of the whole buffer, keeping its whitespace
    fn raw_token(&self, kind: TokenKind) -> Token {
        let text: String = self.buffer.chars.iter().map(|(_, c)| c).collect();
        let offset = self.buffer.chars.first().map_or(0, |(offset, _)| *offset);
        Token::new(kind, text, offset, self.buffer.chars.len())
    }

    fn read_bare_literal(&mut self, offset: usize, c: char) -> Result<Step> {
        if !c.is_whitespace() && c != SEMICOLON {
            self.buffer.push(offset, c);
            return Ok(Step::Consumed);
        }

        let text = self.buffer.text();
        let token = self.raw_token(TokenKind::Literal(STR));
        let Some(type_name) = literal_type(&text) else {
            return Err(self.error(
                format!("Unknown literal '{}'", text),
                "Numbers look like 42, -7 or 3.14, dates like 2023-05-17T10:00:00.000Z",
                token.offset,
                token.length,
            ));
        };
        self.push_token(Token::new(TokenKind::Literal(type_name), text, token.offset, token.length));
        self.buffer.clear();
        self.switch_state(LexerState::ReadingParameters);
        Ok(Step::Replay)
    }

    fn read_value_words(&mut self, offset: usize, c: char) -> Result<Step> {
        if is_latin(c) {
            self.buffer.push(offset, c);
            return Ok(Step::Consumed);
        }
        if c.is_whitespace() {
            self.buffer.push_separator(offset);
            return Ok(Step::Consumed);
        }

        match c {
            EQUALS_SIGN => {
                debug!("Found an equals sign after a value, splitting it from the parameter name");
                self.split_value_words()?;
                self.buffer.clear();
                self.switch_state(LexerState::ReadingEqualsSign);
                Ok(Step::Replay)
            }
            SEMICOLON => {
                let len = self.buffer.chars.len();
                let text = self.buffer.text();
                let kind = match literal_type(&text) {
                    Some(BOOL) => TokenKind::Literal(BOOL),
                    _ => TokenKind::ConstructorName,
                };
                let token = self.buffer.token(kind, 0, len);
                self.push_token(token);
                self.buffer.clear();
                self.complete(offset, c);
                Ok(Step::Consumed)
            }
            _ => Err(self.unexpected("constructor name", offset, c)),
        }
    }

    /// Splits the words before `=` into a boolean or a constructor name, and a parameter name
    fn split_value_words(&mut self) -> Result<()> {
        let len = self.buffer.chars.len();
        let text = self.buffer.text();
        let first_word = text.split(SPACE).next().unwrap_or_default();

        let (kind, words) = if literal_type(first_word) == Some(BOOL) {
            (TokenKind::Literal(BOOL), Some(1))
        } else {
            let registries = self.registries;
            (
                TokenKind::ConstructorName,
                self.longest_prefix(&text, |name| registries.constructors.has(name)),
            )
        };

        match words {
            Some(words) if words < word_count(&text) => {
                let boundary = self.buffer.word_boundary(words);
                let value = self.buffer.token(kind, 0, boundary);
                let parameter = self.buffer.token(TokenKind::ParameterName, boundary, len);
                self.push_token(value);
                self.push_token(parameter);
                Ok(())
            }
            _ => {
                let (offset, length) = self.buffer.span(0, len);
                Err(self.error(
                    format!("'{}' is neither a value followed by a parameter name, nor a parameter name", text),
                    match self.registries.constructors.suggest(&text) {
                        Some(constructor) => format!("Did you mean '{}'?", constructor.name()),
                        None => "Check the constructor name".to_string(),
                    },
                    offset,
                    length,
                ))
            }
        }
    }

    fn complete(&mut self, offset: usize, c: char) {
        debug!("Semicolon found, the instruction is completed");
        self.push_char_token(TokenKind::Semicolon, offset, c);
        self.switch_state(LexerState::LexingCompleted);
    }

    /// Handles the end of the text
    fn finish(&mut self, length: usize) -> Result<()> {
        match self.state {
            LexerState::LexingCompleted => Ok(()),
            LexerState::ReadingStringLiteral { .. } => {
                let offset = self.buffer.chars.first().map_or(0, |(offset, _)| *offset);
                Err(self.error(
                    "The string literal is never closed",
                    format!("Close the string with {}", QUOTE),
                    offset,
                    length - offset,
                ))
            }
            _ => Err(self.error(
                expectation("semicolon", "end of the instruction"),
                "End the instruction with a semicolon",
                length,
                1,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{expectation, literal_type, Lexer, Token, TokenKind};
    use crate::{
        error::{Error, Result},
        ql::engine::Registries,
    };

    fn lex(text: &str) -> Result<Vec<Token>> {
        let registries = Registries::with_defaults()?;
        Lexer::new(&registries, text).lex()
    }

    fn kinds(tokens: &[Token]) -> Vec<(TokenKind, &str)> {
        tokens.iter().map(|t| (t.kind.clone(), t.text.as_str())).collect()
    }

    #[test]
    fn test_collapses_whitespace_in_names() -> Result<()> {
        let tokens = lex("get   server    name;")?;
        assert_eq!(
            kinds(&tokens),
            vec![
                (TokenKind::InstructionName, "get server name"),
                (TokenKind::Semicolon, ";")
            ]
        );
        assert_eq!(kinds(&tokens), kinds(&lex("  get server name  ;  ")?));
        assert_eq!((tokens[0].offset, tokens[0].length), (0, 20));
        Ok(())
    }

    #[test]
    fn test_general_parameter() -> Result<()> {
        let tokens = lex("change port to = 8080;")?;
        assert_eq!(
            kinds(&tokens),
            vec![
                (TokenKind::InstructionName, "change port to"),
                (TokenKind::EqualsSign, "="),
                (TokenKind::Literal("int"), "8080"),
                (TokenKind::Semicolon, ";"),
            ]
        );
        assert_eq!(tokens[2].offset, 17);
        Ok(())
    }

    #[test]
    fn test_parameters_and_literals() -> Result<()> {
        let tokens = lex(r#"select from = "users, \"old\"" limit   =  3000000000;"#)?;
        assert_eq!(
            kinds(&tokens),
            vec![
                (TokenKind::InstructionName, "select from"),
                (TokenKind::EqualsSign, "="),
                (TokenKind::Literal("str"), r#""users, \"old\"""#),
                (TokenKind::ParameterName, "limit"),
                (TokenKind::EqualsSign, "="),
                (TokenKind::Literal("long"), "3000000000"),
                (TokenKind::Semicolon, ";"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_constructors_split_from_parameters() -> Result<()> {
        let tokens = lex(r#"eval = matches string to check = "abc" regex expression = "[a-c]+";"#)?;
        assert_eq!(
            kinds(&tokens),
            vec![
                (TokenKind::InstructionName, "eval"),
                (TokenKind::EqualsSign, "="),
                (TokenKind::ConstructorName, "matches"),
                (TokenKind::ParameterName, "string to check"),
                (TokenKind::EqualsSign, "="),
                (TokenKind::Literal("str"), r#""abc""#),
                (TokenKind::ParameterName, "regex expression"),
                (TokenKind::EqualsSign, "="),
                (TokenKind::Literal("str"), r#""[a-c]+""#),
                (TokenKind::Semicolon, ";"),
            ]
        );

        let tokens = lex("eval = month;")?;
        assert_eq!(tokens[2].kind, TokenKind::ConstructorName);
        let tokens = lex("eval = true;")?;
        assert_eq!(tokens[2].kind, TokenKind::Literal("bool"));
        Ok(())
    }

    #[test]
    fn test_literal_types() {
        assert_eq!(literal_type("-12"), Some("int"));
        assert_eq!(literal_type("2147483648"), Some("long"));
        assert_eq!(literal_type("2.5"), Some("float"));
        assert_eq!(literal_type("false"), Some("bool"));
        assert_eq!(literal_type("2023-05-17T10:00:00.000Z"), Some("date"));
        assert_eq!(literal_type("12abc"), None);
        assert_eq!(literal_type("1e5"), None);
    }

    #[test]
    fn test_missing_value_is_left_to_the_parser() -> Result<()> {
        let tokens = lex("change port to = ;")?;
        assert_eq!(tokens.last().map(|t| (t.offset, &t.kind)), Some((17, &TokenKind::Semicolon)));
        Ok(())
    }

    #[test]
    fn test_errors() -> Result<()> {
        let err = lex("get server name").unwrap_err();
        let syntax = err.syntax().cloned().unwrap();
        assert!(matches!(err, Error::LexingSyntax(_)));
        assert_eq!(syntax.message, "A semicolon expected, but an end of the instruction met");
        assert_eq!(syntax.offset, 15);

        let syntax = lex("get server! name;").unwrap_err().syntax().cloned().unwrap();
        assert_eq!(syntax.message, "An instruction name expected, but a character '!' met");
        assert_eq!((syntax.offset, syntax.length), (10, 1));

        let syntax = lex("get server name; eval = 1;").unwrap_err().syntax().cloned().unwrap();
        assert_eq!(syntax.offset, 17);

        let syntax = lex(r#"eval = "open;"#).unwrap_err().syntax().cloned().unwrap();
        assert_eq!(syntax.message, "The string literal is never closed");

        let syntax = lex("eval = 12abc;").unwrap_err().syntax().cloned().unwrap();
        assert_eq!((syntax.offset, syntax.length), (7, 5));

        let syntax = lex("select from = \"t\" limit;").unwrap_err().syntax().cloned().unwrap();
        assert_eq!(syntax.message, "An equals sign expected, but a semicolon met");
        assert_eq!(syntax.offset, 23);
        Ok(())
    }

    #[test]
    fn test_expectation_articles() {
        assert_eq!(
            expectation("value", "equals sign"),
            "A value expected, but an equals sign met"
        );
        assert_eq!(
            expectation("instruction name", "literal"),
            "An instruction name expected, but a literal met"
        );
    }
}
