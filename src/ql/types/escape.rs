//! Escaping of characters that are ambiguous in the record and instruction syntax

/// Starts and ends a string entity
pub const QUOTE: char = '"';
/// Makes the next character lose its special meaning
pub const ESCAPE: char = '\\';
/// Separates the fields of a record line
pub const DELIMITER: char = ',';

fn is_escapable(c: char) -> bool {
    c == QUOTE || c == ESCAPE || c == DELIMITER
}

/// Prefixes every escapable character with the escape character
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if is_escapable(c) {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Reverses [`escape`]. Returns None when the text ends with a dangling escape character
pub fn unescape(text: &str) -> Option<String> {
    let mut value = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            value.push(chars.next()?);
        } else {
            value.push(c);
        }
    }
    Some(value)
}

/// Escapes the value and wraps it into quotes
pub fn quoted(value: &str) -> String {
    format!("{QUOTE}{}{QUOTE}", escape(value))
}

/// Strips the quotes of a quoted, escaped string and unescapes its content
pub fn unquoted(text: &str) -> Option<String> {
    let inner = text.strip_prefix(QUOTE)?.strip_suffix(QUOTE)?;
    // The closing quote must not be the escaped one
    let trailing_escapes = inner.chars().rev().take_while(|c| *c == ESCAPE).count();
    if trailing_escapes % 2 == 1 {
        return None;
    }
    unescape(inner)
}
