//! Formula lexer.
//!
//! Whitespace-skipping, single-character operators, quoted string literals
//! with backslash escapes, decimal numbers, brace-delimited column refs,
//! bareword identifiers.

use gridstore_domain::error::{Error, Result};

/// One lexed token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// One of `+ - * / % ( ) ,`
    Sym(char),
    /// Decimal number, kept as source text.
    Number(String),
    /// Quoted string, unescaped.
    Str(String),
    /// Bareword identifier.
    Ident(String),
    /// `{column ref}` contents, trimmed.
    ColumnRef(String),
}

/// Tokenize formula source.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' | '%' | '(' | ')' | ',' => {
                chars.next();
                tokens.push(Token::Sym(ch));
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => break,
                        },
                        c if c == ch => {
                            closed = true;
                            break;
                        }
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(Error::bad_request("unterminated string literal in formula"));
                }
                tokens.push(Token::Str(value));
            }
            '{' => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(Error::bad_request("unterminated column reference in formula"));
                }
                tokens.push(Token::ColumnRef(name.trim().to_owned()));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                let mut seen_dot = false;
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        chars.next();
                    } else if c == '.' && !seen_dot {
                        seen_dot = true;
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if text == "." {
                    return Err(Error::bad_request("stray '.' in formula"));
                }
                tokens.push(Token::Number(text));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            other => {
                return Err(Error::bad_request(format!(
                    "unrecognized character {other:?} in formula"
                )));
            }
        }
    }
    Ok(tokens)
}
