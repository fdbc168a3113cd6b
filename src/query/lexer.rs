//! Tokenizer for the query language.

use crate::error::{Result, TdError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    RParen,
    Comma,
    Eq,
    NotEq,
    Tilde,
    NotTilde,
    /// Bare identifier, keyword, or unquoted value.
    Word(String),
    /// Quoted string with escapes resolved.
    Str(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub pos: usize,
}

impl Token {
    /// Case-insensitive keyword test; quoted strings never match.
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

const fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '/' | '*' | '@' | '#')
}

/// Split `input` into tokens, ending with `Eof`.
///
/// # Errors
///
/// Returns `QueryParse` for unterminated strings and stray characters.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::LParen, pos });
            }
            ')' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::RParen, pos });
            }
            ',' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Comma, pos });
            }
            '=' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Eq, pos });
            }
            '~' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Tilde, pos });
            }
            '!' => {
                chars.next();
                let kind = match chars.peek() {
                    Some((_, '=')) => TokenKind::NotEq,
                    Some((_, '~')) => TokenKind::NotTilde,
                    _ => return Err(TdError::query_parse(pos, "expected '=' or '~' after '!'")),
                };
                chars.next();
                tokens.push(Token { kind, pos });
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(TdError::query_parse(pos, "unterminated string"));
                }
                tokens.push(Token { kind: TokenKind::Str(value), pos });
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if !is_word_char(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token { kind: TokenKind::Word(word), pos });
            }
            other => {
                return Err(TdError::query_parse(
                    pos,
                    format!("unexpected character '{other}'"),
                ));
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: input.len(),
    });
    Ok(tokens)
}
