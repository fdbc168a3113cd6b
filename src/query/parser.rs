//! Recursive-descent parser: `NOT` binds tighter than `AND`, which binds
//! tighter than `OR`.

use super::ast::{Expr, Field, Func, Op};
use super::lexer::{Token, TokenKind, tokenize};
use crate::error::{Result, TdError};
use crate::model::Priority;

/// Deepest expression tree (and parenthesis or `NOT` nesting) accepted.
pub const MAX_DEPTH: usize = 256;

/// An expression with the depth of its tree.
type Parsed = (Expr, usize);

/// Parse a query string. Blank input parses to [`Expr::All`].
///
/// # Errors
///
/// Returns `QueryParse` with the byte offset of the offending token.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        nesting: 0,
    };

    if parser.peek().kind == TokenKind::Eof {
        return Ok(Expr::All);
    }

    let (expr, _) = parser.parse_or()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(TdError::query_parse(
            trailing.pos,
            format!("unexpected {}", describe(trailing)),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with Eof and the cursor never passes it.
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token> {
        let token = self.advance();
        if &token.kind == kind {
            Ok(token)
        } else {
            Err(TdError::query_parse(
                token.pos,
                format!("expected {what}, found {}", describe(&token)),
            ))
        }
    }

    /// Step into a nested `(` or `NOT`.
    fn enter(&mut self, pos: usize) -> Result<()> {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(TdError::query_parse(pos, "query nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn parse_or(&mut self) -> Result<Parsed> {
        let (mut lhs, mut depth) = self.parse_and()?;
        while self.peek().is_keyword("OR") {
            let op = self.advance();
            let (rhs, rhs_depth) = self.parse_and()?;
            depth = bounded(depth.max(rhs_depth) + 1, op.pos)?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok((lhs, depth))
    }

    fn parse_and(&mut self) -> Result<Parsed> {
        let (mut lhs, mut depth) = self.parse_not()?;
        while self.peek().is_keyword("AND") {
            let op = self.advance();
            let (rhs, rhs_depth) = self.parse_not()?;
            depth = bounded(depth.max(rhs_depth) + 1, op.pos)?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok((lhs, depth))
    }

    fn parse_not(&mut self) -> Result<Parsed> {
        if self.peek().is_keyword("NOT") {
            let op = self.advance();
            self.enter(op.pos)?;
            let (inner, depth) = self.parse_not()?;
            self.leave();
            return Ok((Expr::Not(Box::new(inner)), bounded(depth + 1, op.pos)?));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Parsed> {
        let token = self.advance();
        match token.kind {
            TokenKind::LParen => {
                self.enter(token.pos)?;
                let inner = self.parse_or()?;
                self.expect(&TokenKind::RParen, "')'")?;
                self.leave();
                Ok(inner)
            }
            TokenKind::Word(ref name) => {
                let atom = if self.peek().kind == TokenKind::LParen {
                    self.parse_call(name, token.pos)?
                } else {
                    self.parse_compare(name, token.pos)?
                };
                let depth = if matches!(atom, Expr::Not(_)) { 2 } else { 1 };
                Ok((atom, depth))
            }
            _ => Err(TdError::query_parse(
                token.pos,
                format!("expected a predicate, found {}", describe(&token)),
            )),
        }
    }

    fn parse_call(&mut self, name: &str, pos: usize) -> Result<Expr> {
        let func = Func::from_name(name)
            .ok_or_else(|| TdError::query_parse(pos, format!("unknown function '{name}'")))?;
        self.expect(&TokenKind::LParen, "'('")?;

        let mut args = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                args.push(self.parse_value()?);
                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;

        if args.len() != func.arity() {
            return Err(TdError::query_parse(
                pos,
                format!(
                    "{}() takes {} argument(s), got {}",
                    func.name(),
                    func.arity(),
                    args.len()
                ),
            ));
        }

        Ok(Expr::Call { func, args })
    }

    fn parse_compare(&mut self, name: &str, pos: usize) -> Result<Expr> {
        let field = Field::from_name(name)
            .ok_or_else(|| TdError::query_parse(pos, format!("unknown field '{name}'")))?;

        let op_token = self.advance();
        let (op, negated) = match op_token.kind {
            TokenKind::Eq => (Op::Eq, false),
            TokenKind::NotEq => (Op::Eq, true),
            TokenKind::Tilde => (Op::Contains, false),
            TokenKind::NotTilde => (Op::Contains, true),
            _ => {
                return Err(TdError::query_parse(
                    op_token.pos,
                    format!("expected '=' or '~' after '{name}', found {}", describe(&op_token)),
                ));
            }
        };

        if !field.supports(op) {
            return Err(TdError::query_parse(
                op_token.pos,
                format!("operator not supported for field '{}'", field.name()),
            ));
        }

        let value_pos = self.peek().pos;
        let value = self.parse_value()?;

        if field == Field::Priority && op == Op::Eq && value.parse::<Priority>().is_err() {
            return Err(TdError::query_parse(
                value_pos,
                format!("invalid priority '{value}' (expected P0-P3)"),
            ));
        }

        let compare = Expr::compare(field, op, value);
        Ok(if negated {
            Expr::Not(Box::new(compare))
        } else {
            compare
        })
    }

    fn parse_value(&mut self) -> Result<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::Word(value) | TokenKind::Str(value) => Ok(value),
            _ => Err(TdError::query_parse(
                token.pos,
                format!("expected a value, found {}", describe(&token)),
            )),
        }
    }
}

fn bounded(depth: usize, pos: usize) -> Result<usize> {
    if depth > MAX_DEPTH {
        return Err(TdError::query_parse(pos, "query nested too deeply"));
    }
    Ok(depth)
}

fn describe(token: &Token) -> String {
    match &token.kind {
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Eq => "'='".to_string(),
        TokenKind::NotEq => "'!='".to_string(),
        TokenKind::Tilde => "'~'".to_string(),
        TokenKind::NotTilde => "'!~'".to_string(),
        TokenKind::Word(w) => format!("'{w}'"),
        TokenKind::Str(s) => format!("\"{s}\""),
        TokenKind::Eof => "end of query".to_string(),
    }
}
