//! Recursive-descent parser for the expression language.
//!
//! Precedence, weakest first: `OR`, `AND`, `NOT`, comparators, `BETWEEN`,
//! `IN`, then function calls and parenthesized groups. Each level is one
//! method, so the call chain mirrors the table.
//!
//! Structural failures come back as [`SyntaxError`]. Recognizable but
//! unacceptable constructs (an unknown function, a wrong argument count)
//! become [`Expr::Invalid`] nodes so the rest of the expression still parses.

use super::ast::{
    ArithmeticOp, AttributePath, CompareOp, Expr, PathElement, SetAction, UpdateExpression,
};
use super::error::SyntaxError;
use super::functions::FunctionName;
use super::lexer::{Lexer, Token, TokenType};

/// Longest expression text accepted, in bytes.
pub const MAX_EXPRESSION_BYTES: usize = 4096;

/// Deepest nesting of groups, `NOT` and function arguments.
pub const MAX_NESTING: usize = 128;

/// Parse a condition, filter or key-condition expression.
pub fn parse_condition(input: &str) -> Result<Expr, SyntaxError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_or()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse an update expression.
pub fn parse_update(input: &str) -> Result<UpdateExpression, SyntaxError> {
    let mut parser = Parser::new(input)?;
    let update = parser.parse_update_clauses()?;
    parser.finish()?;
    Ok(update)
}

/// Parse a projection expression into its comma-separated paths.
pub fn parse_projection(input: &str) -> Result<Vec<AttributePath>, SyntaxError> {
    let mut parser = Parser::new(input)?;
    let mut paths = vec![parser.parse_path()?];
    while parser.check(TokenType::Comma) {
        parser.advance();
        paths.push(parser.parse_path()?);
    }
    parser.finish()?;
    Ok(paths)
}

// ---------------------------------------------------------------------------
// Parser state
// ---------------------------------------------------------------------------

/// Parser over a lazily lexed token stream: one current token, one lookahead.
struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    peek: Token,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, SyntaxError> {
        if input.trim().is_empty() {
            return Err(SyntaxError::Empty);
        }
        if input.len() > MAX_EXPRESSION_BYTES {
            return Err(SyntaxError::TooLong(input.len()));
        }
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        let peek = lexer.next_token();
        Ok(Self {
            lexer,
            current,
            peek,
            depth: 0,
        })
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(SyntaxError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        let peek = std::mem::replace(&mut self.peek, next);
        std::mem::replace(&mut self.current, peek)
    }

    fn check(&self, kind: TokenType) -> bool {
        self.current.kind == kind
    }

    fn expect(&mut self, kind: TokenType) -> Result<Token, SyntaxError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        match self.current.kind {
            TokenType::Eof => SyntaxError::UnexpectedEof {
                expected: expected.to_owned(),
            },
            TokenType::Illegal => SyntaxError::IllegalToken {
                literal: self.current.literal.clone(),
                position: self.current.position,
            },
            _ => SyntaxError::UnexpectedToken {
                expected: expected.to_owned(),
                found: self.current.literal.clone(),
                position: self.current.position,
            },
        }
    }

    fn finish(&self) -> Result<(), SyntaxError> {
        if self.check(TokenType::Eof) {
            Ok(())
        } else {
            Err(self.unexpected(TokenType::Eof.describe()))
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

impl Parser<'_> {
    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.check(TokenType::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_not()?;
        while self.check(TokenType::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenType::Not) {
            self.advance();
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenType::LParen) {
            self.advance();
            let inner = self.nested(Self::parse_or)?;
            self.expect(TokenType::RParen)?;
            return Ok(Expr::Grouped(Box::new(inner)));
        }

        let left = self.parse_operand()?;
        if let Some(op) = comparator(self.current.kind) {
            self.advance();
            let right = self.parse_operand()?;
            return Ok(Expr::Comparison {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }
        match self.current.kind {
            TokenType::Between => self.parse_between(left),
            TokenType::In => self.parse_in(left),
            _ if matches!(left, Expr::Call { .. } | Expr::Invalid { .. }) => Ok(left),
            _ => Err(self.unexpected("comparator, BETWEEN or IN")),
        }
    }

    fn parse_between(&mut self, operand: Expr) -> Result<Expr, SyntaxError> {
        self.advance();
        let low = self.parse_operand()?;
        self.expect(TokenType::And)?;
        let high = self.parse_operand()?;
        Ok(Expr::Between {
            operand: Box::new(operand),
            low: Box::new(low),
            high: Box::new(high),
        })
    }

    fn parse_in(&mut self, operand: Expr) -> Result<Expr, SyntaxError> {
        self.advance();
        self.expect(TokenType::LParen)?;
        let mut candidates = vec![self.parse_operand()?];
        while self.check(TokenType::Comma) {
            self.advance();
            candidates.push(self.parse_operand()?);
        }
        self.expect(TokenType::RParen)?;
        Ok(Expr::In {
            operand: Box::new(operand),
            candidates,
        })
    }
}

fn comparator(kind: TokenType) -> Option<CompareOp> {
    Some(match kind {
        TokenType::Eq => CompareOp::Eq,
        TokenType::Ne => CompareOp::Ne,
        TokenType::Lt => CompareOp::Lt,
        TokenType::Le => CompareOp::Le,
        TokenType::Gt => CompareOp::Gt,
        TokenType::Ge => CompareOp::Ge,
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Operands, paths and calls
// ---------------------------------------------------------------------------

impl Parser<'_> {
    fn parse_operand(&mut self) -> Result<Expr, SyntaxError> {
        match self.current.kind {
            TokenType::ValuePlaceholder => Ok(Expr::Placeholder(self.advance().literal)),
            TokenType::Ident if self.peek.kind == TokenType::LParen => self.parse_call(),
            TokenType::Ident | TokenType::NamePlaceholder => {
                Ok(Expr::Identifier(self.parse_path()?))
            }
            _ => Err(self.unexpected("operand")),
        }
    }

    fn parse_call(&mut self) -> Result<Expr, SyntaxError> {
        let name = self.advance().literal;
        self.expect(TokenType::LParen)?;
        let mut args = Vec::new();
        if !self.check(TokenType::RParen) {
            args.push(self.nested(Self::parse_operand)?);
            while self.check(TokenType::Comma) {
                self.advance();
                args.push(self.nested(Self::parse_operand)?);
            }
        }
        self.expect(TokenType::RParen)?;

        let Some(function) = FunctionName::from_name(&name) else {
            return Ok(invalid_call(
                &name,
                &args,
                format!("Invalid function name; function: {name}"),
            ));
        };
        if args.len() != function.arity() {
            let message = format!(
                "Incorrect number of operands for operator or function; operator or function: {name}, number of operands: {}",
                args.len()
            );
            return Ok(invalid_call(&name, &args, message));
        }
        if function.requires_path() && !matches!(args.first(), Some(Expr::Identifier(_))) {
            let message = format!(
                "Operator or function requires a document path; operator or function: {name}"
            );
            return Ok(invalid_call(&name, &args, message));
        }
        Ok(Expr::Call { function, args })
    }

    fn parse_path(&mut self) -> Result<AttributePath, SyntaxError> {
        let mut elements = vec![self.parse_path_name()?];
        loop {
            match self.current.kind {
                TokenType::Dot => {
                    self.advance();
                    elements.push(self.parse_path_name()?);
                }
                TokenType::LBracket => {
                    self.advance();
                    let token = self.expect(TokenType::Number)?;
                    let index = token.literal.parse::<usize>().map_err(|_| {
                        SyntaxError::UnexpectedToken {
                            expected: "list index".to_owned(),
                            found: token.literal.clone(),
                            position: token.position,
                        }
                    })?;
                    self.expect(TokenType::RBracket)?;
                    elements.push(PathElement::Index(index));
                }
                _ => return Ok(AttributePath { elements }),
            }
        }
    }

    fn parse_path_name(&mut self) -> Result<PathElement, SyntaxError> {
        match self.current.kind {
            TokenType::Ident => Ok(PathElement::Attribute(self.advance().literal)),
            TokenType::NamePlaceholder => Ok(PathElement::Placeholder(self.advance().literal)),
            _ => Err(self.unexpected("attribute name")),
        }
    }

    /// A `SET` right-hand side: an operand, optionally followed by `+`/`-` chains.
    fn parse_set_value(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_operand()?;
        loop {
            let op = match self.current.kind {
                TokenType::Plus => ArithmeticOp::Plus,
                TokenType::Minus => ArithmeticOp::Minus,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_operand()?;
            left = Expr::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }
}

fn invalid_call(name: &str, args: &[Expr], message: String) -> Expr {
    let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
    Expr::Invalid {
        literal: format!("{name}({})", rendered.join(", ")),
        message,
    }
}

// ---------------------------------------------------------------------------
// Update expressions
// ---------------------------------------------------------------------------

impl Parser<'_> {
    fn parse_update_clauses(&mut self) -> Result<UpdateExpression, SyntaxError> {
        let mut update = UpdateExpression::default();
        let mut seen = [false; 4];

        loop {
            let (slot, keyword) = match self.current.kind {
                TokenType::Set => (0, "SET"),
                TokenType::Remove => (1, "REMOVE"),
                TokenType::Add => (2, "ADD"),
                TokenType::Delete => (3, "DELETE"),
                TokenType::Eof if seen.iter().any(|s| *s) => return Ok(update),
                _ => return Err(self.unexpected("SET, REMOVE, ADD or DELETE")),
            };
            if seen[slot] {
                return Err(SyntaxError::DuplicateClause(keyword));
            }
            seen[slot] = true;
            self.advance();

            loop {
                match slot {
                    0 => {
                        let path = self.parse_path()?;
                        self.expect(TokenType::Eq)?;
                        let value = self.parse_set_value()?;
                        update.set.push(SetAction { path, value });
                    }
                    1 => update.remove.push(self.parse_path()?),
                    _ => {
                        let path = self.parse_path()?;
                        let value = self.parse_operand()?;
                        let action = SetAction { path, value };
                        if slot == 2 {
                            update.add.push(action);
                        } else {
                            update.delete.push(action);
                        }
                    }
                }
                if !self.check(TokenType::Comma) {
                    break;
                }
                self.advance();
            }
        }
    }
}
