//! Expression parsing, precedence low to high:
//! `or`, `and`, comparison, additive, multiplicative,
//! then navigation/invocation, then primary.

use crate::ast::expr::{BinaryOp, CollectionOp, Expr};
use crate::error::{ParseError, ParseResult};
use crate::token::{Keyword, TokenType};

use super::Parser;

impl Parser {
    pub(super) fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.matches(&TokenType::Keyword(Keyword::Or)) {
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.matches(&TokenType::Keyword(Keyword::And)) {
            let right = self.parse_comparison()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenType::Equals => BinaryOp::Equals,
                TokenType::NotEquals => BinaryOp::NotEquals,
                TokenType::Less => BinaryOp::LessThan,
                TokenType::Greater => BinaryOp::GreaterThan,
                TokenType::LessEquals => BinaryOp::LessOrEqual,
                TokenType::GreaterEquals => BinaryOp::GreaterOrEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    /// `/` doubles as the directive self-close; it only divides when an
    /// operand can follow.
    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenType::Star => BinaryOp::Multiply,
                TokenType::Slash
                    if !matches!(self.peek_at(1), TokenType::RightBracket) =>
                {
                    BinaryOp::Divide
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.matches(&TokenType::Keyword(Keyword::Not)) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(&TokenType::Dot) {
                let property = self.expect_identifier()?;
                expr = Expr::Navigation { source: Box::new(expr), property };
            } else if self.matches(&TokenType::Arrow) {
                expr = self.parse_collection_call(expr)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_collection_call(&mut self, source: Expr) -> ParseResult<Expr> {
        let op_pos = self.position();
        let op = match self.peek() {
            TokenType::Keyword(Keyword::Select) => CollectionOp::Select,
            TokenType::Keyword(Keyword::Reject) => CollectionOp::Reject,
            TokenType::Keyword(Keyword::Collect) => CollectionOp::Collect,
            TokenType::Keyword(Keyword::Any) => CollectionOp::Any,
            TokenType::Keyword(Keyword::Exists) => CollectionOp::Exists,
            TokenType::Keyword(Keyword::ForAll) => CollectionOp::ForAll,
            TokenType::Keyword(Keyword::Size) => CollectionOp::Size,
            TokenType::Keyword(Keyword::IsEmpty) => CollectionOp::IsEmpty,
            TokenType::Keyword(Keyword::NotEmpty) => CollectionOp::NotEmpty,
            TokenType::Keyword(Keyword::First) => CollectionOp::First,
            TokenType::Keyword(Keyword::Last) => CollectionOp::Last,
            other => {
                let name = other
                    .identifier_text()
                    .map(str::to_string)
                    .unwrap_or_else(|| other.describe());
                return Err(ParseError::malformed_expression(
                    format!("unknown collection operation '{}'", name),
                    op_pos,
                ));
            }
        };
        self.advance();

        if op.takes_body() {
            self.expect(TokenType::LeftParen)?;
            let iterator = if self.peek().identifier_text().is_some()
                && matches!(self.peek_at(1), TokenType::Pipe)
            {
                let name = self.expect_identifier()?;
                self.advance(); // `|`
                Some(name)
            } else {
                None
            };
            let body = self.parse_expression()?;
            self.expect(TokenType::RightParen)?;
            Ok(Expr::CollectionCall {
                source: Box::new(source),
                op,
                iterator,
                body: Some(Box::new(body)),
            })
        } else {
            // Optional empty argument list: `->size()` or `->size`.
            if self.matches(&TokenType::LeftParen) {
                self.expect(TokenType::RightParen)?;
            }
            Ok(Expr::CollectionCall {
                source: Box::new(source),
                op,
                iterator: None,
                body: None,
            })
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let pos = self.position();
        match self.peek().clone() {
            TokenType::Integer(value) => {
                self.advance();
                Ok(Expr::Integer(value))
            }
            TokenType::Real(value) => {
                self.advance();
                Ok(Expr::Real(value))
            }
            TokenType::String(value) => {
                self.advance();
                Ok(Expr::String(value))
            }
            TokenType::Boolean(value) => {
                self.advance();
                Ok(Expr::Boolean(value))
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenType::RightParen)?;
                Ok(expr)
            }
            TokenType::Identifier(name) => {
                self.advance();
                self.finish_name(name)
            }
            // Keyword spellings double as variable and call names; models
            // routinely collide with the reserved set.
            TokenType::Keyword(kw) => {
                self.advance();
                self.finish_name(kw.as_str().to_string())
            }
            other => Err(ParseError::malformed_expression(
                format!("expected an expression, found {}", other.describe()),
                pos,
            )),
        }
    }

    /// A bare name is a variable reference; a name followed by `(` is a call.
    fn finish_name(&mut self, name: String) -> ParseResult<Expr> {
        if self.matches(&TokenType::LeftParen) {
            let mut arguments = Vec::new();
            if !self.check(&TokenType::RightParen) {
                loop {
                    arguments.push(self.parse_expression()?);
                    if !self.matches(&TokenType::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenType::RightParen)?;
            Ok(Expr::Call { name, arguments })
        } else {
            Ok(Expr::Variable(name))
        }
    }
}
