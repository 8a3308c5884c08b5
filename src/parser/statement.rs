//! Block and statement parsing.
//!
//! A block ends, without consuming the delimiter, at `[/`, `[else`, or
//! `[elseif`; the enclosing construct consumes its own closing tag. A block
//! whose content starts on the line after the opening directive is not
//! inlined: the directive's trailing newline belongs to the directive, and
//! the block body gains an indentation level.

use crate::ast::expr::Expr;
use crate::ast::stmt::{Binding, Block, FileMode, Statement, Variable};
use crate::error::{ParseError, ParseResult};
use crate::token::{Keyword, TokenType};

use super::Parser;

impl Parser {
    /// A template or macro body: parsed like any block, but it writes at the
    /// base indentation. Starting it on a new line only strips that newline.
    pub(super) fn parse_declaration_body(&mut self) -> ParseResult<Block> {
        let mut block = self.parse_block()?;
        block.inlined = true;
        Ok(block)
    }

    pub(super) fn parse_block(&mut self) -> ParseResult<Block> {
        let mut statements = Vec::new();
        let mut inlined = true;
        let mut first = true;
        loop {
            match self.peek().clone() {
                TokenType::Text(text) => {
                    self.advance();
                    let mut text = text;
                    if first && text.starts_with('\n') {
                        inlined = false;
                        text.remove(0);
                    }
                    push_text_statements(&mut statements, &text);
                }
                TokenType::LeftBracket => match self.peek_at(1) {
                    TokenType::Slash
                    | TokenType::Keyword(Keyword::Else)
                    | TokenType::Keyword(Keyword::Elseif) => break,
                    _ => {
                        let statement = self.parse_directive()?;
                        // A close tag standing on its own line owns the
                        // line break that follows it.
                        if closing_swallows_newline(&statement) {
                            self.swallow_newline();
                        }
                        statements.push(statement);
                    }
                },
                TokenType::Eof => break,
                other => {
                    return Err(ParseError::invalid_syntax(
                        format!("unexpected {} in block", other.describe()),
                        self.position(),
                    ));
                }
            }
            first = false;
        }
        Ok(Block::new(statements, inlined))
    }

    /// One `[ ... ]` directive inside a block. Comments yield a statement that
    /// produces no output.
    fn parse_directive(&mut self) -> ParseResult<Statement> {
        self.expect(TokenType::LeftBracket)?;
        match self.peek().clone() {
            TokenType::Comment(text) => {
                self.advance();
                self.expect(TokenType::RightBracket)?;
                Ok(Statement::Comment { value: text })
            }
            TokenType::Keyword(Keyword::If) => self.parse_if(),
            TokenType::Keyword(Keyword::For) => self.parse_for(),
            TokenType::Keyword(Keyword::Let) => self.parse_let(),
            TokenType::Keyword(Keyword::File) => self.parse_file(),
            TokenType::Keyword(Keyword::Protected) => self.parse_protected_area(),
            TokenType::Identifier(name)
                if name == "trace" && matches!(self.peek_at(1), TokenType::LeftParen) =>
            {
                self.parse_trace()
            }
            TokenType::Identifier(name)
                if self.module().macros.contains_key(&name)
                    && matches!(self.peek_at(1), TokenType::LeftParen) =>
            {
                self.parse_macro_invocation(&name)
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Statement> {
        let expr = self.parse_expression()?;
        if self.check(&TokenType::Slash) && matches!(self.peek_at(1), TokenType::RightBracket) {
            self.advance();
        }
        self.expect(TokenType::RightBracket)?;
        Ok(Statement::Expression { expr, newline_needed: false })
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        self.expect_keyword(Keyword::If)?;
        self.expect(TokenType::LeftParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenType::RightParen)?;
        self.expect(TokenType::RightBracket)?;
        let then_block = self.parse_block()?;

        let mut elseif_clauses = Vec::new();
        let mut else_block = None;
        loop {
            self.expect(TokenType::LeftBracket)?;
            match self.peek() {
                TokenType::Keyword(Keyword::Elseif) => {
                    self.advance();
                    self.expect(TokenType::LeftParen)?;
                    let clause_condition = self.parse_expression()?;
                    self.expect(TokenType::RightParen)?;
                    self.expect(TokenType::RightBracket)?;
                    let clause_block = self.parse_block()?;
                    elseif_clauses.push((clause_condition, clause_block));
                }
                TokenType::Keyword(Keyword::Else) => {
                    self.advance();
                    self.expect(TokenType::RightBracket)?;
                    else_block = Some(self.parse_block()?);
                    self.expect(TokenType::Slash)?;
                    self.expect_keyword(Keyword::If)?;
                    self.expect(TokenType::RightBracket)?;
                    break;
                }
                TokenType::Slash => {
                    self.advance();
                    self.expect_keyword(Keyword::If)?;
                    self.expect(TokenType::RightBracket)?;
                    break;
                }
                other => {
                    return Err(ParseError::invalid_syntax(
                        format!("expected elseif, else, or /if, found {}", other.describe()),
                        self.position(),
                    ));
                }
            }
        }
        Ok(Statement::If { condition, then_block, elseif_clauses, else_block })
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        self.expect_keyword(Keyword::For)?;
        self.expect(TokenType::LeftParen)?;
        let name = self.expect_identifier()?;
        let type_name = if self.check(&TokenType::Colon) {
            self.advance();
            Some(self.parse_type_ref()?)
        } else {
            None
        };
        self.expect_keyword(Keyword::In)?;
        let collection = self.parse_expression()?;
        self.expect(TokenType::RightParen)?;
        let separator = if self.matches(&TokenType::Keyword(Keyword::Separator)) {
            self.expect(TokenType::LeftParen)?;
            let sep = self.parse_expression()?;
            self.expect(TokenType::RightParen)?;
            Some(sep)
        } else {
            None
        };
        self.expect(TokenType::RightBracket)?;
        let body = self.parse_block()?;
        self.expect_close_keyword(Keyword::For)?;
        Ok(Statement::For {
            variable: Variable::new(name, type_name),
            collection,
            separator,
            body,
        })
    }

    fn parse_let(&mut self) -> ParseResult<Statement> {
        self.expect_keyword(Keyword::Let)?;
        let mut bindings = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let type_name = if self.check(&TokenType::Colon) {
                self.advance();
                Some(self.parse_type_ref()?)
            } else {
                None
            };
            self.expect(TokenType::Equals)?;
            let init = self.parse_expression()?;
            bindings.push(Binding { variable: Variable::new(name, type_name), init });
            if !self.matches(&TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RightBracket)?;
        let body = self.parse_block()?;
        self.expect_close_keyword(Keyword::Let)?;
        Ok(Statement::Let { bindings, body })
    }

    fn parse_file(&mut self) -> ParseResult<Statement> {
        self.expect_keyword(Keyword::File)?;
        self.expect(TokenType::LeftParen)?;
        let url = self.parse_expression()?;
        let mut mode = FileMode::Overwrite;
        let mut charset = None;
        if self.matches(&TokenType::Comma) {
            mode = self.parse_file_mode()?;
            if self.matches(&TokenType::Comma) {
                charset = Some(self.parse_expression()?);
            }
        }
        self.expect(TokenType::RightParen)?;
        self.expect(TokenType::RightBracket)?;
        let body = self.parse_block()?;
        self.expect_close_keyword(Keyword::File)?;
        Ok(Statement::File { url, mode, charset, body })
    }

    /// The mode argument is an expression in the source dialect; literal
    /// forms are promoted to a real mode here, anything else falls back to
    /// overwrite. Booleans follow the Acceleo convention (true = append).
    fn parse_file_mode(&mut self) -> ParseResult<FileMode> {
        match self.peek() {
            TokenType::Keyword(Keyword::Overwrite) => {
                self.advance();
                return Ok(FileMode::Overwrite);
            }
            TokenType::Keyword(Keyword::Append) => {
                self.advance();
                return Ok(FileMode::Append);
            }
            TokenType::Keyword(Keyword::Create) => {
                self.advance();
                return Ok(FileMode::Create);
            }
            _ => {}
        }
        let expr = self.parse_expression()?;
        let mode = match &expr {
            Expr::String(s) if s == "append" => FileMode::Append,
            Expr::String(s) if s == "create" => FileMode::Create,
            Expr::Boolean(true) => FileMode::Append,
            _ => FileMode::Overwrite,
        };
        Ok(mode)
    }

    fn parse_protected_area(&mut self) -> ParseResult<Statement> {
        self.expect_keyword(Keyword::Protected)?;
        self.expect(TokenType::LeftParen)?;
        let id = self.parse_expression()?;
        let mut start_prefix = None;
        let mut end_prefix = None;
        if self.matches(&TokenType::Comma) {
            start_prefix = Some(self.parse_expression()?);
            if self.matches(&TokenType::Comma) {
                end_prefix = Some(self.parse_expression()?);
            }
        }
        self.expect(TokenType::RightParen)?;
        self.expect(TokenType::RightBracket)?;
        let body = self.parse_block()?;
        self.expect_close_keyword(Keyword::Protected)?;
        Ok(Statement::ProtectedArea { id, start_prefix, end_prefix, body })
    }

    /// `[trace (expr)] ... [/trace]`. Distinguished from a call to a query
    /// named `trace` by the missing `/` before the closing bracket.
    fn parse_trace(&mut self) -> ParseResult<Statement> {
        let checkpoint = self.checkpoint();
        self.advance(); // `trace`
        self.expect(TokenType::LeftParen)?;
        let source = self.parse_expression()?;
        self.expect(TokenType::RightParen)?;
        if !self.check(&TokenType::RightBracket) {
            self.restore(checkpoint);
            return self.parse_expression_statement();
        }
        self.advance();
        let body = self.parse_block()?;
        self.expect_close_name("trace")?;
        Ok(Statement::Trace { source, body })
    }

    fn parse_macro_invocation(&mut self, name: &str) -> ParseResult<Statement> {
        self.advance(); // macro name
        self.expect(TokenType::LeftParen)?;
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

        let takes_body = self
            .module()
            .macros
            .get(name)
            .is_some_and(|m| m.body_parameter.is_some());
        let body_content = if takes_body {
            self.expect(TokenType::RightBracket)?;
            let body = self.parse_block()?;
            self.expect_close_name(name)?;
            Some(body)
        } else {
            if self.check(&TokenType::Slash) && matches!(self.peek_at(1), TokenType::RightBracket)
            {
                self.advance();
            }
            self.expect(TokenType::RightBracket)?;
            None
        };
        Ok(Statement::MacroInvocation {
            name: name.to_string(),
            arguments,
            body_content,
        })
    }

    fn checkpoint(&self) -> usize {
        self.current
    }

    fn restore(&mut self, checkpoint: usize) {
        self.current = checkpoint;
    }

    /// Drop a single line break from the text token at the cursor, if any.
    fn swallow_newline(&mut self) {
        if let TokenType::Text(text) = &mut self.tokens[self.current].token_type {
            if text.starts_with('\n') {
                text.remove(0);
                if text.is_empty() {
                    self.current += 1;
                }
            }
        }
    }
}

/// Whether the statement's closing tag ended a body that started on its own
/// line; such a tag owns the line break after it.
fn closing_swallows_newline(statement: &Statement) -> bool {
    match statement {
        Statement::If { then_block, elseif_clauses, else_block, .. } => {
            let last = else_block
                .as_ref()
                .or_else(|| elseif_clauses.last().map(|(_, block)| block))
                .unwrap_or(then_block);
            !last.inlined
        }
        Statement::For { body, .. }
        | Statement::Let { body, .. }
        | Statement::File { body, .. }
        | Statement::ProtectedArea { body, .. }
        | Statement::Trace { body, .. } => !body.inlined,
        Statement::MacroInvocation { body_content: Some(body), .. } => !body.inlined,
        _ => false,
    }
}

/// Split raw inter-directive text into `Text` and `NewLine` statements, one
/// per source line. The statements themselves never span lines.
fn push_text_statements(statements: &mut Vec<Statement>, text: &str) {
    let lines: Vec<&str> = text.split('\n').collect();
    for (i, line) in lines.iter().enumerate() {
        let is_last = i + 1 == lines.len();
        if !is_last {
            if line.is_empty() {
                statements.push(Statement::NewLine { indentation_needed: true });
            } else {
                statements.push(Statement::Text {
                    value: (*line).to_string(),
                    newline_needed: true,
                });
            }
        } else if !line.is_empty() {
            statements.push(Statement::Text {
                value: (*line).to_string(),
                newline_needed: false,
            });
        }
    }
}
