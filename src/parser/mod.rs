//! Recursive-descent parser over the lexer's token stream.
//!
//! The parser owns the module under construction: declarations are inserted
//! into its dictionaries as they complete, which is also what lets a later
//! directive recognise an already-declared macro by name.

mod expression;
mod statement;

#[cfg(test)]
mod tests;

use crate::ast::module::{Macro, Module, Parameter, Query, Template, Visibility};
use crate::error::{ParseError, ParseErrorKind, ParseResult};
use crate::lexer;
use crate::token::{Keyword, Position, Token, TokenType};

/// Parse a complete template source into a module.
pub fn parse_module(source: &str) -> ParseResult<Module> {
    let tokens = lexer::tokenize(source)?;
    Parser::new(tokens).run()
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    module: Module,
    /// Comment immediately preceding a declaration, attached as its
    /// documentation.
    pending_doc: Option<String>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(
            tokens.last().map(|t| &t.token_type),
            Some(TokenType::Eof)
        ));
        Parser {
            tokens,
            current: 0,
            module: Module::new(""),
            pending_doc: None,
        }
    }

    // Token helpers

    pub(super) fn peek(&self) -> &TokenType {
        &self.tokens[self.current.min(self.tokens.len() - 1)].token_type
    }

    pub(super) fn peek_at(&self, offset: usize) -> &TokenType {
        let at = (self.current + offset).min(self.tokens.len() - 1);
        &self.tokens[at].token_type
    }

    pub(super) fn position(&self) -> Position {
        self.tokens[self.current.min(self.tokens.len() - 1)].position
    }

    pub(super) fn advance(&mut self) -> TokenType {
        let token = self.tokens[self.current.min(self.tokens.len() - 1)]
            .token_type
            .clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }

    pub(super) fn at_end(&self) -> bool {
        matches!(self.peek(), TokenType::Eof)
    }

    pub(super) fn check(&self, token_type: &TokenType) -> bool {
        self.peek() == token_type
    }

    /// Consume the token when it matches.
    pub(super) fn matches(&mut self, token_type: &TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(super) fn expect(&mut self, token_type: TokenType) -> ParseResult<()> {
        if self.check(&token_type) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::invalid_syntax(
                format!("expected {}, found {}", token_type.describe(), self.peek().describe()),
                self.position(),
            ))
        }
    }

    pub(super) fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<()> {
        self.expect(TokenType::Keyword(keyword))
    }

    /// Accept an identifier, including any keyword spelling: models routinely
    /// carry names that collide with the reserved set.
    pub(super) fn expect_identifier(&mut self) -> ParseResult<String> {
        match self.peek().identifier_text() {
            Some(name) => {
                let name = name.to_string();
                self.advance();
                Ok(name)
            }
            None => Err(ParseError::invalid_syntax(
                format!("expected an identifier, found {}", self.peek().describe()),
                self.position(),
            )),
        }
    }

    pub(super) fn module(&self) -> &Module {
        &self.module
    }

    // Module-level parsing

    fn run(mut self) -> ParseResult<Module> {
        self.skip_free_text();
        self.parse_module_header()?;
        while !self.at_end() {
            match self.peek() {
                TokenType::Text(_) => {
                    self.advance();
                }
                TokenType::LeftBracket => self.parse_declaration()?,
                other => {
                    return Err(ParseError::invalid_syntax(
                        format!("expected a declaration, found {}", other.describe()),
                        self.position(),
                    ));
                }
            }
        }
        Ok(self.module)
    }

    fn skip_free_text(&mut self) {
        while matches!(self.peek(), TokenType::Text(_)) {
            self.advance();
        }
    }

    fn parse_module_header(&mut self) -> ParseResult<()> {
        self.expect(TokenType::LeftBracket)?;
        self.expect_keyword(Keyword::Module)?;
        let name_pos = self.position();
        let name = self.expect_identifier()?;
        if name.is_empty() {
            return Err(ParseError::new(
                ParseErrorKind::MissingAttribute {
                    attribute: "name".to_string(),
                    element: "module".to_string(),
                },
                name_pos,
            ));
        }
        self.module.name = name;
        self.expect(TokenType::LeftParen)?;
        loop {
            let pos = self.position();
            match self.advance() {
                TokenType::String(uri) => {
                    self.module.metamodels.insert(uri.clone(), uri);
                }
                other => {
                    return Err(ParseError::invalid_syntax(
                        format!("expected a metamodel uri string, found {}", other.describe()),
                        pos,
                    ));
                }
            }
            if !self.matches(&TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RightParen)?;
        self.expect(TokenType::RightBracket)?;
        Ok(())
    }

    fn parse_declaration(&mut self) -> ParseResult<()> {
        self.expect(TokenType::LeftBracket)?;
        match self.peek().clone() {
            TokenType::Comment(text) => {
                self.advance();
                self.expect(TokenType::RightBracket)?;
                self.pending_doc = Some(text.trim().to_string());
                Ok(())
            }
            TokenType::Keyword(Keyword::Template) => self.parse_template(),
            TokenType::Keyword(Keyword::Query) => self.parse_query(),
            TokenType::Keyword(Keyword::Macro) => self.parse_macro(),
            TokenType::Identifier(name) if name == "import" => {
                self.advance();
                let imported = self.expect_identifier()?;
                self.expect(TokenType::RightBracket)?;
                self.module.imports.push(imported);
                Ok(())
            }
            TokenType::Identifier(name) if name == "extends" => {
                let pos = self.position();
                self.advance();
                let parent = self.expect_identifier()?;
                self.expect(TokenType::RightBracket)?;
                if self.module.extends.is_some() {
                    return Err(ParseError::invalid_syntax("duplicate extends clause", pos));
                }
                self.module.extends = Some(parent);
                Ok(())
            }
            other => Err(ParseError::new(
                ParseErrorKind::UnknownStatementType {
                    name: other
                        .identifier_text()
                        .map(str::to_string)
                        .unwrap_or_else(|| other.describe()),
                },
                self.position(),
            )),
        }
    }

    /// Visibility applies only when the keyword is not itself the declared
    /// name (`[template protected(...)]` names a template "protected").
    fn parse_visibility(&mut self) -> Visibility {
        let vis = match self.peek() {
            TokenType::Keyword(Keyword::Public) => Visibility::Public,
            TokenType::Keyword(Keyword::Private) => Visibility::Private,
            TokenType::Keyword(Keyword::Protected) => Visibility::Protected,
            _ => return Visibility::Public,
        };
        if matches!(self.peek_at(1), TokenType::LeftParen) {
            return Visibility::Public;
        }
        self.advance();
        vis
    }

    fn parse_template(&mut self) -> ParseResult<()> {
        self.expect_keyword(Keyword::Template)?;
        let visibility = self.parse_visibility();
        let name_pos = self.position();
        let name = self.expect_identifier()?;
        let parameters = self.parse_parameters()?;

        let mut is_main = false;
        let mut overrides = None;
        let mut guard = None;
        let mut post = None;
        loop {
            match self.peek() {
                TokenType::Keyword(Keyword::Main) => {
                    self.advance();
                    is_main = true;
                }
                TokenType::Keyword(Keyword::Overrides) => {
                    self.advance();
                    overrides = Some(self.expect_identifier()?);
                }
                TokenType::Keyword(Keyword::Guard) | TokenType::Question => {
                    self.advance();
                    self.expect(TokenType::LeftParen)?;
                    guard = Some(self.parse_expression()?);
                    self.expect(TokenType::RightParen)?;
                }
                TokenType::Keyword(Keyword::Post) => {
                    self.advance();
                    self.expect(TokenType::LeftParen)?;
                    post = Some(self.parse_expression()?);
                    self.expect(TokenType::RightParen)?;
                }
                _ => break,
            }
        }
        self.expect(TokenType::RightBracket)?;
        let body = self.parse_declaration_body()?;
        self.expect_close_keyword(Keyword::Template)?;

        let template = Template {
            name: name.clone(),
            visibility,
            parameters,
            guard,
            post,
            body,
            is_main,
            overrides,
            documentation: self.pending_doc.take(),
        };
        if self.module.templates.contains_key(&name) {
            return Err(ParseError::duplicate("template", name, name_pos));
        }
        self.module.templates.insert(name, template);
        Ok(())
    }

    fn parse_query(&mut self) -> ParseResult<()> {
        self.expect_keyword(Keyword::Query)?;
        let visibility = self.parse_visibility();
        let name_pos = self.position();
        let name = self.expect_identifier()?;
        let parameters = self.parse_parameters()?;
        self.expect(TokenType::Colon)?;
        let return_type = self.parse_type_ref()?;
        self.expect(TokenType::Equals)?;
        let body = self.parse_expression()?;
        if self.check(&TokenType::Slash) && matches!(self.peek_at(1), TokenType::RightBracket) {
            self.advance();
        }
        self.expect(TokenType::RightBracket)?;

        let query = Query {
            name: name.clone(),
            visibility,
            parameters,
            return_type,
            body,
            documentation: self.pending_doc.take(),
        };
        if self.module.queries.contains_key(&name) {
            return Err(ParseError::duplicate("query", name, name_pos));
        }
        self.module.queries.insert(name, query);
        Ok(())
    }

    fn parse_macro(&mut self) -> ParseResult<()> {
        self.expect_keyword(Keyword::Macro)?;
        let name_pos = self.position();
        let name = self.expect_identifier()?;

        self.expect(TokenType::LeftParen)?;
        let mut parameters = Vec::new();
        let mut body_parameter = None;
        if !self.check(&TokenType::RightParen) && !self.check(&TokenType::Pipe) {
            loop {
                parameters.push(self.parse_parameter()?);
                if !self.matches(&TokenType::Comma) {
                    break;
                }
            }
        }
        if self.matches(&TokenType::Pipe) {
            let param_pos = self.position();
            let body_name = self.expect_identifier()?;
            if parameters.iter().any(|p| p.name == body_name) {
                return Err(ParseError::duplicate("macro parameter", body_name, param_pos));
            }
            body_parameter = Some(body_name);
        }
        self.expect(TokenType::RightParen)?;
        self.check_unique_parameters(&parameters, name_pos)?;
        self.expect(TokenType::RightBracket)?;

        let body = self.parse_declaration_body()?;
        self.expect_close_keyword(Keyword::Macro)?;

        let macro_def = Macro {
            name: name.clone(),
            parameters,
            body_parameter,
            body,
            documentation: self.pending_doc.take(),
        };
        if self.module.macros.contains_key(&name) {
            return Err(ParseError::duplicate("macro", name, name_pos));
        }
        self.module.macros.insert(name, macro_def);
        Ok(())
    }

    fn parse_parameters(&mut self) -> ParseResult<Vec<Parameter>> {
        self.expect(TokenType::LeftParen)?;
        let mut parameters = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                parameters.push(self.parse_parameter()?);
                if !self.matches(&TokenType::Comma) {
                    break;
                }
            }
        }
        let close_pos = self.position();
        self.expect(TokenType::RightParen)?;
        self.check_unique_parameters(&parameters, close_pos)?;
        Ok(parameters)
    }

    fn parse_parameter(&mut self) -> ParseResult<Parameter> {
        let name = self.expect_identifier()?;
        self.expect(TokenType::Colon)?;
        let type_name = self.parse_type_ref()?;
        Ok(Parameter { name, type_name })
    }

    fn check_unique_parameters(
        &self,
        parameters: &[Parameter],
        pos: Position,
    ) -> ParseResult<()> {
        for (i, p) in parameters.iter().enumerate() {
            if parameters[..i].iter().any(|q| q.name == p.name) {
                return Err(ParseError::duplicate("parameter", p.name.clone(), pos));
            }
        }
        Ok(())
    }

    /// A type reference: `Ident`, `pkg::Ident`, or a collection form such as
    /// `Sequence(String)`. Kept as the written string.
    pub(super) fn parse_type_ref(&mut self) -> ParseResult<String> {
        let mut type_name = self.expect_identifier()?;
        loop {
            if self.check(&TokenType::Colon) && matches!(self.peek_at(1), TokenType::Colon) {
                self.advance();
                self.advance();
                type_name.push_str("::");
                type_name.push_str(&self.expect_identifier()?);
            } else if self.matches(&TokenType::LeftParen) {
                let inner = self.parse_type_ref()?;
                self.expect(TokenType::RightParen)?;
                type_name = format!("{}({})", type_name, inner);
            } else {
                return Ok(type_name);
            }
        }
    }

    pub(super) fn expect_close_keyword(&mut self, keyword: Keyword) -> ParseResult<()> {
        self.expect(TokenType::LeftBracket)?;
        self.expect(TokenType::Slash)?;
        self.expect_keyword(keyword)?;
        self.expect(TokenType::RightBracket)
    }

    pub(super) fn expect_close_name(&mut self, name: &str) -> ParseResult<()> {
        self.expect(TokenType::LeftBracket)?;
        self.expect(TokenType::Slash)?;
        let pos = self.position();
        let found = self.expect_identifier()?;
        if found != name {
            return Err(ParseError::invalid_syntax(
                format!("expected closing tag for '{}', found '{}'", name, found),
                pos,
            ));
        }
        self.expect(TokenType::RightBracket)
    }
}
