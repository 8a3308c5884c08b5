//! Dual-mode tokeniser for template source.
//!
//! Outside directives the lexer accumulates literal text; `[` flushes the
//! buffer and switches to directive mode, where whitespace is insignificant
//! and `]` switches back. Positions are 1-based (line, column).

use crate::error::{ParseError, ParseResult};
use crate::token::{Keyword, Position, Token, TokenType};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    /// Tokenise the whole source. A terminal `Eof` token is always appended.
    pub fn tokenize(mut self) -> ParseResult<Vec<Token>> {
        loop {
            self.scan_text();
            if self.peek().is_none() {
                break;
            }
            // Inside a directive until `]` or end of input.
            let terminated = self.scan_directive()?;
            if !terminated {
                break;
            }
        }
        let at = self.position();
        self.tokens.push(Token::new(TokenType::Eof, at));
        Ok(self.tokens)
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, token_type: TokenType, at: Position) {
        self.tokens.push(Token::new(token_type, at));
    }

    /// Text mode: accumulate until `[` or end of input. The `[` itself is
    /// emitted here so directive mode starts past it.
    fn scan_text(&mut self) {
        let start = self.position();
        let mut buffer = String::new();
        while let Some(c) = self.peek() {
            if c == '[' {
                break;
            }
            buffer.push(c);
            self.advance();
        }
        if !buffer.is_empty() {
            self.push(TokenType::Text(buffer), start);
        }
        if self.peek() == Some('[') {
            let at = self.position();
            self.advance();
            self.push(TokenType::LeftBracket, at);
        }
    }

    /// Directive mode: produce tokens until `]` (returns true) or end of
    /// input (returns false).
    fn scan_directive(&mut self) -> ParseResult<bool> {
        loop {
            while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
                self.advance();
            }
            let at = self.position();
            let Some(c) = self.peek() else {
                return Ok(false);
            };
            match c {
                ']' => {
                    self.advance();
                    self.push(TokenType::RightBracket, at);
                    return Ok(true);
                }
                '-' if self.peek_at(1) == Some('-') => {
                    self.advance();
                    self.advance();
                    let mut text = String::new();
                    while let Some(c) = self.peek() {
                        if c == ']' || c == '\n' {
                            break;
                        }
                        text.push(c);
                        self.advance();
                    }
                    self.push(TokenType::Comment(text), at);
                }
                '-' if self.peek_at(1) == Some('>') => {
                    self.advance();
                    self.advance();
                    self.push(TokenType::Arrow, at);
                }
                '-' if self.minus_starts_literal()
                    && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) =>
                {
                    self.advance();
                    self.scan_number(at, true)?;
                }
                '\'' => self.scan_string(at)?,
                c if c.is_ascii_digit() => self.scan_number(at, false)?,
                c if c.is_alphabetic() || c == '_' => self.scan_word(at),
                '<' => {
                    self.advance();
                    match self.peek() {
                        Some('>') => {
                            self.advance();
                            self.push(TokenType::NotEquals, at);
                        }
                        Some('=') => {
                            self.advance();
                            self.push(TokenType::LessEquals, at);
                        }
                        _ => self.push(TokenType::Less, at),
                    }
                }
                '>' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        self.push(TokenType::GreaterEquals, at);
                    } else {
                        self.push(TokenType::Greater, at);
                    }
                }
                '/' | '(' | ')' | ',' | ':' | '.' | '|' | '?' | '+' | '-' | '*' | '=' => {
                    self.advance();
                    let token_type = match c {
                        '/' => TokenType::Slash,
                        '(' => TokenType::LeftParen,
                        ')' => TokenType::RightParen,
                        ',' => TokenType::Comma,
                        ':' => TokenType::Colon,
                        '.' => TokenType::Dot,
                        '|' => TokenType::Pipe,
                        '?' => TokenType::Question,
                        '+' => TokenType::Plus,
                        '-' => TokenType::Minus,
                        '*' => TokenType::Star,
                        _ => TokenType::Equals,
                    };
                    self.push(token_type, at);
                }
                other => {
                    return Err(ParseError::invalid_syntax(
                        format!("unexpected character '{}' in directive", other),
                        at,
                    ));
                }
            }
        }
    }

    /// A `-` begins a numeric literal only where a value may start: after an
    /// opening bracket or paren, a separator, an operator, or a keyword.
    fn minus_starts_literal(&self) -> bool {
        match self.tokens.last().map(|t| &t.token_type) {
            None => true,
            Some(tt) => matches!(
                tt,
                TokenType::LeftBracket
                    | TokenType::LeftParen
                    | TokenType::Comma
                    | TokenType::Colon
                    | TokenType::Pipe
                    | TokenType::Question
                    | TokenType::Plus
                    | TokenType::Minus
                    | TokenType::Star
                    | TokenType::Slash
                    | TokenType::Equals
                    | TokenType::Less
                    | TokenType::Greater
                    | TokenType::LessEquals
                    | TokenType::GreaterEquals
                    | TokenType::NotEquals
                    | TokenType::Arrow
                    | TokenType::Keyword(_)
            ),
        }
    }

    /// Integer or real literal. A `.` is consumed only when a digit follows.
    fn scan_number(&mut self, at: Position, negative: bool) -> ParseResult<()> {
        let mut text = String::new();
        if negative {
            text.push('-');
        }
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.advance();
        }
        let is_real = self.peek() == Some('.')
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit());
        if is_real {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                text.push(c);
                self.advance();
            }
            let value: f64 = text.parse().map_err(|_| {
                ParseError::invalid_syntax(format!("invalid real literal '{}'", text), at)
            })?;
            self.push(TokenType::Real(value), at);
        } else {
            let value: i64 = text.parse().map_err(|_| {
                ParseError::invalid_syntax(format!("invalid integer literal '{}'", text), at)
            })?;
            self.push(TokenType::Integer(value), at);
        }
        Ok(())
    }

    /// Single-quoted string literal. `''` is a literal quote; `\n \t \r \\
    /// \'` are escapes; any other escaped character is taken literally.
    fn scan_string(&mut self, at: Position) -> ParseResult<()> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::invalid_syntax("unterminated string literal", at));
                }
                Some('\'') => {
                    if self.peek_at(1) == Some('\'') {
                        value.push('\'');
                        self.advance();
                        self.advance();
                    } else {
                        self.advance();
                        break;
                    }
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        None => {
                            return Err(ParseError::invalid_syntax(
                                "unterminated string literal",
                                at,
                            ));
                        }
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some(other) => value.push(other),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        self.push(TokenType::String(value), at);
        Ok(())
    }

    fn scan_word(&mut self, at: Position) {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if !c.is_alphanumeric() && c != '_' {
                break;
            }
            word.push(c);
            self.advance();
        }
        let token_type = match word.as_str() {
            "true" => TokenType::Boolean(true),
            "false" => TokenType::Boolean(false),
            _ => match Keyword::from_ident(&word) {
                Some(kw) => TokenType::Keyword(kw),
                None => TokenType::Identifier(word),
            },
        };
        self.push(token_type, at);
    }
}

/// Tokenise a complete source text.
pub fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    Lexer::new(source).tokenize()
}
