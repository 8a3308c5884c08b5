//! Parse-time and run-time error taxonomies.

use crate::token::Position;

pub type ParseResult<T> = Result<T, ParseError>;
pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    InvalidSyntax { message: String },
    UnknownStatementType { name: String },
    MalformedExpression { message: String },
    MissingAttribute { attribute: String, element: String },
    DuplicateName { kind: &'static str, name: String },
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: Position) -> Self {
        Self { kind, position }
    }

    pub fn invalid_syntax(message: impl Into<String>, position: Position) -> Self {
        Self::new(ParseErrorKind::InvalidSyntax { message: message.into() }, position)
    }

    pub fn malformed_expression(message: impl Into<String>, position: Position) -> Self {
        Self::new(
            ParseErrorKind::MalformedExpression { message: message.into() },
            position,
        )
    }

    pub fn duplicate(kind: &'static str, name: impl Into<String>, position: Position) -> Self {
        Self::new(ParseErrorKind::DuplicateName { kind, name: name.into() }, position)
    }

    /// Render the error together with the offending source line and a caret
    /// pointing at the reported column.
    pub fn display_with_source(&self, source: &str) -> String {
        let line_content = source
            .lines()
            .nth(self.position.line.saturating_sub(1))
            .unwrap_or("");
        let col = self.position.column.max(1);
        let underline = format!("{}^", " ".repeat(col - 1));
        format!(
            "error: {}\n{:4} | {}\n     | {}",
            self, self.position.line, line_content, underline
        )
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ParseErrorKind::InvalidSyntax { message } => {
                write!(f, "{}: {}", self.position, message)
            }
            ParseErrorKind::UnknownStatementType { name } => {
                write!(f, "{}: unknown statement type '{}'", self.position, name)
            }
            ParseErrorKind::MalformedExpression { message } => {
                write!(f, "{}: malformed expression: {}", self.position, message)
            }
            ParseErrorKind::MissingAttribute { attribute, element } => {
                write!(
                    f,
                    "{}: {} is missing required attribute '{}'",
                    self.position, element, attribute
                )
            }
            ParseErrorKind::DuplicateName { kind, name } => {
                write!(f, "{}: duplicate {} name '{}'", self.position, kind, name)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors raised while executing a parsed module.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecError {
    TemplateNotFound { name: String },
    QueryNotFound { name: String },
    MacroNotFound { name: String },
    ModuleNotFound { name: String },
    VariableNotFound { name: String },
    TypeError { message: String },
    InvalidOperation { message: String },
    FileError { message: String },
    PostConditionFailed { template: String },
    ProtectedAreaConflict { message: String },
    NoTemplates,
    Cancelled,
}

impl ExecError {
    pub fn type_error(message: impl Into<String>) -> Self {
        ExecError::TypeError { message: message.into() }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        ExecError::InvalidOperation { message: message.into() }
    }

    pub fn file_error(message: impl Into<String>) -> Self {
        ExecError::FileError { message: message.into() }
    }
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::TemplateNotFound { name } => write!(f, "template '{}' not found", name),
            ExecError::QueryNotFound { name } => write!(f, "query '{}' not found", name),
            ExecError::MacroNotFound { name } => write!(f, "macro '{}' not found", name),
            ExecError::ModuleNotFound { name } => write!(f, "module '{}' not found", name),
            ExecError::VariableNotFound { name } => write!(f, "variable '{}' not found", name),
            ExecError::TypeError { message } => write!(f, "type error: {}", message),
            ExecError::InvalidOperation { message } => write!(f, "invalid operation: {}", message),
            ExecError::FileError { message } => write!(f, "file error: {}", message),
            ExecError::PostConditionFailed { template } => {
                write!(f, "post-condition failed for template '{}'", template)
            }
            ExecError::ProtectedAreaConflict { message } => {
                write!(f, "protected area conflict: {}", message)
            }
            ExecError::NoTemplates => write!(f, "module declares no templates"),
            ExecError::Cancelled => write!(f, "generation cancelled"),
        }
    }
}

impl std::error::Error for ExecError {}

/// Either taxonomy, for callers that drive parse and generate together.
#[derive(Debug, Clone, PartialEq)]
pub enum WeftError {
    Parse(ParseError),
    Exec(ExecError),
}

impl std::fmt::Display for WeftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeftError::Parse(e) => write!(f, "{}", e),
            WeftError::Exec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for WeftError {}

impl From<ParseError> for WeftError {
    fn from(e: ParseError) -> Self {
        WeftError::Parse(e)
    }
}

impl From<ExecError> for WeftError {
    fn from(e: ExecError) -> Self {
        WeftError::Exec(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_carries_position() {
        let error = ParseError::invalid_syntax("unexpected ']'", Position::new(3, 7));
        assert_eq!(error.position.line, 3);
        assert_eq!(error.position.column, 7);
        assert!(error.to_string().contains("3:7"));
    }

    #[test]
    fn display_with_source_underlines_column() {
        let source = "line one\n[template ]\nline three";
        let error = ParseError::invalid_syntax("expected an identifier", Position::new(2, 11));
        let rendered = error.display_with_source(source);
        assert!(rendered.contains("[template ]"), "{}", rendered);
        assert!(rendered.contains("          ^"), "{}", rendered);
    }

    #[test]
    fn exec_error_messages_name_the_subject() {
        let error = ExecError::TemplateNotFound { name: "header".to_string() };
        assert_eq!(error.to_string(), "template 'header' not found");
    }
}
