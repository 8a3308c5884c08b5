//! Statement and block types. Statements are a closed sum; the interpreter
//! dispatches with an exhaustive match.

use serde::Serialize;

use super::expr::Expr;

/// How a `file` block opens its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileMode {
    Overwrite,
    Append,
    Create,
}

impl FileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::Overwrite => "overwrite",
            FileMode::Append => "append",
            FileMode::Create => "create",
        }
    }
}

/// A declared variable: name plus optional type annotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub type_name: Option<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>, type_name: Option<String>) -> Self {
        Self { name: name.into(), type_name }
    }
}

/// One `name = init` pair in a `let`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    pub variable: Variable,
    pub init: Expr,
}

/// An ordered statement sequence. A non-inlined block (one whose content
/// starts on a line of its own) pushes an indentation level on entry and pops
/// it on exit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub inlined: bool,
}

impl Block {
    pub fn new(statements: Vec<Statement>, inlined: bool) -> Self {
        Self { statements, inlined }
    }

    pub fn empty() -> Self {
        Self { statements: Vec::new(), inlined: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    Text {
        value: String,
        newline_needed: bool,
    },
    Expression {
        expr: Expr,
        newline_needed: bool,
    },
    NewLine {
        indentation_needed: bool,
    },
    /// Consumed at parse time in declaration position, kept here for block
    /// bodies; produces no output.
    Comment { value: String },
    If {
        condition: Expr,
        then_block: Block,
        elseif_clauses: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },
    For {
        variable: Variable,
        collection: Expr,
        separator: Option<Expr>,
        body: Block,
    },
    Let {
        bindings: Vec<Binding>,
        body: Block,
    },
    File {
        url: Expr,
        mode: FileMode,
        charset: Option<Expr>,
        body: Block,
    },
    ProtectedArea {
        id: Expr,
        start_prefix: Option<Expr>,
        end_prefix: Option<Expr>,
        body: Block,
    },
    Trace {
        source: Expr,
        body: Block,
    },
    MacroInvocation {
        name: String,
        arguments: Vec<Expr>,
        body_content: Option<Block>,
    },
}

impl Statement {
    pub fn text(value: impl Into<String>, newline_needed: bool) -> Self {
        Statement::Text { value: value.into(), newline_needed }
    }
}
