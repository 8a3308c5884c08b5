//! Expression trees for the directive sublanguage.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    And,
    Or,
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Equals => "=",
            BinaryOp::NotEquals => "<>",
            BinaryOp::LessThan => "<",
            BinaryOp::GreaterThan => ">",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::GreaterOrEqual => ">=",
        }
    }
}

/// Operations reachable through `->` navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectionOp {
    Select,
    Reject,
    Collect,
    Any,
    Exists,
    ForAll,
    Size,
    IsEmpty,
    NotEmpty,
    First,
    Last,
}

impl CollectionOp {
    pub fn name(&self) -> &'static str {
        match self {
            CollectionOp::Select => "select",
            CollectionOp::Reject => "reject",
            CollectionOp::Collect => "collect",
            CollectionOp::Any => "any",
            CollectionOp::Exists => "exists",
            CollectionOp::ForAll => "forAll",
            CollectionOp::Size => "size",
            CollectionOp::IsEmpty => "isEmpty",
            CollectionOp::NotEmpty => "notEmpty",
            CollectionOp::First => "first",
            CollectionOp::Last => "last",
        }
    }

    /// Whether the operation takes an `(iterator | body)` argument.
    pub fn takes_body(&self) -> bool {
        matches!(
            self,
            CollectionOp::Select
                | CollectionOp::Reject
                | CollectionOp::Collect
                | CollectionOp::Any
                | CollectionOp::Exists
                | CollectionOp::ForAll
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// `source.property`
    Navigation {
        source: Box<Expr>,
        property: String,
    },
    /// `source->op(...)`
    CollectionCall {
        source: Box<Expr>,
        op: CollectionOp,
        iterator: Option<String>,
        body: Option<Box<Expr>>,
    },
    /// `name(args)`: resolved against the module's queries at evaluation
    /// time; at statement level a call may also name a template or macro.
    Call {
        name: String,
        arguments: Vec<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    /// The literal string value, if this is a plain string literal.
    pub fn as_string_literal(&self) -> Option<&str> {
        match self {
            Expr::String(s) => Some(s),
            _ => None,
        }
    }
}
