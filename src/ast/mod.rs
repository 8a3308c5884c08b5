//! Abstract syntax tree for parsed template modules.

pub mod expr;
pub mod module;
pub mod stmt;

pub use expr::{BinaryOp, CollectionOp, Expr};
pub use module::{Macro, Module, Parameter, Query, Template, Visibility};
pub use stmt::{Binding, Block, FileMode, Statement, Variable};
