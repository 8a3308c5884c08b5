//! The module AST: the top-level artifact produced by the parser, immutable
//! thereafter.

use indexmap::IndexMap;
use serde::Serialize;

use super::expr::Expr;
use super::stmt::Block;

pub const DEFAULT_ENCODING: &str = "UTF-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub name: String,
    pub visibility: Visibility,
    pub parameters: Vec<Parameter>,
    pub guard: Option<Expr>,
    pub post: Option<Expr>,
    pub body: Block,
    pub is_main: bool,
    pub overrides: Option<String>,
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub name: String,
    pub visibility: Visibility,
    pub parameters: Vec<Parameter>,
    pub return_type: String,
    pub body: Expr,
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Macro {
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// Captures the inline block passed at the invocation site, when present.
    /// Must be distinct from every regular parameter name.
    pub body_parameter: Option<String>,
    pub body: Block,
    pub documentation: Option<String>,
}

/// Dictionaries preserve insertion order; the order is observable through the
/// main-template auto-detect policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub name: String,
    /// Metamodel package URIs, keyed by alias.
    pub metamodels: IndexMap<String, String>,
    /// Unresolved `extends` clause, kept as metadata.
    pub extends: Option<String>,
    /// Unresolved `import` clauses, kept as metadata.
    pub imports: Vec<String>,
    pub templates: IndexMap<String, Template>,
    pub queries: IndexMap<String, Query>,
    pub macros: IndexMap<String, Macro>,
    pub encoding: String,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metamodels: IndexMap::new(),
            extends: None,
            imports: Vec::new(),
            templates: IndexMap::new(),
            queries: IndexMap::new(),
            macros: IndexMap::new(),
            encoding: DEFAULT_ENCODING.to_string(),
        }
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn query(&self, name: &str) -> Option<&Query> {
        self.queries.get(name)
    }

    pub fn macro_def(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    /// Auto-detect policy: the first template flagged `main` in insertion
    /// order, else the first template in insertion order.
    pub fn main_template(&self) -> Option<&Template> {
        self.templates
            .values()
            .find(|t| t.is_main)
            .or_else(|| self.templates.values().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::stmt::Block;

    fn template(name: &str, is_main: bool) -> Template {
        Template {
            name: name.to_string(),
            visibility: Visibility::Public,
            parameters: Vec::new(),
            guard: None,
            post: None,
            body: Block::empty(),
            is_main,
            overrides: None,
            documentation: None,
        }
    }

    #[test]
    fn main_template_prefers_flagged_over_first() {
        let mut module = Module::new("m");
        module.templates.insert("a".to_string(), template("a", false));
        module.templates.insert("b".to_string(), template("b", true));
        assert_eq!(module.main_template().unwrap().name, "b");
    }

    #[test]
    fn main_template_falls_back_to_first_declared() {
        let mut module = Module::new("m");
        module.templates.insert("x".to_string(), template("x", false));
        module.templates.insert("y".to_string(), template("y", false));
        assert_eq!(module.main_template().unwrap().name, "x");
    }

    #[test]
    fn main_template_is_none_for_empty_module() {
        assert!(Module::new("m").main_template().is_none());
    }
}
