//! Runtime values carried by variable bindings and produced by expressions.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::stmt::Block;

/// An opaque model resource registered under an alias. The concrete
/// representation is a JSON document; the engine only ever navigates it
/// through [`ModelObject`] property access.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResource {
    root: Rc<serde_json::Value>,
}

impl ModelResource {
    pub fn from_json(value: serde_json::Value) -> Self {
        Self { root: Rc::new(value) }
    }

    pub fn root_object(&self, alias: &str) -> Value {
        Value::Object(ModelObject {
            alias: Some(alias.to_string()),
            data: self.root.clone(),
        })
    }
}

/// A reference into a registered model. Opaque to the core: only the
/// evaluator's navigation reads through it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelObject {
    pub alias: Option<String>,
    pub data: Rc<serde_json::Value>,
}

impl ModelObject {
    /// Stable label used for trace links and output coercion: the object's
    /// `name` attribute when it has one, else the compact JSON form.
    pub fn label(&self) -> String {
        match self.data.as_ref() {
            serde_json::Value::Object(map) => match map.get("name") {
                Some(serde_json::Value::String(name)) => name.clone(),
                _ => self.data.to_string(),
            },
            other => other.to_string(),
        }
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        match self.data.as_ref() {
            serde_json::Value::Object(map) => map.get(name).map(|v| self.wrap(v)),
            _ => None,
        }
    }

    fn wrap(&self, value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    Value::Real(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Collection(items.iter().map(|v| self.wrap(v)).collect())
            }
            serde_json::Value::Object(_) => Value::Object(ModelObject {
                alias: self.alias.clone(),
                data: Rc::new(value.clone()),
            }),
        }
    }
}

/// A block captured at a macro invocation site, together with the bindings
/// visible there. Executing the value re-enters the interpreter with the
/// snapshot overlaid.
#[derive(Debug, PartialEq)]
pub struct BlockClosure {
    pub block: Block,
    pub scope: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Collection(Vec<Value>),
    Object(ModelObject),
    Block(Rc<BlockClosure>),
}

impl Value {
    /// Convert a JSON document into a runtime value. Objects become model
    /// objects without an owning alias.
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    Value::Real(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Collection(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => {
                Value::Object(ModelObject { alias: None, data: Rc::new(value.clone()) })
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Real(_) => "Real",
            Value::String(_) => "String",
            Value::Collection(_) => "Collection",
            Value::Object(_) => "Object",
            Value::Block(_) => "Block",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical textual form used when a value reaches a writer.
    pub fn to_output_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Real(r) => format_real(*r),
            Value::String(s) => s.clone(),
            Value::Collection(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_output_string()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Object(obj) => obj.label(),
            Value::Block(_) => String::new(),
        }
    }
}

fn format_real(r: f64) -> String {
    let formatted = format!("{:.6}", r);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}
