//! The expression sub-engine.
//!
//! Consumed by the interpreter through a narrow surface: `evaluate`, plus
//! `set_variable`/`get_variable`, which the execution context keeps in step
//! with its own scopes. Query calls resolve through the [`QuerySource`] seam
//! so the evaluator stays ignorant of the interpreter.

use std::collections::HashMap;

use crate::ast::expr::{BinaryOp, CollectionOp, Expr};
use crate::ast::module::{Module, Query};
use crate::error::{ExecError, ExecResult};
use crate::value::Value;

/// Where call expressions find their definitions. Queries are side-effect
/// free, so evaluation never needs more than lookup.
pub trait QuerySource {
    fn lookup_query(&self, name: &str) -> Option<&Query>;
}

impl QuerySource for Module {
    fn lookup_query(&self, name: &str) -> Option<&Query> {
        self.queries.get(name)
    }
}

/// Empty source, for expression evaluation outside a module.
pub struct NoQueries;

impl QuerySource for NoQueries {
    fn lookup_query(&self, _name: &str) -> Option<&Query> {
        None
    }
}

#[derive(Debug, Default)]
pub struct Evaluator {
    variables: HashMap<String, Value>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Replace the whole environment. The execution context rebuilds the
    /// mirror this way when a scope pops.
    pub fn set_variables(&mut self, variables: HashMap<String, Value>) {
        self.variables = variables;
    }

    pub fn evaluate(&mut self, expr: &Expr, queries: &dyn QuerySource) -> ExecResult<Value> {
        match expr {
            Expr::Boolean(b) => Ok(Value::Boolean(*b)),
            Expr::Integer(n) => Ok(Value::Integer(*n)),
            Expr::Real(r) => Ok(Value::Real(*r)),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::Variable(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| ExecError::VariableNotFound { name: name.clone() }),
            Expr::Binary { op, left, right } => self.evaluate_binary(*op, left, right, queries),
            Expr::Not(operand) => {
                let value = self.evaluate(operand, queries)?;
                let b = value.as_bool().ok_or_else(|| {
                    ExecError::type_error(format!("'not' requires a boolean, got {}", value.type_name()))
                })?;
                Ok(Value::Boolean(!b))
            }
            Expr::Navigation { source, property } => {
                let value = self.evaluate(source, queries)?;
                navigate(&value, property)
            }
            Expr::CollectionCall { source, op, iterator, body } => {
                let value = self.evaluate(source, queries)?;
                self.evaluate_collection_op(value, *op, iterator.as_deref(), body.as_deref(), queries)
            }
            Expr::Call { name, arguments } => {
                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument, queries)?);
                }
                self.call_query(name, values, queries)
            }
        }
    }

    fn evaluate_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        queries: &dyn QuerySource,
    ) -> ExecResult<Value> {
        // `and`/`or` short-circuit; everything else is strict.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let left_value = self.evaluate(left, queries)?;
            let l = boolean_operand(&left_value, op)?;
            if (op == BinaryOp::And && !l) || (op == BinaryOp::Or && l) {
                return Ok(Value::Boolean(l));
            }
            let right_value = self.evaluate(right, queries)?;
            let r = boolean_operand(&right_value, op)?;
            return Ok(Value::Boolean(r));
        }
        let left_value = self.evaluate(left, queries)?;
        let right_value = self.evaluate(right, queries)?;
        apply_binary(op, left_value, right_value)
    }

    fn evaluate_collection_op(
        &mut self,
        source: Value,
        op: CollectionOp,
        iterator: Option<&str>,
        body: Option<&Expr>,
        queries: &dyn QuerySource,
    ) -> ExecResult<Value> {
        // Strings answer the cardinality operations directly.
        if let Value::String(s) = &source {
            match op {
                CollectionOp::Size => return Ok(Value::Integer(s.chars().count() as i64)),
                CollectionOp::IsEmpty => return Ok(Value::Boolean(s.is_empty())),
                CollectionOp::NotEmpty => return Ok(Value::Boolean(!s.is_empty())),
                _ => {}
            }
        }
        let items = as_sequence(source);
        match op {
            CollectionOp::Size => Ok(Value::Integer(items.len() as i64)),
            CollectionOp::IsEmpty => Ok(Value::Boolean(items.is_empty())),
            CollectionOp::NotEmpty => Ok(Value::Boolean(!items.is_empty())),
            CollectionOp::First => Ok(items.into_iter().next().unwrap_or(Value::Null)),
            CollectionOp::Last => Ok(items.into_iter().next_back().unwrap_or(Value::Null)),
            CollectionOp::Select
            | CollectionOp::Reject
            | CollectionOp::Any
            | CollectionOp::Exists
            | CollectionOp::ForAll => {
                let body = body.ok_or_else(|| {
                    ExecError::invalid_operation(format!("'{}' requires a body expression", op.name()))
                })?;
                self.filterish(items, op, iterator, body, queries)
            }
            CollectionOp::Collect => {
                let body = body.ok_or_else(|| {
                    ExecError::invalid_operation("'collect' requires a body expression")
                })?;
                let mut collected = Vec::with_capacity(items.len());
                for item in items {
                    collected.push(self.with_iterator(iterator, item, |ev| {
                        ev.evaluate(body, queries)
                    })?);
                }
                Ok(Value::Collection(collected))
            }
        }
    }

    fn filterish(
        &mut self,
        items: Vec<Value>,
        op: CollectionOp,
        iterator: Option<&str>,
        body: &Expr,
        queries: &dyn QuerySource,
    ) -> ExecResult<Value> {
        let mut kept = Vec::new();
        for item in items {
            let verdict = self.with_iterator(iterator, item.clone(), |ev| {
                let value = ev.evaluate(body, queries)?;
                value.as_bool().ok_or_else(|| {
                    ExecError::type_error(format!(
                        "'{}' body must evaluate to a boolean, got {}",
                        op.name(),
                        value.type_name()
                    ))
                })
            })?;
            match op {
                CollectionOp::Select if verdict => kept.push(item),
                CollectionOp::Reject if !verdict => kept.push(item),
                CollectionOp::Any if verdict => return Ok(item),
                CollectionOp::Exists if verdict => return Ok(Value::Boolean(true)),
                CollectionOp::ForAll if !verdict => return Ok(Value::Boolean(false)),
                _ => {}
            }
        }
        match op {
            CollectionOp::Select | CollectionOp::Reject => Ok(Value::Collection(kept)),
            CollectionOp::Any => Ok(Value::Null),
            CollectionOp::Exists => Ok(Value::Boolean(false)),
            CollectionOp::ForAll => Ok(Value::Boolean(true)),
            _ => unreachable!("filterish only handles predicate operations"),
        }
    }

    /// Bind the iterator variable around `f`, restoring whatever it
    /// shadowed.
    fn with_iterator<T>(
        &mut self,
        iterator: Option<&str>,
        item: Value,
        f: impl FnOnce(&mut Self) -> ExecResult<T>,
    ) -> ExecResult<T> {
        let Some(name) = iterator else {
            return f(self);
        };
        let shadowed = self.variables.insert(name.to_string(), item);
        let result = f(self);
        match shadowed {
            Some(previous) => {
                self.variables.insert(name.to_string(), previous);
            }
            None => {
                self.variables.remove(name);
            }
        }
        result
    }

    /// Query invocation: arity-checked, parameters bound in a saved-and-
    /// restored slice of the environment, body evaluated, no other state
    /// touched.
    fn call_query(
        &mut self,
        name: &str,
        arguments: Vec<Value>,
        queries: &dyn QuerySource,
    ) -> ExecResult<Value> {
        let query = queries
            .lookup_query(name)
            .ok_or_else(|| ExecError::QueryNotFound { name: name.to_string() })?;
        if arguments.len() != query.parameters.len() {
            return Err(ExecError::invalid_operation(format!(
                "query '{}' expects {} arguments, got {}",
                name,
                query.parameters.len(),
                arguments.len()
            )));
        }
        let mut shadowed: Vec<(String, Option<Value>)> = Vec::with_capacity(arguments.len());
        for (parameter, value) in query.parameters.iter().zip(arguments) {
            let previous = self.variables.insert(parameter.name.clone(), value);
            shadowed.push((parameter.name.clone(), previous));
        }
        let result = self.evaluate(&query.body, queries);
        for (name, previous) in shadowed.into_iter().rev() {
            match previous {
                Some(value) => {
                    self.variables.insert(name, value);
                }
                None => {
                    self.variables.remove(&name);
                }
            }
        }
        result
    }
}

/// The iterable view of a value: collections iterate themselves, null is
/// empty, and a lone scalar is a one-element sequence.
pub fn as_sequence(value: Value) -> Vec<Value> {
    match value {
        Value::Collection(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn navigate(source: &Value, property: &str) -> ExecResult<Value> {
    match source {
        Value::Object(object) => Ok(object.property(property).unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        // Implicit collect over a collection of objects.
        Value::Collection(items) => {
            let mut collected = Vec::with_capacity(items.len());
            for item in items {
                collected.push(navigate(item, property)?);
            }
            Ok(Value::Collection(collected))
        }
        other => Err(ExecError::type_error(format!(
            "cannot navigate '{}' on {}",
            property,
            other.type_name()
        ))),
    }
}

fn boolean_operand(value: &Value, op: BinaryOp) -> ExecResult<bool> {
    value.as_bool().ok_or_else(|| {
        ExecError::type_error(format!(
            "'{}' requires boolean operands, got {}",
            op.symbol(),
            value.type_name()
        ))
    })
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> ExecResult<Value> {
    match op {
        BinaryOp::Add => apply_add(left, right),
        BinaryOp::Subtract => numeric_op(op, left, right, |a, b| a - b, |a, b| a - b),
        BinaryOp::Multiply => numeric_op(op, left, right, |a, b| a * b, |a, b| a * b),
        BinaryOp::Divide => apply_divide(left, right),
        BinaryOp::Equals => Ok(Value::Boolean(values_equal(&left, &right))),
        BinaryOp::NotEquals => Ok(Value::Boolean(!values_equal(&left, &right))),
        BinaryOp::LessThan => compare(op, left, right, |o| o == std::cmp::Ordering::Less),
        BinaryOp::GreaterThan => compare(op, left, right, |o| o == std::cmp::Ordering::Greater),
        BinaryOp::LessOrEqual => compare(op, left, right, |o| o != std::cmp::Ordering::Greater),
        BinaryOp::GreaterOrEqual => compare(op, left, right, |o| o != std::cmp::Ordering::Less),
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited earlier"),
    }
}

fn apply_add(left: Value, right: Value) -> ExecResult<Value> {
    match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
        (Value::Real(a), Value::Real(b)) => Ok(Value::Real(a + b)),
        (Value::Integer(a), Value::Real(b)) => Ok(Value::Real(*a as f64 + b)),
        (Value::Real(a), Value::Integer(b)) => Ok(Value::Real(a + *b as f64)),
        // String concatenation coerces the other operand to its canonical
        // textual form.
        (Value::String(a), other) => Ok(Value::String(format!("{}{}", a, other.to_output_string()))),
        (other, Value::String(b)) => Ok(Value::String(format!("{}{}", other.to_output_string(), b))),
        _ => Err(ExecError::type_error(format!(
            "cannot add {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn apply_divide(left: Value, right: Value) -> ExecResult<Value> {
    match (&left, &right) {
        (Value::Integer(_), Value::Integer(0)) => {
            Err(ExecError::invalid_operation("division by zero"))
        }
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a / b)),
        (Value::Real(a), Value::Real(b)) => Ok(Value::Real(a / b)),
        (Value::Integer(a), Value::Real(b)) => Ok(Value::Real(*a as f64 / b)),
        (Value::Real(a), Value::Integer(b)) => Ok(Value::Real(a / *b as f64)),
        _ => Err(ExecError::type_error(format!(
            "cannot divide {} by {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn numeric_op(
    op: BinaryOp,
    left: Value,
    right: Value,
    int_op: impl Fn(i64, i64) -> i64,
    real_op: impl Fn(f64, f64) -> f64,
) -> ExecResult<Value> {
    match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(int_op(*a, *b))),
        (Value::Real(a), Value::Real(b)) => Ok(Value::Real(real_op(*a, *b))),
        (Value::Integer(a), Value::Real(b)) => Ok(Value::Real(real_op(*a as f64, *b))),
        (Value::Real(a), Value::Integer(b)) => Ok(Value::Real(real_op(*a, *b as f64))),
        _ => Err(ExecError::type_error(format!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn compare(
    op: BinaryOp,
    left: Value,
    right: Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> ExecResult<Value> {
    let ordering = match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Real(a), Value::Real(b)) => a
            .partial_cmp(b)
            .ok_or_else(|| ExecError::invalid_operation("cannot order NaN"))?,
        (Value::Integer(a), Value::Real(b)) => (*a as f64)
            .partial_cmp(b)
            .ok_or_else(|| ExecError::invalid_operation("cannot order NaN"))?,
        (Value::Real(a), Value::Integer(b)) => a
            .partial_cmp(&(*b as f64))
            .ok_or_else(|| ExecError::invalid_operation("cannot order NaN"))?,
        // Codepoint order.
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => {
            return Err(ExecError::type_error(format!(
                "cannot compare {} and {} with '{}'",
                left.type_name(),
                right.type_name(),
                op.symbol()
            )));
        }
    };
    Ok(Value::Boolean(accept(ordering)))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(a), Value::Real(b)) | (Value::Real(b), Value::Integer(a)) => {
            *a as f64 == *b
        }
        (Value::Collection(a), Value::Collection(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::module::{Parameter, Visibility};

    fn eval(evaluator: &mut Evaluator, expr: &Expr) -> Value {
        evaluator.evaluate(expr, &NoQueries).unwrap()
    }

    #[test]
    fn arithmetic_promotes_integers_to_reals() {
        let mut ev = Evaluator::new();
        let expr = Expr::binary(BinaryOp::Add, Expr::Integer(1), Expr::Real(0.5));
        assert_eq!(eval(&mut ev, &expr), Value::Real(1.5));
        let expr = Expr::binary(BinaryOp::Multiply, Expr::Integer(3), Expr::Integer(4));
        assert_eq!(eval(&mut ev, &expr), Value::Integer(12));
    }

    #[test]
    fn string_plus_concatenates() {
        let mut ev = Evaluator::new();
        let expr = Expr::binary(BinaryOp::Add, Expr::String("n=".into()), Expr::Integer(3));
        assert_eq!(eval(&mut ev, &expr), Value::String("n=3".into()));
    }

    #[test]
    fn string_comparison_uses_codepoint_order() {
        let mut ev = Evaluator::new();
        let expr = Expr::binary(
            BinaryOp::LessThan,
            Expr::String("abc".into()),
            Expr::String("abd".into()),
        );
        assert_eq!(eval(&mut ev, &expr), Value::Boolean(true));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut ev = Evaluator::new();
        let expr = Expr::binary(BinaryOp::Divide, Expr::Integer(1), Expr::Integer(0));
        assert!(ev.evaluate(&expr, &NoQueries).is_err());
    }

    #[test]
    fn and_short_circuits() {
        let mut ev = Evaluator::new();
        // The right operand would fail on lookup; short-circuit skips it.
        let expr = Expr::binary(
            BinaryOp::And,
            Expr::Boolean(false),
            Expr::Variable("missing".into()),
        );
        assert_eq!(eval(&mut ev, &expr), Value::Boolean(false));
    }

    #[test]
    fn missing_variable_is_an_error() {
        let mut ev = Evaluator::new();
        let err = ev.evaluate(&Expr::Variable("ghost".into()), &NoQueries).unwrap_err();
        assert_eq!(err, ExecError::VariableNotFound { name: "ghost".into() });
    }

    #[test]
    fn select_binds_and_restores_iterator() {
        let mut ev = Evaluator::new();
        ev.set_variable("x", Value::String("outer".into()));
        ev.set_variable(
            "items",
            Value::Collection(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
        );
        let expr = Expr::CollectionCall {
            source: Box::new(Expr::Variable("items".into())),
            op: CollectionOp::Select,
            iterator: Some("x".into()),
            body: Some(Box::new(Expr::binary(
                BinaryOp::GreaterThan,
                Expr::Variable("x".into()),
                Expr::Integer(1),
            ))),
        };
        assert_eq!(
            eval(&mut ev, &expr),
            Value::Collection(vec![Value::Integer(2), Value::Integer(3)])
        );
        assert_eq!(ev.get_variable("x"), Some(&Value::String("outer".into())));
    }

    #[test]
    fn cardinality_ops_on_scalars_and_null() {
        let mut ev = Evaluator::new();
        ev.set_variable("one", Value::Integer(7));
        ev.set_variable("none", Value::Null);
        let size = |var: &str| Expr::CollectionCall {
            source: Box::new(Expr::Variable(var.into())),
            op: CollectionOp::Size,
            iterator: None,
            body: None,
        };
        assert_eq!(eval(&mut ev, &size("one")), Value::Integer(1));
        assert_eq!(eval(&mut ev, &size("none")), Value::Integer(0));
    }

    #[test]
    fn size_of_string_counts_characters() {
        let mut ev = Evaluator::new();
        ev.set_variable("s", Value::String("héllo".into()));
        let expr = Expr::CollectionCall {
            source: Box::new(Expr::Variable("s".into())),
            op: CollectionOp::Size,
            iterator: None,
            body: None,
        };
        assert_eq!(eval(&mut ev, &expr), Value::Integer(5));
    }

    #[test]
    fn for_all_on_empty_collection_holds() {
        let mut ev = Evaluator::new();
        ev.set_variable("items", Value::Collection(vec![]));
        let expr = Expr::CollectionCall {
            source: Box::new(Expr::Variable("items".into())),
            op: CollectionOp::ForAll,
            iterator: Some("i".into()),
            body: Some(Box::new(Expr::Boolean(false))),
        };
        assert_eq!(eval(&mut ev, &expr), Value::Boolean(true));
    }

    #[test]
    fn query_call_binds_parameters_and_restores() {
        let mut module = Module::new("m");
        module.queries.insert(
            "double".to_string(),
            Query {
                name: "double".to_string(),
                visibility: Visibility::Public,
                parameters: vec![Parameter::new("n", "Integer")],
                return_type: "Integer".to_string(),
                body: Expr::binary(BinaryOp::Multiply, Expr::Variable("n".into()), Expr::Integer(2)),
                documentation: None,
            },
        );
        let mut ev = Evaluator::new();
        ev.set_variable("n", Value::String("outer".into()));
        let call = Expr::Call { name: "double".into(), arguments: vec![Expr::Integer(21)] };
        assert_eq!(ev.evaluate(&call, &module).unwrap(), Value::Integer(42));
        assert_eq!(ev.get_variable("n"), Some(&Value::String("outer".into())));
    }

    #[test]
    fn unknown_query_is_reported() {
        let mut ev = Evaluator::new();
        let call = Expr::Call { name: "nope".into(), arguments: vec![] };
        assert_eq!(
            ev.evaluate(&call, &NoQueries).unwrap_err(),
            ExecError::QueryNotFound { name: "nope".into() }
        );
    }
}
