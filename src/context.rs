//! Per-run execution state: variable scopes, indentation stack, writer
//! stack, model registry, trace links, and the expression-evaluator mirror.
//!
//! One context exists per top-level generate call and is discarded when it
//! completes.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast::expr::Expr;
use crate::ast::module::Module;
use crate::ast::stmt::FileMode;
use crate::error::{ExecError, ExecResult};
use crate::evaluator::Evaluator;
use crate::indent::Indentation;
use crate::protect::ProtectedAreaManager;
use crate::strategy::OutputStrategy;
use crate::value::{ModelResource, Value};
use crate::writer::Writer;

/// A recorded source -> target pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceLink {
    pub source: String,
    pub target: String,
}

pub struct ExecutionContext {
    module: Rc<Module>,
    /// Innermost scope; writes land here.
    variables: HashMap<String, Value>,
    /// Saved outer scopes, innermost last.
    scope_stack: Vec<HashMap<String, Value>>,
    /// Bottom entry is the initial indentation and never pops.
    indent_stack: Vec<Indentation>,
    /// Bottom entry is the stdout buffer and never pops.
    writers: Vec<Writer>,
    models: IndexMap<String, ModelResource>,
    protected: Arc<ProtectedAreaManager>,
    traces: Vec<TraceLink>,
    evaluator: Evaluator,
    strategy: Arc<dyn OutputStrategy>,
    cancel: Arc<AtomicBool>,
}

impl ExecutionContext {
    pub fn new(
        module: Rc<Module>,
        strategy: Arc<dyn OutputStrategy>,
        protected: Arc<ProtectedAreaManager>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            module,
            variables: HashMap::new(),
            scope_stack: Vec::new(),
            indent_stack: vec![Indentation::default()],
            writers: vec![Writer::new()],
            models: IndexMap::new(),
            protected,
            traces: Vec::new(),
            evaluator: Evaluator::new(),
            strategy,
            cancel,
        }
    }

    pub fn module(&self) -> &Rc<Module> {
        &self.module
    }

    // Variable scoping. Writes mirror into the evaluator so expression-level
    // lookups observe the same bindings.

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value.clone());
        self.evaluator.set_variable(name, value);
    }

    pub fn get_variable(&self, name: &str) -> ExecResult<Value> {
        if let Some(value) = self.variables.get(name) {
            return Ok(value.clone());
        }
        for scope in self.scope_stack.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Ok(value.clone());
            }
        }
        Err(ExecError::VariableNotFound { name: name.to_string() })
    }

    /// Save the current scope and start a fresh one. Outer bindings stay
    /// visible through the stack.
    pub fn push_scope(&mut self) {
        self.scope_stack.push(std::mem::take(&mut self.variables));
    }

    /// Restore the most recently saved scope, discarding local shadowings.
    /// Without a matching push this is a no-op.
    pub fn pop_scope(&mut self) {
        if let Some(saved) = self.scope_stack.pop() {
            self.variables = saved;
            self.evaluator.set_variables(self.flatten_visible());
        }
    }

    /// Every visible binding, outermost first so inner scopes win.
    pub fn flatten_visible(&self) -> HashMap<String, Value> {
        let mut flat = HashMap::new();
        for scope in &self.scope_stack {
            for (name, value) in scope {
                flat.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in &self.variables {
            flat.insert(name.clone(), value.clone());
        }
        flat
    }

    // Indentation stack.

    pub fn current_indentation(&self) -> &Indentation {
        self.indent_stack.last().expect("indentation stack holds its base")
    }

    pub fn push_indentation(&mut self) {
        let next = self.current_indentation().increment();
        self.indent_stack.push(next);
        self.sync_writer_indentation();
    }

    /// The base entry never pops.
    pub fn pop_indentation(&mut self) {
        if self.indent_stack.len() > 1 {
            self.indent_stack.pop();
        }
        self.sync_writer_indentation();
    }

    fn sync_writer_indentation(&mut self) {
        let indentation = self.current_indentation().clone();
        if let Some(writer) = self.writers.last_mut() {
            writer.set_indentation(indentation);
        }
    }

    // Writer stack.

    pub fn open_file(&mut self, url: &str, mode: FileMode, charset: &str) -> ExecResult<()> {
        let writer = self.strategy.create_writer(
            url,
            mode,
            charset,
            self.current_indentation().clone(),
        )?;
        self.writers.push(writer);
        Ok(())
    }

    /// Pop the top file writer and hand it to the strategy for commit.
    pub fn close_file(&mut self) -> ExecResult<()> {
        if self.writers.len() <= 1 {
            return Err(ExecError::invalid_operation("no open file writer to close"));
        }
        let writer = self.writers.pop().expect("writer stack checked above");
        self.strategy.finalize_writer(writer)
    }

    /// Drop the top file writer without committing it. Used on error paths.
    pub fn discard_file(&mut self) {
        if self.writers.len() > 1 {
            self.writers.pop();
        }
    }

    pub fn open_file_count(&self) -> usize {
        self.writers.len() - 1
    }

    pub fn write(&mut self, text: &str, apply_indent: bool) {
        if let Some(writer) = self.writers.last_mut() {
            writer.write(text, apply_indent);
        }
    }

    pub fn write_line(&mut self, text: &str, apply_indent: bool) {
        if let Some(writer) = self.writers.last_mut() {
            writer.write_line(text, apply_indent);
        }
    }

    pub fn at_line_start(&self) -> bool {
        self.writers.last().map(Writer::at_line_start).unwrap_or(true)
    }

    /// Close any file writers left open, then read the base buffer. The base
    /// writer itself is not persisted; the strategy decides what becomes of
    /// stdout output.
    pub fn finalize(&mut self) -> ExecResult<String> {
        while self.writers.len() > 1 {
            self.close_file()?;
        }
        Ok(self.writers[0].content().to_string())
    }

    /// Unwind for error paths: open file writers are discarded, not
    /// committed.
    pub fn discard_open_files(&mut self) {
        while self.writers.len() > 1 {
            self.writers.pop();
        }
    }

    // Protected areas.

    pub fn protected(&self) -> &ProtectedAreaManager {
        &self.protected
    }

    pub fn get_protected(&self, id: &str) -> Option<String> {
        self.protected.content(id)
    }

    pub fn scan_existing_output(&self, url: &str) {
        if let Some(existing) = self.strategy.existing_content(url) {
            self.protected.scan_content(&existing);
        }
    }

    // Traces.

    pub fn add_trace(&mut self, source: String, target: String) {
        self.traces.push(TraceLink { source, target });
    }

    pub fn take_traces(&mut self) -> Vec<TraceLink> {
        std::mem::take(&mut self.traces)
    }

    // Models.

    /// Register a model under an alias. The model's root object becomes a
    /// root-scope variable with the same name.
    pub fn register_model(&mut self, alias: &str, resource: ModelResource) {
        let root = resource.root_object(alias);
        self.models.insert(alias.to_string(), resource);
        self.set_variable(alias, root);
    }

    pub fn get_model(&self, alias: &str) -> Option<&ModelResource> {
        self.models.get(alias)
    }

    // Expression evaluation.

    pub fn evaluate(&mut self, expr: &Expr) -> ExecResult<Value> {
        self.evaluator.evaluate(expr, self.module.as_ref())
    }

    // Cancellation.

    pub fn check_cancelled(&self) -> ExecResult<()> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(ExecError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::InMemoryStrategy;

    fn context() -> ExecutionContext {
        ExecutionContext::new(
            Rc::new(Module::new("m")),
            Arc::new(InMemoryStrategy::new()),
            Arc::new(ProtectedAreaManager::new()),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn scope_shadowing_restores_outer_binding() {
        let mut ctx = context();
        ctx.set_variable("x", Value::Integer(1));
        ctx.push_scope();
        ctx.set_variable("x", Value::Integer(2));
        assert_eq!(ctx.get_variable("x").unwrap(), Value::Integer(2));
        ctx.pop_scope();
        assert_eq!(ctx.get_variable("x").unwrap(), Value::Integer(1));
    }

    #[test]
    fn scope_shadowing_restores_not_found() {
        let mut ctx = context();
        ctx.push_scope();
        ctx.set_variable("local", Value::Boolean(true));
        ctx.pop_scope();
        assert!(matches!(
            ctx.get_variable("local"),
            Err(ExecError::VariableNotFound { .. })
        ));
    }

    #[test]
    fn outer_bindings_visible_through_pushed_scopes() {
        let mut ctx = context();
        ctx.set_variable("outer", Value::Integer(9));
        ctx.push_scope();
        assert_eq!(ctx.get_variable("outer").unwrap(), Value::Integer(9));
        ctx.pop_scope();
    }

    #[test]
    fn evaluator_mirror_tracks_scope_changes() {
        let mut ctx = context();
        ctx.set_variable("x", Value::Integer(1));
        ctx.push_scope();
        ctx.set_variable("x", Value::Integer(2));
        assert_eq!(
            ctx.evaluate(&Expr::Variable("x".into())).unwrap(),
            Value::Integer(2)
        );
        ctx.pop_scope();
        assert_eq!(
            ctx.evaluate(&Expr::Variable("x".into())).unwrap(),
            Value::Integer(1)
        );
    }

    #[test]
    fn closing_the_base_writer_is_an_error() {
        let mut ctx = context();
        assert!(matches!(
            ctx.close_file(),
            Err(ExecError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn pop_indentation_keeps_the_base() {
        let mut ctx = context();
        assert_eq!(ctx.current_indentation().level(), 0);
        ctx.pop_indentation();
        assert_eq!(ctx.current_indentation().level(), 0);
        ctx.push_indentation();
        assert_eq!(ctx.current_indentation().level(), 1);
        ctx.pop_indentation();
        assert_eq!(ctx.current_indentation().level(), 0);
    }

    #[test]
    fn writes_route_to_the_top_writer() {
        let mut ctx = context();
        ctx.write("to stdout", true);
        ctx.open_file("f.txt", FileMode::Overwrite, "UTF-8").unwrap();
        ctx.write("to file", true);
        ctx.close_file().unwrap();
        ctx.write(" and back", true);
        let stdout = ctx.finalize().unwrap();
        assert_eq!(stdout, "to stdout and back");
    }
}
