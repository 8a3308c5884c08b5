//! Tree-walking interpreter: executes statements against the execution
//! context, manages template/query/macro dispatch, and drives top-level
//! generation runs.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use log::debug;

use crate::ast::expr::Expr;
use crate::ast::module::Module;
use crate::ast::stmt::{Binding, Block, Statement};
use crate::context::{ExecutionContext, TraceLink};
use crate::error::{ExecError, ExecResult};
use crate::evaluator::as_sequence;
use crate::protect::{self, ProtectedAreaManager, END_MARKER, START_MARKER};
use crate::strategy::OutputStrategy;
use crate::value::{BlockClosure, ModelResource, Value};

/// Counters and outcome for one generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerationStats {
    pub templates_executed: usize,
    pub files_generated: usize,
    pub protected_areas_preserved: usize,
    pub successful: bool,
    pub last_error: Option<String>,
    pub duration: Option<Duration>,
}

#[derive(Debug)]
pub struct GenerationResult {
    /// Content accumulated by the base writer.
    pub stdout: String,
    pub stats: GenerationStats,
    pub traces: Vec<TraceLink>,
}

/// Options recognised by `generate`.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Overrides main-template auto-detection; must name an existing
    /// template.
    pub main_template: Option<String>,
    /// Bound as root-scope variables; main-template parameters are filled
    /// from here by name.
    pub arguments: IndexMap<String, Value>,
    pub models: IndexMap<String, ModelResource>,
    /// Default output encoding for `file` blocks without a charset argument.
    pub charset: Option<String>,
    /// Diagnostic logging at statement and scope boundaries.
    pub debug: bool,
    /// Target label recorded on trace links.
    pub trace_target: String,
    /// Cooperative cancellation flag, checked at statement boundaries.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Share a pre-scanned manager across runs; a fresh one is created
    /// otherwise.
    pub protected: Option<Arc<ProtectedAreaManager>>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            main_template: None,
            arguments: IndexMap::new(),
            models: IndexMap::new(),
            charset: None,
            debug: false,
            trace_target: "generated-output".to_string(),
            cancel: None,
            protected: None,
        }
    }
}

pub struct Interpreter {
    module: Rc<Module>,
    ctx: ExecutionContext,
    options: GenerateOptions,
    stats: GenerationStats,
    default_charset: String,
    /// Region ids already emitted in this run; a repeat is a conflict.
    emitted_protected: HashSet<String>,
}

impl Interpreter {
    pub fn new(
        module: Module,
        options: GenerateOptions,
        strategy: Arc<dyn OutputStrategy>,
    ) -> Self {
        let module = Rc::new(module);
        let protected = options
            .protected
            .clone()
            .unwrap_or_else(|| Arc::new(ProtectedAreaManager::new()));
        let cancel = options
            .cancel
            .clone()
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
        let default_charset = options
            .charset
            .clone()
            .unwrap_or_else(|| module.encoding.clone());
        let ctx = ExecutionContext::new(module.clone(), strategy, protected, cancel);
        Self {
            module,
            ctx,
            options,
            stats: GenerationStats::default(),
            default_charset,
            emitted_protected: HashSet::new(),
        }
    }

    pub fn stats(&self) -> &GenerationStats {
        &self.stats
    }

    /// Execute the main template and finalise the context. On failure the
    /// statistics record the error and open file writers are discarded.
    pub fn run(&mut self) -> ExecResult<GenerationResult> {
        let started = Instant::now();
        self.stats = GenerationStats::default();
        self.emitted_protected.clear();

        for (alias, resource) in self.options.models.clone() {
            self.ctx.register_model(&alias, resource);
        }
        for (name, value) in self.options.arguments.clone() {
            self.ctx.set_variable(&name, value);
        }

        let result = self.run_main().and_then(|_| self.ctx.finalize());
        self.stats.duration = Some(started.elapsed());
        match result {
            Ok(stdout) => {
                self.stats.successful = true;
                Ok(GenerationResult {
                    stdout,
                    stats: self.stats.clone(),
                    traces: self.ctx.take_traces(),
                })
            }
            Err(e) => {
                self.ctx.discard_open_files();
                self.stats.successful = false;
                self.stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn run_main(&mut self) -> ExecResult<()> {
        let module = self.module.clone();
        let template = match &self.options.main_template {
            Some(name) => module
                .template(name)
                .ok_or_else(|| ExecError::TemplateNotFound { name: name.clone() })?,
            None => module.main_template().ok_or(ExecError::NoTemplates)?,
        };
        let mut arguments = Vec::with_capacity(template.parameters.len());
        for parameter in &template.parameters {
            let value = self
                .options
                .arguments
                .get(&parameter.name)
                .cloned()
                .ok_or_else(|| {
                    ExecError::invalid_operation(format!(
                        "missing argument for parameter '{}' of template '{}'",
                        parameter.name, template.name
                    ))
                })?;
            arguments.push(value);
        }
        self.execute_template(&template.name, arguments)
    }

    /// Arity check, fresh scope, parameter binding, guard, body, post.
    /// A guard that does not evaluate to boolean true skips the body
    /// silently; a post-condition that does not raises.
    pub fn execute_template(&mut self, name: &str, arguments: Vec<Value>) -> ExecResult<()> {
        let module = self.module.clone();
        let template = module
            .template(name)
            .ok_or_else(|| ExecError::TemplateNotFound { name: name.to_string() })?;
        if arguments.len() != template.parameters.len() {
            return Err(ExecError::invalid_operation(format!(
                "template '{}' expects {} arguments, got {}",
                name,
                template.parameters.len(),
                arguments.len()
            )));
        }

        if self.options.debug {
            debug!("template '{}' with {} argument(s)", name, arguments.len());
        }
        self.ctx.push_scope();
        for (parameter, value) in template.parameters.iter().zip(arguments) {
            self.ctx.set_variable(&parameter.name, value);
        }

        if let Some(guard) = &template.guard {
            match self.ctx.evaluate(guard) {
                Ok(value) if value.as_bool() == Some(true) => {}
                Ok(_) => {
                    debug!("guard failed for template '{}'", name);
                    self.ctx.pop_scope();
                    return Ok(());
                }
                Err(e) => {
                    self.ctx.pop_scope();
                    return Err(e);
                }
            }
        }

        let result = self.execute_block(&template.body).and_then(|_| {
            if let Some(post) = &template.post {
                let value = self.ctx.evaluate(post)?;
                if value.as_bool() != Some(true) {
                    return Err(ExecError::PostConditionFailed { template: name.to_string() });
                }
            }
            Ok(())
        });
        self.ctx.pop_scope();
        result?;
        self.stats.templates_executed += 1;
        Ok(())
    }

    /// A non-inlined block gains an indentation level for its duration,
    /// released on every exit path.
    fn execute_block(&mut self, block: &Block) -> ExecResult<()> {
        if !block.inlined {
            self.ctx.push_indentation();
        }
        let result = self.execute_statements(&block.statements);
        if !block.inlined {
            self.ctx.pop_indentation();
        }
        result
    }

    fn execute_statements(&mut self, statements: &[Statement]) -> ExecResult<()> {
        for statement in statements {
            self.ctx.check_cancelled()?;
            self.execute_statement(statement)?;
        }
        Ok(())
    }

    fn execute_statement(&mut self, statement: &Statement) -> ExecResult<()> {
        if self.options.debug {
            debug!("statement: {}", statement_kind(statement));
        }
        match statement {
            Statement::Text { value, newline_needed } => {
                self.ctx.write(value, true);
                if *newline_needed {
                    self.ctx.write_line("", true);
                }
                Ok(())
            }
            Statement::Expression { expr, newline_needed } => {
                self.execute_expression_statement(expr)?;
                if *newline_needed {
                    self.ctx.write_line("", true);
                }
                Ok(())
            }
            Statement::NewLine { indentation_needed } => {
                self.ctx.write_line("", *indentation_needed);
                Ok(())
            }
            Statement::Comment { .. } => Ok(()),
            Statement::If { condition, then_block, elseif_clauses, else_block } => {
                let value = self.ctx.evaluate(condition)?;
                if value.as_bool() == Some(true) {
                    return self.execute_block(then_block);
                }
                for (clause_condition, clause_block) in elseif_clauses {
                    let value = self.ctx.evaluate(clause_condition)?;
                    if value.as_bool() == Some(true) {
                        return self.execute_block(clause_block);
                    }
                }
                if let Some(block) = else_block {
                    return self.execute_block(block);
                }
                Ok(())
            }
            Statement::For { variable, collection, separator, body } => {
                let items = as_sequence(self.ctx.evaluate(collection)?);
                for (index, item) in items.into_iter().enumerate() {
                    // The separator runs between iterations, in the scope
                    // outside the loop body.
                    if index > 0 {
                        if let Some(sep) = separator {
                            let value = self.ctx.evaluate(sep)?;
                            if !value.is_null() {
                                self.ctx.write(&value.to_output_string(), true);
                            }
                        }
                    }
                    self.ctx.push_scope();
                    self.ctx.set_variable(&variable.name, item);
                    let result = self.execute_block(body);
                    self.ctx.pop_scope();
                    result?;
                }
                Ok(())
            }
            Statement::Let { bindings, body } => {
                self.ctx.push_scope();
                let result = self.execute_let_body(bindings, body);
                self.ctx.pop_scope();
                result
            }
            Statement::File { url, mode, charset, body } => {
                let url_value = self.ctx.evaluate(url)?;
                let Value::String(url_str) = url_value else {
                    return Err(ExecError::type_error(format!(
                        "file url must be a string, got {}",
                        url_value.type_name()
                    )));
                };
                let charset_str = match charset {
                    Some(expr) => {
                        let value = self.ctx.evaluate(expr)?;
                        match value.as_str() {
                            Some(s) => s.to_string(),
                            None => {
                                return Err(ExecError::type_error(format!(
                                    "file charset must be a string, got {}",
                                    value.type_name()
                                )));
                            }
                        }
                    }
                    None => self.default_charset.clone(),
                };
                // Pick up hand-edited regions from the previous output.
                self.ctx.scan_existing_output(&url_str);
                self.ctx.open_file(&url_str, *mode, &charset_str)?;
                match self.execute_block(body) {
                    Ok(()) => {
                        self.ctx.close_file()?;
                        self.stats.files_generated += 1;
                        Ok(())
                    }
                    Err(e) => {
                        self.ctx.discard_file();
                        Err(e)
                    }
                }
            }
            Statement::ProtectedArea { id, start_prefix, end_prefix, body } => {
                self.execute_protected_area(id, start_prefix.as_ref(), end_prefix.as_ref(), body)
            }
            Statement::Trace { source, body } => {
                let value = self.ctx.evaluate(source)?;
                if let Value::Object(object) = &value {
                    self.ctx
                        .add_trace(object.label(), self.options.trace_target.clone());
                }
                self.execute_block(body)
            }
            Statement::MacroInvocation { name, arguments, body_content } => {
                self.invoke_macro(name, arguments, body_content.as_ref())
            }
        }
    }

    /// A statement-level call may name a template or a macro; anything else
    /// goes to the expression evaluator, and a non-null result is written.
    /// A block value is executed in place.
    fn execute_expression_statement(&mut self, expr: &Expr) -> ExecResult<()> {
        if let Expr::Call { name, arguments } = expr {
            if self.module.templates.contains_key(name) {
                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.ctx.evaluate(argument)?);
                }
                return self.execute_template(name, values);
            }
            if self.module.macros.contains_key(name) {
                return self.invoke_macro(name, arguments, None);
            }
        }
        let value = self.ctx.evaluate(expr)?;
        match value {
            Value::Block(closure) => self.execute_closure(&closure),
            Value::Null => Ok(()),
            other => {
                self.ctx.write(&other.to_output_string(), true);
                Ok(())
            }
        }
    }

    fn execute_let_body(&mut self, bindings: &[Binding], body: &Block) -> ExecResult<()> {
        for binding in bindings {
            // Each init sees the bindings established before it.
            let value = self.ctx.evaluate(&binding.init)?;
            self.ctx.set_variable(&binding.variable.name, value);
        }
        self.execute_block(body)
    }

    fn execute_protected_area(
        &mut self,
        id: &Expr,
        start_prefix: Option<&Expr>,
        end_prefix: Option<&Expr>,
        body: &Block,
    ) -> ExecResult<()> {
        let id_value = self.ctx.evaluate(id)?;
        let Value::String(id_str) = id_value else {
            return Err(ExecError::type_error(format!(
                "protected area id must be a string, got {}",
                id_value.type_name()
            )));
        };
        if !self.emitted_protected.insert(id_str.clone()) {
            return Err(ExecError::ProtectedAreaConflict {
                message: format!("region '{}' emitted more than once", id_str),
            });
        }
        let start_prefix_str = self.evaluate_prefix(start_prefix)?;
        let end_prefix_str = self.evaluate_prefix(end_prefix)?;
        let start_marker = protect::marker(&start_prefix_str, START_MARKER, &id_str);
        let end_marker = protect::marker(&end_prefix_str, END_MARKER, &id_str);

        if !self.ctx.at_line_start() {
            self.ctx.write_line("", false);
        }
        self.ctx.write_line(&start_marker, true);
        match self.ctx.get_protected(&id_str) {
            Some(content) => {
                // Preserved content is re-emitted verbatim, bypassing
                // indentation.
                if !content.is_empty() {
                    self.ctx.write(&content, false);
                    self.ctx.write_line("", false);
                }
                self.stats.protected_areas_preserved += 1;
            }
            None => {
                self.execute_block(body)?;
                if !self.ctx.at_line_start() {
                    self.ctx.write_line("", false);
                }
            }
        }
        self.ctx.write_line(&end_marker, true);
        Ok(())
    }

    fn evaluate_prefix(&mut self, prefix: Option<&Expr>) -> ExecResult<String> {
        let Some(expr) = prefix else {
            return Ok(String::new());
        };
        let value = self.ctx.evaluate(expr)?;
        match value.as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(ExecError::type_error(format!(
                "protected area marker prefix must be a string, got {}",
                value.type_name()
            ))),
        }
    }

    fn invoke_macro(
        &mut self,
        name: &str,
        arguments: &[Expr],
        body_content: Option<&Block>,
    ) -> ExecResult<()> {
        let module = self.module.clone();
        let macro_def = module
            .macro_def(name)
            .ok_or_else(|| ExecError::MacroNotFound { name: name.to_string() })?;
        if arguments.len() != macro_def.parameters.len() {
            return Err(ExecError::invalid_operation(format!(
                "macro '{}' expects {} arguments, got {}",
                name,
                macro_def.parameters.len(),
                arguments.len()
            )));
        }
        match (&macro_def.body_parameter, body_content) {
            (Some(_), None) => {
                return Err(ExecError::invalid_operation(format!(
                    "macro '{}' expects a body block",
                    name
                )));
            }
            (None, Some(_)) => {
                return Err(ExecError::invalid_operation(format!(
                    "macro '{}' does not take a body block",
                    name
                )));
            }
            _ => {}
        }

        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            values.push(self.ctx.evaluate(argument)?);
        }
        // The body block captures the invocation-site bindings.
        let snapshot = self.ctx.flatten_visible();

        if self.options.debug {
            debug!("macro '{}' with {} argument(s)", name, values.len());
        }
        self.ctx.push_scope();
        for (parameter, value) in macro_def.parameters.iter().zip(values) {
            self.ctx.set_variable(&parameter.name, value);
        }
        if let (Some(body_name), Some(content)) = (&macro_def.body_parameter, body_content) {
            let closure = BlockClosure { block: content.clone(), scope: snapshot };
            self.ctx.set_variable(body_name, Value::Block(Rc::new(closure)));
        }
        let result = self.execute_block(&macro_def.body);
        self.ctx.pop_scope();
        result
    }

    /// Execute a captured block with its invocation-site bindings overlaid
    /// on a fresh scope.
    fn execute_closure(&mut self, closure: &BlockClosure) -> ExecResult<()> {
        self.ctx.push_scope();
        for (name, value) in &closure.scope {
            self.ctx.set_variable(name, value.clone());
        }
        let result = self.execute_block(&closure.block);
        self.ctx.pop_scope();
        result
    }
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Text { .. } => "text",
        Statement::Expression { .. } => "expression",
        Statement::NewLine { .. } => "newline",
        Statement::Comment { .. } => "comment",
        Statement::If { .. } => "if",
        Statement::For { .. } => "for",
        Statement::Let { .. } => "let",
        Statement::File { .. } => "file",
        Statement::ProtectedArea { .. } => "protected",
        Statement::Trace { .. } => "trace",
        Statement::MacroInvocation { .. } => "macro invocation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use crate::strategy::InMemoryStrategy;
    use std::sync::atomic::Ordering;

    #[test]
    fn cancellation_surfaces_at_statement_boundaries() {
        let module =
            parse_module("[module m('u')][template t()]never[/template]").unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        cancel.store(true, Ordering::Relaxed);
        let options = GenerateOptions { cancel: Some(cancel), ..Default::default() };
        let mut interpreter =
            Interpreter::new(module, options, Arc::new(InMemoryStrategy::new()));
        assert_eq!(interpreter.run().unwrap_err(), ExecError::Cancelled);
        assert!(!interpreter.stats().successful);
    }

    #[test]
    fn failure_records_last_error() {
        let module =
            parse_module("[module m('u')][template t()][missing/][/template]").unwrap();
        let mut interpreter = Interpreter::new(
            module,
            GenerateOptions::default(),
            Arc::new(InMemoryStrategy::new()),
        );
        let err = interpreter.run().unwrap_err();
        assert_eq!(err, ExecError::VariableNotFound { name: "missing".into() });
        let stats = interpreter.stats();
        assert!(!stats.successful);
        assert!(stats.last_error.as_deref().unwrap_or("").contains("missing"));
    }
}
