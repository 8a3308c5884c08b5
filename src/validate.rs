//! Static checks beyond what the parser enforces: a `validate` run reports
//! problems that would otherwise only surface mid-generation.

use crate::ast::expr::Expr;
use crate::ast::module::Module;
use crate::ast::stmt::{Block, Statement};

/// Human-readable diagnostics; empty means the module validates.
pub fn validate(module: &Module) -> Vec<String> {
    let mut issues = Vec::new();

    if module.templates.is_empty() {
        issues.push("module declares no templates".to_string());
    }

    for template in module.templates.values() {
        let where_ = format!("template '{}'", template.name);
        if let Some(guard) = &template.guard {
            check_expr(module, guard, &where_, &mut issues);
        }
        if let Some(post) = &template.post {
            check_expr(module, post, &where_, &mut issues);
        }
        if let Some(parent) = &template.overrides {
            if !module.templates.contains_key(parent) {
                issues.push(format!(
                    "{} overrides unknown template '{}'",
                    where_, parent
                ));
            }
        }
        check_block(module, &template.body, &where_, &mut issues);
    }
    for query in module.queries.values() {
        check_expr(module, &query.body, &format!("query '{}'", query.name), &mut issues);
    }
    for macro_def in module.macros.values() {
        check_block(
            module,
            &macro_def.body,
            &format!("macro '{}'", macro_def.name),
            &mut issues,
        );
    }

    issues
}

fn check_block(module: &Module, block: &Block, where_: &str, issues: &mut Vec<String>) {
    for statement in &block.statements {
        check_statement(module, statement, where_, issues);
    }
}

fn check_statement(module: &Module, statement: &Statement, where_: &str, issues: &mut Vec<String>) {
    match statement {
        Statement::Text { .. } | Statement::NewLine { .. } | Statement::Comment { .. } => {}
        Statement::Expression { expr, .. } => check_expr(module, expr, where_, issues),
        Statement::If { condition, then_block, elseif_clauses, else_block } => {
            check_expr(module, condition, where_, issues);
            check_block(module, then_block, where_, issues);
            for (clause_condition, clause_block) in elseif_clauses {
                check_expr(module, clause_condition, where_, issues);
                check_block(module, clause_block, where_, issues);
            }
            if let Some(block) = else_block {
                check_block(module, block, where_, issues);
            }
        }
        Statement::For { collection, separator, body, .. } => {
            check_expr(module, collection, where_, issues);
            if let Some(sep) = separator {
                check_expr(module, sep, where_, issues);
            }
            check_block(module, body, where_, issues);
        }
        Statement::Let { bindings, body } => {
            for binding in bindings {
                check_expr(module, &binding.init, where_, issues);
            }
            check_block(module, body, where_, issues);
        }
        Statement::File { url, charset, body, .. } => {
            check_expr(module, url, where_, issues);
            if let Some(cs) = charset {
                check_expr(module, cs, where_, issues);
            }
            check_block(module, body, where_, issues);
        }
        Statement::ProtectedArea { id, start_prefix, end_prefix, body } => {
            check_expr(module, id, where_, issues);
            if let Some(p) = start_prefix {
                check_expr(module, p, where_, issues);
            }
            if let Some(p) = end_prefix {
                check_expr(module, p, where_, issues);
            }
            check_block(module, body, where_, issues);
        }
        Statement::Trace { source, body } => {
            check_expr(module, source, where_, issues);
            check_block(module, body, where_, issues);
        }
        Statement::MacroInvocation { name, arguments, body_content } => {
            if !module.macros.contains_key(name) {
                issues.push(format!("{} invokes unknown macro '{}'", where_, name));
            }
            for argument in arguments {
                check_expr(module, argument, where_, issues);
            }
            if let Some(block) = body_content {
                check_block(module, block, where_, issues);
            }
        }
    }
}

/// Calls must resolve to a declared query, template, or macro.
fn check_expr(module: &Module, expr: &Expr, where_: &str, issues: &mut Vec<String>) {
    match expr {
        Expr::Boolean(_)
        | Expr::Integer(_)
        | Expr::Real(_)
        | Expr::String(_)
        | Expr::Variable(_) => {}
        Expr::Binary { left, right, .. } => {
            check_expr(module, left, where_, issues);
            check_expr(module, right, where_, issues);
        }
        Expr::Not(operand) => check_expr(module, operand, where_, issues),
        Expr::Navigation { source, .. } => check_expr(module, source, where_, issues),
        Expr::CollectionCall { source, body, .. } => {
            check_expr(module, source, where_, issues);
            if let Some(body) = body {
                check_expr(module, body, where_, issues);
            }
        }
        Expr::Call { name, arguments } => {
            if !module.queries.contains_key(name)
                && !module.templates.contains_key(name)
                && !module.macros.contains_key(name)
            {
                issues.push(format!(
                    "{} calls '{}', which is not a declared query, template, or macro",
                    where_, name
                ));
            }
            for argument in arguments {
                check_expr(module, argument, where_, issues);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    #[test]
    fn valid_module_has_no_issues() {
        let module = parse_module(
            "[module m('u')][query q(n : Integer) : Integer = n * 2/][template t()][q(1)/][/template]",
        )
        .unwrap();
        assert!(validate(&module).is_empty());
    }

    #[test]
    fn unknown_call_is_reported() {
        let module =
            parse_module("[module m('u')][template t()][ghost(1)/][/template]").unwrap();
        let issues = validate(&module);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("ghost"));
    }

    #[test]
    fn empty_module_is_reported() {
        let module = parse_module("[module m('u')]").unwrap();
        let issues = validate(&module);
        assert!(issues.iter().any(|i| i.contains("no templates")));
    }

    #[test]
    fn unknown_override_is_reported() {
        let module = parse_module(
            "[module m('u')][template t() overrides base]x[/template]",
        )
        .unwrap();
        let issues = validate(&module);
        assert!(issues.iter().any(|i| i.contains("overrides unknown template 'base'")));
    }
}
