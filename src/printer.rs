//! Serialises a module AST back to template source.
//!
//! The output re-parses to an equal module: directive spelling, block
//! newlines, and expression parenthesisation are all chosen so the parser
//! reconstructs the same tree.

use std::fmt::Write;

use crate::ast::expr::{BinaryOp, Expr};
use crate::ast::module::{Macro, Module, Query, Template};
use crate::ast::stmt::{Block, FileMode, Statement, Variable};

pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    let uris: Vec<String> = module
        .metamodels
        .values()
        .map(|uri| quote(uri))
        .collect();
    let _ = write!(out, "[module {}({})]", module.name, uris.join(", "));
    out.push('\n');

    if let Some(parent) = &module.extends {
        let _ = write!(out, "[extends {}]", parent);
        out.push('\n');
    }
    for import in &module.imports {
        let _ = write!(out, "[import {}]", import);
        out.push('\n');
    }

    // Declarations interleave in their dictionaries' insertion order; emit
    // queries and macros first so templates can invoke them, then templates.
    for query in module.queries.values() {
        print_query(&mut out, query);
    }
    for macro_def in module.macros.values() {
        print_macro(&mut out, macro_def);
    }
    for template in module.templates.values() {
        print_template(&mut out, template);
    }
    out
}

fn print_doc(out: &mut String, documentation: &Option<String>) {
    if let Some(doc) = documentation {
        let _ = write!(out, "[--{}]", doc);
        out.push('\n');
    }
}

fn print_template(out: &mut String, template: &Template) {
    print_doc(out, &template.documentation);
    let _ = write!(
        out,
        "[template {} {}({})",
        template.visibility.as_str(),
        template.name,
        params(&template.parameters)
    );
    if template.is_main {
        out.push_str(" main");
    }
    if let Some(parent) = &template.overrides {
        let _ = write!(out, " overrides {}", parent);
    }
    if let Some(guard) = &template.guard {
        let _ = write!(out, " guard ({})", print_expr(guard));
    }
    if let Some(post) = &template.post {
        let _ = write!(out, " post ({})", print_expr(post));
    }
    out.push(']');
    print_block(out, &template.body);
    out.push_str("[/template]\n");
}

fn print_query(out: &mut String, query: &Query) {
    print_doc(out, &query.documentation);
    let _ = write!(
        out,
        "[query {} {}({}) : {} = {}/]",
        query.visibility.as_str(),
        query.name,
        params(&query.parameters),
        query.return_type,
        print_expr(&query.body)
    );
    out.push('\n');
}

fn print_macro(out: &mut String, macro_def: &Macro) {
    print_doc(out, &macro_def.documentation);
    let mut signature = params(&macro_def.parameters);
    if let Some(body_param) = &macro_def.body_parameter {
        if signature.is_empty() {
            signature = format!("| {}", body_param);
        } else {
            signature = format!("{} | {}", signature, body_param);
        }
    }
    let _ = write!(out, "[macro {}({})]", macro_def.name, signature);
    print_block(out, &macro_def.body);
    out.push_str("[/macro]");
    out.push('\n');
}

fn params(parameters: &[crate::ast::module::Parameter]) -> String {
    parameters
        .iter()
        .map(|p| format!("{} : {}", p.name, p.type_name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_block(out: &mut String, block: &Block) {
    if !block.inlined {
        out.push('\n');
    }
    for statement in &block.statements {
        print_statement(out, statement);
    }
}

fn print_statement(out: &mut String, statement: &Statement) {
    match statement {
        Statement::Text { value, newline_needed } => {
            out.push_str(value);
            if *newline_needed {
                out.push('\n');
            }
        }
        Statement::NewLine { .. } => out.push('\n'),
        Statement::Expression { expr, newline_needed } => {
            let _ = write!(out, "[{}/]", print_expr(expr));
            if *newline_needed {
                out.push('\n');
            }
        }
        Statement::Comment { value } => {
            let _ = write!(out, "[--{}]", value);
        }
        Statement::If { condition, then_block, elseif_clauses, else_block } => {
            let _ = write!(out, "[if ({})]", print_expr(condition));
            print_block(out, then_block);
            for (clause_condition, clause_block) in elseif_clauses {
                let _ = write!(out, "[elseif ({})]", print_expr(clause_condition));
                print_block(out, clause_block);
            }
            if let Some(block) = else_block {
                out.push_str("[else]");
                print_block(out, block);
            }
            out.push_str("[/if]");
        }
        Statement::For { variable, collection, separator, body } => {
            let _ = write!(out, "[for ({} in {})", binding_name(variable), print_expr(collection));
            if let Some(sep) = separator {
                let _ = write!(out, " separator ({})", print_expr(sep));
            }
            out.push(']');
            print_block(out, body);
            out.push_str("[/for]");
        }
        Statement::Let { bindings, body } => {
            let rendered: Vec<String> = bindings
                .iter()
                .map(|b| format!("{} = {}", binding_name(&b.variable), print_expr(&b.init)))
                .collect();
            let _ = write!(out, "[let {}]", rendered.join(", "));
            print_block(out, body);
            out.push_str("[/let]");
        }
        Statement::File { url, mode, charset, body } => {
            let _ = write!(out, "[file ({}", print_expr(url));
            if *mode != FileMode::Overwrite || charset.is_some() {
                let _ = write!(out, ", {}", mode.as_str());
            }
            if let Some(cs) = charset {
                let _ = write!(out, ", {}", print_expr(cs));
            }
            out.push_str(")]");
            print_block(out, body);
            out.push_str("[/file]");
        }
        Statement::ProtectedArea { id, start_prefix, end_prefix, body } => {
            let _ = write!(out, "[protected ({}", print_expr(id));
            if let Some(start) = start_prefix {
                let _ = write!(out, ", {}", print_expr(start));
            }
            if let Some(end) = end_prefix {
                let _ = write!(out, ", {}", print_expr(end));
            }
            out.push_str(")]");
            print_block(out, body);
            out.push_str("[/protected]");
        }
        Statement::Trace { source, body } => {
            let _ = write!(out, "[trace ({})]", print_expr(source));
            print_block(out, body);
            out.push_str("[/trace]");
        }
        Statement::MacroInvocation { name, arguments, body_content } => {
            let args: Vec<String> = arguments.iter().map(print_expr).collect();
            let _ = write!(out, "[{}({})", name, args.join(", "));
            match body_content {
                Some(body) => {
                    out.push(']');
                    print_block(out, body);
                    let _ = write!(out, "[/{}]", name);
                }
                None => out.push_str("/]"),
            }
        }
    }
}

fn binding_name(variable: &Variable) -> String {
    match &variable.type_name {
        Some(type_name) => format!("{} : {}", variable.name, type_name),
        None => variable.name.clone(),
    }
}

// Expression rendering with minimal parenthesisation. Levels mirror the
// parser's precedence climb.

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, .. } => match op {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Equals
            | BinaryOp::NotEquals
            | BinaryOp::LessThan
            | BinaryOp::GreaterThan
            | BinaryOp::LessOrEqual
            | BinaryOp::GreaterOrEqual => 3,
            BinaryOp::Add | BinaryOp::Subtract => 4,
            BinaryOp::Multiply | BinaryOp::Divide => 5,
        },
        Expr::Not(_) => 6,
        Expr::Navigation { .. } | Expr::CollectionCall { .. } => 7,
        Expr::Call { .. } => 8,
        _ => 9,
    }
}

pub fn print_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Boolean(b) => {
            out.push_str(if *b { "true" } else { "false" });
        }
        Expr::Integer(n) => {
            let _ = write!(out, "{}", n);
        }
        Expr::Real(r) => {
            // Keep a decimal point so the literal re-lexes as a real.
            if r.fract() == 0.0 {
                let _ = write!(out, "{:.1}", r);
            } else {
                let _ = write!(out, "{}", r);
            }
        }
        Expr::String(s) => out.push_str(&quote(s)),
        Expr::Variable(name) => out.push_str(name),
        Expr::Binary { op, left, right } => {
            let prec = precedence(expr);
            write_child(out, left, precedence(left) < prec);
            let _ = write!(out, " {} ", op.symbol());
            write_child(out, right, precedence(right) <= prec);
        }
        Expr::Not(operand) => {
            out.push_str("not ");
            write_child(out, operand, precedence(operand) < 6);
        }
        Expr::Navigation { source, property } => {
            write_child(out, source, precedence(source) < 7);
            let _ = write!(out, ".{}", property);
        }
        Expr::CollectionCall { source, op, iterator, body } => {
            write_child(out, source, precedence(source) < 7);
            let _ = write!(out, "->{}", op.name());
            if let Some(body) = body {
                out.push('(');
                if let Some(iterator) = iterator {
                    let _ = write!(out, "{} | ", iterator);
                }
                write_expr(out, body);
                out.push(')');
            } else {
                out.push_str("()");
            }
        }
        Expr::Call { name, arguments } => {
            let args: Vec<String> = arguments.iter().map(print_expr).collect();
            let _ = write!(out, "{}({})", name, args.join(", "));
        }
    }
}

fn write_child(out: &mut String, child: &Expr, parenthesise: bool) {
    if parenthesise {
        out.push('(');
        write_expr(out, child);
        out.push(')');
    } else {
        write_expr(out, child);
    }
}

fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        match c {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}
