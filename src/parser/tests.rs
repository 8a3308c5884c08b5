use super::parse_module;
use crate::ast::expr::{BinaryOp, CollectionOp, Expr};
use crate::ast::module::{Module, Visibility};
use crate::ast::stmt::{FileMode, Statement};
use crate::error::ParseErrorKind;

fn body_of<'m>(module: &'m Module, template: &str) -> &'m [Statement] {
    &module.templates[template].body.statements
}

#[test]
fn module_header_with_metamodels() {
    let module = parse_module("[module gen('http://a', 'http://b')]").unwrap();
    assert_eq!(module.name, "gen");
    let uris: Vec<&String> = module.metamodels.values().collect();
    assert_eq!(uris, ["http://a", "http://b"]);
    assert_eq!(module.encoding, "UTF-8");
}

#[test]
fn template_signature_flags() {
    let module = parse_module(
        "[module m('u')][template private gen(c : ecore::EClass) main overrides base guard (true) post (true)]x[/template]",
    )
    .unwrap();
    let template = &module.templates["gen"];
    assert_eq!(template.visibility, Visibility::Private);
    assert_eq!(template.parameters.len(), 1);
    assert_eq!(template.parameters[0].name, "c");
    assert_eq!(template.parameters[0].type_name, "ecore::EClass");
    assert!(template.is_main);
    assert_eq!(template.overrides.as_deref(), Some("base"));
    assert!(template.guard.is_some());
    assert!(template.post.is_some());
}

#[test]
fn question_mark_spells_guard() {
    let module = parse_module(
        "[module m('u')][template t(n : Integer) ? (n > 0)]x[/template]",
    )
    .unwrap();
    assert!(module.templates["t"].guard.is_some());
}

#[test]
fn duplicate_template_is_a_parse_error() {
    let err = parse_module(
        "[module m('u')][template t()]a[/template][template t()]b[/template]",
    )
    .unwrap_err();
    assert_eq!(
        err.kind,
        ParseErrorKind::DuplicateName { kind: "template", name: "t".into() }
    );
}

#[test]
fn duplicate_parameter_is_a_parse_error() {
    let err = parse_module(
        "[module m('u')][template t(a : String, a : String)]x[/template]",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::DuplicateName { kind: "parameter", .. }));
}

#[test]
fn keyword_spellings_are_valid_names() {
    let module = parse_module(
        "[module m('u')][template select(size : String)][size/][/template]",
    )
    .unwrap();
    let template = &module.templates["select"];
    assert_eq!(template.parameters[0].name, "size");
}

#[test]
fn import_and_extends_kept_as_metadata() {
    let module = parse_module(
        "[module m('u')][extends base][import helpers][import more][template t()]x[/template]",
    )
    .unwrap();
    assert_eq!(module.extends.as_deref(), Some("base"));
    assert_eq!(module.imports, ["helpers", "more"]);
}

#[test]
fn comment_before_declaration_becomes_documentation() {
    let module = parse_module(
        "[module m('u')][-- Renders one class. ][template t()]x[/template]",
    )
    .unwrap();
    assert_eq!(
        module.templates["t"].documentation.as_deref(),
        Some("Renders one class.")
    );
}

#[test]
fn query_declaration() {
    let module = parse_module(
        "[module m('u')][query public double(n : Integer) : Integer = n * 2/]",
    )
    .unwrap();
    let query = &module.queries["double"];
    assert_eq!(query.return_type, "Integer");
    assert_eq!(
        query.body,
        Expr::binary(BinaryOp::Multiply, Expr::Variable("n".into()), Expr::Integer(2))
    );
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let module =
        parse_module("[module m('u')][template t()][a + b * 2/][/template]").unwrap();
    let Statement::Expression { expr, .. } = &body_of(&module, "t")[0] else {
        panic!("expected expression statement");
    };
    assert_eq!(
        *expr,
        Expr::binary(
            BinaryOp::Add,
            Expr::Variable("a".into()),
            Expr::binary(BinaryOp::Multiply, Expr::Variable("b".into()), Expr::Integer(2)),
        )
    );
}

#[test]
fn comparison_binds_tighter_than_and() {
    let module = parse_module(
        "[module m('u')][template t()][if (a < 1 and b >= 2)]x[/if][/template]",
    )
    .unwrap();
    let Statement::If { condition, .. } = &body_of(&module, "t")[0] else {
        panic!("expected if statement");
    };
    assert_eq!(
        *condition,
        Expr::binary(
            BinaryOp::And,
            Expr::binary(BinaryOp::LessThan, Expr::Variable("a".into()), Expr::Integer(1)),
            Expr::binary(BinaryOp::GreaterOrEqual, Expr::Variable("b".into()), Expr::Integer(2)),
        )
    );
}

#[test]
fn collection_operation_with_iterator() {
    let module = parse_module(
        "[module m('u')][template t()][items->select(i | i > 0)->size()/][/template]",
    )
    .unwrap();
    let Statement::Expression { expr, .. } = &body_of(&module, "t")[0] else {
        panic!("expected expression statement");
    };
    let Expr::CollectionCall { op: CollectionOp::Size, source, .. } = expr else {
        panic!("expected size call, got {:?}", expr);
    };
    let Expr::CollectionCall { op: CollectionOp::Select, iterator, .. } = source.as_ref() else {
        panic!("expected select under size");
    };
    assert_eq!(iterator.as_deref(), Some("i"));
}

#[test]
fn unknown_arrow_operation_is_malformed() {
    let err = parse_module(
        "[module m('u')][template t()][items->frobnicate(x | x)/][/template]",
    )
    .unwrap_err();
    assert_eq!(
        err.kind,
        ParseErrorKind::MalformedExpression {
            message: "unknown collection operation 'frobnicate'".into()
        }
    );
}

#[test]
fn inline_text_stays_inlined() {
    let module =
        parse_module("[module m('u')][template t()]Hello[/template]").unwrap();
    let template = &module.templates["t"];
    assert!(template.body.inlined);
    assert_eq!(
        template.body.statements,
        [Statement::text("Hello", false)]
    );
}

#[test]
fn template_body_stays_at_base_indentation() {
    let module =
        parse_module("[module m('u')][template t()]\nline\n[/template]").unwrap();
    let template = &module.templates["t"];
    assert!(template.body.inlined, "root bodies never gain a level");
    assert_eq!(template.body.statements, [Statement::text("line", true)]);
}

#[test]
fn nested_block_on_its_own_line_is_not_inlined() {
    let module = parse_module(
        "[module m('u')][template t()]\nhead\n[for (x in items)]\n[x/]\n[/for]\ntail\n[/template]",
    )
    .unwrap();
    let statements = body_of(&module, "t");
    let Statement::For { body, .. } = &statements[1] else {
        panic!("expected for as second statement, got {:?}", statements);
    };
    assert!(!body.inlined);
    // The close tag owns its trailing line break: no blank line before the
    // following text.
    assert!(matches!(&statements[2], Statement::Text { value, .. } if value == "tail"));
}

#[test]
fn blank_lines_become_newline_statements() {
    let module =
        parse_module("[module m('u')][template t()]a\n\nb[/template]").unwrap();
    let statements = body_of(&module, "t");
    assert_eq!(statements.len(), 3);
    assert!(matches!(statements[0], Statement::Text { ref value, newline_needed: true } if value == "a"));
    assert!(matches!(statements[1], Statement::NewLine { indentation_needed: true }));
    assert!(matches!(statements[2], Statement::Text { ref value, newline_needed: false } if value == "b"));
}

#[test]
fn file_mode_promotion() {
    let module = parse_module(
        "[module m('u')][template t()][file ('a', true)]x[/file][file ('b', 'create')]y[/file][file ('c', mode)]z[/file][file ('d', append, 'UTF-8')]w[/file][/template]",
    )
    .unwrap();
    let statements = body_of(&module, "t");
    let modes: Vec<FileMode> = statements
        .iter()
        .map(|s| match s {
            Statement::File { mode, .. } => *mode,
            other => panic!("expected file statement, got {:?}", other),
        })
        .collect();
    assert_eq!(
        modes,
        [FileMode::Append, FileMode::Create, FileMode::Overwrite, FileMode::Append]
    );
    let Statement::File { charset, .. } = &statements[3] else { unreachable!() };
    assert_eq!(charset.as_ref().unwrap().as_string_literal(), Some("UTF-8"));
}

#[test]
fn elseif_chain_structure() {
    let module = parse_module(
        "[module m('u')][template t()][if (a)]1[elseif (b)]2[elseif (c)]3[else]4[/if][/template]",
    )
    .unwrap();
    let Statement::If { elseif_clauses, else_block, .. } = &body_of(&module, "t")[0] else {
        panic!("expected if");
    };
    assert_eq!(elseif_clauses.len(), 2);
    assert!(else_block.is_some());
}

#[test]
fn for_with_separator_and_typed_variable() {
    let module = parse_module(
        "[module m('u')][template t()][for (e : ecore::EClass in items) separator (', ')][e/][/for][/template]",
    )
    .unwrap();
    let Statement::For { variable, separator, .. } = &body_of(&module, "t")[0] else {
        panic!("expected for");
    };
    assert_eq!(variable.name, "e");
    assert_eq!(variable.type_name.as_deref(), Some("ecore::EClass"));
    assert_eq!(separator.as_ref().unwrap().as_string_literal(), Some(", "));
}

#[test]
fn let_with_multiple_bindings() {
    let module = parse_module(
        "[module m('u')][template t()][let a = 1, b = a + 1]x[/let][/template]",
    )
    .unwrap();
    let Statement::Let { bindings, .. } = &body_of(&module, "t")[0] else {
        panic!("expected let");
    };
    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings[0].variable.name, "a");
    assert_eq!(bindings[1].variable.name, "b");
}

#[test]
fn trace_statement_vs_query_call() {
    let module = parse_module(
        "[module m('u')][query trace(x : String) : String = x/][template t()][trace (obj)]body[/trace][trace('y')/][/template]",
    )
    .unwrap();
    let statements = body_of(&module, "t");
    assert!(matches!(statements[0], Statement::Trace { .. }));
    assert!(matches!(
        statements[1],
        Statement::Expression { expr: Expr::Call { .. }, .. }
    ));
}

#[test]
fn macro_invocation_with_body() {
    let module = parse_module(
        "[module m('u')][macro wrap(tag : String | content)]<[tag/]>[content/]</[tag/]>[/macro][template t()][wrap('b')]inner[/wrap][/template]",
    )
    .unwrap();
    let Statement::MacroInvocation { name, arguments, body_content } = &body_of(&module, "t")[0]
    else {
        panic!("expected macro invocation");
    };
    assert_eq!(name, "wrap");
    assert_eq!(arguments.len(), 1);
    assert!(body_content.is_some());
}

#[test]
fn call_to_undeclared_name_stays_an_expression() {
    let module = parse_module(
        "[module m('u')][template t()][helper('x')/][/template]",
    )
    .unwrap();
    assert!(matches!(
        body_of(&module, "t")[0],
        Statement::Expression { expr: Expr::Call { .. }, .. }
    ));
}

#[test]
fn missing_close_tag_is_reported() {
    let err = parse_module("[module m('u')][template t()]dangling").unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::InvalidSyntax { .. }));
}

#[test]
fn unknown_top_level_directive_is_reported() {
    let err = parse_module("[module m('u')][widget w()]").unwrap_err();
    assert_eq!(
        err.kind,
        ParseErrorKind::UnknownStatementType { name: "widget".into() }
    );
}

#[test]
fn error_position_points_at_offending_token() {
    let err = parse_module("[module m('u')]\n[template ()]x[/template]").unwrap_err();
    assert_eq!(err.position.line, 2);
    assert_eq!(err.position.column, 11);
}
