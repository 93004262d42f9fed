mod common;

use sluice_core::ast::{Expr, Stmt};
use sluice_core::diagnostics::{MessageKind, Report};
use sluice_core::types::Constant;

fn parse(source: &str) -> (sluice_core::ast::Unit, Report) {
    let rt = common::runtime();
    let mut report = Report::new();
    let unit = sluice_core::parser::parse(source, "test.sl", &rt, &mut report);
    (unit, report)
}

#[test]
fn unit_collects_handlers_and_vars() {
    let (unit, report) = parse("var greeting = 'hi';\nhandler main { echo greeting; }\n");
    assert!(report.is_empty(), "unexpected diagnostics: {}", report);
    assert_eq!(unit.vars.len(), 1);
    assert_eq!(unit.handlers.len(), 1);
    assert_eq!(unit.handlers[0].name, "main");
}

#[test]
fn node_spans_nest_inside_their_parents() {
    let (unit, report) = parse("handler main {\n  if sum(1, 2) == 3 {\n    echo 'yes';\n  }\n}\n");
    assert!(report.is_empty(), "unexpected diagnostics: {}", report);

    let handler = &unit.handlers[0];
    let Stmt::Compound { stmts, span: body_span } = &handler.body else {
        panic!("handler body must be a block");
    };
    assert!(handler.span.contains(body_span));

    let Stmt::Cond { cond, then, span: if_span, .. } = &stmts[0] else {
        panic!("expected an if statement");
    };
    assert!(body_span.contains(if_span));
    assert!(if_span.contains(cond.span()));
    assert!(if_span.contains(then.span()));

    let Expr::Binary { lhs, rhs, span: cmp_span, .. } = cond else {
        panic!("condition must be a comparison");
    };
    assert!(cmp_span.contains(lhs.span()));
    assert!(cmp_span.contains(rhs.span()));
}

#[test]
fn named_arguments_and_defaults_fill_the_parameter_list() {
    let (unit, report) = parse("handler main { assert(true); }\n");
    assert!(report.is_empty(), "unexpected diagnostics: {}", report);

    let Stmt::Compound { stmts, .. } = &unit.handlers[0].body else {
        panic!()
    };
    let Stmt::Expr { expr: Expr::Call { args, .. }, .. } = &stmts[0] else {
        panic!("expected a call statement");
    };
    // the trailing `description` parameter is auto-filled from its default
    assert_eq!(args.len(), 2);
    assert_eq!(args[1].as_literal(), Some(&Constant::Str(String::new())));
}

#[test]
fn named_argument_errors_are_reported() {
    let (_, report) = parse("handler main { assert(true, nonsense: 1); }\n");
    assert_eq!(report.count_of(MessageKind::TypeError), 1);

    let (_, report) = parse("handler setup { listen; }\n");
    assert_eq!(report.count_of(MessageKind::TypeError), 1, "missing required argument");
}

#[test]
fn match_arms_must_share_one_class() {
    let source = "handler main {\n  match req.path on {\n    '/a' => echo 'a';\n    =^ '/b' => echo 'b';\n  }\n}\n";
    let (_, report) = parse(source);
    assert_eq!(report.count_of(MessageKind::TypeError), 1);
    let message = report.iter().next().unwrap();
    assert!(message.text.contains("match-class mismatch"), "got: {}", message.text);
}

#[test]
fn unknown_variable_assignment_is_a_type_error() {
    let (_, report) = parse("handler main { nope = 1; }\n");
    assert_eq!(report.count_of(MessageKind::TypeError), 1);
}

#[test]
fn syntax_errors_resynchronize_at_statement_boundaries() {
    let source = "handler main {\n  var = ;\n  echo 'still parsed';\n}\n";
    let (unit, report) = parse(source);
    assert!(report.count_of(MessageKind::SyntaxError) >= 1);
    // the handler itself survived
    assert_eq!(unit.handlers.len(), 1);
}

#[test]
fn statement_calls_accept_paren_free_arguments() {
    let (unit, report) = parse("handler setup { listen port: 8080; }\n");
    assert!(report.is_empty(), "unexpected diagnostics: {}", report);
    let Stmt::Compound { stmts, .. } = &unit.handlers[0].body else {
        panic!()
    };
    let Stmt::HandlerCall { callee, args, .. } = &stmts[0] else {
        panic!("expected a handler invocation");
    };
    assert_eq!(callee.name(), "listen");
    assert_eq!(args[0].as_literal(), Some(&Constant::Number(8080)));
}
