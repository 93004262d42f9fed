mod common;

use sluice_core::diagnostics::{MessageKind, Report};
use sluice_core::sema;

const SETUP_API: &[&str] = &["listen"];
const MAIN_API: &[&str] = &["echo", "sum", "assert", "req.path", "regex.group", "sleep", "respond", "handler.true"];

fn validate(source: &str) -> Report {
    let rt = common::runtime();
    let mut report = Report::new();
    let unit = sluice_core::parse(source, "test.sl", &rt, &mut report).expect("parse failed");
    sema::validate_api(&unit, "setup", SETUP_API, &rt, &mut report);
    sema::validate_api(&unit, "main", MAIN_API, &rt, &mut report);
    report
}

#[test]
fn setup_only_builtins_are_rejected_in_main() {
    let source = "handler setup { listen port: 8080; }\nhandler main  { listen port: 9090; }\n";
    let report = validate(source);
    assert_eq!(report.count_of(MessageKind::TypeError), 1);

    let message = report.iter().next().unwrap();
    assert_eq!(message.text, "'listen' is not allowed from handler 'main'");
    let span = message.location.as_ref().expect("violation carries a location");
    // the second `listen`, not the first
    assert_eq!((span.begin.line, span.begin.column), (2, 17));
}

#[test]
fn allowed_builtins_pass() {
    let source = "handler setup { listen port: 8080; }\nhandler main { echo 'ok'; }\n";
    let report = validate(source);
    assert!(report.is_empty(), "unexpected diagnostics: {}", report);
}

#[test]
fn violations_are_found_through_user_handler_calls() {
    let source = "handler helper { listen port: 1; }\nhandler main { helper; }\n";
    let report = validate(source);
    assert_eq!(report.count_of(MessageKind::TypeError), 1);
}

#[test]
fn call_collection_reaches_nested_expressions() {
    let rt = common::runtime();
    let mut report = Report::new();
    let unit = sluice_core::parse(
        "handler main { if sum(1, 2) == 3 { echo 'x'; } }\n",
        "test.sl",
        &rt,
        &mut report,
    )
    .expect("parse failed");
    let calls = sema::calls_of(&unit, "main");
    let names: Vec<&str> = calls.iter().map(|c| c.name).collect();
    assert!(names.contains(&"sum"));
    assert!(names.contains(&"echo"));
}
