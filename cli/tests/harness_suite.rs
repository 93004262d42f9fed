use std::io::Write;
use std::path::Path;

use sluice_cli::harness;
use sluice_cli::tester;
use sluice_core::diagnostics::MessageKind;

#[test]
fn expectation_lines_parse_kinds_locations_and_text() {
    let source = "\
handler main { echo 'x'; }
# ----
# TypeError: [3:1..3:9] something odd
# Warning: no location here
# LinkError: [7:2] continued message
#     over two lines
";
    let expected = harness::parse_expectations(source, "exp.sl");
    assert_eq!(expected.len(), 3);

    let messages: Vec<_> = expected.iter().collect();
    assert_eq!(messages[0].kind, MessageKind::TypeError);
    let span = messages[0].location.as_ref().unwrap();
    assert_eq!((span.begin.line, span.begin.column), (3, 1));
    assert_eq!((span.end.line, span.end.column), (3, 9));

    assert_eq!(messages[1].kind, MessageKind::Warning);
    assert!(messages[1].location.is_none());
    assert_eq!(messages[1].text, "no location here");

    assert_eq!(messages[2].kind, MessageKind::LinkError);
    let span = messages[2].location.as_ref().unwrap();
    assert_eq!(span.begin, span.end);
    assert_eq!(messages[2].text, "continued message over two lines");
}

#[test]
fn text_before_the_separator_is_not_an_expectation() {
    let source = "# TypeError: [1:1] not expected, no separator\nhandler main { echo 'x'; }\n";
    let expected = harness::parse_expectations(source, "none.sl");
    assert!(expected.is_empty());
}

#[test]
fn clean_scripts_with_no_expectations_pass() {
    let runtime = tester::tester_runtime();
    let outcome =
        harness::check_source("handler main { echo req.path; }\n", "inline.sl", &runtime);
    assert!(outcome.passed(), "missing: {:?} superfluous: {:?}", outcome.missing, outcome.superfluous);
}

#[test]
fn unexpected_diagnostics_fail_the_file() {
    let runtime = tester::tester_runtime();
    let outcome = harness::check_source("handler main { nope(); }\n", "inline.sl", &runtime);
    assert!(!outcome.passed());
    assert!(outcome.missing.is_empty());
    assert_eq!(outcome.superfluous.len(), 1);
    assert_eq!(outcome.superfluous[0].kind, MessageKind::LinkError);
}

#[test]
fn expected_but_absent_diagnostics_fail_the_file() {
    let runtime = tester::tester_runtime();
    let source = "handler main { echo 'fine'; }\n# ----\n# TypeError: [1:1] ghost problem\n";
    let outcome = harness::check_source(source, "inline.sl", &runtime);
    assert!(!outcome.passed());
    assert_eq!(outcome.missing.len(), 1);
    assert!(outcome.superfluous.is_empty());
}

#[test]
fn the_bundled_suite_passes() {
    let runtime = tester::tester_runtime();
    let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data");
    let outcomes = harness::run_suite(&data, &runtime).expect("suite readable");
    assert!(outcomes.len() >= 6);
    for outcome in &outcomes {
        assert!(
            outcome.passed(),
            "{} failed; missing: {:?} superfluous: {:?}",
            outcome.file,
            outcome.missing,
            outcome.superfluous
        );
    }
}

#[test]
fn suites_run_from_temporary_directories_too() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("probe.sl");
    let mut file = std::fs::File::create(&path).expect("create");
    writeln!(file, "handler main {{ sleep 1; }}").unwrap();
    drop(file);

    let runtime = tester::tester_runtime();
    let outcomes = harness::run_suite(dir.path(), &runtime).expect("suite readable");
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].passed());
}
