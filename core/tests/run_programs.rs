mod common;

use common::TestContext;
use sluice_core::diagnostics::{MessageKind, Report};
use sluice_core::types::{Constant, LiteralType};
use sluice_core::vm::{RunResult, Runtime, RuntimeError, Verdict};

#[test]
fn arithmetic_and_assert_run_to_completion() {
    let rt = common::runtime();
    let program = common::compile_linked("handler main {\n  assert(sum(2, 3) == 5);\n}\n", &rt, 2);

    let mut cx = TestContext::default();
    let handler = program.handler("main").expect("main exists");
    match handler.run(&rt, &mut cx) {
        RunResult::Success(done) => assert!(!done),
        other => panic!("expected Success(false), got {:?}", other),
    }
}

#[test]
fn failed_assertions_surface_as_runtime_errors() {
    let rt = common::runtime();
    let program =
        common::compile_linked("handler main { assert(sum(2, 2) == 5, 'math'); }\n", &rt, 0);

    let mut cx = TestContext::default();
    match program.handler("main").unwrap().run(&rt, &mut cx) {
        RunResult::Error(RuntimeError::Native(name, message)) => {
            assert_eq!(name, "assert");
            assert!(message.contains("math"));
        }
        other => panic!("expected a native error, got {:?}", other),
    }
}

#[test]
fn regex_matches_expose_capture_groups() {
    let rt = common::runtime();
    let source = "handler main {\n  if req.path =~ /^\\/user\\/(\\d+)$/ {\n    echo regex.group(1);\n  }\n}\n";
    let program = common::compile_linked(source, &rt, 2);

    let mut cx = TestContext::with_path("/user/42");
    match program.handler("main").unwrap().run(&rt, &mut cx) {
        RunResult::Success(done) => assert!(!done),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(cx.output, "42\n");

    let mut cx = TestContext::with_path("/x");
    match program.handler("main").unwrap().run(&rt, &mut cx) {
        RunResult::Success(done) => assert!(!done),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(cx.output, "");
}

#[test]
fn unknown_natives_fail_to_link_with_one_link_error() {
    let rt = common::runtime();
    let mut report = Report::new();
    let program = sluice_core::compile(
        "handler main {\n  frobnicate();\n}\n",
        "test.sl",
        &rt,
        2,
        &mut report,
    );
    let mut program = program.expect("compiles fine, fails at link time");
    assert!(!program.link(&rt, &mut report));
    assert_eq!(report.count_of(MessageKind::LinkError), 1);

    let message = report.iter().find(|m| m.kind == MessageKind::LinkError).unwrap();
    assert!(message.text.contains("frobnicate"));
    let span = message.location.as_ref().expect("link error carries the call site");
    assert_eq!(span.begin.line, 2);

    // an unlinked program refuses to run
    let mut cx = TestContext::default();
    match program.handler("main").unwrap().run(&rt, &mut cx) {
        RunResult::Error(RuntimeError::NotLinked) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn sleep_suspends_and_resumes() {
    let rt = common::runtime();
    let program = common::compile_linked("handler main { sleep 1; echo 'done'; }\n", &rt, 2);

    let mut cx = TestContext::default();
    let runner = match program.handler("main").unwrap().run(&rt, &mut cx) {
        RunResult::Suspended(runner) => runner,
        other => panic!("expected suspension, got {:?}", other),
    };
    // nothing was echoed before the suspension point
    assert_eq!(cx.output, "");
    assert_eq!(runner.sleep_duration(), Some(1));

    match runner.resume(&mut cx) {
        RunResult::Success(done) => assert!(!done),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(cx.output, "done\n");
}

#[test]
fn rewound_runners_refuse_to_resume() {
    let rt = common::runtime();
    let program = common::compile_linked("handler main { sleep 5; echo 'never'; }\n", &rt, 2);

    let mut cx = TestContext::default();
    let mut runner = match program.handler("main").unwrap().run(&rt, &mut cx) {
        RunResult::Suspended(runner) => runner,
        other => panic!("expected suspension, got {:?}", other),
    };
    runner.rewind();
    assert_eq!(runner.stack_depth(), 0);
    match runner.resume(&mut cx) {
        RunResult::Error(RuntimeError::Aborted) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(cx.output, "");
}

#[test]
fn division_by_zero_halts_the_handler() {
    let rt = common::runtime();
    let program =
        common::compile_linked("handler main { var x = 1 / sum(0, 0); sleep x; }\n", &rt, 0);

    let mut cx = TestContext::default();
    match program.handler("main").unwrap().run(&rt, &mut cx) {
        RunResult::Error(RuntimeError::DivisionByZero) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn builtin_handlers_decide_completion() {
    let rt = common::runtime();
    let program =
        common::compile_linked("handler main { respond result: 1; echo 'after'; }\n", &rt, 2);

    let mut cx = TestContext::default();
    match program.handler("main").unwrap().run(&rt, &mut cx) {
        RunResult::Success(done) => assert!(done, "a true handler result finishes the run"),
        other => panic!("unexpected {:?}", other),
    }
    // execution stopped at the handler invocation
    assert_eq!(cx.output, "");

    let program =
        common::compile_linked("handler main { respond result: 0; echo 'after'; }\n", &rt, 2);
    let mut cx = TestContext::default();
    match program.handler("main").unwrap().run(&rt, &mut cx) {
        RunResult::Success(done) => assert!(!done),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(cx.output, "after\n");
}

#[test]
fn match_statements_route_by_prefix() {
    let rt = common::runtime();
    let source = "handler main {\n  match req.path on {\n    =^ '/api' => echo 'api';\n    =^ '/doc' => echo 'doc';\n    else => echo 'other';\n  }\n}\n";
    let program = common::compile_linked(source, &rt, 2);

    for (path, expected) in [("/api/v1", "api\n"), ("/doc/x", "doc\n"), ("/misc", "other\n")] {
        let mut cx = TestContext::with_path(path);
        match program.handler("main").unwrap().run(&rt, &mut cx) {
            RunResult::Success(_) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cx.output, expected, "path {}", path);
    }
}

#[test]
fn verifiers_fold_calls_into_constants() {
    let mut rt = Runtime::new();
    rt.register_function("echo", LiteralType::Void).param::<String>("text").bind(|p| {
        let text = p.get_string(1);
        if let Some(cx) = p.context_mut::<TestContext>() {
            cx.output.push_str(&text);
            cx.output.push('\n');
        }
    });
    rt.register_function("config.get", LiteralType::String)
        .param::<String>("key")
        .bind(|p| p.set_result("runtime".to_string()))
        .verifier(|call| match call.const_arg(0) {
            Some(Constant::Str(key)) if key == "known" => {
                Verdict::Replace(Constant::Str("folded".into()))
            }
            Some(_) => Verdict::Keep,
            None => Verdict::Reject("config.get requires a literal key".into()),
        });

    let program = common::compile_linked("handler main { echo config.get('known'); }\n", &rt, 0);
    // the folded call leaves no native function reference behind
    assert!(program
        .pool()
        .native_functions()
        .iter()
        .all(|r| r.signature.name != "config.get"));

    let mut cx = TestContext::default();
    match program.handler("main").unwrap().run(&rt, &mut cx) {
        RunResult::Success(_) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(cx.output, "folded\n");

    // a rejected call surfaces as a TypeError during compilation
    let mut report = Report::new();
    let mut bad = Report::new();
    let unit = sluice_core::parse(
        "handler main { var k = 'dyn'; echo config.get(k); }\n",
        "test.sl",
        &rt,
        &mut report,
    )
    .unwrap();
    let mut ir = sluice_core::lower(&unit, &["main"], &mut bad).unwrap();
    assert!(!rt.verify_native_calls(&mut ir, &mut bad));
    assert_eq!(bad.count_of(MessageKind::TypeError), 1);
}
