//! Shared fixture: a miniature host runtime mirroring what the CLI links
//! against, plus compile helpers used across the integration tests.

use sluice_core::diagnostics::Report;
use sluice_core::ir::IrProgram;
use sluice_core::types::LiteralType;
use sluice_core::vm::{Program, Runtime};

#[derive(Debug, Default)]
pub struct TestContext {
    pub path: String,
    pub output: String,
}

impl TestContext {
    pub fn with_path(path: &str) -> Self {
        TestContext { path: path.to_string(), output: String::new() }
    }
}

pub fn runtime() -> Runtime {
    let mut rt = Runtime::new();

    rt.register_handler("handler.true").bind(|p| p.set_result(true));

    rt.register_handler("respond").param::<i64>("result").bind(|p| {
        let result = p.get_bool(1);
        p.set_result(result);
    });

    rt.register_handler("listen").param::<i64>("port").bind(|p| {
        let _ = p.get_number(1);
        p.set_result(false);
    });

    rt.register_function("sum", LiteralType::Number)
        .param::<i64>("x")
        .param::<i64>("y")
        .bind(|p| {
            let v = p.get_number(1).wrapping_add(p.get_number(2));
            p.set_result(v);
        });

    rt.register_function("assert", LiteralType::Number)
        .param::<i64>("condition")
        .param_default::<String>("description", "")
        .bind(|p| {
            if p.get_bool(1) {
                p.set_result(1i64);
            } else {
                let d = p.get_string(2);
                p.fail(format!("assertion failed ({})", d));
            }
        });

    rt.register_function("echo", LiteralType::Void).param::<String>("text").bind(|p| {
        let text = p.get_string(1);
        if let Some(cx) = p.context_mut::<TestContext>() {
            cx.output.push_str(&text);
            cx.output.push('\n');
        }
    });

    rt.register_function("sleep", LiteralType::Void).param::<i64>("seconds").bind(|p| {
        let s = p.get_number(1).max(0) as u64;
        p.suspend(s);
    });

    rt.register_function("req.path", LiteralType::String).set_read_only().bind(|p| {
        let path = p.context::<TestContext>().map(|c| c.path.clone()).unwrap_or_default();
        p.set_result(path);
    });

    rt.register_function("regex.group", LiteralType::String)
        .param_default::<i64>("position", 0i64)
        .bind(|p| {
            let i = p.get_number(1).max(0) as usize;
            let g = p.regex_group(i).to_string();
            p.set_result(g);
        });

    rt
}

pub fn lower(source: &str, rt: &Runtime) -> (IrProgram, Report) {
    let mut report = Report::new();
    let unit = sluice_core::parse(source, "test.sl", rt, &mut report)
        .unwrap_or_else(|| panic!("parse failed: {}", report));
    let ir = sluice_core::lower(&unit, &["setup", "main"], &mut report)
        .unwrap_or_else(|| panic!("lowering failed: {}", report));
    (ir, report)
}

pub fn compile(source: &str, rt: &Runtime, level: u8) -> (Program, Report) {
    let mut report = Report::new();
    let program = sluice_core::compile(source, "test.sl", rt, level, &mut report)
        .unwrap_or_else(|| panic!("compile failed: {}", report));
    (program, report)
}

pub fn compile_linked(source: &str, rt: &Runtime, level: u8) -> Program {
    let (mut program, mut report) = compile(source, rt, level);
    assert!(program.link(rt, &mut report), "link failed: {}", report);
    program
}
