//! The built-in runtime the CLI links scripts against: a handful of natives
//! that stand in for a real host (request access, response output, timers),
//! plus the allow-lists for the setup and request phases.

use sluice_core::types::{Constant, LiteralType};
use sluice_core::vm::{Runtime, Verdict};

/// Per-invocation host context handed to `run`; natives downcast to it.
#[derive(Debug, Default)]
pub struct TesterContext {
    /// Path of the simulated request.
    pub path: String,
    /// Everything `echo` wrote, newline-terminated.
    pub output: String,
    /// Ports captured by `listen`.
    pub ports: Vec<i64>,
}

impl TesterContext {
    pub fn with_path(path: &str) -> Self {
        TesterContext { path: path.to_string(), ..TesterContext::default() }
    }
}

/// Builtins permitted in the `setup` handler.
pub const SETUP_API: &[&str] = &["listen", "sys.env"];

/// Builtins permitted in the `main` handler.
pub const MAIN_API: &[&str] = &[
    "handler.true",
    "respond",
    "sum",
    "assert",
    "echo",
    "sleep",
    "req.path",
    "regex.group",
    "sys.env",
];

/// Builds the tester runtime with all natives registered.
pub fn tester_runtime() -> Runtime {
    let mut runtime = Runtime::new();

    runtime.register_handler("handler.true").bind(|params| {
        params.set_result(true);
    });

    runtime
        .register_handler("respond")
        .param::<i64>("result")
        .bind(|params| {
            let result = params.get_bool(1);
            params.set_result(result);
        });

    runtime
        .register_handler("listen")
        .param::<i64>("port")
        .bind(|params| {
            let port = params.get_number(1);
            if let Some(cx) = params.context_mut::<TesterContext>() {
                cx.ports.push(port);
            }
            params.set_result(false);
        });

    runtime
        .register_function("sum", LiteralType::Number)
        .param::<i64>("x")
        .param::<i64>("y")
        .bind(|params| {
            let value = params.get_number(1).wrapping_add(params.get_number(2));
            params.set_result(value);
        });

    runtime
        .register_function("assert", LiteralType::Number)
        .param::<i64>("condition")
        .param_default::<String>("description", "")
        .bind(|params| {
            if params.get_bool(1) {
                params.set_result(1i64);
            } else {
                let description = params.get_string(2);
                if description.is_empty() {
                    params.fail("assertion failed");
                } else {
                    params.fail(format!("assertion failed ({})", description));
                }
            }
        });

    runtime
        .register_function("echo", LiteralType::Void)
        .param::<String>("text")
        .bind(|params| {
            let text = params.get_string(1);
            if let Some(cx) = params.context_mut::<TesterContext>() {
                cx.output.push_str(&text);
                cx.output.push('\n');
            }
        });

    runtime
        .register_function("sleep", LiteralType::Void)
        .param::<i64>("seconds")
        .bind(|params| {
            let seconds = params.get_number(1).max(0) as u64;
            params.suspend(seconds);
        });

    runtime
        .register_function("req.path", LiteralType::String)
        .set_read_only()
        .bind(|params| {
            let path = params
                .context::<TesterContext>()
                .map(|cx| cx.path.clone())
                .unwrap_or_default();
            params.set_result(path);
        });

    runtime
        .register_function("regex.group", LiteralType::String)
        .param_default::<i64>("position", 0i64)
        .bind(|params| {
            let position = params.get_number(1).max(0) as usize;
            let group = params.regex_group(position).to_string();
            params.set_result(group);
        });

    // Folds to a constant at compile time when the variable is set in the
    // compiler's environment.
    runtime
        .register_function("sys.env", LiteralType::String)
        .param::<String>("name")
        .bind(|params| {
            let name = params.get_string(1);
            params.set_result(std::env::var(&name).unwrap_or_default());
        })
        .verifier(|call| {
            if let Some(Constant::Str(name)) = call.const_arg(0) {
                if let Ok(value) = std::env::var(name) {
                    return Verdict::Replace(Constant::Str(value));
                }
            }
            Verdict::Keep
        });

    runtime
}
