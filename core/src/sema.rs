//! Call-site collection and per-entry-point API validation.
//!
//! Each entry-point handler is only allowed to call the builtins the host
//! lists for its phase; everything else is reported as a `TypeError` at the
//! call site. User-defined handler invocations are followed transitively,
//! since their bodies execute in the caller's phase.

use std::collections::HashSet;

use crate::ast::{Expr, Stmt, Unit};
use crate::diagnostics::{Message, Report};
use crate::location::Span;

/// A builtin call site found in a handler body.
#[derive(Debug, Clone)]
pub struct CallSite<'a> {
    pub name: &'a str,
    pub span: &'a Span,
}

/// Collects every builtin call site reachable from `entry`, following
/// user-handler invocations into their bodies.
pub fn calls_of<'a>(unit: &'a Unit, entry: &str) -> Vec<CallSite<'a>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    collect_handler(unit, entry, &mut visited, &mut out);
    out
}

fn collect_handler<'a>(
    unit: &'a Unit,
    name: &str,
    visited: &mut HashSet<String>,
    out: &mut Vec<CallSite<'a>>,
) {
    if !visited.insert(name.to_string()) {
        return;
    }
    if let Some(handler) = unit.handler(name) {
        collect_stmt(unit, &handler.body, visited, out);
    }
}

fn collect_stmt<'a>(
    unit: &'a Unit,
    stmt: &'a Stmt,
    visited: &mut HashSet<String>,
    out: &mut Vec<CallSite<'a>>,
) {
    match stmt {
        Stmt::Expr { expr, .. } => collect_expr(expr, out),
        Stmt::HandlerCall { callee, args, span } => {
            match callee {
                crate::ast::HandlerCallee::Builtin(sig) => {
                    out.push(CallSite { name: &sig.name, span });
                }
                crate::ast::HandlerCallee::User(name) => {
                    collect_handler(unit, name, visited, out);
                }
            }
            for arg in args {
                collect_expr(arg, out);
            }
        }
        Stmt::Compound { stmts, .. } => {
            for s in stmts {
                collect_stmt(unit, s, visited, out);
            }
        }
        Stmt::Cond { cond, then, otherwise, .. } => {
            collect_expr(cond, out);
            collect_stmt(unit, then, visited, out);
            if let Some(e) = otherwise {
                collect_stmt(unit, e, visited, out);
            }
        }
        Stmt::Match { subject, arms, otherwise, .. } => {
            collect_expr(subject, out);
            for arm in arms {
                collect_stmt(unit, &arm.body, visited, out);
            }
            if let Some(e) = otherwise {
                collect_stmt(unit, e, visited, out);
            }
        }
        Stmt::Assign { value, .. } => collect_expr(value, out),
        Stmt::Var(decl) => collect_expr(&decl.init, out),
    }
}

fn collect_expr<'a>(expr: &'a Expr, out: &mut Vec<CallSite<'a>>) {
    match expr {
        Expr::Literal { .. } | Expr::VarRef { .. } | Expr::HandlerRef { .. } => {}
        Expr::Array { elements, .. } => {
            for e in elements {
                collect_expr(e, out);
            }
        }
        Expr::Unary { operand, .. } => collect_expr(operand, out),
        Expr::Binary { lhs, rhs, .. } => {
            collect_expr(lhs, out);
            collect_expr(rhs, out);
        }
        Expr::Call { callee, args, span } => {
            out.push(CallSite { name: &callee.signature.name, span });
            for arg in args {
                collect_expr(arg, out);
            }
        }
    }
}

/// Verifies that every builtin reachable from the entry handler `entry` is
/// present in `allowed`. Violations are reported as `TypeError`s. Names
/// that are not registered at all are left for the linker.
pub fn validate_api(
    unit: &Unit,
    entry: &str,
    allowed: &[&str],
    runtime: &crate::vm::runtime::Runtime,
    report: &mut Report,
) -> bool {
    let mut ok = true;
    for call in calls_of(unit, entry) {
        if runtime.find_by_name(call.name).is_none() {
            continue;
        }
        if !allowed.iter().any(|name| *name == call.name) {
            report.push(Message::type_error(
                call.span.clone(),
                format!("'{}' is not allowed from handler '{}'", call.name, entry),
            ));
            ok = false;
        }
    }
    ok
}
