//! Core library for the Sluice toolchain: lexer, parser, semantic checks,
//! SSA-style IR with an optimizer, a stack-bytecode back-end, and the
//! runtime (native registry plus interpreter).
//!
//! The typical build pipeline is `parse` -> `lower` -> `optimize` ->
//! `codegen` -> `Program::link`, with one `Report` accumulating the
//! diagnostics of every stage. `compile` bundles the build-time stages.

pub mod ast;
pub mod diagnostics;
pub mod ir;
pub mod lexer;
pub mod location;
pub mod parser;
pub mod sema;
pub mod types;
pub mod vm;

pub use diagnostics::{Message, MessageKind, Report};
pub use location::{Location, Span};
pub use types::{Cidr, Constant, LiteralType, Signature};
pub use vm::{Program, RunResult, Runner, Runtime, RuntimeError};

/// Parses `source` into an AST unit, resolving symbols against `runtime`.
pub fn parse(
    source: &str,
    filename: &str,
    runtime: &Runtime,
    report: &mut Report,
) -> Option<ast::Unit> {
    let before = report.count_of(MessageKind::TokenError)
        + report.count_of(MessageKind::SyntaxError)
        + report.count_of(MessageKind::TypeError);
    let unit = parser::parse(source, filename, runtime, report);
    let after = report.count_of(MessageKind::TokenError)
        + report.count_of(MessageKind::SyntaxError)
        + report.count_of(MessageKind::TypeError);
    if after > before {
        None
    } else {
        Some(unit)
    }
}

/// Lowers a unit to IR. `entry_points` names the handlers invoked by the
/// host.
pub fn lower(
    unit: &ast::Unit,
    entry_points: &[&str],
    report: &mut Report,
) -> Option<ir::IrProgram> {
    let had_errors = report.has_errors();
    let program = ir::lower::generate(unit, entry_points, report);
    if report.has_errors() && !had_errors {
        None
    } else {
        Some(program)
    }
}

/// Runs the optimizer pipeline for `level` (0..=2) over `program` in place.
pub fn optimize(program: &mut ir::IrProgram, level: u8) {
    ir::opt::optimize(program, level);
}

/// Emits bytecode and the constant pool for `program`.
pub fn codegen(program: &ir::IrProgram) -> Program {
    vm::codegen::generate(program)
}

/// The whole build-time pipeline: parse, lower, verify native calls,
/// optimize and emit. Stages short-circuit; the returned program still
/// needs `Program::link`.
pub fn compile(
    source: &str,
    filename: &str,
    runtime: &Runtime,
    level: u8,
    report: &mut Report,
) -> Option<Program> {
    let unit = parse(source, filename, runtime, report)?;
    let mut ir = lower(&unit, &["setup", "main"], report)?;
    if !runtime.verify_native_calls(&mut ir, report) {
        return None;
    }
    optimize(&mut ir, level);
    Some(codegen(&ir))
}
