//! Library half of the Sluice CLI: the expected-diagnostics harness, the
//! built-in tester runtime, and the bytecode disassembler. The binary in
//! `main.rs` is a thin command dispatcher over these.

pub mod disassembler;
pub mod harness;
pub mod tester;
