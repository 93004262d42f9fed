//! The execution half of the toolchain: bytecode representation, target
//! code generation, the native registry and the interpreter.

pub mod codegen;
pub mod matcher;
pub mod opcode;
pub mod params;
pub mod program;
pub mod runner;
pub mod runtime;
pub mod value;

pub use codegen::generate;
pub use matcher::{MatchClass, MatchDef};
pub use opcode::{Instruction, Opcode};
pub use params::Params;
pub use program::{ConstantPool, Handler, NativeRef, Program};
pub use runner::{RunResult, Runner, RuntimeError};
pub use runtime::{CallView, NativeCallback, Runtime, Verdict};
pub use value::Value;
