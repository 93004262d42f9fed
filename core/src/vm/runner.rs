//! file: core/src/vm/runner.rs
//! description: the stack-based bytecode interpreter.
//!
//! One `Runner` executes one handler invocation. It owns the value stack,
//! the program counter and the regex match context; the linked program and
//! the runtime registry are shared and immutable. Suspension hands the
//! runner back to the host, which re-enters it via `resume`.

use std::any::Any;

use log::trace;
use thiserror::Error;

use crate::vm::opcode::{Instruction, Opcode};
use crate::vm::params::Params;
use crate::vm::program::{Handler, Program};
use crate::vm::runtime::Runtime;
use crate::vm::value::Value;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("native '{0}' failed: {1}")]
    Native(String, String),
    #[error("program is not linked")]
    NotLinked,
    #[error("handler was aborted")]
    Aborted,
    #[error("invalid bytecode: {0}")]
    InvalidBytecode(String),
}

/// Outcome of running (or resuming) a handler.
pub enum RunResult<'p> {
    /// The handler ran to completion; the flag tells whether it produced a
    /// final response.
    Success(bool),
    /// A native requested suspension; resume the runner to continue.
    Suspended(Runner<'p>),
    Error(RuntimeError),
}

impl RunResult<'_> {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success(_))
    }
}

impl std::fmt::Debug for RunResult<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunResult::Success(b) => write!(f, "Success({})", b),
            RunResult::Suspended(r) => write!(f, "Suspended(pc={})", r.pc),
            RunResult::Error(e) => write!(f, "Error({})", e),
        }
    }
}

pub struct Runner<'p> {
    program: &'p Program,
    runtime: &'p Runtime,
    handler_id: usize,
    pc: usize,
    stack: Vec<Value>,
    /// Capture groups of the most recent regex match; empty after a failed
    /// match.
    groups: Vec<String>,
    /// Seconds the suspending native asked the host to wait.
    sleep: Option<u64>,
    aborted: bool,
}

impl<'p> Handler<'p> {
    /// Compiles-and-goes: creates a fresh runner and executes this handler.
    pub fn run(&self, runtime: &'p Runtime, context: &mut dyn Any) -> RunResult<'p> {
        match Runner::new(*self, runtime) {
            Ok(runner) => runner.resume(context),
            Err(e) => RunResult::Error(e),
        }
    }
}

impl<'p> Runner<'p> {
    pub fn new(handler: Handler<'p>, runtime: &'p Runtime) -> Result<Self, RuntimeError> {
        if !handler.program().is_linked() {
            return Err(RuntimeError::NotLinked);
        }
        Ok(Runner {
            program: handler.program(),
            runtime,
            handler_id: handler.id(),
            pc: 0,
            stack: Vec::new(),
            groups: Vec::new(),
            sleep: None,
            aborted: false,
        })
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    /// How long the suspending native asked the host to wait, in seconds.
    pub fn sleep_duration(&self) -> Option<u64> {
        self.sleep
    }

    /// Aborts an in-flight handler: the stack is released and any further
    /// `resume` reports failure.
    pub fn rewind(&mut self) {
        self.pc = 0;
        self.stack.clear();
        self.groups.clear();
        self.sleep = None;
        self.aborted = true;
    }

    /// Enters (or re-enters) the dispatch loop at the saved PC.
    pub fn resume(mut self, context: &mut dyn Any) -> RunResult<'p> {
        if self.aborted {
            return RunResult::Error(RuntimeError::Aborted);
        }
        self.sleep = None;
        match self.dispatch(context) {
            Ok(Some(done)) => RunResult::Success(done),
            Ok(None) => RunResult::Suspended(self),
            Err(e) => RunResult::Error(e),
        }
    }

    // ------------------------------------------------------------------

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::InvalidBytecode("stack underflow".into()))
    }

    fn pop_number(&mut self) -> Result<i64, RuntimeError> {
        match self.pop()? {
            Value::Number(n) => Ok(n),
            Value::Bool(b) => Ok(b as i64),
            other => Err(RuntimeError::InvalidBytecode(format!(
                "expected number, found {}",
                other.ty()
            ))),
        }
    }

    fn pop_bool(&mut self) -> Result<bool, RuntimeError> {
        Ok(self.pop()?.as_bool())
    }

    fn pop_string(&mut self) -> Result<String, RuntimeError> {
        match self.pop()? {
            Value::Str(s) => Ok(s),
            other => Err(RuntimeError::InvalidBytecode(format!(
                "expected string, found {}",
                other.ty()
            ))),
        }
    }

    fn pop_ip(&mut self) -> Result<std::net::IpAddr, RuntimeError> {
        match self.pop()? {
            Value::IP(ip) => Ok(ip),
            other => Err(RuntimeError::InvalidBytecode(format!(
                "expected ip, found {}",
                other.ty()
            ))),
        }
    }

    fn binary_number(
        &mut self,
        f: impl FnOnce(i64, i64) -> Result<i64, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let b = self.pop_number()?;
        let a = self.pop_number()?;
        self.stack.push(Value::Number(f(a, b)?));
        Ok(())
    }

    fn compare_number(&mut self, f: impl FnOnce(i64, i64) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop_number()?;
        let a = self.pop_number()?;
        self.stack.push(Value::Bool(f(a, b)));
        Ok(())
    }

    fn compare_string(&mut self, f: impl FnOnce(&str, &str) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop_string()?;
        let a = self.pop_string()?;
        self.stack.push(Value::Bool(f(&a, &b)));
        Ok(())
    }

    /// Fetch-decode-execute until the handler exits (`Ok(Some(flag))`) or a
    /// native suspends the runner (`Ok(None)`).
    fn dispatch(&mut self, context: &mut dyn Any) -> Result<Option<bool>, RuntimeError> {
        let pool = self.program.pool();
        let code: &[Instruction] = &pool.handlers()[self.handler_id].1;

        while self.pc < code.len() {
            let instruction = code[self.pc];
            let opcode = instruction.opcode().ok_or_else(|| {
                RuntimeError::InvalidBytecode(format!("bad opcode at pc {}", self.pc))
            })?;
            let a = instruction.a() as usize;
            trace!("vm: {:4} {}", self.pc, instruction);
            self.pc += 1;

            match opcode {
                Opcode::Nop => {}

                // ---------------------------------------------------- stack
                Opcode::ILoad => self.stack.push(Value::Number(a as i64)),
                Opcode::NLoad => self.stack.push(Value::Number(pool.number(a))),
                Opcode::SLoad => self.stack.push(Value::Str(pool.string(a).to_string())),
                Opcode::PLoad => self.stack.push(Value::IP(pool.ipaddr(a))),
                Opcode::CLoad => self.stack.push(Value::Cidr(pool.cidr(a))),
                Opcode::RLoad => self.stack.push(Value::Regex(a)),
                Opcode::ITLoad => self.stack.push(Value::NumberArray(pool.number_array(a).to_vec())),
                Opcode::STLoad => self.stack.push(Value::StringArray(pool.string_array(a).to_vec())),
                Opcode::PTLoad => {
                    self.stack.push(Value::IPAddressArray(pool.ipaddr_array(a).to_vec()))
                }
                Opcode::CTLoad => self.stack.push(Value::CidrArray(pool.cidr_array(a).to_vec())),
                Opcode::Load => {
                    let value = self
                        .stack
                        .get(a)
                        .cloned()
                        .ok_or_else(|| RuntimeError::InvalidBytecode("bad stack index".into()))?;
                    self.stack.push(value);
                }
                Opcode::Store => {
                    let value = self.pop()?;
                    if a >= self.stack.len() {
                        return Err(RuntimeError::InvalidBytecode("bad stack index".into()));
                    }
                    self.stack[a] = value;
                }
                Opcode::Alloca => {
                    for _ in 0..a.max(1) {
                        self.stack.push(Value::Void);
                    }
                }
                Opcode::Discard => {
                    for _ in 0..a.max(1) {
                        self.pop()?;
                    }
                }

                // -------------------------------------------------- numeric
                Opcode::NAdd => self.binary_number(|a, b| Ok(a.wrapping_add(b)))?,
                Opcode::NSub => self.binary_number(|a, b| Ok(a.wrapping_sub(b)))?,
                Opcode::NMul => self.binary_number(|a, b| Ok(a.wrapping_mul(b)))?,
                Opcode::NDiv => self.binary_number(|a, b| {
                    if b == 0 {
                        Err(RuntimeError::DivisionByZero)
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                Opcode::NRem => self.binary_number(|a, b| {
                    if b == 0 {
                        Err(RuntimeError::DivisionByZero)
                    } else {
                        Ok(a.wrapping_rem(b))
                    }
                })?,
                Opcode::NPow => self.binary_number(|a, b| Ok(ipow(a, b)))?,
                Opcode::NNeg => {
                    let n = self.pop_number()?;
                    self.stack.push(Value::Number(n.wrapping_neg()));
                }
                Opcode::NNot => {
                    let n = self.pop_number()?;
                    self.stack.push(Value::Number(!n));
                }
                Opcode::NAnd => self.binary_number(|a, b| Ok(a & b))?,
                Opcode::NOr => self.binary_number(|a, b| Ok(a | b))?,
                Opcode::NXor => self.binary_number(|a, b| Ok(a ^ b))?,
                Opcode::NShl => self.binary_number(|a, b| Ok(a.wrapping_shl(b as u32)))?,
                Opcode::NShr => self.binary_number(|a, b| Ok(a.wrapping_shr(b as u32)))?,
                Opcode::NCmpEq => self.compare_number(|a, b| a == b)?,
                Opcode::NCmpNe => self.compare_number(|a, b| a != b)?,
                Opcode::NCmpLe => self.compare_number(|a, b| a <= b)?,
                Opcode::NCmpGe => self.compare_number(|a, b| a >= b)?,
                Opcode::NCmpLt => self.compare_number(|a, b| a < b)?,
                Opcode::NCmpGt => self.compare_number(|a, b| a > b)?,

                // -------------------------------------------------- boolean
                Opcode::BAnd => {
                    let b = self.pop_bool()?;
                    let a = self.pop_bool()?;
                    self.stack.push(Value::Bool(a && b));
                }
                Opcode::BOr => {
                    let b = self.pop_bool()?;
                    let a = self.pop_bool()?;
                    self.stack.push(Value::Bool(a || b));
                }
                Opcode::BXor => {
                    let b = self.pop_bool()?;
                    let a = self.pop_bool()?;
                    self.stack.push(Value::Bool(a != b));
                }
                Opcode::BNot => {
                    let v = self.pop_bool()?;
                    self.stack.push(Value::Bool(!v));
                }

                // --------------------------------------------------- string
                Opcode::SAdd => {
                    let b = self.pop_string()?;
                    let a = self.pop_string()?;
                    self.stack.push(Value::Str(a + &b));
                }
                Opcode::SLen => {
                    let s = self.pop_string()?;
                    self.stack.push(Value::Number(s.chars().count() as i64));
                }
                Opcode::SIsEmpty => {
                    let s = self.pop_string()?;
                    self.stack.push(Value::Bool(s.is_empty()));
                }
                Opcode::SSubStr => {
                    let from = self.pop_number()?.max(0) as usize;
                    let s = self.pop_string()?;
                    self.stack.push(Value::Str(s.chars().skip(from).collect()));
                }
                Opcode::SCmpEq => self.compare_string(|a, b| a == b)?,
                Opcode::SCmpNe => self.compare_string(|a, b| a != b)?,
                Opcode::SCmpLe => self.compare_string(|a, b| a <= b)?,
                Opcode::SCmpGe => self.compare_string(|a, b| a >= b)?,
                Opcode::SCmpLt => self.compare_string(|a, b| a < b)?,
                Opcode::SCmpGt => self.compare_string(|a, b| a > b)?,
                Opcode::SCmpBeg => self.compare_string(|a, b| a.starts_with(b))?,
                Opcode::SCmpEnd => self.compare_string(|a, b| a.ends_with(b))?,
                Opcode::SContains => {
                    let haystack = self.pop_string()?;
                    let needle = self.pop_string()?;
                    self.stack.push(Value::Bool(haystack.contains(&needle)));
                }
                Opcode::SRegMatch => {
                    let subject = self.pop_string()?;
                    // The match context is refreshed even on a failed match.
                    match pool.regex(a).captures(&subject) {
                        Some(captures) => {
                            self.groups = captures
                                .iter()
                                .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
                                .collect();
                            self.stack.push(Value::Bool(true));
                        }
                        None => {
                            self.groups.clear();
                            self.stack.push(Value::Bool(false));
                        }
                    }
                }

                // ------------------------------------------- address / cidr
                Opcode::PCmpEq => {
                    let b = self.pop_ip()?;
                    let a = self.pop_ip()?;
                    self.stack.push(Value::Bool(a == b));
                }
                Opcode::PCmpNe => {
                    let b = self.pop_ip()?;
                    let a = self.pop_ip()?;
                    self.stack.push(Value::Bool(a != b));
                }
                Opcode::PInCidr => {
                    let cidr = match self.pop()? {
                        Value::Cidr(c) => c,
                        other => {
                            return Err(RuntimeError::InvalidBytecode(format!(
                                "expected cidr, found {}",
                                other.ty()
                            )))
                        }
                    };
                    let ip = self.pop_ip()?;
                    self.stack.push(Value::Bool(cidr.contains(&ip)));
                }

                // ----------------------------------------------- conversion
                Opcode::N2S => {
                    let n = self.pop_number()?;
                    self.stack.push(Value::Str(n.to_string()));
                }
                Opcode::P2S => {
                    let ip = self.pop_ip()?;
                    self.stack.push(Value::Str(ip.to_string()));
                }
                Opcode::C2S => {
                    let v = self.pop()?;
                    match v {
                        Value::Cidr(c) => self.stack.push(Value::Str(c.to_string())),
                        other => {
                            return Err(RuntimeError::InvalidBytecode(format!(
                                "expected cidr, found {}",
                                other.ty()
                            )))
                        }
                    }
                }
                Opcode::R2S => {
                    let v = self.pop()?;
                    match v {
                        Value::Regex(id) => {
                            self.stack.push(Value::Str(pool.regex_pattern(id).to_string()))
                        }
                        other => {
                            return Err(RuntimeError::InvalidBytecode(format!(
                                "expected regex, found {}",
                                other.ty()
                            )))
                        }
                    }
                }
                Opcode::S2N => {
                    let s = self.pop_string()?;
                    self.stack.push(Value::Number(s.trim().parse().unwrap_or(0)));
                }

                // -------------------------------------------------- control
                Opcode::Jmp => self.pc = a,
                Opcode::Jz => {
                    if !self.pop_bool()? {
                        self.pc = a;
                    }
                }
                Opcode::Jn => {
                    if self.pop_bool()? {
                        self.pc = a;
                    }
                }
                Opcode::Exit => return Ok(Some(a != 0)),

                // ---------------------------------------------------- match
                Opcode::SMatchEq | Opcode::SMatchBeg | Opcode::SMatchEnd => {
                    let subject = self.pop_string()?;
                    self.pc = pool.match_def(a).resolve(&subject, pool);
                }
                Opcode::SMatchR => {
                    let subject = self.pop_string()?;
                    let def = pool.match_def(a);
                    let mut target = def.else_pc;
                    self.groups.clear();
                    for case in &def.cases {
                        if let Some(captures) = pool.regex(case.value).captures(&subject) {
                            self.groups = captures
                                .iter()
                                .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
                                .collect();
                            target = case.pc;
                            break;
                        }
                    }
                    self.pc = target;
                }

                // --------------------------------------------- native calls
                Opcode::Call => {
                    let argc = instruction.b() as usize;
                    let returns = instruction.c() != 0;
                    let slot = self.program.linked_function(a);
                    let callback = self.runtime.callback(slot);

                    let mut args = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        args.push(self.pop()?);
                    }
                    args.reverse();

                    let mut params = Params::new(args, &self.groups, context);
                    callback.invoke(&mut params);
                    let (result, sleep, error) = params.finish();

                    if let Some(message) = error {
                        return Err(RuntimeError::Native(callback.name().to_string(), message));
                    }
                    if returns {
                        self.stack.push(result);
                    }
                    if let Some(seconds) = sleep {
                        self.sleep = Some(seconds);
                        return Ok(None);
                    }
                }
                Opcode::Handler => {
                    let argc = instruction.b() as usize;
                    let slot = self.program.linked_handler(a);
                    let callback = self.runtime.callback(slot);

                    let mut args = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        args.push(self.pop()?);
                    }
                    args.reverse();

                    let mut params = Params::new(args, &self.groups, context);
                    callback.invoke(&mut params);
                    let (result, sleep, error) = params.finish();

                    if let Some(message) = error {
                        return Err(RuntimeError::Native(callback.name().to_string(), message));
                    }
                    // A handler that reports completion finishes the whole
                    // invocation.
                    if result.as_bool() {
                        return Ok(Some(true));
                    }
                    if let Some(seconds) = sleep {
                        self.sleep = Some(seconds);
                        return Ok(None);
                    }
                }
            }
        }

        Err(RuntimeError::InvalidBytecode(
            "execution ran past the end of the handler".into(),
        ))
    }
}

fn ipow(base: i64, exp: i64) -> i64 {
    if exp < 0 {
        return 0;
    }
    let mut result: i64 = 1;
    let mut base = base;
    let mut exp = exp as u64;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    result
}
