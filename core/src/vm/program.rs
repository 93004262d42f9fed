//! file: core/src/vm/program.rs
//! description: constant pool, linked program, and native-reference tables.

use std::net::IpAddr;

use log::debug;

use crate::diagnostics::{Message, Report};
use crate::location::Span;
use crate::types::{Cidr, Signature};
use crate::vm::matcher::MatchDef;
use crate::vm::opcode::Instruction;
use crate::vm::runtime::Runtime;

/// A reference to a host native, carried in the pool for linking; the span
/// points at the first call site, for `LinkError` locations.
#[derive(Debug, Clone)]
pub struct NativeRef {
    pub signature: Signature,
    pub span: Option<Span>,
}

/// Deduplicated tables of every constant the bytecode refers to by index,
/// plus the per-handler code vectors.
#[derive(Debug, Default)]
pub struct ConstantPool {
    numbers: Vec<i64>,
    strings: Vec<String>,
    regexes: Vec<(String, regex::Regex)>,
    ipaddrs: Vec<IpAddr>,
    cidrs: Vec<Cidr>,
    number_arrays: Vec<Vec<i64>>,
    string_arrays: Vec<Vec<String>>,
    ipaddr_arrays: Vec<Vec<IpAddr>>,
    cidr_arrays: Vec<Vec<Cidr>>,
    match_defs: Vec<MatchDef>,
    handlers: Vec<(String, Vec<Instruction>)>,
    native_functions: Vec<NativeRef>,
    native_handlers: Vec<NativeRef>,
    modules: Vec<String>,
}

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool::default()
    }

    fn intern<T: PartialEq>(table: &mut Vec<T>, value: T) -> usize {
        match table.iter().position(|v| *v == value) {
            Some(index) => index,
            None => {
                table.push(value);
                table.len() - 1
            }
        }
    }

    pub fn make_number(&mut self, value: i64) -> usize {
        Self::intern(&mut self.numbers, value)
    }

    pub fn make_string(&mut self, value: &str) -> usize {
        match self.strings.iter().position(|s| s == value) {
            Some(index) => index,
            None => {
                self.strings.push(value.to_string());
                self.strings.len() - 1
            }
        }
    }

    /// Interns a regex by its pattern text, compiling it once.
    pub fn make_regex(&mut self, pattern: &str) -> usize {
        match self.regexes.iter().position(|(p, _)| p == pattern) {
            Some(index) => index,
            None => {
                // The lexer validated the pattern; an unparsable one can only
                // come from a hand-built IR, where matching nothing is the
                // sane fallback.
                let compiled = regex::Regex::new(pattern)
                    .unwrap_or_else(|_| regex::Regex::new(r"[^\s\S]").unwrap());
                self.regexes.push((pattern.to_string(), compiled));
                self.regexes.len() - 1
            }
        }
    }

    pub fn make_ipaddr(&mut self, value: IpAddr) -> usize {
        Self::intern(&mut self.ipaddrs, value)
    }

    pub fn make_cidr(&mut self, value: Cidr) -> usize {
        Self::intern(&mut self.cidrs, value)
    }

    pub fn make_number_array(&mut self, value: Vec<i64>) -> usize {
        Self::intern(&mut self.number_arrays, value)
    }

    pub fn make_string_array(&mut self, value: Vec<String>) -> usize {
        Self::intern(&mut self.string_arrays, value)
    }

    pub fn make_ipaddr_array(&mut self, value: Vec<IpAddr>) -> usize {
        Self::intern(&mut self.ipaddr_arrays, value)
    }

    pub fn make_cidr_array(&mut self, value: Vec<Cidr>) -> usize {
        Self::intern(&mut self.cidr_arrays, value)
    }

    pub fn make_match_def(&mut self, def: MatchDef) -> usize {
        self.match_defs.push(def);
        self.match_defs.len() - 1
    }

    pub fn match_def_mut(&mut self, id: usize) -> &mut MatchDef {
        &mut self.match_defs[id]
    }

    /// Forward-declares a handler so its id can be referenced before its
    /// code exists.
    pub fn make_handler(&mut self, name: &str) -> usize {
        match self.handlers.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.handlers.push((name.to_string(), Vec::new()));
                self.handlers.len() - 1
            }
        }
    }

    pub fn set_handler_code(&mut self, id: usize, code: Vec<Instruction>) {
        self.handlers[id].1 = code;
    }

    pub fn make_native_function(&mut self, signature: &Signature, span: Option<&Span>) -> usize {
        match self
            .native_functions
            .iter()
            .position(|r| r.signature == *signature)
        {
            Some(index) => index,
            None => {
                self.native_functions.push(NativeRef {
                    signature: signature.clone(),
                    span: span.cloned(),
                });
                self.native_functions.len() - 1
            }
        }
    }

    pub fn make_native_handler(&mut self, signature: &Signature, span: Option<&Span>) -> usize {
        match self
            .native_handlers
            .iter()
            .position(|r| r.signature == *signature)
        {
            Some(index) => index,
            None => {
                self.native_handlers.push(NativeRef {
                    signature: signature.clone(),
                    span: span.cloned(),
                });
                self.native_handlers.len() - 1
            }
        }
    }

    pub fn set_modules(&mut self, modules: Vec<String>) {
        self.modules = modules;
    }

    // ------------------------------------------------------------------
    // read access

    pub fn number(&self, id: usize) -> i64 {
        self.numbers[id]
    }

    pub fn string(&self, id: usize) -> &str {
        &self.strings[id]
    }

    pub fn regex(&self, id: usize) -> &regex::Regex {
        &self.regexes[id].1
    }

    pub fn regex_pattern(&self, id: usize) -> &str {
        &self.regexes[id].0
    }

    pub fn ipaddr(&self, id: usize) -> IpAddr {
        self.ipaddrs[id]
    }

    pub fn cidr(&self, id: usize) -> Cidr {
        self.cidrs[id]
    }

    pub fn number_array(&self, id: usize) -> &[i64] {
        &self.number_arrays[id]
    }

    pub fn string_array(&self, id: usize) -> &[String] {
        &self.string_arrays[id]
    }

    pub fn ipaddr_array(&self, id: usize) -> &[IpAddr] {
        &self.ipaddr_arrays[id]
    }

    pub fn cidr_array(&self, id: usize) -> &[Cidr] {
        &self.cidr_arrays[id]
    }

    pub fn match_def(&self, id: usize) -> &MatchDef {
        &self.match_defs[id]
    }

    pub fn handlers(&self) -> &[(String, Vec<Instruction>)] {
        &self.handlers
    }

    pub fn native_functions(&self) -> &[NativeRef] {
        &self.native_functions
    }

    pub fn native_handlers(&self) -> &[NativeRef] {
        &self.native_handlers
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }
}

/// A compiled program: the constant pool plus, after linking, the mapping
/// from native-reference ids to registry slots. Immutable once linked.
#[derive(Debug, Default)]
pub struct Program {
    pool: ConstantPool,
    linked_functions: Vec<usize>,
    linked_handlers: Vec<usize>,
    linked: bool,
}

impl Program {
    pub fn new(pool: ConstantPool) -> Self {
        Program {
            pool,
            linked_functions: Vec::new(),
            linked_handlers: Vec::new(),
            linked: false,
        }
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Resolves every native reference against `runtime`. Unresolved
    /// references are reported as `LinkError`s at the recorded call sites;
    /// the program stays unlinked if any reference fails.
    pub fn link(&mut self, runtime: &Runtime, report: &mut Report) -> bool {
        let mut functions = Vec::with_capacity(self.pool.native_functions.len());
        let mut handlers = Vec::with_capacity(self.pool.native_handlers.len());
        let mut ok = true;

        for reference in &self.pool.native_functions {
            match runtime.find(&reference.signature) {
                Some((slot, callback)) if !callback.is_handler() => functions.push(slot),
                _ => {
                    ok = false;
                    report.push(Message::new(
                        crate::diagnostics::MessageKind::LinkError,
                        reference.span.clone(),
                        format!("unknown function '{}'", reference.signature.name),
                    ));
                    functions.push(usize::MAX);
                }
            }
        }
        for reference in &self.pool.native_handlers {
            match runtime.find(&reference.signature) {
                Some((slot, callback)) if callback.is_handler() => handlers.push(slot),
                _ => {
                    ok = false;
                    report.push(Message::new(
                        crate::diagnostics::MessageKind::LinkError,
                        reference.span.clone(),
                        format!("unknown handler '{}'", reference.signature.name),
                    ));
                    handlers.push(usize::MAX);
                }
            }
        }

        if ok {
            debug!(
                "linked {} function(s), {} handler(s)",
                functions.len(),
                handlers.len()
            );
            self.linked_functions = functions;
            self.linked_handlers = handlers;
            self.linked = true;
        }
        ok
    }

    pub(crate) fn linked_function(&self, id: usize) -> usize {
        self.linked_functions[id]
    }

    pub(crate) fn linked_handler(&self, id: usize) -> usize {
        self.linked_handlers[id]
    }

    pub fn handler(&self, name: &str) -> Option<Handler<'_>> {
        self.pool
            .handlers
            .iter()
            .position(|(n, _)| n == name)
            .map(|id| Handler { program: self, id })
    }

    pub fn handler_by_id(&self, id: usize) -> Option<Handler<'_>> {
        if id < self.pool.handlers.len() {
            Some(Handler { program: self, id })
        } else {
            None
        }
    }

    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.pool.handlers.iter().map(|(n, _)| n.as_str())
    }
}

/// A view of one compiled handler, ready to run.
#[derive(Clone, Copy)]
pub struct Handler<'p> {
    program: &'p Program,
    id: usize,
}

impl<'p> Handler<'p> {
    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &'p str {
        &self.program.pool.handlers[self.id].0
    }

    pub fn code(&self) -> &'p [Instruction] {
        &self.program.pool.handlers[self.id].1
    }
}
