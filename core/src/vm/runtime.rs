//! file: core/src/vm/runtime.rs
//! description: the registry of host-supplied natives.
//!
//! Modules register handlers and functions here with typed signatures,
//! optional parameter defaults, a bound body, and an optional IR-time
//! verifier that can specialize or reject individual call sites. The
//! runtime is the authority for name resolution while parsing and linking.

use std::net::IpAddr;

use crate::diagnostics::{Message, Report};
use crate::ir::{InstrOp, IrProgram, Operand, Terminator};
use crate::location::Span;
use crate::types::{Cidr, Constant, LiteralType, Signature};
use crate::vm::params::Params;

/// Rust-side types that can appear as native parameters.
pub trait NativeType {
    const TYPE: LiteralType;
}

impl NativeType for bool {
    const TYPE: LiteralType = LiteralType::Boolean;
}
impl NativeType for i64 {
    const TYPE: LiteralType = LiteralType::Number;
}
impl NativeType for String {
    const TYPE: LiteralType = LiteralType::String;
}
impl NativeType for IpAddr {
    const TYPE: LiteralType = LiteralType::IPAddress;
}
impl NativeType for Cidr {
    const TYPE: LiteralType = LiteralType::Cidr;
}

pub type NativeBody = Box<dyn Fn(&mut Params) + Send + Sync>;

/// A call site as seen by a verifier.
pub struct CallView<'a> {
    pub name: &'a str,
    pub args: &'a [Operand],
    pub span: Option<&'a Span>,
}

impl CallView<'_> {
    /// The argument at `index` if it is a compile-time constant.
    pub fn const_arg(&self, index: usize) -> Option<&Constant> {
        self.args.get(index).and_then(|op| op.as_const())
    }
}

/// Decision of a per-call verifier.
pub enum Verdict {
    /// Leave the call as it is.
    Keep,
    /// Fold the call into a constant.
    Replace(Constant),
    /// Refuse the call with a diagnostic.
    Reject(String),
}

pub type Verifier = Box<dyn Fn(&CallView<'_>) -> Verdict + Send + Sync>;

/// A host-provided function or handler exposed to scripts.
pub struct NativeCallback {
    signature: Signature,
    is_handler: bool,
    param_names: Vec<String>,
    defaults: Vec<Option<Constant>>,
    body: Option<NativeBody>,
    verifier: Option<Verifier>,
    read_only: bool,
    no_return: bool,
}

impl NativeCallback {
    fn handler(name: &str) -> Self {
        NativeCallback {
            signature: Signature::new(name, LiteralType::Boolean),
            is_handler: true,
            param_names: Vec::new(),
            defaults: Vec::new(),
            body: None,
            verifier: None,
            read_only: false,
            no_return: false,
        }
    }

    fn function(name: &str, return_type: LiteralType) -> Self {
        NativeCallback {
            signature: Signature::new(name, return_type),
            is_handler: false,
            param_names: Vec::new(),
            defaults: Vec::new(),
            body: None,
            verifier: None,
            read_only: false,
            no_return: false,
        }
    }

    // ------------------------------------------------------------------
    // builder surface used at registration time

    pub fn param<T: NativeType>(&mut self, name: &str) -> &mut Self {
        self.signature.params.push(T::TYPE);
        self.param_names.push(name.to_string());
        self.defaults.push(None);
        self
    }

    pub fn param_default<T: NativeType>(
        &mut self,
        name: &str,
        default: impl Into<Constant>,
    ) -> &mut Self {
        let default = default.into();
        debug_assert_eq!(default.ty(), T::TYPE, "default type mismatch");
        self.signature.params.push(T::TYPE);
        self.param_names.push(name.to_string());
        self.defaults.push(Some(default));
        self
    }

    pub fn bind<F>(&mut self, body: F) -> &mut Self
    where
        F: Fn(&mut Params) + Send + Sync + 'static,
    {
        self.body = Some(Box::new(body));
        self
    }

    pub fn verifier<F>(&mut self, check: F) -> &mut Self
    where
        F: Fn(&CallView<'_>) -> Verdict + Send + Sync + 'static,
    {
        self.verifier = Some(Box::new(check));
        self
    }

    /// Marks the native as having no observable side effects.
    pub fn set_read_only(&mut self) -> &mut Self {
        self.read_only = true;
        self
    }

    /// Marks a handler native that never returns control (e.g. a responder
    /// that always finalizes the request).
    pub fn set_no_return(&mut self) -> &mut Self {
        self.no_return = true;
        self
    }

    // ------------------------------------------------------------------

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn is_handler(&self) -> bool {
        self.is_handler
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_no_return(&self) -> bool {
        self.no_return
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn defaults(&self) -> &[Option<Constant>] {
        &self.defaults
    }

    pub fn is_bound(&self) -> bool {
        self.body.is_some()
    }

    pub fn invoke(&self, params: &mut Params) {
        if let Some(body) = &self.body {
            body(params);
        } else {
            params.fail(format!("native '{}' has no body", self.signature.name));
        }
    }

    fn verify(&self, call: &CallView<'_>) -> Verdict {
        match &self.verifier {
            Some(check) => check(call),
            None => Verdict::Keep,
        }
    }
}

/// The host-side registry of natives. Registration order is the identity
/// order used everywhere, so builds are deterministic.
#[derive(Default)]
pub struct Runtime {
    callbacks: Vec<NativeCallback>,
    modules: Vec<String>,
}

impl Runtime {
    pub fn new() -> Self {
        Runtime::default()
    }

    pub fn register_handler(&mut self, name: &str) -> &mut NativeCallback {
        self.callbacks.push(NativeCallback::handler(name));
        self.callbacks.last_mut().unwrap()
    }

    pub fn register_function(&mut self, name: &str, return_type: LiteralType) -> &mut NativeCallback {
        self.callbacks.push(NativeCallback::function(name, return_type));
        self.callbacks.last_mut().unwrap()
    }

    /// Declares a module name accepted by `import`. With no declared
    /// modules, every import is accepted.
    pub fn register_module(&mut self, name: &str) {
        self.modules.push(name.to_string());
    }

    pub fn import(&self, name: &str) -> bool {
        self.modules.is_empty() || self.modules.iter().any(|m| m == name)
    }

    pub fn callbacks(&self) -> &[NativeCallback] {
        &self.callbacks
    }

    pub(crate) fn callback(&self, slot: usize) -> &NativeCallback {
        &self.callbacks[slot]
    }

    pub fn find_by_name(&self, name: &str) -> Option<&NativeCallback> {
        self.callbacks.iter().find(|c| c.name() == name)
    }

    /// Finds a native by full structural signature.
    pub fn find(&self, signature: &Signature) -> Option<(usize, &NativeCallback)> {
        self.callbacks
            .iter()
            .enumerate()
            .find(|(_, c)| c.signature() == signature)
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.find(signature).is_some()
    }

    /// Applies every registered verifier to its call sites in `program`.
    /// `Replace` verdicts fold the call into a constant; `Reject` verdicts
    /// become `TypeError`s. Returns whether all calls passed.
    pub fn verify_native_calls(&self, program: &mut IrProgram, report: &mut Report) -> bool {
        let functions = program.functions.clone();
        let handler_sigs = program.handler_builtins.clone();
        let mut ok = true;

        for handler in &mut program.handlers {
            let mut replacements: Vec<(crate::ir::ValueId, Constant)> = Vec::new();
            for block in &mut handler.blocks {
                for instr in &mut block.instrs {
                    let signature = match &instr.op {
                        InstrOp::Call { callee, .. } => &functions[*callee],
                        InstrOp::HandlerCall { callee, .. } => &handler_sigs[*callee],
                        _ => continue,
                    };
                    let Some((_, callback)) = self.find(signature) else {
                        continue;
                    };
                    let args = match &instr.op {
                        InstrOp::Call { args, .. } | InstrOp::HandlerCall { args, .. } => args,
                        _ => unreachable!(),
                    };
                    let view = CallView {
                        name: &signature.name,
                        args,
                        span: instr.span.as_ref(),
                    };
                    match callback.verify(&view) {
                        Verdict::Keep => {}
                        Verdict::Replace(constant) => {
                            if let Some(value) = instr.value {
                                replacements.push((value, constant));
                            }
                            instr.op = InstrOp::Nop;
                            instr.value = None;
                        }
                        Verdict::Reject(text) => {
                            ok = false;
                            report.push(Message::new(
                                crate::diagnostics::MessageKind::TypeError,
                                instr.span.clone(),
                                text,
                            ));
                        }
                    }
                }
            }

            for (value, constant) in replacements {
                for block in &mut handler.blocks {
                    for instr in &mut block.instrs {
                        for op in instr.op.operands_mut() {
                            if op.as_value() == Some(value) {
                                *op = Operand::Const(constant.clone());
                            }
                        }
                    }
                    match &mut block.term {
                        Some(Terminator::CondBr { cond, .. }) => {
                            if cond.as_value() == Some(value) {
                                *cond = Operand::Const(constant.clone());
                            }
                        }
                        Some(Terminator::Match { subject, .. }) => {
                            if subject.as_value() == Some(value) {
                                *subject = Operand::Const(constant.clone());
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        ok
    }
}
