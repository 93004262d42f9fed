//! file: core/src/ir/lower/mod.rs
//! description: AST to IR lowering.
//!
//! Each handler is lowered to basic blocks with a fresh `Builder`. Type
//! inference runs bottom-up while lowering; mismatches become `TypeError`s
//! and the offending expression is dropped. User-handler invocations are
//! inlined at their call sites, since the bytecode has no user-call
//! instruction.

pub mod lower_expr;
pub mod lower_stmt;

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::ast::{self, Handler, HandlerCallee, Stmt, Unit, VarId};
use crate::diagnostics::{Message, Report};
use crate::ir::{Builder, IrProgram, Operand, ValueId};
use crate::types::LiteralType;

/// Lowers `unit` to an IR program. `entry_points` names the handlers the
/// host will invoke; a missing entry point is only a warning, since a
/// configuration may choose not to define `setup`.
pub fn generate(unit: &Unit, entry_points: &[&str], report: &mut Report) -> IrProgram {
    if !entry_points.is_empty() && !entry_points.iter().any(|e| unit.handler(e).is_some()) {
        report.push(Message::new(
            crate::diagnostics::MessageKind::Warning,
            None,
            format!("none of the entry handlers ({}) is defined", entry_points.join(", ")),
        ));
    }

    let mut lowerer = Lowerer {
        unit,
        builder: Builder::new(),
        report,
        slots: HashMap::new(),
        var_types: HashMap::new(),
        inline_stack: Vec::new(),
    };
    lowerer.builder.set_modules(unit.modules.clone());
    for handler in &unit.handlers {
        lowerer.lower_handler(handler);
    }
    lowerer.builder.finish()
}

pub(crate) struct Lowerer<'a> {
    pub unit: &'a Unit,
    pub builder: Builder,
    pub report: &'a mut Report,
    /// Storage slot per variable declaration, local to the handler being
    /// lowered.
    pub slots: HashMap<VarId, ValueId>,
    pub var_types: HashMap<VarId, LiteralType>,
    /// Names of user handlers currently being inlined, for cycle detection.
    pub inline_stack: Vec<String>,
}

impl<'a> Lowerer<'a> {
    fn lower_handler(&mut self, handler: &Handler) {
        debug!("lowering handler '{}'", handler.name);
        self.slots.clear();
        self.var_types.clear();
        self.inline_stack.clear();
        self.inline_stack.push(handler.name.clone());

        self.builder.start_handler(&handler.name);
        let entry = self.builder.create_block("entry");
        self.builder.set_insert_point(entry);

        self.materialize_unit_vars(handler);
        self.lower_stmt(&handler.body);

        if !self.builder.block_terminated() {
            self.builder.create_ret(false);
        }
    }

    /// Allocates and initializes the unit-scope variables this handler
    /// references (directly or through inlined handlers), in declaration
    /// order.
    fn materialize_unit_vars(&mut self, handler: &Handler) {
        let mut referenced: Vec<VarId> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        self.collect_reachable_refs(&handler.body, &mut visited, &mut referenced);

        // Initializers may reference earlier unit variables.
        loop {
            let before = referenced.len();
            for decl in &self.unit.vars {
                if referenced.contains(&decl.id) {
                    ast::collect_var_refs(&Stmt::Var(decl.clone()), &mut referenced);
                }
            }
            if referenced.len() == before {
                break;
            }
        }

        for decl in &self.unit.vars {
            if referenced.contains(&decl.id) {
                self.lower_var_decl(decl);
            }
        }
    }

    fn collect_reachable_refs<'u>(
        &self,
        body: &'u Stmt,
        visited: &mut HashSet<&'u str>,
        out: &mut Vec<VarId>,
    ) where
        'a: 'u,
    {
        ast::collect_var_refs(body, out);
        let mut handlers: Vec<&str> = Vec::new();
        collect_user_calls(body, &mut handlers);
        for name in handlers {
            if visited.insert(name) {
                if let Some(h) = self.unit.handler(name) {
                    self.collect_reachable_refs(&h.body, visited, out);
                }
            }
        }
    }

    pub(crate) fn type_error(&mut self, span: &crate::location::Span, text: impl Into<String>) {
        self.report.push(Message::type_error(span.clone(), text));
    }

    /// Coerces `operand` of type `from` into `to`, inserting an explicit
    /// cast where the language allows it. Returns `None` when the types are
    /// incompatible.
    pub(crate) fn coerce(
        &mut self,
        operand: Operand,
        from: LiteralType,
        to: LiteralType,
    ) -> Option<Operand> {
        if from == to {
            return Some(operand);
        }
        // Booleans flow into number parameters unchanged; the runtime
        // getters accept either representation.
        if from == LiteralType::Boolean && to == LiteralType::Number {
            return Some(operand);
        }
        let castable = matches!(
            (from, to),
            (LiteralType::Number, LiteralType::String)
                | (LiteralType::String, LiteralType::Number)
                | (LiteralType::IPAddress, LiteralType::String)
                | (LiteralType::Cidr, LiteralType::String)
                | (LiteralType::RegExp, LiteralType::String)
        );
        if castable {
            let id = self.builder.create_cast(to, operand, "cast");
            Some(Operand::Value(id))
        } else {
            None
        }
    }
}

fn collect_user_calls<'u>(stmt: &'u Stmt, out: &mut Vec<&'u str>) {
    match stmt {
        Stmt::HandlerCall { callee: HandlerCallee::User(name), .. } => out.push(name),
        Stmt::Compound { stmts, .. } => {
            for s in stmts {
                collect_user_calls(s, out);
            }
        }
        Stmt::Cond { then, otherwise, .. } => {
            collect_user_calls(then, out);
            if let Some(e) = otherwise {
                collect_user_calls(e, out);
            }
        }
        Stmt::Match { arms, otherwise, .. } => {
            for arm in arms {
                collect_user_calls(&arm.body, out);
            }
            if let Some(e) = otherwise {
                collect_user_calls(e, out);
            }
        }
        _ => {}
    }
}
