//! file: core/src/ir/builder.rs
//! description: construction helper for the IR.
//!
//! The builder owns the program while it is being produced, tracks the
//! current handler and insertion block, generates collision-free value and
//! block names, and offers one `create_*` method per instruction and
//! terminator kind.

use std::collections::HashMap;

use crate::ir::{
    BinaryAluOp, Block, BlockId, Instr, InstrOp, IrHandler, IrProgram, Operand, Terminator,
    UnaryAluOp, ValueDef, ValueId,
};
use crate::location::Span;
use crate::types::{Constant, LiteralType, Signature};
use crate::vm::matcher::MatchClass;

#[derive(Default)]
pub struct Builder {
    program: IrProgram,
    current: Option<usize>,
    point: Option<BlockId>,
    names: HashMap<String, usize>,
    span: Option<Span>,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    /// Returns `name`, or `name` with a numeric suffix if it was already
    /// handed out.
    pub fn make_name(&mut self, name: &str) -> String {
        let n = self.names.entry(name.to_string()).or_insert(0);
        *n += 1;
        if *n == 1 {
            name.to_string()
        } else {
            format!("{}{}", name, *n - 1)
        }
    }

    /// Sets the span attached to subsequently created instructions.
    pub fn set_span(&mut self, span: Option<Span>) {
        self.span = span;
    }

    // ------------------------------------------------------------------
    // handlers and blocks

    pub fn start_handler(&mut self, name: &str) {
        self.program.handlers.push(IrHandler {
            name: name.to_string(),
            blocks: Vec::new(),
            values: Vec::new(),
        });
        self.current = Some(self.program.handlers.len() - 1);
        self.point = None;
    }

    fn handler_mut(&mut self) -> &mut IrHandler {
        let index = self.current.expect("no current handler");
        &mut self.program.handlers[index]
    }

    pub fn handler(&self) -> &IrHandler {
        let index = self.current.expect("no current handler");
        &self.program.handlers[index]
    }

    pub fn create_block(&mut self, name: &str) -> BlockId {
        let name = self.make_name(name);
        let handler = self.handler_mut();
        handler.blocks.push(Block { name, instrs: Vec::new(), term: None });
        BlockId(handler.blocks.len() as u32 - 1)
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        self.point = Some(block);
    }

    pub fn insert_point(&self) -> Option<BlockId> {
        self.point
    }

    /// Whether the current insertion block already ends in a terminator.
    pub fn block_terminated(&self) -> bool {
        match self.point {
            Some(block) => self.handler().block(block).term.is_some(),
            None => true,
        }
    }

    // ------------------------------------------------------------------
    // values and instructions

    fn define(&mut self, ty: LiteralType, name: &str) -> ValueId {
        let name = self.make_name(name);
        let handler = self.handler_mut();
        handler.values.push(ValueDef { name, ty });
        ValueId(handler.values.len() as u32 - 1)
    }

    fn insert(&mut self, value: Option<ValueId>, op: InstrOp) {
        let span = self.span.clone();
        let point = self.point.expect("no insertion point");
        let handler = self.handler_mut();
        debug_assert!(
            handler.blocks[point.0 as usize].term.is_none(),
            "instruction inserted after terminator"
        );
        handler.blocks[point.0 as usize].instrs.push(Instr { value, op, span });
    }

    pub fn value_type(&self, id: ValueId) -> LiteralType {
        self.handler().value(id).ty
    }

    /// The type an operand evaluates to.
    pub fn operand_type(&self, op: &Operand) -> LiteralType {
        match op {
            Operand::Value(id) => self.value_type(*id),
            Operand::Const(c) => c.ty(),
        }
    }

    /// Reserves a storage slot. Allocas always land at the top of the entry
    /// block, whatever the insertion point, so every block sees the same
    /// stack layout of locals.
    pub fn create_alloca(&mut self, ty: LiteralType, name: &str) -> ValueId {
        let id = self.define(ty, name);
        let span = self.span.clone();
        let handler = self.handler_mut();
        let entry = &mut handler.blocks[0];
        let at = entry
            .instrs
            .iter()
            .take_while(|i| matches!(i.op, InstrOp::Alloca))
            .count();
        entry.instrs.insert(at, Instr { value: Some(id), op: InstrOp::Alloca, span });
        id
    }

    pub fn create_store(&mut self, slot: ValueId, value: Operand) {
        self.insert(None, InstrOp::Store { slot, value });
    }

    pub fn create_load(&mut self, slot: ValueId) -> ValueId {
        let ty = self.value_type(slot);
        let name = format!("{}.load", self.handler().value(slot).name);
        let id = self.define(ty, &name);
        self.insert(Some(id), InstrOp::Load { slot });
        id
    }

    pub fn create_phi(&mut self, incomings: Vec<(BlockId, Operand)>, name: &str) -> ValueId {
        let ty = incomings
            .first()
            .map(|(_, op)| self.operand_type(op))
            .unwrap_or(LiteralType::Void);
        let id = self.define(ty, name);
        self.insert(Some(id), InstrOp::Phi { incomings });
        id
    }

    pub fn create_unary(&mut self, op: UnaryAluOp, operand: Operand, name: &str) -> ValueId {
        let id = self.define(op.result_type(), name);
        self.insert(Some(id), InstrOp::Unary { op, operand });
        id
    }

    pub fn create_binary(
        &mut self,
        op: BinaryAluOp,
        lhs: Operand,
        rhs: Operand,
        name: &str,
    ) -> ValueId {
        let id = self.define(op.result_type(), name);
        self.insert(Some(id), InstrOp::Binary { op, lhs, rhs });
        id
    }

    pub fn create_cast(&mut self, to: LiteralType, value: Operand, name: &str) -> ValueId {
        let id = self.define(to, name);
        self.insert(Some(id), InstrOp::Cast { to, value });
        id
    }

    /// Emits a builtin function call; returns the result value unless the
    /// callee returns void.
    pub fn create_call(&mut self, signature: &Signature, args: Vec<Operand>) -> Option<ValueId> {
        let callee = self.get_function(signature);
        let value = if signature.return_type == LiteralType::Void {
            None
        } else {
            Some(self.define(signature.return_type, &signature.name.replace('.', "_")))
        };
        self.insert(value, InstrOp::Call { callee, args });
        value
    }

    pub fn create_handler_call(&mut self, signature: &Signature, args: Vec<Operand>) {
        let callee = self.get_builtin_handler(signature);
        self.insert(None, InstrOp::HandlerCall { callee, args });
    }

    pub fn create_nop(&mut self) {
        self.insert(None, InstrOp::Nop);
    }

    // ------------------------------------------------------------------
    // builtin descriptors

    pub fn get_function(&mut self, signature: &Signature) -> usize {
        match self.program.functions.iter().position(|s| s == signature) {
            Some(index) => index,
            None => {
                self.program.functions.push(signature.clone());
                self.program.functions.len() - 1
            }
        }
    }

    pub fn get_builtin_handler(&mut self, signature: &Signature) -> usize {
        match self.program.handler_builtins.iter().position(|s| s == signature) {
            Some(index) => index,
            None => {
                self.program.handler_builtins.push(signature.clone());
                self.program.handler_builtins.len() - 1
            }
        }
    }

    // ------------------------------------------------------------------
    // terminators

    fn terminate(&mut self, term: Terminator) {
        let point = self.point.expect("no insertion point");
        let handler = self.handler_mut();
        debug_assert!(
            handler.blocks[point.0 as usize].term.is_none(),
            "block terminated twice"
        );
        handler.blocks[point.0 as usize].term = Some(term);
    }

    pub fn create_br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br(target));
    }

    pub fn create_cond_br(&mut self, cond: Operand, on_true: BlockId, on_false: BlockId) {
        self.terminate(Terminator::CondBr { cond, on_true, on_false });
    }

    pub fn create_ret(&mut self, value: bool) {
        self.terminate(Terminator::Ret { value: Constant::Bool(value) });
    }

    pub fn create_match(
        &mut self,
        class: MatchClass,
        subject: Operand,
        cases: Vec<(Constant, BlockId)>,
        fallback: BlockId,
    ) {
        self.terminate(Terminator::Match { class, subject, cases, fallback });
    }

    // ------------------------------------------------------------------

    pub fn set_modules(&mut self, modules: Vec<String>) {
        self.program.modules = modules;
    }

    pub fn finish(self) -> IrProgram {
        self.program
    }
}
