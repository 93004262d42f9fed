//! file: core/src/vm/codegen.rs
//! description: lowers the IR to stack bytecode plus a constant pool.
//!
//! One pass per handler, in basic-block order. Forward jumps are recorded in
//! worklists and back-patched with the target block's entry PC once the
//! handler is fully emitted; match tables are patched the same way.
//!
//! Stack discipline: the generator maintains a symbolic stack mirroring the
//! runner's. Storage slots (allocas) occupy the bottom and are the only
//! entries allowed to live across a block boundary; every terminator
//! compacts leftover expression temporaries before transferring control, so
//! each block starts from the canonical layout.

use std::collections::HashMap;

use log::{debug, error, trace};

use crate::ir::{
    BinaryAluOp, BlockId, InstrOp, IrHandler, IrProgram, Operand as IrOperand, Terminator,
    UnaryAluOp, ValueId,
};
use crate::types::{Constant, LiteralType};
use crate::vm::matcher::{MatchCase, MatchClass, MatchDef};
use crate::vm::opcode::{Instruction, Opcode};
use crate::vm::program::{ConstantPool, Program};

/// Lowers `ir` into an executable (but not yet linked) program.
pub fn generate(ir: &IrProgram) -> Program {
    let mut pool = ConstantPool::new();
    pool.set_modules(ir.modules.to_vec());
    for handler in &ir.handlers {
        let mut generator = HandlerCodeGen::new(ir, &mut pool, handler);
        generator.run();
    }
    Program::new(pool)
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    /// An alloca-backed storage slot; never consumed by expression code.
    Local(ValueId),
    /// A live instruction result awaiting its use(s).
    Value(ValueId),
    /// A consumable copy about to be popped by the next emitted opcode.
    Temp,
}

struct JumpSite {
    pc: usize,
    opcode: Opcode,
}

struct HandlerCodeGen<'g> {
    ir: &'g IrProgram,
    pool: &'g mut ConstantPool,
    handler: &'g IrHandler,
    handler_id: usize,
    code: Vec<Instruction>,
    stack: Vec<Slot>,
    uses: Vec<usize>,
    cond_jumps: HashMap<BlockId, Vec<JumpSite>>,
    uncond_jumps: HashMap<BlockId, Vec<JumpSite>>,
    match_hints: Vec<(usize, Vec<BlockId>, BlockId)>,
}

impl<'g> HandlerCodeGen<'g> {
    fn new(ir: &'g IrProgram, pool: &'g mut ConstantPool, handler: &'g IrHandler) -> Self {
        let handler_id = pool.make_handler(&handler.name);
        let uses = handler.use_counts();
        HandlerCodeGen {
            ir,
            pool,
            handler,
            handler_id,
            code: Vec::new(),
            stack: Vec::new(),
            uses,
            cond_jumps: HashMap::new(),
            uncond_jumps: HashMap::new(),
            match_hints: Vec::new(),
        }
    }

    fn run(&mut self) {
        debug!("codegen: handler '{}'", self.handler.name);
        let mut entry_pcs: HashMap<BlockId, usize> = HashMap::new();

        for block_id in self.handler.block_ids() {
            entry_pcs.insert(block_id, self.code.len());
            debug_assert!(
                self.stack.iter().all(|s| matches!(s, Slot::Local(_))),
                "non-canonical stack at entry of {}",
                block_id
            );
            let block = self.handler.block(block_id);
            for instr in &block.instrs {
                self.emit_instr(instr);
            }
            match &block.term {
                Some(term) => self.emit_terminator(block_id, term),
                None => {
                    error!("codegen: {} has no terminator", block_id);
                    self.compact(0);
                    self.emit(Instruction::op1(Opcode::Exit, 0));
                }
            }
        }

        // Back-patch forward jumps with the recorded entry PCs.
        for (target, sites) in self.cond_jumps.drain() {
            let pc = entry_pcs[&target];
            for site in sites {
                self.code[site.pc] = Instruction::op1(site.opcode, pc as u16);
            }
        }
        for (target, sites) in self.uncond_jumps.drain() {
            let pc = entry_pcs[&target];
            for site in sites {
                self.code[site.pc] = Instruction::op1(site.opcode, pc as u16);
            }
        }

        // Fill in the match tables.
        for (match_id, case_blocks, else_block) in self.match_hints.drain(..) {
            let def = self.pool.match_def_mut(match_id);
            for (case, block) in def.cases.iter_mut().zip(&case_blocks) {
                case.pc = entry_pcs[block];
            }
            def.else_pc = entry_pcs[&else_block];
        }

        trace!(
            "codegen: '{}' finished at depth {} ({} locals)",
            self.handler.name,
            self.stack.len(),
            self.locals()
        );
        self.pool
            .set_handler_code(self.handler_id, std::mem::take(&mut self.code));
        self.stack.clear();
    }

    // ------------------------------------------------------------------
    // stack bookkeeping

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.push(instruction);
        self.code.len() - 1
    }

    fn locals(&self) -> usize {
        self.stack
            .iter()
            .filter(|s| matches!(s, Slot::Local(_)))
            .count()
    }

    fn position_of(&self, id: ValueId) -> Option<usize> {
        self.stack
            .iter()
            .position(|s| matches!(s, Slot::Local(v) | Slot::Value(v) if *v == id))
    }

    fn remaining_uses(&self, id: ValueId) -> usize {
        self.uses[id.0 as usize]
    }

    fn take_use(&mut self, id: ValueId) {
        let n = &mut self.uses[id.0 as usize];
        *n = n.saturating_sub(1);
    }

    /// Pushes one consumable copy of `operand` onto the stack.
    fn emit_load(&mut self, operand: &IrOperand) {
        match operand {
            IrOperand::Const(constant) => self.emit_const_load(constant),
            IrOperand::Value(id) => {
                let si = match self.position_of(*id) {
                    Some(si) => si,
                    None => {
                        error!("codegen: {} referenced but not on the stack", id);
                        self.emit(Instruction::op1(Opcode::ILoad, 0));
                        self.stack.push(Slot::Temp);
                        return;
                    }
                };
                self.take_use(*id);
                self.emit(Instruction::op1(Opcode::Load, si as u16));
                self.stack.push(Slot::Temp);
            }
        }
    }

    /// Materializes the operands of a k-ary opcode as the top k stack
    /// entries, consuming already-in-place single-use results without
    /// emitting code where possible.
    fn emit_operands(&mut self, operands: &[&IrOperand]) {
        let k = operands.len();
        let mut in_place = 0;
        for try_p in (1..=k.min(self.stack.len())).rev() {
            let base = self.stack.len() - try_p;
            let aligned = (0..try_p).all(|i| match operands[i] {
                IrOperand::Value(id) => {
                    self.remaining_uses(*id) == 1 && self.stack[base + i] == Slot::Value(*id)
                }
                IrOperand::Const(_) => false,
            });
            if aligned {
                in_place = try_p;
                break;
            }
        }

        let base = self.stack.len() - in_place;
        for i in 0..in_place {
            if let IrOperand::Value(id) = operands[i] {
                self.take_use(*id);
            }
            self.stack[base + i] = Slot::Temp;
        }
        for operand in &operands[in_place..] {
            self.emit_load(operand);
        }
    }

    fn emit_const_load(&mut self, constant: &Constant) {
        match constant {
            Constant::Bool(b) => {
                self.emit(Instruction::op1(Opcode::ILoad, *b as u16));
            }
            Constant::Number(n) => {
                if *n >= 0 && *n <= u16::MAX as i64 {
                    self.emit(Instruction::op1(Opcode::ILoad, *n as u16));
                } else {
                    let id = self.pool.make_number(*n);
                    self.emit(Instruction::op1(Opcode::NLoad, id as u16));
                }
            }
            Constant::Str(s) => {
                let id = self.pool.make_string(s);
                self.emit(Instruction::op1(Opcode::SLoad, id as u16));
            }
            Constant::Regex(pattern) => {
                let id = self.pool.make_regex(pattern);
                self.emit(Instruction::op1(Opcode::RLoad, id as u16));
            }
            Constant::IP(ip) => {
                let id = self.pool.make_ipaddr(*ip);
                self.emit(Instruction::op1(Opcode::PLoad, id as u16));
            }
            Constant::Cidr(cidr) => {
                let id = self.pool.make_cidr(*cidr);
                self.emit(Instruction::op1(Opcode::CLoad, id as u16));
            }
            Constant::Handler(name) => {
                let id = self.pool.make_handler(name);
                self.emit(Instruction::op1(Opcode::ILoad, id as u16));
            }
            Constant::NumberArray(a) => {
                let id = self.pool.make_number_array(a.clone());
                self.emit(Instruction::op1(Opcode::ITLoad, id as u16));
            }
            Constant::StringArray(a) => {
                let id = self.pool.make_string_array(a.clone());
                self.emit(Instruction::op1(Opcode::STLoad, id as u16));
            }
            Constant::IPAddressArray(a) => {
                let id = self.pool.make_ipaddr_array(a.clone());
                self.emit(Instruction::op1(Opcode::PTLoad, id as u16));
            }
            Constant::CidrArray(a) => {
                let id = self.pool.make_cidr_array(a.clone());
                self.emit(Instruction::op1(Opcode::CTLoad, id as u16));
            }
        }
        self.stack.push(Slot::Temp);
    }

    /// Pops expression leftovers so only the canonical locals remain, plus
    /// `keep` entries on top that stay live (0 or 1).
    fn compact(&mut self, keep: usize) {
        let want = self.locals() + keep;
        if self.stack.len() <= want {
            return;
        }
        if keep == 1 {
            // Move the kept top entry down over the garbage, then drop the
            // rest.
            let target = want - 1;
            self.emit(Instruction::op1(Opcode::Store, target as u16));
            let top = self.stack.pop().unwrap();
            self.stack[target] = top;
        }
        let surplus = self.stack.len() - want;
        if surplus > 0 {
            self.emit(Instruction::op1(Opcode::Discard, surplus as u16));
            self.stack.truncate(want);
        }
    }

    // ------------------------------------------------------------------
    // instructions

    fn push_result(&mut self, id: Option<ValueId>) {
        match id {
            Some(id) if self.remaining_uses(id) > 0 => self.stack.push(Slot::Value(id)),
            Some(_) => {
                // A result nothing reads: drop it right away.
                self.emit(Instruction::op1(Opcode::Discard, 1));
            }
            None => {}
        }
    }

    fn emit_instr(&mut self, instr: &crate::ir::Instr) {
        match &instr.op {
            InstrOp::Alloca => {
                self.emit(Instruction::op1(Opcode::Alloca, 1));
                self.stack.push(Slot::Local(instr.value.unwrap()));
            }
            InstrOp::Store { slot, value } => {
                let di = match self.position_of(*slot) {
                    Some(di) => di,
                    None => {
                        error!("codegen: store to unallocated slot {}", slot);
                        return;
                    }
                };
                self.take_use(*slot);
                self.emit_operands(&[value]);
                self.emit(Instruction::op1(Opcode::Store, di as u16));
                self.stack.pop();
            }
            InstrOp::Load { slot } => {
                let si = match self.position_of(*slot) {
                    Some(si) => si,
                    None => {
                        error!("codegen: load from unallocated slot {}", slot);
                        return;
                    }
                };
                self.take_use(*slot);
                self.emit(Instruction::op1(Opcode::Load, si as u16));
                self.push_result(instr.value);
            }
            InstrOp::Phi { .. } => {
                error!("codegen: phi must not survive into bytecode");
                self.emit(Instruction::op0(Opcode::Nop));
            }
            InstrOp::Unary { op, operand } => {
                self.emit_operands(&[operand]);
                let opcode = match op {
                    UnaryAluOp::INeg => Opcode::NNeg,
                    UnaryAluOp::INot => Opcode::NNot,
                    UnaryAluOp::BNot => Opcode::BNot,
                    UnaryAluOp::SLen => Opcode::SLen,
                    UnaryAluOp::SIsEmpty => Opcode::SIsEmpty,
                };
                self.emit(Instruction::op0(opcode));
                self.stack.pop();
                self.push_result(instr.value);
            }
            InstrOp::Binary { op: BinaryAluOp::SCmpRe, lhs, rhs } => {
                // The regex stays in the pool; only the subject is loaded.
                let pattern = match rhs.as_const() {
                    Some(Constant::Regex(p)) => p.clone(),
                    _ => {
                        error!("codegen: '=~' without a constant regex operand");
                        String::new()
                    }
                };
                let id = self.pool.make_regex(&pattern);
                self.emit_operands(&[lhs]);
                self.emit(Instruction::op1(Opcode::SRegMatch, id as u16));
                self.stack.pop();
                self.push_result(instr.value);
            }
            InstrOp::Binary { op, lhs, rhs } => {
                self.emit_operands(&[lhs, rhs]);
                self.emit(Instruction::op0(binary_opcode(*op)));
                self.stack.pop();
                self.stack.pop();
                self.push_result(instr.value);
            }
            InstrOp::Cast { to, value } => {
                let from = match value {
                    IrOperand::Value(id) => self.handler.value(*id).ty,
                    IrOperand::Const(c) => c.ty(),
                };
                self.emit_operands(&[value]);
                if let Some(opcode) = cast_opcode(from, *to) {
                    self.emit(Instruction::op0(opcode));
                } else if from != *to {
                    error!("codegen: no conversion from {} to {}", from, to);
                }
                self.stack.pop();
                self.push_result(instr.value);
            }
            InstrOp::Call { callee, args } => {
                let signature = &self.ir.functions[*callee];
                let refs: Vec<&IrOperand> = args.iter().collect();
                self.emit_operands(&refs);
                let native = self
                    .pool
                    .make_native_function(signature, instr.span.as_ref());
                let returns = signature.return_type != LiteralType::Void;
                self.emit(Instruction::new(
                    Opcode::Call,
                    native as u16,
                    args.len() as u16,
                    returns as u16,
                ));
                for _ in 0..args.len() {
                    self.stack.pop();
                }
                if returns {
                    self.push_result(instr.value);
                }
            }
            InstrOp::HandlerCall { callee, args } => {
                let signature = &self.ir.handler_builtins[*callee];
                let refs: Vec<&IrOperand> = args.iter().collect();
                self.emit_operands(&refs);
                let native = self
                    .pool
                    .make_native_handler(signature, instr.span.as_ref());
                self.emit(Instruction::op2(
                    Opcode::Handler,
                    native as u16,
                    args.len() as u16,
                ));
                for _ in 0..args.len() {
                    self.stack.pop();
                }
            }
            InstrOp::Nop => {
                self.emit(Instruction::op0(Opcode::Nop));
            }
        }
    }

    // ------------------------------------------------------------------
    // terminators

    fn next_block(&self, current: BlockId) -> Option<BlockId> {
        let next = current.0 + 1;
        if (next as usize) < self.handler.blocks.len() {
            Some(BlockId(next))
        } else {
            None
        }
    }

    fn emit_cond_jump(&mut self, opcode: Opcode, target: BlockId) {
        let pc = self.emit(Instruction::op0(opcode));
        self.stack.pop();
        self.cond_jumps.entry(target).or_default().push(JumpSite { pc, opcode });
    }

    fn emit_jump(&mut self, target: BlockId) {
        let pc = self.emit(Instruction::op0(Opcode::Jmp));
        self.uncond_jumps
            .entry(target)
            .or_default()
            .push(JumpSite { pc, opcode: Opcode::Jmp });
    }

    fn emit_terminator(&mut self, block: BlockId, term: &Terminator) {
        match term {
            Terminator::Br(target) => {
                self.compact(0);
                // A jump to the block emitted right after this one is
                // implicit.
                if self.next_block(block) != Some(*target) {
                    self.emit_jump(*target);
                }
            }
            Terminator::CondBr { cond, on_true, on_false } => {
                self.emit_operands(&[cond]);
                self.compact(1);
                if self.next_block(block) == Some(*on_true) {
                    self.emit_cond_jump(Opcode::Jz, *on_false);
                } else if self.next_block(block) == Some(*on_false) {
                    self.emit_cond_jump(Opcode::Jn, *on_true);
                } else {
                    self.emit_cond_jump(Opcode::Jn, *on_true);
                    self.emit_jump(*on_false);
                }
            }
            Terminator::Ret { value } => {
                self.compact(0);
                let flag = matches!(value, Constant::Bool(true) | Constant::Number(1..));
                self.emit(Instruction::op1(Opcode::Exit, flag as u16));
            }
            Terminator::Match { class, subject, cases, fallback } => {
                let mut def = MatchDef {
                    handler_id: self.handler_id,
                    class: *class,
                    cases: Vec::with_capacity(cases.len()),
                    else_pc: 0,
                };
                let mut case_blocks = Vec::with_capacity(cases.len());
                for (label, target) in cases {
                    let value = match (class, label) {
                        (MatchClass::RegExp, Constant::Regex(p)) => self.pool.make_regex(p),
                        (_, Constant::Str(s)) => self.pool.make_string(s),
                        (_, other) => {
                            error!("codegen: unsupported match label {}", other);
                            self.pool.make_string("")
                        }
                    };
                    def.cases.push(MatchCase { value, pc: 0 });
                    case_blocks.push(*target);
                }
                let match_id = self.pool.make_match_def(def);
                self.match_hints.push((match_id, case_blocks, *fallback));

                self.emit_operands(&[subject]);
                self.compact(1);
                let opcode = match class {
                    MatchClass::Same => Opcode::SMatchEq,
                    MatchClass::Head => Opcode::SMatchBeg,
                    MatchClass::Tail => Opcode::SMatchEnd,
                    MatchClass::RegExp => Opcode::SMatchR,
                };
                self.emit(Instruction::op1(opcode, match_id as u16));
                self.stack.pop();
            }
        }
    }
}

fn binary_opcode(op: BinaryAluOp) -> Opcode {
    match op {
        BinaryAluOp::IAdd => Opcode::NAdd,
        BinaryAluOp::ISub => Opcode::NSub,
        BinaryAluOp::IMul => Opcode::NMul,
        BinaryAluOp::IDiv => Opcode::NDiv,
        BinaryAluOp::IRem => Opcode::NRem,
        BinaryAluOp::IPow => Opcode::NPow,
        BinaryAluOp::IShl => Opcode::NShl,
        BinaryAluOp::IShr => Opcode::NShr,
        BinaryAluOp::IAnd => Opcode::NAnd,
        BinaryAluOp::IOr => Opcode::NOr,
        BinaryAluOp::IXor => Opcode::NXor,
        BinaryAluOp::ICmpEq => Opcode::NCmpEq,
        BinaryAluOp::ICmpNe => Opcode::NCmpNe,
        BinaryAluOp::ICmpLe => Opcode::NCmpLe,
        BinaryAluOp::ICmpGe => Opcode::NCmpGe,
        BinaryAluOp::ICmpLt => Opcode::NCmpLt,
        BinaryAluOp::ICmpGt => Opcode::NCmpGt,
        BinaryAluOp::BAnd => Opcode::BAnd,
        BinaryAluOp::BOr => Opcode::BOr,
        BinaryAluOp::BXor => Opcode::BXor,
        BinaryAluOp::SAdd => Opcode::SAdd,
        BinaryAluOp::SSubStr => Opcode::SSubStr,
        BinaryAluOp::SCmpEq => Opcode::SCmpEq,
        BinaryAluOp::SCmpNe => Opcode::SCmpNe,
        BinaryAluOp::SCmpLe => Opcode::SCmpLe,
        BinaryAluOp::SCmpGe => Opcode::SCmpGe,
        BinaryAluOp::SCmpLt => Opcode::SCmpLt,
        BinaryAluOp::SCmpGt => Opcode::SCmpGt,
        BinaryAluOp::SCmpBeg => Opcode::SCmpBeg,
        BinaryAluOp::SCmpEnd => Opcode::SCmpEnd,
        BinaryAluOp::SIn => Opcode::SContains,
        BinaryAluOp::PCmpEq => Opcode::PCmpEq,
        BinaryAluOp::PCmpNe => Opcode::PCmpNe,
        BinaryAluOp::PInCidr => Opcode::PInCidr,
        BinaryAluOp::SCmpRe => Opcode::SRegMatch,
    }
}

fn cast_opcode(from: LiteralType, to: LiteralType) -> Option<Opcode> {
    match (from, to) {
        (LiteralType::Number, LiteralType::String) => Some(Opcode::N2S),
        (LiteralType::IPAddress, LiteralType::String) => Some(Opcode::P2S),
        (LiteralType::Cidr, LiteralType::String) => Some(Opcode::C2S),
        (LiteralType::RegExp, LiteralType::String) => Some(Opcode::R2S),
        (LiteralType::String, LiteralType::Number) => Some(Opcode::S2N),
        _ => None,
    }
}
