//! file: core/src/ir/mod.rs
//! description: typed SSA-style intermediate representation.
//!
//! An `IrProgram` owns one `IrHandler` per source handler. Handlers own
//! their basic blocks and a value-definition table; blocks and values are
//! referred to by index (`BlockId`, `ValueId`), never by pointer.
//! Predecessor/successor relations are derived from terminators on demand.

pub mod builder;
pub mod lower;
pub mod opt;

pub use builder::Builder;

use std::fmt;

use crate::location::Span;
use crate::types::{Constant, LiteralType, Signature};
use crate::vm::matcher::MatchClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// An instruction operand: the result of another instruction or a literal
/// constant. Constants are interned by value when the constant pool is
/// built.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(ValueId),
    Const(Constant),
}

impl Operand {
    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            Operand::Const(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(id) => write!(f, "{}", id),
            Operand::Const(c) => write!(f, "{}", c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryAluOp {
    /// Numeric negation.
    INeg,
    /// Numeric bitwise complement.
    INot,
    /// Boolean negation.
    BNot,
    /// String length.
    SLen,
    /// String emptiness test.
    SIsEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryAluOp {
    IAdd,
    ISub,
    IMul,
    IDiv,
    IRem,
    IPow,
    IShl,
    IShr,
    IAnd,
    IOr,
    IXor,
    ICmpEq,
    ICmpNe,
    ICmpLe,
    ICmpGe,
    ICmpLt,
    ICmpGt,
    BAnd,
    BOr,
    BXor,
    SAdd,
    SSubStr,
    SCmpEq,
    SCmpNe,
    SCmpLe,
    SCmpGe,
    SCmpLt,
    SCmpGt,
    SCmpRe,
    SCmpBeg,
    SCmpEnd,
    SIn,
    PCmpEq,
    PCmpNe,
    PInCidr,
}

impl BinaryAluOp {
    /// The result type of the operation.
    pub fn result_type(&self) -> LiteralType {
        use BinaryAluOp::*;
        match self {
            IAdd | ISub | IMul | IDiv | IRem | IPow | IShl | IShr | IAnd | IOr | IXor => {
                LiteralType::Number
            }
            SAdd | SSubStr => LiteralType::String,
            _ => LiteralType::Boolean,
        }
    }

    /// Whether swapping the operands preserves the result.
    pub fn is_commutative(&self) -> bool {
        use BinaryAluOp::*;
        matches!(
            self,
            IAdd | IMul | IAnd | IOr | IXor | ICmpEq | ICmpNe | BAnd | BOr | BXor | SCmpEq
                | SCmpNe | PCmpEq | PCmpNe
        )
    }
}

impl UnaryAluOp {
    pub fn result_type(&self) -> LiteralType {
        match self {
            UnaryAluOp::INeg | UnaryAluOp::INot | UnaryAluOp::SLen => LiteralType::Number,
            UnaryAluOp::BNot | UnaryAluOp::SIsEmpty => LiteralType::Boolean,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrOp {
    /// Reserves one storage slot on the runner's stack.
    Alloca,
    Store { slot: ValueId, value: Operand },
    Load { slot: ValueId },
    Phi { incomings: Vec<(BlockId, Operand)> },
    Unary { op: UnaryAluOp, operand: Operand },
    Binary { op: BinaryAluOp, lhs: Operand, rhs: Operand },
    Cast { to: LiteralType, value: Operand },
    /// Call of a builtin function (index into `IrProgram::functions`).
    Call { callee: usize, args: Vec<Operand> },
    /// Invocation of a builtin handler (index into `IrProgram::handler_builtins`).
    HandlerCall { callee: usize, args: Vec<Operand> },
    Nop,
}

impl InstrOp {
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            InstrOp::Load { .. }
                | InstrOp::Phi { .. }
                | InstrOp::Unary { .. }
                | InstrOp::Binary { .. }
                | InstrOp::Cast { .. }
                | InstrOp::Nop
        )
    }

    /// Operands read by this instruction.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            InstrOp::Alloca | InstrOp::Load { .. } | InstrOp::Nop => Vec::new(),
            InstrOp::Store { value, .. } => vec![value],
            InstrOp::Phi { incomings } => incomings.iter().map(|(_, op)| op).collect(),
            InstrOp::Unary { operand, .. } => vec![operand],
            InstrOp::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            InstrOp::Cast { value, .. } => vec![value],
            InstrOp::Call { args, .. } | InstrOp::HandlerCall { args, .. } => args.iter().collect(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            InstrOp::Alloca | InstrOp::Load { .. } | InstrOp::Nop => Vec::new(),
            InstrOp::Store { value, .. } => vec![value],
            InstrOp::Phi { incomings } => incomings.iter_mut().map(|(_, op)| op).collect(),
            InstrOp::Unary { operand, .. } => vec![operand],
            InstrOp::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            InstrOp::Cast { value, .. } => vec![value],
            InstrOp::Call { args, .. } | InstrOp::HandlerCall { args, .. } => {
                args.iter_mut().collect()
            }
        }
    }
}

/// A single IR instruction. Non-void instructions define exactly one SSA
/// value recorded in the handler's value table.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub value: Option<ValueId>,
    pub op: InstrOp,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr { cond: Operand, on_true: BlockId, on_false: BlockId },
    Ret { value: Constant },
    Match {
        class: MatchClass,
        subject: Operand,
        cases: Vec<(Constant, BlockId)>,
        fallback: BlockId,
    },
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr { on_true, on_false, .. } => vec![*on_true, *on_false],
            Terminator::Ret { .. } => Vec::new(),
            Terminator::Match { cases, fallback, .. } => {
                let mut out: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                out.push(*fallback);
                out
            }
        }
    }

    pub fn successors_mut(&mut self) -> Vec<&mut BlockId> {
        match self {
            Terminator::Br(target) => vec![target],
            Terminator::CondBr { on_true, on_false, .. } => vec![on_true, on_false],
            Terminator::Ret { .. } => Vec::new(),
            Terminator::Match { cases, fallback, .. } => {
                let mut out: Vec<&mut BlockId> = cases.iter_mut().map(|(_, b)| b).collect();
                out.push(fallback);
                out
            }
        }
    }
}

/// A basic block: a name, an ordered instruction list and exactly one
/// terminator. The terminator is `None` only while the builder is still
/// filling the block in.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub instrs: Vec<Instr>,
    pub term: Option<Terminator>,
}

impl Block {
    pub fn terminator(&self) -> &Terminator {
        self.term.as_ref().expect("block has no terminator")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueDef {
    pub name: String,
    pub ty: LiteralType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrHandler {
    pub name: String,
    pub blocks: Vec<Block>,
    pub values: Vec<ValueDef>,
}

impl IrHandler {
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn value(&self, id: ValueId) -> &ValueDef {
        &self.values[id.0 as usize]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        self.block(id).term.as_ref().map(|t| t.successors()).unwrap_or_default()
    }

    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        self.block_ids()
            .filter(|b| self.successors(*b).contains(&id))
            .collect()
    }

    /// Counts how many times each value is read, over all instructions and
    /// terminators.
    pub fn use_counts(&self) -> Vec<usize> {
        fn bump(counts: &mut [usize], op: &Operand) {
            if let Operand::Value(id) = op {
                counts[id.0 as usize] += 1;
            }
        }

        let mut counts = vec![0usize; self.values.len()];
        for block in &self.blocks {
            for instr in &block.instrs {
                for op in instr.op.operands() {
                    bump(&mut counts, op);
                }
                if let InstrOp::Store { slot, .. } | InstrOp::Load { slot } = &instr.op {
                    counts[slot.0 as usize] += 1;
                }
            }
            match &block.term {
                Some(Terminator::CondBr { cond, .. }) => bump(&mut counts, cond),
                Some(Terminator::Match { subject, .. }) => bump(&mut counts, subject),
                _ => {}
            }
        }
        counts
    }
}

/// Descriptor tables plus the lowered handlers of one compilation.
#[derive(Debug, Clone, Default)]
pub struct IrProgram {
    pub handlers: Vec<IrHandler>,
    pub modules: Vec<String>,
    /// Builtin function descriptors, referenced by `InstrOp::Call::callee`.
    pub functions: Vec<Signature>,
    /// Builtin handler descriptors, referenced by `InstrOp::HandlerCall::callee`.
    pub handler_builtins: Vec<Signature>,
}

impl IrProgram {
    pub fn handler(&self, name: &str) -> Option<&IrHandler> {
        self.handlers.iter().find(|h| h.name == name)
    }

    pub fn handler_mut(&mut self, name: &str) -> Option<&mut IrHandler> {
        self.handlers.iter_mut().find(|h| h.name == name)
    }
}

impl fmt::Display for IrProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for handler in &self.handlers {
            writeln!(f, "handler {} {{", handler.name)?;
            for (i, block) in handler.blocks.iter().enumerate() {
                writeln!(f, "  {} ({}):", BlockId(i as u32), block.name)?;
                for instr in &block.instrs {
                    write!(f, "    ")?;
                    if let Some(v) = instr.value {
                        write!(f, "{} = ", v)?;
                    }
                    writeln!(f, "{}", DisplayOp(&instr.op, self))?;
                }
                match &block.term {
                    Some(term) => writeln!(f, "    {}", DisplayTerm(term))?,
                    None => writeln!(f, "    <unterminated>")?,
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

struct DisplayOp<'a>(&'a InstrOp, &'a IrProgram);

impl fmt::Display for DisplayOp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            InstrOp::Alloca => write!(f, "alloca"),
            InstrOp::Store { slot, value } => write!(f, "store {}, {}", slot, value),
            InstrOp::Load { slot } => write!(f, "load {}", slot),
            InstrOp::Phi { incomings } => {
                write!(f, "phi ")?;
                for (i, (block, op)) in incomings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{}: {}]", block, op)?;
                }
                Ok(())
            }
            InstrOp::Unary { op, operand } => write!(f, "{:?} {}", op, operand),
            InstrOp::Binary { op, lhs, rhs } => write!(f, "{:?} {}, {}", op, lhs, rhs),
            InstrOp::Cast { to, value } => write!(f, "cast<{}> {}", to, value),
            InstrOp::Call { callee, args } => {
                write!(f, "call {}(", self.1.functions[*callee].name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            InstrOp::HandlerCall { callee, args } => {
                write!(f, "invoke {}(", self.1.handler_builtins[*callee].name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            InstrOp::Nop => write!(f, "nop"),
        }
    }
}

struct DisplayTerm<'a>(&'a Terminator);

impl fmt::Display for DisplayTerm<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Terminator::Br(target) => write!(f, "br {}", target),
            Terminator::CondBr { cond, on_true, on_false } => {
                write!(f, "condbr {}, {}, {}", cond, on_true, on_false)
            }
            Terminator::Ret { value } => write!(f, "ret {}", value),
            Terminator::Match { class, subject, cases, fallback } => {
                write!(f, "match.{} {} [", class, subject)?;
                for (i, (label, block)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} -> {}", label, block)?;
                }
                write!(f, "] else {}", fallback)
            }
        }
    }
}
