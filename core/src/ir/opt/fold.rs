//! Instruction-level cleanup: constant folding, branch folding, operand
//! canonicalization and removal of unused pure instructions.

use std::collections::HashMap;

use crate::ir::{BinaryAluOp, InstrOp, IrHandler, Operand, Terminator, UnaryAluOp, ValueId};
use crate::types::{Constant, LiteralType};

use super::Pass;

pub struct InstructionElimination;

impl Pass for InstructionElimination {
    fn name(&self) -> &'static str {
        "instruction-elimination"
    }

    fn run(&mut self, handler: &mut IrHandler) -> bool {
        let mut changed = false;
        // Each step can expose more work; iterate until the handler is
        // stable so a second run of the whole pass is a no-op.
        loop {
            let mut step = false;
            step |= fold_constants(handler);
            step |= fold_branches(handler);
            step |= canonicalize(handler);
            step |= remove_dead(handler);
            if !step {
                return changed;
            }
            changed = true;
        }
    }
}

/// Replaces pure instructions whose operands are all constants with their
/// computed value, rewriting every use.
fn fold_constants(handler: &mut IrHandler) -> bool {
    let mut folded: HashMap<ValueId, Constant> = HashMap::new();

    for block in &mut handler.blocks {
        for instr in &mut block.instrs {
            // Propagate earlier folds into this instruction first.
            for op in instr.op.operands_mut() {
                if let Operand::Value(id) = op {
                    if let Some(c) = folded.get(id) {
                        *op = Operand::Const(c.clone());
                    }
                }
            }

            let Some(value) = instr.value else { continue };
            let computed = match &instr.op {
                InstrOp::Unary { op, operand } => {
                    operand.as_const().and_then(|c| eval_unary(*op, c))
                }
                InstrOp::Binary { op, lhs, rhs } => match (lhs.as_const(), rhs.as_const()) {
                    (Some(a), Some(b)) => eval_binary(*op, a, b),
                    _ => None,
                },
                InstrOp::Cast { to, value } => value.as_const().and_then(|c| eval_cast(*to, c)),
                _ => None,
            };
            if let Some(constant) = computed {
                folded.insert(value, constant);
                instr.op = InstrOp::Nop;
                instr.value = None;
            }
        }
    }

    if folded.is_empty() {
        return false;
    }

    // Rewrite any remaining uses, including terminator operands.
    for block in &mut handler.blocks {
        for instr in &mut block.instrs {
            for op in instr.op.operands_mut() {
                if let Operand::Value(id) = op {
                    if let Some(c) = folded.get(id) {
                        *op = Operand::Const(c.clone());
                    }
                }
            }
        }
        match &mut block.term {
            Some(Terminator::CondBr { cond, .. }) => {
                if let Operand::Value(id) = cond {
                    if let Some(c) = folded.get(id) {
                        *cond = Operand::Const(c.clone());
                    }
                }
            }
            Some(Terminator::Match { subject, .. }) => {
                if let Operand::Value(id) = subject {
                    if let Some(c) = folded.get(id) {
                        *subject = Operand::Const(c.clone());
                    }
                }
            }
            _ => {}
        }
    }
    true
}

/// Turns conditional branches on a constant into unconditional ones.
fn fold_branches(handler: &mut IrHandler) -> bool {
    let mut changed = false;
    for block in &mut handler.blocks {
        if let Some(Terminator::CondBr { cond, on_true, on_false }) = &block.term {
            if let Some(Constant::Bool(b)) = cond.as_const() {
                let target = if *b { *on_true } else { *on_false };
                block.term = Some(Terminator::Br(target));
                changed = true;
            }
        }
    }
    changed
}

/// Moves the constant operand of a commutative binary to the right-hand
/// side, so later emission can favor immediate forms.
fn canonicalize(handler: &mut IrHandler) -> bool {
    let mut changed = false;
    for block in &mut handler.blocks {
        for instr in &mut block.instrs {
            if let InstrOp::Binary { op, lhs, rhs } = &mut instr.op {
                if op.is_commutative()
                    && matches!(lhs, Operand::Const(_))
                    && matches!(rhs, Operand::Value(_))
                {
                    std::mem::swap(lhs, rhs);
                    changed = true;
                }
            }
        }
    }
    changed
}

/// Drops pure instructions whose result is never read, plus leftover nops.
fn remove_dead(handler: &mut IrHandler) -> bool {
    let counts = handler.use_counts();
    let mut changed = false;
    for block in &mut handler.blocks {
        let before = block.instrs.len();
        block.instrs.retain(|instr| {
            if matches!(instr.op, InstrOp::Nop) {
                return false;
            }
            if !instr.op.is_pure() {
                return true;
            }
            match instr.value {
                Some(id) => counts[id.0 as usize] > 0,
                None => true,
            }
        });
        changed |= block.instrs.len() != before;
    }
    changed
}

// ---------------------------------------------------------------------
// constant evaluation

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

fn eval_unary(op: UnaryAluOp, operand: &Constant) -> Option<Constant> {
    Some(match (op, operand) {
        (UnaryAluOp::INeg, Constant::Number(n)) => Constant::Number(n.wrapping_neg()),
        (UnaryAluOp::INot, Constant::Number(n)) => Constant::Number(!n),
        (UnaryAluOp::BNot, Constant::Bool(b)) => Constant::Bool(!b),
        (UnaryAluOp::SLen, Constant::Str(s)) => Constant::Number(s.chars().count() as i64),
        (UnaryAluOp::SIsEmpty, Constant::Str(s)) => Constant::Bool(s.is_empty()),
        _ => return None,
    })
}

fn eval_binary(op: BinaryAluOp, a: &Constant, b: &Constant) -> Option<Constant> {
    use BinaryAluOp::*;
    use Constant::*;

    Some(match (op, a, b) {
        (IAdd, Number(x), Number(y)) => Number(x.wrapping_add(*y)),
        (ISub, Number(x), Number(y)) => Number(x.wrapping_sub(*y)),
        (IMul, Number(x), Number(y)) => Number(x.wrapping_mul(*y)),
        (IDiv, Number(_), Number(0)) => return None,
        (IDiv, Number(x), Number(y)) => Number(x.wrapping_div(*y)),
        (IRem, Number(_), Number(0)) => return None,
        (IRem, Number(x), Number(y)) => Number(x.wrapping_rem(*y)),
        (IPow, Number(x), Number(y)) => Number(ipow(*x, *y)),
        (IShl, Number(x), Number(y)) => Number(x.wrapping_shl(*y as u32)),
        (IShr, Number(x), Number(y)) => Number(x.wrapping_shr(*y as u32)),
        (IAnd, Number(x), Number(y)) => Number(x & y),
        (IOr, Number(x), Number(y)) => Number(x | y),
        (IXor, Number(x), Number(y)) => Number(x ^ y),

        (ICmpEq, Number(x), Number(y)) => Bool(x == y),
        (ICmpNe, Number(x), Number(y)) => Bool(x != y),
        (ICmpLe, Number(x), Number(y)) => Bool(x <= y),
        (ICmpGe, Number(x), Number(y)) => Bool(x >= y),
        (ICmpLt, Number(x), Number(y)) => Bool(x < y),
        (ICmpGt, Number(x), Number(y)) => Bool(x > y),

        (BAnd, Bool(x), Bool(y)) => Bool(*x && *y),
        (BOr, Bool(x), Bool(y)) => Bool(*x || *y),
        (BXor, Bool(x), Bool(y)) => Bool(x != y),

        (SAdd, Str(x), Str(y)) => Str(format!("{}{}", x, y)),
        (SCmpEq, Str(x), Str(y)) => Bool(x == y),
        (SCmpNe, Str(x), Str(y)) => Bool(x != y),
        (SCmpLe, Str(x), Str(y)) => Bool(x <= y),
        (SCmpGe, Str(x), Str(y)) => Bool(x >= y),
        (SCmpLt, Str(x), Str(y)) => Bool(x < y),
        (SCmpGt, Str(x), Str(y)) => Bool(x > y),
        (SCmpBeg, Str(x), Str(y)) => Bool(x.starts_with(y.as_str())),
        (SCmpEnd, Str(x), Str(y)) => Bool(x.ends_with(y.as_str())),
        (SIn, Str(needle), Str(haystack)) => Bool(haystack.contains(needle.as_str())),
        (SCmpRe, Str(s), Regex(pattern)) => {
            let re = regex::Regex::new(pattern).ok()?;
            Bool(re.is_match(s))
        }
        (SSubStr, Str(s), Number(from)) => {
            let from = (*from).max(0) as usize;
            Str(s.chars().skip(from).collect())
        }

        (PCmpEq, IP(x), IP(y)) => Bool(x == y),
        (PCmpNe, IP(x), IP(y)) => Bool(x != y),
        (PInCidr, IP(ip), Cidr(cidr)) => Bool(cidr.contains(ip)),

        _ => return None,
    })
}

fn eval_cast(to: LiteralType, value: &Constant) -> Option<Constant> {
    if value.ty() == to {
        return Some(value.clone());
    }
    Some(match (to, value) {
        (LiteralType::String, Constant::Number(n)) => Constant::Str(n.to_string()),
        (LiteralType::String, Constant::IP(ip)) => Constant::Str(ip.to_string()),
        (LiteralType::String, Constant::Cidr(c)) => Constant::Str(c.to_string()),
        (LiteralType::String, Constant::Regex(p)) => Constant::Str(p.clone()),
        (LiteralType::Number, Constant::Str(s)) => {
            Constant::Number(s.trim().parse().unwrap_or(0))
        }
        _ => return None,
    })
}
