//! Elimination of forwarding-only blocks.

use crate::ir::{IrHandler, Terminator};

use super::Pass;

/// A block whose body is empty and whose terminator is an unconditional
/// branch contributes nothing; every predecessor is redirected past it.
pub struct EmptyBlockElimination;

impl Pass for EmptyBlockElimination {
    fn name(&self) -> &'static str {
        "empty-block"
    }

    fn run(&mut self, handler: &mut IrHandler) -> bool {
        let mut changed = false;
        for block in handler.block_ids() {
            if block == handler.entry() {
                continue;
            }
            let forward = {
                let b = handler.block(block);
                match (&b.instrs[..], &b.term) {
                    ([], Some(Terminator::Br(target))) if *target != block => Some(*target),
                    _ => None,
                }
            };
            let Some(target) = forward else {
                continue;
            };
            for pred in handler.predecessors(block) {
                if let Some(term) = &mut handler.block_mut(pred).term {
                    for succ in term.successors_mut() {
                        if *succ == block {
                            *succ = target;
                            changed = true;
                        }
                    }
                }
            }
        }
        changed
    }
}
