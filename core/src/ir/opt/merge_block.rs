//! Merging of straight-line block pairs.

use crate::ir::{IrHandler, Terminator};

use super::Pass;

/// When a block `A` ends in an unconditional branch to `B` and `B` has no
/// other predecessor, `B`'s body is appended to `A` and `B` is left
/// unreachable for `UnusedBlockPass` to collect.
pub struct MergeBlockPass;

impl Pass for MergeBlockPass {
    fn name(&self) -> &'static str {
        "merge-block"
    }

    fn run(&mut self, handler: &mut IrHandler) -> bool {
        let mut changed = false;
        loop {
            let mut candidate = None;
            for a in handler.block_ids() {
                let Some(Terminator::Br(b)) = handler.block(a).term.clone() else {
                    continue;
                };
                if b == handler.entry() || b == a {
                    continue;
                }
                if handler.predecessors(b).len() == 1 {
                    candidate = Some((a, b));
                    break;
                }
            }
            let Some((a, b)) = candidate else {
                return changed;
            };

            let donor = handler.block_mut(b);
            let instrs = std::mem::take(&mut donor.instrs);
            let term = donor.term.take();

            let target = handler.block_mut(a);
            target.instrs.extend(instrs);
            target.term = term;
            // `b` keeps no body and no predecessors now.
            handler.block_mut(b).term = Some(Terminator::Ret {
                value: crate::types::Constant::Bool(false),
            });
            changed = true;
        }
    }
}
