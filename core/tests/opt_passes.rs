mod common;

use sluice_core::ir::opt::{
    EmptyBlockElimination, InstructionElimination, MergeBlockPass, Pass, UnusedBlockPass,
};
use sluice_core::ir::{Builder, InstrOp, Operand, Terminator};
use sluice_core::types::Constant;

/// B0 -> B1 -> B2 -> B3 with empty forwarding blocks in the middle.
fn forwarding_chain() -> sluice_core::ir::IrProgram {
    let mut builder = Builder::new();
    builder.start_handler("main");
    let b0 = builder.create_block("entry");
    let b1 = builder.create_block("b1");
    let b2 = builder.create_block("b2");
    let b3 = builder.create_block("b3");

    builder.set_insert_point(b0);
    builder.create_br(b1);
    builder.set_insert_point(b1);
    builder.create_br(b2);
    builder.set_insert_point(b2);
    builder.create_br(b3);
    builder.set_insert_point(b3);
    builder.create_ret(false);
    builder.finish()
}

#[test]
fn forwarding_chains_collapse_at_level_one() {
    let mut program = forwarding_chain();
    sluice_core::optimize(&mut program, 1);

    let handler = program.handler("main").unwrap();
    assert!(
        handler.blocks.len() <= 2,
        "chain did not collapse: {} blocks remain",
        handler.blocks.len()
    );
    // control still reaches the return
    let reachable_ret = handler
        .blocks
        .iter()
        .any(|b| matches!(b.term, Some(Terminator::Ret { .. })));
    assert!(reachable_ret);
}

#[test]
fn optimizing_twice_is_idempotent() {
    let mut program = forwarding_chain();
    sluice_core::optimize(&mut program, 1);
    let settled = program.handlers.clone();
    sluice_core::optimize(&mut program, 1);
    assert_eq!(program.handlers, settled);
}

#[test]
fn each_pass_reports_no_change_on_its_own_fixpoint() {
    let passes: Vec<Box<dyn Pass>> = vec![
        Box::new(UnusedBlockPass),
        Box::new(MergeBlockPass),
        Box::new(EmptyBlockElimination),
        Box::new(InstructionElimination),
    ];
    for mut pass in passes {
        let mut program = forwarding_chain();
        // run to this pass's own fixpoint
        while pass.run(&mut program.handlers[0]) {}
        let settled = program.handlers[0].clone();
        assert!(!pass.run(&mut program.handlers[0]), "{} is not idempotent", pass.name());
        assert_eq!(program.handlers[0], settled);
    }
}

#[test]
fn unreachable_blocks_are_removed() {
    let mut builder = Builder::new();
    builder.start_handler("main");
    let entry = builder.create_block("entry");
    let island = builder.create_block("island");
    builder.set_insert_point(entry);
    builder.create_ret(false);
    builder.set_insert_point(island);
    builder.create_ret(true);
    let mut program = builder.finish();

    sluice_core::optimize(&mut program, 0);
    assert_eq!(program.handlers[0].blocks.len(), 1);
}

#[test]
fn constant_expressions_fold_into_the_store() {
    let rt = common::runtime();
    let (mut ir, _) = common::lower("handler main { var x = 2 + 3 * 4; sleep x; }\n", &rt);
    sluice_core::optimize(&mut ir, 2);

    let handler = ir.handler("main").unwrap();
    let stored: Vec<&Operand> = handler
        .blocks
        .iter()
        .flat_map(|b| &b.instrs)
        .filter_map(|i| match &i.op {
            InstrOp::Store { value, .. } => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].as_const(), Some(&Constant::Number(14)));

    // no arithmetic survives
    let any_binary = handler
        .blocks
        .iter()
        .flat_map(|b| &b.instrs)
        .any(|i| matches!(i.op, InstrOp::Binary { .. }));
    assert!(!any_binary);
}

#[test]
fn constant_conditions_fold_away_the_dead_branch() {
    let rt = common::runtime();
    let source = "handler main { if 1 == 1 { echo 'live'; } else { echo 'dead'; } }\n";
    let (mut ir, _) = common::lower(source, &rt);
    sluice_core::optimize(&mut ir, 2);

    let handler = ir.handler("main").unwrap();
    let any_condbr = handler
        .blocks
        .iter()
        .any(|b| matches!(b.term, Some(Terminator::CondBr { .. })));
    assert!(!any_condbr, "constant branch must fold to an unconditional one");
}

#[test]
fn commutative_constants_canonicalize_to_the_right() {
    let rt = common::runtime();
    let (mut ir, _) = common::lower("handler main { var x = 1; var y = 2 + x; echo '' + y; }\n", &rt);
    sluice_core::optimize(&mut ir, 2);

    let handler = ir.handler("main").unwrap();
    for instr in handler.blocks.iter().flat_map(|b| &b.instrs) {
        if let InstrOp::Binary { op, lhs, rhs } = &instr.op {
            if op.is_commutative() && matches!(rhs, Operand::Value(_)) {
                assert!(
                    !matches!(lhs, Operand::Const(_)),
                    "constant left operand survived canonicalization"
                );
            }
        }
    }
}
