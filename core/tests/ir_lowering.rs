mod common;

use sluice_core::diagnostics::MessageKind;
use sluice_core::ir::{InstrOp, Terminator};

#[test]
fn every_block_ends_in_exactly_one_terminator() {
    let rt = common::runtime();
    let source = "handler main {\n  if req.path =^ '/a' { echo 'a'; } else { echo 'b'; }\n  match req.path on {\n    '/x' => echo 'x';\n    else => echo 'rest';\n  }\n}\n";
    let (ir, report) = common::lower(source, &rt);
    assert!(!report.has_errors(), "unexpected diagnostics: {}", report);

    let handler = ir.handler("main").expect("main was lowered");
    assert!(handler.blocks.len() >= 6);
    for block in &handler.blocks {
        assert!(block.term.is_some(), "block '{}' is unterminated", block.name);
    }
}

#[test]
fn values_are_defined_before_use_in_block_order() {
    let rt = common::runtime();
    let (ir, _) = common::lower(
        "handler main { var x = sum(1, 2); if x == 3 { echo 'three'; } }\n",
        &rt,
    );
    let handler = ir.handler("main").unwrap();

    let mut defined = vec![false; handler.values.len()];
    for block in &handler.blocks {
        for instr in &block.instrs {
            for operand in instr.op.operands() {
                if let Some(id) = operand.as_value() {
                    assert!(defined[id.0 as usize], "use of {} before definition", id);
                }
            }
            if let Some(id) = instr.value {
                defined[id.0 as usize] = true;
            }
        }
    }
}

#[test]
fn conditionals_lower_to_cond_br_with_merge() {
    let rt = common::runtime();
    let (ir, _) = common::lower("handler main { if req.path =^ '/' { echo 'y'; } }\n", &rt);
    let handler = ir.handler("main").unwrap();

    let entry = handler.block(handler.entry());
    let Some(Terminator::CondBr { on_true, on_false, .. }) = &entry.term else {
        panic!("entry must end in a conditional branch");
    };
    assert_ne!(on_true, on_false);
    // the then-branch flows into the merge block
    let Some(Terminator::Br(merge)) = &handler.block(*on_true).term else {
        panic!("then-block must branch to the merge block");
    };
    assert_eq!(merge, on_false);
}

#[test]
fn match_statements_lower_to_match_terminators() {
    let rt = common::runtime();
    let source = "handler main {\n  match req.path on {\n    =^ '/api' => echo 'api';\n    =^ '/doc' => echo 'doc';\n    else => echo 'other';\n  }\n}\n";
    let (ir, _) = common::lower(source, &rt);
    let handler = ir.handler("main").unwrap();

    let entry = handler.block(handler.entry());
    let Some(Terminator::Match { cases, fallback, .. }) = &entry.term else {
        panic!("entry must end in a match terminator");
    };
    assert_eq!(cases.len(), 2);
    assert!(!cases.iter().any(|(_, block)| block == fallback));
}

#[test]
fn assignments_lower_to_alloca_store_load() {
    let rt = common::runtime();
    let (ir, _) = common::lower("handler main { var x = 1; x = 2; echo 'x' + x; }\n", &rt);
    let handler = ir.handler("main").unwrap();

    let ops: Vec<&InstrOp> = handler
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter().map(|i| &i.op))
        .collect();
    assert!(ops.iter().any(|op| matches!(op, InstrOp::Alloca)));
    assert_eq!(ops.iter().filter(|op| matches!(op, InstrOp::Store { .. })).count(), 2);
    assert!(ops.iter().any(|op| matches!(op, InstrOp::Load { .. })));
    // 'x' + x coerces the number to a string through an explicit cast
    assert!(ops
        .iter()
        .any(|op| matches!(op, InstrOp::Cast { to, .. } if *to == sluice_core::LiteralType::String)));
}

#[test]
fn user_handler_calls_are_inlined() {
    let rt = common::runtime();
    let source = "handler helper { echo 'from helper'; }\nhandler main { helper; }\n";
    let (ir, _) = common::lower(source, &rt);
    let handler = ir.handler("main").unwrap();

    let has_echo_call = handler.blocks.iter().any(|b| {
        b.instrs.iter().any(|i| {
            matches!(&i.op, InstrOp::Call { callee, .. } if ir.functions[*callee].name == "echo")
        })
    });
    assert!(has_echo_call, "helper body must be inlined into main");
}

#[test]
fn recursive_handler_invocations_are_rejected() {
    let rt = common::runtime();
    let mut report = sluice_core::Report::new();
    let source = "handler a { b; }\nhandler b { a; }\nhandler main { a; }\n";
    let unit = sluice_core::parse(source, "test.sl", &rt, &mut report).expect("parse failed");
    let result = sluice_core::lower(&unit, &["main"], &mut report);
    assert!(result.is_none());
    assert!(report.count_of(MessageKind::TypeError) >= 1);
}

#[test]
fn type_mismatches_are_reported_at_the_expression() {
    let rt = common::runtime();
    let mut report = sluice_core::Report::new();
    let unit = sluice_core::parse(
        "handler main { var x = 1 + 'two' * 3; }\n",
        "test.sl",
        &rt,
        &mut report,
    )
    .expect("parse failed");
    let result = sluice_core::lower(&unit, &["main"], &mut report);
    assert!(result.is_none());
    assert_eq!(report.count_of(MessageKind::TypeError), 1);
}

#[test]
fn unit_vars_materialize_only_in_handlers_that_use_them() {
    let rt = common::runtime();
    let source = "var shared = 'value';\nhandler main { echo shared; }\nhandler other { echo 'none'; }\n";
    let (ir, _) = common::lower(source, &rt);

    let main = ir.handler("main").unwrap();
    let other = ir.handler("other").unwrap();
    let count = |h: &sluice_core::ir::IrHandler| {
        h.blocks
            .iter()
            .flat_map(|b| &b.instrs)
            .filter(|i| matches!(i.op, InstrOp::Alloca))
            .count()
    };
    assert_eq!(count(main), 1);
    assert_eq!(count(other), 0);
}
