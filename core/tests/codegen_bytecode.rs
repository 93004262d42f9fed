mod common;

use std::collections::HashMap;

use sluice_core::vm::{Instruction, Opcode};

const SOURCE: &str = "\
var prefix = '/static';
handler main {
  var hits = sum(1, 2);
  if req.path =^ prefix {
    echo 'static: ' + req.path;
  } else {
    match req.path on {
      '/a' => echo 'a';
      '/b' => echo 'b';
      else => echo 'rest ' + hits;
    }
  }
}
";

#[test]
fn codegen_is_deterministic() {
    let rt = common::runtime();
    let (first, _) = common::compile(SOURCE, &rt, 2);
    let (second, _) = common::compile(SOURCE, &rt, 2);

    let a = first.pool();
    let b = second.pool();
    assert_eq!(a.handlers().len(), b.handlers().len());
    for ((name_a, code_a), (name_b, code_b)) in a.handlers().iter().zip(b.handlers()) {
        assert_eq!(name_a, name_b);
        let words_a: Vec<u64> = code_a.iter().map(|i| i.0).collect();
        let words_b: Vec<u64> = code_b.iter().map(|i| i.0).collect();
        assert_eq!(words_a, words_b);
    }
}

#[test]
fn jump_targets_stay_inside_the_handler() {
    let rt = common::runtime();
    let (program, _) = common::compile(SOURCE, &rt, 1);
    for (_, code) in program.pool().handlers() {
        for instruction in code {
            match instruction.opcode().expect("decodable opcode") {
                Opcode::Jmp | Opcode::Jz | Opcode::Jn => {
                    assert!((instruction.a() as usize) < code.len());
                }
                Opcode::SMatchEq | Opcode::SMatchBeg | Opcode::SMatchEnd | Opcode::SMatchR => {
                    let def = program.pool().match_def(instruction.a() as usize);
                    for case in &def.cases {
                        assert!(case.pc < code.len());
                    }
                    assert!(def.else_pc < code.len());
                }
                _ => {}
            }
        }
    }
}

#[test]
fn no_phi_and_no_undecodable_words_reach_bytecode() {
    let rt = common::runtime();
    let (program, _) = common::compile(SOURCE, &rt, 2);
    for (_, code) in program.pool().handlers() {
        for instruction in code {
            assert!(instruction.opcode().is_some(), "undecodable word {:016x}", instruction.0);
        }
    }
}

/// Stack effect of one instruction; `None` for terminators.
fn stack_effect(program: &sluice_core::Program, i: Instruction) -> Option<i64> {
    use Opcode::*;
    let a = i.a() as i64;
    Some(match i.opcode().unwrap() {
        Nop => 0,
        ILoad | NLoad | SLoad | PLoad | CLoad | RLoad | ITLoad | STLoad | PTLoad | CTLoad
        | Load => 1,
        Store => -1,
        Alloca => a.max(1),
        Discard => -(a.max(1)),
        NAdd | NSub | NMul | NDiv | NRem | NPow | NAnd | NOr | NXor | NShl | NShr | NCmpEq
        | NCmpNe | NCmpLe | NCmpGe | NCmpLt | NCmpGt | BAnd | BOr | BXor | SAdd | SSubStr
        | SCmpEq | SCmpNe | SCmpLe | SCmpGe | SCmpLt | SCmpGt | SContains | SCmpBeg | SCmpEnd
        | PCmpEq | PCmpNe | PInCidr => -1,
        NNeg | NNot | BNot | SLen | SIsEmpty | SRegMatch | N2S | P2S | C2S | R2S | S2N => 0,
        Jz | Jn => -1,
        Jmp | Exit | SMatchEq | SMatchBeg | SMatchEnd | SMatchR => return None,
        Call => {
            let _ = program;
            -(i.b() as i64) + (i.c() != 0) as i64
        }
        Handler => -(i.b() as i64),
    })
}

/// Abstract interpretation of one handler: every PC must be reached with
/// one single stack depth, and every EXIT must see exactly the alloca'd
/// locals.
#[test]
fn stack_depth_is_deterministic_at_every_pc() {
    let rt = common::runtime();
    let (program, _) = common::compile(SOURCE, &rt, 2);

    for (name, code) in program.pool().handlers() {
        let locals: i64 = code
            .iter()
            .filter(|i| i.opcode() == Some(Opcode::Alloca))
            .map(|i| (i.a() as i64).max(1))
            .sum();

        let mut depth_at: HashMap<usize, i64> = HashMap::new();
        let mut work = vec![(0usize, 0i64)];
        while let Some((pc, depth)) = work.pop() {
            if let Some(&seen) = depth_at.get(&pc) {
                assert_eq!(seen, depth, "handler '{}': pc {} reached at depths {} and {}", name, pc, seen, depth);
                continue;
            }
            depth_at.insert(pc, depth);
            if pc >= code.len() {
                continue;
            }
            let instruction = code[pc];
            let opcode = instruction.opcode().unwrap();
            match opcode {
                Opcode::Jmp => work.push((instruction.a() as usize, depth)),
                Opcode::Exit => {
                    assert_eq!(
                        depth, locals,
                        "handler '{}': EXIT at pc {} with {} extra entries",
                        name, pc, depth - locals
                    );
                }
                Opcode::SMatchEq | Opcode::SMatchBeg | Opcode::SMatchEnd | Opcode::SMatchR => {
                    let next = depth - 1;
                    let def = program.pool().match_def(instruction.a() as usize);
                    for case in &def.cases {
                        work.push((case.pc, next));
                    }
                    work.push((def.else_pc, next));
                }
                Opcode::Jz | Opcode::Jn => {
                    work.push((pc + 1, depth - 1));
                    work.push((instruction.a() as usize, depth - 1));
                }
                _ => {
                    let effect = stack_effect(&program, instruction).unwrap();
                    work.push((pc + 1, depth + effect));
                }
            }
        }
    }
}
