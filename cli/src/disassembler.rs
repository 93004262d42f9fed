//! file: cli/src/disassembler.rs
//! description: human-readable listing of a compiled program.

use sluice_core::vm::{Opcode, Program};

/// Renders every handler's code with pool references resolved inline.
pub fn disassemble(program: &Program) -> String {
    let pool = program.pool();
    let mut out = String::new();

    out.push_str(&format!(
        "; {} handler(s), {} function ref(s), {} handler ref(s)\n",
        pool.handlers().len(),
        pool.native_functions().len(),
        pool.native_handlers().len()
    ));
    if !pool.modules().is_empty() {
        out.push_str(&format!("; modules: {}\n", pool.modules().join(", ")));
    }

    for (id, (name, code)) in pool.handlers().iter().enumerate() {
        out.push_str(&format!("\nhandler #{} '{}':\n", id, name));
        for (pc, instruction) in code.iter().enumerate() {
            let Some(opcode) = instruction.opcode() else {
                out.push_str(&format!("  {:4}  ???(0x{:016x})\n", pc, instruction.0));
                continue;
            };
            let a = instruction.a() as usize;
            let line = match opcode {
                Opcode::ILoad | Opcode::Alloca | Opcode::Discard | Opcode::Load
                | Opcode::Store | Opcode::Exit => {
                    format!("{} {}", opcode.mnemonic(), a)
                }
                Opcode::NLoad => format!("{} {} ; {}", opcode.mnemonic(), a, pool.number(a)),
                Opcode::SLoad => {
                    format!("{} {} ; {:?}", opcode.mnemonic(), a, pool.string(a))
                }
                Opcode::RLoad | Opcode::SRegMatch => {
                    format!("{} {} ; /{}/", opcode.mnemonic(), a, pool.regex_pattern(a))
                }
                Opcode::PLoad => format!("{} {} ; {}", opcode.mnemonic(), a, pool.ipaddr(a)),
                Opcode::CLoad => format!("{} {} ; {}", opcode.mnemonic(), a, pool.cidr(a)),
                Opcode::ITLoad | Opcode::STLoad | Opcode::PTLoad | Opcode::CTLoad => {
                    format!("{} {}", opcode.mnemonic(), a)
                }
                Opcode::Jmp | Opcode::Jz | Opcode::Jn => {
                    format!("{} -> {}", opcode.mnemonic(), a)
                }
                Opcode::SMatchEq | Opcode::SMatchBeg | Opcode::SMatchEnd | Opcode::SMatchR => {
                    let def = pool.match_def(a);
                    let cases: Vec<String> = def
                        .cases
                        .iter()
                        .map(|c| format!("{} -> {}", c.value, c.pc))
                        .collect();
                    format!(
                        "{} {} ; [{}] else -> {}",
                        opcode.mnemonic(),
                        a,
                        cases.join(", "),
                        def.else_pc
                    )
                }
                Opcode::Call => format!(
                    "{} {}, {}, {} ; {}",
                    opcode.mnemonic(),
                    a,
                    instruction.b(),
                    instruction.c(),
                    pool.native_functions()[a].signature
                ),
                Opcode::Handler => format!(
                    "{} {}, {} ; {}",
                    opcode.mnemonic(),
                    a,
                    instruction.b(),
                    pool.native_handlers()[a].signature
                ),
                _ => opcode.mnemonic().to_string(),
            };
            out.push_str(&format!("  {:4}  {}\n", pc, line));
        }
    }
    out
}
