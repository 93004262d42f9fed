//! Match classes and the jump tables backing the `SMATCH*` opcodes.

use std::fmt;

use crate::vm::program::ConstantPool;

/// The matching operator kind of a `match` arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchClass {
    /// `==` — exact comparison.
    Same,
    /// `=^` — prefix comparison.
    Head,
    /// `=$` — suffix comparison.
    Tail,
    /// `=~` — regular expression.
    RegExp,
}

impl fmt::Display for MatchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchClass::Same => "same",
            MatchClass::Head => "head",
            MatchClass::Tail => "tail",
            MatchClass::RegExp => "regex",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCase {
    /// Index of the label in the pool (string table, or regex table for
    /// `MatchClass::RegExp`).
    pub value: usize,
    /// Program counter of the arm's block; patched after emission.
    pub pc: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDef {
    pub handler_id: usize,
    pub class: MatchClass,
    pub cases: Vec<MatchCase>,
    pub else_pc: usize,
}

impl MatchDef {
    /// Resolves `subject` against the cases, returning the target program
    /// counter; no matching case falls through to the else target.
    pub fn resolve(&self, subject: &str, pool: &ConstantPool) -> usize {
        match self.class {
            MatchClass::Same => {
                for case in &self.cases {
                    if pool.string(case.value) == subject {
                        return case.pc;
                    }
                }
            }
            MatchClass::Head => {
                for case in &self.cases {
                    if subject.starts_with(pool.string(case.value)) {
                        return case.pc;
                    }
                }
            }
            MatchClass::Tail => {
                for case in &self.cases {
                    if subject.ends_with(pool.string(case.value)) {
                        return case.pc;
                    }
                }
            }
            MatchClass::RegExp => {
                for case in &self.cases {
                    if pool.regex(case.value).is_match(subject) {
                        return case.pc;
                    }
                }
            }
        }
        self.else_pc
    }
}
