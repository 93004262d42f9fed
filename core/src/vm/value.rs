//! file: core/src/vm/value.rs
//! description: runtime `Value` representation used by the VM.
//!
//! Stack slots and native-call arguments are tagged values over the same
//! kinds as the literal types. Pool-backed data (strings, arrays) is cloned
//! out of the constant pool on load, so the program stays freely shareable
//! across runners.

use std::net::IpAddr;

use crate::types::{Cidr, Constant, LiteralType};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Default content of a freshly allocated stack slot.
    Void,
    Bool(bool),
    Number(i64),
    Str(String),
    IP(IpAddr),
    Cidr(Cidr),
    /// Index into the constant pool's regex table.
    Regex(usize),
    /// Index into the program's handler table.
    Handler(usize),
    NumberArray(Vec<i64>),
    StringArray(Vec<String>),
    IPAddressArray(Vec<IpAddr>),
    CidrArray(Vec<Cidr>),
}

impl Value {
    pub fn ty(&self) -> LiteralType {
        match self {
            Value::Void => LiteralType::Void,
            Value::Bool(_) => LiteralType::Boolean,
            Value::Number(_) => LiteralType::Number,
            Value::Str(_) => LiteralType::String,
            Value::IP(_) => LiteralType::IPAddress,
            Value::Cidr(_) => LiteralType::Cidr,
            Value::Regex(_) => LiteralType::RegExp,
            Value::Handler(_) => LiteralType::Handler,
            Value::NumberArray(_) => LiteralType::NumberArray,
            Value::StringArray(_) => LiteralType::StringArray,
            Value::IPAddressArray(_) => LiteralType::IPAddressArray,
            Value::CidrArray(_) => LiteralType::CidrArray,
        }
    }

    /// Truthiness as used by conditional jumps and handler results.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Void => false,
            _ => true,
        }
    }

    pub fn as_number(&self) -> i64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(true) => 1,
            _ => 0,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<IpAddr> for Value {
    fn from(v: IpAddr) -> Self {
        Value::IP(v)
    }
}
impl From<Cidr> for Value {
    fn from(v: Cidr) -> Self {
        Value::Cidr(v)
    }
}

impl From<&Constant> for Value {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Number(n) => Value::Number(*n),
            Constant::Str(s) => Value::Str(s.clone()),
            // Regex and handler constants are pool references at run time;
            // they are materialized by the loader opcodes instead.
            Constant::Regex(_) => Value::Void,
            Constant::Handler(_) => Value::Void,
            Constant::IP(ip) => Value::IP(*ip),
            Constant::Cidr(c) => Value::Cidr(*c),
            Constant::NumberArray(a) => Value::NumberArray(a.clone()),
            Constant::StringArray(a) => Value::StringArray(a.clone()),
            Constant::IPAddressArray(a) => Value::IPAddressArray(a.clone()),
            Constant::CidrArray(a) => Value::CidrArray(a.clone()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => write!(f, "(void)"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::IP(ip) => write!(f, "{}", ip),
            Value::Cidr(c) => write!(f, "{}", c),
            Value::Regex(id) => write!(f, "regex#{}", id),
            Value::Handler(id) => write!(f, "handler#{}", id),
            Value::NumberArray(a) => write!(f, "{:?}", a),
            Value::StringArray(a) => write!(f, "{:?}", a),
            Value::IPAddressArray(a) => write!(f, "{:?}", a),
            Value::CidrArray(a) => {
                let items: Vec<String> = a.iter().map(|c| c.to_string()).collect();
                write!(f, "{:?}", items)
            }
        }
    }
}
