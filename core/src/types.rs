//! Closed set of value kinds shared by the front-end, the IR and the VM,
//! plus typed signatures for natives and typed constant values.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Type of a Sluice value. `Void` is only valid as a return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralType {
    Void,
    Boolean,
    Number,
    String,
    RegExp,
    IPAddress,
    Cidr,
    Handler,
    NumberArray,
    StringArray,
    IPAddressArray,
    CidrArray,
}

impl LiteralType {
    /// The array type holding elements of `self`, if there is one.
    pub fn array_of(self) -> Option<LiteralType> {
        match self {
            LiteralType::Number => Some(LiteralType::NumberArray),
            LiteralType::String => Some(LiteralType::StringArray),
            LiteralType::IPAddress => Some(LiteralType::IPAddressArray),
            LiteralType::Cidr => Some(LiteralType::CidrArray),
            _ => None,
        }
    }

    /// The element type of an array type.
    pub fn element(self) -> Option<LiteralType> {
        match self {
            LiteralType::NumberArray => Some(LiteralType::Number),
            LiteralType::StringArray => Some(LiteralType::String),
            LiteralType::IPAddressArray => Some(LiteralType::IPAddress),
            LiteralType::CidrArray => Some(LiteralType::Cidr),
            _ => None,
        }
    }

    pub fn is_array(self) -> bool {
        self.element().is_some()
    }
}

impl fmt::Display for LiteralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LiteralType::Void => "void",
            LiteralType::Boolean => "bool",
            LiteralType::Number => "number",
            LiteralType::String => "string",
            LiteralType::RegExp => "regex",
            LiteralType::IPAddress => "ip",
            LiteralType::Cidr => "cidr",
            LiteralType::Handler => "handler",
            LiteralType::NumberArray => "number[]",
            LiteralType::StringArray => "string[]",
            LiteralType::IPAddressArray => "ip[]",
            LiteralType::CidrArray => "cidr[]",
        };
        write!(f, "{}", s)
    }
}

/// An IP network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl Cidr {
    pub fn new(addr: IpAddr, prefix: u8) -> Self {
        Cidr { addr, prefix }
    }

    /// Whether `ip` falls inside this network. An address-family mismatch is
    /// never contained.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(host)) => {
                let bits = u32::from(self.prefix.min(32));
                let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
                (u32::from_be_bytes(net.octets()) & mask)
                    == (u32::from_be_bytes(host.octets()) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(host)) => {
                let bits = u32::from(self.prefix.min(128));
                let mask = if bits == 0 { 0 } else { u128::MAX << (128 - bits) };
                (u128::from_be_bytes(net.octets()) & mask)
                    == (u128::from_be_bytes(host.octets()) & mask)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("'{}' is not in CIDR notation", s))?;
        let addr: IpAddr = addr.parse().map_err(|e| format!("{}", e))?;
        let prefix: u8 = prefix.parse().map_err(|e| format!("{}", e))?;
        let limit = if addr.is_ipv4() { 32 } else { 128 };
        if prefix > limit {
            return Err(format!("prefix length {} exceeds {}", prefix, limit));
        }
        Ok(Cidr { addr, prefix })
    }
}

/// A literal-constructible constant value. Constants appear as literal
/// operands in the IR and are interned into the bytecode constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Bool(bool),
    Number(i64),
    Str(String),
    /// The regex source pattern; compilation happens when the constant pool
    /// is built.
    Regex(String),
    IP(IpAddr),
    Cidr(Cidr),
    /// A reference to a unit handler by name; resolved to a handler table
    /// index when bytecode is emitted.
    Handler(String),
    NumberArray(Vec<i64>),
    StringArray(Vec<String>),
    IPAddressArray(Vec<IpAddr>),
    CidrArray(Vec<Cidr>),
}

impl Constant {
    pub fn ty(&self) -> LiteralType {
        match self {
            Constant::Bool(_) => LiteralType::Boolean,
            Constant::Number(_) => LiteralType::Number,
            Constant::Str(_) => LiteralType::String,
            Constant::Regex(_) => LiteralType::RegExp,
            Constant::IP(_) => LiteralType::IPAddress,
            Constant::Cidr(_) => LiteralType::Cidr,
            Constant::Handler(_) => LiteralType::Handler,
            Constant::NumberArray(_) => LiteralType::NumberArray,
            Constant::StringArray(_) => LiteralType::StringArray,
            Constant::IPAddressArray(_) => LiteralType::IPAddressArray,
            Constant::CidrArray(_) => LiteralType::CidrArray,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Constant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Constant::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            write!(f, "]")
        }
        match self {
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Number(n) => write!(f, "{}", n),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Regex(p) => write!(f, "/{}/", p),
            Constant::IP(ip) => write!(f, "{}", ip),
            Constant::Cidr(c) => write!(f, "{}", c),
            Constant::Handler(name) => write!(f, "&{}", name),
            Constant::NumberArray(a) => list(f, a),
            Constant::StringArray(a) => list(f, a),
            Constant::IPAddressArray(a) => list(f, a),
            Constant::CidrArray(a) => list(f, a),
        }
    }
}

impl From<bool> for Constant {
    fn from(v: bool) -> Self {
        Constant::Bool(v)
    }
}
impl From<i64> for Constant {
    fn from(v: i64) -> Self {
        Constant::Number(v)
    }
}
impl From<&str> for Constant {
    fn from(v: &str) -> Self {
        Constant::Str(v.to_string())
    }
}
impl From<String> for Constant {
    fn from(v: String) -> Self {
        Constant::Str(v)
    }
}
impl From<IpAddr> for Constant {
    fn from(v: IpAddr) -> Self {
        Constant::IP(v)
    }
}
impl From<Cidr> for Constant {
    fn from(v: Cidr) -> Self {
        Constant::Cidr(v)
    }
}

/// The typed interface of a native: name, return type and ordered parameter
/// types. Equality is structural; parameter names and defaults live on the
/// registered callback, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub name: String,
    pub return_type: LiteralType,
    pub params: Vec<LiteralType>,
}

impl Signature {
    pub fn new(name: impl Into<String>, return_type: LiteralType) -> Self {
        Signature { name: name.into(), return_type, params: Vec::new() }
    }

    pub fn with_params(mut self, params: Vec<LiteralType>) -> Self {
        self.params = params;
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}
