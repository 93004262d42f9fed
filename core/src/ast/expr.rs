use crate::ast::VarId;
use crate::location::Span;
use crate::types::{Constant, Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Numeric negation `-`.
    Neg,
    /// Logical negation `!` / `not`.
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    /// `=~` — regex match.
    RegexMatch,
    /// `=^` — prefix match.
    PrefixMatch,
    /// `=$` — suffix match.
    SuffixMatch,
    /// `in` — substring or CIDR containment.
    In,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::RegexMatch => "=~",
            BinaryOp::PrefixMatch => "=^",
            BinaryOp::SuffixMatch => "=$",
            BinaryOp::In => "in",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "xor",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Le
                | BinaryOp::Ge
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::RegexMatch
                | BinaryOp::PrefixMatch
                | BinaryOp::SuffixMatch
                | BinaryOp::In
        )
    }
}

/// Resolved target of a builtin function call; the parser fills in the full
/// signature from the runtime registry.
#[derive(Debug, Clone)]
pub struct Callee {
    pub signature: Signature,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal {
        value: Constant,
        span: Span,
    },
    Array {
        elements: Vec<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    /// Builtin function call; arguments are positional and complete (named
    /// arguments and defaults are resolved by the parser).
    Call {
        callee: Callee,
        args: Vec<Expr>,
        span: Span,
    },
    VarRef {
        id: VarId,
        name: String,
        span: Span,
    },
    HandlerRef {
        name: String,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Array { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Call { span, .. }
            | Expr::VarRef { span, .. }
            | Expr::HandlerRef { span, .. } => span,
        }
    }

    /// The literal constant of this expression, if it is one.
    pub fn as_literal(&self) -> Option<&Constant> {
        match self {
            Expr::Literal { value, .. } => Some(value),
            _ => None,
        }
    }
}
