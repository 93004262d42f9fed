use crate::ast::{Expr, VarDecl, VarId};
use crate::location::Span;
use crate::types::{Constant, Signature};
use crate::vm::matcher::MatchClass;

/// Target of a handler invocation statement: either a builtin handler from
/// the runtime registry or another handler of the same unit.
#[derive(Debug, Clone)]
pub enum HandlerCallee {
    Builtin(Signature),
    User(String),
}

impl HandlerCallee {
    pub fn name(&self) -> &str {
        match self {
            HandlerCallee::Builtin(sig) => &sig.name,
            HandlerCallee::User(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub label: Constant,
    pub body: Stmt,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// A builtin function call in statement position; the result is
    /// discarded.
    Expr {
        expr: Expr,
        span: Span,
    },
    /// Invocation of a builtin or user-defined handler.
    HandlerCall {
        callee: HandlerCallee,
        args: Vec<Expr>,
        span: Span,
    },
    Compound {
        stmts: Vec<Stmt>,
        span: Span,
    },
    Cond {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
        span: Span,
    },
    Match {
        subject: Expr,
        class: MatchClass,
        arms: Vec<MatchArm>,
        otherwise: Option<Box<Stmt>>,
        span: Span,
    },
    Assign {
        id: VarId,
        name: String,
        value: Expr,
        span: Span,
    },
    Var(VarDecl),
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Expr { span, .. }
            | Stmt::HandlerCall { span, .. }
            | Stmt::Compound { span, .. }
            | Stmt::Cond { span, .. }
            | Stmt::Match { span, .. }
            | Stmt::Assign { span, .. } => span,
            Stmt::Var(decl) => &decl.span,
        }
    }
}
