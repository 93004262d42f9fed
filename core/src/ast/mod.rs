//! Abstract syntax tree for Sluice units.
//!
//! Nodes are plain tagged enums dispatched with `match`; every node carries
//! the source span it was parsed from.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Callee, Expr, UnaryOp};
pub use stmt::{HandlerCallee, MatchArm, Stmt};

use crate::location::Span;
use crate::types::LiteralType;

/// Identity of a `var` declaration; assigned by the parser, unique within a
/// unit, and used to tie references back to their storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub id: VarId,
    pub name: String,
    pub ty: LiteralType,
    pub init: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Handler {
    pub name: String,
    pub body: Stmt,
    pub span: Span,
}

/// A parsed source file: imported modules, unit-scope variables and
/// handlers.
#[derive(Debug, Clone, Default)]
pub struct Unit {
    pub file: String,
    pub modules: Vec<String>,
    pub vars: Vec<VarDecl>,
    pub handlers: Vec<Handler>,
}

impl Unit {
    pub fn handler(&self, name: &str) -> Option<&Handler> {
        self.handlers.iter().find(|h| h.name == name)
    }

    pub fn var(&self, id: VarId) -> Option<&VarDecl> {
        self.vars.iter().find(|v| v.id == id)
    }
}

/// Collects the `VarId`s of all unit-scope variables referenced from `stmt`,
/// directly or through expressions.
pub fn collect_var_refs(stmt: &Stmt, out: &mut Vec<VarId>) {
    fn walk_expr(expr: &Expr, out: &mut Vec<VarId>) {
        match expr {
            Expr::Literal { .. } | Expr::HandlerRef { .. } => {}
            Expr::Array { elements, .. } => {
                for e in elements {
                    walk_expr(e, out);
                }
            }
            Expr::Unary { operand, .. } => walk_expr(operand, out),
            Expr::Binary { lhs, rhs, .. } => {
                walk_expr(lhs, out);
                walk_expr(rhs, out);
            }
            Expr::Call { args, .. } => {
                for a in args {
                    walk_expr(a, out);
                }
            }
            Expr::VarRef { id, .. } => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        }
    }

    match stmt {
        Stmt::Expr { expr, .. } => walk_expr(expr, out),
        Stmt::HandlerCall { args, .. } => {
            for a in args {
                walk_expr(a, out);
            }
        }
        Stmt::Compound { stmts, .. } => {
            for s in stmts {
                collect_var_refs(s, out);
            }
        }
        Stmt::Cond { cond, then, otherwise, .. } => {
            walk_expr(cond, out);
            collect_var_refs(then, out);
            if let Some(e) = otherwise {
                collect_var_refs(e, out);
            }
        }
        Stmt::Match { subject, arms, otherwise, .. } => {
            walk_expr(subject, out);
            for arm in arms {
                collect_var_refs(&arm.body, out);
            }
            if let Some(e) = otherwise {
                collect_var_refs(e, out);
            }
        }
        Stmt::Assign { id, value, .. } => {
            walk_expr(value, out);
            if !out.contains(id) {
                out.push(*id);
            }
        }
        Stmt::Var(decl) => walk_expr(&decl.init, out),
    }
}
