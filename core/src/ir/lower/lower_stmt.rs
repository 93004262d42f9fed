//! Statement lowering: control-flow construction and storage.

use crate::ast::{HandlerCallee, MatchArm, Stmt, VarDecl};
use crate::ir::Operand;
use crate::types::LiteralType;

use super::Lowerer;

impl<'a> Lowerer<'a> {
    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt) {
        if self.builder.block_terminated() {
            // unreachable statement after a terminator; nothing to emit
            return;
        }
        self.builder.set_span(Some(stmt.span().clone()));
        match stmt {
            Stmt::Expr { expr, .. } => {
                let _ = self.lower_expr(expr);
            }
            Stmt::HandlerCall { callee, args, span } => match callee {
                HandlerCallee::Builtin(signature) => {
                    if let Some(args) = self.lower_call_args(signature, args, span) {
                        self.builder.create_handler_call(signature, args);
                    }
                }
                HandlerCallee::User(name) => self.inline_user_handler(name, span),
            },
            Stmt::Compound { stmts, .. } => {
                for s in stmts {
                    self.lower_stmt(s);
                }
            }
            Stmt::Cond { cond, then, otherwise, .. } => {
                self.lower_cond(cond, then, otherwise.as_deref());
            }
            Stmt::Match { subject, class, arms, otherwise, .. } => {
                self.lower_match(subject, *class, arms, otherwise.as_deref());
            }
            Stmt::Assign { id, name, value, span } => {
                let Some((operand, ty)) = self.lower_expr(value) else {
                    return;
                };
                let Some(&slot) = self.slots.get(id) else {
                    self.type_error(span, format!("variable '{}' has no storage here", name));
                    return;
                };
                let want = self.var_types[id];
                match self.coerce(operand, ty, want) {
                    Some(operand) => self.builder.create_store(slot, operand),
                    None => self.type_error(
                        span,
                        format!("cannot assign {} to variable '{}' of type {}", ty, name, want),
                    ),
                }
            }
            Stmt::Var(decl) => self.lower_var_decl(decl),
        }
    }

    pub(crate) fn lower_var_decl(&mut self, decl: &VarDecl) {
        self.builder.set_span(Some(decl.span.clone()));
        let Some((operand, ty)) = self.lower_expr(&decl.init) else {
            return;
        };
        if ty == LiteralType::Void {
            self.type_error(&decl.span, format!("variable '{}' has no value", decl.name));
            return;
        }
        let slot = self.builder.create_alloca(ty, &decl.name);
        self.builder.create_store(slot, operand);
        self.slots.insert(decl.id, slot);
        self.var_types.insert(decl.id, ty);
    }

    fn lower_cond(&mut self, cond: &crate::ast::Expr, then: &Stmt, otherwise: Option<&Stmt>) {
        let Some((cond_op, ty)) = self.lower_expr(cond) else {
            return;
        };
        if ty != LiteralType::Boolean {
            self.type_error(cond.span(), format!("if condition must be bool, got {}", ty));
            return;
        }

        let then_block = self.builder.create_block("if.then");
        let else_block = otherwise.map(|_| self.builder.create_block("if.else"));
        let merge = self.builder.create_block("if.end");

        self.builder
            .create_cond_br(cond_op, then_block, else_block.unwrap_or(merge));

        self.builder.set_insert_point(then_block);
        self.lower_stmt(then);
        if !self.builder.block_terminated() {
            self.builder.create_br(merge);
        }

        if let (Some(block), Some(stmt)) = (else_block, otherwise) {
            self.builder.set_insert_point(block);
            self.lower_stmt(stmt);
            if !self.builder.block_terminated() {
                self.builder.create_br(merge);
            }
        }

        self.builder.set_insert_point(merge);
    }

    fn lower_match(
        &mut self,
        subject: &crate::ast::Expr,
        class: crate::vm::matcher::MatchClass,
        arms: &[MatchArm],
        otherwise: Option<&Stmt>,
    ) {
        let Some((subject_op, ty)) = self.lower_expr(subject) else {
            return;
        };
        if ty != LiteralType::String {
            self.type_error(subject.span(), format!("match subject must be string, got {}", ty));
            return;
        }

        let merge = self.builder.create_block("match.end");
        let fallback = if otherwise.is_some() {
            self.builder.create_block("match.else")
        } else {
            merge
        };

        let mut cases = Vec::with_capacity(arms.len());
        let mut arm_blocks = Vec::with_capacity(arms.len());
        for arm in arms {
            let block = self.builder.create_block("match.case");
            cases.push((arm.label.clone(), block));
            arm_blocks.push(block);
        }

        self.builder.create_match(class, subject_op, cases, fallback);

        for (arm, block) in arms.iter().zip(arm_blocks) {
            self.builder.set_insert_point(block);
            self.lower_stmt(&arm.body);
            if !self.builder.block_terminated() {
                self.builder.create_br(merge);
            }
        }

        if let Some(stmt) = otherwise {
            self.builder.set_insert_point(fallback);
            self.lower_stmt(stmt);
            if !self.builder.block_terminated() {
                self.builder.create_br(merge);
            }
        }

        self.builder.set_insert_point(merge);
    }

    fn inline_user_handler(&mut self, name: &str, span: &crate::location::Span) {
        if self.inline_stack.iter().any(|n| n == name) {
            self.type_error(span, format!("recursive invocation of handler '{}'", name));
            return;
        }
        let Some(handler) = self.unit.handler(name) else {
            self.type_error(span, format!("unknown handler '{}'", name));
            return;
        };
        self.inline_stack.push(name.to_string());
        self.lower_stmt(&handler.body);
        self.inline_stack.pop();
    }
}
