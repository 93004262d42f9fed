//! Expression lowering with bottom-up type inference.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::ir::{BinaryAluOp, Operand, UnaryAluOp};
use crate::location::Span;
use crate::types::{Constant, LiteralType, Signature};

use super::Lowerer;

impl<'a> Lowerer<'a> {
    /// Lowers an expression, returning its operand and inferred type, or
    /// `None` after reporting a type error.
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> Option<(Operand, LiteralType)> {
        match expr {
            Expr::Literal { value, .. } => {
                let ty = value.ty();
                Some((Operand::Const(value.clone()), ty))
            }
            Expr::Array { elements, span } => self.lower_array(elements, span),
            Expr::Unary { op, operand, span } => self.lower_unary(*op, operand, span),
            Expr::Binary { op, lhs, rhs, span } => self.lower_binary(*op, lhs, rhs, span),
            Expr::Call { callee, args, span } => {
                let signature = callee.signature.clone();
                let args = self.lower_call_args(&signature, args, span)?;
                match self.builder.create_call(&signature, args) {
                    Some(id) => Some((Operand::Value(id), signature.return_type)),
                    None => Some((
                        Operand::Const(Constant::Bool(false)),
                        LiteralType::Void,
                    )),
                }
            }
            Expr::VarRef { id, name, span } => match self.slots.get(id) {
                Some(&slot) => {
                    let ty = self.var_types[id];
                    let value = self.builder.create_load(slot);
                    Some((Operand::Value(value), ty))
                }
                None => {
                    self.type_error(span, format!("variable '{}' is not initialized here", name));
                    None
                }
            },
            Expr::HandlerRef { name, span } => {
                if self.unit.handler(name).is_none() {
                    self.type_error(span, format!("unknown handler '{}'", name));
                    return None;
                }
                Some((
                    Operand::Const(Constant::Handler(name.clone())),
                    LiteralType::Handler,
                ))
            }
        }
    }

    /// Lowers and type-checks the arguments of a builtin call against its
    /// signature.
    pub(crate) fn lower_call_args(
        &mut self,
        signature: &Signature,
        args: &[Expr],
        span: &Span,
    ) -> Option<Vec<Operand>> {
        if args.len() != signature.params.len() {
            self.type_error(
                span,
                format!(
                    "'{}' takes {} argument(s) but {} were given",
                    signature.name,
                    signature.params.len(),
                    args.len()
                ),
            );
            return None;
        }
        let mut lowered = Vec::with_capacity(args.len());
        for (index, (arg, &want)) in args.iter().zip(&signature.params).enumerate() {
            let (operand, ty) = self.lower_expr(arg)?;
            match self.coerce(operand, ty, want) {
                Some(operand) => lowered.push(operand),
                None => {
                    self.type_error(
                        arg.span(),
                        format!(
                            "argument {} of '{}' expects {}, got {}",
                            index + 1,
                            signature.name,
                            want,
                            ty
                        ),
                    );
                    return None;
                }
            }
        }
        Some(lowered)
    }

    fn lower_array(&mut self, elements: &[Expr], span: &Span) -> Option<(Operand, LiteralType)> {
        let mut literals = Vec::with_capacity(elements.len());
        for element in elements {
            match element.as_literal() {
                Some(c) => literals.push(c.clone()),
                None => {
                    self.type_error(element.span(), "array elements must be literals");
                    return None;
                }
            }
        }
        let elem_ty = match literals.first() {
            Some(c) => c.ty(),
            None => {
                self.type_error(span, "empty arrays have no type");
                return None;
            }
        };
        if let Some(bad) = literals.iter().find(|c| c.ty() != elem_ty) {
            self.type_error(
                span,
                format!("array mixes {} and {} elements", elem_ty, bad.ty()),
            );
            return None;
        }
        let constant = match elem_ty {
            LiteralType::Number => Constant::NumberArray(
                literals.iter().map(|c| c.as_number().unwrap()).collect(),
            ),
            LiteralType::String => Constant::StringArray(
                literals.iter().map(|c| c.as_str().unwrap().to_string()).collect(),
            ),
            LiteralType::IPAddress => Constant::IPAddressArray(
                literals
                    .iter()
                    .map(|c| match c {
                        Constant::IP(ip) => *ip,
                        _ => unreachable!(),
                    })
                    .collect(),
            ),
            LiteralType::Cidr => Constant::CidrArray(
                literals
                    .iter()
                    .map(|c| match c {
                        Constant::Cidr(cidr) => *cidr,
                        _ => unreachable!(),
                    })
                    .collect(),
            ),
            other => {
                self.type_error(span, format!("arrays of {} are not supported", other));
                return None;
            }
        };
        let ty = constant.ty();
        Some((Operand::Const(constant), ty))
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        span: &Span,
    ) -> Option<(Operand, LiteralType)> {
        let (value, ty) = self.lower_expr(operand)?;
        match (op, ty) {
            (UnaryOp::Neg, LiteralType::Number) => {
                let id = self.builder.create_unary(UnaryAluOp::INeg, value, "neg");
                Some((Operand::Value(id), LiteralType::Number))
            }
            (UnaryOp::Not, LiteralType::Boolean) => {
                let id = self.builder.create_unary(UnaryAluOp::BNot, value, "not");
                Some((Operand::Value(id), LiteralType::Boolean))
            }
            _ => {
                self.type_error(span, format!("operator '{:?}' cannot be applied to {}", op, ty));
                None
            }
        }
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: &Span,
    ) -> Option<(Operand, LiteralType)> {
        use LiteralType::*;

        // The regex operand of `=~` never reaches the stack; it must stay a
        // literal so the matcher can be taken from the constant pool.
        if op == BinaryOp::RegexMatch {
            let (l, lty) = self.lower_expr(lhs)?;
            if lty != String {
                self.type_error(lhs.span(), format!("'=~' expects a string, got {}", lty));
                return None;
            }
            let Some(Constant::Regex(_)) = rhs.as_literal() else {
                self.type_error(rhs.span(), "'=~' requires a regex literal on the right");
                return None;
            };
            let r = Operand::Const(rhs.as_literal().unwrap().clone());
            let id = self.builder.create_binary(BinaryAluOp::SCmpRe, l, r, "rematch");
            return Some((Operand::Value(id), Boolean));
        }

        let (mut l, lty) = self.lower_expr(lhs)?;
        let (mut r, rty) = self.lower_expr(rhs)?;

        let alu = match (op, lty, rty) {
            (BinaryOp::Add, Number, Number) => BinaryAluOp::IAdd,
            (BinaryOp::Add, String, String) => BinaryAluOp::SAdd,
            (BinaryOp::Add, String, Number | IPAddress | Cidr) => {
                r = self.coerce(r, rty, String)?;
                BinaryAluOp::SAdd
            }
            (BinaryOp::Add, Number | IPAddress | Cidr, String) => {
                l = self.coerce(l, lty, String)?;
                BinaryAluOp::SAdd
            }
            (BinaryOp::Sub, Number, Number) => BinaryAluOp::ISub,
            (BinaryOp::Mul, Number, Number) => BinaryAluOp::IMul,
            (BinaryOp::Div, Number, Number) => BinaryAluOp::IDiv,
            (BinaryOp::Rem, Number, Number) => BinaryAluOp::IRem,
            (BinaryOp::Pow, Number, Number) => BinaryAluOp::IPow,

            (BinaryOp::Eq, Number, Number) => BinaryAluOp::ICmpEq,
            (BinaryOp::Ne, Number, Number) => BinaryAluOp::ICmpNe,
            (BinaryOp::Le, Number, Number) => BinaryAluOp::ICmpLe,
            (BinaryOp::Ge, Number, Number) => BinaryAluOp::ICmpGe,
            (BinaryOp::Lt, Number, Number) => BinaryAluOp::ICmpLt,
            (BinaryOp::Gt, Number, Number) => BinaryAluOp::ICmpGt,

            (BinaryOp::Eq, String, String) => BinaryAluOp::SCmpEq,
            (BinaryOp::Ne, String, String) => BinaryAluOp::SCmpNe,
            (BinaryOp::Le, String, String) => BinaryAluOp::SCmpLe,
            (BinaryOp::Ge, String, String) => BinaryAluOp::SCmpGe,
            (BinaryOp::Lt, String, String) => BinaryAluOp::SCmpLt,
            (BinaryOp::Gt, String, String) => BinaryAluOp::SCmpGt,

            (BinaryOp::Eq, IPAddress, IPAddress) => BinaryAluOp::PCmpEq,
            (BinaryOp::Ne, IPAddress, IPAddress) => BinaryAluOp::PCmpNe,

            (BinaryOp::PrefixMatch, String, String) => BinaryAluOp::SCmpBeg,
            (BinaryOp::SuffixMatch, String, String) => BinaryAluOp::SCmpEnd,

            (BinaryOp::In, String, String) => BinaryAluOp::SIn,
            (BinaryOp::In, IPAddress, Cidr) => BinaryAluOp::PInCidr,

            (BinaryOp::And, Boolean, Boolean) => BinaryAluOp::BAnd,
            (BinaryOp::Or, Boolean, Boolean) => BinaryAluOp::BOr,
            (BinaryOp::Xor, Boolean, Boolean) => BinaryAluOp::BXor,

            _ => {
                self.type_error(
                    span,
                    format!("operator '{}' cannot combine {} and {}", op.symbol(), lty, rty),
                );
                return None;
            }
        };

        let id = self.builder.create_binary(alu, l, r, op_name(op));
        Some((Operand::Value(id), alu.result_type()))
    }
}

fn op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Rem => "rem",
        BinaryOp::Pow => "pow",
        BinaryOp::Eq => "eq",
        BinaryOp::Ne => "ne",
        BinaryOp::Le => "le",
        BinaryOp::Ge => "ge",
        BinaryOp::Lt => "lt",
        BinaryOp::Gt => "gt",
        BinaryOp::RegexMatch => "rematch",
        BinaryOp::PrefixMatch => "beg",
        BinaryOp::SuffixMatch => "end",
        BinaryOp::In => "in",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
    }
}
