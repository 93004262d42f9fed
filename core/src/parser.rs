//! Recursive-descent parser producing a `Unit`.
//!
//! Symbols are resolved while parsing: variable references against the
//! lexical scope stack, handler references against a pre-scanned handler
//! list, and builtin calls against the runtime registry (which also supplies
//! parameter names and default values for named-argument resolution).
//! Syntax errors resynchronize at statement boundaries.

use std::collections::{HashMap, HashSet};

use crate::ast::{Callee, Expr, Handler, HandlerCallee, MatchArm, Stmt, Unit, VarDecl, VarId};
use crate::ast::{BinaryOp, UnaryOp};
use crate::diagnostics::{Message, Report};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::location::Span;
use crate::types::{Constant, LiteralType};
use crate::vm::matcher::MatchClass;
use crate::vm::runtime::Runtime;

/// Parses `source` into a `Unit`, accumulating diagnostics into `report`.
/// The returned unit may be partial when errors were reported.
pub fn parse(source: &str, file: &str, runtime: &Runtime, report: &mut Report) -> Unit {
    let tokens = tokenize(source, file, report);
    Parser::new(source, tokens, file, runtime, report).parse_unit()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    file: String,
    runtime: &'a Runtime,
    report: &'a mut Report,
    scopes: Vec<HashMap<String, (VarId, LiteralType)>>,
    handler_names: HashSet<String>,
    next_var: u32,
}

impl<'a> Parser<'a> {
    fn new(
        source: &'a str,
        tokens: Vec<Token>,
        file: &str,
        runtime: &'a Runtime,
        report: &'a mut Report,
    ) -> Self {
        let mut handler_names = HashSet::new();
        for pair in tokens.windows(2) {
            if pair[0].kind == TokenKind::KwHandler && pair[1].kind == TokenKind::Ident {
                handler_names.insert(pair[1].text(source).to_string());
            }
        }
        Parser {
            source,
            tokens,
            pos: 0,
            file: file.to_string(),
            runtime,
            report,
            scopes: vec![HashMap::new()],
            handler_names,
            next_var: 0,
        }
    }

    fn text(&self, token: &Token) -> String {
        token.text(self.source).to_string()
    }

    // ------------------------------------------------------------------
    // token plumbing

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.at(kind) {
            Some(self.advance())
        } else {
            let span = self.peek().span.clone();
            self.report
                .push(Message::syntax_error(span, format!("expected {}", what)));
            None
        }
    }

    fn syntax_error(&mut self, span: Span, text: impl Into<String>) {
        self.report.push(Message::syntax_error(span, text));
    }

    fn type_error(&mut self, span: Span, text: impl Into<String>) {
        self.report.push(Message::type_error(span, text));
    }

    /// Skips ahead to the next statement boundary.
    fn synchronize(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Eof | TokenKind::RBrace | TokenKind::KwHandler => return,
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // scopes

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_var(&mut self, name: &str, ty: LiteralType, span: &Span) -> VarId {
        let id = VarId(self.next_var);
        self.next_var += 1;
        if self.scopes.last().unwrap().contains_key(name) {
            let span = span.clone();
            self.type_error(span, format!("variable '{}' is already defined in this scope", name));
        }
        self.scopes.last_mut().unwrap().insert(name.to_string(), (id, ty));
        id
    }

    fn lookup_var(&self, name: &str) -> Option<(VarId, LiteralType)> {
        for scope in self.scopes.iter().rev() {
            if let Some(found) = scope.get(name) {
                return Some(*found);
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // unit level

    fn parse_unit(mut self) -> Unit {
        let mut unit = Unit {
            file: self.file.clone(),
            ..Unit::default()
        };

        while !self.at(TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::KwImport => {
                    if let Some(module) = self.parse_import() {
                        unit.modules.push(module);
                    }
                }
                TokenKind::KwVar => {
                    if let Some(decl) = self.parse_var_decl() {
                        unit.vars.push(decl);
                    }
                }
                TokenKind::KwHandler => {
                    if let Some(handler) = self.parse_handler() {
                        if unit.handlers.iter().any(|h| h.name == handler.name) {
                            let span = handler.span.clone();
                            self.type_error(
                                span,
                                format!("handler '{}' is already defined", handler.name),
                            );
                        } else {
                            unit.handlers.push(handler);
                        }
                    }
                }
                _ => {
                    let span = self.peek().span.clone();
                    self.syntax_error(span, "expected 'import', 'var' or 'handler'");
                    self.synchronize();
                }
            }
        }
        unit
    }

    fn parse_import(&mut self) -> Option<String> {
        self.expect(TokenKind::KwImport, "'import'")?;
        let name_tok = self.expect(TokenKind::Ident, "a module name")?;
        let name = self.text(&name_tok);
        self.expect(TokenKind::Semicolon, "';' after import");
        if !self.runtime.import(&name) {
            self.type_error(name_tok.span.clone(), format!("unknown module '{}'", name));
            return None;
        }
        Some(name)
    }

    fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let kw = self.expect(TokenKind::KwVar, "'var'")?;
        let name_tok = self.expect(TokenKind::Ident, "a variable name")?;
        self.expect(TokenKind::Assign, "'=' after variable name")?;
        let init = self.parse_expr()?;
        let semi = self.expect(TokenKind::Semicolon, "';' after variable initializer");
        let name = self.text(&name_tok);
        let ty = self.expr_type(&init);
        let end = semi.map(|t| t.span).unwrap_or_else(|| init.span().clone());
        let span = kw.span.cover(&end);
        let id = self.declare_var(&name, ty, &name_tok.span);
        Some(VarDecl { id, name, ty, init, span })
    }

    fn parse_handler(&mut self) -> Option<Handler> {
        let kw = self.expect(TokenKind::KwHandler, "'handler'")?;
        let name_tok = self.expect(TokenKind::Ident, "a handler name")?;
        let name = self.text(&name_tok);
        if self.runtime.find_by_name(&name).is_some() {
            self.type_error(
                name_tok.span.clone(),
                format!("handler '{}' shadows a builtin of the same name", name),
            );
        }
        self.push_scope();
        let body = self.parse_block();
        self.pop_scope();
        let body = body?;
        let span = kw.span.cover(body.span());
        Some(Handler { name, body, span })
    }

    // ------------------------------------------------------------------
    // statements

    fn parse_block(&mut self) -> Option<Stmt> {
        let open = self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            match self.parse_stmt() {
                Some(stmt) => stmts.push(stmt),
                None => self.synchronize(),
            }
        }
        let close = self.expect(TokenKind::RBrace, "'}'");
        let end = close.map(|t| t.span).unwrap_or_else(|| open.span.clone());
        Some(Stmt::Compound { stmts, span: open.span.cover(&end) })
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        match self.peek_kind() {
            TokenKind::LBrace => {
                self.push_scope();
                let block = self.parse_block();
                self.pop_scope();
                block
            }
            TokenKind::KwVar => self.parse_var_decl().map(Stmt::Var),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwMatch => self.parse_match(),
            TokenKind::Semicolon => {
                let tok = self.advance();
                Some(Stmt::Compound { stmts: Vec::new(), span: tok.span })
            }
            TokenKind::Ident => {
                if self.peek_at(1) == TokenKind::Assign {
                    self.parse_assign()
                } else {
                    self.parse_call_stmt()
                }
            }
            _ => {
                let span = self.peek().span.clone();
                self.syntax_error(span, "expected a statement");
                None
            }
        }
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        let kw = self.expect(TokenKind::KwIf, "'if'")?;
        let cond = self.parse_expr()?;
        let then = self.parse_stmt()?;
        let mut span = kw.span.cover(then.span());
        let otherwise = if self.eat(TokenKind::KwElse) {
            let stmt = self.parse_stmt()?;
            span = span.cover(stmt.span());
            Some(Box::new(stmt))
        } else {
            None
        };
        Some(Stmt::Cond { cond, then: Box::new(then), otherwise, span })
    }

    fn parse_match(&mut self) -> Option<Stmt> {
        let kw = self.expect(TokenKind::KwMatch, "'match'")?;
        let subject = self.parse_expr()?;
        self.expect(TokenKind::KwOn, "'on' after match subject")?;
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut class: Option<MatchClass> = None;
        let mut arms = Vec::new();
        let mut otherwise = None;
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::KwElse) {
                self.expect(TokenKind::FatArrow, "'=>' after 'else'")?;
                let body = self.parse_stmt()?;
                if otherwise.is_some() {
                    let span = body.span().clone();
                    self.syntax_error(span, "duplicate 'else' arm");
                } else {
                    otherwise = Some(Box::new(body));
                }
                continue;
            }

            let arm_class = match self.peek_kind() {
                TokenKind::EqEq => {
                    self.advance();
                    MatchClass::Same
                }
                TokenKind::PrefixMatch => {
                    self.advance();
                    MatchClass::Head
                }
                TokenKind::SuffixMatch => {
                    self.advance();
                    MatchClass::Tail
                }
                TokenKind::RegexMatch => {
                    self.advance();
                    MatchClass::RegExp
                }
                _ => MatchClass::Same,
            };

            let label_tok = self.advance();
            let label = match (&label_tok.kind, &label_tok.literal) {
                (TokenKind::Str, Some(c @ Constant::Str(_))) => c.clone(),
                (TokenKind::Regex, Some(c @ Constant::Regex(_))) => c.clone(),
                _ => {
                    self.syntax_error(
                        label_tok.span.clone(),
                        "expected a string or regex label in match arm",
                    );
                    return None;
                }
            };

            let arm_class = if label.ty() == LiteralType::RegExp {
                MatchClass::RegExp
            } else {
                arm_class
            };
            if label.ty() == LiteralType::String && arm_class == MatchClass::RegExp {
                self.type_error(label_tok.span.clone(), "regex match arm requires a regex label");
            }
            match class {
                None => class = Some(arm_class),
                Some(expected) if expected != arm_class => {
                    self.type_error(
                        label_tok.span.clone(),
                        format!(
                            "match-class mismatch: arm is {} but the match is {}",
                            arm_class, expected
                        ),
                    );
                }
                _ => {}
            }

            self.expect(TokenKind::FatArrow, "'=>' after match label")?;
            let body = self.parse_stmt()?;
            let span = label_tok.span.cover(body.span());
            arms.push(MatchArm { label, body, span });
        }
        let close = self.expect(TokenKind::RBrace, "'}' after match arms");
        let end = close.map(|t| t.span).unwrap_or_else(|| kw.span.clone());
        Some(Stmt::Match {
            subject,
            class: class.unwrap_or(MatchClass::Same),
            arms,
            otherwise,
            span: kw.span.cover(&end),
        })
    }

    fn parse_assign(&mut self) -> Option<Stmt> {
        let name_tok = self.advance();
        let name = self.text(&name_tok);
        self.expect(TokenKind::Assign, "'='")?;
        let value = self.parse_expr()?;
        let semi = self.expect(TokenKind::Semicolon, "';' after assignment");
        let end = semi.map(|t| t.span).unwrap_or_else(|| value.span().clone());
        let span = name_tok.span.cover(&end);
        match self.lookup_var(&name) {
            Some((id, _)) => Some(Stmt::Assign { id, name, value, span }),
            None => {
                self.type_error(name_tok.span.clone(), format!("unknown variable '{}'", name));
                None
            }
        }
    }

    /// A statement that begins with an identifier and is not an assignment:
    /// a builtin function call, a builtin handler invocation, or a
    /// user-handler invocation, with optional paren-free arguments.
    fn parse_call_stmt(&mut self) -> Option<Stmt> {
        let name_tok = self.advance();
        let name = self.text(&name_tok);

        let (positional, named, args_end) = if self.at(TokenKind::Semicolon) {
            (Vec::new(), Vec::new(), name_tok.span.clone())
        } else if self.at(TokenKind::LParen) {
            self.parse_paren_args()?
        } else {
            self.parse_free_args()?
        };
        let semi = self.expect(TokenKind::Semicolon, "';' after call");
        let end = semi.map(|t| t.span).unwrap_or(args_end);
        let span = name_tok.span.cover(&end);

        if let Some(callback) = self.runtime.find_by_name(&name) {
            let signature = callback.signature().clone();
            let is_handler = callback.is_handler();
            let args = self.bind_arguments(&name_tok, &signature.name, positional, named)?;
            if is_handler {
                return Some(Stmt::HandlerCall {
                    callee: HandlerCallee::Builtin(signature),
                    args,
                    span,
                });
            }
            return Some(Stmt::Expr {
                expr: Expr::Call { callee: Callee { signature }, args, span: span.clone() },
                span,
            });
        }

        if self.handler_names.contains(&name) {
            if !positional.is_empty() || !named.is_empty() {
                self.type_error(
                    name_tok.span.clone(),
                    format!("handler '{}' does not take arguments", name),
                );
            }
            return Some(Stmt::HandlerCall {
                callee: HandlerCallee::User(name),
                args: Vec::new(),
                span,
            });
        }

        // A call to a name nobody registered still parses: the reference is
        // carried through to the linker, which reports it at this location.
        if !named.is_empty() {
            self.type_error(
                name_tok.span.clone(),
                format!("unknown function '{}' cannot take named arguments", name),
            );
            return None;
        }
        let params = positional.iter().map(|e| self.expr_type(e)).collect();
        let signature = crate::types::Signature {
            name,
            return_type: LiteralType::Void,
            params,
        };
        Some(Stmt::Expr {
            expr: Expr::Call {
                callee: Callee { signature },
                args: positional,
                span: span.clone(),
            },
            span,
        })
    }

    // ------------------------------------------------------------------
    // calls and arguments

    fn parse_paren_args(&mut self) -> Option<(Vec<Expr>, Vec<(Token, Expr)>, Span)> {
        let open = self.expect(TokenKind::LParen, "'('")?;
        let mut positional = Vec::new();
        let mut named = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                self.parse_one_arg(&mut positional, &mut named)?;
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RParen, "')' after arguments")?;
        Some((positional, named, open.span.cover(&close.span)))
    }

    fn parse_free_args(&mut self) -> Option<(Vec<Expr>, Vec<(Token, Expr)>, Span)> {
        let mut positional = Vec::new();
        let mut named = Vec::new();
        loop {
            self.parse_one_arg(&mut positional, &mut named)?;
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = named
            .last()
            .map(|(_, e)| e.span().clone())
            .or_else(|| positional.last().map(|e| e.span().clone()))
            .unwrap_or_else(|| self.peek().span.clone());
        Some((positional, named, end))
    }

    fn parse_one_arg(
        &mut self,
        positional: &mut Vec<Expr>,
        named: &mut Vec<(Token, Expr)>,
    ) -> Option<()> {
        if self.at(TokenKind::Ident) && self.peek_at(1) == TokenKind::Colon {
            let name_tok = self.advance();
            self.advance(); // ':'
            let value = self.parse_expr()?;
            named.push((name_tok, value));
        } else {
            if !named.is_empty() {
                let span = self.peek().span.clone();
                self.syntax_error(span, "positional argument after named argument");
            }
            positional.push(self.parse_expr()?);
        }
        Some(())
    }

    /// Maps positional and named arguments onto the callee's parameter list
    /// and fills the remainder from registered defaults.
    fn bind_arguments(
        &mut self,
        at: &Token,
        callee: &str,
        positional: Vec<Expr>,
        named: Vec<(Token, Expr)>,
    ) -> Option<Vec<Expr>> {
        let callback = self.runtime.find_by_name(callee)?;
        let params = callback.signature().params.clone();
        let names = callback.param_names().to_vec();
        let defaults: Vec<Option<Constant>> = callback.defaults().to_vec();

        if positional.len() > params.len() {
            self.type_error(
                at.span.clone(),
                format!(
                    "'{}' takes {} argument(s) but {} were given",
                    callee,
                    params.len(),
                    positional.len()
                ),
            );
            return None;
        }

        let mut slots: Vec<Option<Expr>> = positional.into_iter().map(Some).collect();
        slots.resize_with(params.len(), || None);

        for (name_tok, value) in named {
            let name = self.text(&name_tok);
            match names.iter().position(|n| *n == name) {
                Some(index) => {
                    if slots[index].is_some() {
                        self.type_error(
                            name_tok.span.clone(),
                            format!("argument '{}' of '{}' given twice", name, callee),
                        );
                    }
                    slots[index] = Some(value);
                }
                None => {
                    self.type_error(
                        name_tok.span.clone(),
                        format!("'{}' has no parameter named '{}'", callee, name),
                    );
                }
            }
        }

        let mut args = Vec::with_capacity(params.len());
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(expr) => args.push(expr),
                None => match defaults.get(index).cloned().flatten() {
                    Some(value) => {
                        args.push(Expr::Literal { value, span: at.span.clone() });
                    }
                    None => {
                        let param = names
                            .get(index)
                            .cloned()
                            .unwrap_or_else(|| format!("#{}", index + 1));
                        self.type_error(
                            at.span.clone(),
                            format!("missing argument '{}' in call to '{}'", param, callee),
                        );
                        return None;
                    }
                },
            }
        }
        Some(args)
    }

    // ------------------------------------------------------------------
    // expressions

    fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_or()
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span().cover(rhs.span());
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), span }
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_xor()?;
        while self.at(TokenKind::OrOr) || self.at(TokenKind::KwOr) {
            self.advance();
            let rhs = self.parse_xor()?;
            lhs = Self::binary(BinaryOp::Or, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_xor(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_and()?;
        while self.at(TokenKind::KwXor) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Self::binary(BinaryOp::Xor, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.at(TokenKind::AndAnd) || self.at(TokenKind::KwAnd) {
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Self::binary(BinaryOp::And, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_comparison(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::BangEq => BinaryOp::Ne,
                TokenKind::LtEq => BinaryOp::Le,
                TokenKind::GtEq => BinaryOp::Ge,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::RegexMatch => BinaryOp::RegexMatch,
                TokenKind::PrefixMatch => BinaryOp::PrefixMatch,
                TokenKind::SuffixMatch => BinaryOp::SuffixMatch,
                TokenKind::KwIn => BinaryOp::In,
                _ => return Some(lhs),
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Self::binary(op, lhs, rhs);
        }
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Some(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Self::binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_power()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Some(lhs),
            };
            self.advance();
            let rhs = self.parse_power()?;
            lhs = Self::binary(op, lhs, rhs);
        }
    }

    fn parse_power(&mut self) -> Option<Expr> {
        let lhs = self.parse_unary()?;
        if self.at(TokenKind::StarStar) {
            self.advance();
            // right-associative
            let rhs = self.parse_power()?;
            return Some(Self::binary(BinaryOp::Pow, lhs, rhs));
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang | TokenKind::KwNot => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let tok = self.advance();
            let operand = self.parse_unary()?;
            let span = tok.span.cover(operand.span());
            return Some(Expr::Unary { op, operand: Box::new(operand), span });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        match self.peek_kind() {
            TokenKind::Number
            | TokenKind::Str
            | TokenKind::Regex
            | TokenKind::IP
            | TokenKind::Cidr
            | TokenKind::Boolean => {
                let tok = self.advance();
                Some(Expr::Literal { value: tok.literal.clone().unwrap(), span: tok.span })
            }
            TokenKind::LBracket => self.parse_array(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(inner)
            }
            TokenKind::Ident => self.parse_name_expr(),
            _ => {
                let span = self.peek().span.clone();
                self.syntax_error(span, "expected an expression");
                None
            }
        }
    }

    fn parse_array(&mut self) -> Option<Expr> {
        let open = self.expect(TokenKind::LBracket, "'['")?;
        let mut elements = Vec::new();
        if !self.at(TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RBracket, "']' after array elements")?;
        Some(Expr::Array { elements, span: open.span.cover(&close.span) })
    }

    /// An identifier in expression position: a variable reference, a builtin
    /// function call (parenthesized or zero-argument), or a handler
    /// reference.
    fn parse_name_expr(&mut self) -> Option<Expr> {
        let name_tok = self.advance();
        let name = self.text(&name_tok);

        if self.at(TokenKind::LParen) {
            let (positional, named, args_end) = self.parse_paren_args()?;
            let span = name_tok.span.cover(&args_end);
            match self.runtime.find_by_name(&name) {
                Some(callback) if !callback.is_handler() => {
                    let signature = callback.signature().clone();
                    let args = self.bind_arguments(&name_tok, &name, positional, named)?;
                    return Some(Expr::Call { callee: Callee { signature }, args, span });
                }
                Some(_) => {
                    self.type_error(
                        name_tok.span.clone(),
                        format!("handler '{}' cannot be used in an expression", name),
                    );
                    return None;
                }
                None => {
                    self.type_error(name_tok.span.clone(), format!("unknown function '{}'", name));
                    return None;
                }
            }
        }

        if let Some((id, _)) = self.lookup_var(&name) {
            return Some(Expr::VarRef { id, name, span: name_tok.span });
        }

        if let Some(callback) = self.runtime.find_by_name(&name) {
            if callback.is_handler() {
                self.type_error(
                    name_tok.span.clone(),
                    format!("handler '{}' cannot be used in an expression", name),
                );
                return None;
            }
            let signature = callback.signature().clone();
            let args = self.bind_arguments(&name_tok, &name, Vec::new(), Vec::new())?;
            let span = name_tok.span.clone();
            return Some(Expr::Call { callee: Callee { signature }, args, span });
        }

        if self.handler_names.contains(&name) {
            return Some(Expr::HandlerRef { name, span: name_tok.span });
        }

        self.type_error(name_tok.span.clone(), format!("unknown name '{}'", name));
        None
    }

    // ------------------------------------------------------------------
    // best-effort static typing used for `var` declarations

    fn expr_type(&self, expr: &Expr) -> LiteralType {
        match expr {
            Expr::Literal { value, .. } => value.ty(),
            Expr::Array { elements, .. } => elements
                .first()
                .map(|e| self.expr_type(e))
                .and_then(LiteralType::array_of)
                .unwrap_or(LiteralType::StringArray),
            Expr::Unary { op: UnaryOp::Neg, .. } => LiteralType::Number,
            Expr::Unary { op: UnaryOp::Not, .. } => LiteralType::Boolean,
            Expr::Binary { op, lhs, rhs, .. } => {
                if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
                {
                    LiteralType::Boolean
                } else if *op == BinaryOp::Add
                    && (self.expr_type(lhs) == LiteralType::String
                        || self.expr_type(rhs) == LiteralType::String)
                {
                    LiteralType::String
                } else {
                    LiteralType::Number
                }
            }
            Expr::Call { callee, .. } => callee.signature.return_type,
            Expr::VarRef { id, .. } => self
                .scopes
                .iter()
                .flat_map(|s| s.values())
                .find(|(vid, _)| vid == id)
                .map(|(_, ty)| *ty)
                .unwrap_or(LiteralType::Void),
            Expr::HandlerRef { .. } => LiteralType::Handler,
        }
    }
}

