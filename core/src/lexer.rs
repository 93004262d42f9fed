//! Byte-stream lexer producing a lossless token stream.
//!
//! Every token records the byte range of its text plus the offset where the
//! trivia (whitespace, `#` comments) preceding it begins, so concatenating
//! `source[prefix..end]` over all tokens reproduces the input exactly.

use std::net::IpAddr;

use crate::diagnostics::{Message, Report};
use crate::location::{Location, Span};
use crate::types::{Cidr, Constant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Regex,
    IP,
    Cidr,
    Boolean,

    KwHandler,
    KwVar,
    KwIf,
    KwElse,
    KwMatch,
    KwOn,
    KwImport,
    KwIn,
    KwAnd,
    KwOr,
    KwXor,
    KwNot,

    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    EqEq,
    BangEq,
    LtEq,
    GtEq,
    Lt,
    Gt,
    AndAnd,
    OrOr,
    Bang,
    Assign,
    RegexMatch,  // =~
    PrefixMatch, // =^
    SuffixMatch, // =$
    FatArrow,    // =>

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,

    Eof,
}

impl TokenKind {
    fn keyword(text: &str) -> Option<TokenKind> {
        match text {
            "handler" => Some(TokenKind::KwHandler),
            "var" => Some(TokenKind::KwVar),
            "if" => Some(TokenKind::KwIf),
            "else" => Some(TokenKind::KwElse),
            "match" => Some(TokenKind::KwMatch),
            "on" => Some(TokenKind::KwOn),
            "import" => Some(TokenKind::KwImport),
            "in" => Some(TokenKind::KwIn),
            "and" => Some(TokenKind::KwAnd),
            "or" => Some(TokenKind::KwOr),
            "xor" => Some(TokenKind::KwXor),
            "not" => Some(TokenKind::KwNot),
            _ => None,
        }
    }

    /// Kinds that can end an expression; a `/` following one of them is a
    /// division operator, anywhere else it starts a regex literal.
    fn ends_value(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident
                | TokenKind::Number
                | TokenKind::Str
                | TokenKind::Regex
                | TokenKind::IP
                | TokenKind::Cidr
                | TokenKind::Boolean
                | TokenKind::RParen
                | TokenKind::RBracket
        )
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Byte offset of the first character of the token.
    pub start: usize,
    /// Byte offset one past the last character of the token.
    pub end: usize,
    /// Byte offset where the trivia run preceding this token begins.
    pub prefix: usize,
    pub literal: Option<Constant>,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Lexes `source` into tokens, appending a `TokenError` for every byte
/// sequence that cannot form a token. The returned stream always ends with
/// an `Eof` token whose trailing range covers leftover trivia.
pub fn tokenize(source: &str, file: &str, report: &mut Report) -> Vec<Token> {
    Lexer::new(source, file).run(report)
}

struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    file: String,
    pos: usize,
    line: usize,
    column: usize,
    // position of the most recently consumed character
    last_line: usize,
    last_column: usize,
    tokens: Vec<Token>,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str, file: &str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            file: file.to_string(),
            pos: 0,
            line: 1,
            column: 1,
            last_line: 1,
            last_column: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self, report: &mut Report) -> Vec<Token> {
        loop {
            let prefix = self.pos;
            self.skip_trivia();
            if self.pos >= self.bytes.len() {
                let at = Location::new(self.line, self.column);
                self.tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: Span::point(&self.file, at),
                    start: self.pos,
                    end: self.bytes.len(),
                    prefix,
                    literal: None,
                });
                return self.tokens;
            }
            self.next_token(prefix, report);
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        self.last_line = self.line;
        self.last_column = self.column;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'#' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self, prefix: usize, report: &mut Report) {
        let start = self.pos;
        let begin = Location::new(self.line, self.column);
        let b = self.peek().unwrap();

        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.identifier(prefix, start, begin, report),
            b'0'..=b'9' => self.number_or_address(prefix, start, begin, report),
            b':' if self.peek_at(1) == Some(b':') => {
                // IPv6 literal beginning with "::"
                self.ipv6(prefix, start, begin, report)
            }
            b'"' | b'\'' => self.string(prefix, start, begin, b, report),
            b'/' => {
                if self.tokens.last().map(|t| t.kind.ends_value()).unwrap_or(false) {
                    self.advance();
                    self.push(TokenKind::Slash, prefix, start, begin, None);
                } else {
                    self.regex(prefix, start, begin, report);
                }
            }
            _ => self.operator(prefix, start, begin, report),
        }
    }

    fn push(
        &mut self,
        kind: TokenKind,
        prefix: usize,
        start: usize,
        begin: Location,
        literal: Option<Constant>,
    ) {
        let end_loc = Location::new(self.last_line, self.last_column);
        self.tokens.push(Token {
            kind,
            span: Span::new(&self.file, begin, end_loc),
            start,
            end: self.pos,
            prefix,
            literal,
        });
    }

    // Reports a `TokenError` covering the bytes consumed so far and emits no
    // token; the bad run becomes trivia of whatever follows.
    fn error_token(&mut self, _prefix: usize, _start: usize, begin: Location, report: &mut Report, text: String) {
        let end_loc = Location::new(self.last_line, self.last_column);
        report.push(Message::token_error(Span::new(&self.file, begin, end_loc), text));
    }

    fn identifier(&mut self, prefix: usize, start: usize, begin: Location, report: &mut Report) {
        self.advance();
        loop {
            match self.peek() {
                Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_') => {
                    self.advance();
                }
                // Dotted names such as `req.path` are single identifiers.
                Some(b'.') if matches!(
                    self.peek_at(1),
                    Some(b'A'..=b'Z' | b'a'..=b'z' | b'_')
                ) =>
                {
                    self.advance();
                }
                _ => break,
            }
        }
        let text = &self.source[start..self.pos];

        // An all-hex name followed by a second colon is an IPv6 literal
        // (e.g. `fe80::1`), not an identifier.
        if text.bytes().all(|c| c.is_ascii_hexdigit())
            && self.peek() == Some(b':')
            && self.looks_like_ipv6_tail()
        {
            self.consume_address_run();
            let run = &self.source[start..self.pos];
            if let Ok(ip) = run.parse::<IpAddr>() {
                self.finish_address(prefix, start, begin, ip, report);
                return;
            }
            // fall through as an identifier would be wrong; report below
            let end_loc = Location::new(self.last_line, self.last_column);
            let span = Span::new(&self.file, begin, end_loc);
            self.tokens.push(Token {
                kind: TokenKind::Ident,
                span,
                start,
                end: self.pos,
                prefix,
                literal: None,
            });
            return;
        }

        match text {
            "true" => self.push(TokenKind::Boolean, prefix, start, begin, Some(Constant::Bool(true))),
            "false" => self.push(TokenKind::Boolean, prefix, start, begin, Some(Constant::Bool(false))),
            _ => match TokenKind::keyword(text) {
                Some(kind) => self.push(kind, prefix, start, begin, None),
                None => self.push(TokenKind::Ident, prefix, start, begin, None),
            },
        }
    }

    fn looks_like_ipv6_tail(&self) -> bool {
        // At least two colons in the upcoming address-character run.
        let mut colons = 0;
        let mut i = self.pos;
        while let Some(&c) = self.bytes.get(i) {
            match c {
                b':' => colons += 1,
                b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' | b'.' => {}
                _ => break,
            }
            i += 1;
        }
        colons >= 1 && self.bytes.get(self.pos + 1) == Some(&b':')
            || colons >= 2
    }

    fn consume_address_run(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' | b':' | b'.' => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn finish_address(
        &mut self,
        prefix: usize,
        start: usize,
        begin: Location,
        ip: IpAddr,
        report: &mut Report,
    ) {
        // An address directly followed by `/<digits>` forms a CIDR literal.
        if self.peek() == Some(b'/') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.advance();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
            }
            let text = self.source[start..self.pos].to_string();
            match text.parse::<Cidr>() {
                Ok(cidr) => {
                    self.push(TokenKind::Cidr, prefix, start, begin, Some(Constant::Cidr(cidr)))
                }
                Err(reason) => self.error_token(
                    prefix,
                    start,
                    begin,
                    report,
                    format!("invalid CIDR literal '{}': {}", text, reason),
                ),
            }
        } else {
            self.push(TokenKind::IP, prefix, start, begin, Some(Constant::IP(ip)));
        }
    }

    fn ipv6(&mut self, prefix: usize, start: usize, begin: Location, report: &mut Report) {
        self.consume_address_run();
        let text = self.source[start..self.pos].to_string();
        match text.parse::<IpAddr>() {
            Ok(ip) => self.finish_address(prefix, start, begin, ip, report),
            Err(_) => {
                self.error_token(
                    prefix,
                    start,
                    begin,
                    report,
                    format!("'{}' is not a valid IPv6 address", text),
                );
            }
        }
    }

    fn number_or_address(&mut self, prefix: usize, start: usize, begin: Location, report: &mut Report) {
        // Hex integer.
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.advance();
            self.advance();
            let digits = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.advance();
            }
            if self.pos == digits {
                self.error_token(prefix, start, begin, report, "hex literal without digits".into());
                return;
            }
            let value = i64::from_str_radix(&self.source[digits..self.pos], 16).unwrap_or(i64::MAX);
            self.push(TokenKind::Number, prefix, start, begin, Some(Constant::Number(value)));
            return;
        }

        self.consume_address_run();
        let text = &self.source[start..self.pos];

        if text.contains(':') {
            match text.parse::<IpAddr>() {
                Ok(ip) => self.finish_address(prefix, start, begin, ip, report),
                Err(_) => self.error_token(
                    prefix,
                    start,
                    begin,
                    report,
                    format!("'{}' is not a valid IP address", text),
                ),
            }
        } else if text.contains('.') {
            match text.parse::<IpAddr>() {
                Ok(ip) => self.finish_address(prefix, start, begin, ip, report),
                Err(_) => self.error_token(
                    prefix,
                    start,
                    begin,
                    report,
                    format!("'{}' is not a valid IPv4 address", text),
                ),
            }
        } else if text.bytes().all(|c| c.is_ascii_digit()) {
            match text.parse::<i64>() {
                Ok(value) => {
                    self.push(TokenKind::Number, prefix, start, begin, Some(Constant::Number(value)))
                }
                Err(_) => self.error_token(
                    prefix,
                    start,
                    begin,
                    report,
                    format!("integer literal '{}' is out of range", text),
                ),
            }
        } else {
            self.error_token(
                prefix,
                start,
                begin,
                report,
                format!("'{}' is not a valid number", text),
            );
        }
    }

    fn string(&mut self, prefix: usize, start: usize, begin: Location, quote: u8, report: &mut Report) {
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    self.error_token(prefix, start, begin, report, "unterminated string literal".into());
                    return;
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    let esc = self.advance();
                    match esc {
                        Some(b'n') => value.push('\n'),
                        Some(b'r') => value.push('\r'),
                        Some(b't') => value.push('\t'),
                        Some(b'0') => value.push('\0'),
                        Some(b'\\') => value.push('\\'),
                        Some(b'"') => value.push('"'),
                        Some(b'\'') => value.push('\''),
                        Some(other) => {
                            let end_loc = Location::new(self.last_line, self.last_column);
                            report.push(Message::token_error(
                                Span::new(&self.file, end_loc, end_loc),
                                format!("unknown escape sequence '\\{}'", other as char),
                            ));
                        }
                        None => {
                            self.error_token(
                                prefix,
                                start,
                                begin,
                                report,
                                "unterminated string literal".into(),
                            );
                            return;
                        }
                    }
                }
                Some(_) => {
                    // Re-borrow as chars to keep multi-byte input intact.
                    let ch = self.source[self.pos..].chars().next().unwrap();
                    for _ in 0..ch.len_utf8() {
                        self.advance();
                    }
                    value.push(ch);
                }
            }
        }
        self.push(TokenKind::Str, prefix, start, begin, Some(Constant::Str(value)));
    }

    fn regex(&mut self, prefix: usize, start: usize, begin: Location, report: &mut Report) {
        self.advance(); // opening '/'
        let mut pattern = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    self.error_token(prefix, start, begin, report, "unterminated regex literal".into());
                    return;
                }
                Some(b'/') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.peek() {
                        Some(b'/') => {
                            self.advance();
                            pattern.push('/');
                        }
                        _ => pattern.push('\\'),
                    }
                }
                Some(_) => {
                    let ch = self.source[self.pos..].chars().next().unwrap();
                    for _ in 0..ch.len_utf8() {
                        self.advance();
                    }
                    pattern.push(ch);
                }
            }
        }
        // Case-insensitivity is the only supported flag; it folds into the
        // pattern itself.
        if self.peek() == Some(b'i') {
            self.advance();
            pattern.insert_str(0, "(?i)");
        }
        if regex::Regex::new(&pattern).is_err() {
            self.error_token(
                prefix,
                start,
                begin,
                report,
                format!("invalid regex pattern '{}'", pattern),
            );
            return;
        }
        self.push(TokenKind::Regex, prefix, start, begin, Some(Constant::Regex(pattern)));
    }

    fn operator(&mut self, prefix: usize, start: usize, begin: Location, report: &mut Report) {
        let b = self.advance().unwrap();
        let kind = match b {
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => {
                if self.match_byte(b'*') {
                    TokenKind::StarStar
                } else {
                    TokenKind::Star
                }
            }
            b'%' => TokenKind::Percent,
            b'=' => {
                if self.match_byte(b'=') {
                    TokenKind::EqEq
                } else if self.match_byte(b'~') {
                    TokenKind::RegexMatch
                } else if self.match_byte(b'^') {
                    TokenKind::PrefixMatch
                } else if self.match_byte(b'$') {
                    TokenKind::SuffixMatch
                } else if self.match_byte(b'>') {
                    TokenKind::FatArrow
                } else {
                    TokenKind::Assign
                }
            }
            b'!' => {
                if self.match_byte(b'=') {
                    TokenKind::BangEq
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                if self.match_byte(b'=') {
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.match_byte(b'=') {
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            b'&' => {
                if self.match_byte(b'&') {
                    TokenKind::AndAnd
                } else {
                    self.error_token(prefix, start, begin, report, "unexpected character '&'".into());
                    return;
                }
            }
            b'|' => {
                if self.match_byte(b'|') {
                    TokenKind::OrOr
                } else {
                    self.error_token(prefix, start, begin, report, "unexpected character '|'".into());
                    return;
                }
            }
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b':' => TokenKind::Colon,
            other => {
                self.error_token(
                    prefix,
                    start,
                    begin,
                    report,
                    format!("unexpected character '{}' (0x{:02x})", other as char, other),
                );
                return;
            }
        };
        self.push(kind, prefix, start, begin, None);
    }
}
