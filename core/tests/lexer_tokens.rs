use sluice_core::diagnostics::{MessageKind, Report};
use sluice_core::lexer::{tokenize, TokenKind};
use sluice_core::types::Constant;

#[test]
fn token_prefixes_reproduce_the_source() {
    let source = "handler main {\n  # a comment\n  var x = 40 + 2;\n  echo \"hi\";\n}\n";
    let mut report = Report::new();
    let tokens = tokenize(source, "roundtrip.sl", &mut report);
    assert!(report.is_empty(), "unexpected diagnostics: {}", report);

    let mut rebuilt = String::new();
    for token in &tokens {
        rebuilt.push_str(&source[token.prefix..token.end]);
    }
    assert_eq!(rebuilt, source);
}

#[test]
fn literals_carry_their_values() {
    let source = "42 0x2a 'one' \"two\" true 10.0.0.1 10.0.0.0/8";
    let mut report = Report::new();
    let tokens = tokenize(source, "lit.sl", &mut report);
    assert!(report.is_empty(), "unexpected diagnostics: {}", report);

    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Number,
            TokenKind::Number,
            TokenKind::Str,
            TokenKind::Str,
            TokenKind::Boolean,
            TokenKind::IP,
            TokenKind::Cidr,
            TokenKind::Eof,
        ]
    );
    assert_eq!(tokens[0].literal, Some(Constant::Number(42)));
    assert_eq!(tokens[1].literal, Some(Constant::Number(42)));
    assert_eq!(tokens[2].literal, Some(Constant::Str("one".into())));
    assert_eq!(tokens[4].literal, Some(Constant::Bool(true)));
    assert_eq!(tokens[5].literal, Some(Constant::IP("10.0.0.1".parse().unwrap())));
    assert_eq!(tokens[6].literal, Some(Constant::Cidr("10.0.0.0/8".parse().unwrap())));
}

#[test]
fn ipv6_literals_lex_as_addresses() {
    let mut report = Report::new();
    let tokens = tokenize("::1 fe80::1 2001:db8::/32", "v6.sl", &mut report);
    assert!(report.is_empty(), "unexpected diagnostics: {}", report);
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![TokenKind::IP, TokenKind::IP, TokenKind::Cidr, TokenKind::Eof]);
}

#[test]
fn slash_is_division_after_a_value_and_regex_otherwise() {
    let mut report = Report::new();
    let tokens = tokenize("x =~ /ab+c/ ; 8 / 2", "slash.sl", &mut report);
    assert!(report.is_empty(), "unexpected diagnostics: {}", report);
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Ident,
            TokenKind::RegexMatch,
            TokenKind::Regex,
            TokenKind::Semicolon,
            TokenKind::Number,
            TokenKind::Slash,
            TokenKind::Number,
            TokenKind::Eof,
        ]
    );
    assert_eq!(tokens[2].literal, Some(Constant::Regex("ab+c".into())));
}

#[test]
fn case_insensitive_flag_folds_into_the_pattern() {
    let mut report = Report::new();
    let tokens = tokenize("x =~ /ab/i", "flags.sl", &mut report);
    assert!(report.is_empty());
    assert_eq!(tokens[2].literal, Some(Constant::Regex("(?i)ab".into())));
}

#[test]
fn match_operators_lex_individually() {
    let mut report = Report::new();
    let tokens = tokenize("=~ =^ =$ => == =", "ops.sl", &mut report);
    assert!(report.is_empty());
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::RegexMatch,
            TokenKind::PrefixMatch,
            TokenKind::SuffixMatch,
            TokenKind::FatArrow,
            TokenKind::EqEq,
            TokenKind::Assign,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn unknown_bytes_report_a_token_error_with_position() {
    let mut report = Report::new();
    let tokens = tokenize("var x = 1;\n  @ var y = 2;", "bad.sl", &mut report);
    assert_eq!(report.count_of(MessageKind::TokenError), 1);

    let message = report.iter().next().unwrap();
    let span = message.location.as_ref().expect("token error has a location");
    assert_eq!((span.begin.line, span.begin.column), (2, 3));

    // lexing continues after the bad byte
    assert!(tokens.iter().filter(|t| t.kind == TokenKind::KwVar).count() == 2);
}

#[test]
fn unterminated_string_is_a_token_error() {
    let mut report = Report::new();
    tokenize("echo \"oops\n", "unterminated.sl", &mut report);
    assert_eq!(report.count_of(MessageKind::TokenError), 1);
}
