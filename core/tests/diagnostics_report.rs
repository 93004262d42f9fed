use sluice_core::diagnostics::{Message, MessageKind, Report};
use sluice_core::location::{Location, Span};

fn span(file: &str, line: usize, column: usize) -> Span {
    Span::point(file, Location::new(line, column))
}

#[test]
fn report_equality_is_set_based() {
    let mut a = Report::new();
    a.push(Message::type_error(span("x.sl", 1, 1), "first"));
    a.push(Message::warning(span("x.sl", 2, 5), "second"));

    let mut b = Report::new();
    b.push(Message::warning(span("x.sl", 2, 5), "second"));
    b.push(Message::type_error(span("x.sl", 1, 1), "first"));

    assert_eq!(a, b, "ordering must not matter");
}

#[test]
fn message_equality_ignores_the_file_name() {
    let expected = Message::type_error(span("<expected>", 3, 7), "boom");
    let actual = Message::type_error(span("real.sl", 3, 7), "boom");
    assert_eq!(expected, actual);

    let moved = Message::type_error(span("real.sl", 3, 8), "boom");
    assert_ne!(expected, moved);
}

#[test]
fn difference_splits_missing_and_superfluous() {
    let mut expected = Report::new();
    expected.push(Message::syntax_error(span("t.sl", 1, 1), "wanted"));
    expected.push(Message::type_error(span("t.sl", 2, 2), "shared"));

    let mut actual = Report::new();
    actual.push(Message::type_error(span("t.sl", 2, 2), "shared"));
    actual.push(Message::link_error(span("t.sl", 9, 9), "extra"));

    let (missing, superfluous) = Report::difference(&expected, &actual);
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].text, "wanted");
    assert_eq!(superfluous.len(), 1);
    assert_eq!(superfluous[0].text, "extra");
}

#[test]
fn error_kinds_are_errors_and_warnings_are_not() {
    assert!(MessageKind::TokenError.is_error());
    assert!(MessageKind::SyntaxError.is_error());
    assert!(MessageKind::TypeError.is_error());
    assert!(MessageKind::LinkError.is_error());
    assert!(!MessageKind::Warning.is_error());

    let mut report = Report::new();
    report.push(Message::warning(span("w.sl", 1, 1), "just advice"));
    assert!(!report.has_errors());
    assert!(report.has_warnings());
}

#[test]
fn kinds_round_trip_through_strings() {
    for kind in [
        MessageKind::TokenError,
        MessageKind::SyntaxError,
        MessageKind::TypeError,
        MessageKind::Warning,
        MessageKind::LinkError,
    ] {
        assert_eq!(kind.as_str().parse::<MessageKind>(), Ok(kind));
    }
    assert!("NotAKind".parse::<MessageKind>().is_err());
}

#[test]
fn reports_serialize_to_json() {
    let mut report = Report::new();
    report.push(Message::type_error(span("j.sl", 4, 2), "typed"));
    let json = report.to_json().expect("serializable");
    assert!(json.contains("TypeError"));
    assert!(json.contains("typed"));
}
