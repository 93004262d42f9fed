// Core module for reporting problems found while compiling scripts.
// All compile-time stages append into one `Report`; set-based equality and
// `Report::difference` drive the expected-diagnostics test harness.

use console::Style;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::location::Span;

/// Classification of a diagnostic message.
///
/// # Examples
/// ```
/// use sluice_core::diagnostics::MessageKind;
/// assert_eq!("TypeError".parse(), Ok(MessageKind::TypeError));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// The lexer could not form a token at a position.
    TokenError,
    /// The parser could not consume the token stream.
    SyntaxError,
    /// A semantic check failed (unknown name, type mismatch, illegal API use).
    TypeError,
    /// Non-fatal advice.
    Warning,
    /// A bytecode call references a native not registered with the runtime.
    LinkError,
}

impl MessageKind {
    pub fn is_error(&self) -> bool {
        !matches!(self, MessageKind::Warning)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::TokenError => "TokenError",
            MessageKind::SyntaxError => "SyntaxError",
            MessageKind::TypeError => "TypeError",
            MessageKind::Warning => "Warning",
            MessageKind::LinkError => "LinkError",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TokenError" => Ok(MessageKind::TokenError),
            "SyntaxError" => Ok(MessageKind::SyntaxError),
            "TypeError" => Ok(MessageKind::TypeError),
            "Warning" => Ok(MessageKind::Warning),
            "LinkError" => Ok(MessageKind::LinkError),
            _ => Err(()),
        }
    }
}

/// A single diagnostic: kind, optional source span, and message text.
///
/// Two messages compare equal when kind, text and span positions agree; the
/// file name of the span is display-only, so expectations written without a
/// file still match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub location: Option<Span>,
    pub text: String,
}

impl Message {
    pub fn new(kind: MessageKind, location: Option<Span>, text: impl Into<String>) -> Self {
        Message { kind, location, text: text.into() }
    }

    pub fn token_error(location: Span, text: impl Into<String>) -> Self {
        Message::new(MessageKind::TokenError, Some(location), text)
    }
    pub fn syntax_error(location: Span, text: impl Into<String>) -> Self {
        Message::new(MessageKind::SyntaxError, Some(location), text)
    }
    pub fn type_error(location: Span, text: impl Into<String>) -> Self {
        Message::new(MessageKind::TypeError, Some(location), text)
    }
    pub fn warning(location: Span, text: impl Into<String>) -> Self {
        Message::new(MessageKind::Warning, Some(location), text)
    }
    pub fn link_error(location: Span, text: impl Into<String>) -> Self {
        Message::new(MessageKind::LinkError, Some(location), text)
    }

    /// Pretty-print with a source snippet and caret under the span.
    /// `source` should be the contents of the file the location refers to.
    pub fn pretty_with_source(&self, source: &str) {
        let sev = match self.kind {
            MessageKind::Warning => Style::new().yellow().bold(),
            _ => Style::new().red().bold(),
        };
        println!(
            "{} {}",
            sev.apply_to(format!("[{}]", self.kind)),
            Style::new().bold().apply_to(&self.text)
        );

        if let Some(loc) = &self.location {
            println!(" --> {}:{}:{}", loc.file, loc.begin.line, loc.begin.column);
            if let Some(line_str) = source.lines().nth(loc.begin.line.saturating_sub(1)) {
                println!(" {:4} | {}", loc.begin.line, line_str);
                let col = loc.begin.column.saturating_sub(1);
                let caret_len = if loc.end.line == loc.begin.line {
                    (loc.end.column + 1).saturating_sub(loc.begin.column).max(1)
                } else {
                    line_str.chars().count().saturating_sub(col).max(1)
                };
                let mut caret_line = String::from("      | ");
                caret_line.push_str(&" ".repeat(col));
                caret_line.push_str(&"^".repeat(caret_len));
                println!("{}", Style::new().green().apply_to(caret_line));
            }
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        if self.kind != other.kind || self.text != other.text {
            return false;
        }
        match (&self.location, &other.location) {
            (None, None) => true,
            (Some(a), Some(b)) => a.begin == b.begin && a.end == b.end,
            _ => false,
        }
    }
}

impl Eq for Message {}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: [{}] {}", self.kind, loc, self.text),
            None => write!(f, "{}: {}", self.kind, self.text),
        }
    }
}

/// Append-only collection of diagnostics produced by a compilation.
///
/// # Examples
/// ```
/// use sluice_core::diagnostics::{Message, MessageKind, Report};
/// let mut report = Report::new();
/// report.push(Message::new(MessageKind::Warning, None, "unused variable 'x'"));
/// assert!(!report.has_errors());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    messages: Vec<Message>,
}

impl Report {
    pub fn new() -> Self {
        Report { messages: Vec::new() }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, others: impl IntoIterator<Item = Message>) {
        for m in others {
            self.push(m);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn contains(&self, message: &Message) -> bool {
        self.messages.iter().any(|m| m == message)
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.kind.is_error())
    }

    pub fn has_warnings(&self) -> bool {
        self.messages.iter().any(|m| m.kind == MessageKind::Warning)
    }

    pub fn count_of(&self, kind: MessageKind) -> usize {
        self.messages.iter().filter(|m| m.kind == kind).count()
    }

    /// Compares `expected` against `actual` as sets.
    ///
    /// Returns the messages present in `expected` but absent from `actual`
    /// (missing) and those present in `actual` but absent from `expected`
    /// (superfluous). Both empty means the reports agree.
    pub fn difference(expected: &Report, actual: &Report) -> (Vec<Message>, Vec<Message>) {
        let missing = expected
            .messages
            .iter()
            .filter(|m| !actual.contains(m))
            .cloned()
            .collect();
        let superfluous = actual
            .messages
            .iter()
            .filter(|m| !expected.contains(m))
            .cloned()
            .collect();
        (missing, superfluous)
    }

    pub fn print_all_pretty(&self, source: &str) {
        for m in &self.messages {
            m.pretty_with_source(source);
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.messages)
    }
}

impl PartialEq for Report {
    fn eq(&self, other: &Self) -> bool {
        let (missing, superfluous) = Report::difference(self, other);
        missing.is_empty() && superfluous.is_empty()
    }
}

impl Eq for Report {}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.messages {
            writeln!(f, "{}", m)?;
        }
        Ok(())
    }
}
