//! file: cli/src/harness.rs
//! description: the expected-diagnostics test harness.
//!
//! A test script may end in a `# ----` line followed by expected messages:
//!
//! ```text
//! # <Kind>: [line:col..line:col] text
//! #     continued text
//! ```
//!
//! Kind is one of TokenError, SyntaxError, TypeError, Warning, LinkError.
//! The location is optional and `..end` defaults to the begin position.
//! Since the whole section is comments, the script is compiled as-is and
//! the actual report is compared set-wise against the expectations.

use std::fs;
use std::path::Path;

use glob::glob;
use sluice_core::diagnostics::{Message, MessageKind, Report};
use sluice_core::location::{Location, Span};
use sluice_core::{sema, Runtime};

use crate::tester::{MAIN_API, SETUP_API};

/// Result of checking one script.
pub struct Outcome {
    pub file: String,
    /// Expected but not produced.
    pub missing: Vec<Message>,
    /// Produced but not expected.
    pub superfluous: Vec<Message>,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.superfluous.is_empty()
    }
}

/// Parses the `# ----` trailer of `source` into the expected report.
pub fn parse_expectations(source: &str, file: &str) -> Report {
    let mut expected = Report::new();
    let mut lines = source.lines();
    for line in lines.by_ref() {
        if line.trim() == "# ----" {
            break;
        }
    }

    let mut pending: Option<Message> = None;
    for line in lines {
        let Some(body) = line.trim_start().strip_prefix('#') else {
            continue;
        };
        // An indented line continues the previous message text.
        if (body.starts_with(' ') || body.starts_with('\t'))
            && parse_message_line(body.trim(), file).is_none()
        {
            if let Some(message) = &mut pending {
                message.text.push(' ');
                message.text.push_str(body.trim());
            }
            continue;
        }
        if let Some(message) = parse_message_line(body.trim(), file) {
            if let Some(done) = pending.take() {
                expected.push(done);
            }
            pending = Some(message);
        }
    }
    if let Some(done) = pending.take() {
        expected.push(done);
    }
    expected
}

fn parse_message_line(line: &str, file: &str) -> Option<Message> {
    let colon = line.find(':')?;
    let kind: MessageKind = line[..colon].trim().parse().ok()?;
    let mut rest = line[colon + 1..].trim_start();

    let mut location = None;
    if let Some(after) = rest.strip_prefix('[') {
        let close = after.find(']')?;
        location = parse_location(&after[..close], file);
        rest = after[close + 1..].trim_start();
    }
    Some(Message::new(kind, location, rest))
}

fn parse_location(text: &str, file: &str) -> Option<Span> {
    let (begin, end) = match text.split_once("..") {
        Some((b, e)) => (parse_position(b)?, parse_position(e)?),
        None => {
            let at = parse_position(text)?;
            (at, at)
        }
    };
    Some(Span::new(file, begin, end))
}

fn parse_position(text: &str) -> Option<Location> {
    let (line, column) = text.trim().split_once(':')?;
    Some(Location::new(line.trim().parse().ok()?, column.trim().parse().ok()?))
}

/// Compiles `source` against the tester runtime, validates the phase APIs,
/// links, and returns the full diagnostics report.
pub fn compile_report(source: &str, file: &str, runtime: &Runtime, level: u8) -> Report {
    let mut report = Report::new();

    let Some(unit) = sluice_core::parse(source, file, runtime, &mut report) else {
        return report;
    };
    sema::validate_api(&unit, "setup", SETUP_API, runtime, &mut report);
    sema::validate_api(&unit, "main", MAIN_API, runtime, &mut report);
    if report.has_errors() {
        return report;
    }

    let Some(mut ir) = sluice_core::lower(&unit, &["setup", "main"], &mut report) else {
        return report;
    };
    if !runtime.verify_native_calls(&mut ir, &mut report) {
        return report;
    }
    sluice_core::optimize(&mut ir, level);

    let mut program = sluice_core::codegen(&ir);
    program.link(runtime, &mut report);
    report
}

/// Checks one script file against its embedded expectations.
pub fn check_source(source: &str, file: &str, runtime: &Runtime) -> Outcome {
    let expected = parse_expectations(source, file);
    let actual = compile_report(source, file, runtime, 2);
    let (missing, superfluous) = Report::difference(&expected, &actual);
    Outcome { file: file.to_string(), missing, superfluous }
}

pub fn check_file(path: &Path, runtime: &Runtime) -> std::io::Result<Outcome> {
    let source = fs::read_to_string(path)?;
    Ok(check_source(&source, &path.to_string_lossy(), runtime))
}

/// Runs every `*.sl` file under `path` (recursively for directories).
pub fn run_suite(path: &Path, runtime: &Runtime) -> std::io::Result<Vec<Outcome>> {
    let mut outcomes = Vec::new();
    if path.is_dir() {
        let pattern = format!("{}/**/*.sl", path.display());
        for entry in glob(&pattern).map_err(|e| std::io::Error::other(e.to_string()))? {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            outcomes.push(check_file(&entry, runtime)?);
        }
    } else {
        outcomes.push(check_file(path, runtime)?);
    }
    Ok(outcomes)
}
