//! Build script parser.
//!
//! Turns script text into an ordered list of [`Operation`]s. Bad lines are
//! recorded and skipped; they never abort parsing.

use std::path::Path;

use vocker_shared::errors::{VockerError, VockerResult};

use super::operation::Operation;

/// A script line that could not be turned into an operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based line where the logical line starts.
    pub line: usize,
    pub keyword: Option<String>,
    pub message: String,
}

/// Result of parsing a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parsed {
    pub operations: Vec<Operation>,
    pub errors: Vec<ParseError>,
}

/// Parse script text.
pub fn parse(text: &str) -> Parsed {
    let mut parsed = Parsed::default();

    for (line, content) in logical_lines(text) {
        let content = content.trim();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }

        match parse_line(line, content) {
            Ok(op) => {
                tracing::debug!("Parsed line {}: {}", line, op);
                parsed.operations.push(op);
            }
            Err(e) => {
                tracing::error!("Parse error: {}", e);
                parsed.errors.push(e);
            }
        }
    }

    parsed
}

/// Read and parse a script file.
pub fn parse_file(path: &Path) -> VockerResult<Parsed> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        VockerError::Storage(format!(
            "Failed to read build file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(parse(&text))
}

fn parse_line(line: usize, content: &str) -> Result<Operation, ParseError> {
    let Some((keyword, args)) = content.split_once(char::is_whitespace) else {
        return Err(ParseError {
            line,
            keyword: Some(content.to_string()),
            message: format!("Missing arguments for '{}'", content),
        });
    };

    Operation::from_directive(keyword, args.trim()).ok_or_else(|| ParseError {
        line,
        keyword: Some(keyword.to_string()),
        message: format!("Unknown directive '{}'", keyword),
    })
}

/// Join `\`-continued lines with a single space.
///
/// Yields `(start_line, text)` with 1-based line numbers.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let (start, mut buf) = pending.take().unwrap_or((idx + 1, String::new()));

        match raw.strip_suffix('\\') {
            Some(head) => {
                buf.push_str(head);
                buf.push(' ');
                pending = Some((start, buf));
            }
            None => {
                buf.push_str(raw);
                out.push((start, buf));
            }
        }
    }

    // Trailing continuation at end of input
    if let Some(last) = pending {
        out.push(last);
    }

    out
}
