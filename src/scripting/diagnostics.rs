//! Translation of Rhai failures into script diagnostics.
//!
//! Rhai errors carry a structured [`rhai::Position`], which is the preferred
//! source of the line number. When no position is attached, the line is
//! recovered from the message text. When that fails too, the line is reported
//! as unknown (`-1`). Translation itself never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use rhai::EvalAltResult;
use std::fmt;

/// Source label attached to every script diagnostic.
pub const SCRIPT_SOURCE: &str = "script";

/// Line or column value meaning "unknown".
pub const UNKNOWN_POSITION: i32 = -1;

// Rhai appends "(line N, position M)"; older engines used "<cmd>#N)".
static LINE_MARKER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\(line (\d+)|#(\d+)\)").ok());

/// Broad category of a script failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    /// The script or function library failed to parse.
    Parse,
    /// The script failed while running.
    Runtime,
    /// The script ran past its wall-clock deadline.
    Timeout,
    /// The script exceeded an engine limit (operations, call depth, data size).
    LimitExceeded,
}

/// A failure inside the script runtime, with a best-effort location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// Human-readable message from the runtime.
    pub message: String,
    /// Where the failure originated; always [`SCRIPT_SOURCE`].
    pub source: String,
    /// 1-based line number, or [`UNKNOWN_POSITION`].
    pub line: i32,
    /// Column; not tracked, always [`UNKNOWN_POSITION`].
    pub column: i32,
    /// Category of the failure.
    pub kind: ScriptErrorKind,
}

impl ScriptError {
    /// The line number, if one was recovered.
    pub fn line_number(&self) -> Option<u32> {
        u32::try_from(self.line).ok().filter(|line| *line > 0)
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script error: {}", self.message)?;
        if let Some(line) = self.line_number() {
            if !self.message.contains("line") {
                write!(f, " at line {}", line)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

/// Convert a Rhai failure into a [`ScriptError`].
pub fn translate(error: &EvalAltResult) -> ScriptError {
    let message = error.to_string();
    let line = structured_line(error)
        .or_else(|| line_from_message(&message))
        .unwrap_or(UNKNOWN_POSITION);

    ScriptError {
        message,
        source: SCRIPT_SOURCE.to_string(),
        line,
        column: UNKNOWN_POSITION,
        kind: classify(error),
    }
}

fn structured_line(error: &EvalAltResult) -> Option<i32> {
    error
        .position()
        .line()
        .and_then(|line| i32::try_from(line).ok())
}

/// Recover a line number from the text of an error message.
pub fn line_from_message(message: &str) -> Option<i32> {
    let marker = LINE_MARKER.as_ref()?;
    let captures = marker.captures(message)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

fn classify(error: &EvalAltResult) -> ScriptErrorKind {
    match error {
        EvalAltResult::ErrorParsing(..) => ScriptErrorKind::Parse,
        EvalAltResult::ErrorTerminated(..) => ScriptErrorKind::Timeout,
        EvalAltResult::ErrorTooManyOperations(..)
        | EvalAltResult::ErrorStackOverflow(..)
        | EvalAltResult::ErrorDataTooLarge(..) => ScriptErrorKind::LimitExceeded,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => classify(inner),
        _ => ScriptErrorKind::Runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::{Engine, Position};

    #[test]
    fn test_structured_position_is_preferred() {
        let mut engine = Engine::new();
        engine.set_fast_operators(false);
        let err = engine
            .eval::<rhai::Dynamic>("let x = 1;\nlet y = 0;\nx / y")
            .unwrap_err();
        assert!(err.to_string().contains("Division by zero"));
        let script_err = translate(&err);
        assert_eq!(script_err.line, 3);
        assert_eq!(script_err.column, UNKNOWN_POSITION);
        assert_eq!(script_err.source, SCRIPT_SOURCE);
        assert_eq!(script_err.kind, ScriptErrorKind::Runtime);
    }

    #[test]
    fn test_thrown_value_reports_its_line() {
        let engine = Engine::new();
        let err = engine
            .eval::<rhai::Dynamic>("let x = 1;\n\nthrow \"boom\";")
            .unwrap_err();
        assert_eq!(translate(&err).line, 3);
    }

    #[test]
    fn test_parse_error_kind() {
        let engine = Engine::new();
        let err = engine.eval::<rhai::Dynamic>("let x = ;").unwrap_err();
        let script_err = translate(&err);
        assert_eq!(script_err.kind, ScriptErrorKind::Parse);
        assert_eq!(script_err.line_number(), Some(1));
    }

    #[test]
    fn test_message_fallback_without_position() {
        let err = EvalAltResult::ErrorRuntime("failed at <cmd>#7)".into(), Position::NONE);
        assert_eq!(translate(&err).line, 7);

        let err = EvalAltResult::ErrorRuntime("boom (line 12, position 3)".into(), Position::NONE);
        assert_eq!(translate(&err).line, 12);
    }

    #[test]
    fn test_unknown_line_is_minus_one() {
        let err = EvalAltResult::ErrorRuntime("no marker here".into(), Position::NONE);
        let script_err = translate(&err);
        assert_eq!(script_err.line, UNKNOWN_POSITION);
        assert_eq!(script_err.line_number(), None);

        // a marker with an unparsable number is not an error either
        assert_eq!(line_from_message("#99999999999)"), None);
    }

    #[test]
    fn test_display_mentions_line() {
        let err = ScriptError {
            message: "division by zero".to_string(),
            source: SCRIPT_SOURCE.to_string(),
            line: 4,
            column: UNKNOWN_POSITION,
            kind: ScriptErrorKind::Runtime,
        };
        assert_eq!(err.to_string(), "Script error: division by zero at line 4");
    }
}
