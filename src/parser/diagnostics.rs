//! Parse diagnostics
//!
//! Diagnostics carry absolute byte offsets into the source text so an
//! editor can map them straight onto the document. Offsets are clamped
//! to the owning line when they are pushed, so a downstream consumer
//! never sees an empty or out-of-range span.

use serde::{Deserialize, Serialize};

/// Severity levels for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Informational; nothing needs to change
    Info,
    /// Should probably be fixed - potential mistake
    Warning,
    /// Must be fixed - the script is incorrect
    Error,
}

/// A quick-fix or navigation hint an editor can attach to a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum DiagnosticAction {
    /// Replace the span `from..to` with `text`.
    Replace { from: usize, to: usize, text: String },
    /// Move the cursor to `from..to` (e.g. a conflicting declaration).
    Focus { from: usize, to: usize },
}

/// A diagnostic message produced while parsing or resolving a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Absolute byte offset where the issue starts
    pub from: usize,
    /// Absolute byte offset where the issue ends (exclusive)
    pub to: usize,
    /// Severity level
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Which stage produced this diagnostic (e.g. "parser", "expression")
    #[serde(skip_deserializing)]
    pub source: &'static str,
    /// Optional quick fixes and navigation targets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<DiagnosticAction>,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(from: usize, to: usize, message: impl Into<String>, source: &'static str) -> Self {
        Self {
            from,
            to,
            severity: Severity::Error,
            message: message.into(),
            source,
            actions: Vec::new(),
        }
    }

    /// Create a new warning diagnostic
    pub fn warning(
        from: usize,
        to: usize,
        message: impl Into<String>,
        source: &'static str,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(from, to, message, source)
        }
    }

    /// Create a new info diagnostic
    pub fn info(from: usize, to: usize, message: impl Into<String>, source: &'static str) -> Self {
        Self {
            severity: Severity::Info,
            ..Self::error(from, to, message, source)
        }
    }

    /// Attach an action to this diagnostic.
    pub fn with_action(mut self, action: DiagnosticAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Clamp the span to a valid, non-empty range inside the owning line.
    ///
    /// `line_from..line_to` are the absolute offsets of the line's
    /// content. A collapsed span is widened by one byte so editors
    /// always have something to underline.
    pub fn clamped(mut self, line_from: usize, line_to: usize) -> Self {
        let end = line_to.max(line_from + 1);
        self.from = self.from.clamp(line_from, end - 1);
        self.to = self.to.clamp(self.from, end);
        if self.to == self.from {
            self.to = self.from + 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping_keeps_spans_inside_the_line() {
        let d = Diagnostic::error(2, 40, "x", "parser").clamped(10, 20);
        assert_eq!((d.from, d.to), (10, 20));

        let d = Diagnostic::error(15, 12, "x", "parser").clamped(10, 20);
        assert!(d.from < d.to);
        assert!(d.from >= 10 && d.to <= 20);
    }

    #[test]
    fn clamping_widens_collapsed_spans() {
        let d = Diagnostic::warning(14, 14, "x", "parser").clamped(10, 20);
        assert_eq!((d.from, d.to), (14, 15));

        // Empty line still yields a one-byte span
        let d = Diagnostic::error(10, 10, "x", "parser").clamped(10, 10);
        assert_eq!((d.from, d.to), (10, 11));
    }

    #[test]
    fn severity_orders_by_weight() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
