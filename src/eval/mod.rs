//! Expression evaluation
//!
//! Neither the parser nor the engine interprets expression text; both
//! hand it to an [`Evaluator`] along with the values visible at the
//! call site. The trait keeps that boundary swappable: the built-in
//! [`StandardEvaluator`] covers the stock grammar, and a host embedding
//! the crate can provide its own.
//!
//! All offsets in an [`Evaluation`] are relative to the expression
//! text that was passed in; callers add the expression's own offset to
//! map them onto the document.

mod standard;

#[cfg(test)]
mod tests;

pub use standard::StandardEvaluator;

use crate::value::Value;
use std::collections::HashMap;

/// Names visible to an expression, with their current values.
pub type EvalContext = HashMap<String, Value>;

/// Outcome of evaluating one expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// The computed value; `None` when a referenced name had no value
    /// or the expression did not parse
    pub result: Option<Value>,
    /// Every name the expression mentioned, in reading order
    pub references: Vec<EvalReference>,
    /// Problems found while evaluating
    pub diagnostics: Vec<EvalDiagnostic>,
}

/// A name an expression referred to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalReference {
    pub from: usize,
    pub to: usize,
    pub name: String,
    /// True when the name was invoked with `()`
    pub call: bool,
}

/// A problem found while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalDiagnostic {
    pub from: usize,
    pub to: usize,
    pub message: String,
}

/// One alternative of a `{a|b|c}` template group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSegment {
    /// The alternative's text, trimmed
    pub content: String,
    /// Offset of the trimmed text within the template
    pub from: usize,
}

/// A rendered template plus its split-out group alternatives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Formatted {
    /// The template with each `{...}` group replaced by the first
    /// alternative that evaluated
    pub text: String,
    /// Every group alternative, in reading order
    pub segments: Vec<TemplateSegment>,
}

/// Boundary between the script pipeline and expression semantics.
pub trait Evaluator {
    /// Evaluate one expression against the given context.
    fn evaluate(&self, expression: &str, context: &EvalContext) -> Evaluation;

    /// Render a template, splitting `{a|b|c}` groups into segments.
    fn format(&self, template: &str, context: &EvalContext) -> Formatted;
}
