//! Test helpers for parser tests
//!
//! Small wrappers for parsing fixtures and slicing the result by
//! severity or token kind.

use crate::parser::diagnostics::Severity;
use crate::parser::token::{Token, TokenKind, TokenTag};
use crate::parser::{parse_text, ParseResult};

/// Parse a script and assert it produced no diagnostics at all.
pub fn parse_clean(source: &str) -> ParseResult {
    let result = parse_text(source);
    assert!(
        result.diagnostics.is_empty(),
        "unexpected diagnostics: {:#?}",
        result.diagnostics
    );
    result
}

/// Error messages, in emission order.
pub fn errors(result: &ParseResult) -> Vec<&str> {
    messages(result, Severity::Error)
}

/// Warning messages, in emission order.
pub fn warnings(result: &ParseResult) -> Vec<&str> {
    messages(result, Severity::Warning)
}

fn messages(result: &ParseResult, severity: Severity) -> Vec<&str> {
    result
        .diagnostics
        .iter()
        .filter(|d| d.severity == severity)
        .map(|d| d.message.as_str())
        .collect()
}

/// The tag of every token in stream order, merged-away ones included.
pub fn token_tags(result: &ParseResult) -> Vec<TokenTag> {
    result.tokens.iter().map(|t| t.tag()).collect()
}

/// Tokens that were not absorbed by a display merge.
pub fn live_tokens(result: &ParseResult) -> Vec<&Token> {
    result.tokens.iter().filter(|t| !t.ignored).collect()
}

/// First token whose kind satisfies the predicate; panics when none
/// does.
pub fn find_token<'a>(
    result: &'a ParseResult,
    predicate: impl Fn(&TokenKind) -> bool,
) -> &'a Token {
    result
        .tokens
        .iter()
        .find(|t| predicate(&t.kind))
        .unwrap_or_else(|| panic!("no matching token in {:#?}", result.tokens))
}
