//! Tests for section scope rules and reachability

use super::helpers::{errors, find_token, parse_clean, warnings};
use crate::parser::parse_text;
use crate::parser::token::{TokenKind, TokenTag};

#[test]
fn test_functions_reject_display_and_flow_lines() {
    let source = r#"
# town

# damage -> number

Narration here.

> town

< 2
"#;
    let result = parse_text(source);
    assert_eq!(
        errors(&result),
        [
            "A function cannot contain action text",
            "A function cannot contain a jump"
        ]
    );
    assert_eq!(warnings(&result), ["This line can never be reached"]);
}

#[test]
fn test_detectors_reject_display_flow_and_returns() {
    let source = r#"
var alarm = false

# watch when alarm

@guard
< 1
"#;
    let result = parse_text(source);
    assert_eq!(
        errors(&result),
        [
            "A detector cannot contain a character cue",
            "A detector cannot contain a return"
        ]
    );
}

#[test]
fn test_detectors_may_assign_and_branch() {
    let source = r#"
var alarm = false
var count = 0

# watch when alarm

if alarm
    count += 1
"#;
    let result = parse_clean(source);
    let tags: Vec<TokenTag> = result
        .tokens
        .iter()
        .filter(|t| t.section_id == ".watch")
        .map(|t| t.tag())
        .collect();
    assert_eq!(
        tags,
        [
            TokenTag::Section,
            TokenTag::Condition,
            TokenTag::Assign,
            TokenTag::Condition
        ]
    );
}

#[test]
fn test_unreachable_lines_warn_once_per_region() {
    let source = r#"
# town

> market

First orphan.
Second orphan.

# market

Fresh start.
"#;
    let result = parse_text(source);
    assert!(errors(&result).is_empty());
    assert_eq!(warnings(&result), ["This line can never be reached"]);
}

#[test]
fn test_a_conditional_jump_does_not_terminate_the_region() {
    let source = r#"
# town

var armed = true

if armed
    > market

Still here.

# market
"#;
    let result = parse_clean(source);
    let jump = find_token(&result, |k| matches!(k, TokenKind::Jump { .. }));
    assert_eq!(jump.indent, 1);
}
