//! Tests for the built-in evaluator

use super::{EvalContext, Evaluator, StandardEvaluator};
use crate::value::Value;
use maplit::hashmap;

fn eval(expression: &str, context: EvalContext) -> super::Evaluation {
    StandardEvaluator.evaluate(expression, &context)
}

fn eval_value(expression: &str, context: EvalContext) -> Value {
    eval(expression, context)
        .result
        .expect("expression should evaluate")
}

#[test]
fn test_literals() {
    assert_eq!(eval_value("42", hashmap! {}), Value::Num(42.0));
    assert_eq!(eval_value("4.5", hashmap! {}), Value::Num(4.5));
    assert_eq!(eval_value("true", hashmap! {}), Value::Bool(true));
    assert_eq!(
        eval_value("\"hello\"", hashmap! {}),
        Value::Str("hello".into())
    );
}

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(eval_value("1 + 2 * 3", hashmap! {}), Value::Num(7.0));
    assert_eq!(eval_value("(1 + 2) * 3", hashmap! {}), Value::Num(9.0));
    assert_eq!(eval_value("10 - 2 - 3", hashmap! {}), Value::Num(5.0));
    assert_eq!(eval_value("-4 + 10", hashmap! {}), Value::Num(6.0));
}

#[test]
fn test_comparison_and_logic() {
    assert_eq!(eval_value("2 < 3", hashmap! {}), Value::Bool(true));
    assert_eq!(eval_value("2 >= 3", hashmap! {}), Value::Bool(false));
    assert_eq!(
        eval_value("1 < 2 and 3 < 4", hashmap! {}),
        Value::Bool(true)
    );
    assert_eq!(
        eval_value("not (1 == 1) || true", hashmap! {}),
        Value::Bool(true)
    );
    assert_eq!(eval_value("\"a\" == \"a\"", hashmap! {}), Value::Bool(true));
    // Cross-type equality is a plain false, not an error.
    let result = eval("1 == \"1\"", hashmap! {});
    assert_eq!(result.result, Some(Value::Bool(false)));
    assert!(result.diagnostics.is_empty());
}

#[test]
fn test_logic_keeps_deciding_operand() {
    let ctx = hashmap! { "name".to_string() => Value::Str("Ada".into()) };
    assert_eq!(
        eval_value("name or \"stranger\"", ctx),
        Value::Str("Ada".into())
    );
    assert_eq!(
        eval_value("\"\" or \"stranger\"", hashmap! {}),
        Value::Str("stranger".into())
    );
    assert_eq!(eval_value("0 and true", hashmap! {}), Value::Num(0.0));
}

#[test]
fn test_string_concatenation_coerces() {
    let ctx = hashmap! { "gold".to_string() => Value::Num(12.0) };
    assert_eq!(
        eval_value("\"gold: \" + gold", ctx),
        Value::Str("gold: 12".into())
    );
}

#[test]
fn test_references_carry_offsets() {
    let ctx = hashmap! { "gold".to_string() => Value::Num(5.0) };
    let result = eval("gold + bonus", ctx);

    assert_eq!(result.result, None); // bonus has no value
    assert_eq!(result.references.len(), 2);
    assert_eq!(result.references[0].name, "gold");
    assert_eq!((result.references[0].from, result.references[0].to), (0, 4));
    assert_eq!(result.references[1].name, "bonus");
    assert_eq!((result.references[1].from, result.references[1].to), (7, 12));
    assert!(result.diagnostics.is_empty());
}

#[test]
fn test_references_survive_short_circuit() {
    // `false and x` decides on the left, but the right side is still
    // walked so the editor sees the reference.
    let result = eval("false and missing", hashmap! {});
    assert_eq!(result.result, Some(Value::Bool(false)));
    assert_eq!(result.references.len(), 1);
    assert_eq!(result.references[0].name, "missing");
}

#[test]
fn test_call_suffix_marks_reference() {
    let result = eval("damage() + 1", hashmap! {});
    assert_eq!(result.references.len(), 1);
    assert!(result.references[0].call);
    assert_eq!(result.references[0].name, "damage");
}

#[test]
fn test_type_mismatch_produces_diagnostic() {
    let result = eval("1 - \"a\"", hashmap! {});
    assert_eq!(result.result, None);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].message, "Cannot subtract number and string");
    // The diagnostic points at the operator.
    assert_eq!((result.diagnostics[0].from, result.diagnostics[0].to), (2, 3));
}

#[test]
fn test_division_by_zero_is_flagged() {
    let result = eval("10 / 0", hashmap! {});
    assert_eq!(result.result, None);
    assert_eq!(result.diagnostics[0].message, "Division by zero");
}

#[test]
fn test_syntax_error_produces_diagnostic() {
    let result = eval("1 + + 2", hashmap! {});
    assert_eq!(result.result, None);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].message, "Invalid expression");
    assert!(result.diagnostics[0].to > result.diagnostics[0].from);
}

#[test]
fn test_format_renders_groups() {
    let ctx = hashmap! { "gold".to_string() => Value::Num(3.0) };
    let formatted = StandardEvaluator.format("You have {gold} coins", &ctx);
    assert_eq!(formatted.text, "You have 3 coins");
    assert_eq!(formatted.segments.len(), 1);
    assert_eq!(formatted.segments[0].content, "gold");
    assert_eq!(formatted.segments[0].from, 10);
}

#[test]
fn test_format_splits_alternatives() {
    let formatted = StandardEvaluator.format("{a| b |c}", &hashmap! {});
    let contents: Vec<&str> = formatted
        .segments
        .iter()
        .map(|s| s.content.as_str())
        .collect();
    assert_eq!(contents, vec!["a", "b", "c"]);
    assert_eq!(formatted.segments[0].from, 1);
    assert_eq!(formatted.segments[1].from, 4);
    assert_eq!(formatted.segments[2].from, 7);
}

#[test]
fn test_format_falls_back_across_alternatives() {
    let ctx = hashmap! { "name".to_string() => Value::Str("Ada".into()) };
    let formatted = StandardEvaluator.format("Hello {hero|name|\"stranger\"}!", &ctx);
    assert_eq!(formatted.text, "Hello Ada!");
}

#[test]
fn test_format_ignores_pipes_inside_strings() {
    let formatted = StandardEvaluator.format("{\"a|b\"|c}", &hashmap! {});
    let contents: Vec<&str> = formatted
        .segments
        .iter()
        .map(|s| s.content.as_str())
        .collect();
    assert_eq!(contents, vec!["\"a|b\"", "c"]);
    assert_eq!(formatted.text, "a|b");
}

#[test]
fn test_format_leaves_unmatched_braces_alone() {
    let formatted = StandardEvaluator.format("a { b", &hashmap! {});
    assert_eq!(formatted.text, "a { b");
    assert!(formatted.segments.is_empty());
}
