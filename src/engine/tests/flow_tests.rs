//! Tests for control flow between blocks: continuing, calling,
//! returning, choices and condition navigation

use super::helpers::{engine, record_events, step_through};
use crate::engine::events::EngineEvent;
use crate::value::Value;

/* ===================== Continue ===================== */

#[test]
fn test_continue_falls_through_to_the_next_section() {
    let mut engine = engine("# one\nfirst\n\n# two\nsecond\n");
    engine.enter_block(".one");
    step_through(&mut engine, ".one");

    assert!(engine.continue_block(".one"));

    assert_eq!(engine.active_parent(), Some(".two"));
    assert!(engine.block_state(".two").unwrap().is_executing);
}

#[test]
fn test_continue_skips_callable_blocks() {
    let source = r#"
# one
first

# helper -> number
< 1

# two
second
"#;
    let mut engine = engine(source);
    engine.enter_block(".one");
    step_through(&mut engine, ".one");

    assert!(engine.continue_block(".one"));

    assert_eq!(engine.active_parent(), Some(".two"));
}

#[test]
fn test_continue_at_the_end_returns_false() {
    let mut engine = engine("# only\nalone\n");
    engine.enter_block(".only");
    step_through(&mut engine, ".only");

    assert!(!engine.continue_block(".only"));
    assert_eq!(engine.active_parent(), Some(".only"));
}

#[test]
fn test_continue_returns_to_caller_when_asked() {
    let mut engine = engine("# one\nfirst\n\n# two\nsecond\nmore\n");
    engine.enter_block(".two");
    engine.call_block(".two", ".one");
    engine.set_return_when_finished(".one", false);
    step_through(&mut engine, ".one");

    assert!(engine.block_state(".one").unwrap().has_finished);
    assert!(!engine.block_state(".two").unwrap().is_executing);

    engine.set_return_when_finished(".one", true);
    assert!(engine.continue_block(".one"));

    let two = engine.block_state(".two").unwrap();
    assert!(two.is_executing);
    assert_eq!(two.returned_from, Some(".one".to_string()));
}

/* ===================== Calls and Returns ===================== */

#[test]
fn test_call_and_return_round_trip() {
    let source = r#"
# main
start
greet()
end

# greet -> number
< 40 + 2
"#;
    let mut engine = engine(source);
    engine.enter_block(".main");
    engine.execute_command(".main");
    engine.finish_command(".main");
    // Cursor now sits on the call
    assert_eq!(
        engine.block_state(".main").unwrap().executing_index,
        Some(1)
    );

    assert!(engine.call_block(".main", ".greet"));
    assert!(!engine.block_state(".main").unwrap().is_executing);
    assert!(engine.block_state(".greet").unwrap().is_executing);

    assert!(engine.return_from_block(".greet", Some(Value::Num(42.0))));

    let main = engine.block_state(".main").unwrap();
    assert!(main.is_executing);
    assert_eq!(main.executing_index, Some(2));
    assert_eq!(main.returned_from, Some(".greet".to_string()));
    assert_eq!(
        engine.get_runtime_value(".greet.return"),
        Some(Value::Num(42.0))
    );
    let greet = engine.block_state(".greet").unwrap();
    assert!(greet.has_returned);
    assert!(!greet.is_executing);
}

#[test]
fn test_return_without_caller_reports_false() {
    let mut engine = engine("# lone\nhello\n");
    engine.enter_block(".lone");
    let log = record_events(&engine);

    assert!(!engine.return_from_block(".lone", None));

    let state = engine.block_state(".lone").unwrap();
    assert!(state.has_returned);
    assert!(state.has_finished);
    assert!(!state.is_executing);
    assert!(engine.get_runtime_value(".lone.return").is_none());
    assert!(log.borrow().iter().any(|event| matches!(
        event,
        EngineEvent::ReturnedFromBlock {
            caller_id: None,
            value: None,
            ..
        }
    )));
}

#[test]
fn test_finishing_a_called_block_returns_and_cascades() {
    let mut engine = engine("# main\nstart\n\n# aside\na note\n");
    engine.enter_block(".main");
    engine.call_block(".main", ".aside");

    step_through(&mut engine, ".aside");

    let aside = engine.block_state(".aside").unwrap();
    assert!(aside.has_returned);
    assert!(!aside.return_when_finished);
    // The call was the caller's last command, so the return cascades
    // into finishing the caller too
    let main = engine.block_state(".main").unwrap();
    assert!(main.has_finished);
    assert_eq!(main.returned_from, Some(".aside".to_string()));
    assert!(engine.get_runtime_value(".aside.return").is_none());
}

/* ===================== Choices ===================== */

#[test]
fn test_choices_are_counted_per_command() {
    let source = r#"
# hub
pick a door

* the red door > red
* the blue door > blue

# red
warm inside

# blue
cold inside
"#;
    let mut engine = engine(source);
    // Prose, group start, two choices, group end
    assert_eq!(engine.block(".hub").unwrap().commands.len(), 5);

    assert!(engine.choose_choice(".hub", 2));
    assert!(engine.choose_choice(".hub", 2));
    assert!(engine.choose_choice(".hub", 3));
    // Not a choice command
    assert!(!engine.choose_choice(".hub", 0));

    let state = engine.block_state(".hub").unwrap();
    assert_eq!(state.times_chosen(2), 2);
    assert_eq!(state.times_chosen(3), 1);
    assert_eq!(state.times_chosen(0), 0);
}

/* ===================== Cursor Jumps ===================== */

#[test]
fn test_command_jump_stack_restores_the_cursor() {
    let mut engine = engine("# walk\none\ntwo\nthree\n");
    engine.enter_block(".walk");

    engine.push_command_jump(".walk");
    engine.go_to_command_index(".walk", 2);
    assert_eq!(
        engine.block_state(".walk").unwrap().executing_index,
        Some(2)
    );

    assert_eq!(engine.pop_command_jump(".walk"), Some(0));
    assert_eq!(
        engine.block_state(".walk").unwrap().executing_index,
        Some(0)
    );
    assert_eq!(engine.pop_command_jump(".walk"), None);
}

#[test]
fn test_matching_close_pairs_by_indent() {
    let source = r#"
var open = true
var friend = true

# gate
if open
    welcome in
    if friend
        a hug for you
come again
"#;
    let engine = engine(source);
    // if, prose, nested if, prose, nested close, outer close, prose
    assert_eq!(engine.block(".gate").unwrap().commands.len(), 7);

    assert_eq!(engine.matching_close(".gate", 0), Some(5));
    assert_eq!(engine.matching_close(".gate", 2), Some(4));
    // Prose has no matching close
    assert_eq!(engine.matching_close(".gate", 1), None);
}
