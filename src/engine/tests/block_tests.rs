//! Tests for block construction, loading and command stepping

use super::helpers::{engine, event_names, record_events, step_through};
use crate::parser::token::TokenKind;

const TOWN: &str = r#"
# town
hello town

## square
a fountain

## gate
guards here

# forest
trees everywhere
"#;

/* ===================== Construction ===================== */

#[test]
fn test_blocks_mirror_sections() {
    let engine = engine(TOWN);

    assert!(engine.block("").is_some());
    let town = engine.block(".town").unwrap();
    assert_eq!(town.name, "town");
    assert_eq!(town.children, [".town.square", ".town.gate"]);
    // Heading tokens are not commands, prose is
    assert_eq!(town.commands.len(), 1);
    assert!(engine.block(".forest").unwrap().children.is_empty());
}

#[test]
fn test_start_block_prefers_root_commands() {
    let with_preamble = engine("welcome\n\n# one\nfirst\n");
    assert_eq!(with_preamble.start_block(), Some(String::new()));

    let without = engine("# one\nfirst\n\n# two\nsecond\n");
    assert_eq!(without.start_block(), Some(".one".to_string()));
}

/* ===================== Loading ===================== */

#[test]
fn test_enter_loads_ancestors_self_and_children() {
    let mut engine = engine(TOWN);
    let log = record_events(&engine);

    assert!(engine.enter_block(".town"));

    assert_eq!(
        event_names(&log),
        [
            "load:",
            "load:.town",
            "load:.town.square",
            "load:.town.gate",
            "active:.town",
            "execute:.town",
            "enter:.town",
        ]
    );
    assert!(engine.block_state(".forest").is_none());
    assert_eq!(engine.active_parent(), Some(".town"));
}

#[test]
fn test_enter_unloads_blocks_outside_the_family() {
    let mut engine = engine(TOWN);
    engine.enter_block(".town");
    let log = record_events(&engine);

    assert!(engine.enter_block(".forest"));

    assert_eq!(
        event_names(&log),
        [
            "unload:.town",
            "unload:.town.square",
            "unload:.town.gate",
            "load:.forest",
            "active:.forest",
            "execute:.forest",
            "enter:.forest",
        ]
    );
    assert!(!engine.block_state(".town").unwrap().loaded);
    assert!(engine.block_state("").unwrap().loaded);
}

#[test]
fn test_active_parent_announced_only_on_change() {
    let mut engine = engine(TOWN);
    engine.enter_block(".forest");
    let log = record_events(&engine);

    engine.enter_block(".forest");

    assert_eq!(event_names(&log), ["execute:.forest", "enter:.forest"]);
}

/* ===================== Stepping ===================== */

#[test]
fn test_cursor_walks_commands_in_order() {
    let mut engine = engine(
        r#"
# intro
one
two
three
"#,
    );
    engine.enter_block(".intro");

    let mut seen = Vec::new();
    while let Some(token) = engine.current_token(".intro") {
        match &token.kind {
            TokenKind::Action { text } => seen.push(text.clone()),
            other => panic!("unexpected command: {:?}", other),
        }
        engine.execute_command(".intro");
        engine.finish_command(".intro");
    }

    assert_eq!(seen, ["one", "two", "three"]);
    let state = engine.block_state(".intro").unwrap();
    assert!(state.has_finished);
    assert!(!state.is_executing);
    assert_eq!(state.previous_index, Some(2));
    assert_eq!(state.executing_index, None);
}

#[test]
fn test_reentering_resets_cursor_and_accumulates_counts() {
    let mut engine = engine(TOWN);
    engine.enter_block(".forest");
    step_through(&mut engine, ".forest");

    let finished = engine.block_state(".forest").unwrap();
    assert!(finished.has_finished);
    assert_eq!(finished.execution_count, 1);
    assert_eq!(finished.times_executed(0), 1);

    engine.enter_block(".forest");

    let state = engine.block_state(".forest").unwrap();
    assert!(state.is_executing);
    assert_eq!(state.executing_index, Some(0));
    assert_eq!(state.execution_count, 2);
    // Command counts survive a re-entry; only the cursor resets
    assert_eq!(state.times_executed(0), 1);
}

#[test]
fn test_stop_halts_without_finishing() {
    let mut engine = engine(TOWN);
    engine.enter_block(".forest");

    engine.stop_block(".forest");

    let state = engine.block_state(".forest").unwrap();
    assert!(!state.is_executing);
    assert!(!state.has_finished);
    assert!(state.loaded);
    assert!(engine.current_command(".forest").is_none());
}

#[test]
fn test_unknown_block_ids_are_silent_noops() {
    let mut engine = engine(TOWN);
    let log = record_events(&engine);

    assert!(!engine.enter_block(".nowhere"));
    assert!(!engine.execute_block(".nowhere"));
    engine.finish_command(".nowhere");
    engine.finish_block(".nowhere");
    engine.stop_block(".nowhere");
    engine.go_to_command_index(".nowhere", 3);
    assert!(!engine.choose_choice(".nowhere", 0));
    assert!(engine.current_command(".nowhere").is_none());

    assert!(event_names(&log).is_empty());
    assert!(engine.block_state(".nowhere").is_none());
}
