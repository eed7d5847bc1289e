//! Tests for snapshotting and restoring runtime state

use super::helpers::{engine, event_names, record_events, step_through};
use crate::engine::state::RuntimeSnapshot;
use crate::value::Value;

#[test]
fn test_snapshot_round_trips_runtime_state() {
    let mut engine = engine("# one\nfirst\nsecond\n\n# two\nlater\n");
    engine.enter_block(".one");
    engine.execute_command(".one");
    engine.finish_command(".one");
    engine.set_variable_value("seen", Value::Bool(true));

    let snapshot = engine.snapshot();

    step_through(&mut engine, ".one");
    engine.continue_block(".one");
    engine.set_variable_value("seen", Value::Bool(false));
    assert_eq!(engine.active_parent(), Some(".two"));

    engine.restore(snapshot);

    let one = engine.block_state(".one").unwrap();
    assert!(one.is_executing);
    assert_eq!(one.executing_index, Some(1));
    assert_eq!(one.times_executed(0), 1);
    assert_eq!(engine.get_runtime_value("seen"), Some(Value::Bool(true)));
    // Blocks untouched at snapshot time drop back to untouched
    assert!(engine.block_state(".two").is_none());
    assert!(engine.active_parent().is_none());
}

#[test]
fn test_snapshot_survives_json() {
    let mut engine = engine("# one\nfirst\n");
    engine.enter_block(".one");
    engine.set_variable_value("gold", Value::Num(7.0));

    let snapshot = engine.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let restored: RuntimeSnapshot = serde_json::from_str(&json).unwrap();

    assert_eq!(snapshot, restored);
}

#[test]
fn test_restore_is_silent_until_the_next_enter() {
    let mut engine = engine("# one\nfirst\n");
    engine.enter_block(".one");
    let snapshot = engine.snapshot();
    let log = record_events(&engine);

    engine.restore(snapshot);
    assert!(event_names(&log).is_empty());

    engine.enter_block(".one");
    assert!(event_names(&log).contains(&"active:.one".to_string()));
}
