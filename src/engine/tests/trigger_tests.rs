//! Tests for detector triggers and runtime value lookups

use super::helpers::{engine, record_events};
use crate::engine::events::EngineEvent;
use crate::value::Value;

const WATCHERS: &str = r#"
var gold = 0
var fame = 0
var ready = false
var noticed = false

# watcher when gold, fame
ready = true

# alarm when gold
noticed = true
"#;

#[test]
fn test_triggers_fire_when_all_variables_have_changed() {
    let mut engine = engine(WATCHERS);

    assert_eq!(engine.check_triggers("gold"), [".alarm"]);
    let watcher = engine.block_state(".watcher").unwrap();
    assert_eq!(watcher.satisfied_triggers, ["gold"]);
    assert_eq!(watcher.unsatisfied_triggers, ["fame"]);

    assert_eq!(engine.check_triggers("fame"), [".watcher"]);
    assert!(engine
        .block_state(".watcher")
        .unwrap()
        .unsatisfied_triggers
        .is_empty());
}

#[test]
fn test_set_variable_checks_triggers_by_bare_name() {
    let mut engine = engine(WATCHERS);
    let log = record_events(&engine);

    engine.set_variable_value(".town.gold", Value::Num(5.0));

    assert_eq!(
        engine.get_runtime_value(".town.gold"),
        Some(Value::Num(5.0))
    );
    let events = log.borrow();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::SetVariable { id, .. } if id == ".town.gold")));
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::CheckTriggers { variable, ready }
            if variable == "gold" && *ready == [".alarm"]
    )));
}

#[test]
fn test_reset_triggers_rearms_a_detector() {
    let mut engine = engine(WATCHERS);
    engine.check_triggers("gold");

    engine.reset_triggers(".alarm");

    let alarm = engine.block_state(".alarm").unwrap();
    assert!(alarm.satisfied_triggers.is_empty());
    assert_eq!(alarm.unsatisfied_triggers, ["gold"]);
    assert_eq!(engine.check_triggers("gold"), [".alarm"]);
}

#[test]
fn test_unwatched_variables_touch_no_detectors() {
    let mut engine = engine(WATCHERS);
    let log = record_events(&engine);

    assert!(engine.check_triggers("luck").is_empty());

    assert!(log.borrow().is_empty());
    assert!(engine.block_state(".watcher").is_none());
}

#[test]
fn test_runtime_values_fall_back_to_execution_counts() {
    let mut engine = engine("# door\nknock knock\n");
    assert_eq!(engine.get_runtime_value(".door"), Some(Value::Num(0.0)));

    engine.enter_block(".door");
    engine.enter_block(".door");
    assert_eq!(engine.get_runtime_value(".door"), Some(Value::Num(2.0)));

    // A variable with the same id shadows the execution count
    engine.set_variable_value(".door", Value::Str("open".into()));
    assert_eq!(
        engine.get_runtime_value(".door"),
        Some(Value::Str("open".into()))
    );
    assert!(engine.get_runtime_value(".window").is_none());
}
