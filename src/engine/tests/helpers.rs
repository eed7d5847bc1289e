//! Test helpers for engine tests
//!
//! Common utilities for building engines from script source and
//! recording the events they emit.

use crate::engine::events::EngineEvent;
use crate::engine::BlockEngine;
use crate::parser::parse_text;
use std::cell::RefCell;
use std::rc::Rc;

/// Parse a script and build an engine over it.
///
/// Asserts the script itself parses without errors so engine tests
/// never chase parser problems.
pub fn engine(source: &str) -> BlockEngine {
    let result = parse_text(source);
    assert!(
        !result.has_errors(),
        "script should parse cleanly: {:?}",
        result.diagnostics
    );
    BlockEngine::new(&result)
}

/// Subscribe a recorder; every event the engine emits afterwards lands
/// in the returned log.
pub fn record_events(engine: &BlockEngine) -> Rc<RefCell<Vec<EngineEvent>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    engine.events.subscribe(Rc::new(move |event: &EngineEvent| {
        sink.borrow_mut().push(event.clone());
    }));
    log
}

/// Compact `kind:block` tags for an event log, for comparing whole
/// sequences in one assertion.
pub fn event_names(log: &Rc<RefCell<Vec<EngineEvent>>>) -> Vec<String> {
    log.borrow().iter().map(event_name).collect()
}

fn event_name(event: &EngineEvent) -> String {
    match event {
        EngineEvent::ActiveParentChanged { block_id } => format!("active:{block_id}"),
        EngineEvent::LoadBlock { block_id } => format!("load:{block_id}"),
        EngineEvent::UnloadBlock { block_id } => format!("unload:{block_id}"),
        EngineEvent::ExecuteBlock { block_id } => format!("execute:{block_id}"),
        EngineEvent::EnterBlock { block_id } => format!("enter:{block_id}"),
        EngineEvent::FinishBlock { block_id } => format!("finish:{block_id}"),
        EngineEvent::StopBlock { block_id } => format!("stop:{block_id}"),
        EngineEvent::ReturnedFromBlock { block_id, .. } => format!("returned:{block_id}"),
        EngineEvent::ContinueBlock { block_id } => format!("continue:{block_id}"),
        EngineEvent::ChooseChoice { block_id, command } => {
            format!("choose:{block_id}:{command}")
        }
        EngineEvent::ExecuteCommand {
            block_id, command, ..
        } => format!("command:{block_id}:{command}"),
        EngineEvent::FinishCommand { block_id, command } => {
            format!("done:{block_id}:{command}")
        }
        EngineEvent::GoToCommandIndex { block_id, command } => {
            format!("goto:{block_id}:{command}")
        }
        EngineEvent::CheckTriggers { variable, .. } => format!("triggers:{variable}"),
        EngineEvent::SetVariable { id, .. } => format!("set:{id}"),
    }
}

/// Run the cursor over every command of a block, finishing each one.
pub fn step_through(engine: &mut BlockEngine, id: &str) {
    while engine.execute_command(id).is_some() {
        engine.finish_command(id);
    }
}
