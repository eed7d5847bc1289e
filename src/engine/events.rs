//! Engine event stream
//!
//! Every state transition the engine makes is announced as an
//! [`EngineEvent`] so hosts can drive rendering, autosave or analytics
//! without polling. Listeners are plain closures; the hub snapshots the
//! listener list before dispatch, so a listener may subscribe or
//! unsubscribe others mid-event without skipping anyone already queued.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// One engine state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum EngineEvent {
    ActiveParentChanged { block_id: String },
    LoadBlock { block_id: String },
    UnloadBlock { block_id: String },
    ExecuteBlock { block_id: String },
    EnterBlock { block_id: String },
    FinishBlock { block_id: String },
    StopBlock { block_id: String },
    ReturnedFromBlock {
        block_id: String,
        caller_id: Option<String>,
        value: Option<Value>,
    },
    ContinueBlock { block_id: String },
    ChooseChoice { block_id: String, command: usize },
    ExecuteCommand {
        block_id: String,
        command: usize,
        token: usize,
    },
    FinishCommand { block_id: String, command: usize },
    GoToCommandIndex { block_id: String, command: usize },
    CheckTriggers {
        variable: String,
        ready: Vec<String>,
    },
    SetVariable { id: String, value: Value },
}

pub type Listener = Rc<dyn Fn(&EngineEvent)>;

/// Dispatches engine events to subscribed listeners.
#[derive(Default)]
pub struct EventHub {
    listeners: RefCell<Vec<(usize, Listener)>>,
    next_id: Cell<usize>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; the returned id unsubscribes it.
    pub fn subscribe(&self, listener: Listener) -> usize {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    /// Remove a listener. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: usize) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: &EngineEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn listeners_receive_events_until_unsubscribed() {
        let hub = EventHub::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        let id = hub.subscribe(Rc::new(move |event: &EngineEvent| {
            sink.borrow_mut().push(event.clone());
        }));

        hub.emit(&EngineEvent::LoadBlock {
            block_id: ".a".to_string(),
        });
        assert!(hub.unsubscribe(id));
        hub.emit(&EngineEvent::UnloadBlock {
            block_id: ".a".to_string(),
        });

        assert_eq!(
            *seen.borrow(),
            vec![EngineEvent::LoadBlock {
                block_id: ".a".to_string()
            }]
        );
        assert!(!hub.unsubscribe(id));
    }

    #[test]
    fn unsubscribing_mid_dispatch_does_not_skip_queued_listeners() {
        let hub = Rc::new(EventHub::new());
        let calls = Rc::new(Cell::new(0));

        // The first listener removes the second while an emit is in
        // flight; the snapshot taken before dispatch still runs it.
        let second_id = Rc::new(Cell::new(0));
        let hub_handle = hub.clone();
        let id_handle = second_id.clone();
        hub.subscribe(Rc::new(move |_| {
            hub_handle.unsubscribe(id_handle.get());
        }));
        let counter = calls.clone();
        second_id.set(hub.subscribe(Rc::new(move |_| {
            counter.set(counter.get() + 1);
        })));

        hub.emit(&EngineEvent::ContinueBlock {
            block_id: String::new(),
        });
        assert_eq!(calls.get(), 1);

        hub.emit(&EngineEvent::ContinueBlock {
            block_id: String::new(),
        });
        assert_eq!(calls.get(), 1);
    }
}
