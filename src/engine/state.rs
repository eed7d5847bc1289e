//! Per-block runtime state and snapshots

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mutable runtime state of one block.
///
/// Created lazily the first time a block is loaded or executed, and
/// carried whole into [`RuntimeSnapshot`]s, so a restore needs nothing
/// but this struct per block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockState {
    /// The block is in the loaded set around the active parent
    pub loaded: bool,
    pub is_executing: bool,
    pub has_finished: bool,
    pub has_returned: bool,
    /// Id of the child block that most recently returned into this one
    pub returned_from: Option<String>,
    /// Id of the block whose call started this execution
    pub executed_by: Option<String>,
    /// Return to the caller automatically when the last command ends
    pub return_when_finished: bool,
    /// Cursor into the block's command list while executing
    pub executing_index: Option<usize>,
    /// Cursor of the most recently finished command
    pub previous_index: Option<usize>,
    /// Where execution starts when the block is entered
    pub start_index: usize,
    /// Saved cursors for nested command-level jumps
    pub command_jump_stack: Vec<usize>,
    /// How many times this block has started executing
    pub execution_count: u32,
    /// Command position -> times executed
    pub command_execution_counts: HashMap<usize, u32>,
    /// Command position -> times this choice was chosen
    pub choice_chosen_counts: HashMap<usize, u32>,
    /// Trigger names seen since the detector last fired
    pub satisfied_triggers: Vec<String>,
    /// Trigger names still missing before the detector can fire
    pub unsatisfied_triggers: Vec<String>,
}

impl BlockState {
    pub fn times_chosen(&self, command: usize) -> u32 {
        self.choice_chosen_counts.get(&command).copied().unwrap_or(0)
    }

    pub fn times_executed(&self, command: usize) -> u32 {
        self.command_execution_counts
            .get(&command)
            .copied()
            .unwrap_or(0)
    }
}

/// Everything needed to park a running script and pick it up later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    pub blocks: HashMap<String, BlockState>,
    pub variables: HashMap<String, Value>,
}
