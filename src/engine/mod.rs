//! Block execution engine
//!
//! Every parsed section becomes a runnable block holding its command
//! tokens. The engine owns the cursors, execution counts, call and
//! return bookkeeping, and the loaded set around the active parent,
//! and announces every transition on its event hub. It deliberately
//! does not interpret command tokens itself: the host reads the
//! current command, acts on it (print a line, evaluate a check,
//! present choices) and reports back. That split keeps the state
//! machine small and fully serializable.
//!
//! Operations on unknown block ids are silent no-ops, so hosts can
//! feed user-supplied ids straight in.

pub mod events;
pub mod state;

#[cfg(test)]
mod tests;

use crate::engine::events::{EngineEvent, EventHub};
use crate::engine::state::{BlockState, RuntimeSnapshot};
use crate::parser::symbols::{SectionKind, SymbolTables};
use crate::parser::token::{ConditionKind, Token, TokenKind};
use crate::parser::ParseResult;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/* ===================== Blocks ===================== */

/// A runnable block built from one parsed section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub name: String,
    pub kind: SectionKind,
    /// Document order of the backing section
    pub index: usize,
    pub line: usize,
    pub from: usize,
    /// Ids of immediate child blocks, in document order
    pub children: Vec<String>,
    /// Global token indices of this block's executable commands
    pub commands: Vec<usize>,
}

/// True for tokens the engine steps through at runtime. Declarations,
/// outline furniture and merged-away lines are not commands.
fn is_command(token: &Token) -> bool {
    if token.ignored {
        return false;
    }
    matches!(
        token.kind,
        TokenKind::SceneHeading { .. }
            | TokenKind::Action { .. }
            | TokenKind::Cue { .. }
            | TokenKind::Dialogue { .. }
            | TokenKind::Centered { .. }
            | TokenKind::Transition { .. }
            | TokenKind::Condition { .. }
            | TokenKind::ChoiceGroupStart
            | TokenKind::ChoiceGroupEnd
            | TokenKind::Choice { .. }
            | TokenKind::Jump { .. }
            | TokenKind::Return { .. }
            | TokenKind::Call { .. }
            | TokenKind::Assign { .. }
    )
}

/* ===================== Engine ===================== */

/// Executes a parsed script block by block.
pub struct BlockEngine {
    pub blocks: HashMap<String, Block>,
    /// Block ids in document order, the root first
    pub order: Vec<String>,
    tokens: Vec<Token>,
    /// Created lazily; absent means the block was never touched
    states: HashMap<String, BlockState>,
    variables: HashMap<String, Value>,
    active_parent: Option<String>,
    pub events: EventHub,
}

impl BlockEngine {
    pub fn new(result: &ParseResult) -> Self {
        let mut blocks = HashMap::new();
        for id in &result.symbols.section_order {
            let Some(section) = result.symbols.sections.get(id) else {
                continue;
            };
            let children = result
                .symbols
                .children_of(id)
                .iter()
                .map(|child| child.id.clone())
                .collect();
            let commands = section
                .tokens
                .iter()
                .copied()
                .filter(|&index| is_command(&result.tokens[index]))
                .collect();
            blocks.insert(
                id.clone(),
                Block {
                    id: id.clone(),
                    name: section.name.clone(),
                    kind: section.kind.clone(),
                    index: section.index,
                    line: section.line,
                    from: section.from,
                    children,
                    commands,
                },
            );
        }
        debug!(blocks = blocks.len(), "engine built");
        Self {
            blocks,
            order: result.symbols.section_order.clone(),
            tokens: result.tokens.clone(),
            states: HashMap::new(),
            variables: HashMap::new(),
            active_parent: None,
            events: EventHub::new(),
        }
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Runtime state of a block, if it was ever touched.
    pub fn block_state(&self, id: &str) -> Option<&BlockState> {
        self.states.get(id)
    }

    pub fn token(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn active_parent(&self) -> Option<&str> {
        self.active_parent.as_deref()
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    fn state_mut(&mut self, id: &str) -> &mut BlockState {
        self.states.entry(id.to_string()).or_default()
    }

    /// The block where a fresh run starts: the root when it has
    /// commands before the first heading, otherwise the first plain
    /// section.
    pub fn start_block(&self) -> Option<String> {
        let root_has_commands = self.blocks.get("").is_some_and(|b| !b.commands.is_empty());
        if root_has_commands {
            return Some(String::new());
        }
        self.order
            .iter()
            .find(|id| {
                !id.is_empty()
                    && matches!(
                        self.blocks.get(*id).map(|b| &b.kind),
                        Some(SectionKind::Section)
                    )
            })
            .cloned()
    }

    /* ===================== Loading ===================== */

    pub fn load_block(&mut self, id: &str) {
        if !self.blocks.contains_key(id) {
            return;
        }
        let state = self.state_mut(id);
        if state.loaded {
            return;
        }
        state.loaded = true;
        self.events.emit(&EngineEvent::LoadBlock {
            block_id: id.to_string(),
        });
    }

    pub fn unload_block(&mut self, id: &str) {
        let Some(state) = self.states.get_mut(id) else {
            return;
        };
        if !state.loaded {
            return;
        }
        state.loaded = false;
        state.is_executing = false;
        state.executing_index = None;
        // A pending return path dies with the unload
        state.executed_by = None;
        state.return_when_finished = false;
        self.events.emit(&EngineEvent::UnloadBlock {
            block_id: id.to_string(),
        });
    }

    /// Ids that stay loaded around `id`: its ancestor chain from the
    /// root down, itself, then its immediate children.
    fn family_of(&self, id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            chain.push(c.to_string());
            current = SymbolTables::parent_id(c);
        }
        chain.reverse();
        if let Some(block) = self.blocks.get(id) {
            chain.extend(block.children.iter().cloned());
        }
        chain
    }

    /* ===================== Entering ===================== */

    /// Make `id` the active parent and run it from the top: unload
    /// everything outside its family, load the family, then execute.
    pub fn enter_block(&mut self, id: &str) -> bool {
        if !self.blocks.contains_key(id) {
            return false;
        }
        let family = self.family_of(id);
        // Walk in document order so unloads announce deterministically
        let loaded: Vec<String> = self
            .order
            .iter()
            .filter(|block_id| {
                self.states
                    .get(*block_id)
                    .is_some_and(|state| state.loaded)
            })
            .cloned()
            .collect();
        for block_id in loaded {
            if !family.contains(&block_id) {
                self.unload_block(&block_id);
            }
        }
        for block_id in &family {
            self.load_block(block_id);
        }
        if self.active_parent.as_deref() != Some(id) {
            self.active_parent = Some(id.to_string());
            self.events.emit(&EngineEvent::ActiveParentChanged {
                block_id: id.to_string(),
            });
        }
        self.execute_block(id);
        self.events.emit(&EngineEvent::EnterBlock {
            block_id: id.to_string(),
        });
        true
    }

    /// Start (or restart) execution of a block. Cursors reset, counts
    /// accumulate.
    pub fn execute_block(&mut self, id: &str) -> bool {
        if !self.blocks.contains_key(id) {
            return false;
        }
        self.load_block(id);
        {
            let state = self.state_mut(id);
            state.is_executing = true;
            state.has_finished = false;
            state.has_returned = false;
            state.returned_from = None;
            state.executing_index = Some(state.start_index);
            state.previous_index = None;
            state.execution_count += 1;
        }
        self.events.emit(&EngineEvent::ExecuteBlock {
            block_id: id.to_string(),
        });
        true
    }

    /* ===================== Stepping ===================== */

    /// Global token index of the command under the cursor.
    pub fn current_command(&self, id: &str) -> Option<usize> {
        let block = self.blocks.get(id)?;
        let state = self.states.get(id)?;
        if !state.is_executing {
            return None;
        }
        block.commands.get(state.executing_index?).copied()
    }

    pub fn current_token(&self, id: &str) -> Option<&Token> {
        self.tokens.get(self.current_command(id)?)
    }

    /// Announce the command under the cursor and count its execution.
    /// Returns its global token index.
    pub fn execute_command(&mut self, id: &str) -> Option<usize> {
        let token = self.current_command(id)?;
        let cursor = self.states.get(id)?.executing_index?;
        {
            let state = self.state_mut(id);
            *state.command_execution_counts.entry(cursor).or_insert(0) += 1;
        }
        self.events.emit(&EngineEvent::ExecuteCommand {
            block_id: id.to_string(),
            command: cursor,
            token,
        });
        Some(token)
    }

    /// Advance past the command under the cursor; finishes the block
    /// when it was the last one.
    pub fn finish_command(&mut self, id: &str) {
        let Some(state) = self.states.get(id) else {
            return;
        };
        if !state.is_executing {
            return;
        }
        let Some(cursor) = state.executing_index else {
            return;
        };
        self.events.emit(&EngineEvent::FinishCommand {
            block_id: id.to_string(),
            command: cursor,
        });
        let len = self.blocks.get(id).map_or(0, |b| b.commands.len());
        {
            let state = self.state_mut(id);
            state.previous_index = Some(cursor);
            state.executing_index = Some(cursor + 1);
        }
        if cursor + 1 >= len {
            self.finish_block(id);
        }
    }

    pub fn finish_block(&mut self, id: &str) {
        if !self.blocks.contains_key(id) {
            return;
        }
        let return_when_finished = {
            let state = self.state_mut(id);
            state.is_executing = false;
            state.has_finished = true;
            state.executing_index = None;
            state.return_when_finished
        };
        self.events.emit(&EngineEvent::FinishBlock {
            block_id: id.to_string(),
        });
        if return_when_finished {
            self.return_from_block(id, None);
        }
    }

    /// Halt a block without marking it finished.
    pub fn stop_block(&mut self, id: &str) {
        let Some(state) = self.states.get_mut(id) else {
            return;
        };
        if !state.is_executing {
            return;
        }
        state.is_executing = false;
        state.executing_index = None;
        self.events.emit(&EngineEvent::StopBlock {
            block_id: id.to_string(),
        });
    }

    /// Advance after a block finished: return to the caller when the
    /// block was asked to, otherwise fall through to the next plain
    /// section in document order.
    pub fn continue_block(&mut self, id: &str) -> bool {
        if !self.blocks.contains_key(id) {
            return false;
        }
        self.events.emit(&EngineEvent::ContinueBlock {
            block_id: id.to_string(),
        });
        if self
            .states
            .get(id)
            .is_some_and(|state| state.return_when_finished)
        {
            return self.return_from_block(id, None);
        }
        match self.next_section_block(id) {
            Some(next) => self.enter_block(&next),
            None => false,
        }
    }

    fn next_section_block(&self, id: &str) -> Option<String> {
        let at = self.order.iter().position(|block_id| block_id == id)?;
        self.order[at + 1..]
            .iter()
            .find(|block_id| {
                matches!(
                    self.blocks.get(*block_id).map(|b| &b.kind),
                    Some(SectionKind::Section)
                )
            })
            .cloned()
    }

    /* ===================== Calls and Returns ===================== */

    /// Suspend `caller` at its current command and execute `callee`;
    /// the callee's return resumes the caller one command later.
    pub fn call_block(&mut self, caller: &str, callee: &str) -> bool {
        if !self.blocks.contains_key(caller) || !self.blocks.contains_key(callee) {
            return false;
        }
        self.state_mut(caller).is_executing = false;
        {
            let state = self.state_mut(callee);
            state.executed_by = Some(caller.to_string());
            state.return_when_finished = true;
        }
        self.execute_block(callee)
    }

    /// Mark a block to return to its caller when it runs off the end,
    /// instead of falling through to the next section.
    pub fn set_return_when_finished(&mut self, id: &str, value: bool) {
        if !self.blocks.contains_key(id) {
            return;
        }
        self.state_mut(id).return_when_finished = value;
    }

    /// Return out of a block, optionally with a value stored under
    /// `<id>.return`. Returns false when no caller is waiting.
    pub fn return_from_block(&mut self, id: &str, value: Option<Value>) -> bool {
        if !self.blocks.contains_key(id) {
            return false;
        }
        let caller = {
            let state = self.state_mut(id);
            state.has_returned = true;
            state.has_finished = true;
            state.is_executing = false;
            state.executing_index = None;
            state.return_when_finished = false;
            state.executed_by.take()
        };
        if let Some(v) = value.clone() {
            self.set_variable_value(&format!("{}.return", id), v);
        }
        self.events.emit(&EngineEvent::ReturnedFromBlock {
            block_id: id.to_string(),
            caller_id: caller.clone(),
            value,
        });
        let Some(caller_id) = caller else {
            return false;
        };
        let resume = {
            let state = self.state_mut(&caller_id);
            state.returned_from = Some(id.to_string());
            state.is_executing = true;
            let resume = state.executing_index.or(state.previous_index).map_or(0, |i| i + 1);
            state.executing_index = Some(resume);
            resume
        };
        let len = self
            .blocks
            .get(&caller_id)
            .map_or(0, |b| b.commands.len());
        if resume >= len {
            self.finish_block(&caller_id);
        }
        true
    }

    /* ===================== Choices and Jumps ===================== */

    /// Count a choice as chosen. `command` is the choice's position in
    /// the block's command list.
    pub fn choose_choice(&mut self, id: &str, command: usize) -> bool {
        let Some(block) = self.blocks.get(id) else {
            return false;
        };
        let Some(&token) = block.commands.get(command) else {
            return false;
        };
        if !matches!(
            self.tokens.get(token).map(|t| &t.kind),
            Some(TokenKind::Choice { .. })
        ) {
            return false;
        }
        {
            let state = self.state_mut(id);
            *state.choice_chosen_counts.entry(command).or_insert(0) += 1;
        }
        self.events.emit(&EngineEvent::ChooseChoice {
            block_id: id.to_string(),
            command,
        });
        true
    }

    /// Move the cursor to an arbitrary command position.
    pub fn go_to_command_index(&mut self, id: &str, command: usize) {
        if !self.blocks.contains_key(id) {
            return;
        }
        self.state_mut(id).executing_index = Some(command);
        self.events.emit(&EngineEvent::GoToCommandIndex {
            block_id: id.to_string(),
            command,
        });
    }

    /// Save the cursor before a command-level detour.
    pub fn push_command_jump(&mut self, id: &str) {
        let Some(state) = self.states.get_mut(id) else {
            return;
        };
        if let Some(cursor) = state.executing_index {
            state.command_jump_stack.push(cursor);
        }
    }

    /// Pop the most recent detour and move the cursor back to it.
    pub fn pop_command_jump(&mut self, id: &str) -> Option<usize> {
        let target = self.states.get_mut(id)?.command_jump_stack.pop()?;
        self.go_to_command_index(id, target);
        Some(target)
    }

    /// Command position of the Close matching the If or Else at
    /// `command`, by indent.
    pub fn matching_close(&self, id: &str, command: usize) -> Option<usize> {
        let block = self.blocks.get(id)?;
        let &opening = block.commands.get(command)?;
        let open_token = self.tokens.get(opening)?;
        if !matches!(
            open_token.kind,
            TokenKind::Condition {
                kind: ConditionKind::If | ConditionKind::Else,
                ..
            }
        ) {
            return None;
        }
        let indent = open_token.indent;
        for (position, &token_index) in block.commands.iter().enumerate().skip(command + 1) {
            let token = self.tokens.get(token_index)?;
            if token.indent == indent
                && matches!(
                    token.kind,
                    TokenKind::Condition {
                        kind: ConditionKind::Close,
                        ..
                    }
                )
            {
                return Some(position);
            }
        }
        None
    }

    /* ===================== Variables and Triggers ===================== */

    /// Write a runtime variable and poke every detector watching it.
    pub fn set_variable_value(&mut self, id: &str, value: Value) {
        self.variables.insert(id.to_string(), value.clone());
        self.events.emit(&EngineEvent::SetVariable {
            id: id.to_string(),
            value,
        });
        self.check_triggers(SymbolTables::last_segment(id));
    }

    /// Runtime value of an id: the variable store first, then a
    /// block's execution count.
    pub fn get_runtime_value(&self, id: &str) -> Option<Value> {
        if let Some(value) = self.variables.get(id) {
            return Some(value.clone());
        }
        if self.blocks.contains_key(id) {
            let count = self
                .states
                .get(id)
                .map_or(0, |state| state.execution_count);
            return Some(Value::Num(count as f64));
        }
        None
    }

    /// Record `name` against every detector watching it. Returns the
    /// ids of detectors whose triggers are now all satisfied; actually
    /// firing them is the host's decision.
    pub fn check_triggers(&mut self, name: &str) -> Vec<String> {
        let watchers: Vec<(String, Vec<String>)> = self
            .order
            .iter()
            .filter_map(|id| {
                let block = self.blocks.get(id)?;
                match &block.kind {
                    SectionKind::Detector { triggers } if triggers.iter().any(|t| t == name) => {
                        Some((id.clone(), triggers.clone()))
                    }
                    _ => None,
                }
            })
            .collect();
        if watchers.is_empty() {
            return Vec::new();
        }
        let mut ready = Vec::new();
        for (block_id, triggers) in watchers {
            let state = self.state_mut(&block_id);
            if !state.satisfied_triggers.iter().any(|t| t == name) {
                state.satisfied_triggers.push(name.to_string());
            }
            state.unsatisfied_triggers = triggers
                .iter()
                .filter(|t| !state.satisfied_triggers.contains(t))
                .cloned()
                .collect();
            if state.unsatisfied_triggers.is_empty() {
                ready.push(block_id);
            }
        }
        self.events.emit(&EngineEvent::CheckTriggers {
            variable: name.to_string(),
            ready: ready.clone(),
        });
        ready
    }

    /// Clear a detector's trigger bookkeeping after it fired.
    pub fn reset_triggers(&mut self, id: &str) {
        let Some(SectionKind::Detector { triggers }) = self.blocks.get(id).map(|b| b.kind.clone())
        else {
            return;
        };
        let state = self.state_mut(id);
        state.satisfied_triggers.clear();
        state.unsatisfied_triggers = triggers;
    }

    /* ===================== Snapshots ===================== */

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            blocks: self.states.clone(),
            variables: self.variables.clone(),
        }
    }

    /// Replace all runtime state with a snapshot. The active parent is
    /// forgotten; the next enter announces it fresh.
    pub fn restore(&mut self, snapshot: RuntimeSnapshot) {
        self.states = snapshot.blocks;
        self.variables = snapshot.variables;
        self.active_parent = None;
    }
}
