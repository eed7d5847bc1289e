//! Command line interface
//!
//! Three subcommands cover the writing loop: `check` parses a script
//! and reports diagnostics, `tokens` dumps the parsed document with
//! its outline and speaker statistics, and `run` plays the script in
//! the terminal. The runner is also the reference host for the block
//! engine: it shows how a host is expected to read the current
//! command, act on it and report back.

use crate::engine::BlockEngine;
use crate::eval::{EvalContext, Evaluator, StandardEvaluator};
use crate::parser::diagnostics::Severity;
use crate::parser::structure::{Outline, OutlineKind};
use crate::parser::symbols::SymbolTables;
use crate::parser::token::{AssignOp, ConditionKind, TokenKind};
use crate::parser::{parse_text, ParseResult};
use crate::value::Value;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "prompter")]
#[command(about = "Prompter screenplay scripting tools", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a script and report diagnostics
    Check {
        /// Path to the script
        script: PathBuf,
    },
    /// Dump tokens, the outline and per-character scene usage
    Tokens {
        /// Path to the script
        script: PathBuf,
        /// Emit the full parse result as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Play a script in the terminal
    Run {
        /// Path to the script
        script: PathBuf,
    },
}

pub fn run_cli() -> Result<()> {
    run_cli_with_args(Cli::parse())
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Check { script } => check(&script),
        Commands::Tokens { script, json } => tokens(&script, json),
        Commands::Run { script } => run(&script),
    }
}

fn load(script: &Path) -> Result<(String, ParseResult)> {
    let source =
        fs::read_to_string(script).with_context(|| format!("reading {}", script.display()))?;
    let result = parse_text(&source);
    Ok((source, result))
}

/* ===================== check ===================== */

fn check(script: &Path) -> Result<()> {
    let (source, result) = load(script)?;
    if result.diagnostics.is_empty() {
        println!("No problems found");
        return Ok(());
    }
    report(&source, &result);
    let errors = count(&result, Severity::Error);
    let warnings = count(&result, Severity::Warning);
    println!();
    println!("{errors} error(s), {warnings} warning(s)");
    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn count(result: &ParseResult, severity: Severity) -> usize {
    result
        .diagnostics
        .iter()
        .filter(|d| d.severity == severity)
        .count()
}

fn report(source: &str, result: &ParseResult) {
    for diagnostic in &result.diagnostics {
        println!(
            "{}: line {}: {}",
            severity_label(diagnostic.severity),
            line_of(source, diagnostic.from),
            diagnostic.message
        );
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "info",
    }
}

/// 1-based line number of a byte offset.
fn line_of(source: &str, offset: usize) -> usize {
    source
        .as_bytes()
        .iter()
        .take(offset)
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/* ===================== tokens ===================== */

fn tokens(script: &Path, json: bool) -> Result<()> {
    let (_, result) = load(script)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    for token in &result.tokens {
        let marker = if token.ignored { "~" } else { " " };
        println!("{:>4} {}{:?}", token.line, marker, token.kind);
    }
    print_outline(&result.outline);
    print_speakers(&result);
    Ok(())
}

fn print_outline(outline: &Outline) {
    if outline.is_empty() {
        return;
    }
    println!();
    println!("Outline:");
    for &root in &outline.roots {
        print_outline_node(outline, root, 1);
    }
}

fn print_outline_node(outline: &Outline, index: usize, depth: usize) {
    let node = &outline.nodes[index];
    let marker = match node.kind {
        OutlineKind::Section => "#",
        OutlineKind::Scene => "-",
    };
    println!(
        "{}{} {} (line {})",
        "  ".repeat(depth),
        marker,
        node.label,
        node.line
    );
    for &child in &outline.nodes[index].children {
        print_outline_node(outline, child, depth + 1);
    }
}

/// Which numbered scenes each character speaks in. Dialogue before the
/// first scene heading counts as scene 0.
fn print_speakers(result: &ParseResult) {
    let mut scenes: BTreeMap<&str, BTreeSet<usize>> = BTreeMap::new();
    let mut current = 0;
    for token in &result.tokens {
        match &token.kind {
            TokenKind::SceneHeading { number, .. } => current = *number,
            TokenKind::Dialogue { character, .. } if !token.ignored => {
                scenes.entry(character).or_default().insert(current);
            }
            _ => {}
        }
    }
    if scenes.is_empty() {
        return;
    }
    println!();
    println!("Characters:");
    for (character, spoken_in) in &scenes {
        let list: Vec<String> = spoken_in.iter().map(|n| n.to_string()).collect();
        println!(
            "  {} speaks in {} scene(s): {}",
            character,
            spoken_in.len(),
            list.join(", ")
        );
    }
}

/* ===================== run ===================== */

fn run(script: &Path) -> Result<()> {
    let (source, result) = load(script)?;
    if !result.diagnostics.is_empty() {
        report(&source, &result);
        if result.has_errors() {
            std::process::exit(1);
        }
        println!();
    }
    if let Some(title) = result.properties.get("Title") {
        println!("{title}");
    }
    Player::new(&result).play()
}

/// What the player should do after handling one command.
enum Step {
    /// Keep stepping the same block
    Ran,
    /// A different block took over the cursor
    Switch(String),
    /// The active block ran out of commands
    Finished,
    /// Stop playback entirely
    Quit,
}

struct ChoiceOption {
    position: usize,
    text: String,
    calls: Vec<Option<String>>,
}

/// Terminal host around the block engine. The engine keeps the
/// cursors and counts; the player interprets each command, prints
/// content, evaluates checks and asks the reader to pick choices.
struct Player<'a> {
    result: &'a ParseResult,
    engine: BlockEngine,
    evaluator: StandardEvaluator,
    /// Blocks waiting on a call, innermost last
    callers: Vec<String>,
    /// Whether an if/else chain at (block, indent) has taken a branch
    taken: HashMap<(String, usize), bool>,
    /// Detectors currently firing, to stop self-retriggering
    firing: HashSet<String>,
}

impl<'a> Player<'a> {
    fn new(result: &'a ParseResult) -> Self {
        Self {
            result,
            engine: BlockEngine::new(result),
            evaluator: StandardEvaluator,
            callers: Vec::new(),
            taken: HashMap::new(),
            firing: HashSet::new(),
        }
    }

    fn play(&mut self) -> Result<()> {
        let Some(start) = self.engine.start_block() else {
            println!("(nothing to play)");
            return Ok(());
        };
        debug!(block = start.as_str(), "playback starting");
        self.engine.enter_block(&start);
        let mut current = start;
        loop {
            match self.step(&current)? {
                Step::Ran => {}
                Step::Switch(next) => current = next,
                Step::Finished => {
                    if let Some(caller) = self.callers.pop() {
                        current = caller;
                        continue;
                    }
                    if !self.engine.continue_block(&current) {
                        break;
                    }
                    let Some(next) = self.engine.active_parent() else {
                        break;
                    };
                    current = next.to_string();
                }
                Step::Quit => break,
            }
        }
        println!();
        Ok(())
    }

    /// Read the current command of `id`, act on it and report back.
    fn step(&mut self, id: &str) -> Result<Step> {
        let Some(position) = self
            .engine
            .block_state(id)
            .and_then(|state| state.executing_index)
        else {
            return Ok(Step::Finished);
        };
        let Some(index) = self.engine.current_command(id) else {
            return Ok(Step::Finished);
        };
        let Some(token) = self.engine.token(index).cloned() else {
            return Ok(Step::Finished);
        };
        let indent = token.indent;
        self.engine.execute_command(id);

        match token.kind {
            TokenKind::SceneHeading { text, .. } => {
                println!();
                println!("{text}");
            }
            TokenKind::Action { text } => println!("{}", self.render(id, &text)),
            TokenKind::Centered { text } => println!("{:^60}", self.render(id, &text)),
            TokenKind::Transition { text } => println!("{text:>60}"),
            TokenKind::Cue { character, .. } => {
                println!();
                println!("{}", character.to_uppercase());
            }
            TokenKind::Dialogue {
                text, parenthetical, ..
            } => {
                if parenthetical {
                    println!("  ({text})");
                } else {
                    println!("  {}", self.render(id, &text));
                }
            }
            TokenKind::Condition { kind, check } => {
                return Ok(self.branch(id, position, indent, kind, check.as_deref()));
            }
            TokenKind::ChoiceGroupStart => return self.choice_group(id, position),
            TokenKind::ChoiceGroupEnd => {}
            TokenKind::Choice { .. } => {
                // Fell out of a chosen choice's body; resume after the
                // group instead of replaying its siblings.
                match self.group_end(id, position) {
                    Some(end) => self.engine.go_to_command_index(id, end),
                    None => self.engine.finish_command(id),
                }
                return Ok(Step::Ran);
            }
            TokenKind::Jump { calls, .. } => {
                let Some(target) = calls.into_iter().flatten().next() else {
                    self.engine.finish_command(id);
                    return Ok(Step::Ran);
                };
                self.callers.clear();
                return Ok(self.switch_to(&target));
            }
            TokenKind::Call { resolved, .. } => {
                let Some(callee) = resolved else {
                    self.engine.finish_command(id);
                    return Ok(Step::Ran);
                };
                // The call command stays unfinished so the return path
                // resumes on the command after it.
                self.clear_taken(&callee);
                self.callers.push(id.to_string());
                self.engine.call_block(id, &callee);
                return Ok(Step::Switch(callee));
            }
            TokenKind::Return { value } => {
                let value = value.and_then(|expr| self.evaluate(id, &expr));
                let resumed = self.engine.return_from_block(id, value);
                return Ok(match (resumed, self.callers.pop()) {
                    (true, Some(caller)) => Step::Switch(caller),
                    _ => Step::Quit,
                });
            }
            TokenKind::Assign {
                operator,
                value,
                resolved,
                ..
            } => {
                self.engine.finish_command(id);
                if let Some(target) = resolved {
                    self.assign(id, &target, operator, &value)?;
                }
                return Ok(Step::Ran);
            }
            _ => {}
        }
        self.engine.finish_command(id);
        Ok(Step::Ran)
    }

    fn branch(
        &mut self,
        id: &str,
        position: usize,
        indent: usize,
        kind: ConditionKind,
        check: Option<&str>,
    ) -> Step {
        match kind {
            ConditionKind::If => {
                let pass = check.is_some_and(|expr| self.truthy(id, expr));
                self.taken.insert((id.to_string(), indent), pass);
                if pass {
                    self.engine.finish_command(id);
                } else {
                    self.skip_branch(id, position);
                }
            }
            ConditionKind::Else => {
                let key = (id.to_string(), indent);
                let done = self.taken.get(&key).copied().unwrap_or(false);
                let pass = !done && check.map_or(true, |expr| self.truthy(id, expr));
                if pass {
                    self.taken.insert(key, true);
                    self.engine.finish_command(id);
                } else {
                    self.skip_branch(id, position);
                }
            }
            ConditionKind::Close => self.engine.finish_command(id),
        }
        Step::Ran
    }

    /// Move past a branch that did not pass. The cursor lands on the
    /// matching close, which the next step consumes.
    fn skip_branch(&mut self, id: &str, position: usize) {
        match self.engine.matching_close(id, position) {
            Some(close) => self.engine.go_to_command_index(id, close),
            None => self.engine.finish_command(id),
        }
    }

    fn choice_group(&mut self, id: &str, start: usize) -> Result<Step> {
        let mut options: Vec<ChoiceOption> = Vec::new();
        let mut end = None;
        {
            let Some(block) = self.engine.block(id) else {
                return Ok(Step::Finished);
            };
            let mut depth = 0usize;
            for (position, &token_index) in block.commands.iter().enumerate().skip(start + 1) {
                let Some(token) = self.engine.token(token_index) else {
                    break;
                };
                match &token.kind {
                    TokenKind::ChoiceGroupStart => depth += 1,
                    TokenKind::ChoiceGroupEnd => {
                        if depth == 0 {
                            end = Some(position);
                            break;
                        }
                        depth -= 1;
                    }
                    TokenKind::Choice {
                        text,
                        sticky,
                        calls,
                        ..
                    } if depth == 0 => {
                        let chosen = self
                            .engine
                            .block_state(id)
                            .map_or(0, |state| state.times_chosen(position));
                        if *sticky || chosen == 0 {
                            options.push(ChoiceOption {
                                position,
                                text: text.clone(),
                                calls: calls.clone(),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
        let Some(end) = end else {
            self.engine.finish_command(id);
            return Ok(Step::Ran);
        };
        if options.is_empty() {
            // Every one-shot choice is spent; fall through the group.
            self.engine.go_to_command_index(id, end);
            return Ok(Step::Ran);
        }
        println!();
        for (number, option) in options.iter().enumerate() {
            println!("{}) {}", number + 1, self.render(id, &option.text));
        }
        let Some(picked) = prompt(options.len()).context("reading choice input")? else {
            return Ok(Step::Quit);
        };
        let option = &options[picked];
        self.engine.choose_choice(id, option.position);
        if let Some(target) = option.calls.iter().flatten().next().cloned() {
            self.callers.clear();
            return Ok(self.switch_to(&target));
        }
        println!("{}", self.render(id, &option.text));
        self.engine.go_to_command_index(id, option.position + 1);
        Ok(Step::Ran)
    }

    /// Command position of the group end enclosing `after`, skipping
    /// nested groups.
    fn group_end(&self, id: &str, after: usize) -> Option<usize> {
        let block = self.engine.block(id)?;
        let mut depth = 0usize;
        for (position, &token_index) in block.commands.iter().enumerate().skip(after + 1) {
            match self.engine.token(token_index).map(|t| &t.kind) {
                Some(TokenKind::ChoiceGroupStart) => depth += 1,
                Some(TokenKind::ChoiceGroupEnd) => {
                    if depth == 0 {
                        return Some(position);
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
        None
    }

    fn switch_to(&mut self, target: &str) -> Step {
        self.clear_taken(target);
        self.engine.enter_block(target);
        Step::Switch(target.to_string())
    }

    fn clear_taken(&mut self, id: &str) {
        self.taken.retain(|(block, _), _| block.as_str() != id);
    }

    fn assign(
        &mut self,
        block: &str,
        variable: &str,
        operator: AssignOp,
        expr: &str,
    ) -> Result<()> {
        let Some(value) = self.evaluate(block, expr) else {
            debug!(variable, expr, "assignment value did not evaluate");
            return Ok(());
        };
        let current = self.engine.get_runtime_value(variable).or_else(|| {
            self.result
                .symbols
                .variables
                .get(variable)
                .and_then(|v| v.value.clone())
        });
        let Some(next) = apply_assign(operator, current, value) else {
            debug!(variable, "assignment skipped, incompatible operands");
            return Ok(());
        };
        self.engine.set_variable_value(variable, next);
        let ready = self.engine.check_triggers(SymbolTables::last_segment(variable));
        self.fire_detectors(ready)
    }

    /// Run each ready detector to completion. Detector bodies only
    /// branch and assign, so stepping them never blocks on input.
    fn fire_detectors(&mut self, ready: Vec<String>) -> Result<()> {
        for detector in ready {
            if !self.firing.insert(detector.clone()) {
                continue;
            }
            debug!(block = detector.as_str(), "detector fired");
            self.engine.reset_triggers(&detector);
            self.clear_taken(&detector);
            self.engine.execute_block(&detector);
            while matches!(self.step(&detector)?, Step::Ran) {}
            self.firing.remove(&detector);
        }
        Ok(())
    }

    /// Names visible from `block`, outermost scope first so inner
    /// declarations shadow outer ones. Runtime values win over
    /// parse-time initializers.
    fn context(&self, block: &str) -> EvalContext {
        let mut chain = Vec::new();
        let mut cursor = Some(block);
        while let Some(scope) = cursor {
            chain.push(scope);
            cursor = SymbolTables::parent_id(scope);
        }
        chain.reverse();

        let mut context = EvalContext::new();
        for entity in self.result.symbols.entities.values() {
            context.insert(entity.name.clone(), entity.as_value());
        }
        for scope in chain {
            for variable in self.result.symbols.variables.values() {
                if variable.section_id != scope {
                    continue;
                }
                let value = self
                    .engine
                    .get_runtime_value(&variable.id)
                    .or_else(|| variable.value.clone());
                if let Some(value) = value {
                    context.insert(variable.name.clone(), value);
                }
            }
            for tag in self.result.symbols.tags.values() {
                if tag.section_id != scope {
                    continue;
                }
                let value = self
                    .engine
                    .get_runtime_value(&tag.id)
                    .or_else(|| tag.value.clone());
                if let Some(value) = value {
                    context.insert(tag.name.clone(), value);
                }
            }
            for asset in self.result.symbols.assets.values() {
                if asset.section_id != scope {
                    continue;
                }
                let value = self
                    .engine
                    .get_runtime_value(&asset.id)
                    .or_else(|| asset.value.clone());
                if let Some(value) = value {
                    context.insert(asset.name.clone(), value);
                }
            }
        }
        context
    }

    fn evaluate(&self, block: &str, expression: &str) -> Option<Value> {
        self.evaluator
            .evaluate(expression, &self.context(block))
            .result
    }

    fn truthy(&self, block: &str, expression: &str) -> bool {
        self.evaluate(block, expression)
            .is_some_and(|value| value.is_truthy())
    }

    fn render(&self, block: &str, text: &str) -> String {
        if !text.contains('{') {
            return text.to_string();
        }
        self.evaluator.format(text, &self.context(block)).text
    }
}

/// Apply an assignment operator to the current value. `None` means the
/// operands were incompatible and the assignment is dropped.
fn apply_assign(operator: AssignOp, current: Option<Value>, value: Value) -> Option<Value> {
    match operator {
        AssignOp::Set => Some(value),
        AssignOp::Add => match (current?, value) {
            (Value::Num(a), Value::Num(b)) => Some(Value::Num(a + b)),
            (Value::Str(a), b) => Some(Value::Str(format!("{a}{b}"))),
            (a, Value::Str(b)) => Some(Value::Str(format!("{a}{b}"))),
            _ => None,
        },
        AssignOp::Sub => match (current?, value) {
            (Value::Num(a), Value::Num(b)) => Some(Value::Num(a - b)),
            _ => None,
        },
        AssignOp::Mul => match (current?, value) {
            (Value::Num(a), Value::Num(b)) => Some(Value::Num(a * b)),
            _ => None,
        },
        AssignOp::Div => match (current?, value) {
            (Value::Num(a), Value::Num(b)) if b != 0.0 => Some(Value::Num(a / b)),
            _ => None,
        },
    }
}

/// Read a 1-based menu pick from stdin. `None` means end of input.
fn prompt(count: usize) -> io::Result<Option<usize>> {
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => return Ok(Some(n - 1)),
            _ => println!("Enter a number between 1 and {count}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_operators_respect_value_types() {
        let num = |n: f64| Some(Value::Num(n));
        assert_eq!(
            apply_assign(AssignOp::Set, None, Value::Num(5.0)),
            num(5.0)
        );
        assert_eq!(
            apply_assign(AssignOp::Add, num(2.0), Value::Num(3.0)),
            num(5.0)
        );
        assert_eq!(
            apply_assign(AssignOp::Add, Some(Value::Str("a".into())), Value::Num(1.0)),
            Some(Value::Str("a1".into()))
        );
        assert_eq!(apply_assign(AssignOp::Sub, num(2.0), Value::Bool(true)), None);
        assert_eq!(apply_assign(AssignOp::Div, num(2.0), Value::Num(0.0)), None);
        assert_eq!(apply_assign(AssignOp::Add, None, Value::Num(1.0)), None);
    }

    #[test]
    fn offsets_map_to_lines() {
        let source = "one\ntwo\nthree";
        assert_eq!(line_of(source, 0), 1);
        assert_eq!(line_of(source, 3), 1);
        assert_eq!(line_of(source, 4), 2);
        assert_eq!(line_of(source, 12), 3);
    }
}
