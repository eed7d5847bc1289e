//! Content pass
//!
//! The second pass walks the lines again, in order, and emits every
//! token: declaration tokens are rebuilt from the first pass's claims,
//! content tokens are classified by the line rules. Running after the
//! declaration pass means every name is already known when something
//! resolves against it, while the token list still comes out in source
//! order.

use crate::parser::declarations::own_captures;
use crate::parser::diagnostics::Diagnostic;
use crate::parser::resolver;
use crate::parser::state::{LineClaim, LineRecord, ParserState};
use crate::parser::symbols::{Reference, SectionKind};
use crate::parser::token::{AssetKind, AssignOp, ConditionKind, TokenKind, VariableKind};
use crate::value::ValueType;
use tracing::trace;

pub fn run(state: &mut ParserState<'_>) {
    ContentPass {
        state,
        dialogue: None,
        last_display: None,
        blank_gap: 0,
        conditions: Vec::new(),
        choice_open: false,
        terminated: false,
        reported_unreachable: false,
        scene_number: 0,
    }
    .run();
}

/// The speaker opened by the most recent cue.
struct Speaker {
    character: String,
    dual: bool,
}

/// The display token candidates for line merging point back at.
struct LastDisplay {
    token: usize,
    trailing: bool,
}

/// What a content line turned out to be. Offsets are relative to the
/// trimmed line text.
enum Classified {
    Separator,
    Synopsis { text: String },
    Scene { text: String },
    Centered { text: String, from: usize },
    Transition { text: String },
    Jump { target: String, from: usize },
    Return { value: Option<(String, usize)> },
    If { check: String, from: usize },
    Else { check: Option<(String, usize)> },
    Choice {
        sticky: bool,
        text: String,
        text_from: usize,
        target: Option<(String, usize)>,
    },
    Call { name: String, from: usize, to: usize },
    Assign,
    Cue {
        character: String,
        from: usize,
        to: usize,
        dual: bool,
    },
    Parenthetical { text: String },
    Text,
}

struct ContentPass<'a, 'b> {
    state: &'a mut ParserState<'b>,
    dialogue: Option<Speaker>,
    last_display: Option<LastDisplay>,
    /// Blank lines since the previous non-blank line
    blank_gap: usize,
    /// Indents of the open `if`/`else` blocks, outermost first
    conditions: Vec<usize>,
    choice_open: bool,
    /// An unconditional jump or return already left this section
    terminated: bool,
    reported_unreachable: bool,
    scene_number: usize,
}

impl ContentPass<'_, '_> {
    fn run(mut self) {
        for idx in 0..self.state.lines.len() {
            let line = self.state.lines[idx].clone();
            if let Some(claim) = self.state.claims.get(&idx).cloned() {
                self.claimed_line(idx, &line, claim);
                self.blank_gap = 0;
                continue;
            }
            if line.is_blank() {
                self.blank_line(idx, &line);
                continue;
            }
            self.content_line(idx, &line);
            self.blank_gap = 0;
        }
        self.finish();
    }

    /* ===================== Claimed Lines ===================== */

    fn claimed_line(&mut self, idx: usize, line: &LineRecord, claim: LineClaim) {
        match claim {
            LineClaim::Heading { id } => self.heading(idx, line, &id),
            LineClaim::Variable { id, duplicate } => {
                self.leave_flow(idx, line);
                let trimmed = line.trimmed().to_string();
                let Some(caps) = self
                    .state
                    .rules
                    .variable
                    .captures(&trimmed)
                    .map(own_captures)
                else {
                    return;
                };
                let kind = match caps.text("kind").as_deref() {
                    Some("temp") => VariableKind::Temp,
                    _ => VariableKind::Var,
                };
                self.state.push_token(
                    idx,
                    TokenKind::Variable {
                        kind,
                        name: caps.text("name").unwrap_or_default(),
                        declared_type: caps.text("type").map(|t| ValueType::parse(&t)),
                        value: caps.text("value"),
                    },
                    line.content_from(),
                    line.content_to(),
                    line.indent(),
                );
                resolver::resolve_variable(self.state, idx, line, &caps, &id, duplicate);
            }
            LineClaim::Asset { id, duplicate } => {
                self.leave_flow(idx, line);
                let trimmed = line.trimmed().to_string();
                let Some(caps) = self.state.rules.asset.captures(&trimmed).map(own_captures)
                else {
                    return;
                };
                self.state.push_token(
                    idx,
                    TokenKind::Asset {
                        kind: caps
                            .text("kind")
                            .and_then(|k| AssetKind::parse(&k))
                            .unwrap_or(AssetKind::Image),
                        name: caps.text("name").unwrap_or_default(),
                        value: caps.text("value").unwrap_or_default(),
                    },
                    line.content_from(),
                    line.content_to(),
                    line.indent(),
                );
                resolver::resolve_asset(self.state, idx, line, &caps, &id, duplicate);
            }
            LineClaim::Tag { id, duplicate } => {
                self.leave_flow(idx, line);
                let trimmed = line.trimmed().to_string();
                let Some(caps) = self.state.rules.tag.captures(&trimmed).map(own_captures)
                else {
                    return;
                };
                self.state.push_token(
                    idx,
                    TokenKind::Tag {
                        name: caps.text("name").unwrap_or_default(),
                        value: caps.text("value"),
                    },
                    line.content_from(),
                    line.content_to(),
                    line.indent(),
                );
                resolver::resolve_tag(self.state, idx, line, &caps, &id, duplicate);
            }
            LineClaim::Entity { name, .. } => {
                self.leave_flow(idx, line);
                let trimmed = line.trimmed().to_string();
                let Some(caps) = self.state.rules.entity.captures(&trimmed).map(own_captures)
                else {
                    return;
                };
                self.state.push_token(
                    idx,
                    TokenKind::Entity {
                        entity_type: caps.text("type").unwrap_or_default(),
                        name,
                    },
                    line.content_from(),
                    line.content_to(),
                    line.indent(),
                );
            }
            LineClaim::EntityField {
                entity, duplicate, ..
            } => {
                self.last_display = None;
                let trimmed = line.trimmed().to_string();
                let Some(caps) = self
                    .state
                    .rules
                    .entity_field
                    .captures(&trimmed)
                    .map(own_captures)
                else {
                    return;
                };
                self.state.push_token(
                    idx,
                    TokenKind::EntityField {
                        name: caps.text("name").unwrap_or_default(),
                        value: caps.text("value").unwrap_or_default(),
                    },
                    line.content_from(),
                    line.content_to(),
                    line.indent(),
                );
                resolver::resolve_entity_field(self.state, idx, line, &caps, &entity, duplicate);
            }
            LineClaim::Import { path } => {
                self.leave_flow(idx, line);
                self.state.push_token(
                    idx,
                    TokenKind::Import { path },
                    line.content_from(),
                    line.content_to(),
                    line.indent(),
                );
            }
            LineClaim::Property { key, value } => {
                if let Some(token) = self.state.push_token(
                    idx,
                    TokenKind::Property { key, value },
                    line.content_from(),
                    line.content_to(),
                    line.indent(),
                ) {
                    self.state.title_tokens.push(token);
                }
            }
            LineClaim::Invalid { construct: _ } => {
                self.leave_flow(idx, line);
                self.state.push_token(
                    idx,
                    TokenKind::Invalid {
                        text: line.trimmed().to_string(),
                    },
                    line.content_from(),
                    line.content_to(),
                    line.indent(),
                );
            }
        }
    }

    /// Shared prelude for declaration lines in content position: they
    /// end any dialogue, choice group and dedented condition blocks.
    fn leave_flow(&mut self, idx: usize, line: &LineRecord) {
        if self.choice_open {
            self.end_choice_group(idx, line.content_from());
        }
        self.close_conditions(idx, line.indent());
        self.dialogue = None;
        self.last_display = None;
    }

    fn heading(&mut self, idx: usize, line: &LineRecord, id: &str) {
        self.dialogue = None;
        self.last_display = None;
        if self.choice_open {
            self.end_choice_group(idx, line.content_from());
        }
        self.close_all_conditions(idx);
        self.terminated = false;
        self.reported_unreachable = false;

        let (name, depth, declared_line) = match self.state.symbols.sections.get(id) {
            Some(section) => (section.name.clone(), section.depth, section.line),
            None => return,
        };
        trace!(id, depth, "section");

        self.state.push_token(
            idx,
            TokenKind::Section {
                name: name.clone(),
                depth,
            },
            line.content_from(),
            line.content_to(),
            line.indent(),
        );
        self.state
            .outline
            .add_section(&name, id, depth, self.state.line_number(idx));

        let trimmed = line.trimmed().to_string();
        if let Some(caps) = self.state.rules.heading.captures(&trimmed).map(own_captures) {
            if let Some((from, to)) = caps.span("name") {
                let base = line.content_from();
                self.state.push_reference(Reference {
                    from: base + from,
                    to: base + to,
                    name,
                    id: Some(id.to_string()),
                    declaration: declared_line == self.state.line_number(idx),
                });
            }
        }
    }

    /* ===================== Blank Lines ===================== */

    fn blank_line(&mut self, idx: usize, line: &LineRecord) {
        self.blank_gap += 1;
        if self.choice_open {
            self.end_choice_group(idx, line.start);
        }
        let keep = self.blank_gap == 1
            && self.dialogue.is_some()
            && self.last_display.as_ref().is_some_and(|l| l.trailing);
        if !keep {
            self.dialogue = None;
        }
    }

    /* ===================== Content Lines ===================== */

    fn content_line(&mut self, idx: usize, line: &LineRecord) {
        let classified = self.classify(idx, line);
        let base = line.content_from();
        let indent = line.indent();

        if self.choice_open && !matches!(classified, Classified::Choice { .. }) {
            self.end_choice_group(idx, base);
        }
        let closed_at_same = self.close_conditions(idx, indent);
        if !matches!(
            classified,
            Classified::Text | Classified::Parenthetical { .. }
        ) {
            self.dialogue = None;
            self.last_display = None;
        }

        match classified {
            Classified::Separator => {
                self.state
                    .push_token(idx, TokenKind::Separator, base, line.content_to(), indent);
            }
            Classified::Synopsis { text } => {
                self.state.outline.add_synopsis(&text);
                self.state.push_token(
                    idx,
                    TokenKind::Synopsis { text },
                    base,
                    line.content_to(),
                    indent,
                );
            }
            Classified::Scene { text } => {
                self.warn_unreachable(idx, line);
                self.scene_number += 1;
                self.state
                    .outline
                    .add_scene(&text, self.state.line_number(idx));
                let token = self.state.push_token(
                    idx,
                    TokenKind::SceneHeading {
                        text,
                        number: self.scene_number,
                    },
                    base,
                    line.content_to(),
                    indent,
                );
                self.check_scope(idx, token);
            }
            Classified::Centered { text, from } => {
                self.warn_unreachable(idx, line);
                resolver::resolve_template(self.state, idx, base + from, &text);
                let token = self.state.push_token(
                    idx,
                    TokenKind::Centered { text },
                    base,
                    line.content_to(),
                    indent,
                );
                self.check_scope(idx, token);
            }
            Classified::Transition { text } => {
                self.warn_unreachable(idx, line);
                let token = self.state.push_token(
                    idx,
                    TokenKind::Transition { text },
                    base,
                    line.content_to(),
                    indent,
                );
                self.check_scope(idx, token);
            }
            Classified::Jump { target, from } => {
                self.warn_unreachable(idx, line);
                let calls = resolver::resolve_jump_target(self.state, idx, base + from, &target);
                let token = self.state.push_token(
                    idx,
                    TokenKind::Jump { target, calls },
                    base,
                    line.content_to(),
                    indent,
                );
                self.check_scope(idx, token);
                if self.conditions.is_empty() {
                    self.terminated = true;
                }
            }
            Classified::Return { value } => {
                self.warn_unreachable(idx, line);
                let text = match value {
                    Some((expr, from)) => {
                        resolver::resolve_return(self.state, idx, base + from, &expr);
                        Some(expr)
                    }
                    None => None,
                };
                let token = self.state.push_token(
                    idx,
                    TokenKind::Return { value: text },
                    base,
                    line.content_to(),
                    indent,
                );
                self.check_scope(idx, token);
                if self.conditions.is_empty() {
                    self.terminated = true;
                }
            }
            Classified::If { check, from } => {
                resolver::resolve_check(self.state, idx, base + from, &check);
                self.state.push_token(
                    idx,
                    TokenKind::Condition {
                        kind: ConditionKind::If,
                        check: Some(check),
                    },
                    base,
                    line.content_to(),
                    indent,
                );
                self.conditions.push(indent);
            }
            Classified::Else { check } => {
                if !closed_at_same {
                    self.state.push_diagnostic(
                        idx,
                        Diagnostic::error(
                            base,
                            line.content_to(),
                            "'else' has no matching 'if'".to_string(),
                            "parser",
                        ),
                    );
                }
                let text = match check {
                    Some((expr, from)) => {
                        resolver::resolve_check(self.state, idx, base + from, &expr);
                        Some(expr)
                    }
                    None => None,
                };
                self.state.push_token(
                    idx,
                    TokenKind::Condition {
                        kind: ConditionKind::Else,
                        check: text,
                    },
                    base,
                    line.content_to(),
                    indent,
                );
                self.conditions.push(indent);
            }
            Classified::Choice {
                sticky,
                text,
                text_from,
                target,
            } => {
                self.warn_unreachable(idx, line);
                if !self.choice_open {
                    self.choice_open = true;
                    self.state
                        .push_token(idx, TokenKind::ChoiceGroupStart, base, base, indent);
                }
                resolver::resolve_template(self.state, idx, base + text_from, &text);
                let (target_text, calls) = match target {
                    Some((raw, from)) => {
                        let calls =
                            resolver::resolve_jump_target(self.state, idx, base + from, &raw);
                        (Some(raw), calls)
                    }
                    None => (None, Vec::new()),
                };
                let token = self.state.push_token(
                    idx,
                    TokenKind::Choice {
                        text,
                        sticky,
                        target: target_text,
                        calls,
                    },
                    base,
                    line.content_to(),
                    indent,
                );
                self.check_scope(idx, token);
            }
            Classified::Call { name, from, to } => {
                self.warn_unreachable(idx, line);
                let resolved =
                    resolver::resolve_call(self.state, idx, base + from, base + to, &name);
                let token = self.state.push_token(
                    idx,
                    TokenKind::Call { name, resolved },
                    base,
                    line.content_to(),
                    indent,
                );
                self.check_scope(idx, token);
            }
            Classified::Assign => {
                let trimmed = line.trimmed().to_string();
                let Some(caps) = self.state.rules.assign.captures(&trimmed).map(own_captures)
                else {
                    return;
                };
                let op = caps
                    .text("op")
                    .and_then(|o| AssignOp::parse(&o))
                    .unwrap_or(AssignOp::Set);
                let resolved = resolver::resolve_assign(self.state, idx, line, &caps, op);
                self.state.push_token(
                    idx,
                    TokenKind::Assign {
                        name: caps.text("name").unwrap_or_default(),
                        operator: op,
                        value: caps.text("value").unwrap_or_default(),
                        resolved,
                    },
                    base,
                    line.content_to(),
                    indent,
                );
            }
            Classified::Cue {
                character,
                from,
                to,
                dual,
            } => {
                self.warn_unreachable(idx, line);
                resolver::resolve_cue(self.state, base + from, base + to, &character);
                let token = self.state.push_token(
                    idx,
                    TokenKind::Cue {
                        character: character.clone(),
                        dual,
                    },
                    base,
                    line.content_to(),
                    indent,
                );
                self.check_scope(idx, token);
                self.dialogue = Some(Speaker { character, dual });
            }
            Classified::Parenthetical { text } => {
                let character = match &self.dialogue {
                    Some(speaker) => speaker.character.clone(),
                    None => return,
                };
                self.last_display = None;
                let token = self.state.push_token(
                    idx,
                    TokenKind::Dialogue {
                        character,
                        text,
                        parenthetical: true,
                    },
                    base,
                    line.content_to(),
                    indent,
                );
                self.check_scope(idx, token);
            }
            Classified::Text => {
                self.warn_unreachable(idx, line);
                let text = line.trimmed().to_string();
                resolver::resolve_template(self.state, idx, base, &text);
                let kind = match &self.dialogue {
                    Some(speaker) => TokenKind::Dialogue {
                        character: speaker.character.clone(),
                        text,
                        parenthetical: false,
                    },
                    None => TokenKind::Action { text },
                };
                self.push_display(idx, line, kind);
            }
        }
    }

    /// Emit an action or dialogue token, folding it into the previous
    /// one when that line asked for a continuation with a trailing
    /// space and at most one blank line separates them.
    fn push_display(&mut self, idx: usize, line: &LineRecord, kind: TokenKind) {
        let mut kind = kind;
        if self.blank_gap <= 1 {
            if let Some(last) = &self.last_display {
                if last.trailing {
                    let prev = &self.state.tokens[last.token];
                    let merged = match (&prev.kind, &kind) {
                        (TokenKind::Action { text: a }, TokenKind::Action { text: b }) => {
                            Some(TokenKind::Action {
                                text: format!("{} {}", a, b),
                            })
                        }
                        (
                            TokenKind::Dialogue {
                                character: a_char,
                                text: a,
                                parenthetical: false,
                            },
                            TokenKind::Dialogue {
                                character: b_char,
                                text: b,
                                parenthetical: false,
                            },
                        ) if a_char == b_char => Some(TokenKind::Dialogue {
                            character: a_char.clone(),
                            text: format!("{} {}", a, b),
                            parenthetical: false,
                        }),
                        _ => None,
                    };
                    if let Some(merged) = merged {
                        let prev_index = last.token;
                        self.state.tokens[prev_index].ignored = true;
                        kind = merged;
                    }
                }
            }
        }
        let token = self.state.push_token(
            idx,
            kind,
            line.content_from(),
            line.content_to(),
            line.indent(),
        );
        self.check_scope(idx, token);
        self.last_display = token.map(|token| LastDisplay {
            token,
            trailing: line.has_trailing_space(),
        });
    }

    /* ===================== Classification ===================== */

    fn classify(&self, idx: usize, line: &LineRecord) -> Classified {
        let trimmed = line.trimmed();
        let rules = &self.state.rules;

        if rules.separator.is_match(trimmed) {
            return Classified::Separator;
        }
        if let Some(caps) = rules.synopsis.captures(trimmed) {
            if let Some(text) = caps.name("text") {
                return Classified::Synopsis {
                    text: text.as_str().to_string(),
                };
            }
        }
        if rules.scene.is_match(trimmed) {
            return Classified::Scene {
                text: trimmed.to_string(),
            };
        }
        if let Some(caps) = rules.forced_scene.captures(trimmed) {
            return Classified::Scene {
                text: caps["text"].to_string(),
            };
        }
        if let Some(caps) = rules.centered.captures(trimmed) {
            let text = caps.name("text").map(|m| (m.as_str(), m.start()));
            if let Some((text, from)) = text {
                return Classified::Centered {
                    text: text.to_string(),
                    from,
                };
            }
        }
        if let Some(caps) = rules.transition.captures(trimmed) {
            return Classified::Transition {
                text: caps["text"].to_string(),
            };
        }
        if let Some(caps) = rules.forced_transition.captures(trimmed) {
            return Classified::Transition {
                text: caps["text"].to_string(),
            };
        }
        if let Some(caps) = rules.jump.captures(trimmed) {
            let target = caps.name("target");
            if let Some(target) = target {
                return Classified::Jump {
                    target: target.as_str().to_string(),
                    from: target.start(),
                };
            }
        }
        if let Some(caps) = rules.ret.captures(trimmed) {
            let value = caps
                .name("value")
                .filter(|m| !m.as_str().is_empty())
                .map(|m| (m.as_str().to_string(), m.start()));
            return Classified::Return { value };
        }
        if let Some(caps) = rules.condition_if.captures(trimmed) {
            if let Some(check) = caps.name("check") {
                return Classified::If {
                    check: check.as_str().to_string(),
                    from: check.start(),
                };
            }
        }
        if let Some(caps) = rules.condition_else.captures(trimmed) {
            let check = caps
                .name("check")
                .map(|m| (m.as_str().to_string(), m.start()));
            return Classified::Else { check };
        }
        if let Some(caps) = rules.choice.captures(trimmed) {
            let sticky = &caps["marker"] == "+";
            if let Some(text) = caps.name("text") {
                let text_from = text.start();
                let text = text.as_str();
                if let Some(inner) = rules.choice_target.captures(text) {
                    let label = inner.name("text");
                    let target = inner.name("target");
                    if let (Some(label), Some(target)) = (label, target) {
                        return Classified::Choice {
                            sticky,
                            text: label.as_str().to_string(),
                            text_from: text_from + label.start(),
                            target: Some((
                                target.as_str().to_string(),
                                text_from + target.start(),
                            )),
                        };
                    }
                }
                return Classified::Choice {
                    sticky,
                    text: text.to_string(),
                    text_from,
                    target: None,
                };
            }
        }
        if let Some(caps) = rules.call.captures(trimmed) {
            if let Some(name) = caps.name("name") {
                return Classified::Call {
                    name: name.as_str().to_string(),
                    from: name.start(),
                    to: name.end(),
                };
            }
        }
        if rules.assign.is_match(trimmed) {
            return Classified::Assign;
        }
        if let Some(caps) = rules.cue.captures(trimmed) {
            if let Some(name) = caps.name("name") {
                return Classified::Cue {
                    character: name.as_str().to_string(),
                    from: name.start(),
                    to: name.end(),
                    dual: caps.name("dual").is_some(),
                };
            }
        }
        if let Some(caps) = rules.caps_cue.captures(trimmed) {
            // An all-caps line only announces a speaker when someone
            // actually speaks on the next line.
            let next_speaks = self
                .state
                .lines
                .get(idx + 1)
                .is_some_and(|next| !next.is_blank());
            if next_speaks {
                if let Some(name) = caps.name("name") {
                    return Classified::Cue {
                        character: name.as_str().to_string(),
                        from: name.start(),
                        to: name.end(),
                        dual: caps.name("dual").is_some(),
                    };
                }
            }
        }
        if self.dialogue.is_some() {
            if let Some(caps) = rules.parenthetical.captures(trimmed) {
                return Classified::Parenthetical {
                    text: caps["text"].to_string(),
                };
            }
        }
        Classified::Text
    }

    /* ===================== Block Tracking ===================== */

    /// Close condition blocks the current indent has dedented out of.
    /// Returns true when one of them sat at exactly this indent, which
    /// is what an `else` needs to rebind.
    fn close_conditions(&mut self, idx: usize, indent: usize) -> bool {
        let mut closed_at_same = false;
        while let Some(&top) = self.conditions.last() {
            if indent > top {
                break;
            }
            closed_at_same |= top == indent;
            self.conditions.pop();
            let at = self.state.lines[idx].content_from();
            self.state.push_token(
                idx,
                TokenKind::Condition {
                    kind: ConditionKind::Close,
                    check: None,
                },
                at,
                at,
                top,
            );
        }
        closed_at_same
    }

    fn close_all_conditions(&mut self, idx: usize) {
        let at = self.state.lines[idx].content_from();
        while let Some(top) = self.conditions.pop() {
            self.state.push_token(
                idx,
                TokenKind::Condition {
                    kind: ConditionKind::Close,
                    check: None,
                },
                at,
                at,
                top,
            );
        }
    }

    fn end_choice_group(&mut self, idx: usize, at: usize) {
        self.choice_open = false;
        self.state
            .push_token(idx, TokenKind::ChoiceGroupEnd, at, at, 0);
    }

    fn warn_unreachable(&mut self, idx: usize, line: &LineRecord) {
        if self.terminated && !self.reported_unreachable {
            self.reported_unreachable = true;
            self.state.push_diagnostic(
                idx,
                Diagnostic::warning(
                    line.content_from(),
                    line.content_to(),
                    "This line can never be reached".to_string(),
                    "parser",
                ),
            );
        }
    }

    /// Functions and detectors are value-only blocks; display and flow
    /// tokens inside them are reported on the spot.
    fn check_scope(&mut self, idx: usize, token: Option<usize>) {
        let Some(token) = token else {
            return;
        };
        let (label, from, to, section_id, display, flow, returns) = {
            let t = &self.state.tokens[token];
            (
                t.kind.tag().label(),
                t.from,
                t.to,
                t.section_id.clone(),
                t.is_display(),
                t.is_flow(),
                matches!(t.kind, TokenKind::Return { .. }),
            )
        };
        let kind = self.state.symbols.sections.get(&section_id).map(|s| &s.kind);
        let holder = match kind {
            Some(SectionKind::Function { .. }) if display || flow => "function",
            Some(SectionKind::Detector { .. }) if display || flow || returns => "detector",
            _ => return,
        };
        self.state.push_diagnostic(
            idx,
            Diagnostic::error(
                from,
                to,
                format!("A {} cannot contain {}", holder, label),
                "parser",
            ),
        );
    }

    /* ===================== End of Input ===================== */

    fn finish(&mut self) {
        let Some(idx) = self.state.lines.len().checked_sub(1) else {
            return;
        };
        let end = self.state.text_len;
        if self.choice_open {
            self.choice_open = false;
            self.state
                .push_token(idx, TokenKind::ChoiceGroupEnd, end, end, 0);
        }
        while let Some(top) = self.conditions.pop() {
            self.state.push_token(
                idx,
                TokenKind::Condition {
                    kind: ConditionKind::Close,
                    check: None,
                },
                end,
                end,
                top,
            );
        }
    }
}
