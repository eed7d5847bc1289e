//! Declaration pass
//!
//! The first of the parser's two passes. It walks every line once,
//! builds the section tree and the symbol tables, records which
//! section owns each line, and claims the lines it recognized so the
//! content pass can emit their tokens in source order. No expressions
//! are evaluated here; initializers are resolved in the second pass,
//! in reading order, once every declaration is known.

use crate::parser::diagnostics::{Diagnostic, DiagnosticAction};
use crate::parser::state::{LineClaim, LineRecord, ParserState};
use crate::parser::symbols::{
    Asset, Entity, Existing, Section, SectionKind, SymbolTables, TagDecl, Variable,
};
use crate::parser::token::{AssetKind, VariableKind};
use crate::value::ValueType;
use regex::Captures;
use std::collections::BTreeMap;
use tracing::trace;

pub fn run(state: &mut ParserState<'_>) {
    DeclarationPass {
        state,
        stack: Vec::new(),
        in_title: true,
        entity: None,
        next_index: 1,
    }
    .run();
}

/// An open entity block.
struct OpenEntity {
    name: String,
    indent: usize,
    duplicate: bool,
}

struct DeclarationPass<'a, 'b> {
    state: &'a mut ParserState<'b>,
    /// Open headings, outermost first: (effective depth, section id)
    stack: Vec<(usize, String)>,
    /// Still inside the title page block at the top of the file
    in_title: bool,
    entity: Option<OpenEntity>,
    next_index: usize,
}

impl DeclarationPass<'_, '_> {
    fn run(mut self) {
        for idx in 0..self.state.lines.len() {
            self.line(idx);
        }
    }

    fn current_id(&self) -> &str {
        self.stack.last().map(|(_, id)| id.as_str()).unwrap_or("")
    }

    /// Record which section owns this line.
    fn assign_section(&mut self, idx: usize) {
        let line = self.state.line_number(idx);
        let id = self.current_id().to_string();
        self.state.line_sections.insert(line, id);
    }

    fn line(&mut self, idx: usize) {
        let line = self.state.lines[idx].clone();
        let indent = line.indent();

        // Lines indented under an entity header belong to its block.
        if let Some(open) = self.entity.take() {
            if !line.is_blank() && indent > open.indent {
                self.entity_field(idx, &line, &open);
                self.entity = Some(open);
                self.assign_section(idx);
                return;
            }
        }

        if line.is_blank() {
            self.in_title = false;
            self.assign_section(idx);
            return;
        }

        let trimmed = line.trimmed().to_string();

        if self.state.rules.heading_loose.is_match(&trimmed) {
            if let Some(caps) = self.state.rules.heading.captures(&trimmed).map(own_captures) {
                self.heading(idx, &line, &caps);
            } else {
                self.invalid(idx, &line, "heading");
            }
        } else if self.state.rules.variable_loose.is_match(&trimmed) {
            if let Some(caps) = self.state.rules.variable.captures(&trimmed).map(own_captures) {
                self.variable(idx, &line, &caps);
            } else {
                self.invalid(idx, &line, "variable declaration");
            }
        } else if self.state.rules.asset_loose.is_match(&trimmed) {
            if let Some(caps) = self.state.rules.asset.captures(&trimmed).map(own_captures) {
                self.asset(idx, &line, &caps);
            } else {
                self.invalid(idx, &line, "asset declaration");
            }
        } else if self.state.rules.tag_loose.is_match(&trimmed) {
            if let Some(caps) = self.state.rules.tag.captures(&trimmed).map(own_captures) {
                self.tag(idx, &line, &caps);
            } else {
                self.invalid(idx, &line, "tag declaration");
            }
        } else if self.state.rules.import_loose.is_match(&trimmed) {
            if let Some(caps) = self.state.rules.import.captures(&trimmed).map(own_captures) {
                self.state.claims.insert(
                    idx,
                    LineClaim::Import {
                        path: caps.text("path").unwrap_or_default(),
                    },
                );
                self.in_title = false;
            } else {
                self.invalid(idx, &line, "import");
            }
        } else if let Some(caps) = self.entity_header(&trimmed) {
            self.entity_block(idx, &line, &caps);
        } else if self.in_title {
            if let Some(caps) = self.state.rules.property.captures(&trimmed).map(own_captures) {
                let key = caps.text("key").unwrap_or_default();
                let value = caps.text("value").unwrap_or_default();
                self.state
                    .properties
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
                self.state
                    .claims
                    .insert(idx, LineClaim::Property { key, value });
            } else {
                // First content line; the title page is over.
                self.in_title = false;
            }
        }

        self.assign_section(idx);
    }

    fn entity_header(&self, trimmed: &str) -> Option<OwnedCaptures> {
        let caps = self.state.rules.entity.captures(trimmed).map(own_captures)?;
        let entity_type = caps.text("type").unwrap_or_default();
        if crate::parser::patterns::LineRules::is_reserved(&entity_type) {
            return None;
        }
        Some(caps)
    }

    /* ===================== Headings ===================== */

    fn heading(&mut self, idx: usize, line: &LineRecord, caps: &OwnedCaptures) {
        self.in_title = false;

        let base = line.content_from();
        let (marks_from, marks_to) = caps.span("marks").unwrap_or((0, 1));
        let name = caps.text("name").unwrap_or_default();
        let (name_from, name_to) = caps.span("name").unwrap_or((0, 0));

        let kind = if caps.span("method").is_some() {
            SectionKind::Method
        } else if let Some(returns) = caps.text("ret") {
            SectionKind::Function {
                returns: ValueType::parse(&returns),
            }
        } else if let Some(triggers) = caps.text("triggers") {
            SectionKind::Detector {
                triggers: triggers.split(',').map(|t| t.trim().to_string()).collect(),
            }
        } else {
            SectionKind::Section
        };

        let written_depth = marks_to - marks_from;
        while matches!(self.stack.last(), Some(&(d, _)) if d >= written_depth) {
            self.stack.pop();
        }
        let (parent_depth, parent_id) = self
            .stack
            .last()
            .map(|(d, id)| (*d, id.clone()))
            .unwrap_or((0, String::new()));

        // A heading may nest at most one level below its parent. Deeper
        // jumps are flattened to the expected depth and flagged with a
        // quick fix, and the parse carries on.
        let expected = parent_depth + 1;
        let depth = if written_depth > expected {
            self.state.push_diagnostic(
                idx,
                Diagnostic::warning(
                    base + marks_from,
                    base + marks_to,
                    format!(
                        "Heading depth jumps from {} to {}",
                        parent_depth, written_depth
                    ),
                    "parser",
                )
                .with_action(DiagnosticAction::Replace {
                    from: base + marks_from,
                    to: base + marks_to,
                    text: "#".repeat(expected),
                }),
            );
            expected
        } else {
            written_depth
        };

        let id = SymbolTables::qualified(&parent_id, &name);
        trace!(id = %id, depth, "heading");

        let section = Section {
            id: id.clone(),
            name: name.clone(),
            kind,
            depth,
            index: self.next_index,
            line: self.state.line_number(idx),
            from: base + name_from,
            to: base + name_to,
            tokens: Vec::new(),
            variables: Vec::new(),
            tags: Vec::new(),
            assets: Vec::new(),
        };

        match self.state.symbols.declare_section(section) {
            Ok(()) => {
                self.next_index += 1;
                self.stack.push((depth, id.clone()));
                self.state.claims.insert(idx, LineClaim::Heading { id });
            }
            Err(existing) => {
                self.report_collision(idx, base + name_from, base + name_to, &name, &existing);
                if is_block_label(existing.label) {
                    // Same name, same scope: fold this heading into the
                    // existing section.
                    self.stack.push((depth, existing.id.clone()));
                    self.state
                        .claims
                        .insert(idx, LineClaim::Heading { id: existing.id });
                } else {
                    self.state
                        .claims
                        .insert(idx, LineClaim::Invalid { construct: "heading" });
                }
            }
        }
    }

    /* ===================== Value Declarations ===================== */

    fn variable(&mut self, idx: usize, line: &LineRecord, caps: &OwnedCaptures) {
        self.in_title = false;
        let base = line.content_from();
        let name = caps.text("name").unwrap_or_default();
        let (name_from, name_to) = caps.span("name").unwrap_or((0, 0));
        let kind = match caps.text("kind").as_deref() {
            Some("temp") => VariableKind::Temp,
            _ => VariableKind::Var,
        };
        let declared_type = caps.text("type").map(|t| ValueType::parse(&t));

        let scope = self.current_id().to_string();
        let id = SymbolTables::qualified(&scope, &name);
        let variable = Variable {
            id: id.clone(),
            name: name.clone(),
            section_id: scope,
            kind,
            declared_type,
            value: None,
            line: self.state.line_number(idx),
            from: base + name_from,
            to: base + name_to,
        };

        let duplicate = match self.state.symbols.declare_variable(variable) {
            Ok(()) => false,
            Err(existing) => {
                self.report_collision(idx, base + name_from, base + name_to, &name, &existing);
                true
            }
        };
        self.state
            .claims
            .insert(idx, LineClaim::Variable { id, duplicate });
    }

    fn asset(&mut self, idx: usize, line: &LineRecord, caps: &OwnedCaptures) {
        self.in_title = false;
        let base = line.content_from();
        let name = caps.text("name").unwrap_or_default();
        let (name_from, name_to) = caps.span("name").unwrap_or((0, 0));
        let kind = caps
            .text("kind")
            .and_then(|k| AssetKind::parse(&k))
            .unwrap_or(AssetKind::Image);

        let scope = self.current_id().to_string();
        let id = SymbolTables::qualified(&scope, &name);
        let asset = Asset {
            id: id.clone(),
            name: name.clone(),
            section_id: scope,
            kind,
            value: None,
            line: self.state.line_number(idx),
            from: base + name_from,
            to: base + name_to,
        };

        let duplicate = match self.state.symbols.declare_asset(asset) {
            Ok(()) => false,
            Err(existing) => {
                self.report_collision(idx, base + name_from, base + name_to, &name, &existing);
                true
            }
        };
        self.state
            .claims
            .insert(idx, LineClaim::Asset { id, duplicate });
    }

    fn tag(&mut self, idx: usize, line: &LineRecord, caps: &OwnedCaptures) {
        self.in_title = false;
        let base = line.content_from();
        let name = caps.text("name").unwrap_or_default();
        let (name_from, name_to) = caps.span("name").unwrap_or((0, 0));

        let scope = self.current_id().to_string();
        let id = SymbolTables::qualified(&scope, &name);
        let tag = TagDecl {
            id: id.clone(),
            name: name.clone(),
            section_id: scope,
            value: None,
            line: self.state.line_number(idx),
            from: base + name_from,
            to: base + name_to,
        };

        let duplicate = match self.state.symbols.declare_tag(tag) {
            Ok(()) => false,
            Err(existing) => {
                self.report_collision(idx, base + name_from, base + name_to, &name, &existing);
                true
            }
        };
        self.state.claims.insert(idx, LineClaim::Tag { id, duplicate });
    }

    /* ===================== Entities ===================== */

    fn entity_block(&mut self, idx: usize, line: &LineRecord, caps: &OwnedCaptures) {
        self.in_title = false;
        let base = line.content_from();
        let entity_type = caps.text("type").unwrap_or_default();
        let name = caps.text("name").unwrap_or_default();
        let (name_from, name_to) = caps.span("name").unwrap_or((0, 0));

        let entity = Entity {
            name: name.clone(),
            entity_type,
            fields: BTreeMap::new(),
            line: self.state.line_number(idx),
            from: base + name_from,
            to: base + name_to,
        };

        let duplicate = match self.state.symbols.declare_entity(entity) {
            Ok(()) => false,
            Err(existing) => {
                self.report_collision(idx, base + name_from, base + name_to, &name, &existing);
                true
            }
        };
        self.entity = Some(OpenEntity {
            name: name.clone(),
            indent: line.indent(),
            duplicate,
        });
        self.state
            .claims
            .insert(idx, LineClaim::Entity { name, duplicate });
    }

    fn entity_field(&mut self, idx: usize, line: &LineRecord, open: &OpenEntity) {
        let trimmed = line.trimmed().to_string();
        match self.state.rules.entity_field.captures(&trimmed).map(own_captures) {
            Some(caps) => {
                self.state.claims.insert(
                    idx,
                    LineClaim::EntityField {
                        entity: open.name.clone(),
                        field: caps.text("name").unwrap_or_default(),
                        duplicate: open.duplicate,
                    },
                );
            }
            None => {
                self.state.push_diagnostic(
                    idx,
                    Diagnostic::error(
                        line.content_from(),
                        line.content_to(),
                        format!("Invalid field for entity '{}'", open.name),
                        "parser",
                    ),
                );
                self.state
                    .claims
                    .insert(idx, LineClaim::Invalid { construct: "entity field" });
            }
        }
    }

    /* ===================== Shared ===================== */

    fn invalid(&mut self, idx: usize, line: &LineRecord, construct: &'static str) {
        self.in_title = false;
        self.state.push_diagnostic(
            idx,
            Diagnostic::error(
                line.content_from(),
                line.content_to(),
                format!("Invalid {} syntax", construct),
                "parser",
            ),
        );
        self.state
            .claims
            .insert(idx, LineClaim::Invalid { construct });
    }

    fn report_collision(
        &mut self,
        idx: usize,
        from: usize,
        to: usize,
        name: &str,
        existing: &Existing,
    ) {
        self.state.push_diagnostic(
            idx,
            Diagnostic::error(
                from,
                to,
                format!(
                    "A {} named '{}' has already been declared",
                    existing.label, name
                ),
                "parser",
            )
            .with_action(DiagnosticAction::Focus {
                from: existing.from,
                to: existing.to,
            }),
        );
    }
}

fn is_block_label(label: &str) -> bool {
    matches!(label, "section" | "function" | "method" | "detector")
}

/* ===================== Captures ===================== */

/// Capture texts and spans lifted out of a borrowed [`Captures`], so
/// claim handling can mutate the parser state freely.
pub struct OwnedCaptures {
    groups: Vec<(&'static str, Option<(usize, usize, String)>)>,
}

impl OwnedCaptures {
    pub fn text(&self, group: &str) -> Option<String> {
        self.groups
            .iter()
            .find(|(name, _)| *name == group)
            .and_then(|(_, m)| m.as_ref().map(|(_, _, text)| text.clone()))
    }

    pub fn span(&self, group: &str) -> Option<(usize, usize)> {
        self.groups
            .iter()
            .find(|(name, _)| *name == group)
            .and_then(|(_, m)| m.as_ref().map(|(from, to, _)| (*from, *to)))
    }
}

const CAPTURE_GROUPS: &[&str] = &[
    "marks", "name", "method", "ret", "triggers", "kind", "type", "op", "value", "path", "key",
];

pub fn own_captures(caps: Captures<'_>) -> OwnedCaptures {
    OwnedCaptures {
        groups: CAPTURE_GROUPS
            .iter()
            .map(|&group| {
                let m = caps
                    .name(group)
                    .map(|m| (m.start(), m.end(), m.as_str().to_string()));
                (group, m)
            })
            .collect(),
    }
}
