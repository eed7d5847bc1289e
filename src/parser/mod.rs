//! Line-oriented script parser
//!
//! Parsing runs in two passes over the lines of a script. The
//! declaration pass collects every heading, variable, tag, asset and
//! entity into the symbol tables without emitting a single token; the
//! content pass then walks the lines again, emitting all tokens in
//! source order and resolving every name and expression against the
//! now-complete tables. Forward references cost nothing and the token
//! stream never needs reordering.
//!
//! The parser never fails: malformed lines become [`TokenKind::Invalid`]
//! tokens plus diagnostics, and everything after them parses normally.
//!
//! [`TokenKind::Invalid`]: token::TokenKind::Invalid

mod content;
mod declarations;
mod patterns;
mod resolver;
mod state;

pub mod diagnostics;
pub mod structure;
pub mod symbols;
pub mod token;

#[cfg(test)]
mod tests;

use crate::eval::{Evaluator, StandardEvaluator};
use crate::parser::diagnostics::{Diagnostic, Severity};
use crate::parser::state::ParserState;
use crate::parser::structure::Outline;
use crate::parser::symbols::{
    Asset, Entity, Reference, Section, SymbolTables, TagDecl, Variable,
};
use crate::parser::token::{AssetKind, Token, TokenTag, VariableKind};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/* ===================== Options ===================== */

/// Knobs for a parse run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Added to every reported line number, for scripts embedded in a
    /// larger document
    pub line_offset: usize,
    /// Also blank `/* ... */` ranges before splitting lines; `//`
    /// comments are always blanked
    pub remove_block_comments: bool,
    /// Token kinds to leave out of the stream entirely
    pub skip_tokens: Vec<TokenTag>,
}

/* ===================== Augmentations ===================== */

/// Declarations injected by the host application before parsing, so
/// scripts can use built-in names without declaring them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Augmentations {
    pub variables: Vec<SeedVariable>,
    pub entities: Vec<SeedEntity>,
    pub tags: Vec<SeedTag>,
    pub assets: Vec<SeedAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedVariable {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntity {
    pub entity_type: String,
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTag {
    pub name: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedAsset {
    pub kind: AssetKind,
    pub name: String,
    pub value: String,
}

/* ===================== Result ===================== */

/// Everything a parse produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    /// Every token, in source order
    pub tokens: Vec<Token>,
    pub symbols: SymbolTables,
    pub diagnostics: Vec<Diagnostic>,
    /// Every name use, sorted by position
    pub references: Vec<Reference>,
    pub outline: Outline,
    /// Indices of the title page tokens
    pub title_tokens: Vec<usize>,
    /// Title page key/value pairs, first occurrence winning
    pub properties: HashMap<String, String>,
    /// Line number -> indices of the tokens on that line
    pub line_tokens: HashMap<usize, Vec<usize>>,
    /// Line number -> id of the owning section
    pub line_sections: HashMap<usize, String>,
}

impl ParseResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Tokens on a 1-based line, in emission order.
    pub fn tokens_on_line(&self, line: usize) -> impl Iterator<Item = &Token> {
        self.line_tokens
            .get(&line)
            .into_iter()
            .flatten()
            .map(|&index| &self.tokens[index])
    }

    /// The section owning a 1-based line.
    pub fn section_at_line(&self, line: usize) -> Option<&Section> {
        let id = self.line_sections.get(&line)?;
        self.symbols.sections.get(id)
    }

    /// Entities grouped by type, then by name.
    pub fn object_map(&self) -> HashMap<&str, HashMap<&str, &Entity>> {
        let mut map: HashMap<&str, HashMap<&str, &Entity>> = HashMap::new();
        for entity in self.symbols.entities.values() {
            map.entry(entity.entity_type.as_str())
                .or_default()
                .insert(entity.name.as_str(), entity);
        }
        map
    }
}

/* ===================== Entry Points ===================== */

/// Parse a script.
pub fn parse(
    text: &str,
    augmentations: Option<&Augmentations>,
    options: &ParseOptions,
    evaluator: &dyn Evaluator,
) -> ParseResult {
    let mut state = ParserState::new(text, options, evaluator);
    if let Some(augmentations) = augmentations {
        apply_augmentations(&mut state, augmentations);
    }
    declarations::run(&mut state);
    content::run(&mut state);
    debug!(
        tokens = state.tokens.len(),
        diagnostics = state.diagnostics.len(),
        "parsed script"
    );

    let mut references = state.references;
    references.sort_by_key(|r| (r.from, r.to));

    ParseResult {
        tokens: state.tokens,
        symbols: state.symbols,
        diagnostics: state.diagnostics,
        references,
        outline: state.outline.finish(),
        title_tokens: state.title_tokens,
        properties: state.properties,
        line_tokens: state.line_tokens,
        line_sections: state.line_sections,
    }
}

/// Parse with the standard evaluator and default options.
pub fn parse_text(text: &str) -> ParseResult {
    parse(text, None, &ParseOptions::default(), &StandardEvaluator)
}

fn apply_augmentations(state: &mut ParserState<'_>, augmentations: &Augmentations) {
    for seed in &augmentations.variables {
        let variable = Variable {
            id: SymbolTables::qualified("", &seed.name),
            name: seed.name.clone(),
            section_id: String::new(),
            kind: VariableKind::Var,
            declared_type: None,
            value: Some(seed.value.clone()),
            line: 0,
            from: 0,
            to: 0,
        };
        if let Err(existing) = state.symbols.declare_variable(variable) {
            seed_collision(state, &seed.name, existing.label);
        }
    }
    for seed in &augmentations.tags {
        let tag = TagDecl {
            id: SymbolTables::qualified("", &seed.name),
            name: seed.name.clone(),
            section_id: String::new(),
            value: seed.value.clone(),
            line: 0,
            from: 0,
            to: 0,
        };
        if let Err(existing) = state.symbols.declare_tag(tag) {
            seed_collision(state, &seed.name, existing.label);
        }
    }
    for seed in &augmentations.assets {
        let asset = Asset {
            id: SymbolTables::qualified("", &seed.name),
            name: seed.name.clone(),
            section_id: String::new(),
            kind: seed.kind,
            value: Some(Value::Str(seed.value.clone())),
            line: 0,
            from: 0,
            to: 0,
        };
        if let Err(existing) = state.symbols.declare_asset(asset) {
            seed_collision(state, &seed.name, existing.label);
        }
    }
    for seed in &augmentations.entities {
        let entity = Entity {
            name: seed.name.clone(),
            entity_type: seed.entity_type.clone(),
            fields: seed.fields.clone(),
            line: 0,
            from: 0,
            to: 0,
        };
        if let Err(existing) = state.symbols.declare_entity(entity) {
            seed_collision(state, &seed.name, existing.label);
        }
    }
}

fn seed_collision(state: &mut ParserState<'_>, name: &str, label: &'static str) {
    state.push_diagnostic(
        0,
        Diagnostic::error(
            0,
            0,
            format!("A {} named '{}' has already been declared", label, name),
            "parser",
        ),
    );
}
