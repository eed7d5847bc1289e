//! Declared symbols and scope resolution
//!
//! Sections, variables, tags, assets and entities share one name
//! space. Every declaration is keyed by a qualified id built from its
//! owning section's id plus the declared name, and one outward
//! scope-chain walk backs every lookup: drop the last dot-segment of
//! the current scope until the name is found or the root scope is
//! exhausted.

use crate::parser::token::{AssetKind, VariableKind};
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/* ===================== Declarations ===================== */

/// Kind of block a heading declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum SectionKind {
    /// Plain narrative section
    Section,
    /// `# name -> type`; callable, returns a value
    Function { returns: ValueType },
    /// `# name()`; callable, no return value
    Method,
    /// `# name when a, b`; runs when a watched trigger fires
    Detector { triggers: Vec<String> },
}

impl SectionKind {
    /// True for kinds that can be invoked with `name()`.
    pub fn is_callable(&self) -> bool {
        matches!(self, SectionKind::Function { .. } | SectionKind::Method)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SectionKind::Section => "section",
            SectionKind::Function { .. } => "function",
            SectionKind::Method => "method",
            SectionKind::Detector { .. } => "detector",
        }
    }
}

/// A declared section.
///
/// The root of the document is itself a section with the empty id; a
/// depth-1 heading `# intro` becomes `.intro`, its children
/// `.intro.cave` and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    pub kind: SectionKind,
    /// Heading depth; the root section is depth 0
    pub depth: usize,
    /// Document order; the root section is index 0
    pub index: usize,
    pub line: usize,
    pub from: usize,
    pub to: usize,
    /// Indices into the global token list, in source order
    pub tokens: Vec<usize>,
    /// Qualified ids of variables declared directly in this section
    pub variables: Vec<String>,
    /// Qualified ids of tags declared directly in this section
    pub tags: Vec<String>,
    /// Qualified ids of assets declared directly in this section
    pub assets: Vec<String>,
}

/// A declared variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub name: String,
    pub section_id: String,
    pub kind: VariableKind,
    /// Annotated type, if the declaration carried one
    pub declared_type: Option<ValueType>,
    /// Parse-time value, when the initializer could be evaluated
    pub value: Option<Value>,
    pub line: usize,
    pub from: usize,
    pub to: usize,
}

impl Variable {
    /// Declared type if annotated, otherwise the initializer's type.
    pub fn effective_type(&self) -> Option<ValueType> {
        self.declared_type
            .clone()
            .or_else(|| self.value.as_ref().map(|v| v.value_type()))
    }
}

/// A declared tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDecl {
    pub id: String,
    pub name: String,
    pub section_id: String,
    pub value: Option<Value>,
    pub line: usize,
    pub from: usize,
    pub to: usize,
}

/// A declared asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub section_id: String,
    pub kind: AssetKind,
    /// Resolved path value; `None` when the expression did not evaluate
    pub value: Option<Value>,
    pub line: usize,
    pub from: usize,
    pub to: usize,
}

/// A declared entity with its literal fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub entity_type: String,
    pub fields: BTreeMap<String, Value>,
    pub line: usize,
    pub from: usize,
    pub to: usize,
}

impl Entity {
    /// Stable hash over the entity's type, name and fields.
    ///
    /// Renderers diff this to decide whether a portrait or voice needs
    /// reloading, so the field order must not depend on declaration
    /// order. The `BTreeMap` takes care of that.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.entity_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.name.as_bytes());
        for (field, value) in &self.fields {
            hasher.update([0u8]);
            hasher.update(field.as_bytes());
            hasher.update([1u8]);
            hasher.update(value.to_string().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// The value this entity takes when referenced in an expression.
    pub fn as_value(&self) -> Value {
        Value::Entity {
            entity_type: self.entity_type.clone(),
            name: self.name.clone(),
        }
    }
}

/* ===================== Resolution ===================== */

/// What a name resolved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Section(&'a Section),
    Variable(&'a Variable),
    Tag(&'a TagDecl),
    Asset(&'a Asset),
    Entity(&'a Entity),
}

impl<'a> Resolved<'a> {
    /// Qualified id of the resolved declaration (entity names are
    /// already global).
    pub fn id(&self) -> &'a str {
        match self {
            Resolved::Section(s) => &s.id,
            Resolved::Variable(v) => &v.id,
            Resolved::Tag(t) => &t.id,
            Resolved::Asset(a) => &a.id,
            Resolved::Entity(e) => &e.name,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resolved::Section(s) => s.kind.label(),
            Resolved::Variable(_) => "variable",
            Resolved::Tag(_) => "tag",
            Resolved::Asset(_) => "asset",
            Resolved::Entity(_) => "entity",
        }
    }

    /// Span of the declaration, for Focus actions.
    pub fn span(&self) -> (usize, usize) {
        match self {
            Resolved::Section(s) => (s.from, s.to),
            Resolved::Variable(v) => (v.from, v.to),
            Resolved::Tag(t) => (t.from, t.to),
            Resolved::Asset(a) => (a.from, a.to),
            Resolved::Entity(e) => (e.from, e.to),
        }
    }
}

/// Copyable facts about an existing declaration, reported back when an
/// insert collides with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Existing {
    pub id: String,
    pub label: &'static str,
    pub from: usize,
    pub to: usize,
}

/// One use of a name somewhere in the script, resolved or not.
///
/// The parser records a reference for every name it touches, including
/// the declarations themselves, so editors can answer go-to-definition
/// and find-usages queries from this list alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub from: usize,
    pub to: usize,
    pub name: String,
    /// Qualified id of the resolved declaration; `None` when the name
    /// did not resolve
    pub id: Option<String>,
    /// True at the declaration site itself
    pub declaration: bool,
}

/* ===================== SymbolTables ===================== */

/// All declarations of a parsed script, keyed by qualified id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTables {
    pub sections: HashMap<String, Section>,
    /// Section ids in document order (root first)
    pub section_order: Vec<String>,
    pub variables: HashMap<String, Variable>,
    pub tags: HashMap<String, TagDecl>,
    pub assets: HashMap<String, Asset>,
    /// Entities live in a single global namespace, keyed by lowercased
    /// name
    pub entities: HashMap<String, Entity>,
}

impl SymbolTables {
    /// Tables holding only the implicit root section.
    pub fn new() -> Self {
        let mut tables = Self::default();
        tables.sections.insert(String::new(), Section {
            id: String::new(),
            name: String::new(),
            kind: SectionKind::Section,
            depth: 0,
            index: 0,
            line: 0,
            from: 0,
            to: 0,
            tokens: Vec::new(),
            variables: Vec::new(),
            tags: Vec::new(),
            assets: Vec::new(),
        });
        tables.section_order.push(String::new());
        tables
    }

    /// Build the qualified id of `name` declared in `scope`.
    pub fn qualified(scope: &str, name: &str) -> String {
        format!("{}.{}", scope, name)
    }

    /// Drop the last dot-segment of an id; the root scope has no parent.
    pub fn parent_id(id: &str) -> Option<&str> {
        id.rfind('.').map(|dot| &id[..dot])
    }

    /// The last dot-segment of an id (the declared name).
    pub fn last_segment(id: &str) -> &str {
        id.rfind('.').map(|dot| &id[dot + 1..]).unwrap_or(id)
    }

    /// Look for `name` in exactly one scope, without walking the chain.
    fn find_in_scope(&self, scope: &str, name: &str) -> Option<Resolved<'_>> {
        let id = Self::qualified(scope, name);
        if let Some(v) = self.variables.get(&id) {
            return Some(Resolved::Variable(v));
        }
        if let Some(t) = self.tags.get(&id) {
            return Some(Resolved::Tag(t));
        }
        if let Some(a) = self.assets.get(&id) {
            return Some(Resolved::Asset(a));
        }
        self.sections.get(&id).map(Resolved::Section)
    }

    /// Resolve `name` from `scope`, walking the scope chain outward.
    ///
    /// This single routine backs variable, tag, asset and section
    /// lookup; entities are consulted last since their namespace is
    /// global.
    pub fn lookup(&self, scope: &str, name: &str) -> Option<Resolved<'_>> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(found) = self.find_in_scope(s, name) {
                return Some(found);
            }
            current = Self::parent_id(s);
        }
        self.entities.get(&name.to_lowercase()).map(Resolved::Entity)
    }

    /// Whether declaring `name` in `scope` would collide, and with what.
    pub fn collision(&self, scope: &str, name: &str) -> Option<Existing> {
        let found = self
            .find_in_scope(scope, name)
            .or_else(|| self.entities.get(&name.to_lowercase()).map(Resolved::Entity))?;
        Some(Existing {
            id: found.id().to_string(),
            label: found.label(),
            from: found.span().0,
            to: found.span().1,
        })
    }

    /// Insert a section; on a name collision the existing declaration
    /// wins and is reported back.
    pub fn declare_section(&mut self, section: Section) -> Result<(), Existing> {
        let scope = Self::parent_id(&section.id).unwrap_or_default().to_string();
        if let Some(existing) = self.collision(&scope, &section.name) {
            return Err(existing);
        }
        self.section_order.push(section.id.clone());
        self.sections.insert(section.id.clone(), section);
        Ok(())
    }

    pub fn declare_variable(&mut self, variable: Variable) -> Result<(), Existing> {
        if let Some(existing) = self.collision(&variable.section_id, &variable.name) {
            return Err(existing);
        }
        if let Some(owner) = self.sections.get_mut(&variable.section_id) {
            owner.variables.push(variable.id.clone());
        }
        self.variables.insert(variable.id.clone(), variable);
        Ok(())
    }

    pub fn declare_tag(&mut self, tag: TagDecl) -> Result<(), Existing> {
        if let Some(existing) = self.collision(&tag.section_id, &tag.name) {
            return Err(existing);
        }
        if let Some(owner) = self.sections.get_mut(&tag.section_id) {
            owner.tags.push(tag.id.clone());
        }
        self.tags.insert(tag.id.clone(), tag);
        Ok(())
    }

    pub fn declare_asset(&mut self, asset: Asset) -> Result<(), Existing> {
        if let Some(existing) = self.collision(&asset.section_id, &asset.name) {
            return Err(existing);
        }
        if let Some(owner) = self.sections.get_mut(&asset.section_id) {
            owner.assets.push(asset.id.clone());
        }
        self.assets.insert(asset.id.clone(), asset);
        Ok(())
    }

    pub fn declare_entity(&mut self, entity: Entity) -> Result<(), Existing> {
        // Entity names are global, so the collision check runs from the
        // root scope.
        if let Some(existing) = self.collision("", &entity.name) {
            return Err(existing);
        }
        // Keyed by folded name; speaker cues match case-insensitively
        self.entities.insert(entity.name.to_lowercase(), entity);
        Ok(())
    }

    /// Names visible from `scope` with their parse-time values, inner
    /// scopes shadowing outer ones. This is the context handed to the
    /// expression evaluator during resolution.
    pub fn context_for(&self, scope: &str) -> HashMap<String, Value> {
        let mut context = HashMap::new();
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(section) = self.sections.get(s) {
                for id in &section.variables {
                    if let Some(v) = self.variables.get(id) {
                        if let Some(value) = &v.value {
                            context.entry(v.name.clone()).or_insert_with(|| value.clone());
                        }
                    }
                }
                for id in &section.tags {
                    if let Some(t) = self.tags.get(id) {
                        if let Some(value) = &t.value {
                            context.entry(t.name.clone()).or_insert_with(|| value.clone());
                        }
                    }
                }
                for id in &section.assets {
                    if let Some(a) = self.assets.get(id) {
                        if let Some(value) = &a.value {
                            context.entry(a.name.clone()).or_insert_with(|| value.clone());
                        }
                    }
                }
            }
            current = Self::parent_id(s);
        }
        for entity in self.entities.values() {
            context
                .entry(entity.name.clone())
                .or_insert_with(|| entity.as_value());
        }
        context
    }

    /// Immediate child sections of `id`, in document order.
    pub fn children_of(&self, id: &str) -> Vec<&Section> {
        let mut children: Vec<&Section> = self
            .sections
            .values()
            .filter(|s| !s.id.is_empty() && Self::parent_id(&s.id) == Some(id))
            .collect();
        children.sort_by_key(|s| s.index);
        children
    }
}
