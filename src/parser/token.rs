//! Script tokens
//!
//! A token is one classified line of script (plus a handful of
//! synthesized markers that close indentation blocks and bracket choice
//! groups). The payload lives in [`TokenKind`], a closed tagged union,
//! so consumers match on the variant instead of probing optional
//! fields. [`TokenTag`] is the fieldless mirror used for skip filters
//! and queries.

use crate::value::ValueType;
use serde::{Deserialize, Serialize};

/* ===================== Token ===================== */

/// One classified line (or synthesized marker) of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// What the line is, with its variant-specific payload
    pub kind: TokenKind,
    /// 1-based line number (offset by `ParseOptions::line_offset`)
    pub line: usize,
    /// Absolute byte offset of the token's first character
    pub from: usize,
    /// Absolute byte offset past the token's last character
    pub to: usize,
    /// Indentation depth in levels (tab or four spaces per level)
    pub indent: usize,
    /// Id of the section this token belongs to
    pub section_id: String,
    /// Set when a later token absorbed this one (dialogue/action merging)
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignored: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Payload of a [`Token`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TokenKind {
    /// `# name` heading that opens a section
    Section { name: String, depth: usize },
    /// `INT. KITCHEN - DAY` or `.forced heading`
    SceneHeading { text: String, number: usize },
    /// `= summary line` attached to the preceding outline node
    Synopsis { text: String },
    /// `===` or `---`
    Separator,
    /// Prose with no more specific classification
    Action { text: String },
    /// `@name` or an all-caps line announcing a speaker
    Cue { character: String, dual: bool },
    /// Speech or parenthetical under the current cue
    Dialogue {
        character: String,
        text: String,
        parenthetical: bool,
    },
    /// `> text <`
    Centered { text: String },
    /// `CUT TO:`
    Transition { text: String },
    /// `if expr` / `else` / synthesized close marker
    Condition {
        #[serde(rename = "condition_kind")]
        kind: ConditionKind,
        check: Option<String>,
    },
    /// Synthesized marker before the first choice of a group
    ChoiceGroupStart,
    /// Synthesized marker after the last choice of a group
    ChoiceGroupEnd,
    /// `* text` or `+ text`, optionally with a `> target`
    Choice {
        text: String,
        sticky: bool,
        target: Option<String>,
        calls: Vec<Option<String>>,
    },
    /// `> target`; `calls` holds the resolved section id per candidate
    Jump {
        target: String,
        calls: Vec<Option<String>>,
    },
    /// `< expr` or bare `<`
    Return { value: Option<String> },
    /// `name()` call line
    Call {
        name: String,
        resolved: Option<String>,
    },
    /// `name op expr` assignment
    Assign {
        name: String,
        operator: AssignOp,
        value: String,
        resolved: Option<String>,
    },
    /// `var` / `temp` declaration
    Variable {
        #[serde(rename = "variable_kind")]
        kind: VariableKind,
        name: String,
        declared_type: Option<ValueType>,
        value: Option<String>,
    },
    /// `type name:` entity block header
    Entity { entity_type: String, name: String },
    /// Indented `field = literal` inside an entity block
    EntityField { name: String, value: String },
    /// `tag name` with an optional value
    Tag { name: String, value: Option<String> },
    /// `image` / `audio` / `video` declaration
    Asset {
        #[serde(rename = "asset_kind")]
        kind: AssetKind,
        name: String,
        value: String,
    },
    /// `import "path"`
    Import { path: String },
    /// Title page `Key: value` line
    Property { key: String, value: String },
    /// A line that started like a known construct but did not parse
    Invalid { text: String },
}

/// Which condition marker a [`TokenKind::Condition`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    If,
    Else,
    /// Synthesized when the indented block dedents (or the file ends)
    Close,
}

/// Assignment operator on a [`TokenKind::Assign`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    /// Parse the operator as written (`=`, `+=`, `-=`, `*=`, `/=`).
    pub fn parse(text: &str) -> Option<AssignOp> {
        match text {
            "=" => Some(AssignOp::Set),
            "+=" => Some(AssignOp::Add),
            "-=" => Some(AssignOp::Sub),
            "*=" => Some(AssignOp::Mul),
            "/=" => Some(AssignOp::Div),
            _ => None,
        }
    }

    /// The operator as written in source.
    pub fn symbol(&self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
        }
    }
}

/// Storage class of a variable declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    /// Persistent; part of runtime snapshots
    Var,
    /// Scratch; reset when its section is re-entered
    Temp,
}

/// Media kind of an asset declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Image,
    Audio,
    Video,
}

impl AssetKind {
    pub fn parse(text: &str) -> Option<AssetKind> {
        match text {
            "image" => Some(AssetKind::Image),
            "audio" => Some(AssetKind::Audio),
            "video" => Some(AssetKind::Video),
            _ => None,
        }
    }
}

/* ===================== TokenTag ===================== */

/// Fieldless mirror of [`TokenKind`] for skip filters and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenTag {
    Section,
    SceneHeading,
    Synopsis,
    Separator,
    Action,
    Cue,
    Dialogue,
    Centered,
    Transition,
    Condition,
    ChoiceGroupStart,
    ChoiceGroupEnd,
    Choice,
    Jump,
    Return,
    Call,
    Assign,
    Variable,
    Entity,
    EntityField,
    Tag,
    Asset,
    Import,
    Property,
    Invalid,
}

impl TokenTag {
    /// Short noun for messages ("a function cannot contain dialogue").
    pub fn label(&self) -> &'static str {
        match self {
            TokenTag::Section => "a heading",
            TokenTag::SceneHeading => "a scene heading",
            TokenTag::Synopsis => "a synopsis",
            TokenTag::Separator => "a separator",
            TokenTag::Action => "action text",
            TokenTag::Cue => "a character cue",
            TokenTag::Dialogue => "dialogue",
            TokenTag::Centered => "centered text",
            TokenTag::Transition => "a transition",
            TokenTag::Condition => "a condition",
            TokenTag::ChoiceGroupStart | TokenTag::ChoiceGroupEnd => "a choice group",
            TokenTag::Choice => "a choice",
            TokenTag::Jump => "a jump",
            TokenTag::Return => "a return",
            TokenTag::Call => "a call",
            TokenTag::Assign => "an assignment",
            TokenTag::Variable => "a variable declaration",
            TokenTag::Entity => "an entity declaration",
            TokenTag::EntityField => "an entity field",
            TokenTag::Tag => "a tag declaration",
            TokenTag::Asset => "an asset declaration",
            TokenTag::Import => "an import",
            TokenTag::Property => "a title property",
            TokenTag::Invalid => "invalid syntax",
        }
    }
}

impl TokenKind {
    /// The fieldless tag of this kind.
    pub fn tag(&self) -> TokenTag {
        match self {
            TokenKind::Section { .. } => TokenTag::Section,
            TokenKind::SceneHeading { .. } => TokenTag::SceneHeading,
            TokenKind::Synopsis { .. } => TokenTag::Synopsis,
            TokenKind::Separator => TokenTag::Separator,
            TokenKind::Action { .. } => TokenTag::Action,
            TokenKind::Cue { .. } => TokenTag::Cue,
            TokenKind::Dialogue { .. } => TokenTag::Dialogue,
            TokenKind::Centered { .. } => TokenTag::Centered,
            TokenKind::Transition { .. } => TokenTag::Transition,
            TokenKind::Condition { .. } => TokenTag::Condition,
            TokenKind::ChoiceGroupStart => TokenTag::ChoiceGroupStart,
            TokenKind::ChoiceGroupEnd => TokenTag::ChoiceGroupEnd,
            TokenKind::Choice { .. } => TokenTag::Choice,
            TokenKind::Jump { .. } => TokenTag::Jump,
            TokenKind::Return { .. } => TokenTag::Return,
            TokenKind::Call { .. } => TokenTag::Call,
            TokenKind::Assign { .. } => TokenTag::Assign,
            TokenKind::Variable { .. } => TokenTag::Variable,
            TokenKind::Entity { .. } => TokenTag::Entity,
            TokenKind::EntityField { .. } => TokenTag::EntityField,
            TokenKind::Tag { .. } => TokenTag::Tag,
            TokenKind::Asset { .. } => TokenTag::Asset,
            TokenKind::Import { .. } => TokenTag::Import,
            TokenKind::Property { .. } => TokenTag::Property,
            TokenKind::Invalid { .. } => TokenTag::Invalid,
        }
    }
}

impl Token {
    /// The fieldless tag of this token's kind.
    pub fn tag(&self) -> TokenTag {
        self.kind.tag()
    }

    /// True for tokens a renderer would put on screen.
    pub fn is_display(&self) -> bool {
        matches!(
            self.tag(),
            TokenTag::SceneHeading
                | TokenTag::Action
                | TokenTag::Cue
                | TokenTag::Dialogue
                | TokenTag::Centered
                | TokenTag::Transition
        )
    }

    /// True for tokens that move execution to another section.
    pub fn is_flow(&self) -> bool {
        matches!(self.tag(), TokenTag::Jump | TokenTag::Choice | TokenTag::Call)
    }

    /// The display text carried by this token, if it has one.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::SceneHeading { text, .. }
            | TokenKind::Synopsis { text }
            | TokenKind::Action { text }
            | TokenKind::Dialogue { text, .. }
            | TokenKind::Centered { text }
            | TokenKind::Transition { text }
            | TokenKind::Choice { text, .. }
            | TokenKind::Invalid { text } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(kind: TokenKind) -> Token {
        Token {
            kind,
            line: 1,
            from: 0,
            to: 4,
            indent: 0,
            section_id: String::new(),
            ignored: false,
        }
    }

    #[test]
    fn tags_mirror_kinds() {
        let t = token(TokenKind::Jump {
            target: "menu".into(),
            calls: vec![None],
        });
        assert_eq!(t.tag(), TokenTag::Jump);
        assert!(t.is_flow());
        assert!(!t.is_display());
    }

    #[test]
    fn display_predicate_covers_renderable_kinds() {
        let t = token(TokenKind::Dialogue {
            character: "alice".into(),
            text: "hello".into(),
            parenthetical: false,
        });
        assert!(t.is_display());
        assert_eq!(t.text(), Some("hello"));
    }

    #[test]
    fn assign_operators_round_trip() {
        for sym in ["=", "+=", "-=", "*=", "/="] {
            let op = AssignOp::parse(sym).unwrap();
            assert_eq!(op.symbol(), sym);
        }
        assert_eq!(AssignOp::parse("=="), None);
    }

    #[test]
    fn kind_serializes_with_internal_tag() {
        let t = token(TokenKind::Separator);
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["kind"]["kind"], "Separator");
        // ignored=false is omitted from the wire form
        assert!(json.get("ignored").is_none());
    }
}
