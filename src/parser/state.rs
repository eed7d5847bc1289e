//! Mutable state threaded through both parser passes
//!
//! The declaration pass fills the symbol tables, claims the lines it
//! recognized, and maps every line to its owning section. The content
//! pass then walks the lines again in order, emitting tokens for both
//! claimed and unclaimed lines, so the token list comes out in source
//! order even though declarations were processed first.

use crate::eval::Evaluator;
use crate::parser::diagnostics::Diagnostic;
use crate::parser::patterns::LineRules;
use crate::parser::structure::OutlineBuilder;
use crate::parser::symbols::{Reference, SymbolTables};
use crate::parser::token::{Token, TokenKind, TokenTag};
use crate::parser::ParseOptions;
use std::collections::{HashMap, HashSet};

/* ===================== Lines ===================== */

/// One line of the script, with its absolute byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub start: usize,
    /// Line text without the trailing newline (or `\r`)
    pub text: String,
}

impl LineRecord {
    /// Offset just past the last character of the line.
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Indentation depth in levels: one tab or four spaces per level.
    pub fn indent(&self) -> usize {
        let mut spaces = 0;
        let mut levels = 0;
        for ch in self.text.chars() {
            match ch {
                '\t' => levels += 1,
                ' ' => {
                    spaces += 1;
                    if spaces == 4 {
                        levels += 1;
                        spaces = 0;
                    }
                }
                _ => break,
            }
        }
        levels
    }

    /// The line's content with surrounding whitespace removed.
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }

    /// Absolute offset of the first non-whitespace character.
    pub fn content_from(&self) -> usize {
        self.start + (self.text.len() - self.text.trim_start().len())
    }

    /// Absolute offset just past the last non-whitespace character.
    pub fn content_to(&self) -> usize {
        self.start + self.text.trim_end().len()
    }

    /// True when the line's content ends with a space (the merge
    /// marker for split dialogue and action).
    pub fn has_trailing_space(&self) -> bool {
        self.text.ends_with(' ') && !self.is_blank()
    }
}

/// Split source text into lines, keeping absolute offsets. Handles
/// both `\n` and `\r\n` endings; offsets always index the original
/// text.
pub fn split_lines(text: &str) -> Vec<LineRecord> {
    let mut lines = Vec::new();
    let mut start = 0;
    for piece in text.split('\n') {
        let line = piece.strip_suffix('\r').unwrap_or(piece);
        lines.push(LineRecord {
            start,
            text: line.to_string(),
        });
        start += piece.len() + 1;
    }
    lines
}

/// Blank out comments, preserving text length so every offset still
/// points at the original source. `//` runs to end of line; `/* */`
/// spans lines when enabled.
pub fn blank_comments(text: &str, block_comments: bool) -> String {
    let mut out: Vec<char> = text.chars().collect();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        if ch == '"' {
            in_string = !in_string;
        } else if ch == '\n' {
            in_string = false;
        } else if !in_string && ch == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                out[i] = ' ';
                i += 1;
            }
            continue;
        } else if !in_string && block_comments && ch == '/' && next == Some('*') {
            while i < chars.len() {
                let closing = chars[i] == '*' && chars.get(i + 1) == Some(&'/');
                if chars[i] != '\n' {
                    out[i] = ' ';
                }
                i += 1;
                if closing {
                    if i < chars.len() && chars[i] != '\n' {
                        out[i] = ' ';
                    }
                    i += 1;
                    break;
                }
            }
            continue;
        }
        i += 1;
    }
    out.into_iter().collect()
}

/* ===================== Claims ===================== */

/// What the declaration pass learned about a line, for the content
/// pass to finish.
#[derive(Debug, Clone, PartialEq)]
pub enum LineClaim {
    /// A heading that opened (or merged into) the section with this id
    Heading { id: String },
    Variable { id: String, duplicate: bool },
    Asset { id: String, duplicate: bool },
    Tag { id: String, duplicate: bool },
    Entity { name: String, duplicate: bool },
    EntityField {
        entity: String,
        field: String,
        duplicate: bool,
    },
    Import { path: String },
    Property { key: String, value: String },
    /// Started like `construct` but did not parse; the declaration
    /// pass already reported it
    Invalid { construct: &'static str },
}

/* ===================== ParserState ===================== */

/// Everything both passes read and write.
pub struct ParserState<'a> {
    pub rules: LineRules,
    pub options: &'a ParseOptions,
    pub evaluator: &'a dyn Evaluator,
    pub lines: Vec<LineRecord>,
    pub text_len: usize,

    pub symbols: SymbolTables,
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
    pub references: Vec<Reference>,

    /// Line number -> indices of the tokens on that line
    pub line_tokens: HashMap<usize, Vec<usize>>,
    /// Line number -> id of the owning section
    pub line_sections: HashMap<usize, String>,
    /// Indices of title page tokens
    pub title_tokens: Vec<usize>,
    /// Title page key/value pairs
    pub properties: HashMap<String, String>,

    /// Line index -> what the declaration pass made of it
    pub claims: HashMap<usize, LineClaim>,
    pub outline: OutlineBuilder,

    skip: HashSet<TokenTag>,
}

impl<'a> ParserState<'a> {
    pub fn new(text: &str, options: &'a ParseOptions, evaluator: &'a dyn Evaluator) -> Self {
        let cleaned = blank_comments(text, options.remove_block_comments);
        Self {
            rules: LineRules::new(),
            options,
            evaluator,
            lines: split_lines(&cleaned),
            text_len: text.len(),
            symbols: SymbolTables::new(),
            tokens: Vec::new(),
            diagnostics: Vec::new(),
            references: Vec::new(),
            line_tokens: HashMap::new(),
            line_sections: HashMap::new(),
            title_tokens: Vec::new(),
            properties: HashMap::new(),
            claims: HashMap::new(),
            outline: OutlineBuilder::new(),
            skip: options.skip_tokens.iter().copied().collect(),
        }
    }

    /// 1-based line number of a line index, honoring the offset option.
    pub fn line_number(&self, idx: usize) -> usize {
        idx + 1 + self.options.line_offset
    }

    /// Id of the section owning a line; the declaration pass fills this
    /// in for every line.
    pub fn section_of(&self, idx: usize) -> String {
        self.line_sections
            .get(&self.line_number(idx))
            .cloned()
            .unwrap_or_default()
    }

    /// Append a token for line `idx`, wiring up the line and section
    /// indexes. Returns `None` when the kind is filtered out by
    /// `skip_tokens`.
    pub fn push_token(
        &mut self,
        idx: usize,
        kind: TokenKind,
        from: usize,
        to: usize,
        indent: usize,
    ) -> Option<usize> {
        if self.skip.contains(&kind.tag()) {
            return None;
        }
        let line = self.line_number(idx);
        let section_id = self.section_of(idx);
        let token_index = self.tokens.len();

        if let Some(section) = self.symbols.sections.get_mut(&section_id) {
            section.tokens.push(token_index);
        }
        self.line_tokens.entry(line).or_default().push(token_index);
        self.tokens.push(Token {
            kind,
            line,
            from,
            to,
            indent,
            section_id,
            ignored: false,
        });
        Some(token_index)
    }

    /// Append a diagnostic, clamping its span to line `idx`.
    pub fn push_diagnostic(&mut self, idx: usize, diagnostic: Diagnostic) {
        let clamped = match self.lines.get(idx) {
            Some(line) => diagnostic.clamped(line.start, line.end()),
            None => diagnostic,
        };
        self.diagnostics.push(clamped);
    }

    pub fn push_reference(&mut self, reference: Reference) {
        self.references.push(reference);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_lines_keeps_absolute_offsets() {
        let lines = split_lines("ab\ncd\r\nef");
        assert_eq!(lines.len(), 3);
        assert_eq!((lines[0].start, lines[0].text.as_str()), (0, "ab"));
        assert_eq!((lines[1].start, lines[1].text.as_str()), (3, "cd"));
        assert_eq!((lines[2].start, lines[2].text.as_str()), (7, "ef"));
        // The `\r` is excluded from the line's span.
        assert_eq!(lines[1].end(), 5);
    }

    #[test]
    fn indent_counts_tabs_and_space_groups() {
        let line = LineRecord {
            start: 0,
            text: "\t\tx".into(),
        };
        assert_eq!(line.indent(), 2);

        let line = LineRecord {
            start: 0,
            text: "        x".into(),
        };
        assert_eq!(line.indent(), 2);

        let line = LineRecord {
            start: 10,
            text: "  x  ".into(),
        };
        assert_eq!(line.indent(), 0);
        assert_eq!(line.content_from(), 12);
        assert_eq!(line.content_to(), 13);
    }

    #[test]
    fn trailing_space_marks_merge_candidates() {
        let line = LineRecord {
            start: 0,
            text: "Hello ".into(),
        };
        assert!(line.has_trailing_space());

        let blank = LineRecord {
            start: 0,
            text: "   ".into(),
        };
        assert!(!blank.has_trailing_space());
    }

    #[test]
    fn line_comments_blank_to_spaces() {
        let cleaned = blank_comments("hello // note\nworld", false);
        assert_eq!(cleaned, "hello        \nworld");
        assert_eq!(cleaned.len(), "hello // note\nworld".len());
    }

    #[test]
    fn block_comments_blank_only_when_enabled() {
        let source = "a /* x\ny */ b";
        assert_eq!(blank_comments(source, false), source);

        let cleaned = blank_comments(source, true);
        assert_eq!(cleaned, "a     \n     b");
        assert_eq!(cleaned.len(), source.len());
    }

    #[test]
    fn comment_markers_inside_strings_survive() {
        let source = "say \"http://x\" now";
        assert_eq!(blank_comments(source, true), source);
    }
}
