//! Line classification rules
//!
//! Each rule is a compiled regex with named capture groups; the payload
//! of a token comes straight out of those captures. Rules are tried in
//! a fixed priority order and the first match wins, so the order the
//! dispatch functions consult these fields in is part of the grammar.

use regex::Regex;

/// Compiled line rules for both parser passes.
///
/// Compiled once per parse; the constructor is the only place a pattern
/// string lives.
pub struct LineRules {
    // Declaration pass
    pub heading: Regex,
    pub heading_loose: Regex,
    pub variable: Regex,
    pub variable_loose: Regex,
    pub asset: Regex,
    pub asset_loose: Regex,
    pub tag: Regex,
    pub tag_loose: Regex,
    pub import: Regex,
    pub import_loose: Regex,
    pub property: Regex,
    pub entity: Regex,
    pub entity_field: Regex,

    // Content pass
    pub scene: Regex,
    pub forced_scene: Regex,
    pub separator: Regex,
    pub synopsis: Regex,
    pub centered: Regex,
    pub transition: Regex,
    pub forced_transition: Regex,
    pub jump: Regex,
    pub ret: Regex,
    pub condition_if: Regex,
    pub condition_else: Regex,
    pub choice: Regex,
    pub choice_target: Regex,
    pub call: Regex,
    pub assign: Regex,
    pub cue: Regex,
    pub caps_cue: Regex,
    pub parenthetical: Regex,
}

/// Words that can never open an entity block.
const RESERVED_WORDS: &[&str] = &[
    "var", "temp", "tag", "image", "audio", "video", "import", "if", "else",
];

impl LineRules {
    pub fn new() -> Self {
        Self {
            heading: Regex::new(
                r"^(?P<marks>#+)\s*(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?:(?P<method>\(\s*\))|(?:->\s*(?P<ret>[A-Za-z_][A-Za-z0-9_]*))|(?:when\s+(?P<triggers>[A-Za-z_][A-Za-z0-9_]*(?:\s*,\s*[A-Za-z_][A-Za-z0-9_]*)*)))?\s*$",
            )
            .expect("heading regex must compile"),
            heading_loose: Regex::new(r"^#").expect("heading prefix regex must compile"),
            variable: Regex::new(
                r"^(?P<kind>var|temp)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?::\s*(?P<type>[A-Za-z_][A-Za-z0-9_]*))?(?:\s*=\s*(?P<value>\S.*?))?\s*$",
            )
            .expect("variable regex must compile"),
            variable_loose: Regex::new(r"^(?:var|temp)\b").expect("variable prefix regex must compile"),
            asset: Regex::new(
                r"^(?P<kind>image|audio|video)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?P<value>\S.*?)\s*$",
            )
            .expect("asset regex must compile"),
            asset_loose: Regex::new(r"^(?:image|audio|video)\b")
                .expect("asset prefix regex must compile"),
            tag: Regex::new(
                r"^tag\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?:=\s*(?P<value>\S.*?))?\s*$",
            )
            .expect("tag regex must compile"),
            tag_loose: Regex::new(r"^tag\b").expect("tag prefix regex must compile"),
            import: Regex::new(r#"^import\s+"(?P<path>[^"]*)"\s*$"#)
                .expect("import regex must compile"),
            import_loose: Regex::new(r"^import\b").expect("import prefix regex must compile"),
            property: Regex::new(r"^(?P<key>[A-Za-z][A-Za-z ]*?)\s*:\s*(?P<value>\S.*?)\s*$")
                .expect("property regex must compile"),
            entity: Regex::new(r"^(?P<type>[a-z][a-z0-9_]*)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*:\s*$")
                .expect("entity regex must compile"),
            entity_field: Regex::new(r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?P<value>\S.*?)\s*$")
                .expect("entity field regex must compile"),

            scene: Regex::new(r"^(?:INT\.?/EXT|INT|EXT|EST|I/E)[. ]").expect("scene regex must compile"),
            forced_scene: Regex::new(r"^\.(?P<text>[^.\s].*)$")
                .expect("forced scene regex must compile"),
            separator: Regex::new(r"^(?:={3,}|-{3,})\s*$").expect("separator regex must compile"),
            synopsis: Regex::new(r"^=\s*(?P<text>.*?)\s*$").expect("synopsis regex must compile"),
            centered: Regex::new(r"^>\s*(?P<text>.*?)\s*<\s*$").expect("centered regex must compile"),
            transition: Regex::new(r"^(?P<text>[A-Z][A-Z0-9 .]*TO:)\s*$")
                .expect("transition regex must compile"),
            // An all-caps `>` line is a forced transition, not a jump;
            // jump targets are written in identifier case.
            forced_transition: Regex::new(r"^>\s*(?P<text>[A-Z][A-Z0-9 .]*[.:]?)\s*$")
                .expect("forced transition regex must compile"),
            jump: Regex::new(r"^>\s*(?P<target>\S.*?)\s*$").expect("jump regex must compile"),
            ret: Regex::new(r"^<\s*(?P<value>.*?)\s*$").expect("return regex must compile"),
            condition_if: Regex::new(r"^if\s+(?P<check>\S.*?)\s*:?\s*$")
                .expect("if regex must compile"),
            condition_else: Regex::new(r"^else(?:\s+if\s+(?P<check>\S.*?))?\s*:?\s*$")
                .expect("else regex must compile"),
            choice: Regex::new(r"^(?P<marker>[*+])\s+(?P<text>\S.*?)\s*$")
                .expect("choice regex must compile"),
            choice_target: Regex::new(r"^(?P<text>\S.*)\s+>\s*(?P<target>\S+)\s*$")
                .expect("choice target regex must compile"),
            call: Regex::new(r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\(\s*\)\s*$")
                .expect("call regex must compile"),
            assign: Regex::new(
                r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?P<op>[+\-*/]?=)\s*(?P<value>[^=\s].*?|[^=\s])\s*$",
            )
            .expect("assign regex must compile"),
            cue: Regex::new(r"^@(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?P<dual>\^)?\s*$")
                .expect("cue regex must compile"),
            caps_cue: Regex::new(r"^(?P<name>[A-Z][A-Z0-9_]*(?: [A-Z0-9_]+)*)\s*(?P<dual>\^)?\s*$")
                .expect("caps cue regex must compile"),
            parenthetical: Regex::new(r"^\((?P<text>[^)]*)\)\s*$")
                .expect("parenthetical regex must compile"),
        }
    }

    /// True when `word` is reserved and cannot be an entity type.
    pub fn is_reserved(word: &str) -> bool {
        RESERVED_WORDS.contains(&word)
    }
}

impl Default for LineRules {
    fn default() -> Self {
        Self::new()
    }
}
