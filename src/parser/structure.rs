//! Document outline
//!
//! A tree of headings and scene headings for navigation panes. Nodes
//! are stored in one arena in source order; `children` holds indices
//! into it. Synopsis lines attach to whichever node came last, which
//! gives outline entries their hover text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlineKind {
    Section,
    Scene,
}

/// One node of the outline tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub label: String,
    pub kind: OutlineKind,
    /// Id of the declared section; `None` for scenes
    pub section_id: Option<String>,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    /// Indices of child nodes, in source order
    pub children: Vec<usize>,
}

/// The assembled outline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub nodes: Vec<OutlineNode>,
    /// Indices of top-level nodes, in source order
    pub roots: Vec<usize>,
}

impl Outline {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Child nodes of `index`, in source order.
    pub fn children(&self, index: usize) -> impl Iterator<Item = &OutlineNode> {
        self.nodes[index].children.iter().map(|&i| &self.nodes[i])
    }

    /// Top-level nodes, in source order.
    pub fn top_level(&self) -> impl Iterator<Item = &OutlineNode> {
        self.roots.iter().map(|&i| &self.nodes[i])
    }
}

/// Incrementally builds the outline while the content pass walks the
/// document.
#[derive(Debug, Default)]
pub struct OutlineBuilder {
    nodes: Vec<OutlineNode>,
    roots: Vec<usize>,
    /// Open section nodes, innermost last: (heading depth, node index)
    stack: Vec<(usize, usize)>,
    last: Option<usize>,
}

impl OutlineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&mut self, node: OutlineNode) -> usize {
        let index = self.nodes.len();
        match self.stack.last() {
            Some(&(_, parent)) => self.nodes[parent].children.push(index),
            None => self.roots.push(index),
        }
        self.nodes.push(node);
        self.last = Some(index);
        index
    }

    /// Add a heading node at `depth` (1-based, already depth-fixed).
    pub fn add_section(&mut self, label: &str, section_id: &str, depth: usize, line: usize) {
        while matches!(self.stack.last(), Some(&(d, _)) if d >= depth) {
            self.stack.pop();
        }
        let index = self.attach(OutlineNode {
            label: label.to_string(),
            kind: OutlineKind::Section,
            section_id: Some(section_id.to_string()),
            line,
            synopsis: None,
            children: Vec::new(),
        });
        self.stack.push((depth, index));
    }

    /// Add a scene node under the innermost open section.
    pub fn add_scene(&mut self, label: &str, line: usize) {
        self.attach(OutlineNode {
            label: label.to_string(),
            kind: OutlineKind::Scene,
            section_id: None,
            line,
            synopsis: None,
            children: Vec::new(),
        });
    }

    /// Attach a synopsis line to the most recent node.
    pub fn add_synopsis(&mut self, text: &str) {
        let Some(index) = self.last else {
            return;
        };
        match &mut self.nodes[index].synopsis {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(text);
            }
            none => *none = Some(text.to_string()),
        }
    }

    pub fn finish(self) -> Outline {
        Outline {
            nodes: self.nodes,
            roots: self.roots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_nest_by_depth() {
        let mut builder = OutlineBuilder::new();
        builder.add_section("act_one", ".act_one", 1, 1);
        builder.add_section("cave", ".act_one.cave", 2, 2);
        builder.add_scene("INT. CAVE - DAY", 3);
        builder.add_section("act_two", ".act_two", 1, 4);

        let outline = builder.finish();
        let roots: Vec<&str> = outline.top_level().map(|n| n.label.as_str()).collect();
        assert_eq!(roots, vec!["act_one", "act_two"]);

        let act_one = &outline.nodes[outline.roots[0]];
        assert_eq!(act_one.children.len(), 1);
        let cave = &outline.nodes[act_one.children[0]];
        assert_eq!(cave.label, "cave");
        assert_eq!(cave.children.len(), 1);
        assert_eq!(
            outline.nodes[cave.children[0]].kind,
            OutlineKind::Scene
        );
    }

    #[test]
    fn scenes_before_any_heading_are_roots() {
        let mut builder = OutlineBuilder::new();
        builder.add_scene("EXT. FIELD - DAY", 1);
        builder.add_section("act_one", ".act_one", 1, 2);

        let outline = builder.finish();
        assert_eq!(outline.roots.len(), 2);
        assert_eq!(outline.nodes[outline.roots[0]].kind, OutlineKind::Scene);
    }

    #[test]
    fn synopsis_lines_accumulate_on_the_latest_node() {
        let mut builder = OutlineBuilder::new();
        builder.add_synopsis("orphan line");
        builder.add_section("act_one", ".act_one", 1, 1);
        builder.add_synopsis("the hero sets out");
        builder.add_synopsis("a storm builds");

        let outline = builder.finish();
        assert_eq!(
            outline.nodes[0].synopsis.as_deref(),
            Some("the hero sets out\na storm builds")
        );
    }
}
