//! Text selection model

use super::{Document, NodeId};

/// One end of a selection: a node and a byte offset into its text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A live selection; `focus` is where the gesture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: Boundary,
    pub focus: Boundary,
}

impl Selection {
    pub fn new(anchor: Boundary, focus: Boundary) -> Self {
        Self { anchor, focus }
    }

    /// Selection of `start..end` inside one text node
    pub fn within(node: NodeId, start: usize, end: usize) -> Self {
        Self::new(Boundary::new(node, start), Boundary::new(node, end))
    }

    /// Select the first occurrence of `needle` inside the text node `node`
    pub fn of_text(doc: &Document, node: NodeId, needle: &str) -> Option<Self> {
        let start = doc.text(node)?.find(needle)?;
        Some(Self::within(node, start, start + needle.len()))
    }

    pub fn focus_node(&self) -> NodeId {
        self.focus.node
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Boundaries in document order, element boundaries resolved to text
    fn ordered(&self, doc: &Document) -> Option<(Boundary, Boundary)> {
        let start = resolve(doc, self.anchor, true)?;
        let end = resolve(doc, self.focus, false)?;
        let order = doc.document_order();
        let pos = |n: NodeId| order.iter().position(|o| *o == n);
        let (a, b) = (pos(start.node)?, pos(end.node)?);
        if a < b || (a == b && start.offset <= end.offset) {
            Some((start, end))
        } else {
            Some((end, start))
        }
    }

    /// Selected text; text in different blocks is joined by a line break
    pub fn text(&self, doc: &Document) -> String {
        let Some((start, end)) = self.ordered(doc) else {
            return String::new();
        };

        let order = doc.document_order();
        let first = order.iter().position(|n| *n == start.node).unwrap_or(0);
        let last = order.iter().position(|n| *n == end.node).unwrap_or(first);

        let mut out = String::new();
        let mut previous_block = None;
        for node in &order[first..=last] {
            let Some(text) = doc.text(*node) else {
                continue;
            };
            let from = if *node == start.node { clamp(text, start.offset) } else { 0 };
            let to = if *node == end.node { clamp(text, end.offset) } else { text.len() };
            if from >= to {
                continue;
            }
            let block = doc.block_ancestor(*node);
            if previous_block.is_some() && previous_block != block {
                out.push('\n');
            }
            previous_block = block;
            out.push_str(&text[from..to]);
        }
        out
    }

    /// Deepest node containing both boundaries
    pub fn common_ancestor(&self, doc: &Document) -> Option<NodeId> {
        let a = self.anchor.node;
        let b = self.focus.node;
        std::iter::once(a)
            .chain(doc.ancestors(a))
            .find(|candidate| doc.contains(*candidate, b))
    }
}

/// Map an element boundary onto its first or last text descendant
fn resolve(doc: &Document, boundary: Boundary, is_start: bool) -> Option<Boundary> {
    if doc.is_text(boundary.node) {
        return Some(boundary);
    }
    let texts: Vec<NodeId> = doc
        .descendants(boundary.node)
        .into_iter()
        .filter(|n| doc.is_text(*n))
        .collect();
    if is_start && boundary.offset == 0 {
        texts.first().map(|n| Boundary::new(*n, 0))
    } else {
        texts
            .last()
            .map(|n| Boundary::new(*n, doc.text(*n).map(str::len).unwrap_or(0)))
    }
}

/// Clamp an offset into `text` and down to a char boundary
fn clamp(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
