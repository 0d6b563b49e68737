//! Highlight pass: unmark every highlight, then re-apply the vocabulary
//! pattern across the rendered text of the body.
//!
//! Matching runs over one combined string built from the body's text nodes
//! in document order, with a line break inserted wherever the enclosing
//! block changes. A match is therefore found even when inline markup splits
//! it across text nodes; each text-node piece is wrapped separately and the
//! pieces share a [`MATCH_ATTR`] value.

use super::{HIGHLIGHT_CLASS, MATCH_ATTR};
use crate::chrome::LOGIN_PROMPT_ID;
use crate::dialog::DIALOG_CLASS;
use crate::dom::{Document, Listener, NodeId};
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Elements whose text is never highlighted
pub const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "textarea", "input", "select", "option", "button",
];

/// Result of one mark pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Highlight elements created, in document order
    pub highlights: Vec<NodeId>,

    /// Number of distinct matches
    pub matches: usize,
}

/// A text node's slice of the combined match string
#[derive(Debug, Clone, Copy)]
struct Segment {
    node: NodeId,
    start: usize,
    end: usize,
}

/// Stateless apart from the in-flight flag guarding against overlapping passes
#[derive(Debug, Default)]
pub struct HighlightRenderer {
    in_flight: bool,
    passes: u64,
}

impl HighlightRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Completed passes since creation
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Claim the renderer; `false` means a pass is already running and the
    /// request must be dropped
    pub fn try_begin(&mut self) -> bool {
        if self.in_flight {
            debug!("Highlight pass already in flight, dropping request");
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn finish(&mut self) {
        if self.in_flight {
            self.in_flight = false;
            self.passes += 1;
        }
    }

    /// Every highlight element currently in the body
    pub fn highlights(doc: &Document) -> Vec<NodeId> {
        doc.query_class(doc.body(), HIGHLIGHT_CLASS)
    }

    /// Remove all highlight wrappers, restoring the original text nodes
    pub fn unmark(&self, doc: &mut Document) -> usize {
        let marks = Self::highlights(doc);
        let mut parents: Vec<NodeId> = Vec::new();

        // Innermost first so nested wrappers unwrap cleanly
        for mark in marks.iter().rev() {
            if let Some(parent) = doc.parent(*mark) {
                doc.unwrap(*mark);
                if !parents.contains(&parent) {
                    parents.push(parent);
                }
            }
        }
        for parent in parents {
            if doc.is_connected(parent) {
                doc.normalize(parent);
            }
        }

        if !marks.is_empty() {
            trace!("Unmarked {} highlights", marks.len());
        }
        marks.len()
    }

    /// Wrap every match of `pattern` in a highlight element
    pub fn mark(&self, doc: &mut Document, pattern: &Regex) -> PassReport {
        let mut combined = String::new();
        let mut segments: Vec<Segment> = Vec::new();
        let mut last_block: Option<NodeId> = None;
        collect_segments(doc, doc.body(), &mut combined, &mut segments, &mut last_block);

        // Per text node: (start, end, match ordinal), in ascending order
        let mut pieces: BTreeMap<usize, Vec<(usize, usize, usize)>> = BTreeMap::new();
        let mut matches = 0;
        let mut first_segment = 0;

        for m in pattern.find_iter(&combined) {
            if m.start() == m.end() {
                continue;
            }
            let ordinal = matches;
            matches += 1;

            while first_segment < segments.len() && segments[first_segment].end <= m.start() {
                first_segment += 1;
            }
            for (i, seg) in segments.iter().enumerate().skip(first_segment) {
                if seg.start >= m.end() {
                    break;
                }
                let from = m.start().max(seg.start) - seg.start;
                let to = m.end().min(seg.end) - seg.start;
                if from < to {
                    pieces.entry(i).or_default().push((from, to, ordinal));
                }
            }
        }

        let mut created: Vec<(usize, usize, NodeId)> = Vec::new();
        for (seg_index, ranges) in pieces {
            let node = segments[seg_index].node;
            // Back to front so earlier offsets stay valid in `node`
            for (from, to, ordinal) in ranges.into_iter().rev() {
                if let Some(span) = wrap_range(doc, node, from, to, ordinal) {
                    created.push((ordinal, seg_index, span));
                }
            }
        }
        created.sort_by_key(|(ordinal, seg_index, _)| (*ordinal, *seg_index));

        let highlights: Vec<NodeId> = created.into_iter().map(|(_, _, span)| span).collect();
        debug!("Highlight pass: {} matches, {} elements", matches, highlights.len());

        PassReport { highlights, matches }
    }

    /// Full text of the match `span` belongs to, joined across its pieces
    pub fn match_text(doc: &Document, span: NodeId) -> String {
        let Some(ordinal) = doc.attr(span, MATCH_ATTR) else {
            return doc.text_content(span);
        };
        Self::highlights(doc)
            .into_iter()
            .filter(|h| doc.attr(*h, MATCH_ATTR) == Some(ordinal))
            .map(|h| doc.text_content(h))
            .collect()
    }
}

/// Whether an element's subtree is left alone by the highlighter
fn is_excluded(doc: &Document, id: NodeId) -> bool {
    match doc.tag(id) {
        Some(tag) if EXCLUDED_TAGS.contains(&tag) => true,
        Some(_) => {
            doc.has_class(id, HIGHLIGHT_CLASS)
                || doc.has_class(id, DIALOG_CLASS)
                || doc.attr(id, "id") == Some(LOGIN_PROMPT_ID)
        }
        None => false,
    }
}

fn collect_segments(
    doc: &Document,
    id: NodeId,
    combined: &mut String,
    segments: &mut Vec<Segment>,
    last_block: &mut Option<NodeId>,
) {
    if let Some(text) = doc.text(id) {
        if text.is_empty() {
            return;
        }
        let block = doc.block_ancestor(id);
        if !segments.is_empty() && *last_block != block {
            combined.push('\n');
        }
        *last_block = block;
        let start = combined.len();
        combined.push_str(text);
        segments.push(Segment {
            node: id,
            start,
            end: combined.len(),
        });
        return;
    }
    if is_excluded(doc, id) {
        return;
    }
    for child in doc.children(id).to_vec() {
        collect_segments(doc, child, combined, segments, last_block);
    }
}

/// Wrap `from..to` of text node `node`; the head of `node` stays in place
fn wrap_range(doc: &mut Document, node: NodeId, from: usize, to: usize, ordinal: usize) -> Option<NodeId> {
    let len = doc.text(node)?.len();
    if to < len {
        doc.split_text(node, to)?;
    }
    let target = if from > 0 { doc.split_text(node, from)? } else { node };

    let span = doc.create_element("span");
    doc.add_class(span, HIGHLIGHT_CLASS);
    doc.set_attr(span, MATCH_ATTR, ordinal.to_string());
    doc.wrap(target, span);
    doc.add_listener(span, Listener::HighlightClick);
    Some(span)
}
