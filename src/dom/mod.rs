//! Arena document model
//!
//! A small, single-owner stand-in for a live browser page: element and text
//! nodes addressed by [`NodeId`], the handful of tree edits the engine and
//! its hosts need, rendered-text extraction, a selection and a
//! [`mutation::Observer`] that records child-list and character-data changes
//! while connected.
//!
//! Detached nodes stay in the arena so that removed nodes named by mutation
//! records can still be inspected.

pub mod mutation;
pub mod selection;

pub use mutation::{MutationKind, MutationRecord, Observer};
pub use selection::{Boundary, Selection};

use std::collections::{BTreeMap, HashSet};

/// Handle to a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Element tag plus attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Event listeners the engine attaches to nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    HighlightClick,
}

/// Inline-level tags the context extractor ascends through
pub const INLINE_TAGS: &[&str] = &[
    "span", "a", "b", "i", "em", "strong", "mark", "sub", "sup", "code",
];

/// Tags whose content is never rendered
const HIDDEN_TAGS: &[&str] = &["head", "title", "script", "style", "noscript", "template"];

/// Tags that break rendered text into separate lines
const BLOCK_TAGS: &[&str] = &[
    "html", "body", "address", "article", "aside", "blockquote", "dd", "details", "dialog",
    "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3",
    "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section",
    "summary", "table", "tbody", "thead", "tfoot", "td", "th", "tr", "ul", "caption",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "meta", "link", "wbr"];

pub fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

pub fn is_inline_tag(tag: &str) -> bool {
    INLINE_TAGS.contains(&tag)
}

/// A page: `html > (head, body)` plus title, selection, observer and listeners
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    html: NodeId,
    head: NodeId,
    body: NodeId,
    title: String,
    observer: Observer,
    selection: Option<Selection>,
    listeners: HashSet<(NodeId, Listener)>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            html: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            title: String::new(),
            observer: Observer::default(),
            selection: None,
            listeners: HashSet::new(),
        };
        doc.html = doc.create_element("html");
        doc.head = doc.create_element("head");
        doc.body = doc.create_element("body");
        doc.attach(doc.html, doc.head, None);
        doc.attach(doc.html, doc.body, None);
        doc
    }

    pub fn html(&self) -> NodeId {
        self.html
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    // --- Node creation and inspection ---

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_string()))
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id).data, NodeData::Text(_))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).data, NodeData::Element(_))
    }

    /// Lowercase tag name of an element
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Element(e) => Some(e.tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    /// Text of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Text(t) => Some(t.as_str()),
            NodeData::Element(_) => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Element(e) => e.attrs.get(name).map(String::as_str),
            NodeData::Text(_) => None,
        }
    }

    /// Attribute changes are not observed
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let NodeData::Element(e) = &mut self.nodes[id.0].data {
            e.attrs.insert(name.to_string(), value.into());
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let NodeData::Element(e) = &mut self.nodes[id.0].data {
            e.attrs.remove(name);
        }
    }

    pub fn classes(&self, id: NodeId) -> impl Iterator<Item = &str> {
        self.attr(id, "class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).any(|c| c == class)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        let value = match self.attr(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", value);
    }

    // --- Navigation ---

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.first().copied()
    }

    fn index_in_parent(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let index = self.children(parent).iter().position(|c| *c == id)?;
        Some((parent, index))
    }

    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, index) = self.index_in_parent(id)?;
        self.children(parent)[..index]
            .iter()
            .rev()
            .copied()
            .find(|c| self.is_element(*c))
    }

    /// Proper ancestors, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |n| self.parent(*n))
    }

    /// Nearest inclusive ancestor matching `pred`
    pub fn closest<F>(&self, id: NodeId, pred: F) -> Option<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|n| pred(self, *n))
    }

    /// Nearest inclusive ancestor element carrying `class`
    pub fn closest_class(&self, id: NodeId, class: &str) -> Option<NodeId> {
        self.closest(id, |d, n| d.has_class(n, class))
    }

    /// Inclusive containment
    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        id == ancestor || self.ancestors(id).any(|a| a == ancestor)
    }

    /// Attached to the document tree
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(self.html, id)
    }

    /// Descendants in document order, excluding `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Position of every connected node in document order
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut order = vec![self.html];
        order.extend(self.descendants(self.html));
        order
    }

    /// Descendant elements carrying `class`
    pub fn query_class(&self, root: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|n| self.has_class(*n, class))
            .collect()
    }

    /// Connected element with this `id` attribute
    pub fn element_by_id(&self, id_attr: &str) -> Option<NodeId> {
        self.descendants(self.html)
            .into_iter()
            .find(|n| self.attr(*n, "id") == Some(id_attr))
    }

    /// Nearest block-level inclusive ancestor
    pub fn block_ancestor(&self, id: NodeId) -> Option<NodeId> {
        self.closest(id, |d, n| d.tag(n).map(is_block_tag).unwrap_or(false))
    }

    // --- Tree edits (observed) ---

    fn attach(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        let position = before
            .and_then(|b| self.children(parent).iter().position(|c| *c == b))
            .unwrap_or(self.children(parent).len());
        self.nodes[parent.0].children.insert(position, child);
        self.nodes[child.0].parent = Some(parent);
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes[child.0].parent.take()?;
        self.nodes[parent.0].children.retain(|c| *c != child);
        Some(parent)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent` before `reference` (or at the end)
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if self.contains(child, parent) {
            return;
        }
        if self.parent(child).is_some() {
            self.remove(child);
        }
        self.attach(parent, child, reference);
        self.observer
            .record(MutationKind::ChildList, parent, vec![child], Vec::new());
    }

    /// Detach `id` from its parent; the node stays inspectable
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.detach(id) {
            self.listeners.retain(|(n, _)| *n != id);
            self.observer
                .record(MutationKind::ChildList, parent, Vec::new(), vec![id]);
        }
    }

    /// Replace the text of a text node
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let NodeData::Text(t) = &mut self.nodes[id.0].data {
            if t != text {
                *t = text.to_string();
                self.observer
                    .record(MutationKind::CharacterData, id, Vec::new(), Vec::new());
            }
        }
    }

    /// Replace all children of an element with one text node
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        for child in self.children(id).to_vec() {
            self.remove(child);
        }
        if !text.is_empty() {
            let node = self.create_text(text);
            self.append_child(id, node);
        }
    }

    /// Split a text node at a byte offset; returns the new node holding the tail
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Option<NodeId> {
        let text = self.text(id)?;
        if offset > text.len() || !text.is_char_boundary(offset) {
            return None;
        }
        let head = text[..offset].to_string();
        let tail = text[offset..].to_string();
        let parent = self.parent(id)?;
        let next = self.next_sibling(id);

        self.set_text(id, &head);
        let tail_node = self.create_text(&tail);
        self.insert_before(parent, tail_node, next);
        Some(tail_node)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, index) = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Move `id` inside `wrapper`, putting `wrapper` where `id` was
    pub fn wrap(&mut self, id: NodeId, wrapper: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        self.insert_before(parent, wrapper, Some(id));
        self.append_child(wrapper, id);
    }

    /// Replace an element with its children
    pub fn unwrap(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        for child in self.children(id).to_vec() {
            self.insert_before(parent, child, Some(id));
        }
        self.remove(id);
    }

    /// Merge adjacent text nodes and drop empty ones under `id`
    pub fn normalize(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        let mut previous_text: Option<NodeId> = None;
        for child in children {
            match self.text(child).map(str::to_string) {
                Some(text) if text.is_empty() => self.remove(child),
                Some(text) => {
                    if let Some(prev) = previous_text {
                        let merged = format!("{}{}", self.text(prev).unwrap_or(""), text);
                        self.set_text(prev, &merged);
                        self.remove(child);
                    } else {
                        previous_text = Some(child);
                    }
                }
                None => {
                    previous_text = None;
                    self.normalize(child);
                }
            }
        }
    }

    // --- Convenience builders ---

    /// Create an element with classes and append it to `parent`
    pub fn append_element(&mut self, parent: NodeId, tag: &str, classes: &[&str]) -> NodeId {
        let el = self.create_element(tag);
        if !classes.is_empty() {
            self.set_attr(el, "class", classes.join(" "));
        }
        self.append_child(parent, el);
        el
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let node = self.create_text(text);
        self.append_child(parent, node);
        node
    }

    // --- Text extraction ---

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        match &self.node(id).data {
            NodeData::Text(t) => t.clone(),
            NodeData::Element(_) => self
                .descendants(id)
                .into_iter()
                .filter_map(|n| self.text(n))
                .collect(),
        }
    }

    /// Approximation of `innerText`: hidden elements skipped, whitespace
    /// collapsed, block boundaries and `<br>` become line breaks, lines
    /// trimmed and blank lines dropped.
    pub fn rendered_text<F>(&self, id: NodeId, skip: F) -> String
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        let mut raw = String::new();
        self.collect_rendered(id, &skip, &mut raw);
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn collect_rendered<F>(&self, id: NodeId, skip: &F, out: &mut String)
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        match &self.node(id).data {
            NodeData::Text(text) => {
                for ch in text.chars() {
                    if ch.is_whitespace() {
                        if !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n') {
                            out.push(' ');
                        }
                    } else {
                        out.push(ch);
                    }
                }
            }
            NodeData::Element(e) => {
                if skip(self, id) || HIDDEN_TAGS.contains(&e.tag.as_str()) {
                    return;
                }
                if e.tag == "br" {
                    out.push('\n');
                    return;
                }
                let block = is_block_tag(&e.tag);
                if block {
                    out.push('\n');
                }
                for child in self.children(id) {
                    self.collect_rendered(*child, skip, out);
                }
                if block {
                    out.push('\n');
                }
            }
        }
    }

    /// Serialize a subtree as HTML
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match &self.node(id).data {
            NodeData::Text(t) => out.push_str(&escape_html(t)),
            NodeData::Element(e) => {
                out.push('<');
                out.push_str(&e.tag);
                for (name, value) in &e.attrs {
                    out.push_str(&format!(" {}=\"{}\"", name, escape_html(value)));
                }
                out.push('>');
                if VOID_TAGS.contains(&e.tag.as_str()) {
                    return;
                }
                for child in self.children(id) {
                    self.write_html(*child, out);
                }
                out.push_str(&format!("</{}>", e.tag));
            }
        }
    }

    // --- Observer ---

    pub fn observe(&mut self, epoch: u64) {
        self.observer.connect(epoch);
    }

    pub fn disconnect_observer(&mut self) {
        self.observer.disconnect();
    }

    pub fn is_observed(&self) -> bool {
        self.observer.is_connected()
    }

    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        self.observer.take()
    }

    // --- Selection ---

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = Some(selection);
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    // --- Listeners ---

    pub fn add_listener(&mut self, id: NodeId, listener: Listener) {
        self.listeners.insert((id, listener));
    }

    pub fn has_listener(&self, id: NodeId, listener: Listener) -> bool {
        self.listeners.contains(&(id, listener))
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
