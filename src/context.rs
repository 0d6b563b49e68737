//! Context extraction
//!
//! Derives the content-addressed identity of the place a word was met: the
//! enclosing paragraph (hashed by its rendered text) and the canonical URL
//! (hashed by its string form). Hashing content rather than DOM positions is
//! what lets the same paragraph be recognised after a reload or translation
//! overlay, while identical sentences on different pages stay distinct.

use crate::dialog::DIALOG_CLASS;
use crate::dom::{is_inline_tag, Document, NodeId};
use crate::error::{LingoError, Result};
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Translation overlays injected by browser extensions
pub const TRANSLATE_OVERLAY_CLASS: &str = "immersive-translate-target-wrapper";

/// Fragment key carrying the segment time on review-page links
const SEGMENT_TIMESTAMP_KEY: &str = "segment_timestamp";

/// Hex-encoded SHA-256 of `text`
pub fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Location of the page being read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    url: reqwest::Url,
}

impl PageLocation {
    pub fn parse(href: &str) -> Result<Self> {
        let url = reqwest::Url::parse(href)
            .map_err(|e| LingoError::InvalidOperation(format!("invalid page URL {}: {}", href, e)))?;
        Ok(Self { url })
    }

    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Resolve a possibly relative href against this page
    pub fn resolve(&self, href: &str) -> String {
        self.url
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }
}

/// Identity of one occurrence site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphContext {
    pub paragraph_text: String,
    pub paragraph_hash: String,
    pub url: String,
    pub url_hash: String,
    pub title: Option<String>,
}

/// Derives [`ParagraphContext`]s for nodes of a document
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    backend_base: String,
    allow_fragment_prefixes: Vec<String>,
}

impl ContextExtractor {
    pub fn new(backend_url: &str, allow_fragment_prefixes: Vec<String>) -> Self {
        Self {
            backend_base: backend_url.trim_end_matches('/').to_string(),
            allow_fragment_prefixes,
        }
    }

    pub fn set_allow_fragment_prefixes(&mut self, prefixes: Vec<String>) {
        self.allow_fragment_prefixes = prefixes;
    }

    /// Context of the text (or element) node `node`
    pub fn extract(
        &self,
        doc: &Document,
        location: &PageLocation,
        node: NodeId,
    ) -> Result<ParagraphContext> {
        let paragraph_text = self.paragraph_text(doc, node)?;
        let paragraph_hash = sha256_hex(&paragraph_text);

        let node_url = self.url_for_node(doc, location, node);
        let (url, fragment) = self.canonicalize(&node_url);
        let url_hash = sha256_hex(&url);

        let title = doc.title().trim();
        let title = match fragment {
            Some(fragment) => format!("{} #{}", title, fragment),
            None => title.to_string(),
        };
        let title = if title.trim().is_empty() { None } else { Some(title) };

        debug!("Context for node {}: url={}, paragraph={}", node.index(), url, paragraph_hash);

        Ok(ParagraphContext {
            paragraph_text,
            paragraph_hash,
            url,
            url_hash,
            title,
        })
    }

    /// The block element whose text identifies `node`'s paragraph
    pub fn paragraph_element(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        let parent = doc.parent(node)?;
        let root = doc.body();

        let mut element = Some(parent);
        while let Some(current) = element {
            if current == root || current == doc.html() {
                break;
            }
            let inline = doc.tag(current).map(is_inline_tag).unwrap_or(false);
            if inline || doc.text_content(current).trim().is_empty() {
                element = doc.parent(current);
            } else {
                break;
            }
        }

        match element {
            Some(el) if el != root && el != doc.html() => Some(el),
            _ => Some(parent),
        }
    }

    /// Rendered text of `node`'s paragraph
    pub fn paragraph_text(&self, doc: &Document, node: NodeId) -> Result<String> {
        let element = self
            .paragraph_element(doc, node)
            .ok_or_else(|| LingoError::ContextUnavailable("node is detached".to_string()))?;

        let text = doc.rendered_text(element, |d, n| {
            d.has_class(n, TRANSLATE_OVERLAY_CLASS) || d.has_class(n, DIALOG_CLASS)
        });
        let text = if text.trim().is_empty() {
            doc.text_content(node).trim().to_string()
        } else {
            text.trim().to_string()
        };

        if text.is_empty() {
            return Err(LingoError::ContextUnavailable(
                "could not extract paragraph text".to_string(),
            ));
        }
        Ok(text)
    }

    /// Nearest meaningful URL for `node`, falling back to the page location
    pub fn url_for_node(&self, doc: &Document, location: &PageLocation, node: NodeId) -> String {
        let root = doc.body();
        let internal_prefix = format!("{}/#", location.origin());

        let mut current = Some(node);
        while let Some(cur) = current {
            if cur == root {
                break;
            }

            if doc.tag(cur) == Some("h3") && doc.has_class(cur, "review-source-title") {
                if let Some(child) = doc.first_child(cur) {
                    if doc.tag(child) == Some("a") && doc.has_class(child, "review-source-link") {
                        if let Some(href) = doc.attr(child, "href") {
                            return self.normalize_backend_url(&location.resolve(href));
                        }
                    }
                }
            }

            if doc.tag(cur) == Some("a") {
                if let Some(href) = doc.attr(cur, "href") {
                    let absolute = location.resolve(href);
                    if !absolute.starts_with(&internal_prefix) && absolute.starts_with("http") {
                        return self.normalize_backend_url(&absolute);
                    }
                }
            }

            current = if doc.tag(cur) == Some("p") && doc.has_class(cur, "review-paragraph") {
                doc.previous_element_sibling(cur)
            } else {
                doc.parent(cur)
            };
        }

        self.normalize_backend_url(location.href())
    }

    /// Strip the backend origin so backend pages hash by path
    pub fn normalize_backend_url(&self, url: &str) -> String {
        match url.strip_prefix(&self.backend_base) {
            Some(rest) if !self.backend_base.is_empty() => {
                if rest.starts_with('/') {
                    rest.to_string()
                } else {
                    format!("/{}", rest)
                }
            }
            _ => url.to_string(),
        }
    }

    /// Canonical URL plus the fragment, when the fragment was preserved
    pub fn canonicalize(&self, node_url: &str) -> (String, Option<String>) {
        let keep_fragment = self
            .allow_fragment_prefixes
            .iter()
            .any(|prefix| node_url.starts_with(prefix.as_str()));

        if keep_fragment {
            let fragment = node_url
                .split_once('#')
                .map(|(_, f)| f.to_string())
                .filter(|f| !f.is_empty());
            (node_url.to_string(), fragment)
        } else {
            let url = node_url.split('#').next().unwrap_or(node_url);
            (url.to_string(), None)
        }
    }

    /// Timestamp reference of a podcast transcript segment, if any
    pub fn transcript_segment_ref(
        &self,
        doc: &Document,
        location: &PageLocation,
        node: NodeId,
    ) -> Option<String> {
        let element = if doc.is_text(node) { doc.parent(node)? } else { node };

        if location.path().starts_with("/podcasts/play/") {
            let segment = doc.closest_class(element, "transcript-segment")?;
            return doc.attr(segment, "data-timestamp").map(str::to_string);
        }

        if location.path().starts_with("/review") {
            let scope = doc.parent(element)?;
            let icon = doc.descendants(scope).into_iter().find(|n| {
                doc.tag(*n) == Some("a") && doc.has_class(*n, "goto-segment-icon")
            })?;
            let href = location.resolve(doc.attr(icon, "href")?);
            let fragment = href.split('#').nth(1)?;
            let value = fragment
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == SEGMENT_TIMESTAMP_KEY)
                .map(|(_, value)| value)
                .filter(|v| !v.is_empty())?;
            return percent_decode_str(value)
                .decode_utf8()
                .ok()
                .map(|v| v.into_owned());
        }

        None
    }
}
