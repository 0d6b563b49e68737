//! Mutation feedback guard
//!
//! Decides whether a batch of observed DOM changes warrants a re-highlight.
//! Two mechanisms keep the engine's own edits out of the loop:
//!
//! - **Permits**: while any [`SuppressionPermit`] is outstanding the
//!   document observer is disconnected, so edits made under a permit are
//!   never recorded. Releasing the last permit reconnects the observer under
//!   a fresh epoch; records stamped with an older epoch are ignored.
//! - **Classification**: records that only touch highlight or dialog
//!   subtrees, engine chrome, or that change nothing are not significant.

use crate::chrome::{LOGIN_PROMPT_ID, STYLE_ELEMENT_ID};
use crate::dialog::DIALOG_CLASS;
use crate::dom::{Document, MutationKind, MutationRecord, NodeId};
use crate::highlight::HIGHLIGHT_CLASS;
use tracing::{debug, trace, warn};

/// Guard state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Observer connected, batches are classified
    Observing,

    /// A highlight pass or dialog insertion holds a permit
    Suppressed,
}

/// Proof that the observer is disconnected; hand it back with
/// [`MutationGuard::release`]
#[derive(Debug)]
#[must_use = "a permit that is never released keeps the observer disconnected"]
pub struct SuppressionPermit {
    generation: u64,
}

impl SuppressionPermit {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
pub struct MutationGuard {
    /// Current observer epoch
    generation: u64,

    /// Outstanding permits
    depth: u32,

    /// Observation has been started at least once
    started: bool,
}

impl MutationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GuardState {
        if self.depth > 0 || !self.started {
            GuardState::Suppressed
        } else {
            GuardState::Observing
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Connect the observer for the first time
    pub fn start(&mut self, doc: &mut Document) {
        self.started = true;
        if self.depth == 0 {
            doc.observe(self.generation);
        }
    }

    /// Disconnect the observer for good (engine shutdown or disablement)
    pub fn stop(&mut self, doc: &mut Document) {
        self.started = false;
        doc.disconnect_observer();
    }

    /// Disconnect the observer until the returned permit is released
    pub fn suppress(&mut self, doc: &mut Document) -> SuppressionPermit {
        if self.depth == 0 {
            doc.disconnect_observer();
            self.generation += 1;
            trace!("Observer suppressed (generation {})", self.generation);
        }
        self.depth += 1;
        SuppressionPermit {
            generation: self.generation,
        }
    }

    /// Return a permit; the last one reconnects the observer
    pub fn release(&mut self, doc: &mut Document, permit: SuppressionPermit) {
        if permit.generation != self.generation || self.depth == 0 {
            warn!(
                "Ignoring stale suppression permit (generation {}, current {})",
                permit.generation, self.generation
            );
            return;
        }
        self.depth -= 1;
        if self.depth == 0 && self.started {
            doc.observe(self.generation);
            trace!("Observer reconnected (generation {})", self.generation);
        }
    }

    /// Whether a batch should trigger a debounced re-highlight
    pub fn is_significant(&self, doc: &Document, batch: &[MutationRecord]) -> bool {
        if self.state() == GuardState::Suppressed {
            return false;
        }
        let significant = batch
            .iter()
            .filter(|record| record.epoch == self.generation)
            .any(|record| !is_self_inflicted(doc, record));
        if significant {
            debug!("Significant mutation batch ({} records)", batch.len());
        }
        significant
    }
}

/// Inside a highlight or the dialog, or engine chrome itself
fn is_owned(doc: &Document, node: NodeId) -> bool {
    doc.closest(node, |d, n| {
        d.has_class(n, HIGHLIGHT_CLASS)
            || d.has_class(n, DIALOG_CLASS)
            || matches!(d.attr(n, "id"), Some(id) if id == LOGIN_PROMPT_ID || id == STYLE_ELEMENT_ID)
    })
    .is_some()
}

fn is_self_inflicted(doc: &Document, record: &MutationRecord) -> bool {
    // (c) nothing added or removed
    if record.is_noop() {
        return true;
    }

    // (a) target nested in an engine-owned subtree
    if is_owned(doc, record.target) {
        return true;
    }

    match record.kind {
        MutationKind::CharacterData => false,
        MutationKind::ChildList => {
            // (b) only highlight/dialog nodes or a highlight's own text moved
            record
                .added
                .iter()
                .chain(record.removed.iter())
                .all(|node| is_owned(doc, *node) || is_highlight_text(doc, *node))
        }
    }
}

/// A lone text node whose parent is a highlight
fn is_highlight_text(doc: &Document, node: NodeId) -> bool {
    doc.is_text(node)
        && doc
            .parent(node)
            .map(|p| doc.has_class(p, HIGHLIGHT_CLASS))
            .unwrap_or(false)
}
