//! Confirmation dialog state machine
//!
//! At most one dialog exists. Opening while one is already awaiting reuses
//! the element, replaces the candidate and restarts the timer. The dialog
//! leaves `Awaiting` through exactly one of: a click on it (confirm), a
//! click elsewhere once the outside-click handler is armed, the timeout, or
//! an explicit dismissal. Only confirmation yields a mark.
//!
//! Dismissal never touches the page selection.

use crate::config::InputMode;
use crate::dom::{Document, NodeId};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Marker class of the dialog element
pub const DIALOG_CLASS: &str = "lingomarker-dialog";

/// Keeps page translators away from the dialog caption
const NO_TRANSLATE_CLASS: &str = "notranslate";

/// A candidate waiting for confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMark {
    pub dialog: NodeId,

    /// Selection text as shown to the user
    pub caption: String,

    /// Lowercased caption sent with the mark request
    pub word: String,

    /// Node the selection ended in; context is derived from it on confirm
    pub source: NodeId,

    pub deadline: Instant,

    /// Outside clicks before this instant are ignored
    pub armed_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogState {
    Idle,
    Awaiting(PendingMark),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    Timeout,
    OutsideClick,

    /// A follow-up selection was invalid or already known
    Superseded,
}

/// How an awaiting dialog ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    Confirmed(PendingMark),
    Dismissed(DismissReason),
}

#[derive(Debug)]
pub struct ConfirmationDialog {
    timeout: Duration,
    outside_click_delay: Duration,
    input_mode: InputMode,
    state: DialogState,
}

impl ConfirmationDialog {
    pub fn new(timeout: Duration, outside_click_delay: Duration, input_mode: InputMode) -> Self {
        Self {
            timeout,
            outside_click_delay,
            input_mode,
            state: DialogState::Idle,
        }
    }

    pub fn state(&self) -> &DialogState {
        &self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, DialogState::Awaiting(_))
    }

    pub fn pending(&self) -> Option<&PendingMark> {
        match &self.state {
            DialogState::Awaiting(pending) => Some(pending),
            DialogState::Idle => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending().map(|p| p.deadline)
    }

    /// Vertical gap between selection and dialog, larger under a finger
    pub fn offset_top(&self) -> u32 {
        match self.input_mode {
            InputMode::Touch => 28,
            InputMode::Pointer => 5,
        }
    }

    /// Show (or refresh) the dialog for `caption`
    ///
    /// Callers hold a suppression permit while this runs.
    pub fn open(&mut self, doc: &mut Document, caption: &str, word: &str, source: NodeId, now: Instant) -> NodeId {
        let (dialog, armed_at) = match &self.state {
            DialogState::Awaiting(pending) if doc.is_connected(pending.dialog) => {
                debug!("Dialog already open, restarting timer");
                (pending.dialog, pending.armed_at)
            }
            _ => {
                let dialog = doc.create_element("div");
                doc.set_attr(dialog, "class", format!("{} {}", DIALOG_CLASS, NO_TRANSLATE_CLASS));
                doc.set_attr(
                    dialog,
                    "style",
                    format!(
                        "position: absolute; margin-top: {}px; z-index: 2147483647; cursor: pointer;",
                        self.offset_top()
                    ),
                );
                doc.set_attr(dialog, "data-anchor", source.index().to_string());
                let body = doc.body();
                doc.append_child(body, dialog);
                (dialog, now + self.outside_click_delay)
            }
        };

        doc.set_text_content(dialog, &format!("Mark \"{}\"", caption));
        self.state = DialogState::Awaiting(PendingMark {
            dialog,
            caption: caption.to_string(),
            word: word.to_string(),
            source,
            deadline: now + self.timeout,
            armed_at,
        });
        info!("Awaiting confirmation for \"{}\"", caption);
        dialog
    }

    /// Route a page click; `None` when the dialog does not react to it
    pub fn on_click(&mut self, doc: &mut Document, target: NodeId, now: Instant) -> Option<DialogOutcome> {
        let pending = self.pending()?;
        if doc.contains(pending.dialog, target) {
            let pending = self.close(doc)?;
            info!("Confirmed \"{}\"", pending.caption);
            return Some(DialogOutcome::Confirmed(pending));
        }
        if now < pending.armed_at {
            return None;
        }
        self.dismiss(doc, DismissReason::OutsideClick)
    }

    /// Fire the auto-dismiss timer if due
    pub fn on_timer(&mut self, doc: &mut Document, now: Instant) -> Option<DialogOutcome> {
        match self.deadline() {
            Some(deadline) if deadline <= now => self.dismiss(doc, DismissReason::Timeout),
            _ => None,
        }
    }

    pub fn dismiss(&mut self, doc: &mut Document, reason: DismissReason) -> Option<DialogOutcome> {
        let pending = self.close(doc)?;
        debug!("Dialog for \"{}\" dismissed: {:?}", pending.caption, reason);
        Some(DialogOutcome::Dismissed(reason))
    }

    fn close(&mut self, doc: &mut Document) -> Option<PendingMark> {
        match std::mem::replace(&mut self.state, DialogState::Idle) {
            DialogState::Awaiting(pending) => {
                doc.remove(pending.dialog);
                Some(pending)
            }
            DialogState::Idle => None,
        }
    }
}
