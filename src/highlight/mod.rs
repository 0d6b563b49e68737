//! Vocabulary highlighting
//!
//! - [`WordFormIndex`]: one composite, longest-form-first pattern over every
//!   known surface form, plus form → entry lookup.
//! - [`HighlightRenderer`]: the unmark-then-rematch pass over the document.
//! - [`Debouncer`]: collapses bursts of re-highlight requests into one pass.
//!
//! ## Pass lifecycle
//!
//! ```text
//! request ──► Debouncer ──► (observer disconnected) ──► unmark ──► mark ──► (observer reconnected)
//! ```
//!
//! The observer is always disconnected before the first edit of a pass and
//! reconnected after the last one; see [`crate::guard`].

pub mod debounce;
pub mod index;
pub mod renderer;

pub use debounce::Debouncer;
pub use index::WordFormIndex;
pub use renderer::{HighlightRenderer, PassReport};

/// Marker class carried by every highlight element
pub const HIGHLIGHT_CLASS: &str = "lingomarker-highlight";

/// Attribute grouping the spans of one match that crosses element boundaries
pub const MATCH_ATTR: &str = "data-lingomarker-match";
