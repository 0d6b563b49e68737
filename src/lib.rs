//! LingoMarker - Selection-to-Annotation Synchronization Engine
//!
//! Turns text selections on a reading page into vocabulary annotations kept
//! in a remote store, and keeps every known word form highlighted on the page:
//! - Selection classification (known form, unknown word, rejected)
//! - Confirmation dialog with timeout and outside-click dismissal
//! - Paragraph context extraction with content hashes
//! - Remote synchronization with local bundle merging
//! - Debounced re-highlighting that ignores its own DOM mutations
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Wire records (Entry, Relation, UserDataBundle, ...)
//! - **Dom**: Arena page model with selection and mutation observer
//! - **Highlight**: Word-form index, renderer and debounce timer
//! - **Sync**: Remote store trait, HTTP client and bundle merging
//! - **Engine**: Clock-injected coordinator; `runtime` drives it on tokio
//!
//! # Example
//!
//! ```ignore
//! use lingomarker_core::{runtime, Document, Engine, EngineConfig, HttpRemoteStore, PageLocation};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::default().with_env_overrides()?;
//!     let store = Arc::new(HttpRemoteStore::new(&config)?);
//!     let location = PageLocation::parse("https://example.com/story")?;
//!
//!     let engine = Engine::new(config, Document::new(), location, store);
//!     let mut handle = runtime::spawn(engine);
//!     while let Some(notice) = handle.next_notice().await {
//!         println!("{:?}", notice);
//!     }
//!     Ok(())
//! }
//! ```

pub mod chrome;
pub mod classifier;
pub mod config;
pub mod context;
pub mod dialog;
pub mod dom;
pub mod engine;
pub mod error;
pub mod guard;
pub mod highlight;
pub mod runtime;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use classifier::{Classification, Rejection, SelectionClassifier, SelectionLimits};
pub use config::{ConfigError, EngineConfig, InputMode};
pub use context::{ContextExtractor, PageLocation, ParagraphContext};
pub use dialog::{ConfirmationDialog, DialogOutcome, DismissReason};
pub use dom::{Document, NodeId, Selection};
pub use engine::{Engine, EngineStatus, Notice};
pub use error::{LingoError, Result};
pub use guard::MutationGuard;
pub use highlight::{HighlightRenderer, WordFormIndex};
pub use runtime::{EngineEvent, EngineHandle};
pub use sync::{HttpRemoteStore, MarkOrigin, RemoteStore, SyncClient};
pub use types::{
    Entry, ImportSummary, MarkRequest, ParagraphRecord, Relation, SessionInfo, UrlRecord,
    UserDataBundle, UserSettings,
};
