//! Sync client: sole writer of the [`UserDataBundle`]
//!
//! Remote work is split in two halves so a request never blocks the caller:
//!
//! 1. `begin_*` builds a self-contained [`SyncTask`] (it carries its own
//!    handle to the store) that the host runs wherever it likes;
//! 2. [`SyncClient::apply`] commits the task's [`SyncOutcome`] to the
//!    bundle. Merges are all-or-nothing: a failed call leaves the bundle as
//!    it was, except that a failed full fetch resets it to empty.
//!
//! The direct `async fn`s run both halves back to back.

pub mod remote;

pub use remote::{HttpRemoteStore, RemoteStore};

use crate::error::{LingoError, Result};
use crate::types::{
    DeleteResponse, Entry, ImportSummary, MarkRequest, ParagraphRecord, Relation, SessionInfo,
    UrlRecord, UserDataBundle,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What triggered a mark request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOrigin {
    /// Confirmation dialog click; failures are reported to the user
    Confirmed,

    /// Selection of an already-known form; silent
    KnownSelection,

    /// Click on an existing highlight; silent
    HighlightClick,
}

impl MarkOrigin {
    pub fn is_user_confirmed(self) -> bool {
        self == MarkOrigin::Confirmed
    }
}

/// Remote operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Session,
    FetchAll,
    Mark,
    Delete,
    Import,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncOp::Session => "session check",
            SyncOp::FetchAll => "fetch",
            SyncOp::Mark => "mark",
            SyncOp::Delete => "delete",
            SyncOp::Import => "import",
        };
        f.write_str(name)
    }
}

/// A prepared remote call
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRequest {
    Session,
    FetchAll,
    Mark { request: MarkRequest, origin: MarkOrigin },
    Delete { uuid: String },
    Import { bundle: serde_json::Value },
}

impl SyncRequest {
    pub fn op(&self) -> SyncOp {
        match self {
            SyncRequest::Session => SyncOp::Session,
            SyncRequest::FetchAll => SyncOp::FetchAll,
            SyncRequest::Mark { .. } => SyncOp::Mark,
            SyncRequest::Delete { .. } => SyncOp::Delete,
            SyncRequest::Import { .. } => SyncOp::Import,
        }
    }
}

/// Self-contained remote work; run it and hand the outcome to
/// [`SyncClient::apply`]
pub struct SyncTask {
    store: Arc<dyn RemoteStore>,
    request: SyncRequest,
}

impl fmt::Debug for SyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTask").field("request", &self.request).finish()
    }
}

impl SyncTask {
    pub fn request(&self) -> &SyncRequest {
        &self.request
    }

    pub async fn run(self) -> SyncOutcome {
        let store = self.store;
        match self.request {
            SyncRequest::Session => SyncOutcome::Session(store.session().await),
            SyncRequest::FetchAll => SyncOutcome::Fetched(store.fetch_data().await),
            SyncRequest::Mark { request, origin } => {
                let result = store.mark(&request).await;
                SyncOutcome::Marked {
                    request,
                    origin,
                    result,
                }
            }
            SyncRequest::Delete { uuid } => {
                let result = store.delete_entry(&uuid).await;
                SyncOutcome::Deleted { uuid, result }
            }
            SyncRequest::Import { bundle } => SyncOutcome::Imported(store.import(&bundle).await),
        }
    }
}

/// Result of a [`SyncTask`]
#[derive(Debug)]
pub enum SyncOutcome {
    Session(Result<SessionInfo>),
    Fetched(Result<UserDataBundle>),
    Marked {
        request: MarkRequest,
        origin: MarkOrigin,
        result: Result<Entry>,
    },
    Deleted {
        uuid: String,
        result: Result<DeleteResponse>,
    },
    Imported(Result<ImportSummary>),
}

/// What [`SyncClient::apply`] did
#[derive(Debug)]
pub enum Committed {
    Session(SessionInfo),

    /// Bundle replaced by a full fetch
    Refreshed,

    /// Mark merged into the bundle
    Marked { origin: MarkOrigin, entry: Entry },

    /// Mark succeeded but the store returned no uuid; a full fetch is due
    NeedsRefresh { origin: MarkOrigin, entry: Entry },

    Deleted { uuid: String },

    /// Import accepted; a full fetch is due
    Imported(ImportSummary),

    Failed {
        op: SyncOp,
        origin: Option<MarkOrigin>,
        error: LingoError,

        /// The bundle was cleared
        reset: bool,
    },
}

impl Committed {
    /// Whether the bundle content changed
    pub fn changed_bundle(&self) -> bool {
        matches!(
            self,
            Committed::Refreshed
                | Committed::Marked { .. }
                | Committed::Deleted { .. }
                | Committed::Failed { reset: true, .. }
        )
    }
}

pub struct SyncClient {
    store: Arc<dyn RemoteStore>,
    bundle: UserDataBundle,

    /// Bumped on every bundle change
    revision: u64,
}

impl fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncClient")
            .field("entries", &self.bundle.entries.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl SyncClient {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            bundle: UserDataBundle::default(),
            revision: 0,
        }
    }

    /// Read-only view of the cached bundle
    pub fn bundle(&self) -> &UserDataBundle {
        &self.bundle
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn entries(&self) -> &[Entry] {
        &self.bundle.entries
    }

    /// Entry owning `form`, compared case-insensitively
    pub fn find_entry_by_form(&self, form: &str) -> Option<&Entry> {
        let needle = form.trim().to_lowercase();
        self.bundle
            .entries
            .iter()
            .find(|e| e.forms().iter().any(|f| f.to_lowercase() == needle))
    }

    /// Drop everything (authentication loss, failed fetch)
    pub fn reset(&mut self) {
        if !self.bundle.is_empty() {
            info!("Clearing cached user data");
        }
        self.bundle = UserDataBundle::default();
        self.revision += 1;
    }

    fn task(&self, request: SyncRequest) -> SyncTask {
        SyncTask {
            store: Arc::clone(&self.store),
            request,
        }
    }

    pub fn begin_session(&self) -> SyncTask {
        self.task(SyncRequest::Session)
    }

    pub fn begin_fetch_all(&self) -> SyncTask {
        self.task(SyncRequest::FetchAll)
    }

    pub fn begin_mark(&self, request: MarkRequest, origin: MarkOrigin) -> SyncTask {
        self.task(SyncRequest::Mark { request, origin })
    }

    pub fn begin_delete(&self, uuid: &str) -> SyncTask {
        self.task(SyncRequest::Delete {
            uuid: uuid.to_string(),
        })
    }

    pub fn begin_import(&self, bundle: serde_json::Value) -> SyncTask {
        self.task(SyncRequest::Import { bundle })
    }

    /// Commit a finished task
    pub fn apply(&mut self, outcome: SyncOutcome) -> Committed {
        self.apply_at(outcome, Utc::now())
    }

    pub fn apply_at(&mut self, outcome: SyncOutcome, now: DateTime<Utc>) -> Committed {
        match outcome {
            SyncOutcome::Session(Ok(session)) => Committed::Session(session),
            SyncOutcome::Session(Err(error)) => self.failed(SyncOp::Session, None, error),

            SyncOutcome::Fetched(Ok(bundle)) => {
                info!(
                    "Fetched user data: {} entries, {} relations",
                    bundle.entries.len(),
                    bundle.relations.len()
                );
                self.bundle = bundle;
                self.revision += 1;
                Committed::Refreshed
            }
            SyncOutcome::Fetched(Err(error)) => self.failed(SyncOp::FetchAll, None, error),

            SyncOutcome::Marked {
                request,
                origin,
                result: Ok(entry),
            } => {
                if entry.uuid.is_empty() {
                    warn!("Mark response carried no uuid, full refresh needed");
                    return Committed::NeedsRefresh { origin, entry };
                }
                self.merge_mark(&request, &entry, now);
                Committed::Marked { origin, entry }
            }
            SyncOutcome::Marked {
                origin,
                result: Err(error),
                ..
            } => self.failed(SyncOp::Mark, Some(origin), error),

            SyncOutcome::Deleted { uuid, result: Ok(_) } => {
                self.remove_entry(&uuid);
                Committed::Deleted { uuid }
            }
            SyncOutcome::Deleted { result: Err(error), .. } => {
                self.failed(SyncOp::Delete, None, error)
            }

            SyncOutcome::Imported(Ok(summary)) => {
                info!(
                    "Imported {} entries, {} urls, {} paragraphs, {} relations",
                    summary.imported_entries,
                    summary.imported_urls,
                    summary.imported_paragraphs,
                    summary.imported_relations
                );
                Committed::Imported(summary)
            }
            SyncOutcome::Imported(Err(error)) => self.failed(SyncOp::Import, None, error),
        }
    }

    fn failed(&mut self, op: SyncOp, origin: Option<MarkOrigin>, error: LingoError) -> Committed {
        error!("Remote {} failed: {}", op, error);
        let reset = op == SyncOp::FetchAll || error.is_unauthorized();
        if reset {
            self.reset();
        }
        Committed::Failed {
            op,
            origin,
            error,
            reset,
        }
    }

    /// Upsert the entry and its url/paragraph/relation records
    fn merge_mark(&mut self, request: &MarkRequest, entry: &Entry, now: DateTime<Utc>) {
        let bundle = &mut self.bundle;

        match bundle.entries.iter_mut().find(|e| e.uuid == entry.uuid) {
            Some(existing) => *existing = entry.clone(),
            None => bundle.entries.push(entry.clone()),
        }

        if !bundle.urls.iter().any(|u| u.url_hash == request.url_hash) {
            bundle.urls.push(UrlRecord {
                url_hash: request.url_hash.clone(),
                url: request.url.clone(),
                title: request.title.clone(),
                created_at: Some(now),
            });
        }

        if !bundle
            .paragraphs
            .iter()
            .any(|p| p.paragraph_hash == request.paragraph_hash)
        {
            bundle.paragraphs.push(ParagraphRecord {
                paragraph_hash: request.paragraph_hash.clone(),
                text: request.paragraph_text.clone(),
                created_at: Some(now),
            });
        }

        let key = (
            entry.uuid.as_str(),
            request.url_hash.as_str(),
            request.paragraph_hash.as_str(),
        );
        match bundle.relations.iter_mut().find(|r| r.key() == key) {
            Some(relation) => relation.updated_at = now,
            None => bundle.relations.push(Relation {
                entry_uuid: entry.uuid.clone(),
                url_hash: request.url_hash.clone(),
                paragraph_hash: request.paragraph_hash.clone(),
                created_at: now,
                updated_at: now,
            }),
        }

        self.revision += 1;
        debug!("Merged mark for \"{}\" ({})", entry.word, entry.uuid);
    }

    fn remove_entry(&mut self, uuid: &str) {
        let before = self.bundle.entries.len();
        self.bundle.entries.retain(|e| e.uuid != uuid);
        self.bundle.relations.retain(|r| r.entry_uuid != uuid);
        if self.bundle.entries.len() != before {
            self.revision += 1;
            debug!("Removed entry {}", uuid);
        }
    }

    // --- Direct calls ---

    pub async fn session(&mut self) -> Result<SessionInfo> {
        let outcome = self.begin_session().run().await;
        match self.apply(outcome) {
            Committed::Session(session) => Ok(session),
            other => Err(unexpected(other)),
        }
    }

    pub async fn fetch_all(&mut self) -> Result<&UserDataBundle> {
        let outcome = self.begin_fetch_all().run().await;
        match self.apply(outcome) {
            Committed::Refreshed => Ok(&self.bundle),
            other => Err(unexpected(other)),
        }
    }

    /// Mark and merge; falls back to a full fetch when the store omits the uuid
    pub async fn mark(&mut self, request: MarkRequest, origin: MarkOrigin) -> Result<Entry> {
        let outcome = self.begin_mark(request, origin).run().await;
        match self.apply(outcome) {
            Committed::Marked { entry, .. } => Ok(entry),
            Committed::NeedsRefresh { entry, .. } => {
                self.fetch_all().await?;
                Ok(entry)
            }
            other => Err(unexpected(other)),
        }
    }

    pub async fn delete_entry(&mut self, uuid: &str) -> Result<()> {
        let outcome = self.begin_delete(uuid).run().await;
        match self.apply(outcome) {
            Committed::Deleted { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Import a legacy bundle, then refresh
    pub async fn import(&mut self, bundle: serde_json::Value) -> Result<ImportSummary> {
        let outcome = self.begin_import(bundle).run().await;
        match self.apply(outcome) {
            Committed::Imported(summary) => {
                self.fetch_all().await?;
                Ok(summary)
            }
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(committed: Committed) -> LingoError {
    match committed {
        Committed::Failed { error, .. } => error,
        other => LingoError::InvalidOperation(format!("Unexpected sync result: {:?}", other)),
    }
}
