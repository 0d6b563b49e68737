//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use lingomarker_core::sync::RemoteStore;
use lingomarker_core::types::{DeleteResponse, ParagraphRecord, UrlRecord};
use lingomarker_core::{
    Document, Engine, EngineConfig, Entry, ImportSummary, LingoError, MarkRequest, NodeId,
    PageLocation, Relation, Result, SessionInfo, UserDataBundle,
};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Calls recorded by [`FakeRemote`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Session,
    FetchData,
    Mark(MarkRequest),
    Delete(String),
    Import(serde_json::Value),
}

#[derive(Debug, Default)]
struct FakeState {
    authenticated: bool,
    bundle: UserDataBundle,
    calls: Vec<Call>,
    fail_marks: bool,
    offline: bool,
    next_uuid: usize,
}

/// In-memory remote store that behaves like the real backend
#[derive(Debug, Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    /// Logged-in store holding `entries`
    pub fn with_entries(entries: Vec<Entry>) -> Arc<Self> {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            state.authenticated = true;
            state.bundle.entries = entries;
        }
        Arc::new(fake)
    }

    /// Store whose session check reports "not logged in"
    pub fn logged_out() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.state.lock().unwrap().authenticated = authenticated;
    }

    pub fn fail_marks(&self, fail: bool) {
        self.state.lock().unwrap().fail_marks = fail;
    }

    /// Session checks and fetches fail as if the backend were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn marks(&self) -> Vec<MarkRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Mark(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn bundle(&self) -> UserDataBundle {
        self.state.lock().unwrap().bundle.clone()
    }

    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn session(&self) -> Result<SessionInfo> {
        let state = self.record(Call::Session);
        if state.offline {
            return Err(LingoError::NetworkOrTimeout("Connection refused".to_string()));
        }
        Ok(SessionInfo {
            authenticated: state.authenticated,
            username: state.authenticated.then(|| "reader".to_string()),
            ..Default::default()
        })
    }

    async fn fetch_data(&self) -> Result<UserDataBundle> {
        let state = self.record(Call::FetchData);
        if state.offline {
            return Err(LingoError::NetworkOrTimeout("Connection refused".to_string()));
        }
        if !state.authenticated {
            return Err(LingoError::Unauthorized { status: 401 });
        }
        Ok(state.bundle.clone())
    }

    async fn mark(&self, request: &MarkRequest) -> Result<Entry> {
        let mut state = self.record(Call::Mark(request.clone()));
        if !state.authenticated {
            return Err(LingoError::Unauthorized { status: 401 });
        }
        if state.fail_marks {
            return Err(LingoError::RequestFailed {
                status: 500,
                message: Some("Database unavailable".to_string()),
            });
        }

        let now = Utc::now();
        let existing = state
            .bundle
            .entries
            .iter()
            .find(|e| match &request.entry_uuid {
                Some(uuid) => &e.uuid == uuid,
                None => e.word == request.word,
            })
            .cloned();
        let entry = match existing {
            Some(entry) => entry,
            None => {
                state.next_uuid += 1;
                let entry = Entry {
                    uuid: format!("fake-{}", state.next_uuid),
                    word: request.word.clone(),
                    forms_pipe_separated: Some(request.word.clone()),
                    created_at: Some(now),
                    updated_at: Some(now),
                };
                state.bundle.entries.push(entry.clone());
                entry
            }
        };

        if !state.bundle.urls.iter().any(|u| u.url_hash == request.url_hash) {
            state.bundle.urls.push(UrlRecord {
                url_hash: request.url_hash.clone(),
                url: request.url.clone(),
                title: request.title.clone(),
                created_at: Some(now),
            });
        }
        if !state
            .bundle
            .paragraphs
            .iter()
            .any(|p| p.paragraph_hash == request.paragraph_hash)
        {
            state.bundle.paragraphs.push(ParagraphRecord {
                paragraph_hash: request.paragraph_hash.clone(),
                text: request.paragraph_text.clone(),
                created_at: Some(now),
            });
        }
        let key = (
            entry.uuid.clone(),
            request.url_hash.clone(),
            request.paragraph_hash.clone(),
        );
        match state
            .bundle
            .relations
            .iter_mut()
            .find(|r| r.key() == (key.0.as_str(), key.1.as_str(), key.2.as_str()))
        {
            Some(relation) => relation.updated_at = now,
            None => state.bundle.relations.push(Relation {
                entry_uuid: key.0,
                url_hash: key.1,
                paragraph_hash: key.2,
                created_at: now,
                updated_at: now,
            }),
        }

        Ok(entry)
    }

    async fn delete_entry(&self, uuid: &str) -> Result<DeleteResponse> {
        let mut state = self.record(Call::Delete(uuid.to_string()));
        let before = state.bundle.entries.len();
        state.bundle.entries.retain(|e| e.uuid != uuid);
        if state.bundle.entries.len() == before {
            return Err(LingoError::RequestFailed {
                status: 404,
                message: Some("Entry not found".to_string()),
            });
        }
        state.bundle.relations.retain(|r| r.entry_uuid != uuid);
        Ok(DeleteResponse {
            message: "Entry deleted".to_string(),
        })
    }

    async fn import(&self, bundle: &serde_json::Value) -> Result<ImportSummary> {
        let mut state = self.record(Call::Import(bundle.clone()));
        let entries: Vec<Entry> = bundle
            .get("entries")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| LingoError::InvalidDataShape(e.to_string()))?
            .unwrap_or_default();
        let imported = entries.len();
        state.bundle.entries.extend(entries);
        Ok(ImportSummary {
            imported_entries: imported,
            ..Default::default()
        })
    }
}

pub fn entry(uuid: &str, word: &str, forms: &str) -> Entry {
    Entry {
        uuid: uuid.to_string(),
        word: word.to_string(),
        forms_pipe_separated: Some(forms.to_string()),
        created_at: None,
        updated_at: None,
    }
}

/// One-paragraph page per element of `paragraphs`
pub fn page(paragraphs: &[&str]) -> Document {
    let mut doc = Document::new();
    doc.set_title("Reading");
    let body = doc.body();
    for text in paragraphs {
        let p = doc.append_element(body, "p", &[]);
        doc.append_text(p, text);
    }
    doc
}

/// First text node in the body containing `needle`
pub fn find_text(doc: &Document, needle: &str) -> Option<NodeId> {
    doc.descendants(doc.body())
        .into_iter()
        .find(|&n| doc.text(n).map(|t| t.contains(needle)).unwrap_or(false))
}

pub fn engine(doc: Document, store: Arc<FakeRemote>) -> Engine {
    engine_with(EngineConfig::default(), doc, store)
}

pub fn engine_with(config: EngineConfig, doc: Document, store: Arc<FakeRemote>) -> Engine {
    Engine::new(
        config,
        doc,
        PageLocation::parse("https://example.com/stories/one").unwrap(),
        store,
    )
}

/// Run queued remote work until none is left
pub async fn settle(engine: &mut Engine, now: Instant) {
    loop {
        let tasks = engine.take_tasks();
        if tasks.is_empty() {
            break;
        }
        for task in tasks {
            let outcome = task.run().await;
            engine.on_sync_outcome(outcome, now);
        }
    }
}
