//! Engine coordinator
//!
//! Owns every component plus the page and wires them into the
//! selection → dialog → sync → re-highlight loop. The engine never waits:
//! every entry point takes the current instant, remote work is queued as
//! [`SyncTask`]s for the host to run, user-facing messages are queued as
//! [`Notice`]s, and timers are exposed through [`Engine::next_deadline`] and
//! [`Engine::on_timer`].

use crate::chrome;
use crate::classifier::{Classification, Rejection, SelectionClassifier, SelectionLimits};
use crate::config::{EngineConfig, InputMode};
use crate::context::{ContextExtractor, PageLocation};
use crate::dialog::{ConfirmationDialog, DialogOutcome, DismissReason, PendingMark};
use crate::dom::{Document, Listener, NodeId};
use crate::error::LingoError;
use crate::guard::MutationGuard;
use crate::highlight::{Debouncer, HighlightRenderer, WordFormIndex, HIGHLIGHT_CLASS};
use crate::sync::{Committed, MarkOrigin, RemoteStore, SyncClient, SyncOp, SyncOutcome, SyncTask};
use crate::types::{Entry, ImportSummary, MarkRequest, UserSettings};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Characters escaped when building dictionary links
const URI_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Created, `start` not called yet
    Idle,

    /// Waiting for the first session check
    Starting,

    Active,

    /// Session missing or expired; login prompt shown
    Unauthenticated,

    /// Session check failed for a reason other than 401; no highlights
    /// until a later check succeeds
    Offline,

    /// Page exceeds the size ceiling; the engine never touches it
    Disabled,
}

/// Messages for the user, delivered by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Blocking notification for a failed user action
    Alert(String),

    /// Open a dictionary lookup in a new tab
    OpenDictionary(String),

    /// Open the backend's login page
    OpenLogin(String),

    LoginRequired,

    EntryRemoved { word: String },

    ImportFinished(ImportSummary),
}

pub struct Engine {
    config: EngineConfig,
    doc: Document,
    location: PageLocation,
    status: EngineStatus,
    settings: UserSettings,

    sync: SyncClient,
    index: WordFormIndex,
    indexed_revision: Option<u64>,
    renderer: HighlightRenderer,
    guard: MutationGuard,
    classifier: SelectionClassifier,
    extractor: ContextExtractor,
    dialog: ConfirmationDialog,

    highlight_debounce: Debouncer,
    selection_debounce: Debouncer,

    tasks: VecDeque<SyncTask>,
    notices: VecDeque<Notice>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("status", &self.status)
            .field("location", &self.location.href())
            .field("sync", &self.sync)
            .field("queued_tasks", &self.tasks.len())
            .finish()
    }
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        doc: Document,
        location: PageLocation,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        let settings = UserSettings::default();
        let extractor = ContextExtractor::new(config.backend_base(), settings.allow_fragment_prefixes());
        let dialog = ConfirmationDialog::new(
            config.dialog_timeout,
            config.outside_click_delay,
            config.input_mode,
        );

        Self {
            highlight_debounce: Debouncer::new(config.highlight_debounce),
            selection_debounce: Debouncer::new(config.selection_debounce),
            classifier: SelectionClassifier::new(SelectionLimits::from(&settings)),
            config,
            doc,
            location,
            status: EngineStatus::Idle,
            settings,
            sync: SyncClient::new(store),
            index: WordFormIndex::empty(),
            indexed_revision: None,
            renderer: HighlightRenderer::new(),
            guard: MutationGuard::new(),
            extractor,
            dialog,
            tasks: VecDeque::new(),
            notices: VecDeque::new(),
        }
    }

    // --- Accessors ---

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == EngineStatus::Active
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Page access for hosts; report edits with [`Engine::on_mutations`]
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn location(&self) -> &PageLocation {
        &self.location
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    pub fn sync(&self) -> &SyncClient {
        &self.sync
    }

    pub fn index(&self) -> &WordFormIndex {
        &self.index
    }

    pub fn dialog(&self) -> &ConfirmationDialog {
        &self.dialog
    }

    pub fn highlight_passes(&self) -> u64 {
        self.renderer.passes()
    }

    /// Drain queued remote work
    pub fn take_tasks(&mut self) -> Vec<SyncTask> {
        self.tasks.drain(..).collect()
    }

    /// Drain queued user notices
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    fn is_running(&self) -> bool {
        !matches!(self.status, EngineStatus::Idle | EngineStatus::Disabled)
    }

    // --- Lifecycle ---

    /// Check the page size, start observing and check the session
    pub fn start(&mut self, _now: Instant) {
        if self.status != EngineStatus::Idle {
            return;
        }
        let size = self.doc.text_content(self.doc.body()).chars().count();
        if size > self.config.page_size_limit {
            warn!(
                "Page too large ({} > {} characters), LingoMarker disabled",
                size, self.config.page_size_limit
            );
            self.status = EngineStatus::Disabled;
            return;
        }

        info!("Starting LingoMarker on {}", self.location.href());
        self.status = EngineStatus::Starting;
        self.guard.start(&mut self.doc);
        self.tasks.push_back(self.sync.begin_session());
    }

    /// Tab became visible again: re-check the session, then refetch
    pub fn on_visibility_regained(&mut self, _now: Instant) {
        if !self.is_running() {
            return;
        }
        debug!("Visibility regained, re-syncing");
        self.tasks.push_back(self.sync.begin_session());
    }

    /// Menu command: refetch all data
    pub fn reload(&mut self, _now: Instant) {
        if self.status != EngineStatus::Active {
            return;
        }
        self.tasks.push_back(self.sync.begin_fetch_all());
    }

    /// Menu command: delete the entry owning `word` (confirmed by the host)
    pub fn remove_entry_for_word(&mut self, word: &str) -> bool {
        if self.status != EngineStatus::Active {
            return false;
        }
        let Some(entry) = self.sync.find_entry_by_form(word) else {
            self.notices
                .push_back(Notice::Alert(format!("LingoMarker: Word \"{}\" not found.", word.trim())));
            return false;
        };
        info!("Removing entry {} (\"{}\")", entry.uuid, entry.word);
        let task = self.sync.begin_delete(&entry.uuid);
        self.tasks.push_back(task);
        true
    }

    /// Menu command: import a legacy bundle
    pub fn import(&mut self, bundle: serde_json::Value) {
        if self.status != EngineStatus::Active {
            return;
        }
        self.tasks.push_back(self.sync.begin_import(bundle));
    }

    // --- Timers ---

    /// Earliest pending timer
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.highlight_debounce.deadline(),
            self.selection_debounce.deadline(),
            self.dialog.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn on_timer(&mut self, now: Instant) {
        if self.selection_debounce.fire_due(now) {
            self.evaluate_selection(now);
        }

        if self.dialog.deadline().map(|d| d <= now).unwrap_or(false) {
            let permit = self.guard.suppress(&mut self.doc);
            self.dialog.on_timer(&mut self.doc, now);
            self.guard.release(&mut self.doc, permit);
        }

        if self.highlight_debounce.fire_due(now) {
            self.run_highlight_pass();
        }
    }

    // --- Page events ---

    /// Pointer released; the selection is final
    pub fn on_pointer_up(&mut self, now: Instant) {
        if self.config.input_mode == InputMode::Pointer {
            self.evaluate_selection(now);
        }
    }

    /// Selection changed; touch input waits for the selection to settle
    pub fn on_selection_change(&mut self, now: Instant) {
        if self.config.input_mode == InputMode::Touch && self.is_running() {
            self.selection_debounce.schedule(now);
        }
    }

    /// Click anywhere on the page
    pub fn on_click(&mut self, target: NodeId, now: Instant) {
        if !self.is_running() {
            return;
        }

        if let Some(link) = self.doc.element_by_id(chrome::LOGIN_LINK_ID) {
            if self.doc.contains(link, target) {
                self.notices
                    .push_back(Notice::OpenLogin(format!("{}/login", self.config.backend_base())));
                let permit = self.guard.suppress(&mut self.doc);
                chrome::hide_login_prompt(&mut self.doc);
                self.guard.release(&mut self.doc, permit);
                return;
            }
        }

        if self.dialog.is_awaiting() {
            let permit = self.guard.suppress(&mut self.doc);
            let outcome = self.dialog.on_click(&mut self.doc, target, now);
            self.guard.release(&mut self.doc, permit);
            match outcome {
                Some(DialogOutcome::Confirmed(pending)) => {
                    self.confirm_mark(pending);
                    return;
                }
                Some(DialogOutcome::Dismissed(_)) | None => {}
            }
        }

        if self.status != EngineStatus::Active {
            return;
        }
        let highlight = self.doc.closest(target, |d, n| {
            d.has_class(n, HIGHLIGHT_CLASS) && d.has_listener(n, Listener::HighlightClick)
        });
        if let Some(span) = highlight {
            self.highlight_clicked(span);
        }
    }

    /// The host edited the page; classify what the observer recorded
    pub fn on_mutations(&mut self, now: Instant) {
        let batch = self.doc.take_records();
        if batch.is_empty() || self.status != EngineStatus::Active {
            return;
        }
        if self.guard.is_significant(&self.doc, &batch) {
            self.highlight_debounce.schedule(now);
        }
    }

    // --- Selection flow ---

    fn evaluate_selection(&mut self, now: Instant) {
        if self.status != EngineStatus::Active {
            return;
        }
        let Some(selection) = self.doc.selection().copied() else {
            return;
        };
        self.refresh_index();

        match self.classifier.classify(&self.doc, &selection, &self.index) {
            Classification::Rejected(rejection) => {
                if matches!(
                    rejection,
                    Rejection::TooManyWords { .. } | Rejection::TooLong { .. }
                ) {
                    self.dismiss_dialog(DismissReason::Superseded);
                }
            }
            Classification::Known { entry, caption, node } => {
                self.dismiss_dialog(DismissReason::Superseded);
                info!("Known word \"{}\" selected, refreshing its context", caption);
                self.queue_mark(&entry.word, Some(&entry), node, MarkOrigin::KnownSelection);
            }
            Classification::Unknown { caption, word, node } => {
                let permit = self.guard.suppress(&mut self.doc);
                self.dialog.open(&mut self.doc, &caption, &word, node, now);
                self.guard.release(&mut self.doc, permit);
            }
        }
    }

    fn dismiss_dialog(&mut self, reason: DismissReason) {
        if !self.dialog.is_awaiting() {
            return;
        }
        let permit = self.guard.suppress(&mut self.doc);
        self.dialog.dismiss(&mut self.doc, reason);
        self.guard.release(&mut self.doc, permit);
    }

    fn confirm_mark(&mut self, pending: PendingMark) {
        info!("Marking new word \"{}\"", pending.caption);
        if !self.queue_mark(&pending.word, None, pending.source, MarkOrigin::Confirmed) {
            self.notices.push_back(Notice::Alert(
                LingoError::ContextUnavailable(String::new()).user_message(),
            ));
        }
    }

    fn highlight_clicked(&mut self, span: NodeId) {
        let text = HighlightRenderer::match_text(&self.doc, span);
        let Some(entry) = self.index.find_entry(&text).cloned() else {
            warn!("Clicked highlight \"{}\" has no matching entry", text);
            return;
        };
        debug!("Highlight \"{}\" clicked (entry {})", text, entry.uuid);
        self.queue_mark(&entry.word, Some(&entry), span, MarkOrigin::HighlightClick);
    }

    /// Derive context for `node` and queue a mark; `false` if no context
    fn queue_mark(&mut self, word: &str, entry: Option<&Entry>, node: NodeId, origin: MarkOrigin) -> bool {
        let context = match self.extractor.extract(&self.doc, &self.location, node) {
            Ok(context) => context,
            Err(e) => {
                warn!("No context for {:?} mark: {}", origin, e);
                return false;
            }
        };
        let transcript_segment_ref = self
            .extractor
            .transcript_segment_ref(&self.doc, &self.location, node);

        let request = MarkRequest {
            word: word.to_string(),
            entry_uuid: entry.map(|e| e.uuid.clone()),
            url: context.url,
            title: context.title,
            paragraph_text: context.paragraph_text,
            url_hash: context.url_hash,
            paragraph_hash: context.paragraph_hash,
            transcript_segment_ref,
        };
        let task = self.sync.begin_mark(request, origin);
        self.tasks.push_back(task);
        true
    }

    // --- Sync results ---

    /// Commit a finished [`SyncTask`] and react to it
    pub fn on_sync_outcome(&mut self, outcome: SyncOutcome, now: Instant) {
        if self.status == EngineStatus::Disabled {
            return;
        }
        match self.sync.apply(outcome) {
            Committed::Session(session) if session.authenticated => {
                self.authenticated(session.settings.unwrap_or_default());
                self.tasks.push_back(self.sync.begin_fetch_all());
            }
            Committed::Session(_) => self.unauthenticated(),

            Committed::Refreshed => self.request_highlight(now),

            Committed::Marked { origin, entry } => {
                self.mark_settled(origin, Some(&entry));
                self.request_highlight(now);
            }
            Committed::NeedsRefresh { origin, entry } => {
                self.mark_settled(origin, Some(&entry));
                self.tasks.push_back(self.sync.begin_fetch_all());
            }

            Committed::Deleted { uuid } => {
                let word = self
                    .index
                    .forms()
                    .iter()
                    .find_map(|f| self.index.find_entry(f).filter(|e| e.uuid == uuid))
                    .map(|e| e.word.clone())
                    .unwrap_or(uuid);
                self.notices.push_back(Notice::EntryRemoved { word });
                self.request_highlight(now);
            }

            Committed::Imported(summary) => {
                self.notices.push_back(Notice::ImportFinished(summary));
                self.tasks.push_back(self.sync.begin_fetch_all());
            }

            Committed::Failed {
                op,
                origin,
                error,
                reset,
            } => {
                if let Some(origin) = origin {
                    self.mark_settled(origin, None);
                }
                if error.is_unauthorized() {
                    self.unauthenticated();
                    if origin.map(MarkOrigin::is_user_confirmed).unwrap_or(false) {
                        self.notices.push_back(Notice::Alert(error.user_message()));
                    }
                    return;
                }
                if op == SyncOp::Session {
                    self.offline();
                    return;
                }
                let user_initiated = origin.map(MarkOrigin::is_user_confirmed).unwrap_or(false)
                    || matches!(op, SyncOp::Delete | SyncOp::Import);
                if user_initiated {
                    self.notices.push_back(Notice::Alert(error.user_message()));
                }
                if reset {
                    self.clear_highlights();
                }
            }
        }
    }

    fn mark_settled(&mut self, origin: MarkOrigin, entry: Option<&Entry>) {
        match origin {
            MarkOrigin::Confirmed => self.doc.clear_selection(),
            MarkOrigin::HighlightClick => {
                if let Some(entry) = entry {
                    let link = format!(
                        "{}{}",
                        self.settings.dict_base_url,
                        utf8_percent_encode(&entry.word, URI_ESCAPE)
                    );
                    self.notices.push_back(Notice::OpenDictionary(link));
                }
            }
            MarkOrigin::KnownSelection => {}
        }
    }

    fn authenticated(&mut self, settings: UserSettings) {
        let settings = settings.with_defaults();
        info!("Session valid, highlight colour {}", settings.highlight_color);

        self.classifier.set_limits(SelectionLimits::from(&settings));
        self.extractor
            .set_allow_fragment_prefixes(settings.allow_fragment_prefixes());

        let permit = self.guard.suppress(&mut self.doc);
        chrome::install_styles(&mut self.doc, &settings.highlight_color);
        chrome::hide_login_prompt(&mut self.doc);
        self.guard.release(&mut self.doc, permit);

        self.settings = settings;
        self.status = EngineStatus::Active;
    }

    fn unauthenticated(&mut self) {
        warn!("Not authenticated, clearing highlights");
        self.status = EngineStatus::Unauthenticated;
        self.sync.reset();
        self.highlight_debounce.cancel();
        self.dismiss_dialog(DismissReason::Superseded);
        self.clear_highlights();

        let permit = self.guard.suppress(&mut self.doc);
        chrome::show_login_prompt(&mut self.doc, self.config.backend_base());
        self.guard.release(&mut self.doc, permit);
        self.notices.push_back(Notice::LoginRequired);
    }

    fn offline(&mut self) {
        warn!("Session check failed, highlighting paused");
        self.status = EngineStatus::Offline;
        self.sync.reset();
        self.highlight_debounce.cancel();
        self.dismiss_dialog(DismissReason::Superseded);
        self.clear_highlights();
    }

    // --- Highlighting ---

    fn request_highlight(&mut self, now: Instant) {
        self.highlight_debounce.schedule(now);
    }

    fn refresh_index(&mut self) {
        let revision = self.sync.revision();
        if self.indexed_revision == Some(revision) {
            return;
        }
        self.index = match WordFormIndex::build(self.sync.entries()) {
            Ok(index) => index,
            Err(e) => {
                error!("Failed to build highlight pattern: {}", e);
                WordFormIndex::empty()
            }
        };
        self.indexed_revision = Some(revision);
    }

    /// One unmark-then-rematch pass with the observer disconnected
    fn run_highlight_pass(&mut self) {
        if self.status != EngineStatus::Active {
            return;
        }
        if !self.renderer.try_begin() {
            return;
        }
        self.refresh_index();

        let permit = self.guard.suppress(&mut self.doc);
        self.renderer.unmark(&mut self.doc);
        if let Some(pattern) = self.index.pattern() {
            self.renderer.mark(&mut self.doc, pattern);
        }
        self.guard.release(&mut self.doc, permit);

        self.renderer.finish();
    }

    /// Remove all highlights now, without waiting for the debounce
    fn clear_highlights(&mut self) {
        self.refresh_index();
        if !self.renderer.try_begin() {
            return;
        }
        let permit = self.guard.suppress(&mut self.doc);
        self.renderer.unmark(&mut self.doc);
        self.guard.release(&mut self.doc, permit);
        self.renderer.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Selection;
    use crate::sync::remote::MockRemoteStore;
    use crate::sync::SyncRequest;
    use crate::types::{SessionInfo, UserDataBundle};
    use std::time::Duration;

    fn page() -> (Document, NodeId) {
        let mut doc = Document::new();
        doc.set_title("Story");
        let body = doc.body();
        let p = doc.append_element(body, "p", &[]);
        let text = doc.append_text(p, "He ran fast and took the errand.");
        (doc, text)
    }

    fn run_entry() -> Entry {
        Entry {
            uuid: "u-run".to_string(),
            word: "run".to_string(),
            forms_pipe_separated: Some("run|running|ran".to_string()),
            created_at: None,
            updated_at: None,
        }
    }

    fn engine(doc: Document) -> Engine {
        Engine::new(
            EngineConfig::default(),
            doc,
            PageLocation::parse("https://example.com/story").unwrap(),
            Arc::new(MockRemoteStore::new()),
        )
    }

    /// Start, authenticate and load `entries`, then run the first pass
    fn active(doc: Document, entries: Vec<Entry>, now: Instant) -> Engine {
        let mut engine = engine(doc);
        engine.start(now);
        assert_eq!(engine.take_tasks()[0].request(), &SyncRequest::Session);

        engine.on_sync_outcome(
            SyncOutcome::Session(Ok(SessionInfo {
                authenticated: true,
                ..Default::default()
            })),
            now,
        );
        assert_eq!(engine.take_tasks()[0].request(), &SyncRequest::FetchAll);

        engine.on_sync_outcome(
            SyncOutcome::Fetched(Ok(UserDataBundle {
                entries,
                ..Default::default()
            })),
            now,
        );
        engine.on_timer(now + Duration::from_millis(300));
        engine
    }

    fn highlight_texts(engine: &Engine) -> Vec<String> {
        HighlightRenderer::highlights(engine.document())
            .into_iter()
            .map(|h| engine.document().text_content(h))
            .collect()
    }

    #[test]
    fn test_start_disabled_on_huge_page() {
        let mut doc = Document::new();
        let body = doc.body();
        doc.append_text(body, "word ");
        let mut engine = Engine::new(
            EngineConfig {
                page_size_limit: 3,
                ..Default::default()
            },
            doc,
            PageLocation::parse("https://example.com/").unwrap(),
            Arc::new(MockRemoteStore::new()),
        );
        engine.start(Instant::now());
        assert_eq!(engine.status(), EngineStatus::Disabled);
        assert!(engine.take_tasks().is_empty());
    }

    #[test]
    fn test_fetch_then_debounced_highlight() {
        let now = Instant::now();
        let (doc, _) = page();
        let engine = active(doc, vec![run_entry()], now);

        assert_eq!(engine.status(), EngineStatus::Active);
        assert_eq!(highlight_texts(&engine), vec!["ran"]);
        assert!(engine.document().element_by_id(chrome::STYLE_ELEMENT_ID).is_some());
        assert!(engine.document().is_observed());
    }

    #[test]
    fn test_highlight_pass_does_not_retrigger() {
        let now = Instant::now();
        let (doc, _) = page();
        let mut engine = active(doc, vec![run_entry()], now);

        engine.on_mutations(now + Duration::from_millis(400));
        assert!(engine.next_deadline().is_none());
        assert_eq!(engine.highlight_passes(), 1);
    }

    #[test]
    fn test_page_mutation_schedules_one_pass() {
        let now = Instant::now();
        let (doc, _) = page();
        let mut engine = active(doc, vec![run_entry()], now);

        for i in 0..3 {
            let body = engine.document().body();
            let p = engine.document_mut().append_element(body, "p", &[]);
            engine.document_mut().append_text(p, "They ran home.");
            engine.on_mutations(now + Duration::from_millis(400 + i * 100));
        }
        let deadline = engine.next_deadline().unwrap();
        assert_eq!(deadline, now + Duration::from_millis(900));

        engine.on_timer(deadline);
        assert_eq!(engine.highlight_passes(), 2);
        assert_eq!(highlight_texts(&engine).len(), 4);
    }

    #[test]
    fn test_unknown_selection_opens_dialog_and_confirm_marks() {
        let now = Instant::now();
        let (doc, text) = page();
        let mut engine = active(doc, vec![run_entry()], now);
        let text = engine
            .document()
            .descendants(engine.document().body())
            .into_iter()
            .find(|n| engine.document().text(*n).map(|t| t.contains("took")).unwrap_or(false))
            .unwrap_or(text);

        let selection = Selection::of_text(engine.document(), text, "the").unwrap();
        engine.document_mut().set_selection(selection);
        engine.on_pointer_up(now);

        let pending = engine.dialog().pending().cloned().unwrap();
        assert_eq!(pending.caption, "the");
        assert!(engine.take_tasks().is_empty());

        engine.on_click(pending.dialog, now + Duration::from_millis(100));
        let tasks = engine.take_tasks();
        assert_eq!(tasks.len(), 1);
        match tasks[0].request() {
            SyncRequest::Mark { request, origin } => {
                assert_eq!(*origin, MarkOrigin::Confirmed);
                assert_eq!(request.word, "the");
                assert_eq!(request.entry_uuid, None);
                assert_eq!(request.paragraph_text, "He ran fast and took the errand.");
                assert_eq!(request.url, "https://example.com/story");
            }
            other => panic!("expected mark, got {:?}", other),
        }
    }

    #[test]
    fn test_dialog_timeout_never_marks() {
        let now = Instant::now();
        let (doc, _) = page();
        let mut engine = active(doc, vec![run_entry()], now);
        let text = engine
            .document()
            .descendants(engine.document().body())
            .into_iter()
            .find(|n| engine.document().text(*n).map(|t| t.contains("took")).unwrap_or(false))
            .unwrap();

        let selection = Selection::of_text(engine.document(), text, "took").unwrap();
        engine.document_mut().set_selection(selection);
        engine.on_pointer_up(now);
        assert!(engine.dialog().is_awaiting());

        engine.on_timer(now + Duration::from_millis(5000));
        assert!(!engine.dialog().is_awaiting());
        assert!(engine.take_tasks().is_empty());
        assert!(engine.document().selection().is_some());
    }

    #[test]
    fn test_known_selection_is_silent() {
        let now = Instant::now();
        let mut doc = Document::new();
        let body = doc.body();
        let p = doc.append_element(body, "p", &[]);
        let text = doc.append_text(p, "Running late.");
        let mut engine = active(doc, vec![run_entry()], now);
        let highlight = HighlightRenderer::highlights(engine.document())[0];
        assert_eq!(engine.document().text_content(highlight), "Running");

        // Select the unhighlighted remainder first: unknown
        let rest = engine.document().next_sibling(highlight).unwrap();
        let late = Selection::of_text(engine.document(), rest, "late").unwrap();
        engine.document_mut().set_selection(late);
        engine.on_pointer_up(now);
        assert!(engine.dialog().is_awaiting());

        // Known form selected outside a highlight closes the dialog silently
        let other = engine.document_mut().append_element(body, "div", &[]);
        let known = engine.document_mut().append_text(other, "ran");
        engine.document_mut().set_selection(Selection::within(known, 0, 3));
        engine.on_pointer_up(now + Duration::from_millis(10));

        assert!(!engine.dialog().is_awaiting());
        let tasks = engine.take_tasks();
        assert_eq!(tasks.len(), 1);
        assert!(matches!(
            tasks[0].request(),
            SyncRequest::Mark { origin: MarkOrigin::KnownSelection, request } if request.entry_uuid.as_deref() == Some("u-run")
        ));
    }

    #[test]
    fn test_highlight_click_marks_and_opens_dictionary() {
        let now = Instant::now();
        let (doc, _) = page();
        let mut engine = active(doc, vec![run_entry()], now);
        let highlight = HighlightRenderer::highlights(engine.document())[0];

        engine.on_click(highlight, now);
        let mut tasks = engine.take_tasks();
        assert_eq!(tasks.len(), 1);
        let request = match tasks.remove(0).request().clone() {
            SyncRequest::Mark { request, origin } => {
                assert_eq!(origin, MarkOrigin::HighlightClick);
                request
            }
            other => panic!("expected mark, got {:?}", other),
        };

        engine.on_sync_outcome(
            SyncOutcome::Marked {
                request,
                origin: MarkOrigin::HighlightClick,
                result: Ok(run_entry()),
            },
            now,
        );
        assert_eq!(
            engine.take_notices(),
            vec![Notice::OpenDictionary(
                "https://slovniky.lingea.sk/anglicko-slovensky/run".to_string()
            )]
        );
    }

    #[test]
    fn test_unauthorized_clears_highlights_and_prompts_login() {
        let now = Instant::now();
        let (doc, _) = page();
        let mut engine = active(doc, vec![run_entry()], now);
        assert_eq!(highlight_texts(&engine).len(), 1);

        engine.on_sync_outcome(
            SyncOutcome::Fetched(Err(LingoError::Unauthorized { status: 401 })),
            now,
        );
        assert_eq!(engine.status(), EngineStatus::Unauthenticated);
        assert!(highlight_texts(&engine).is_empty());
        assert!(engine.document().element_by_id(chrome::LOGIN_PROMPT_ID).is_some());
        assert_eq!(engine.take_notices(), vec![Notice::LoginRequired]);
    }

    #[test]
    fn test_session_network_failure_clears_highlights() {
        let now = Instant::now();
        let (doc, _) = page();
        let mut engine = active(doc, vec![run_entry()], now);
        assert_eq!(highlight_texts(&engine).len(), 1);

        engine.on_visibility_regained(now);
        assert_eq!(engine.take_tasks()[0].request(), &SyncRequest::Session);
        engine.on_sync_outcome(
            SyncOutcome::Session(Err(LingoError::NetworkOrTimeout("Request timed out".to_string()))),
            now,
        );

        assert_eq!(engine.status(), EngineStatus::Offline);
        assert!(highlight_texts(&engine).is_empty());
        assert!(engine.sync().entries().is_empty());
        assert!(engine.take_notices().is_empty());
        assert!(engine.document().element_by_id(chrome::LOGIN_PROMPT_ID).is_none());

        // A later check recovers
        engine.on_visibility_regained(now);
        assert_eq!(engine.take_tasks()[0].request(), &SyncRequest::Session);
    }

    #[test]
    fn test_session_failure_at_start_goes_offline() {
        let now = Instant::now();
        let (doc, _) = page();
        let mut engine = engine(doc);
        engine.start(now);
        engine.take_tasks();

        engine.on_sync_outcome(
            SyncOutcome::Session(Err(LingoError::RequestFailed {
                status: 503,
                message: None,
            })),
            now,
        );
        assert_eq!(engine.status(), EngineStatus::Offline);
        assert!(engine.take_tasks().is_empty());
    }

    #[test]
    fn test_confirmed_mark_failure_alerts() {
        let now = Instant::now();
        let (doc, text) = page();
        let mut engine = active(doc, vec![], now);
        engine.document_mut().set_selection(Selection::within(text, 0, 2));

        engine.on_sync_outcome(
            SyncOutcome::Marked {
                request: MarkRequest {
                    word: "he".to_string(),
                    entry_uuid: None,
                    url: String::new(),
                    title: None,
                    paragraph_text: String::new(),
                    url_hash: String::new(),
                    paragraph_hash: String::new(),
                    transcript_segment_ref: None,
                },
                origin: MarkOrigin::Confirmed,
                result: Err(LingoError::RequestFailed {
                    status: 412,
                    message: Some("Gemini API key not configured in settings.".to_string()),
                }),
            },
            now,
        );
        let notices = engine.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(matches!(&notices[0], Notice::Alert(m) if m.contains("API key")));
        assert!(engine.document().selection().is_none());
    }

    #[test]
    fn test_remove_unknown_word_alerts() {
        let now = Instant::now();
        let (doc, _) = page();
        let mut engine = active(doc, vec![run_entry()], now);

        assert!(!engine.remove_entry_for_word("walk"));
        assert!(engine.remove_entry_for_word("Ran"));
        assert!(matches!(
            engine.take_tasks()[0].request(),
            SyncRequest::Delete { uuid } if uuid == "u-run"
        ));
        assert_eq!(engine.take_notices().len(), 1);
    }
}
