//! Async driver for an [`Engine`]
//!
//! One tokio task owns the engine. Host events arrive over a bounded mpsc
//! channel; queued [`SyncTask`](crate::sync::SyncTask)s are spawned and
//! their outcomes posted back over an internal channel; timers are awaited
//! with `sleep_until`. Notices flow back to the host over a second channel.

use crate::dom::{Document, NodeId, Selection};
use crate::engine::{Engine, Notice};
use crate::error::{LingoError, Result};
use crate::sync::SyncOutcome;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Capacity of the host event channel
const EVENT_BUFFER: usize = 64;

type PageEdit = Box<dyn FnOnce(&mut Document) + Send>;
type Query = Box<dyn FnOnce(&Engine) + Send>;

/// Events a host forwards from the page
pub enum EngineEvent {
    PointerUp,
    SelectionChange,
    Click(NodeId),
    VisibilityRegained,

    /// Replace the selection, then report a selection change
    Select(Selection),

    /// Edit the page, then classify the recorded mutations
    Edit(PageEdit),

    Reload,
    RemoveWord(String),
    Import(serde_json::Value),

    /// Read engine state from the driver task
    Query(Query),

    Shutdown,
}

impl std::fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::PointerUp => write!(f, "PointerUp"),
            EngineEvent::SelectionChange => write!(f, "SelectionChange"),
            EngineEvent::Click(node) => write!(f, "Click({})", node.index()),
            EngineEvent::VisibilityRegained => write!(f, "VisibilityRegained"),
            EngineEvent::Select(_) => write!(f, "Select"),
            EngineEvent::Edit(_) => write!(f, "Edit"),
            EngineEvent::Reload => write!(f, "Reload"),
            EngineEvent::RemoveWord(word) => write!(f, "RemoveWord({})", word),
            EngineEvent::Import(_) => write!(f, "Import"),
            EngineEvent::Query(_) => write!(f, "Query"),
            EngineEvent::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Host side of a running engine
#[derive(Debug)]
pub struct EngineHandle {
    events: mpsc::Sender<EngineEvent>,
    notices: mpsc::UnboundedReceiver<Notice>,
    task: JoinHandle<Engine>,
}

impl EngineHandle {
    pub async fn send(&self, event: EngineEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| LingoError::InvalidOperation("Engine has stopped".to_string()))
    }

    /// Run `f` against the engine and return its result
    pub async fn query<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Engine) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(EngineEvent::Query(Box::new(move |engine| {
            let _ = tx.send(f(engine));
        })))
        .await?;
        rx.await
            .map_err(|_| LingoError::InvalidOperation("Engine dropped query".to_string()))
    }

    /// Next notice, `None` once the engine has stopped
    pub async fn next_notice(&mut self) -> Option<Notice> {
        self.notices.recv().await
    }

    /// Notices already delivered
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }

    /// Stop the driver and take the engine back
    pub async fn shutdown(self) -> Result<Engine> {
        let _ = self.events.send(EngineEvent::Shutdown).await;
        self.task
            .await
            .map_err(|e| LingoError::InvalidOperation(format!("Engine task failed: {}", e)))
    }
}

/// Current instant on the tokio clock (pausable in tests)
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Start `engine` on a new tokio task
pub fn spawn(engine: Engine) -> EngineHandle {
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (notices_tx, notices_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(engine, events_rx, notices_tx));
    EngineHandle {
        events: events_tx,
        notices: notices_rx,
        task,
    }
}

async fn run(
    mut engine: Engine,
    mut events: mpsc::Receiver<EngineEvent>,
    notices: mpsc::UnboundedSender<Notice>,
) -> Engine {
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<SyncOutcome>();
    engine.start(now());
    info!("Engine driver started");

    loop {
        dispatch(&mut engine, &outcome_tx, &notices);
        let deadline = engine.next_deadline();

        tokio::select! {
            event = events.recv() => match event {
                None | Some(EngineEvent::Shutdown) => break,
                Some(event) => handle(&mut engine, event),
            },
            Some(outcome) = outcome_rx.recv() => engine.on_sync_outcome(outcome, now()),
            _ = wait_until(deadline) => engine.on_timer(now()),
        }
    }

    dispatch_notices(&mut engine, &notices);
    info!("Engine driver stopped");
    engine
}

fn handle(engine: &mut Engine, event: EngineEvent) {
    debug!("Event: {:?}", event);
    let now = now();
    match event {
        EngineEvent::PointerUp => engine.on_pointer_up(now),
        EngineEvent::SelectionChange => engine.on_selection_change(now),
        EngineEvent::Click(target) => engine.on_click(target, now),
        EngineEvent::VisibilityRegained => engine.on_visibility_regained(now),
        EngineEvent::Select(selection) => {
            engine.document_mut().set_selection(selection);
            engine.on_selection_change(now);
        }
        EngineEvent::Edit(edit) => {
            edit(engine.document_mut());
            engine.on_mutations(now);
        }
        EngineEvent::Reload => engine.reload(now),
        EngineEvent::RemoveWord(word) => {
            engine.remove_entry_for_word(&word);
        }
        EngineEvent::Import(bundle) => engine.import(bundle),
        EngineEvent::Query(query) => query(engine),
        EngineEvent::Shutdown => {}
    }
}

/// Spawn queued remote work and forward notices
fn dispatch(
    engine: &mut Engine,
    outcomes: &mpsc::UnboundedSender<SyncOutcome>,
    notices: &mpsc::UnboundedSender<Notice>,
) {
    for task in engine.take_tasks() {
        debug!("Spawning {:?}", task.request().op());
        let outcomes = outcomes.clone();
        tokio::spawn(async move {
            let _ = outcomes.send(task.run().await);
        });
    }
    dispatch_notices(engine, notices);
}

fn dispatch_notices(engine: &mut Engine, notices: &mpsc::UnboundedSender<Notice>) {
    for notice in engine.take_notices() {
        let _ = notices.send(notice);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
