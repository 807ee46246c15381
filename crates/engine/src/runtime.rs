// Async driver for a `DocumentSession`.
//
// One task per session owns the session core, its edit channel subscription
// and every in-flight network call. It wakes on commands from the
// `SessionHandle`, inbound channel messages, finished network calls and the
// session's next timer deadline. Network calls run concurrently in a
// `JoinSet`, so new edits keep flowing while a save is in flight.

use std::sync::Arc;

use folio_common::types::{Document, EditMessage, EditableState, Page, UserId, Version, VersionSummary};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::autosave::SaveStatus;
use crate::backend::{
    AccessPolicy, DocumentBackend, FetchOptions, MemoryBackend, PropertySource, VersionBackend,
};
use crate::channel::{EditChannel, EditTransport};
use crate::clock::MonotonicClock;
use crate::error::{BackendError, SessionError};
use crate::history::{RestoreConfirmation, VersionHistoryStore};
use crate::session::{
    DocumentSession, Effect, LocalEdit, PendingSave, PendingSnapshot, SessionSettings, SessionView,
};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 128;

/// Everything a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentBackend>,
    pub versions: Arc<dyn VersionBackend>,
    pub properties: Arc<dyn PropertySource>,
    pub access: Arc<dyn AccessPolicy>,
    pub transport: Arc<dyn EditTransport>,
}

impl Collaborators {
    /// All persistence collaborators backed by one in-memory store.
    pub fn in_memory(backend: &MemoryBackend, transport: Arc<dyn EditTransport>) -> Self {
        Self {
            documents: Arc::new(backend.clone()),
            versions: Arc::new(backend.clone()),
            properties: Arc::new(backend.clone()),
            access: Arc::new(backend.clone()),
            transport,
        }
    }
}

/// Notifications for observers of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened { document_id: Uuid, state: EditableState },
    StatusChanged { document_id: Uuid, status: SaveStatus },
    RemoteEdit { document_id: Uuid, sender_id: UserId, content: String },
    SnapshotCreated { document_id: Uuid, version_id: Uuid },
    SnapshotFailed { document_id: Uuid, error: String },
    Restored { document_id: Uuid, state: EditableState },
    Closed { document_id: Uuid },
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    Open { document_id: Uuid, reply: Reply<EditableState> },
    Edit { edit: LocalEdit, reply: Reply<()> },
    SaveNow { reply: Reply<SaveStatus> },
    SnapshotNow { reply: Reply<Uuid> },
    ListVersions { page: u32, size: u32, reply: Reply<Page<VersionSummary>> },
    GetVersion { version_id: Uuid, reply: Reply<Version> },
    Restore { version_id: Uuid, confirmation: RestoreConfirmation, reply: Reply<EditableState> },
    SetForeground { foreground: bool, reply: Reply<()> },
    Close { reply: Reply<()> },
}

/// A network call that has resolved.
enum Finished {
    Save { save: PendingSave, result: Result<Document, BackendError>, reply: Option<Reply<SaveStatus>> },
    Snapshot { snapshot: PendingSnapshot, result: Result<Uuid, BackendError>, reply: Option<Reply<Uuid>> },
    Restore {
        document_id: Uuid,
        result: Result<Document, SessionError>,
        reply: Reply<EditableState>,
    },
}

// ── Handle ─────────────────────────────────────────────────────────

/// Client side of a running session.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
    events: broadcast::Sender<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).await.map_err(|_| SessionError::RuntimeStopped)?;
        response.await.map_err(|_| SessionError::RuntimeStopped)?
    }

    /// Open a document, flushing whatever was open before.
    pub async fn open(&self, document_id: Uuid) -> Result<EditableState, SessionError> {
        self.request(|reply| Command::Open { document_id, reply }).await
    }

    pub async fn switch_document(&self, document_id: Uuid) -> Result<EditableState, SessionError> {
        self.open(document_id).await
    }

    pub async fn edit_content(&self, content: impl Into<String>) -> Result<(), SessionError> {
        let edit = LocalEdit::Content(content.into());
        self.request(|reply| Command::Edit { edit, reply }).await
    }

    pub async fn edit_title(&self, title: impl Into<String>) -> Result<(), SessionError> {
        let edit = LocalEdit::Title(title.into());
        self.request(|reply| Command::Edit { edit, reply }).await
    }

    /// Save now and wait for the outcome.
    pub async fn save_now(&self) -> Result<SaveStatus, SessionError> {
        self.request(|reply| Command::SaveNow { reply }).await
    }

    pub async fn snapshot_now(&self) -> Result<Uuid, SessionError> {
        self.request(|reply| Command::SnapshotNow { reply }).await
    }

    /// Versions of the open document, newest first.
    pub async fn list_versions(
        &self,
        page: u32,
        size: u32,
    ) -> Result<Page<VersionSummary>, SessionError> {
        self.request(|reply| Command::ListVersions { page, size, reply }).await
    }

    pub async fn get_version(&self, version_id: Uuid) -> Result<Version, SessionError> {
        self.request(|reply| Command::GetVersion { version_id, reply }).await
    }

    /// Restore a version over the open document. Unsaved edits are lost.
    pub async fn restore(
        &self,
        version_id: Uuid,
        confirmation: RestoreConfirmation,
    ) -> Result<EditableState, SessionError> {
        self.request(|reply| Command::Restore { version_id, confirmation, reply }).await
    }

    pub async fn set_foreground(&self, foreground: bool) -> Result<(), SessionError> {
        self.request(|reply| Command::SetForeground { foreground, reply }).await
    }

    /// Flush and close the open document. The runtime stays up.
    pub async fn close(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Close { reply }).await
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Stop the runtime: flush, close, and wait for in-flight calls.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(error) = task.await {
            warn!(error = %error, "session runtime panicked");
        }
    }
}

// ── Runtime ────────────────────────────────────────────────────────

pub struct SessionRuntime {
    core: DocumentSession,
    clock: MonotonicClock,
    documents: Arc<dyn DocumentBackend>,
    versions: Arc<dyn VersionBackend>,
    history: VersionHistoryStore,
    channel: EditChannel,
    commands: mpsc::Receiver<Command>,
    inbound: mpsc::UnboundedReceiver<EditMessage>,
    in_flight: JoinSet<Finished>,
    view: watch::Sender<SessionView>,
    events: broadcast::Sender<SessionEvent>,
    last_status: Option<(Uuid, SaveStatus)>,
}

impl SessionRuntime {
    /// Start a session task on the current tokio runtime.
    pub fn spawn(settings: SessionSettings, collaborators: Collaborators) -> SessionHandle {
        let clock = MonotonicClock::new();
        let core = DocumentSession::new(
            settings,
            Arc::new(clock.clone()),
            Arc::clone(&collaborators.access),
            Arc::clone(&collaborators.properties),
        );

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let channel = EditChannel::new(Arc::clone(&collaborators.transport));
        channel.on_message(move |message| {
            let _ = inbound_tx.send(message);
        });

        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (view_tx, view) = watch::channel(SessionView::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let runtime = Self {
            core,
            clock,
            history: VersionHistoryStore::new(
                Arc::clone(&collaborators.versions),
                Arc::clone(&collaborators.documents),
            ),
            documents: collaborators.documents,
            versions: collaborators.versions,
            channel,
            commands,
            inbound,
            in_flight: JoinSet::new(),
            view: view_tx,
            events: events.clone(),
            last_status: None,
        };
        let task = tokio::spawn(runtime.run());
        SessionHandle { commands: command_tx, view, events, task }
    }

    async fn run(mut self) {
        loop {
            let deadline = self.core.next_deadline().map(|at| self.clock.instant_at(at));
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                Some(message) = self.inbound.recv() => self.on_remote(message),
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.on_finished(joined);
                }
                _ = wait_until(deadline) => {}
            }
            let effects = self.core.tick();
            self.perform(effects).await;
            self.publish_view();
        }

        self.close_document().await;
        while let Some(joined) = self.in_flight.join_next().await {
            self.on_finished(joined);
        }
        self.publish_view();
        debug!("session runtime stopped");
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn publish_view(&mut self) {
        let view = self.core.view();
        let status = view.document_id.zip(view.status);
        if status != self.last_status {
            if let Some((document_id, status)) = status {
                self.emit(SessionEvent::StatusChanged { document_id, status });
            }
            self.last_status = status;
        }
        self.view.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }

    // ── Commands ───────────────────────────────────────────────────

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Open { document_id, reply } => {
                let _ = reply.send(self.open_document(document_id).await);
            }
            Command::Edit { edit, reply } => {
                let result = self.core.local_edit(edit);
                let result = match result {
                    Ok(effects) => {
                        self.perform(effects).await;
                        Ok(())
                    }
                    Err(error) => Err(error),
                };
                let _ = reply.send(result);
            }
            Command::SaveNow { reply } => match self.core.save_now() {
                Ok(Some(save)) => self.spawn_save(save, Some(reply)),
                Ok(None) => {
                    let status = self.core.status().ok_or(SessionError::NoDocumentOpen);
                    let _ = reply.send(status);
                }
                Err(error) => {
                    let _ = reply.send(Err(error));
                }
            },
            Command::SnapshotNow { reply } => match self.core.snapshot_now() {
                Ok(snapshot) => self.spawn_snapshot(snapshot, Some(reply)),
                Err(error) => {
                    let _ = reply.send(Err(error));
                }
            },
            Command::ListVersions { page, size, reply } => {
                let Some(document_id) = self.core.document_id() else {
                    let _ = reply.send(Err(SessionError::NoDocumentOpen));
                    return;
                };
                let history = self.history.clone();
                tokio::spawn(async move {
                    let _ = reply.send(history.list(document_id, page, size).await);
                });
            }
            Command::GetVersion { version_id, reply } => {
                let history = self.history.clone();
                tokio::spawn(async move {
                    let _ = reply.send(history.get(version_id).await);
                });
            }
            Command::Restore { version_id, confirmation, reply } => {
                let document_id = match self.core.prepare_restore(confirmation) {
                    Ok(document_id) => document_id,
                    Err(error) => {
                        let _ = reply.send(Err(error));
                        return;
                    }
                };
                let history = self.history.clone();
                self.in_flight.spawn(async move {
                    let result = history.restore(version_id, confirmation).await;
                    Finished::Restore { document_id, result, reply }
                });
            }
            Command::SetForeground { foreground, reply } => {
                self.core.set_foreground(foreground);
                let _ = reply.send(Ok(()));
            }
            Command::Close { reply } => {
                self.close_document().await;
                let _ = reply.send(Ok(()));
            }
        }
    }

    async fn open_document(&mut self, document_id: Uuid) -> Result<EditableState, SessionError> {
        if self.core.document_id() == Some(document_id) {
            return self.core.state().cloned().ok_or(SessionError::NoDocumentOpen);
        }
        // The previous document is saved before the next one is loaded.
        self.flush_inline().await;

        let document = self.documents.fetch_document(document_id, FetchOptions::load()).await?;
        let state = document.editable_state();
        let effects = self.core.open(document);
        self.perform(effects).await;
        self.emit(SessionEvent::Opened { document_id, state: state.clone() });
        Ok(state)
    }

    async fn close_document(&mut self) {
        let Some(document_id) = self.core.document_id() else {
            return;
        };
        self.flush_inline().await;
        let effects = self.core.dispose();
        self.perform(effects).await;
        self.emit(SessionEvent::Closed { document_id });
    }

    /// Best-effort save of unsaved edits, awaited in place.
    async fn flush_inline(&mut self) {
        for effect in self.core.flush() {
            if let Effect::Save(save) = effect {
                let result = self.documents.update_document(save.ticket.document_id, &save.patch).await;
                self.core.complete_save(save.ticket, &result);
            }
        }
        self.publish_view();
    }

    fn on_remote(&mut self, message: EditMessage) {
        let document_id = message.document_id;
        let sender_id = message.sender_id;
        let content = message.content.clone();
        if self.core.apply_remote(message) {
            self.emit(SessionEvent::RemoteEdit { document_id, sender_id, content });
        }
    }

    // ── Effects ────────────────────────────────────────────────────

    async fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Save(save) => self.spawn_save(save, None),
                Effect::Snapshot(snapshot) => self.spawn_snapshot(snapshot, None),
                Effect::Broadcast(message) => {
                    if let Err(error) = self.channel.send(&message).await {
                        warn!(document_id = %message.document_id, error = %error, "edit broadcast failed");
                    }
                }
                Effect::Connect(document_id) => {
                    if let Err(error) = self.channel.connect(document_id).await {
                        warn!(%document_id, error = %error, "edit channel connect failed");
                    }
                }
                Effect::Disconnect => self.channel.disconnect().await,
            }
        }
    }

    fn spawn_save(&mut self, save: PendingSave, reply: Option<Reply<SaveStatus>>) {
        let documents = Arc::clone(&self.documents);
        self.in_flight.spawn(async move {
            let result = documents.update_document(save.ticket.document_id, &save.patch).await;
            Finished::Save { save, result, reply }
        });
    }

    fn spawn_snapshot(&mut self, snapshot: PendingSnapshot, reply: Option<Reply<Uuid>>) {
        let versions = Arc::clone(&self.versions);
        self.in_flight.spawn(async move {
            let result = versions.create_version(snapshot.document_id, &snapshot.request).await;
            Finished::Snapshot { snapshot, result, reply }
        });
    }

    fn on_finished(&mut self, joined: Result<Finished, JoinError>) {
        let finished = match joined {
            Ok(finished) => finished,
            Err(error) => {
                warn!(error = %error, "in-flight call did not complete");
                return;
            }
        };
        match finished {
            Finished::Save { save, result, reply } => {
                self.core.complete_save(save.ticket, &result);
                if let Some(reply) = reply {
                    let outcome = match result {
                        Ok(_) => self.core.status().ok_or(SessionError::NoDocumentOpen),
                        Err(error) => Err(SessionError::Backend(error)),
                    };
                    let _ = reply.send(outcome);
                }
            }
            Finished::Snapshot { snapshot, result, reply } => {
                self.core.complete_snapshot(&snapshot, &result);
                let document_id = snapshot.document_id;
                match &result {
                    Ok(version_id) => {
                        self.emit(SessionEvent::SnapshotCreated { document_id, version_id: *version_id });
                    }
                    Err(error) => {
                        self.emit(SessionEvent::SnapshotFailed { document_id, error: error.to_string() });
                    }
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result.map_err(SessionError::Backend));
                }
            }
            Finished::Restore { document_id, result, reply } => {
                if let Err(error) = &result {
                    warn!(%document_id, error = %error, "restore failed");
                    self.core.abort_restore(document_id);
                }
                let outcome = result.map(|document| {
                    let document_id = document.id;
                    let state = document.editable_state();
                    if self.core.install_restored(document) {
                        info!(%document_id, "restored document installed");
                        self.emit(SessionEvent::Restored { document_id, state: state.clone() });
                    }
                    state
                });
                let _ = reply.send(outcome);
            }
        }
    }
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
