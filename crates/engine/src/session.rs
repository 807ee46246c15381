// Per-document editing session.
//
// `DocumentSession` owns the editable state of the open document and wires
// the autosave controller, echo filter and snapshot scheduler around it. It
// never awaits: every operation returns the effects (network calls, channel
// traffic) the driver must perform, and completions are fed back in. This
// keeps the whole engine steppable on a virtual clock.

use std::sync::Arc;
use std::time::Duration;

use folio_common::protocol::versions::CreateVersionRequest;
use folio_common::types::{Document, DocumentPatch, EditMessage, EditableState, UserId};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::active_time::ActiveTimeThreshold;
use crate::autosave::{AutosaveController, Completion, SaveDecision, SaveStatus, SaveTicket};
use crate::backend::{AccessPolicy, PropertySource};
use crate::channel::EchoFilter;
use crate::clock::{ActivityClock, ElapsedSource};
use crate::config::EngineConfig;
use crate::error::{BackendError, GuardDenial, SessionError};
use crate::history::RestoreConfirmation;
use crate::snapshot::{self, SnapshotScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Local identity, stamped on outgoing edits and used for echo suppression.
    pub user_id: UserId,
    pub debounce: Duration,
    /// Active time between automatic snapshots.
    pub snapshot_interval: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            user_id: config.user_id,
            debounce: config.debounce(),
            snapshot_interval: config.snapshot_interval(),
        }
    }
}

/// A local mutation of the editable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEdit {
    Title(String),
    Content(String),
}

/// A persistence call the driver must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    pub ticket: SaveTicket,
    pub patch: DocumentPatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub document_id: Uuid,
    pub request: CreateVersionRequest,
    /// Active-time target that triggered it; `None` for manual snapshots.
    pub reached: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Save(PendingSave),
    Snapshot(PendingSnapshot),
    Broadcast(EditMessage),
    /// Subscribe the edit channel to this document, dropping any other.
    Connect(Uuid),
    Disconnect,
}

/// Read-only view of the session for observers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionView {
    pub document_id: Option<Uuid>,
    pub state: Option<EditableState>,
    pub status: Option<SaveStatus>,
}

struct OpenDocument {
    document: Document,
    state: EditableState,
    autosave: AutosaveController,
}

pub struct DocumentSession {
    settings: SessionSettings,
    clock: Arc<dyn ElapsedSource>,
    activity: ActivityClock,
    echo: EchoFilter,
    access: Arc<dyn AccessPolicy>,
    properties: Arc<dyn PropertySource>,
    snapshots: SnapshotScheduler,
    active: Option<OpenDocument>,
}

fn write_guard(
    access: &dyn AccessPolicy,
    document: &Document,
    user: UserId,
) -> Result<(), GuardDenial> {
    if !access.can_write(document, user) {
        return Err(GuardDenial::ReadOnly);
    }
    if access.is_locked(document) {
        return Err(GuardDenial::Locked);
    }
    Ok(())
}

fn pending_save(ticket: SaveTicket, state: &EditableState) -> PendingSave {
    PendingSave { ticket, patch: DocumentPatch::from(state.clone()) }
}

impl DocumentSession {
    pub fn new(
        settings: SessionSettings,
        clock: Arc<dyn ElapsedSource>,
        access: Arc<dyn AccessPolicy>,
        properties: Arc<dyn PropertySource>,
    ) -> Self {
        let activity = ActivityClock::new(Arc::clone(&clock));
        let snapshots = SnapshotScheduler::new(settings.snapshot_interval, activity.elapsed());
        Self {
            echo: EchoFilter::new(settings.user_id),
            settings,
            clock,
            activity,
            access,
            properties,
            snapshots,
            active: None,
        }
    }

    fn now(&self) -> Duration {
        self.clock.elapsed()
    }

    fn current(&self) -> Result<&OpenDocument, SessionError> {
        self.active.as_ref().ok_or(SessionError::NoDocumentOpen)
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn document_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|open| open.document.id)
    }

    pub fn document(&self) -> Option<&Document> {
        self.active.as_ref().map(|open| &open.document)
    }

    pub fn state(&self) -> Option<&EditableState> {
        self.active.as_ref().map(|open| &open.state)
    }

    pub fn status(&self) -> Option<SaveStatus> {
        self.active.as_ref().map(|open| open.autosave.status())
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            document_id: self.document_id(),
            state: self.state().cloned(),
            status: self.status(),
        }
    }

    pub fn threshold(&self) -> ActiveTimeThreshold {
        self.snapshots.threshold(self.activity.elapsed())
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Open `document`. If another document is open it is flushed first, so
    /// the returned effects start with its save.
    pub fn open(&mut self, document: Document) -> Vec<Effect> {
        if self.document_id() == Some(document.id) {
            return Vec::new();
        }
        let mut effects = self.flush();
        let document_id = document.id;
        self.snapshots.reset_for_switch(self.activity.elapsed());
        self.active = Some(OpenDocument {
            state: document.editable_state(),
            autosave: AutosaveController::new(document_id, self.settings.debounce),
            document,
        });
        info!(%document_id, "document opened");
        effects.push(Effect::Connect(document_id));
        effects
    }

    /// Same as `open`; named for call sites that replace a document.
    pub fn switch_document(&mut self, document: Document) -> Vec<Effect> {
        self.open(document)
    }

    /// Flush pending edits and close the document.
    pub fn dispose(&mut self) -> Vec<Effect> {
        let mut effects = self.flush();
        if let Some(open) = self.active.take() {
            info!(document_id = %open.document.id, "document closed");
            effects.push(Effect::Disconnect);
        }
        effects
    }

    /// Foreground state. Active time only accumulates while foregrounded.
    pub fn set_foreground(&mut self, foreground: bool) {
        if foreground {
            self.activity.resume();
        } else {
            self.activity.pause();
        }
    }

    // ── Edits ──────────────────────────────────────────────────────

    pub fn local_edit(&mut self, edit: LocalEdit) -> Result<Vec<Effect>, SessionError> {
        let now = self.now();
        let user_id = self.settings.user_id;
        let open = self.active.as_mut().ok_or(SessionError::NoDocumentOpen)?;
        let mut effects = Vec::new();
        match edit {
            LocalEdit::Title(title) => open.state.title = title,
            LocalEdit::Content(content) => {
                effects.push(Effect::Broadcast(EditMessage::new(
                    open.document.id,
                    user_id,
                    content.clone(),
                )));
                open.state.content = content;
            }
        }
        open.autosave.record_edit(now);
        Ok(effects)
    }

    /// Apply an inbound channel message. Echoes and messages for other
    /// documents are dropped. Returns whether the state changed.
    pub fn apply_remote(&mut self, message: EditMessage) -> bool {
        let Some(message) = self.echo.admit(message) else {
            return false;
        };
        let Some(open) = self.active.as_mut() else {
            return false;
        };
        if message.document_id != open.document.id {
            debug!(document_id = %message.document_id, "dropping edit for another document");
            return false;
        }
        debug!(document_id = %message.document_id, sender_id = message.sender_id, "applying remote edit");
        open.state.content = message.content;
        true
    }

    // ── Timers ─────────────────────────────────────────────────────

    /// Fire whatever is due: the debounce window and the snapshot threshold.
    pub fn tick(&mut self) -> Vec<Effect> {
        let now = self.now();
        let user_id = self.settings.user_id;
        let mut effects = Vec::new();
        let Some(open) = self.active.as_mut() else {
            return effects;
        };

        let access = self.access.as_ref();
        let document = &open.document;
        match open.autosave.poll(now, || write_guard(access, document, user_id)) {
            SaveDecision::Begin(ticket) => effects.push(Effect::Save(pending_save(ticket, &open.state))),
            SaveDecision::Blocked(denial) => {
                warn!(document_id = %open.document.id, reason = %denial, "autosave blocked");
            }
            SaveDecision::Deferred => {
                debug!(document_id = %open.document.id, "autosave deferred behind in-flight save");
            }
            SaveDecision::Idle => {}
        }

        if let Some(reached) = self.snapshots.poll(self.activity.elapsed()) {
            match snapshot::capture(&open.document, &open.state, self.properties.as_ref()) {
                Ok(request) => effects.push(Effect::Snapshot(PendingSnapshot {
                    document_id: open.document.id,
                    request,
                    reached: Some(reached),
                })),
                Err(error) => {
                    warn!(document_id = %open.document.id, error = %error, "snapshot capture failed");
                }
            }
        }
        effects
    }

    /// Earliest instant, on the session clock, at which `tick` has work.
    pub fn next_deadline(&self) -> Option<Duration> {
        let open = self.active.as_ref()?;
        let snapshot = self
            .activity
            .is_active()
            .then(|| self.now() + self.snapshots.remaining(self.activity.elapsed()));
        match (open.autosave.next_deadline(), snapshot) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ── Saves ──────────────────────────────────────────────────────

    /// Issue a save for unsaved edits now, bypassing the debounce window.
    /// A guard denial is logged, not returned.
    pub fn flush(&mut self) -> Vec<Effect> {
        let user_id = self.settings.user_id;
        let Some(open) = self.active.as_mut() else {
            return Vec::new();
        };
        let access = self.access.as_ref();
        let document = &open.document;
        match open.autosave.flush(|| write_guard(access, document, user_id)) {
            Ok(Some(ticket)) => vec![Effect::Save(pending_save(ticket, &open.state))],
            Ok(None) => Vec::new(),
            Err(denial) => {
                warn!(document_id = %open.document.id, reason = %denial, "flush blocked");
                Vec::new()
            }
        }
    }

    /// Explicit user save. `Ok(None)` if there is nothing to save.
    pub fn save_now(&mut self) -> Result<Option<PendingSave>, SessionError> {
        let user_id = self.settings.user_id;
        let open = self.active.as_mut().ok_or(SessionError::NoDocumentOpen)?;
        let access = self.access.as_ref();
        let document = &open.document;
        let ticket = open
            .autosave
            .save_now(|| write_guard(access, document, user_id))
            .map_err(SessionError::WriteBlocked)?;
        Ok(ticket.map(|ticket| pending_save(ticket, &open.state)))
    }

    /// Feed back the outcome of a `PendingSave`. Completions for a document
    /// that is no longer open are ignored.
    pub fn complete_save(
        &mut self,
        ticket: SaveTicket,
        result: &Result<Document, BackendError>,
    ) -> Completion {
        let now = self.now();
        let Some(open) = self.active.as_mut().filter(|open| open.document.id == ticket.document_id)
        else {
            debug!(document_id = %ticket.document_id, "save completed after document closed");
            return Completion::Stale;
        };

        match result {
            Ok(_) => debug!(document_id = %ticket.document_id, generation = ticket.generation, "save succeeded"),
            Err(error) => warn!(
                document_id = %ticket.document_id,
                generation = ticket.generation,
                permission_denied = error.is_permission_denied(),
                error = %error,
                "save failed"
            ),
        }
        let completion = open.autosave.complete(ticket, result.is_ok(), now);
        if let (Completion::Applied(_), Ok(saved)) = (completion, result) {
            // Server metadata only; the editable state stays local.
            open.document = Document {
                title: open.document.title.clone(),
                content: open.document.content.clone(),
                ..saved.clone()
            };
        }
        completion
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Capture a snapshot now. The automatic threshold does not move.
    pub fn snapshot_now(&self) -> Result<PendingSnapshot, SessionError> {
        let open = self.current()?;
        let request = snapshot::capture(&open.document, &open.state, self.properties.as_ref())?;
        Ok(PendingSnapshot { document_id: open.document.id, request, reached: None })
    }

    /// Log the outcome of a `PendingSnapshot`. Failures never affect
    /// scheduling.
    pub fn complete_snapshot(&self, snapshot: &PendingSnapshot, result: &Result<Uuid, BackendError>) {
        match result {
            Ok(version_id) => info!(
                document_id = %snapshot.document_id,
                %version_id,
                manual = snapshot.reached.is_none(),
                "snapshot created"
            ),
            Err(error) => warn!(
                document_id = %snapshot.document_id,
                permission_denied = error.is_permission_denied(),
                error = %error,
                "snapshot failed"
            ),
        }
    }

    // ── Restore ────────────────────────────────────────────────────

    /// Hold autosave while a restore of the open document is in flight.
    /// Unsaved edits are only discarded once the restore lands.
    pub fn prepare_restore(&mut self, _confirmation: RestoreConfirmation) -> Result<Uuid, SessionError> {
        let open = self.active.as_mut().ok_or(SessionError::NoDocumentOpen)?;
        open.autosave.suspend();
        Ok(open.document.id)
    }

    /// The restore failed: unsaved edits are kept and autosave resumes.
    pub fn abort_restore(&mut self, document_id: Uuid) {
        let now = self.now();
        let Some(open) = self.active.as_mut().filter(|open| open.document.id == document_id) else {
            return;
        };
        if open.autosave.has_unsaved_edits() {
            info!(%document_id, "restore failed, keeping unsaved edits");
        }
        open.autosave.resume(now);
    }

    /// Install the re-fetched document after a restore, discarding unsaved
    /// local edits. Ignored if another document has been opened meanwhile.
    pub fn install_restored(&mut self, document: Document) -> bool {
        let Some(open) = self.active.as_mut().filter(|open| open.document.id == document.id) else {
            return false;
        };
        if open.autosave.has_unsaved_edits() {
            info!(document_id = %document.id, "discarding unsaved edits for restore");
        }
        open.state = document.editable_state();
        open.document = document;
        open.autosave.reset();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DocumentLockPolicy, MemoryBackend, NoProperties};
    use crate::clock::ManualClock;
    use folio_common::types::ViewType;

    const USER: UserId = 5;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn settings() -> SessionSettings {
        SessionSettings { user_id: USER, debounce: ms(500), snapshot_interval: ms(30_000) }
    }

    fn session_with(clock: &ManualClock, backend: &MemoryBackend) -> DocumentSession {
        DocumentSession::new(
            settings(),
            Arc::new(clock.clone()),
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
        )
    }

    fn saves(effects: &[Effect]) -> Vec<PendingSave> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Save(save) => Some(save.clone()),
                _ => None,
            })
            .collect()
    }

    fn content(text: &str) -> LocalEdit {
        LocalEdit::Content(text.into())
    }

    #[test]
    fn open_connects_channel_and_starts_saved() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "body");
        let mut session = session_with(&clock, &backend);

        assert_eq!(session.open(doc.clone()), vec![Effect::Connect(doc.id)]);
        assert_eq!(session.status(), Some(SaveStatus::Saved));
        assert_eq!(session.state(), Some(&EditableState::new("Doc", "body")));
        assert!(session.open(doc).is_empty());
    }

    #[test]
    fn edits_without_open_document_are_rejected() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let mut session = session_with(&clock, &backend);
        assert!(matches!(session.local_edit(content("x")), Err(SessionError::NoDocumentOpen)));
    }

    #[test]
    fn content_edits_broadcast_title_edits_do_not() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "");
        let mut session = session_with(&clock, &backend);
        session.open(doc.clone());

        let effects = session.local_edit(content("Hi")).unwrap();
        assert!(matches!(
            effects.as_slice(),
            [Effect::Broadcast(EditMessage { sender_id: USER, content, .. })] if content == "Hi"
        ));
        assert!(session.local_edit(LocalEdit::Title("T".into())).unwrap().is_empty());
        assert_eq!(session.status(), Some(SaveStatus::Unsaved));
    }

    #[test]
    fn rapid_edits_produce_one_save_with_final_content() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "");
        let mut session = session_with(&clock, &backend);
        session.open(doc);

        session.local_edit(content("Hello")).unwrap();
        clock.advance(ms(200));
        session.local_edit(content("Hello World")).unwrap();
        clock.advance(ms(499));
        assert!(saves(&session.tick()).is_empty());

        clock.advance(ms(1));
        let issued = saves(&session.tick());
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].patch.content.as_deref(), Some("Hello World"));
        assert_eq!(session.status(), Some(SaveStatus::Saving));
    }

    #[test]
    fn own_echo_is_never_applied() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "original");
        let mut session = session_with(&clock, &backend);
        session.open(doc.clone());

        assert!(!session.apply_remote(EditMessage::new(doc.id, USER, "X")));
        assert_eq!(session.state().unwrap().content, "original");

        assert!(session.apply_remote(EditMessage::new(doc.id, 6, "Y")));
        assert_eq!(session.state().unwrap().content, "Y");
        assert_eq!(session.status(), Some(SaveStatus::Saved));
    }

    #[test]
    fn remote_edit_for_other_document_is_dropped() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "mine");
        let mut session = session_with(&clock, &backend);
        session.open(doc);

        assert!(!session.apply_remote(EditMessage::new(Uuid::new_v4(), 6, "theirs")));
        assert_eq!(session.state().unwrap().content, "mine");
    }

    #[test]
    fn permission_failure_sets_error_until_next_edit() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "");
        let mut session = session_with(&clock, &backend);
        session.open(doc);

        session.local_edit(content("a")).unwrap();
        clock.advance(ms(500));
        let save = saves(&session.tick()).remove(0);
        let denied = Err(BackendError::PermissionDenied("403".into()));
        session.complete_save(save.ticket, &denied);
        assert_eq!(session.status(), Some(SaveStatus::Error));

        clock.advance(ms(10_000));
        assert!(saves(&session.tick()).is_empty());

        session.local_edit(content("ab")).unwrap();
        assert_eq!(session.status(), Some(SaveStatus::Unsaved));
    }

    #[test]
    fn locked_document_blocks_autosave() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "");
        let mut session = session_with(&clock, &backend);
        session.open(doc.clone());
        backend.set_locked(doc.id, true);

        session.local_edit(content("a")).unwrap();
        clock.advance(ms(500));
        assert!(saves(&session.tick()).is_empty());
        assert_eq!(session.status(), Some(SaveStatus::Unsaved));
        assert!(matches!(
            session.save_now(),
            Err(SessionError::WriteBlocked(GuardDenial::Locked))
        ));
    }

    #[test]
    fn read_only_user_is_blocked() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "");
        backend.deny_writes_for(USER);
        let mut session = session_with(&clock, &backend);
        session.open(doc);

        session.local_edit(content("a")).unwrap();
        assert!(matches!(
            session.save_now(),
            Err(SessionError::WriteBlocked(GuardDenial::ReadOnly))
        ));
    }

    #[test]
    fn switching_flushes_previous_document_first() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let first = backend.seed_page("First", "");
        let second = backend.seed_page("Second", "two");
        let mut session = session_with(&clock, &backend);
        session.open(first.clone());
        session.local_edit(content("unsaved")).unwrap();

        let effects = session.switch_document(second.clone());
        match effects.as_slice() {
            [Effect::Save(save), Effect::Connect(id)] => {
                assert_eq!(save.ticket.document_id, first.id);
                assert_eq!(save.patch.content.as_deref(), Some("unsaved"));
                assert_eq!(*id, second.id);
            }
            other => panic!("unexpected effects {other:?}"),
        }
        assert_eq!(session.status(), Some(SaveStatus::Saved));
        assert_eq!(session.state().unwrap().content, "two");
    }

    #[test]
    fn stale_completion_after_switch_is_ignored() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let first = backend.seed_page("First", "");
        let second = backend.seed_page("Second", "");
        let mut session = session_with(&clock, &backend);
        session.open(first.clone());
        session.local_edit(content("x")).unwrap();
        let save = saves(&session.switch_document(second)).remove(0);

        let result = Err(BackendError::Network("late".into()));
        assert_eq!(session.complete_save(save.ticket, &result), Completion::Stale);
        assert_eq!(session.status(), Some(SaveStatus::Saved));
    }

    #[test]
    fn dispose_flushes_and_disconnects() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "");
        let mut session = session_with(&clock, &backend);
        session.open(doc);
        session.local_edit(LocalEdit::Title("Renamed".into())).unwrap();

        let effects = session.dispose();
        assert_eq!(saves(&effects)[0].patch.title.as_deref(), Some("Renamed"));
        assert_eq!(effects.last(), Some(&Effect::Disconnect));
        assert_eq!(session.document_id(), None);
        assert!(session.dispose().is_empty());
    }

    // ── Snapshots ──────────────────────────────────────────────────

    #[test]
    fn snapshot_fires_at_interval_and_threshold_moves_on() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "body");
        let mut session = session_with(&clock, &backend);
        session.open(doc.clone());

        clock.set(ms(29_999));
        assert!(session.tick().is_empty());
        clock.set(ms(30_000));
        let effects = session.tick();
        match effects.as_slice() {
            [Effect::Snapshot(snapshot)] => {
                assert_eq!(snapshot.document_id, doc.id);
                assert_eq!(snapshot.reached, Some(ms(30_000)));
                assert_eq!(snapshot.request.content.as_deref(), Some("body"));
            }
            other => panic!("unexpected effects {other:?}"),
        }
        assert_eq!(session.threshold().next_target, ms(60_000));
    }

    #[test]
    fn failed_snapshot_does_not_block_the_next_one() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "");
        let mut session = session_with(&clock, &backend);
        session.open(doc);

        clock.set(ms(30_000));
        let Effect::Snapshot(snapshot) = session.tick().remove(0) else {
            panic!("expected snapshot");
        };
        session.complete_snapshot(&snapshot, &Err(BackendError::Network("down".into())));

        clock.set(ms(60_000));
        assert!(matches!(session.tick().as_slice(), [Effect::Snapshot(_)]));
        assert_eq!(session.threshold().next_target, ms(90_000));
    }

    #[test]
    fn switch_recomputes_threshold_from_current_elapsed() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let first = backend.seed_page("First", "");
        let second = backend.seed_page("Second", "");
        let mut session = session_with(&clock, &backend);
        session.open(first);

        clock.set(ms(29_000));
        session.switch_document(second);
        assert_eq!(session.threshold().next_target, ms(59_000));
        clock.set(ms(30_000));
        assert!(session.tick().is_empty());
    }

    #[test]
    fn background_time_does_not_count() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "");
        let mut session = session_with(&clock, &backend);
        session.open(doc);

        clock.set(ms(10_000));
        session.set_foreground(false);
        clock.set(ms(100_000));
        assert!(session.tick().is_empty());
        assert_eq!(session.next_deadline(), None);

        session.set_foreground(true);
        assert_eq!(session.next_deadline(), Some(ms(120_000)));
        clock.set(ms(120_000));
        assert!(matches!(session.tick().as_slice(), [Effect::Snapshot(_)]));
    }

    #[test]
    fn manual_snapshot_leaves_threshold_alone() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_document("Board", None, ViewType::Board);
        let mut session = session_with(&clock, &backend);
        session.open(doc);

        let snapshot = session.snapshot_now().unwrap();
        assert_eq!(snapshot.reached, None);
        assert_eq!(snapshot.request.content, None);
        assert_eq!(session.threshold().next_target, ms(30_000));
    }

    #[test]
    fn next_deadline_prefers_debounce() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "");
        let mut session = session_with(&clock, &backend);
        assert_eq!(session.next_deadline(), None);
        session.open(doc);
        assert_eq!(session.next_deadline(), Some(ms(30_000)));

        clock.set(ms(1_000));
        session.local_edit(content("x")).unwrap();
        assert_eq!(session.next_deadline(), Some(ms(1_500)));
    }

    // ── Restore ────────────────────────────────────────────────────

    #[test]
    fn restore_discards_unsaved_edits_and_installs_document() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "old");
        let mut session = session_with(&clock, &backend);
        session.open(doc.clone());
        session.local_edit(content("scratch")).unwrap();

        assert_eq!(session.prepare_restore(RestoreConfirmation::confirmed()).unwrap(), doc.id);
        clock.advance(ms(1_000));
        assert!(saves(&session.tick()).is_empty());

        let restored = Document { title: "Restored".into(), content: Some("v1".into()), ..doc };
        assert!(session.install_restored(restored));
        assert_eq!(session.state(), Some(&EditableState::new("Restored", "v1")));
        assert_eq!(session.status(), Some(SaveStatus::Saved));
    }

    #[test]
    fn failed_restore_keeps_edits_unsaved() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "old");
        let mut session = session_with(&clock, &backend);
        session.open(doc.clone());
        session.local_edit(content("keep me")).unwrap();

        session.prepare_restore(RestoreConfirmation::confirmed()).unwrap();
        assert_eq!(session.status(), Some(SaveStatus::Unsaved));
        clock.set(ms(2_000));
        session.abort_restore(doc.id);
        assert_eq!(session.next_deadline(), Some(ms(2_500)));

        clock.set(ms(2_500));
        let save = saves(&session.tick()).remove(0);
        assert_eq!(save.patch.content.as_deref(), Some("keep me"));
        assert_eq!(session.state().unwrap().content, "keep me");
    }

    #[test]
    fn restored_document_for_other_id_is_ignored() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let doc = backend.seed_page("Doc", "keep");
        let other = backend.seed_page("Other", "");
        let mut session = session_with(&clock, &backend);
        session.open(doc);
        assert!(!session.install_restored(other));
        assert_eq!(session.state().unwrap().content, "keep");
    }

    #[test]
    fn guard_policy_without_backend_uses_lock_flag() {
        let clock = ManualClock::new();
        let backend = MemoryBackend::new(USER);
        let mut doc = backend.seed_page("Doc", "");
        doc.locked = true;
        let mut session = DocumentSession::new(
            settings(),
            Arc::new(clock.clone()),
            Arc::new(DocumentLockPolicy),
            Arc::new(NoProperties),
        );
        session.open(doc);
        session.local_edit(content("x")).unwrap();
        assert!(matches!(session.save_now(), Err(SessionError::WriteBlocked(GuardDenial::Locked))));
    }
}
