// Debounced autosave for one open document.
//
// Local mutations restart a single debounce timer. When the window elapses
// with no further mutation and the write guard passes, the controller hands
// out a `SaveTicket`; the caller performs the network call and reports back
// through `complete`. Status changes go through `transition`, the only place
// the state machine is defined.
//
// Saves may overlap and resolve in any order. Completions are applied in
// the order they resolve, so the last one to resolve sets the status. Only
// saves discarded by `reset` are stale.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::GuardDenial;
use crate::timer::{TimerHandle, TimerQueue};

// ── State machine ──────────────────────────────────────────────────

/// Observable save state of the open document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SaveStatus {
    #[default]
    Saved,
    Unsaved,
    Saving,
    Error,
}

impl SaveStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Unsaved => "unsaved",
            Self::Saving => "saving",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the save-status state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveEvent {
    /// Local title or content mutation.
    Edited,
    /// A persistence call was issued (debounce elapsed, flush, or explicit save).
    SaveStarted,
    /// The write guard refused the save.
    GuardDenied,
    SaveSucceeded,
    SaveFailed,
}

/// Transition table. `None` means the event has no effect in that state.
///
/// `Saved` never moves straight to `Saving`; an edit must first make the
/// document `Unsaved`. `Error` only leaves through a new edit or an explicit
/// save.
pub const fn transition(from: SaveStatus, event: SaveEvent) -> Option<SaveStatus> {
    use SaveEvent as E;
    use SaveStatus as S;
    match (from, event) {
        (S::Saved | S::Unsaved | S::Error, E::Edited) => Some(S::Unsaved),
        (S::Unsaved | S::Error, E::SaveStarted) => Some(S::Saving),
        // A newer save superseding one still in flight.
        (S::Saving, E::SaveStarted) => Some(S::Saving),
        (S::Unsaved, E::GuardDenied) => Some(S::Unsaved),
        (S::Saving, E::SaveSucceeded) => Some(S::Saved),
        (S::Saving, E::SaveFailed) => Some(S::Error),
        // An older save resolving after a newer one already did.
        (S::Error, E::SaveSucceeded) => Some(S::Saved),
        (S::Saved, E::SaveFailed) => Some(S::Error),
        _ => None,
    }
}

// ── Controller ─────────────────────────────────────────────────────

/// Authorizes one persistence call for `document_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveTicket {
    pub document_id: Uuid,
    pub generation: u64,
}

/// Result of polling the debounce timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    /// Nothing due.
    Idle,
    /// Issue the save now.
    Begin(SaveTicket),
    /// Window elapsed but the guard refused; the document stays unsaved.
    Blocked(GuardDenial),
    /// Window elapsed while a save was in flight; a follow-up runs after it
    /// resolves.
    Deferred,
}

/// What a completion did to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Status updated from the outcome.
    Applied(SaveStatus),
    /// A newer save was issued since; outcome ignored.
    Stale,
}

pub struct AutosaveController {
    document_id: Uuid,
    debounce: Duration,
    status: SaveStatus,
    timers: TimerQueue<()>,
    pending: Option<TimerHandle>,
    generation: u64,
    /// Generations issued and not yet resolved.
    in_flight: BTreeSet<u64>,
    /// Edited while a save was in flight.
    dirty_while_saving: bool,
    /// Debounce elapsed while a save was in flight.
    deferred: bool,
}

impl AutosaveController {
    pub fn new(document_id: Uuid, debounce: Duration) -> Self {
        Self {
            document_id,
            debounce,
            status: SaveStatus::Saved,
            timers: TimerQueue::new(),
            pending: None,
            generation: 0,
            in_flight: BTreeSet::new(),
            dirty_while_saving: false,
            deferred: false,
        }
    }

    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn has_pending_timer(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_saving(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// True if local edits exist that no issued save carries.
    pub fn has_unsaved_edits(&self) -> bool {
        self.status == SaveStatus::Unsaved || self.dirty_while_saving
    }

    /// Deadline of the debounce timer, on the caller's clock.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    fn apply(&mut self, event: SaveEvent) {
        match transition(self.status, event) {
            Some(next) => {
                if next != self.status {
                    debug!(
                        document_id = %self.document_id,
                        from = %self.status,
                        to = %next,
                        ?event,
                        "save status transition"
                    );
                }
                self.status = next;
            }
            None => debug!(
                document_id = %self.document_id,
                status = %self.status,
                ?event,
                "save event ignored"
            ),
        }
    }

    fn restart_timer(&mut self, delay: Duration, now: Duration) {
        self.cancel_timer();
        self.pending = Some(self.timers.schedule((), delay, now));
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.timers.cancel(handle);
        }
    }

    fn begin(&mut self) -> SaveTicket {
        self.cancel_timer();
        self.generation += 1;
        self.in_flight.insert(self.generation);
        self.dirty_while_saving = false;
        self.deferred = false;
        self.apply(SaveEvent::SaveStarted);
        SaveTicket { document_id: self.document_id, generation: self.generation }
    }

    /// Record a local mutation at `now` and restart the debounce window.
    pub fn record_edit(&mut self, now: Duration) {
        if self.is_saving() {
            self.dirty_while_saving = true;
        } else {
            self.apply(SaveEvent::Edited);
        }
        self.restart_timer(self.debounce, now);
    }

    /// Fire the debounce timer if due. `guard` is consulted only when the
    /// window has elapsed.
    pub fn poll(
        &mut self,
        now: Duration,
        guard: impl FnOnce() -> Result<(), GuardDenial>,
    ) -> SaveDecision {
        if self.timers.drain_due(now).is_empty() {
            return SaveDecision::Idle;
        }
        self.pending = None;

        if self.is_saving() {
            self.deferred = true;
            return SaveDecision::Deferred;
        }
        if self.status != SaveStatus::Unsaved {
            return SaveDecision::Idle;
        }
        match guard() {
            Ok(()) => SaveDecision::Begin(self.begin()),
            Err(denial) => {
                self.apply(SaveEvent::GuardDenied);
                SaveDecision::Blocked(denial)
            }
        }
    }

    /// Report the outcome of a ticket's persistence call. Outcomes apply in
    /// resolution order, whichever generation they belong to.
    pub fn complete(&mut self, ticket: SaveTicket, succeeded: bool, now: Duration) -> Completion {
        if ticket.document_id != self.document_id || !self.in_flight.remove(&ticket.generation) {
            debug!(
                document_id = %ticket.document_id,
                generation = ticket.generation,
                current = self.generation,
                "ignoring stale save completion"
            );
            return Completion::Stale;
        }
        if ticket.generation < self.generation {
            debug!(
                document_id = %ticket.document_id,
                generation = ticket.generation,
                current = self.generation,
                "older save resolved after a newer one was issued"
            );
        }
        self.apply(if succeeded { SaveEvent::SaveSucceeded } else { SaveEvent::SaveFailed });

        // Edits no issued save carries keep the document unsaved.
        if self.dirty_while_saving {
            self.dirty_while_saving = false;
            self.apply(SaveEvent::Edited);
        }
        if self.deferred && self.in_flight.is_empty() {
            self.deferred = false;
            if self.status == SaveStatus::Unsaved {
                self.restart_timer(Duration::ZERO, now);
            }
        }
        Completion::Applied(self.status)
    }

    /// Cancel the debounce timer and issue a save for any unsaved edits,
    /// bypassing the window. Used on teardown and document switch.
    pub fn flush(
        &mut self,
        guard: impl FnOnce() -> Result<(), GuardDenial>,
    ) -> Result<Option<SaveTicket>, GuardDenial> {
        self.cancel_timer();
        if !self.has_unsaved_edits() {
            return Ok(None);
        }
        match guard() {
            Ok(()) => Ok(Some(self.begin())),
            Err(denial) => {
                self.apply(SaveEvent::GuardDenied);
                Err(denial)
            }
        }
    }

    /// Explicit user save. Also retries after `Error`.
    pub fn save_now(
        &mut self,
        guard: impl FnOnce() -> Result<(), GuardDenial>,
    ) -> Result<Option<SaveTicket>, GuardDenial> {
        if self.status == SaveStatus::Error && !self.dirty_while_saving {
            self.cancel_timer();
            guard()?;
            return Ok(Some(self.begin()));
        }
        self.flush(guard)
    }

    /// Stop the debounce timer while keeping unsaved edits and status.
    pub fn suspend(&mut self) {
        self.cancel_timer();
    }

    /// Undo `suspend`: unsaved edits get a fresh debounce window, or a
    /// follow-up cycle once in-flight saves resolve.
    pub fn resume(&mut self, now: Duration) {
        if self.has_pending_timer() || !self.has_unsaved_edits() {
            return;
        }
        if self.is_saving() {
            self.deferred = true;
        } else {
            self.restart_timer(self.debounce, now);
        }
    }

    /// Drop timers and pending edits; any in-flight completion becomes stale.
    /// The status becomes `Saved`.
    pub fn reset(&mut self) {
        self.cancel_timer();
        self.generation += 1;
        self.in_flight.clear();
        self.dirty_while_saving = false;
        self.deferred = false;
        self.status = SaveStatus::Saved;
    }
}
