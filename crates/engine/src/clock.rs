// Monotonic elapsed-time sources.
//
// Debounce timers run on raw monotonic time. Snapshot scheduling runs on
// active time: an `ActivityClock` only accumulates while the document is in
// the foreground.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Collaborator-supplied monotonic clock, measured from an arbitrary origin.
pub trait ElapsedSource: Send + Sync {
    fn elapsed(&self) -> Duration;
}

/// Real monotonic clock backed by `tokio::time::Instant`, so paused tokio
/// test time drives it too.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: tokio::time::Instant::now() }
    }

    /// The instant `elapsed` after this clock's origin.
    pub fn instant_at(&self, elapsed: Duration) -> tokio::time::Instant {
        self.origin + elapsed
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ElapsedSource for MonotonicClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Virtual clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.nanos.store(to.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl ElapsedSource for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Accumulates source time only while active.
#[derive(Clone)]
pub struct ActivityClock {
    source: Arc<dyn ElapsedSource>,
    banked: Duration,
    resumed_at: Option<Duration>,
}

impl ActivityClock {
    /// Starts active.
    pub fn new(source: Arc<dyn ElapsedSource>) -> Self {
        let now = source.elapsed();
        Self { source, banked: Duration::ZERO, resumed_at: Some(now) }
    }

    /// Total active time so far.
    pub fn elapsed(&self) -> Duration {
        match self.resumed_at {
            Some(start) => self.banked + self.source.elapsed().saturating_sub(start),
            None => self.banked,
        }
    }

    pub fn is_active(&self) -> bool {
        self.resumed_at.is_some()
    }

    pub fn pause(&mut self) {
        if self.resumed_at.is_some() {
            self.banked = self.elapsed();
            self.resumed_at = None;
        }
    }

    pub fn resume(&mut self) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(self.source.elapsed());
        }
    }
}

impl std::fmt::Debug for ActivityClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityClock")
            .field("elapsed", &self.elapsed())
            .field("active", &self.is_active())
            .finish()
    }
}
