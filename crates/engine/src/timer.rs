// Cancellable scheduled tasks on a caller-supplied clock.
//
// `schedule` returns a handle, `cancel` removes the task, and `drain_due`
// hands back every task whose deadline has passed. Time is passed in
// explicitly so tests advance a virtual clock instead of sleeping.

use std::collections::BTreeMap;
use std::time::Duration;

/// Identifies one scheduled task. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

struct PendingTask<K> {
    key: K,
    deadline: Duration,
}

/// Scheduled tasks keyed by `K`, the action to perform when the task is due.
pub struct TimerQueue<K> {
    next_id: u64,
    pending: BTreeMap<TimerHandle, PendingTask<K>>,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self { next_id: 0, pending: BTreeMap::new() }
    }
}

impl<K> TimerQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` to become due `delay` after `now`.
    pub fn schedule(&mut self, key: K, delay: Duration, now: Duration) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.pending.insert(handle, PendingTask { key, deadline: now + delay });
        handle
    }

    /// Cancel a task. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    /// Remove and return all tasks due at `now`, earliest deadline first.
    pub fn drain_due(&mut self, now: Duration) -> Vec<(TimerHandle, K)> {
        let due: Vec<TimerHandle> = self
            .pending
            .iter()
            .filter(|(_, task)| task.deadline <= now)
            .map(|(handle, _)| *handle)
            .collect();

        let mut fired: Vec<(Duration, TimerHandle, K)> = due
            .into_iter()
            .filter_map(|handle| {
                self.pending.remove(&handle).map(|task| (task.deadline, handle, task.key))
            })
            .collect();
        fired.sort_by_key(|(deadline, handle, _)| (*deadline, *handle));
        fired.into_iter().map(|(_, handle, key)| (handle, key)).collect()
    }

    /// Earliest pending deadline, or None if empty.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.values().map(|task| task.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Cancel everything. Returns how many tasks were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn task_not_due_before_deadline() {
        let mut queue = TimerQueue::new();
        queue.schedule("save", ms(500), ms(0));

        assert!(queue.drain_due(ms(499)).is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn task_due_at_deadline() {
        let mut queue = TimerQueue::new();
        let handle = queue.schedule("save", ms(500), ms(100));

        let due = queue.drain_due(ms(600));
        assert_eq!(due, vec![(handle, "save")]);
        assert!(queue.is_empty());
        assert!(!queue.is_pending(handle));
    }

    #[test]
    fn cancelled_task_never_fires() {
        let mut queue = TimerQueue::new();
        let handle = queue.schedule("save", ms(500), ms(0));

        assert!(queue.cancel(handle));
        assert!(!queue.cancel(handle));
        assert!(queue.drain_due(ms(10_000)).is_empty());
    }

    #[test]
    fn drain_returns_earliest_first() {
        let mut queue = TimerQueue::new();
        let late = queue.schedule("late", ms(300), ms(0));
        let early = queue.schedule("early", ms(100), ms(0));
        queue.schedule("future", ms(900), ms(0));

        let due = queue.drain_due(ms(400));
        assert_eq!(due, vec![(early, "early"), (late, "late")]);
        assert_eq!(queue.next_deadline(), Some(ms(900)));
    }

    #[test]
    fn handles_are_not_reused() {
        let mut queue = TimerQueue::new();
        let first = queue.schedule((), ms(1), ms(0));
        queue.cancel(first);
        let second = queue.schedule((), ms(1), ms(0));
        assert_ne!(first, second);
    }

    #[test]
    fn next_deadline_none_when_empty() {
        let queue: TimerQueue<()> = TimerQueue::new();
        assert!(queue.next_deadline().is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let mut queue = TimerQueue::new();
        queue.schedule(1, ms(5), ms(0));
        queue.schedule(2, ms(6), ms(0));
        assert_eq!(queue.clear(), 2);
        assert!(queue.drain_due(ms(100)).is_empty());
    }
}
