// Virtual clock and cancellable timer queue
//
// All workflow delays are expressed against this clock. The queue is the only
// authority on what may still fire: a cancelled timer is gone, so a stale
// callback can never reach the state machine.

use std::time::Duration;
use tracing::debug;

use super::types::{PendingTask, TaskKind};

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub id: TimerId,
    pub kind: TaskKind,
    /// Wait generation the timer was armed for
    pub generation: u64,
    pub due_at_ms: u64,
}

impl ArmedTimer {
    pub fn as_pending(&self) -> PendingTask {
        PendingTask {
            kind: self.kind,
            due_at_ms: self.due_at_ms,
        }
    }
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    now_ms: u64,
    next_id: TimerId,
    armed: Vec<ArmedTimer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Arm a single-shot timer `delay` after the current clock reading
    pub fn schedule(&mut self, kind: TaskKind, generation: u64, delay: Duration) -> ArmedTimer {
        self.next_id += 1;
        let timer = ArmedTimer {
            id: self.next_id,
            kind,
            generation,
            due_at_ms: self.now_ms.saturating_add(duration_ms(delay)),
        };
        debug!(
            timer_id = timer.id,
            kind = %kind,
            generation,
            due_at_ms = timer.due_at_ms,
            "Timer armed"
        );
        self.armed.push(timer);
        timer
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.armed.len();
        self.armed.retain(|timer| timer.id != id);
        let cancelled = self.armed.len() != before;
        if cancelled {
            debug!(timer_id = id, "Timer cancelled");
        }
        cancelled
    }

    /// Due time of the earliest armed timer
    pub fn next_due_ms(&self) -> Option<u64> {
        self.armed.iter().map(|timer| timer.due_at_ms).min()
    }

    /// Remove and return the earliest timer due at or before `deadline_ms`,
    /// moving the clock to its due time. Ties fire in arming order.
    pub fn pop_due(&mut self, deadline_ms: u64) -> Option<ArmedTimer> {
        let index = self
            .armed
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.due_at_ms <= deadline_ms)
            .min_by_key(|(_, timer)| (timer.due_at_ms, timer.id))
            .map(|(index, _)| index)?;
        let timer = self.armed.remove(index);
        self.now_ms = self.now_ms.max(timer.due_at_ms);
        Some(timer)
    }

    /// Move the clock forward. The clock never runs backwards.
    pub fn advance_clock_to(&mut self, ms: u64) {
        self.now_ms = self.now_ms.max(ms);
    }
}

pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timers_fire_in_due_order() {
        let mut queue = TimerQueue::new();
        queue.schedule(TaskKind::PostLaunch, 1, Duration::from_millis(2000));
        queue.schedule(TaskKind::CountdownTick, 2, Duration::from_millis(1000));

        assert_eq!(queue.next_due_ms(), Some(1000));
        assert!(queue.pop_due(999).is_none());

        let first = queue.pop_due(5000).unwrap();
        assert_eq!(first.kind, TaskKind::CountdownTick);
        assert_eq!(queue.now_ms(), 1000);

        let second = queue.pop_due(5000).unwrap();
        assert_eq!(second.kind, TaskKind::PostLaunch);
        assert_eq!(queue.now_ms(), 2000);
        assert_eq!(queue.next_due_ms(), None);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut queue = TimerQueue::new();
        let timer = queue.schedule(TaskKind::Connection, 1, Duration::from_millis(2000));
        assert!(queue.cancel(timer.id));
        assert!(!queue.cancel(timer.id));
        assert!(queue.pop_due(u64::MAX).is_none());
    }

    #[test]
    fn test_clock_is_monotonic() {
        let mut queue = TimerQueue::new();
        queue.advance_clock_to(500);
        queue.advance_clock_to(100);
        assert_eq!(queue.now_ms(), 500);

        let timer = queue.schedule(TaskKind::MissionUpload, 1, Duration::from_millis(2000));
        assert_eq!(timer.due_at_ms, 2500);
    }
}
