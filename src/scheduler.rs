//! Deferred, fire-and-forget workspace tasks.
//!
//! Time is a logical millisecond clock advanced by the host, so delays are
//! deterministic. Tasks carry ids only and are re-validated when they run.

use crate::{BlockId, ConnectionId};

/// Work to run after a delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Declutter around a block once a connect has settled
    BumpNeighbours { block: BlockId },

    /// Nudge an orphan that could not be re-attached
    BumpAwayFrom {
        block: BlockId,
        away_from: ConnectionId,
    },

    /// Close the deletion target's lid
    CloseDeletionTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub due_ms: u64,
    /// Tie-break for tasks due at the same time
    pub seq: u64,
    pub task: Task,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    now_ms: u64,
    next_seq: u64,
    queue: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current logical time
    pub fn now(&self) -> u64 {
        self.now_ms
    }

    pub fn schedule(&mut self, delay_ms: u64, task: Task) {
        let entry = ScheduledTask {
            due_ms: self.now_ms + delay_ms,
            seq: self.next_seq,
            task,
        };
        self.next_seq += 1;
        self.queue.push(entry);
    }

    /// Tasks not yet run, in run order
    pub fn pending(&self) -> Vec<ScheduledTask> {
        let mut pending = self.queue.clone();
        pending.sort_by_key(|t| (t.due_ms, t.seq));
        pending
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take the earliest task due at or before `until`, advancing the clock
    /// to its due time
    pub fn pop_due(&mut self, until: u64) -> Option<Task> {
        let at = self
            .queue
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= until)
            .min_by_key(|(_, t)| (t.due_ms, t.seq))
            .map(|(at, _)| at)?;

        let entry = self.queue.remove(at);
        self.now_ms = self.now_ms.max(entry.due_ms);
        Some(entry.task)
    }

    /// Move the clock forward; never backwards
    pub fn advance_to(&mut self, time_ms: u64) {
        self.now_ms = self.now_ms.max(time_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_run_in_due_order() {
        let mut scheduler = Scheduler::new();
        let a = BlockId::new();
        let b = BlockId::new();
        scheduler.schedule(250, Task::BumpNeighbours { block: a });
        scheduler.schedule(100, Task::CloseDeletionTarget);
        scheduler.schedule(250, Task::BumpNeighbours { block: b });

        assert_eq!(scheduler.pop_due(50), None);
        assert_eq!(scheduler.pop_due(1000), Some(Task::CloseDeletionTarget));
        assert_eq!(scheduler.now(), 100);
        assert_eq!(scheduler.pop_due(1000), Some(Task::BumpNeighbours { block: a }));
        assert_eq!(scheduler.pop_due(1000), Some(Task::BumpNeighbours { block: b }));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_delay_is_relative_to_now() {
        let mut scheduler = Scheduler::new();
        scheduler.advance_to(1000);
        scheduler.schedule(10, Task::CloseDeletionTarget);
        assert_eq!(scheduler.pending()[0].due_ms, 1010);

        scheduler.advance_to(500);
        assert_eq!(scheduler.now(), 1000);
    }
}
