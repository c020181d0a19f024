use std::fmt;

use super::SchedulingMode;

/// Index of a task in the scheduler's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0 + 1)
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    name: String,
    period_ms: u64,
    last_fired_ms: u64,
}

impl Task {
    pub fn new(id: TaskId, name: String, period_ms: u64, start_ms: u64) -> Self {
        Self {
            id,
            name,
            period_ms,
            last_fired_ms: start_ms,
        }
    }

    pub fn is_due(&self, now: u64) -> bool {
        now.saturating_sub(self.last_fired_ms) >= self.period_ms
    }

    pub fn mark_fired(&mut self, now: u64, mode: SchedulingMode) {
        self.last_fired_ms = match mode {
            SchedulingMode::ResetOnFire => now,
            SchedulingMode::FixedOrigin => self.last_fired_ms + self.period_ms,
        };
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn last_fired_ms(&self) -> u64 {
        self.last_fired_ms
    }
}
