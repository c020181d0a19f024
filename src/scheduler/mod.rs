//! Cooperative fixed-period task dispatch.
//!
//! `tick` is called once per control loop iteration. A task fires when
//! `now - last_fired >= period`. In the default mode firing sets
//! `last_fired = now`, so a late iteration pushes every later firing back and
//! the drift accumulates. `SchedulingMode::FixedOrigin` advances `last_fired`
//! by exactly one period instead and keeps the original phase.

pub mod task;

pub use task::{Task, TaskId};

use log::trace;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    #[default]
    ResetOnFire,
    FixedOrigin,
}

pub struct Scheduler {
    tasks: Vec<Task>,
    mode: SchedulingMode,
}

impl Scheduler {
    /// Every task starts counting its first period from `start_ms`.
    pub fn new<I>(periods: I, mode: SchedulingMode, start_ms: u64) -> Self
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let tasks = periods
            .into_iter()
            .enumerate()
            .map(|(index, (name, period_ms))| Task::new(TaskId(index), name, period_ms, start_ms))
            .collect();
        Self { tasks, mode }
    }

    /// Returns the tasks due at `now`, in task index order.
    pub fn tick(&mut self, now: u64) -> Vec<TaskId> {
        let mut fired = Vec::new();
        for task in &mut self.tasks {
            if task.is_due(now) {
                task.mark_fired(now, self.mode);
                trace!("⏰ Task '{}' fired at {} ms", task.name(), now);
                fired.push(task.id());
            }
        }
        fired
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task_id(&self, name: &str) -> Option<TaskId> {
        self.tasks.iter().find(|t| t.name() == name).map(|t| t.id())
    }

    pub fn mode(&self) -> SchedulingMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(period: u64, mode: SchedulingMode) -> Scheduler {
        Scheduler::new(vec![("t1".to_string(), period)], mode, 0)
    }

    #[test]
    fn test_fires_only_when_period_elapsed() {
        let mut scheduler = single(1000, SchedulingMode::ResetOnFire);
        assert!(scheduler.tick(999).is_empty());
        assert_eq!(scheduler.tick(1000), vec![TaskId(0)]);
        assert!(scheduler.tick(1020).is_empty());
        assert_eq!(scheduler.task(TaskId(0)).unwrap().last_fired_ms(), 1000);
    }

    #[test]
    fn test_late_firings_accumulate_drift() {
        let mut scheduler = single(1000, SchedulingMode::ResetOnFire);
        // every iteration that fires arrives 50 ms late
        assert_eq!(scheduler.tick(1050).len(), 1);
        assert!(scheduler.tick(2000).is_empty());
        assert_eq!(scheduler.tick(2100).len(), 1);
        assert!(scheduler.tick(3050).is_empty());
        assert_eq!(scheduler.tick(3150).len(), 1);
        assert_eq!(scheduler.task(TaskId(0)).unwrap().last_fired_ms(), 3150);
    }

    #[test]
    fn test_fixed_origin_keeps_phase() {
        let mut scheduler = single(1000, SchedulingMode::FixedOrigin);
        assert_eq!(scheduler.tick(1050).len(), 1);
        assert_eq!(scheduler.task(TaskId(0)).unwrap().last_fired_ms(), 1000);
        assert_eq!(scheduler.tick(2000).len(), 1);
        assert_eq!(scheduler.tick(3150).len(), 1);
        // behind by more than a period: catches up on the next iteration
        assert_eq!(scheduler.tick(4100).len(), 1);
        assert_eq!(scheduler.task(TaskId(0)).unwrap().last_fired_ms(), 4000);
    }

    #[test]
    fn test_multiple_tasks_fire_in_index_order() {
        let mut scheduler = Scheduler::new(
            vec![
                ("fast".to_string(), 1000),
                ("medium".to_string(), 2000),
                ("slow".to_string(), 5000),
            ],
            SchedulingMode::ResetOnFire,
            0,
        );
        assert_eq!(scheduler.tick(1000), vec![TaskId(0)]);
        assert_eq!(scheduler.tick(2000), vec![TaskId(0), TaskId(1)]);
        assert_eq!(scheduler.tick(5000), vec![TaskId(0), TaskId(1), TaskId(2)]);
        assert_eq!(scheduler.task_id("slow"), Some(TaskId(2)));
    }
}
