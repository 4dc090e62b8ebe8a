//! Periodic scheduling for the tick loop.
//!
//! The core never sleeps on its own. An owner registers periodic callbacks
//! and calls [`PeriodicScheduler::run_due`] whenever it wakes up, using
//! [`PeriodicScheduler::next_deadline`] to decide how long to wait.

use std::time::{Duration, Instant};

/// Missed periods beyond this are skipped instead of replayed back to back.
pub const MAX_CATCH_UP_TICKS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u32);

pub trait Scheduler<C> {
    fn register_periodic<F>(&mut self, interval: Duration, callback: F) -> TaskId
    where
        F: FnMut(&mut C, Instant) + 'static;

    fn cancel(&mut self, task: TaskId) -> bool;
}

struct PeriodicTask<C> {
    id: TaskId,
    interval: Duration,
    next_due: Option<Instant>,
    callback: Box<dyn FnMut(&mut C, Instant)>,
}

/// Fixed-interval scheduler over a context `C` handed to every callback.
pub struct PeriodicScheduler<C> {
    tasks: Vec<PeriodicTask<C>>,
    next_id: u32,
}

impl<C> Default for PeriodicScheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> PeriodicScheduler<C> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Fires every task whose period has elapsed and returns how many
    /// callbacks ran. A new task fires on its first call.
    pub fn run_due(&mut self, context: &mut C, now: Instant) -> usize {
        let mut fired = 0;

        for task in &mut self.tasks {
            let mut due = *task.next_due.get_or_insert(now);
            let mut runs = 0;

            while due <= now {
                if runs == MAX_CATCH_UP_TICKS {
                    due = now + task.interval;
                    break;
                }
                (task.callback)(context, now);
                runs += 1;
                due += task.interval;
            }

            task.next_due = Some(due);
            fired += runs as usize;
        }

        fired
    }

    /// Earliest instant at which some task becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().filter_map(|task| task.next_due).min()
    }
}

impl<C> Scheduler<C> for PeriodicScheduler<C> {
    fn register_periodic<F>(&mut self, interval: Duration, callback: F) -> TaskId
    where
        F: FnMut(&mut C, Instant) + 'static,
    {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        self.tasks.push(PeriodicTask {
            id,
            interval: interval.max(Duration::from_millis(1)),
            next_due: None,
            callback: Box::new(callback),
        });
        id
    }

    fn cancel(&mut self, task: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != task);
        self.tasks.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_interval() {
        let mut scheduler = PeriodicScheduler::<Vec<Instant>>::new();
        scheduler.register_periodic(Duration::from_secs(1), |log, now| log.push(now));

        let start = Instant::now();
        let mut log = Vec::new();
        assert_eq!(scheduler.run_due(&mut log, start), 1);
        assert_eq!(scheduler.run_due(&mut log, start + Duration::from_millis(500)), 0);
        assert_eq!(scheduler.run_due(&mut log, start + Duration::from_secs(1)), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(scheduler.next_deadline(), Some(start + Duration::from_secs(2)));
    }

    #[test]
    fn test_catch_up_is_bounded() {
        let mut scheduler = PeriodicScheduler::<u32>::new();
        scheduler.register_periodic(Duration::from_secs(1), |count, _| *count += 1);

        let start = Instant::now();
        let mut count = 0;
        scheduler.run_due(&mut count, start);
        let fired = scheduler.run_due(&mut count, start + Duration::from_secs(10));

        assert_eq!(fired, MAX_CATCH_UP_TICKS as usize);
        assert_eq!(
            scheduler.next_deadline(),
            Some(start + Duration::from_secs(11))
        );
    }

    #[test]
    fn test_independent_intervals_and_cancel() {
        let mut scheduler = PeriodicScheduler::<(u32, u32)>::new();
        let fast = scheduler.register_periodic(Duration::from_millis(100), |c, _| c.0 += 1);
        scheduler.register_periodic(Duration::from_millis(300), |c, _| c.1 += 1);

        let start = Instant::now();
        let mut counts = (0, 0);
        for step in 0..=3 {
            scheduler.run_due(&mut counts, start + Duration::from_millis(100 * step));
        }
        assert_eq!(counts, (4, 2));

        assert!(scheduler.cancel(fast));
        assert!(!scheduler.cancel(fast));
        assert_eq!(scheduler.len(), 1);
    }
}
