//! Periodic task registration.

use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// A task body invoked once per period.
pub type Task = Box<dyn FnMut() + Send + 'static>;

/// Accepts tasks that run forever at a fixed period.
pub trait Scheduler {
    fn add_task(&self, name: &'static str, period: Duration, task: Task);
}

/// Scheduler running each task as a tokio interval loop.
///
/// Ticks that fall behind are skipped rather than bursted. Tasks stop when
/// the scheduler is shut down or dropped.
pub struct TaskScheduler {
    handle: Handle,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl TaskScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Scheduler on the runtime of the calling context.
    ///
    /// Panics outside a tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn task_count(&self) -> usize {
        self.lock_tasks().len()
    }

    pub fn shutdown(&self) {
        for (name, task) in self.lock_tasks().drain(..) {
            debug!(task = name, "Stopping scheduled task");
            task.abort();
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<(&'static str, JoinHandle<()>)>> {
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Scheduler for TaskScheduler {
    fn add_task(&self, name: &'static str, period: Duration, mut task: Task) {
        let period = period.max(Duration::from_millis(1));
        debug!(task = name, period_ms = period.as_millis() as u64, "Scheduling task");

        let join = self.handle.spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                task();
            }
        });
        self.lock_tasks().push((name, join));
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
