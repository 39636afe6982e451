//! Runtime plumbing for the source actors.
//!
//! The engine schedules work onto three logical executors — `Computation`,
//! `Graphics` and `Io` — backed by tokio runtime handles. A deployment may
//! hand every environment the same runtime (the default) or dedicate a
//! runtime per environment; the actor mailboxes only rely on the handles
//! being able to spawn.

pub mod mailbox;

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;

/// Logical executor a task or mailbox message is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionEnvironment {
    /// CPU-heavy work: pyramid selection, polygon clipping, decoding
    Computation,
    /// Work that must interleave with rendering
    Graphics,
    /// Network and timer work
    Io,
}

/// Thread-pool front end partitioned into the three executors
#[derive(Debug, Clone)]
pub struct Scheduler {
    computation: Handle,
    graphics: Handle,
    io: Handle,
}

impl Scheduler {
    pub fn new(computation: Handle, graphics: Handle, io: Handle) -> Self {
        Self {
            computation,
            graphics,
            io,
        }
    }

    /// Uses the ambient tokio runtime for all three environments.
    ///
    /// Panics outside of a runtime context, like [`Handle::current`].
    pub fn from_current() -> Self {
        let handle = Handle::current();
        Self::new(handle.clone(), handle.clone(), handle)
    }

    fn handle(&self, environment: ExecutionEnvironment) -> &Handle {
        match environment {
            ExecutionEnvironment::Computation => &self.computation,
            ExecutionEnvironment::Graphics => &self.graphics,
            ExecutionEnvironment::Io => &self.io,
        }
    }

    pub fn spawn<F>(&self, environment: ExecutionEnvironment, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle(environment).spawn(future);
    }

    /// Spawns a task that runs after `delay`; used for load-retry backoff
    pub fn spawn_after<F>(&self, delay: Duration, environment: ExecutionEnvironment, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle(environment).spawn(async move {
            tokio::time::sleep(delay).await;
            future.await;
        });
    }
}

/// Wall-clock milliseconds since the unix epoch; drives the backoff ledger
pub fn current_time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_spawn_runs_on_every_environment() {
        let scheduler = Scheduler::from_current();
        let count = Arc::new(AtomicUsize::new(0));
        for environment in [
            ExecutionEnvironment::Computation,
            ExecutionEnvironment::Graphics,
            ExecutionEnvironment::Io,
        ] {
            let count = count.clone();
            scheduler.spawn(environment, async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_after_waits() {
        let scheduler = Scheduler::from_current();
        let count = Arc::new(AtomicUsize::new(0));
        let task_count = count.clone();
        scheduler.spawn_after(
            Duration::from_millis(500),
            ExecutionEnvironment::Io,
            async move {
                task_count.fetch_add(1, Ordering::SeqCst);
            },
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_current_time_millis_is_monotonic_enough() {
        let a = current_time_millis();
        let b = current_time_millis();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }
}
