//! Cancellable background tasks.
//!
//! Polling loops and subscription pumps both run as a spawned tokio task
//! owned by a [`TaskHandle`]. Dropping the handle cancels the task.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Owner of one spawned task. Cancels it on drop.
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawn `task`, handing it the token it must watch for cancellation.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let join = tokio::spawn(task(token.clone()));
        Self {
            token,
            join: Some(join),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel and hand back the join handle so a successor can wait for
    /// the task's teardown before starting its own work.
    pub fn finish(mut self) -> Option<JoinHandle<()>> {
        self.token.cancel();
        self.join.take()
    }

    /// Cancel and wait until the task has returned.
    pub async fn stop(self) {
        if let Some(join) = self.finish() {
            let _ = join.await;
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Run `tick` immediately and then every `period` until cancelled.
///
/// A tick still in flight when the handle is cancelled is abandoned.
pub fn spawn_interval<F, Fut>(period: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    TaskHandle::spawn(move |token| async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tick() => {}
            }
        }
    })
}

/// Seconds from config as a `Duration`, never zero.
pub fn secs(value: u32) -> Duration {
    Duration::from_secs(u64::from(value.max(1)))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn interval_ticks_immediately_then_periodically() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let handle = spawn_interval(Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_task() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let handle = spawn_interval(Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_tick_is_abandoned_on_cancel() {
        let done = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&done);
        let handle = spawn_interval(Duration::from_secs(60), move || {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(done.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finish_returns_join_handle() {
        let handle = TaskHandle::spawn(|token| async move { token.cancelled().await });
        assert!(!handle.is_cancelled());
        let join = handle.finish().expect("join handle");
        join.await.unwrap();
    }

    #[test]
    fn secs_never_zero() {
        assert_eq!(secs(0), Duration::from_secs(1));
        assert_eq!(secs(30), Duration::from_secs(30));
    }
}
