//! Terminal signal for an active stream
//!
//! One `StreamDone` exists per active stream. Whichever path terminates the
//! stream (natural end, stop/skip, transport error) fires it; only the first
//! write is kept. Both the playback loop and the temp-file watcher await it.

use std::sync::Mutex;
use tokio::sync::Notify;

/// How a stream terminated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Stream reached its natural end
    Completed,
    /// Stream was stopped or skipped
    Stopped,
    /// Stream ended with a transport or decode error
    Failed(String),
}

struct DoneInner {
    outcome: Mutex<Option<StreamOutcome>>,
    notify: Notify,
}

/// Single-slot, write-once completion signal, awaitable by many observers
#[derive(Clone)]
pub struct StreamDone {
    inner: std::sync::Arc<DoneInner>,
}

impl StreamDone {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(DoneInner {
                outcome: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// Record the terminal outcome. Only the first call wins; later calls
    /// are ignored, so racing terminal paths cannot double-signal.
    pub fn fire(&self, outcome: StreamOutcome) {
        {
            let mut slot = self.inner.outcome.lock().unwrap();
            if slot.is_some() {
                return;
            }
            *slot = Some(outcome);
        }
        self.inner.notify.notify_waiters();
    }

    /// True once a terminal outcome has been recorded
    pub fn is_fired(&self) -> bool {
        self.inner.outcome.lock().unwrap().is_some()
    }

    /// Suspend until the terminal outcome is recorded
    pub async fn wait(&self) -> StreamOutcome {
        loop {
            // Register before checking so a fire between the check and the
            // await is not lost.
            let notified = self.inner.notify.notified();
            if let Some(outcome) = self.inner.outcome.lock().unwrap().clone() {
                return outcome;
            }
            notified.await;
        }
    }
}

impl Default for StreamDone {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn first_fire_wins() {
        let done = StreamDone::new();
        assert!(!done.is_fired());
        done.fire(StreamOutcome::Stopped);
        done.fire(StreamOutcome::Completed);
        assert!(done.is_fired());
        assert_eq!(done.wait().await, StreamOutcome::Stopped);
    }

    #[tokio::test]
    async fn wakes_waiters_registered_before_fire() {
        let done = StreamDone::new();
        let waiter = {
            let done = done.clone();
            tokio::spawn(async move { done.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        done.fire(StreamOutcome::Completed);

        let outcome = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(outcome, StreamOutcome::Completed);
    }

    #[tokio::test]
    async fn wait_after_fire_returns_immediately() {
        let done = StreamDone::new();
        done.fire(StreamOutcome::Failed("broken pipe".to_string()));
        let outcome = timeout(Duration::from_millis(50), done.wait()).await.unwrap();
        assert_eq!(outcome, StreamOutcome::Failed("broken pipe".to_string()));
    }

    #[tokio::test]
    async fn multiple_observers_all_wake() {
        let done = StreamDone::new();
        let a = {
            let done = done.clone();
            tokio::spawn(async move { done.wait().await })
        };
        let b = {
            let done = done.clone();
            tokio::spawn(async move { done.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        done.fire(StreamOutcome::Completed);

        assert_eq!(a.await.unwrap(), StreamOutcome::Completed);
        assert_eq!(b.await.unwrap(), StreamOutcome::Completed);
    }
}
