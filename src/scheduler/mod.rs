//! Timer / task scheduler (C8): one-shot named timers with cancellation.
//!
//! Timers fire at most once, after at least `delay_seconds`. The registry
//! is in-memory only: on shutdown, every still-pending timer is cancelled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// In-memory registry of pending timers. Share one instance per process
/// behind an [`Arc`]; every [`Self::schedule`] call spawns its own task.
pub struct TimerScheduler {
    next_id: AtomicU64,
    timers: Mutex<HashMap<u64, (String, CancellationToken)>>,
}

impl TimerScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Schedule `callback` to run at least `delay_seconds` from now. The
    /// callback's panics and errors are caught and logged; they never
    /// propagate to the caller or affect other timers.
    pub fn schedule<F, Fut>(self: &Arc<Self>, name: impl Into<String>, delay_seconds: f64, callback: F) -> u64
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, (name.clone(), token.clone()));

        let scheduler = Arc::clone(self);
        let duration = std::time::Duration::from_secs_f64(delay_seconds.max(0.0));
        let fire_token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = fire_token.cancelled() => {}
                () = tokio::time::sleep(duration) => {
                    let handle = tokio::spawn(callback());
                    match handle.await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => error!("timer '{name}' (id {id}) callback returned an error: {err}"),
                        Err(join_err) => error!("timer '{name}' (id {id}) callback panicked: {join_err}"),
                    }
                }
            }
            scheduler.timers.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        });

        id
    }

    /// Cancel a pending timer. Idempotent: cancelling an id that is not
    /// pending (never existed, already fired, or already cancelled) returns
    /// `false` without raising.
    pub fn cancel(&self, timer_id: u64) -> bool {
        match self.timers.lock().unwrap_or_else(|e| e.into_inner()).remove(&timer_id) {
            Some((name, token)) => {
                token.cancel();
                warn!("timer '{name}' (id {timer_id}) cancelled before firing");
                true
            }
            None => false,
        }
    }

    /// Number of timers currently pending.
    pub fn pending_count(&self) -> usize {
        self.timers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Cancel every pending timer, e.g. on session/process shutdown.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        for (_, token) in timers.values() {
            token.cancel();
        }
        timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timer_fires_after_delay() {
        let scheduler = TimerScheduler::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        scheduler.schedule("test", 0.01, move || {
            let tx = Arc::clone(&tx);
            async move {
                if let Some(tx) = tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    let _ = tx.send(());
                }
                Ok(())
            }
        });
        tokio::time::timeout(std::time::Duration::from_secs(1), rx).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let scheduler = TimerScheduler::new();
        let id = scheduler.schedule("never_fires", 10.0, || async { Ok(()) });
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
    }

    #[tokio::test]
    async fn cancel_unknown_id_returns_false() {
        let scheduler = TimerScheduler::new();
        assert!(!scheduler.cancel(9999));
    }

    #[tokio::test]
    async fn panicking_callback_does_not_affect_other_timers() {
        let scheduler = TimerScheduler::new();
        scheduler.schedule("panics", 0.01, || async { panic!("boom") });
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        scheduler.schedule("fine", 0.02, move || {
            let tx = Arc::clone(&tx);
            async move {
                if let Some(tx) = tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    let _ = tx.send(());
                }
                Ok(())
            }
        });
        tokio::time::timeout(std::time::Duration::from_secs(1), rx).await.unwrap().unwrap();
    }
}
