//! Cancellable repeating task.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Runs an async tick on a fixed period until stopped.
///
/// Each tick is awaited before the next one is scheduled, so ticks never
/// overlap; a tick that overruns the period delays the next one.
pub struct RepeatingTask {
    name: &'static str,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stop: None,
            handle: None,
        }
    }

    /// Start ticking. The first tick runs immediately. Restarting a running
    /// task stops the previous loop first.
    pub fn start<F, Fut>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.abort();
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let name = self.name;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(task = name, period = ?period, "Repeating task started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = &mut stop_rx => break,
                            _ = tick() => {}
                        }
                    }
                }
            }
            tracing::debug!(task = name, "Repeating task stopped");
        });

        self.stop = Some(stop_tx);
        self.handle = Some(handle);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for the current tick to be dropped.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    fn abort(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.abort();
    }
}

impl std::fmt::Debug for RepeatingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepeatingTask")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut task = RepeatingTask::new("count");
        let c = count.clone();
        task.start(Duration::from_secs(1), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(task.is_running());

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        task.stop().await;
        assert!(!task.is_running());
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_ticks_never_overlap() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let mut task = RepeatingTask::new("slow");
        let (r, m) = (running.clone(), max_seen.clone());
        task.start(Duration::from_millis(100), move || {
            let (r, m) = (r.clone(), m.clone());
            async move {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                time::sleep(Duration::from_millis(350)).await;
                r.fetch_sub(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_secs(2)).await;
        task.stop().await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
