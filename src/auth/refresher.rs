//! Background signing-key refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::auth::keys::KeyCache;
use crate::lifecycle::Shutdown;

/// Handle to the periodic key refresh loop.
///
/// The loop ends on `stop()` or when the process-wide shutdown fires,
/// whichever comes first.
pub struct KeyRefreshTask {
    stop: Shutdown,
    handle: JoinHandle<()>,
}

impl KeyRefreshTask {
    /// Spawn the loop. The first refresh happens immediately.
    pub fn start(cache: Arc<KeyCache>, interval: Duration, mut shutdown: broadcast::Receiver<()>) -> Self {
        let stop = Shutdown::new();
        let mut stopped = stop.subscribe();

        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Key refresh task starting");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = cache.refresh().await {
                            tracing::debug!(error = %err, "Scheduled key refresh failed");
                        }
                    }
                    _ = stopped.recv() => break,
                    _ = shutdown.recv() => break,
                }
            }
            tracing::info!("Key refresh task stopped");
        });

        Self { stop, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(self) {
        self.stop.trigger();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::tests::{rsa_jwk, CountingSource};
    use crate::auth::keys::JwksDocument;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_refreshes_periodically_and_stops() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            doc: JwksDocument { keys: vec![rsa_jwk("k1")] },
            delay: Duration::ZERO,
        });
        let cache = Arc::new(KeyCache::new(Some(source.clone()), Duration::from_secs(1)));
        let shutdown = Shutdown::new();

        let task = KeyRefreshTask::start(cache.clone(), Duration::from_millis(40), shutdown.subscribe());
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.stop().await;

        let calls = source.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected periodic refreshes, got {calls}");
        assert!(cache.current().get("k1").is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_global_shutdown_ends_loop() {
        let cache = Arc::new(KeyCache::disabled());
        let shutdown = Shutdown::new();
        let task = KeyRefreshTask::start(cache, Duration::from_secs(60), shutdown.subscribe());

        shutdown.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(task.is_finished());
    }
}
