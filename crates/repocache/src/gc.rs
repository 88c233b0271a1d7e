//! The background garbage collector: a ticker that invokes [`Cache::prune`]
//! periodically and an idempotent, blocking stop handle.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::prune::PruneStrategy;

/// The stop handle returned by [`Cache::start_gc`].
///
/// [`GcHandle::stop`] is idempotent and blocks until the background task
/// has observed cancellation and stopped running: after it returns, no
/// further I/O happens from this GC.
#[derive(Debug)]
pub struct GcHandle {
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl GcHandle {
    pub async fn stop(&self) {
        self.cancel.cancel();
        let mut guard = self.task.lock().await;
        if let Some(task) = guard.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "garbage collector task ended abnormally");
            }
        }
    }
}

impl Cache {
    /// Spawns a background task that invokes [`Cache::prune`] with
    /// `strategies` (defaulting to `[Expired]` if empty) on every `tick`
    /// of `interval`, swallowing any pruning error (there is no caller to
    /// surface it to; failures are logged). Requires the cache to be held
    /// in an `Arc` since the task outlives this call.
    pub fn start_gc(
        self: &Arc<Self>,
        interval: Duration,
        strategies: Vec<Box<dyn PruneStrategy>>,
    ) -> GcHandle {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let cache = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => {
                        debug!("garbage collector stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let refs: Vec<&dyn PruneStrategy> = strategies.iter().map(AsRef::as_ref).collect();
                        if let Err(err) = cache.prune(&refs).await {
                            warn!(error = %err, "garbage collector prune pass failed");
                        }
                    }
                }
            }
        });

        GcHandle {
            cancel,
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn stop_is_idempotent_and_blocks_until_stopped() {
        let (cache, _tmp) = crate::testing::temp_cache().await;
        let cache = Arc::new(cache);
        let handle = cache.start_gc(Duration::from_millis(10), Vec::new());
        handle.stop().await;
        handle.stop().await;
    }
}
