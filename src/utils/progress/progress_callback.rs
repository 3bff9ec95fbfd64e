// src/utils/progress/progress_callback.rs - Progress sink for enrichment monitoring

use log::debug;
use std::sync::Arc;

/// One progress report, emitted after each cluster completes enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub clusters_done: usize,
    pub clusters_total: usize,
    pub batch_id: u32,
}

/// Injected progress sink. The orchestrator invokes it from concurrent
/// workers, so implementations must be `Send + Sync` and cheap to call.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// A callback that just logs progress, for callers without a UI.
pub fn create_log_callback() -> ProgressCallback {
    Arc::new(|update: ProgressUpdate| {
        debug!(
            "[batch {}] {}/{} clusters enriched",
            update.batch_id, update.clusters_done, update.clusters_total
        );
    })
}

/// Convenience macro for reporting progress through an optional callback.
#[macro_export]
macro_rules! report_progress {
    ($callback:expr, $done:expr, $total:expr, $batch_id:expr) => {
        if let Some(ref cb) = $callback {
            cb($crate::utils::progress::progress_callback::ProgressUpdate {
                clusters_done: $done,
                clusters_total: $total,
                batch_id: $batch_id,
            });
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callback_receives_updates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let callback: ProgressCallback = Arc::new(move |update| {
            assert_eq!(update.clusters_total, 10);
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let maybe_callback = Some(callback);
        report_progress!(maybe_callback, 1, 10, 1);
        report_progress!(maybe_callback, 2, 10, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn log_callback_does_not_panic() {
        let callback = create_log_callback();
        callback(ProgressUpdate {
            clusters_done: 1,
            clusters_total: 2,
            batch_id: 1,
        });
    }
}
