use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing summarization activity.
#[derive(Default)]
pub struct SummaryMetrics {
    documents_summarized: AtomicU64,
    documents_failed: AtomicU64,
    chunks_processed: AtomicU64,
    chunk_failures: AtomicU64,
    reduction_passes: AtomicU64,
}

impl SummaryMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed summary.
    pub fn record_success(&self, chunk_count: u64, failed_chunks: u64, reduction_passes: u64) {
        self.documents_summarized.fetch_add(1, Ordering::Relaxed);
        self.chunks_processed
            .fetch_add(chunk_count, Ordering::Relaxed);
        self.chunk_failures
            .fetch_add(failed_chunks, Ordering::Relaxed);
        self.reduction_passes
            .fetch_add(reduction_passes, Ordering::Relaxed);
    }

    /// Record a request that ended in the failed state.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_summarized: self.documents_summarized.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            chunk_failures: self.chunk_failures.load(Ordering::Relaxed),
            reduction_passes: self.reduction_passes.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of summarization counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Requests that produced a final summary since startup.
    pub documents_summarized: u64,
    /// Requests that ended in the failed state since startup.
    pub documents_failed: u64,
    /// Chunks produced across all successful requests.
    pub chunks_processed: u64,
    /// Chunks the completion service failed on (absorbed by the map stage).
    pub chunk_failures: u64,
    /// Intermediate combine passes across all successful requests.
    pub reduction_passes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_successes_and_failures() {
        let metrics = SummaryMetrics::new();
        metrics.record_success(3, 1, 0);
        metrics.record_success(5, 0, 2);
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_summarized, 2);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.chunks_processed, 8);
        assert_eq!(snapshot.chunk_failures, 1);
        assert_eq!(snapshot.reduction_passes, 2);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(SummaryMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
