//! Push-path worker.
//!
//! Drains the queue filled by the webhook receiver and ingests each payload,
//! several at a time. Payloads for the same (device, subject) still serialize
//! on the pipeline's partition lock.

use crate::pipeline::IngestPipeline;
use futures::StreamExt;
use futures::stream;
use rollcall_core::Error;
use rollcall_network::PushedPayload;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Totals reported when the worker stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub payloads: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Payloads or events rejected as malformed
    pub rejected: usize,
    /// Payloads that hit a storage error
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    payloads: AtomicUsize,
    inserted: AtomicUsize,
    duplicates: AtomicUsize,
    rejected: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            payloads: self.payloads.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Consumer of pushed payloads.
pub struct IngestWorker {
    pipeline: Arc<IngestPipeline>,
    concurrency: usize,
}

impl IngestWorker {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        let concurrency = pipeline.config().concurrency;
        Self { pipeline, concurrency }
    }

    /// Process payloads until every sender is dropped and the queue is empty.
    ///
    /// Queued payloads were already acknowledged to their terminals. To stop
    /// the worker, stop the producers; the webhook receiver drops its sender
    /// when it returns.
    pub async fn run(self, receiver: mpsc::Receiver<PushedPayload>) -> WorkerStats {
        let counters = Counters::default();
        info!(concurrency = self.concurrency, "Ingest worker started");

        stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|payload| (payload, receiver))
        })
        .for_each_concurrent(self.concurrency, |pushed| self.handle(pushed, &counters))
        .await;

        let stats = counters.snapshot();
        info!(
            payloads = stats.payloads,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            rejected = stats.rejected,
            failed = stats.failed,
            "Ingest worker stopped"
        );
        stats
    }

    async fn handle(&self, pushed: PushedPayload, counters: &Counters) {
        counters.payloads.fetch_add(1, Ordering::Relaxed);
        match self.pipeline.ingest_payload(&pushed.device_id, &pushed.payload).await {
            Ok(report) => {
                counters.inserted.fetch_add(report.inserted, Ordering::Relaxed);
                counters.duplicates.fetch_add(report.duplicates, Ordering::Relaxed);
                counters.rejected.fetch_add(report.rejected, Ordering::Relaxed);
            }
            Err(err @ Error::Validation(_)) => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(device_id = %pushed.device_id, error = %err, "Rejected pushed payload");
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(device_id = %pushed.device_id, error = %err, "Failed to ingest pushed payload");
            }
        }
    }
}
