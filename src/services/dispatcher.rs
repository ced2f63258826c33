//! Fire-and-forget handoff of job items to the compute worker.
//!
//! [`BatchDispatcher::dispatch`] only ever `try_send`s onto a bounded channel;
//! [`run_dispatch_loop`] drains it in a spawned task and does the network I/O.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::models::job::JobItem;
use crate::services::compute::{AnalyzeRequestItem, BatchAnalyzeRequest, ComputeWorker, DispatchError};

pub const DEFAULT_DISPATCH_CHUNK_SIZE: usize = 500;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// One network request's worth of items.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchBatch {
    pub job_id: Uuid,
    pub sequence: usize,
    pub request: BatchAnalyzeRequest,
}

/// What happened to a dispatch handoff. Never an error for the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReceipt {
    pub batches_queued: usize,
    pub batches_dropped: usize,
    pub items_queued: usize,
}

#[derive(Clone)]
pub struct BatchDispatcher {
    sender: mpsc::Sender<DispatchBatch>,
    chunk_size: usize,
}

impl BatchDispatcher {
    /// Create a dispatcher and the receiving end for [`run_dispatch_loop`].
    pub fn channel(capacity: usize, chunk_size: usize) -> (Self, mpsc::Receiver<DispatchBatch>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                chunk_size: chunk_size.max(1),
            },
            receiver,
        )
    }

    /// Queue items for delivery without waiting on the network.
    pub fn dispatch(&self, job_id: Uuid, items: &[JobItem]) -> DispatchReceipt {
        let mut receipt = DispatchReceipt::default();

        if items.is_empty() {
            tracing::warn!(job_id = %job_id, "Dispatch requested with no items, skipping");
            return receipt;
        }

        for (sequence, chunk) in items.chunks(self.chunk_size).enumerate() {
            let batch = DispatchBatch {
                job_id,
                sequence,
                request: BatchAnalyzeRequest {
                    requests: chunk
                        .iter()
                        .map(|item| AnalyzeRequestItem {
                            image_id: item.image_id,
                            task_name: item.task,
                            job_item_id: item.id,
                        })
                        .collect(),
                },
            };

            match self.sender.try_send(batch) {
                Ok(()) => {
                    receipt.batches_queued += 1;
                    receipt.items_queued += chunk.len();
                }
                Err(e) => {
                    let err = match e {
                        TrySendError::Full(_) => DispatchError::QueueFull,
                        TrySendError::Closed(_) => DispatchError::QueueClosed,
                    };
                    receipt.batches_dropped += 1;
                    metrics::counter!("dispatch_failures_total", "reason" => err.reason())
                        .increment(1);
                    tracing::warn!(
                        job_id = %job_id,
                        sequence,
                        items = chunk.len(),
                        error = %err,
                        "Dispatch unavailable, items stay pending"
                    );
                }
            }
        }

        metrics::gauge!("dispatch_queue_depth").set(self.queue_depth() as f64);
        receipt
    }

    /// Batches waiting to be sent.
    pub fn queue_depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Drain the dispatch channel, POSTing each batch to the compute worker.
///
/// Failures are logged and counted; items of a failed batch stay `pending`
/// and can be picked up out of band. Returns once every sender is dropped.
pub async fn run_dispatch_loop(
    mut receiver: mpsc::Receiver<DispatchBatch>,
    worker: Arc<dyn ComputeWorker>,
) {
    tracing::info!("Dispatch loop started");

    while let Some(batch) = receiver.recv().await {
        metrics::gauge!("dispatch_queue_depth").set(receiver.len() as f64);

        let start = Instant::now();
        let result = worker.submit_batch(&batch.request).await;
        metrics::histogram!("dispatch_request_seconds").record(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::counter!("dispatch_batches_sent_total").increment(1);
                tracing::info!(
                    job_id = %batch.job_id,
                    sequence = batch.sequence,
                    items = batch.request.requests.len(),
                    "Batch handed to compute worker"
                );
            }
            Err(e) => {
                metrics::counter!("dispatch_failures_total", "reason" => e.reason()).increment(1);
                tracing::warn!(
                    job_id = %batch.job_id,
                    sequence = batch.sequence,
                    items = batch.request.requests.len(),
                    error = %e,
                    "Compute worker dispatch failed"
                );
            }
        }
    }

    tracing::info!("Dispatch loop stopped");
}
