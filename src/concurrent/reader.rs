//! Bounded fan-out / fan-in reader over a retriever's partitions

use super::sentinel::SentinelCoordinator;
use super::types::{CancellationToken, ConcurrencyConfig, QueueItem, ReadReport};
use crate::error::{Error, Result};
use crate::retriever::Retriever;
use crate::types::Record;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

/// What a finished task did
#[derive(Debug)]
enum TaskOutcome {
    Produced { partitions: usize },
    Consumed { partitions: usize, records: usize },
}

enum Event {
    Joined(Option<std::result::Result<Result<TaskOutcome>, JoinError>>),
    Cancelled,
    DeadlineExceeded,
}

type SharedQueue = Arc<Mutex<mpsc::Receiver<QueueItem>>>;

/// Reads the partitions of a stream on a bounded pool of tokio tasks
///
/// One producer task enumerates partitions onto a bounded queue; consumer
/// tasks take partitions off it and forward their records to the output
/// channel. Records of a partition keep their order; partitions interleave.
#[derive(Debug, Clone, Default)]
pub struct ConcurrentStreamReader {
    config: ConcurrencyConfig,
    cancel: CancellationToken,
}

impl ConcurrentStreamReader {
    /// Create a reader
    pub fn new(config: ConcurrencyConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use a caller-owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sizing in use
    pub fn config(&self) -> &ConcurrencyConfig {
        &self.config
    }

    /// Token cancelling reads of this reader
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Read every partition, collecting the records
    ///
    /// Records are dropped when the read fails.
    pub async fn read_all(
        &self,
        retriever: Arc<dyn Retriever>,
    ) -> Result<(Vec<Record>, ReadReport)> {
        let (tx, mut rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let collect = async {
            let mut records = Vec::new();
            while let Some(record) = rx.recv().await {
                records.push(record);
            }
            records
        };

        let (report, records) = tokio::join!(self.read(retriever, tx), collect);
        Ok((records, report?))
    }

    /// Read every partition, forwarding records to `output`
    ///
    /// Every spawned task has finished or been aborted when this returns.
    pub async fn read(
        &self,
        retriever: Arc<dyn Retriever>,
        output: mpsc::Sender<Record>,
    ) -> Result<ReadReport> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let started = Instant::now();
        let consumers = self.config.consumers();
        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let queue: SharedQueue = Arc::new(Mutex::new(queue_rx));
        let coordinator = Arc::new(SentinelCoordinator::new(consumers));

        info!(
            stream = %retriever.name(),
            consumers,
            queue_capacity = self.config.queue_capacity,
            "Starting concurrent read"
        );

        let mut tasks = JoinSet::new();
        tasks.spawn(produce(retriever.clone(), queue_tx, coordinator.clone()));
        for worker in 0..consumers {
            tasks.spawn(consume(
                worker,
                retriever.clone(),
                queue.clone(),
                output.clone(),
                coordinator.clone(),
            ));
        }
        drop(output);

        let deadline = self.config.deadline;
        let deadline_timer = async {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline_timer);

        let mut report = ReadReport::default();
        let interrupted = loop {
            let event = tokio::select! {
                joined = tasks.join_next() => Event::Joined(joined),
                () = self.cancel.cancelled() => Event::Cancelled,
                () = &mut deadline_timer => Event::DeadlineExceeded,
            };

            match event {
                Event::Joined(None) => break None,
                Event::Joined(Some(Ok(Ok(outcome)))) => match outcome {
                    TaskOutcome::Produced { partitions } => {
                        report.partitions_generated = partitions;
                    }
                    TaskOutcome::Consumed { partitions, records } => {
                        report.partitions_read += partitions;
                        report.records += records;
                    }
                },
                Event::Joined(Some(Ok(Err(error)))) => {
                    if coordinator.record_error(error) {
                        warn!(stream = %retriever.name(), "Worker failed, aborting read");
                        tasks.abort_all();
                    }
                }
                Event::Joined(Some(Err(join_error))) => {
                    if !join_error.is_cancelled()
                        && coordinator.record_error(Error::worker(join_error.to_string()))
                    {
                        tasks.abort_all();
                    }
                }
                Event::Cancelled => break Some(Error::Cancelled),
                Event::DeadlineExceeded => {
                    break Some(Error::DeadlineExceeded {
                        deadline_ms: deadline.map_or(0, |d| d.as_millis() as u64),
                    })
                }
            }
        };

        if let Some(error) = interrupted {
            tasks.shutdown().await;
            warn!(stream = %retriever.name(), error = %error, "Concurrent read interrupted");
            return Err(error);
        }
        if let Some(error) = coordinator.take_error() {
            return Err(error);
        }

        report.sentinels_enqueued = coordinator.sentinels_enqueued();
        report.workers_terminated = coordinator.workers_terminated();

        info!(
            stream = %retriever.name(),
            records = report.records,
            partitions = report.partitions_read,
            duration_ms = started.elapsed().as_millis() as u64,
            "Concurrent read complete"
        );
        Ok(report)
    }
}

async fn produce(
    retriever: Arc<dyn Retriever>,
    queue: mpsc::Sender<QueueItem>,
    coordinator: Arc<SentinelCoordinator>,
) -> Result<TaskOutcome> {
    let slices = retriever.stream_slices().await?;
    let partitions = slices.len();

    for slice in slices {
        queue
            .send(QueueItem::Partition(slice))
            .await
            .map_err(|_| Error::system("ConcurrentStreamReader", "partition queue closed"))?;
    }
    coordinator.enqueue_sentinels(&queue).await?;

    debug!(stream = %retriever.name(), partitions, "Partitions generated");
    Ok(TaskOutcome::Produced { partitions })
}

async fn consume(
    worker: usize,
    retriever: Arc<dyn Retriever>,
    queue: SharedQueue,
    output: mpsc::Sender<Record>,
    coordinator: Arc<SentinelCoordinator>,
) -> Result<TaskOutcome> {
    let mut partitions = 0;
    let mut records = 0;

    loop {
        let item = queue.lock().await.recv().await;
        match item {
            Some(QueueItem::Partition(slice)) => {
                for record in retriever.read_records(&slice).await? {
                    output.send(record).await.map_err(|_| {
                        Error::system("ConcurrentStreamReader", "record receiver dropped")
                    })?;
                    records += 1;
                }
                partitions += 1;
            }
            Some(QueueItem::Sentinel) => {
                coordinator.worker_terminated();
                debug!(worker, partitions, records, "Worker done");
                return Ok(TaskOutcome::Consumed { partitions, records });
            }
            // Producer gone without sentinels; its own result carries the cause
            None => return Ok(TaskOutcome::Consumed { partitions, records }),
        }
    }
}
