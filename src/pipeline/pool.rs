//! Fixed-size worker pool over a FIFO queue.
//!
//! Workers pull items until the queue is closed. Closing happens once the
//! pool and every [`PoolSubmitter`] handed out by it have been dropped, which
//! is what [`BoundedPool::close_and_join`] waits for before returning the
//! stage's [`PoolReport`].

use async_trait::async_trait;
use futures_util::FutureExt;
use indicatif::ProgressBar;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use super::types::PoolReport;
use crate::ScribeError;

/// Items buffered per worker before `submit` starts waiting
const QUEUE_SLOTS_PER_WORKER: usize = 4;

/// Processing function of one pool-backed stage
#[async_trait]
pub trait StageHandler<T>: Send + Sync + 'static {
    /// Short description of an item for logs
    fn describe(&self, item: &T) -> String;

    /// Process one item
    async fn handle(&self, item: T) -> Result<(), ScribeError>;
}

#[derive(Default)]
struct PoolStats {
    attempted: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl PoolStats {
    fn to_report(&self, stage: &str) -> PoolReport {
        PoolReport {
            stage: stage.to_string(),
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable producer handle for a pool's queue
pub struct PoolSubmitter<T> {
    stage: &'static str,
    sender: mpsc::Sender<T>,
}

impl<T> Clone for PoolSubmitter<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage,
            sender: self.sender.clone(),
        }
    }
}

impl<T: Send> PoolSubmitter<T> {
    /// Enqueue an item, waiting while the queue is full
    pub async fn submit(&self, item: T) -> Result<(), ScribeError> {
        self.sender
            .send(item)
            .await
            .map_err(|_| ScribeError::QueueClosed(self.stage))
    }
}

/// N workers draining one queue
pub struct BoundedPool<T> {
    stage: &'static str,
    sender: mpsc::Sender<T>,
    workers: JoinSet<()>,
    stats: Arc<PoolStats>,
    progress: ProgressBar,
}

impl<T: Send + 'static> BoundedPool<T> {
    /// Start `workers` workers running `handler`
    pub fn spawn<H>(stage: &'static str, workers: usize, handler: H, progress: ProgressBar) -> Self
    where
        H: StageHandler<T>,
    {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(workers * QUEUE_SLOTS_PER_WORKER);
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);
        let stats = Arc::new(PoolStats::default());

        let mut set = JoinSet::new();
        for worker in 0..workers {
            set.spawn(worker_loop(
                stage,
                worker,
                Arc::clone(&receiver),
                Arc::clone(&handler),
                Arc::clone(&stats),
                progress.clone(),
            ));
        }

        tracing::debug!(stage, workers, "Started worker pool");

        Self {
            stage,
            sender,
            workers: set,
            stats,
            progress,
        }
    }

    /// Producer handle that can outlive borrows of the pool
    pub fn submitter(&self) -> PoolSubmitter<T> {
        PoolSubmitter {
            stage: self.stage,
            sender: self.sender.clone(),
        }
    }

    /// Enqueue an item, waiting while the queue is full
    pub async fn submit(&self, item: T) -> Result<(), ScribeError> {
        self.sender
            .send(item)
            .await
            .map_err(|_| ScribeError::QueueClosed(self.stage))
    }

    /// Stop accepting work, let the workers drain the queue and wait for all of them
    ///
    /// Returns only after every outstanding [`PoolSubmitter`] is dropped and
    /// every queued item has been attempted.
    pub async fn close_and_join(self) -> PoolReport {
        let Self {
            stage,
            sender,
            mut workers,
            stats,
            progress,
        } = self;

        drop(sender);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(stage, "Worker terminated abnormally: {}", e);
            }
        }

        progress.finish();

        let report = stats.to_report(stage);
        tracing::info!(
            stage,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Stage complete"
        );
        report
    }
}

async fn worker_loop<T, H>(
    stage: &'static str,
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
    handler: Arc<H>,
    stats: Arc<PoolStats>,
    progress: ProgressBar,
) where
    T: Send + 'static,
    H: StageHandler<T>,
{
    loop {
        // The lock is held only while waiting for the next item
        let next = { receiver.lock().await.recv().await };
        let Some(item) = next else {
            break;
        };

        let description = handler.describe(&item);
        stats.attempted.fetch_add(1, Ordering::Relaxed);
        progress.set_message(description.clone());

        match AssertUnwindSafe(handler.handle(item)).catch_unwind().await {
            Ok(Ok(())) => {
                stats.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(stage, worker, item = %description, "Skipping item: {}", e);
            }
            Err(_) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(stage, worker, item = %description, "Handler panicked, skipping item");
            }
        }

        progress.inc(1);
    }

    tracing::debug!(stage, worker, "Worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Recorder {
        active: AtomicUsize,
        peak: AtomicUsize,
        seen: std::sync::Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl StageHandler<u32> for Arc<Recorder> {
        fn describe(&self, item: &u32) -> String {
            format!("item {}", item)
        }

        async fn handle(&self, item: u32) -> Result<(), ScribeError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if item == 13 {
                panic!("unlucky item");
            }
            self.seen.lock().unwrap().push(item);
            if item % 5 == 0 {
                return Err(ScribeError::fetch(item.to_string(), "divisible by five"));
            }
            Ok(())
        }
    }

    fn recorder() -> Arc<Recorder> {
        Arc::new(Recorder {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_item_attempted_within_cap() {
        let rec = recorder();
        let pool = BoundedPool::spawn("test", 3, Arc::clone(&rec), ProgressBar::hidden());

        for i in 1..=20u32 {
            pool.submit(i).await.unwrap();
        }
        let report = pool.close_and_join().await;

        assert_eq!(report.attempted, 20);
        // 5, 10, 15, 20 return errors; 13 panics
        assert_eq!(report.failed, 5);
        assert_eq!(report.succeeded, 15);
        assert!(rec.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(rec.seen.lock().unwrap().len(), 19);
    }

    #[tokio::test]
    async fn join_waits_for_outstanding_submitters() {
        let rec = recorder();
        let pool = BoundedPool::spawn("test", 2, Arc::clone(&rec), ProgressBar::hidden());
        let submitter = pool.submitter();

        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            submitter.submit(7).await.unwrap();
            submitter.submit(8).await.unwrap();
        });

        let report = pool.close_and_join().await;
        producer.await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
    }

    #[tokio::test]
    async fn empty_pool_closes_immediately() {
        let pool: BoundedPool<u32> = BoundedPool::spawn("test", 4, recorder(), ProgressBar::hidden());
        let report = pool.close_and_join().await;
        assert_eq!(report, PoolReport::new("test"));
    }
}
