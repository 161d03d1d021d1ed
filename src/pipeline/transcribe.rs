//! Strictly serial transcription stage.
//!
//! One dedicated task owns the transcriber and drains a FIFO queue. Nothing
//! else holds a reference to the transcriber while the stage runs, so two
//! transcriptions can never overlap no matter how many producers exist.

use anyhow::{Context, Result};
use futures_util::FutureExt;
use indicatif::ProgressBar;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::{PoolReport, TranscriptionTask};
use crate::transcribe::Transcriber;
use crate::ScribeError;

const STAGE: &str = "transcription";
const QUEUE_CAPACITY: usize = 64;

/// Handle to the single transcription worker
pub struct TranscriptionStage<T> {
    sender: mpsc::Sender<TranscriptionTask>,
    worker: JoinHandle<(T, PoolReport)>,
}

impl<T: Transcriber + 'static> TranscriptionStage<T> {
    /// Move the transcriber into a freshly spawned worker
    pub fn spawn(transcriber: T, progress: ProgressBar) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let worker = tokio::spawn(worker_loop(transcriber, receiver, progress));

        Self { sender, worker }
    }

    /// Enqueue a task, waiting while the queue is full
    pub async fn submit(&self, task: TranscriptionTask) -> Result<(), ScribeError> {
        self.sender
            .send(task)
            .await
            .map_err(|_| ScribeError::QueueClosed(STAGE))
    }

    /// Close the queue, wait until every task was attempted and get the transcriber back
    pub async fn close_and_join(self) -> Result<(PoolReport, T)> {
        let Self { sender, worker } = self;
        drop(sender);

        let (transcriber, report) = worker.await.context("Transcription worker terminated abnormally")?;

        tracing::info!(
            stage = STAGE,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Stage complete"
        );
        Ok((report, transcriber))
    }
}

async fn worker_loop<T: Transcriber>(
    mut transcriber: T,
    mut receiver: mpsc::Receiver<TranscriptionTask>,
    progress: ProgressBar,
) -> (T, PoolReport) {
    let mut report = PoolReport::new(STAGE);

    while let Some(task) = receiver.recv().await {
        report.attempted += 1;
        progress.set_message(task.label.clone());
        let label = task.label.clone();

        match AssertUnwindSafe(run_task(&mut transcriber, task)).catch_unwind().await {
            Ok(Ok(())) => report.succeeded += 1,
            Ok(Err(e)) => {
                report.failed += 1;
                tracing::warn!(stage = STAGE, item = %label, "Transcription skipped: {}", e);
            }
            Err(_) => {
                report.failed += 1;
                tracing::error!(stage = STAGE, item = %label, "Transcriber panicked, skipping item");
            }
        }

        progress.inc(1);
    }

    progress.finish();
    (transcriber, report)
}

/// Transcribe one task; the audio file is removed whatever the outcome
pub async fn run_task<T: Transcriber + ?Sized>(
    transcriber: &mut T,
    task: TranscriptionTask,
) -> Result<(), ScribeError> {
    tracing::info!(stage = STAGE, item = %task.label, "Starting transcription for {}", task.audio.display());

    let result = match transcriber.transcribe(&task.audio).await {
        Ok(text) => tokio::fs::write(&task.transcript, text)
            .await
            .map_err(ScribeError::from),
        Err(e) => Err(e),
    };

    if result.is_ok() {
        tracing::info!(stage = STAGE, item = %task.label, "Transcript saved to {}", task.transcript.display());
    }

    match tokio::fs::remove_file(&task.audio).await {
        Ok(()) => tracing::debug!(stage = STAGE, "Deleted intermediate audio {}", task.audio.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(stage = STAGE, "Could not delete {}: {}", task.audio.display(), e),
    }

    result
}
