//! Run orchestration.
//!
//! Metadata is resolved for every playlist first, then folders are
//! allocated in input order. Downloads stream into the conversion pool, and
//! both pools are drained before a single worker transcribes the produced
//! audio. Merging happens last, one playlist at a time.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

pub mod convert;
pub mod download;
pub mod metadata;
pub mod pool;
pub mod transcribe;
pub mod types;

pub use types::{ArtifactStage, ItemRef, MediaFile, PlaylistInfo, PoolReport, TranscriptionTask};

use crate::config::{Config, HandoffMode, PipelineConfig};
use crate::merge::merge_playlist;
use crate::output::ProgressReporter;
use crate::sources::{Fetcher, MetadataSource, SourceRegistry};
use crate::transcode::{FfmpegTranscoder, Transcoder};
use crate::transcribe::{CommandTranscriber, Transcriber};
use convert::{discover_audio, ConversionHandler, HandoffList};
use download::{DownloadHandler, DownloadJob};
use metadata::{allocate_folders, MetadataResolver};
use pool::BoundedPool;
use transcribe::TranscriptionStage;

/// Outcome for one playlist of a run
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistSummary {
    pub reference: String,
    pub title: String,
    pub folder: PathBuf,
    /// Items listed by the metadata source
    pub items: usize,
    /// Transcripts that made it into the merged document
    pub transcripts: usize,
    pub merged: Option<PathBuf>,
}

/// Everything a finished run reports
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub playlists: Vec<PlaylistSummary>,
    /// Download, conversion and transcription reports, in stage order
    pub stages: Vec<PoolReport>,
}

impl RunSummary {
    pub fn total_items(&self) -> usize {
        self.playlists.iter().map(|p| p.items).sum()
    }

    pub fn total_transcripts(&self) -> usize {
        self.playlists.iter().map(|p| p.transcripts).sum()
    }

    pub fn stage(&self, name: &str) -> Option<&PoolReport> {
        self.stages.iter().find(|report| report.stage == name)
    }

    /// Wall-clock duration in seconds
    pub fn elapsed_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Main playlist transcription pipeline
pub struct Pipeline<T = Box<dyn Transcriber>> {
    settings: PipelineConfig,
    source: Arc<dyn MetadataSource>,
    fetcher: Arc<dyn Fetcher>,
    transcoder: Arc<dyn Transcoder>,
    transcriber: T,
    progress: ProgressReporter,
}

impl Pipeline {
    /// Wire the registry sources, ffmpeg and the configured transcriber command
    pub fn from_config(config: &Config) -> Self {
        let registry = Arc::new(SourceRegistry::new(&config.tools));
        let source: Arc<dyn MetadataSource> = registry.clone();
        let fetcher: Arc<dyn Fetcher> = registry;
        let transcriber: Box<dyn Transcriber> = Box::new(CommandTranscriber::new(&config.transcriber));

        Self::new(
            config.pipeline.clone(),
            source,
            fetcher,
            Arc::new(FfmpegTranscoder::new(&config.tools)),
            transcriber,
        )
    }
}

impl<T: Transcriber + 'static> Pipeline<T> {
    pub fn new(
        settings: PipelineConfig,
        source: Arc<dyn MetadataSource>,
        fetcher: Arc<dyn Fetcher>,
        transcoder: Arc<dyn Transcoder>,
        transcriber: T,
    ) -> Self {
        Self {
            settings,
            source,
            fetcher,
            transcoder,
            transcriber,
            progress: ProgressReporter::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Process every playlist reference and merge the transcripts per playlist
    ///
    /// Per-item failures are logged and counted in the stage reports. Only
    /// invalid settings or an output root that cannot be created fail the run.
    pub async fn run(self, references: &[String]) -> Result<RunSummary> {
        let started_at = Utc::now();

        let Self {
            settings,
            source,
            fetcher,
            transcoder,
            transcriber,
            progress,
        } = self;

        settings.validate()?;
        let root = settings.resolved_output_root()?;

        tracing::info!(
            playlists = references.len(),
            root = %root.display(),
            transcriber = transcriber.name(),
            "Starting run"
        );

        let resolver = MetadataResolver::new(source, settings.metadata_concurrency);
        let listings = resolver.resolve_all(references).await;
        let playlists = allocate_folders(&root, listings)?;
        let total_items: usize = playlists.iter().map(|p| p.items.len()).sum();

        tracing::info!(items = total_items, "Metadata resolved for {} playlists", playlists.len());

        // Conversion has to be running before the first download completes
        let handoff = HandoffList::new();
        let audio_extension = transcoder.target_extension().to_string();
        let conversion = BoundedPool::spawn(
            "conversion",
            settings.conversion_concurrency,
            ConversionHandler::new(transcoder, handoff.clone()),
            progress.stage("Converting", total_items),
        );
        let downloads = BoundedPool::spawn(
            "download",
            settings.download_concurrency,
            DownloadHandler::new(fetcher, conversion.submitter()),
            progress.stage("Downloading", total_items),
        );

        for playlist in &playlists {
            for item in &playlist.items {
                downloads
                    .submit(DownloadJob {
                        item: item.clone(),
                        destination: playlist.folder.clone(),
                    })
                    .await?;
            }
        }

        let download_report = downloads.close_and_join().await;
        let conversion_report = conversion.close_and_join().await;

        let tasks: Vec<TranscriptionTask> = match settings.handoff {
            HandoffMode::Memory => handoff
                .take_sorted()
                .into_iter()
                .map(|file| TranscriptionTask::for_audio(&file.path, file.item.to_string()))
                .collect(),
            HandoffMode::Rescan => {
                // Only folders allocated by this run; anything else under the root is not ours
                let mut tasks = Vec::new();
                for playlist in &playlists {
                    let found = discover_audio(&playlist.folder, &audio_extension).with_context(|| {
                        format!("Failed to scan {} for audio files", playlist.folder.display())
                    })?;
                    tasks.extend(found.into_iter().map(|path| {
                        let label = path
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        TranscriptionTask::for_audio(&path, label)
                    }));
                }
                tasks
            }
        };

        tracing::info!(files = tasks.len(), handoff = ?settings.handoff, "Starting transcription");

        let stage = TranscriptionStage::spawn(transcriber, progress.stage("Transcribing", tasks.len()));
        for task in tasks {
            stage.submit(task).await?;
        }
        let (transcription_report, _transcriber) = stage.close_and_join().await?;

        let mut summaries = Vec::with_capacity(playlists.len());
        for playlist in playlists {
            let merged = match merge_playlist(&playlist.folder) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(folder = %playlist.folder.display(), "Merge failed: {:#}", e);
                    None
                }
            };

            summaries.push(PlaylistSummary {
                items: playlist.items.len(),
                transcripts: merged.as_ref().map_or(0, |m| m.entries),
                merged: merged.map(|m| m.path),
                reference: playlist.reference,
                title: playlist.title,
                folder: playlist.folder,
            });
        }

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            playlists: summaries,
            stages: vec![download_report, conversion_report, transcription_report],
        };

        tracing::info!(
            transcripts = summary.total_transcripts(),
            items = summary.total_items(),
            "Run complete in {:.1}s",
            summary.elapsed_seconds()
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(stage: &str, succeeded: usize) -> PoolReport {
        PoolReport {
            stage: stage.to_string(),
            attempted: succeeded,
            succeeded,
            failed: 0,
        }
    }

    #[test]
    fn summary_totals_add_up_across_playlists() {
        let started_at = Utc::now();
        let summary = RunSummary {
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(2500),
            playlists: vec![
                PlaylistSummary {
                    reference: "a".into(),
                    title: "A".into(),
                    folder: PathBuf::from("A"),
                    items: 3,
                    transcripts: 2,
                    merged: Some(PathBuf::from("A/merged_transcript.txt")),
                },
                PlaylistSummary {
                    reference: "b".into(),
                    title: "B".into(),
                    folder: PathBuf::from("B"),
                    items: 0,
                    transcripts: 0,
                    merged: None,
                },
            ],
            stages: vec![report("download", 2), report("transcription", 2)],
        };

        assert_eq!(summary.total_items(), 3);
        assert_eq!(summary.total_transcripts(), 2);
        assert_eq!(summary.stage("transcription").map(|r| r.succeeded), Some(2));
        assert!(summary.stage("conversion").is_none());
        assert!((summary.elapsed_seconds() - 2.5).abs() < f64::EPSILON);
    }
}
