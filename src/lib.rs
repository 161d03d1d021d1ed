//! Playlist Scribe - download media playlists and turn every item into a transcript
//!
//! The crate is organised around a staged pipeline: playlist metadata is resolved
//! concurrently, items are downloaded and converted to audio by bounded worker
//! pools, and a single dedicated worker feeds the audio to the transcriber before
//! the per-item transcripts of each playlist are merged into one document.

use std::path::PathBuf;

pub mod cli;
pub mod config;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod sources;
pub mod transcode;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, HandoffArg, LogFormat};
pub use config::Config;
pub use pipeline::{Pipeline, PlaylistInfo, RunSummary};
pub use sources::{Fetcher, MetadataSource, SourceRegistry};
pub use transcode::{FfmpegTranscoder, Transcoder};
pub use transcribe::{CommandTranscriber, Transcriber};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types raised by individual pipeline stages
///
/// Every variant carries enough context to locate the failing item. Stage
/// workers log these and move on; only `Config` is fatal to a run.
#[derive(thiserror::Error, Debug)]
pub enum ScribeError {
    #[error("Metadata unavailable for {reference}: {reason}")]
    Metadata { reference: String, reason: String },

    #[error("Fetch failed for {item}: {reason}")]
    Fetch { item: String, reason: String },

    #[error("Conversion failed for {}: {reason}", path.display())]
    Conversion { path: PathBuf, reason: String },

    #[error("Transcription failed for {}: {reason}", path.display())]
    Transcription { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("The {0} queue is closed")]
    QueueClosed(&'static str),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ScribeError {
    pub fn metadata(reference: impl Into<String>, reason: impl ToString) -> Self {
        Self::Metadata {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }

    pub fn fetch(item: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            item: item.into(),
            reason: reason.to_string(),
        }
    }

    pub fn conversion(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Conversion {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transcription(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Transcription {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
