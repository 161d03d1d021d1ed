use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One downloadable unit, owned by exactly one playlist
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemRef {
    /// Index of the owning playlist in the run
    pub playlist: usize,

    /// Position within the playlist listing
    pub position: usize,

    /// Opaque source reference (URL or path)
    pub reference: String,
}

impl ItemRef {
    pub fn new(playlist: usize, position: usize, reference: impl Into<String>) -> Self {
        Self {
            playlist,
            position,
            reference: reference.into(),
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{} {}", self.playlist, self.position + 1, self.reference)
    }
}

/// A resolved playlist with its allocated output folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistInfo {
    /// Position of the playlist in the run
    pub index: usize,

    /// Reference the playlist was resolved from
    pub reference: String,

    /// Sanitized, collision-free folder name
    pub title: String,

    /// `<output_root>/<title>`
    pub folder: PathBuf,

    /// Ordered items
    pub items: Vec<ItemRef>,
}

/// Pipeline stage a media file currently sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactStage {
    /// As produced by the fetcher
    Raw,
    /// Converted to the transcriber's audio format
    Audio,
}

/// A file on disk that belongs to one item and one stage
///
/// Moved by value from stage to stage; whoever holds it owns the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub item: ItemRef,
    pub path: PathBuf,
    pub stage: ArtifactStage,
}

impl MediaFile {
    pub fn raw(item: ItemRef, path: PathBuf) -> Self {
        Self {
            item,
            path,
            stage: ArtifactStage::Raw,
        }
    }

    pub fn audio(item: ItemRef, path: PathBuf) -> Self {
        Self {
            item,
            path,
            stage: ArtifactStage::Audio,
        }
    }
}

/// Work unit of the transcription stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionTask {
    /// Audio file consumed by the attempt
    pub audio: PathBuf,

    /// Where the transcript is written on success
    pub transcript: PathBuf,

    /// Short description for logs
    pub label: String,
}

impl TranscriptionTask {
    /// Task writing `<audio stem>.txt` next to the audio file
    pub fn for_audio(audio: impl AsRef<Path>, label: impl Into<String>) -> Self {
        let audio = audio.as_ref().to_path_buf();
        Self {
            transcript: audio.with_extension("txt"),
            audio,
            label: label.into(),
        }
    }
}

/// Per-stage accounting once a pool has drained
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReport {
    pub stage: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl PoolReport {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Self::default()
        }
    }
}
