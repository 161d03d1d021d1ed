use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::pool::StageHandler;
use super::types::{ArtifactStage, MediaFile};
use crate::transcode::{already_converted, Transcoder};
use crate::utils::extension_of;
use crate::ScribeError;

/// Audio files reported by the conversion stage, in completion order
#[derive(Clone, Default)]
pub struct HandoffList {
    files: Arc<Mutex<Vec<MediaFile>>>,
}

impl HandoffList {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, file: MediaFile) {
        let mut files = self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        files.push(file);
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|files| files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything collected so far, ordered by playlist then position
    pub fn take_sorted(&self) -> Vec<MediaFile> {
        let mut files = {
            let mut guard = self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        files.sort_by(|a, b| a.item.cmp(&b.item));
        files
    }
}

/// Converts raw downloads to audio and removes the raw copy
pub struct ConversionHandler {
    transcoder: Arc<dyn Transcoder>,
    handoff: HandoffList,
}

impl ConversionHandler {
    pub fn new(transcoder: Arc<dyn Transcoder>, handoff: HandoffList) -> Self {
        Self { transcoder, handoff }
    }
}

#[async_trait]
impl StageHandler<MediaFile> for ConversionHandler {
    fn describe(&self, file: &MediaFile) -> String {
        file.path.display().to_string()
    }

    async fn handle(&self, file: MediaFile) -> Result<(), ScribeError> {
        debug_assert_eq!(file.stage, ArtifactStage::Raw);
        let MediaFile { item, path, .. } = file;

        if already_converted(&path, self.transcoder.target_extension()) {
            tracing::debug!(item = %item, "Already in target format, no conversion needed");
            self.handoff.push(MediaFile::audio(item, path));
            return Ok(());
        }

        tracing::info!(item = %item, "Converting {}", path.display());
        let audio = self.transcoder.convert(&path).await?;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(item = %item, "Converted but could not delete raw file: {}", e);
        } else {
            tracing::debug!(item = %item, "Deleted raw file {}", path.display());
        }

        tracing::info!(item = %item, audio = %audio.display(), "Conversion complete");
        self.handoff.push(MediaFile::audio(item, audio));
        Ok(())
    }
}

/// Recursively collect files with the audio extension under `root`, sorted by path
///
/// Every file found is consumed by transcription, so `root` must be a folder
/// the current run created.
pub fn discover_audio(root: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs_err::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file()
                && extension_of(&path).is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}
