use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::ToolsConfig;
use crate::utils::extension_of;
use crate::ScribeError;

/// Converts a downloaded media file into the audio format the transcriber reads
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Extension (without dot) of the files this transcoder produces
    fn target_extension(&self) -> &str;

    /// Convert `raw` into a sibling audio file and return its path
    async fn convert(&self, raw: &Path) -> Result<PathBuf, ScribeError>;
}

/// Sibling path carrying the target extension
pub fn audio_path_for(raw: &Path, extension: &str) -> PathBuf {
    raw.with_extension(extension)
}

/// Whether `raw` is already in the target format
pub fn already_converted(raw: &Path, extension: &str) -> bool {
    extension_of(raw).is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Transcoder running the ffmpeg command line
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    extension: String,
    bitrate: String,
    sample_rate: u32,
    channels: u8,
}

impl FfmpegTranscoder {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            ffmpeg_path: tools.ffmpeg.clone(),
            extension: tools.audio_format.trim_start_matches('.').to_lowercase(),
            bitrate: tools.audio_bitrate.clone(),
            sample_rate: tools.sample_rate,
            channels: tools.channels,
        }
    }

    /// Builds ffmpeg arguments for audio extraction
    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            output.to_string_lossy().to_string(),
        ]
    }
}

/// Last few lines of ffmpeg's stderr; the banner before them is noise
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn target_extension(&self) -> &str {
        &self.extension
    }

    async fn convert(&self, raw: &Path) -> Result<PathBuf, ScribeError> {
        let output_path = audio_path_for(raw, &self.extension);
        tracing::debug!("Converting {} to {}", raw.display(), self.extension);

        let output = Command::new(&self.ffmpeg_path)
            .args(self.build_args(raw, &output_path))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ScribeError::conversion(raw, format!("could not run {}: {}", self.ffmpeg_path, e)))?;

        if !output.status.success() {
            // ffmpeg may have started writing before it failed
            match tokio::fs::remove_file(&output_path).await {
                Ok(()) => tracing::debug!("Removed partial output {}", output_path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Could not remove partial output {}: {}", output_path.display(), e),
            }

            return Err(ScribeError::conversion(
                raw,
                format!("ffmpeg exited with {}: {}", output.status, stderr_tail(&output.stderr)),
            ));
        }

        Ok(output_path)
    }
}
