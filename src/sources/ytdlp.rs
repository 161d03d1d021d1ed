use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{Fetcher, MediaSource, MetadataSource, PlaylistListing};
use crate::pipeline::ItemRef;
use crate::ScribeError;

/// Playlist and video source backed by yt-dlp
pub struct YtDlpSource {
    yt_dlp_path: String,
}

impl YtDlpSource {
    pub fn new(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
        }
    }

    /// Flat playlist dump; entries are listed without resolving each video
    async fn dump_listing(&self, reference: &str) -> Result<Value, ScribeError> {
        tracing::debug!("Extracting playlist info for: {}", reference);

        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--flat-playlist",
                "--dump-single-json",
                "--no-warnings",
                reference,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ScribeError::metadata(reference, format!("could not run {}: {}", self.yt_dlp_path, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ScribeError::metadata(reference, format!("yt-dlp failed: {}", error.trim())));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ScribeError::metadata(reference, format!("unreadable yt-dlp output: {}", e)))
    }
}

/// Turn a yt-dlp JSON dump into a listing
///
/// A playlist yields its entries in order; anything else is a single video
/// and becomes a one-item playlist.
pub fn parse_listing(reference: &str, info: &Value) -> PlaylistListing {
    let title = info["title"]
        .as_str()
        .or_else(|| info["playlist_title"].as_str())
        .map(|s| s.to_string());

    let items = match info["entries"].as_array() {
        Some(entries) => entries
            .iter()
            .filter_map(|entry| {
                entry["webpage_url"]
                    .as_str()
                    .or_else(|| entry["url"].as_str())
                    .map(|s| s.to_string())
            })
            .collect(),
        None => {
            let url = info["webpage_url"].as_str().unwrap_or(reference);
            vec![url.to_string()]
        }
    };

    PlaylistListing {
        reference: reference.to_string(),
        title,
        items,
    }
}

#[async_trait]
impl MetadataSource for YtDlpSource {
    async fn list(&self, reference: &str) -> Result<PlaylistListing, ScribeError> {
        let info = self.dump_listing(reference).await?;
        Ok(parse_listing(reference, &info))
    }
}

#[async_trait]
impl Fetcher for YtDlpSource {
    async fn fetch(&self, item: &ItemRef, destination: &Path) -> Result<PathBuf, ScribeError> {
        tracing::debug!("Downloading {} into {}", item.reference, destination.display());

        let template = destination
            .join("%(title)s [%(id)s].%(ext)s")
            .to_string_lossy()
            .into_owned();
        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--format",
                "best",
                "--merge-output-format",
                "mp4",
                "--no-playlist",
                "--no-warnings",
                "--output",
                template.as_str(),
                // Print the final path after any merge/move, and still download
                "--print",
                "after_move:filepath",
                "--no-simulate",
                item.reference.as_str(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ScribeError::fetch(&item.reference, format!("could not run {}: {}", self.yt_dlp_path, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ScribeError::fetch(&item.reference, format!("yt-dlp failed: {}", error.trim())));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ScribeError::fetch(&item.reference, "yt-dlp did not report a file"))?;

        if !path.is_file() {
            return Err(ScribeError::fetch(
                &item.reference,
                format!("reported file is missing: {}", path.display()),
            ));
        }

        Ok(path)
    }
}

impl MediaSource for YtDlpSource {
    fn supports(&self, reference: &str) -> bool {
        let reference = reference.to_lowercase();
        reference.starts_with("http://") || reference.starts_with("https://")
    }

    fn platform_name(&self) -> &'static str {
        "yt-dlp"
    }
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}
