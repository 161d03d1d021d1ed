use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{classify, validate_url, Fetcher, MediaSource, MetadataSource, PlaylistListing, SourceKind};
use crate::pipeline::ItemRef;
use crate::ScribeError;

/// Source for plain http(s) links to media files
pub struct DirectSource {
    client: reqwest::Client,
}

impl DirectSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

/// Decoded file name from the last URL path segment
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).ok()?;
    let name = decoded
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect::<String>();

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[async_trait]
impl MetadataSource for DirectSource {
    async fn list(&self, reference: &str) -> Result<PlaylistListing, ScribeError> {
        validate_url(reference)?;

        let title = file_name_from_url(reference).map(|name| {
            Path::new(&name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or(name)
        });

        Ok(PlaylistListing {
            reference: reference.to_string(),
            title,
            items: vec![reference.to_string()],
        })
    }
}

#[async_trait]
impl Fetcher for DirectSource {
    async fn fetch(&self, item: &ItemRef, destination: &Path) -> Result<PathBuf, ScribeError> {
        let file_name = file_name_from_url(&item.reference)
            .unwrap_or_else(|| format!("download_{}.mp4", &Uuid::new_v4().to_string()[..8]));
        let output_path = destination.join(file_name);

        tracing::debug!("Downloading {} to {}", item.reference, output_path.display());

        let response = self
            .client
            .get(&item.reference)
            .send()
            .await
            .map_err(|e| ScribeError::fetch(&item.reference, e))?;

        if !response.status().is_success() {
            return Err(ScribeError::fetch(
                &item.reference,
                format!("HTTP {}", response.status()),
            ));
        }

        if let Err(e) = write_body(response, &output_path, &item.reference).await {
            // A partial download is not a usable artifact
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(e);
        }

        Ok(output_path)
    }
}

async fn write_body(response: reqwest::Response, path: &Path, reference: &str) -> Result<(), ScribeError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ScribeError::fetch(reference, e))?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

impl MediaSource for DirectSource {
    fn supports(&self, reference: &str) -> bool {
        classify(reference) == SourceKind::Direct
    }

    fn platform_name(&self) -> &'static str {
        "Direct URL"
    }
}

impl Default for DirectSource {
    fn default() -> Self {
        Self::new()
    }
}
