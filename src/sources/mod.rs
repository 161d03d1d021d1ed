use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

pub mod direct;
pub mod local;
pub mod ytdlp;

use crate::config::ToolsConfig;
use crate::pipeline::ItemRef;
use crate::utils::is_media_file;
use crate::ScribeError;

/// What a metadata lookup reports for one playlist reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistListing {
    /// Reference the listing was produced for
    pub reference: String,

    /// Raw display title, if the source knows one
    pub title: Option<String>,

    /// Ordered item references
    pub items: Vec<String>,
}

impl PlaylistListing {
    /// Listing used when metadata retrieval failed
    pub fn empty(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            title: None,
            items: Vec::new(),
        }
    }
}

/// Lists the items of a playlist reference
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn list(&self, reference: &str) -> Result<PlaylistListing, ScribeError>;
}

/// Downloads one item into a destination folder, returning the produced file
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, item: &ItemRef, destination: &Path) -> Result<PathBuf, ScribeError>;
}

/// A backend that can both list and fetch the references it supports
pub trait MediaSource: MetadataSource + Fetcher {
    /// Check if this source handles the given reference
    fn supports(&self, reference: &str) -> bool;

    /// Get the name of this source
    fn platform_name(&self) -> &'static str;
}

/// Rough classification of a user supplied reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A path on the local filesystem
    Local,
    /// An http(s) URL that points straight at a media file
    Direct,
    /// Anything yt-dlp has to resolve (YouTube, podcasts, ...)
    Platform,
}

/// Classify a reference the way the registry routes it
pub fn classify(reference: &str) -> SourceKind {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return match Url::parse(reference) {
            Ok(url) if is_media_file(Path::new(url.path())) => SourceKind::Direct,
            _ => SourceKind::Platform,
        };
    }

    let path = Path::new(reference);
    if path.exists() {
        return SourceKind::Local;
    }

    // Looks like a file path even if it does not exist yet
    let has_extension = path.extension().is_some();
    let has_path_separators = reference.contains('/') || reference.contains('\\');

    if has_extension || has_path_separators {
        SourceKind::Local
    } else {
        SourceKind::Platform
    }
}

/// Registry dispatching references to the source that supports them
pub struct SourceRegistry {
    sources: Vec<Arc<dyn MediaSource>>,
}

impl SourceRegistry {
    /// Create a registry with the local, direct and yt-dlp sources
    pub fn new(tools: &ToolsConfig) -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(local::LocalSource::new()));
        registry.register(Arc::new(direct::DirectSource::new()));
        registry.register(Arc::new(ytdlp::YtDlpSource::new(tools.yt_dlp.clone())));

        registry
    }

    /// Registry without any sources
    pub fn empty() -> Self {
        Self { sources: Vec::new() }
    }

    /// Register a new source; earlier registrations win
    pub fn register(&mut self, source: Arc<dyn MediaSource>) {
        self.sources.push(source);
    }

    /// Find a source that supports the given reference
    pub fn find(&self, reference: &str) -> Option<&dyn MediaSource> {
        self.sources
            .iter()
            .find(|source| source.supports(reference))
            .map(|source| source.as_ref())
    }

    /// List all registered sources
    pub fn list_platforms(&self) -> Vec<&'static str> {
        self.sources
            .iter()
            .map(|source| source.platform_name())
            .collect()
    }
}

#[async_trait]
impl MetadataSource for SourceRegistry {
    async fn list(&self, reference: &str) -> Result<PlaylistListing, ScribeError> {
        let source = self
            .find(reference)
            .ok_or_else(|| ScribeError::metadata(reference, "no source supports this reference"))?;

        tracing::debug!(reference, source = source.platform_name(), "Listing playlist");
        source.list(reference).await
    }
}

#[async_trait]
impl Fetcher for SourceRegistry {
    async fn fetch(&self, item: &ItemRef, destination: &Path) -> Result<PathBuf, ScribeError> {
        let source = self
            .find(&item.reference)
            .ok_or_else(|| ScribeError::fetch(&item.reference, "no source supports this reference"))?;

        source.fetch(item, destination).await
    }
}

/// Validate and normalize URLs
pub fn validate_url(url: &str) -> Result<Url, ScribeError> {
    let parsed = Url::parse(url)
        .map_err(|_| ScribeError::metadata(url, "invalid URL format"))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ScribeError::metadata(url, "URL must use HTTP or HTTPS protocol"));
    }

    Ok(parsed)
}
