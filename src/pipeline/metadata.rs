use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::types::{ItemRef, PlaylistInfo};
use crate::sources::{MetadataSource, PlaylistListing};
use crate::utils::{sanitize_title, PLACEHOLDER_TITLE};
use crate::ScribeError;

/// Resolves playlist references into listings with bounded parallelism
pub struct MetadataResolver {
    source: Arc<dyn MetadataSource>,
    concurrency: usize,
}

impl MetadataResolver {
    pub fn new(source: Arc<dyn MetadataSource>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Resolve one reference; a listing without items is an error
    pub async fn resolve(&self, reference: &str) -> Result<PlaylistListing, ScribeError> {
        let listing = self.source.list(reference).await?;

        if listing.items.is_empty() {
            return Err(ScribeError::metadata(reference, "playlist lists no items"));
        }

        Ok(listing)
    }

    /// Resolve every reference, at most `concurrency` at a time, keeping input order
    ///
    /// Failed lookups, including playlists without items, are logged and come
    /// back as empty listings so each playlist still gets a folder and a
    /// "0 items" report.
    pub async fn resolve_all(&self, references: &[String]) -> Vec<PlaylistListing> {
        stream::iter(references.iter())
            .map(|reference| async move {
                match self.resolve(reference).await {
                    Ok(listing) => {
                        tracing::info!(
                            playlist = %reference,
                            items = listing.items.len(),
                            "Resolved playlist metadata"
                        );
                        listing
                    }
                    Err(e) => {
                        tracing::warn!(playlist = %reference, "Metadata retrieval failed: {}", e);
                        PlaylistListing::empty(reference.as_str())
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

/// Create one folder per listing under `root`, in listing order
///
/// The sanitized title is tried first, then `title_1`, `title_2` and so on.
/// Each attempt is an exclusive `create_dir`, so names already on disk
/// (from earlier runs or earlier listings of this run) are never reused.
pub fn allocate_folders(root: &Path, listings: Vec<PlaylistListing>) -> Result<Vec<PlaylistInfo>> {
    fs_err::create_dir_all(root)
        .with_context(|| format!("Failed to create output root {}", root.display()))?;

    let mut playlists = Vec::with_capacity(listings.len());

    for (index, listing) in listings.into_iter().enumerate() {
        let base = listing
            .title
            .as_deref()
            .map(sanitize_title)
            .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string());

        let (title, folder) = claim_folder(root, &base)?;

        let items = listing
            .items
            .into_iter()
            .enumerate()
            .map(|(position, reference)| ItemRef::new(index, position, reference))
            .collect::<Vec<_>>();

        tracing::info!(
            playlist = %listing.reference,
            folder = %folder.display(),
            "Playlist '{}' has {} items", title, items.len()
        );

        playlists.push(PlaylistInfo {
            index,
            reference: listing.reference,
            title,
            folder,
            items,
        });
    }

    Ok(playlists)
}

fn claim_folder(root: &Path, base: &str) -> Result<(String, PathBuf)> {
    let mut counter = 0usize;

    loop {
        let name = if counter == 0 {
            base.to_string()
        } else {
            format!("{}_{}", base, counter)
        };
        let candidate = root.join(&name);

        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok((name, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create playlist folder {}", candidate.display()))
            }
        }
    }
}
