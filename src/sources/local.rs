use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{classify, Fetcher, MediaSource, MetadataSource, PlaylistListing, SourceKind};
use crate::pipeline::ItemRef;
use crate::utils::{is_media_file, is_resource_fork};
use crate::ScribeError;

/// Local folders and files
///
/// A folder is a playlist of the media files directly inside it; a single
/// file is a one-item playlist. Fetching copies into the playlist folder so
/// the pipeline never deletes the user's originals.
pub struct LocalSource;

impl LocalSource {
    pub fn new() -> Self {
        Self
    }

    async fn list_folder(&self, folder: &Path) -> Result<Vec<String>, ScribeError> {
        let mut entries = fs::read_dir(folder).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || is_resource_fork(&path) || !is_media_file(&path) {
                continue;
            }
            files.push(absolute(&path));
        }

        files.sort();
        Ok(files.into_iter().map(|p| p.to_string_lossy().into_owned()).collect())
    }
}

/// Whether another media file in the same folder has the same stem
async fn shares_stem_with_sibling(source: &Path) -> bool {
    let (Some(parent), Some(stem)) = (source.parent(), source.file_stem()) else {
        return false;
    };
    let Ok(mut entries) = fs::read_dir(parent).await else {
        return false;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path != source && path.file_stem() == Some(stem) && is_media_file(&path) {
            return true;
        }
    }
    false
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[async_trait]
impl MetadataSource for LocalSource {
    async fn list(&self, reference: &str) -> Result<PlaylistListing, ScribeError> {
        let path = Path::new(reference);

        let metadata = fs::metadata(path)
            .await
            .map_err(|e| ScribeError::metadata(reference, format!("cannot access path: {}", e)))?;

        let resolved = absolute(path);
        let title = if metadata.is_dir() {
            resolved.file_name()
        } else {
            resolved.file_stem()
        }
        .map(|name| name.to_string_lossy().into_owned());

        let items = if metadata.is_dir() {
            self.list_folder(path)
                .await
                .map_err(|e| ScribeError::metadata(reference, e))?
        } else if is_media_file(path) {
            vec![absolute(path).to_string_lossy().into_owned()]
        } else {
            return Err(ScribeError::metadata(reference, "not an audio or video file"));
        };

        Ok(PlaylistListing {
            reference: reference.to_string(),
            title,
            items,
        })
    }
}

#[async_trait]
impl Fetcher for LocalSource {
    async fn fetch(&self, item: &ItemRef, destination: &Path) -> Result<PathBuf, ScribeError> {
        let source = Path::new(&item.reference);
        let file_name = source
            .file_name()
            .ok_or_else(|| ScribeError::fetch(&item.reference, "path has no file name"))?;

        // `talk.mp4` and `talk.mkv` would both convert to `talk.mp3`
        let disambiguate = shares_stem_with_sibling(source).await;
        let target = match (source.file_stem(), source.extension()) {
            (Some(stem), Some(ext)) if disambiguate => {
                let ext = ext.to_string_lossy();
                destination.join(format!("{} [{}].{}", stem.to_string_lossy(), ext, ext))
            }
            _ => destination.join(file_name),
        };

        if target == source {
            return Err(ScribeError::fetch(&item.reference, "source already lives in the output folder"));
        }

        let metadata = fs::metadata(source)
            .await
            .map_err(|e| ScribeError::fetch(&item.reference, e))?;
        if metadata.len() == 0 {
            return Err(ScribeError::fetch(&item.reference, "file is empty"));
        }

        tracing::debug!("Copying {} -> {}", source.display(), target.display());
        fs::copy(source, &target)
            .await
            .map_err(|e| ScribeError::fetch(&item.reference, e))?;

        Ok(target)
    }
}

impl MediaSource for LocalSource {
    fn supports(&self, reference: &str) -> bool {
        classify(reference) == SourceKind::Local
    }

    fn platform_name(&self) -> &'static str {
        "Local File"
    }
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new()
    }
}
