use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::utils::extension_of;

/// File name of the per-playlist merged document
pub const MERGED_FILE_NAME: &str = "merged_transcript.txt";

/// Result of merging one playlist folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub path: PathBuf,
    pub entries: usize,
}

/// Header line written before each transcript
pub fn entry_header(title: &str) -> String {
    format!("=== {} ===", title)
}

/// Transcript files in `folder`, sorted by file name, excluding the merged document
pub fn list_transcripts(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut transcripts = Vec::new();

    for entry in fs_err::read_dir(folder)? {
        let path = entry?.path();
        let is_txt = extension_of(&path).as_deref() == Some("txt");
        let is_merged = path.file_name().and_then(|n| n.to_str()) == Some(MERGED_FILE_NAME);

        if is_txt && !is_merged && path.is_file() {
            transcripts.push(path);
        }
    }

    transcripts.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(transcripts)
}

/// Concatenate every transcript of a playlist folder into `merged_transcript.txt`
///
/// Returns `None` and writes nothing when the folder has no transcripts.
pub fn merge_playlist(folder: &Path) -> Result<Option<MergeOutcome>> {
    let transcripts = list_transcripts(folder)
        .with_context(|| format!("Failed to list transcripts in {}", folder.display()))?;

    if transcripts.is_empty() {
        tracing::info!(folder = %folder.display(), "No transcripts to merge");
        return Ok(None);
    }

    let mut merged = String::new();
    for path in &transcripts {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let body = fs_err::read_to_string(path)?;

        // Writing into a String cannot fail
        let _ = write!(merged, "{}\n\n{}\n\n", entry_header(&title), body);
    }

    let merged_path = folder.join(MERGED_FILE_NAME);
    fs_err::write(&merged_path, merged)?;

    tracing::info!(
        path = %merged_path.display(),
        entries = transcripts.len(),
        "Created merged transcript file"
    );

    Ok(Some(MergeOutcome {
        path: merged_path,
        entries: transcripts.len(),
    }))
}
