//! Locating intermediate outputs: reconstruction folders and checkpoints.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use sculpt_core::layout::CHECKPOINT_EXTENSION;
use sculpt_core::mesh::LATEST_CHECKPOINT;

use crate::error::PipelineError;

/// Name of the reconstruction folder the mapper normally writes first.
pub const PREFERRED_RECONSTRUCTION: &str = "0";

/// Pick the reconstruction folder under `sparse_dir`.
///
/// Prefers `sparse/0`; otherwise the first sub-directory in sorted order.
/// Fails with [`PipelineError::MissingArtifact`] if there is none. Reads
/// a single directory listing.
pub fn resolve_reconstruction_dir(sparse_dir: &Path) -> Result<PathBuf, PipelineError> {
    let preferred = sparse_dir.join(PREFERRED_RECONSTRUCTION);
    if preferred.is_dir() {
        return Ok(preferred);
    }

    let missing = || {
        PipelineError::MissingArtifact(format!("no reconstruction in {}", sparse_dir.display()))
    };

    let entries = match std::fs::read_dir(sparse_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(missing()),
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    candidates.into_iter().next().ok_or_else(missing)
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// Numeric part of a checkpoint stem (`iteration_000050000` -> 50000).
fn checkpoint_number(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(&format!(".{CHECKPOINT_EXTENSION}")).unwrap_or(name);
    let digits: String = stem
        .chars()
        .rev()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

/// Sort key for checkpoint names. Unnumbered names (`best.pth`) sort by
/// name ahead of every numbered one, which sort by iteration then name, so
/// the newest numbered checkpoint is always last.
fn checkpoint_key(name: &str) -> (bool, Option<u64>, &str) {
    let number = checkpoint_number(name);
    (number.is_some(), number, name)
}

fn checkpoint_order(a: &str, b: &str) -> Ordering {
    checkpoint_key(a).cmp(&checkpoint_key(b))
}

/// Checkpoint file names in `dir`, oldest first. A missing directory
/// yields an empty list.
pub async fn list_checkpoints(dir: &Path) -> Result<Vec<String>, PipelineError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == CHECKPOINT_EXTENSION) && path.is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort_by(|a, b| checkpoint_order(a, b));
    Ok(names)
}

/// Resolve a checkpoint selector to a file path.
///
/// `"latest"` picks the newest checkpoint; any other value names
/// `<selector>.pth` in `dir`. Fails with
/// [`PipelineError::CheckpointNotFound`] when nothing matches.
pub async fn find_checkpoint(dir: &Path, selector: &str) -> Result<PathBuf, PipelineError> {
    if selector == LATEST_CHECKPOINT {
        return list_checkpoints(dir)
            .await?
            .pop()
            .map(|name| dir.join(name))
            .ok_or_else(|| PipelineError::CheckpointNotFound(format!("no checkpoints in {}", dir.display())));
    }

    let path = dir.join(format!("{selector}.{CHECKPOINT_EXTENSION}"));
    if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
        Ok(path)
    } else {
        Err(PipelineError::CheckpointNotFound(path.display().to_string()))
    }
}
