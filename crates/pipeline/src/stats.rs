//! Reconstruction statistics read from the text model files.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::artifacts::resolve_reconstruction_dir;

pub const CAMERAS_FILE: &str = "cameras.txt";
pub const IMAGES_FILE: &str = "images.txt";
pub const POINTS_FILE: &str = "points3D.txt";

/// Counts extracted from a sparse reconstruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionStats {
    pub num_cameras: u64,
    pub num_images: u64,
    pub num_points: u64,
}

/// Count the lines of `path` that do not start with `#`.
///
/// Lines are read as raw bytes, one at a time. Returns 0 for a missing
/// file and the count so far when reading fails part way.
async fn count_records(path: &Path) -> u64 {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Statistics file unavailable");
            return 0;
        }
    };

    let mut lines = BufReader::new(file).split(b'\n');
    let mut count = 0;
    loop {
        match lines.next_segment().await {
            Ok(Some(line)) => {
                if line.first() != Some(&b'#') {
                    count += 1;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Statistics file read failed");
                break;
            }
        }
    }
    count
}

/// Read statistics from a reconstruction folder.
///
/// Each registered image occupies two lines in the images file, so its
/// record count is halved.
pub async fn read_model_statistics(model_dir: &Path) -> ReconstructionStats {
    ReconstructionStats {
        num_cameras: count_records(&model_dir.join(CAMERAS_FILE)).await,
        num_images: count_records(&model_dir.join(IMAGES_FILE)).await / 2,
        num_points: count_records(&model_dir.join(POINTS_FILE)).await,
    }
}

/// Resolve the reconstruction folder under `sparse_dir` and read its
/// statistics. `None` when no reconstruction exists.
pub async fn read_statistics(sparse_dir: &Path) -> Option<ReconstructionStats> {
    match resolve_reconstruction_dir(sparse_dir) {
        Ok(dir) => Some(read_model_statistics(&dir).await),
        Err(e) => {
            tracing::warn!(sparse_dir = %sparse_dir.display(), error = %e, "No statistics available");
            None
        }
    }
}
