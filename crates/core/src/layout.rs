//! On-disk project layout.
//!
//! ```text
//! <projects_dir>/<project>/
//!   images/
//!   colmap/database.db
//!   colmap/sparse/<n>/{cameras,images,points3D}.txt
//!   colmap/dense/
//!   checkpoints/*.pth
//!   meshes/
//!   logs/
//!   neuralangelo_config.yaml
//! ```

use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Maximum length of a project identifier.
const MAX_PROJECT_ID_LEN: usize = 128;

/// File name of the rendered trainer configuration.
pub const TRAINING_CONFIG_FILE: &str = "neuralangelo_config.yaml";

/// Extension of trainer checkpoint files.
pub const CHECKPOINT_EXTENSION: &str = "pth";

/// Allowed project id characters: alphanumeric, hyphen, underscore, dot.
/// A leading dot is rejected so ids can never name `.` or `..`.
pub fn is_safe_project_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PROJECT_ID_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Paths of a single project's working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Resolve the layout for `project` under `projects_dir`.
    pub fn new(projects_dir: impl AsRef<Path>, project: &str) -> Result<Self, CoreError> {
        if !is_safe_project_id(project) {
            return Err(CoreError::Validation(format!(
                "invalid project identifier '{project}'"
            )));
        }
        Ok(Self {
            root: projects_dir.as_ref().join(project),
        })
    }

    /// Wrap an already-resolved project directory.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn colmap_dir(&self) -> PathBuf {
        self.root.join("colmap")
    }

    pub fn database_path(&self) -> PathBuf {
        self.colmap_dir().join("database.db")
    }

    pub fn sparse_dir(&self) -> PathBuf {
        self.colmap_dir().join("sparse")
    }

    pub fn dense_dir(&self) -> PathBuf {
        self.colmap_dir().join("dense")
    }

    pub fn fused_point_cloud(&self) -> PathBuf {
        self.dense_dir().join("fused.ply")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    pub fn meshes_dir(&self) -> PathBuf {
        self.root.join("meshes")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn training_config_path(&self) -> PathBuf {
        self.root.join(TRAINING_CONFIG_FILE)
    }

    /// Whether the project directory exists at all.
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Whether a sparse reconstruction workspace has been produced.
    pub fn has_reconstruction(&self) -> bool {
        self.sparse_dir().is_dir()
    }
}
