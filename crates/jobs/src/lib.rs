//! Training job supervision.
//!
//! [`JobRegistry`] enforces one active job per project and hands out
//! [`JobController`]s. Each controller's trainer output is consumed by a
//! dedicated monitoring task that publishes progress through the shared
//! broadcaster.

pub mod config;
pub mod controller;
pub mod error;
pub mod launcher;
mod monitor;
pub mod registry;
pub mod signals;

pub use controller::{JobController, JobSnapshot, DEFAULT_STOP_GRACE};
pub use error::JobError;
pub use launcher::{NeuralangeloLauncher, TrainingLauncher};
pub use registry::{JobRegistry, PipelineGuard, PipelineKind};
