//! Shared domain types for the Sculpt reconstruction backend.
//!
//! This crate has no internal dependencies so it can be used by the
//! pipeline, job and transport crates alike.

pub mod error;
pub mod job;
pub mod layout;
pub mod mesh;
pub mod progress;
pub mod reconstruction;
pub mod training;
pub mod types;

pub use error::CoreError;
pub use job::JobState;
pub use layout::ProjectLayout;
pub use progress::{parse_progress_line, TrainingProgress};
