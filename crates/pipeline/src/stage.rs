//! One step of a sequential pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::runner::CommandSpec;

/// Builds a stage's command when the stage is reached, so it can depend
/// on artifacts produced by earlier stages.
pub type CommandBuilder = Box<dyn Fn() -> Result<CommandSpec, PipelineError> + Send + Sync>;

enum StageCommand {
    Fixed(CommandSpec),
    Deferred(CommandBuilder),
}

/// A named command plus the outputs it is expected to leave behind.
pub struct Stage {
    name: String,
    command: StageCommand,
    outputs: Vec<PathBuf>,
}

impl Stage {
    pub fn new(name: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            command: StageCommand::Fixed(command),
            outputs: Vec::new(),
        }
    }

    /// A stage whose command is resolved only when it is about to run.
    pub fn deferred<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> Result<CommandSpec, PipelineError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            command: StageCommand::Deferred(Box::new(build)),
            outputs: Vec::new(),
        }
    }

    /// Declare a path the stage must produce.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    /// Resolve the command to run.
    pub fn command(&self) -> Result<CommandSpec, PipelineError> {
        match &self.command {
            StageCommand::Fixed(spec) => Ok(spec.clone()),
            StageCommand::Deferred(build) => build(),
        }
    }

    /// First declared output that does not exist on disk.
    pub fn missing_output(&self) -> Option<&Path> {
        self.outputs
            .iter()
            .map(PathBuf::as_path)
            .find(|p| !p.exists())
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let command = match &self.command {
            StageCommand::Fixed(spec) => spec.display(),
            StageCommand::Deferred(_) => "<deferred>".to_string(),
        };
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("command", &command)
            .field("outputs", &self.outputs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_stage_builds_on_demand() {
        let stage = Stage::deferred("undistort", || {
            Err(PipelineError::MissingArtifact("sparse/0".into()))
        });

        assert!(matches!(stage.command(), Err(PipelineError::MissingArtifact(_))));
        assert!(format!("{stage:?}").contains("<deferred>"));
    }

    #[test]
    fn missing_output_reports_first_absent_path() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("database.db");
        std::fs::write(&present, b"").unwrap();
        let absent = dir.path().join("sparse");

        let stage = Stage::new("features", CommandSpec::new("true"))
            .with_output(&present)
            .with_output(&absent);

        assert_eq!(stage.missing_output(), Some(absent.as_path()));
    }
}
