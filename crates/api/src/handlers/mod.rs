pub mod mesh;
pub mod projects;
pub mod reconstruction;
pub mod training;

use std::future::Future;

use serde::Serialize;
use sculpt_core::error::CoreError;
use sculpt_core::job::JobState;
use sculpt_core::layout::ProjectLayout;
use sculpt_jobs::PipelineGuard;
use sculpt_pipeline::PipelineError;

use crate::error::AppResult;
use crate::state::AppState;

/// Body of a `202 Accepted` for work that continues in the background.
/// Progress is reported on the WebSocket stream.
#[derive(Debug, Serialize)]
pub struct PipelineAccepted {
    pub project: String,
    pub pipeline: &'static str,
    pub state: JobState,
}

/// Resolve `project` to its layout, rejecting unsafe ids (400) and
/// projects with no directory (404).
pub(crate) fn existing_project(state: &AppState, project: &str) -> AppResult<ProjectLayout> {
    let layout = ProjectLayout::new(&state.config.projects_dir, project)?;
    if !layout.exists() {
        return Err(CoreError::NotFound {
            entity: "Project",
            id: project.to_string(),
        }
        .into());
    }
    Ok(layout)
}

/// Run `work` on a background task that holds the project's pipeline
/// slot until it finishes.
pub(crate) fn spawn_pipeline<F, T>(guard: PipelineGuard, work: F) -> PipelineAccepted
where
    F: Future<Output = Result<T, PipelineError>> + Send + 'static,
    T: Send + 'static,
{
    let accepted = PipelineAccepted {
        project: guard.project().to_string(),
        pipeline: guard.kind().as_str(),
        state: JobState::Running,
    };

    tokio::spawn(async move {
        match work.await {
            Ok(_) => tracing::info!(project = guard.project(), pipeline = guard.kind().as_str(), "Pipeline finished"),
            Err(e) => tracing::error!(
                project = guard.project(),
                pipeline = guard.kind().as_str(),
                error = %e,
                "Pipeline failed",
            ),
        }
        drop(guard);
    });

    accepted
}
