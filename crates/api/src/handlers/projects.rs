use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use sculpt_core::layout::{is_safe_project_id, ProjectLayout};
use sculpt_jobs::JobSnapshot;
use sculpt_pipeline::artifacts::list_checkpoints;
use sculpt_pipeline::stats::read_statistics;
use sculpt_pipeline::ReconstructionStats;

use crate::error::{AppError, AppResult};
use crate::handlers::existing_project;
use crate::response::DataResponse;
use crate::state::AppState;

/// Aggregate view of one project.
#[derive(Debug, Serialize)]
pub struct ProjectStatus {
    pub project: String,
    pub training: JobSnapshot,
    pub checkpoints: Vec<String>,
    pub has_reconstruction: bool,
    pub reconstruction: Option<ReconstructionStats>,
    /// Pipeline currently holding the project, if any.
    pub active_pipeline: Option<&'static str>,
}

/// One entry of the project listing.
#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub project: String,
    pub training: JobSnapshot,
    pub has_reconstruction: bool,
    pub active_pipeline: Option<&'static str>,
}

/// GET /api/projects
///
/// Every project directory under the projects root, sorted by name.
/// Entries that are not directories or do not carry a valid project id
/// are skipped.
pub async fn list_projects(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let projects_dir = &state.config.projects_dir;
    let mut entries = match tokio::fs::read_dir(projects_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(DataResponse { data: Vec::<ProjectSummary>::new() }));
        }
        Err(e) => {
            return Err(AppError::InternalError(format!(
                "cannot read projects directory {}: {e}",
                projects_dir.display()
            )));
        }
    };

    let mut names = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                return Err(AppError::InternalError(format!(
                    "cannot read projects directory {}: {e}",
                    projects_dir.display()
                )));
            }
        };
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if is_safe_project_id(&name) && entry.path().is_dir() {
            names.push(name);
        }
    }
    names.sort();

    let summaries: Vec<ProjectSummary> = names
        .into_iter()
        .map(|project| ProjectSummary {
            training: state.registry.status(&project),
            has_reconstruction: ProjectLayout::from_root(projects_dir.join(&project)).has_reconstruction(),
            active_pipeline: state.registry.active_pipeline(&project).map(|kind| kind.as_str()),
            project,
        })
        .collect();

    Ok(Json(DataResponse { data: summaries }))
}

/// GET /api/projects/{project}/checkpoints
///
/// Checkpoint file names, oldest first.
pub async fn list_project_checkpoints(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> AppResult<impl IntoResponse> {
    let layout = existing_project(&state, &project)?;
    let checkpoints = list_checkpoints(&layout.checkpoints_dir()).await?;
    Ok(Json(DataResponse { data: checkpoints }))
}

/// GET /api/projects/{project}/status
pub async fn project_status(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> AppResult<impl IntoResponse> {
    let layout = existing_project(&state, &project)?;

    let checkpoints = list_checkpoints(&layout.checkpoints_dir()).await?;
    let reconstruction = read_statistics(&layout.sparse_dir()).await;

    let status = ProjectStatus {
        training: state.registry.status(&project),
        checkpoints,
        has_reconstruction: layout.has_reconstruction(),
        reconstruction,
        active_pipeline: state.registry.active_pipeline(&project).map(|kind| kind.as_str()),
        project,
    };

    Ok(Json(DataResponse { data: status }))
}
