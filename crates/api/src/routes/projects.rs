use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{mesh, projects, reconstruction, training};
use crate::state::AppState;

/// Routes mounted at `/api/projects`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(projects::list_projects))
        .route("/{project}/reconstruction", post(reconstruction::start_reconstruction))
        .route(
            "/{project}/reconstruction/dense",
            post(reconstruction::start_dense_reconstruction),
        )
        .route("/{project}/train", post(training::start_training))
        .route("/{project}/train/pause", post(training::pause_training))
        .route("/{project}/train/resume", post(training::resume_training))
        .route("/{project}/train/stop", post(training::stop_training))
        .route("/{project}/train/status", get(training::training_status))
        .route("/{project}/checkpoints", get(projects::list_project_checkpoints))
        .route("/{project}/extract-mesh", post(mesh::extract_mesh))
        .route("/{project}/meshes/{file}/decimate", post(mesh::decimate_mesh))
        .route("/{project}/status", get(projects::project_status))
}
