pub mod health;
pub mod projects;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /projects                                          project listing (GET)
/// /projects/{project}/reconstruction                 start sparse (+dense) run (POST)
/// /projects/{project}/reconstruction/dense           start dense-only run (POST)
/// /projects/{project}/train                          start training (POST)
/// /projects/{project}/train/pause                    suspend (POST)
/// /projects/{project}/train/resume                   continue (POST)
/// /projects/{project}/train/stop                     terminate (POST)
/// /projects/{project}/train/status                   job status (GET)
/// /projects/{project}/checkpoints                    checkpoint names (GET)
/// /projects/{project}/extract-mesh                   start mesh extraction (POST)
/// /projects/{project}/meshes/{file}/decimate         decimate a mesh (POST)
/// /projects/{project}/status                         project overview (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/projects", projects::router())
}
