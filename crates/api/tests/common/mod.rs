#![allow(dead_code)]

use std::path::Path;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use sculpt_api::config::ServerConfig;
use sculpt_api::router::build_app_router;
use sculpt_api::state::AppState;
use sculpt_core::layout::ProjectLayout;

/// Build a test `ServerConfig` rooted at `root`.
///
/// Tool binaries point into `root/bin`, which starts empty, so every
/// external tool is unavailable until a test installs a stand-in.
pub fn test_config(root: &Path) -> ServerConfig {
    let bin = root.join("bin");
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        projects_dir: root.join("projects"),
        colmap_bin: bin.join("colmap").display().to_string(),
        neuralangelo_dir: root.join("neuralangelo"),
        python_bin: bin.join("python").display().to_string(),
        mesh_tool_bin: bin.join("mesh-tool").display().to_string(),
        heartbeat_interval_secs: 30,
        stop_grace_secs: 1,
    }
}

/// Application wired against a scratch directory.
pub struct TestApp {
    pub root: TempDir,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        for dir in ["bin", "projects", "neuralangelo"] {
            std::fs::create_dir_all(root.path().join(dir)).unwrap();
        }

        let config = test_config(root.path());
        let state = AppState::from_config(config.clone());
        let router = build_app_router(state.clone(), &config);

        Self { root, state, router }
    }

    /// Create a project with an (empty) images directory.
    pub fn add_project(&self, name: &str) -> ProjectLayout {
        let layout = ProjectLayout::new(self.root.path().join("projects"), name).unwrap();
        std::fs::create_dir_all(layout.images_dir()).unwrap();
        layout
    }

    /// Install an executable stand-in for one of the external tools.
    #[cfg(unix)]
    pub fn install_tool(&self, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = self.root.path().join("bin").join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub async fn get(&self, uri: &str) -> Response {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post(&self, uri: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Poll `GET uri` until `check` accepts the `data` payload.
    pub async fn wait_for(&self, uri: &str, check: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let response = self.get(uri).await;
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            if check(&json["data"]) {
                return json["data"].clone();
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        panic!("condition on {uri} not reached");
    }
}

/// Collect the response body and parse it as JSON.
pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
