//! End-to-end tests for the structure-from-motion pipeline against a
//! scripted stand-in for the COLMAP binary.
#![cfg(unix)]

mod common;

use std::path::Path;
use std::sync::Arc;

use assert_matches::assert_matches;
use sculpt_core::job::JobState;
use sculpt_core::layout::ProjectLayout;
use sculpt_core::reconstruction::ReconstructionParams;
use sculpt_events::{Broadcaster, EventKind, ProgressEvent, Subscription};
use sculpt_pipeline::{ColmapPipeline, PipelineError};

/// Fake `colmap`: logs each subcommand and writes the outputs the real
/// tool would, failing on `$FAIL_ON` if set in the script.
fn fake_colmap(dir: &Path, fail_on: Option<&str>) -> String {
    let log = dir.join("calls.log");
    let fail = fail_on.unwrap_or("none");
    let body = format!(
        r#"
cmd="$1"; shift
echo "$cmd" >> '{log}'
out=""; db=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output_path) out="$2"; shift ;;
    --database_path) db="$2"; shift ;;
  esac
  shift
done
if [ "$cmd" = "{fail}" ]; then echo "$cmd crashed" >&2; exit 2; fi
case "$cmd" in
  --version) echo "COLMAP 3.9" ;;
  feature_extractor) echo "Processed file [1/2]"; touch "$db" ;;
  mapper)
    mkdir -p "$out/0"
    printf '# Camera list\n1 PINHOLE 800 600 500 500 400 300\n2 PINHOLE 800 600 500 500 400 300\n' > "$out/0/cameras.txt"
    printf '# Image list\n1 0 0 0 1 0 0 0 1 a.jpg\n\n2 0 0 0 1 0 0 0 2 b.jpg\n\n3 0 0 0 1 0 0 0 1 c.jpg\n\n' > "$out/0/images.txt"
    printf '# 3D point list\n1 0 0 0\n2 0 0 0\n3 0 0 0\n' > "$out/0/points3D.txt"
    ;;
  image_undistorter) mkdir -p "$out" ;;
  stereo_fusion) touch "$out" ;;
esac
exit 0
"#,
        log = log.display(),
    );
    common::write_script(dir, "colmap", &body).display().to_string()
}

fn project(root: &Path) -> ProjectLayout {
    let layout = ProjectLayout::from_root(root.join("statue"));
    std::fs::create_dir_all(layout.images_dir()).unwrap();
    layout
}

fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn drain(sub: &mut Subscription) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = sub.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Test: sparse run produces statistics and terminal status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sparse_run_reports_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let layout = project(dir.path());
    let broadcaster = Arc::new(Broadcaster::new());
    let mut sub = broadcaster.subscribe().await;
    let pipeline = ColmapPipeline::new(fake_colmap(dir.path(), None), Arc::clone(&broadcaster));

    let report = pipeline
        .process("statue", &layout, &ReconstructionParams::default())
        .await
        .unwrap();

    assert_eq!(
        calls(dir.path()),
        vec!["feature_extractor", "exhaustive_matcher", "mapper", "image_undistorter"]
    );
    let stats = report.statistics.expect("statistics should be read");
    assert_eq!((stats.num_cameras, stats.num_images, stats.num_points), (2, 3, 3));
    assert!(report.dense.is_none());
    assert_eq!(report.sparse.stages.len(), 4);

    let events = drain(&mut sub);
    assert_matches!(&events.first().unwrap().kind, EventKind::Status { state: JobState::Running, .. });
    assert_matches!(
        &events.last().unwrap().kind,
        EventKind::Status { state: JobState::Completed, result: Some(result), .. }
            if result["statistics"]["num_points"] == 3
    );
}

#[tokio::test]
async fn dense_flag_appends_dense_stages() {
    let dir = tempfile::tempdir().unwrap();
    let layout = project(dir.path());
    let pipeline = ColmapPipeline::new(fake_colmap(dir.path(), None), Arc::new(Broadcaster::new()));
    let params = ReconstructionParams {
        dense_reconstruction: true,
        ..ReconstructionParams::default()
    };

    let report = pipeline.process("statue", &layout, &params).await.unwrap();

    assert_eq!(calls(dir.path()).len(), 6);
    assert_eq!(report.dense.map(|d| d.stages.len()), Some(2));
    assert!(layout.fused_point_cloud().exists());
}

// ---------------------------------------------------------------------------
// Test: a failing stage aborts with its diagnostics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mapper_failure_stops_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let layout = project(dir.path());
    let broadcaster = Arc::new(Broadcaster::new());
    let mut sub = broadcaster.subscribe().await;
    let pipeline = ColmapPipeline::new(fake_colmap(dir.path(), Some("mapper")), Arc::clone(&broadcaster));

    let err = pipeline
        .process("statue", &layout, &ReconstructionParams::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some("mapper"));
    assert_eq!(err.diagnostic(), Some("mapper crashed"));
    assert_eq!(calls(dir.path()), vec!["feature_extractor", "exhaustive_matcher", "mapper"]);

    let events = drain(&mut sub);
    let tail: Vec<&str> = events.iter().rev().take(2).map(ProgressEvent::type_name).collect();
    assert_eq!(tail, vec!["status", "error"]);
    assert_matches!(&events.last().unwrap().kind, EventKind::Status { state: JobState::Errored, .. });
}

#[tokio::test]
async fn missing_images_directory_fails_before_any_stage() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::from_root(dir.path().join("empty"));
    let pipeline = ColmapPipeline::new(fake_colmap(dir.path(), None), Arc::new(Broadcaster::new()));

    let result = pipeline.process("empty", &layout, &ReconstructionParams::default()).await;

    assert_matches!(result, Err(PipelineError::MissingArtifact(_)));
    assert!(calls(dir.path()).is_empty());
}

// ---------------------------------------------------------------------------
// Test: dense-only run and installation check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dense_reconstruction_requires_undistorted_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let layout = project(dir.path());
    let pipeline = ColmapPipeline::new(fake_colmap(dir.path(), None), Arc::new(Broadcaster::new()));

    assert_matches!(
        pipeline.dense_reconstruction("statue", &layout).await,
        Err(PipelineError::MissingArtifact(_))
    );

    std::fs::create_dir_all(layout.dense_dir()).unwrap();
    let report = pipeline.dense_reconstruction("statue", &layout).await.unwrap();
    assert_eq!(report.stages.len(), 2);
    assert_eq!(calls(dir.path()), vec!["patch_match_stereo", "stereo_fusion"]);
}

#[tokio::test]
async fn installation_check() {
    let dir = tempfile::tempdir().unwrap();

    let installed = ColmapPipeline::new(fake_colmap(dir.path(), None), Arc::new(Broadcaster::new()));
    assert!(installed.check_installation().await);

    let missing = ColmapPipeline::new("/nonexistent/colmap", Arc::new(Broadcaster::new()));
    assert!(!missing.check_installation().await);
}
