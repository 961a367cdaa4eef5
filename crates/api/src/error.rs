use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sculpt_core::error::CoreError;
use sculpt_jobs::JobError;
use sculpt_pipeline::PipelineError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors of each crate and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `sculpt_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A job control failure from `sculpt_jobs`.
    #[error(transparent)]
    Job(#[from] JobError),

    /// A pipeline failure surfaced synchronously.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core(core),
            AppError::Job(job) => classify_job(job),
            AppError::Pipeline(pipeline) => classify_pipeline(pipeline),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal("Internal error", msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} '{id}' not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
    }
}

/// Control-call errors. Invalid transitions (pausing a job that is not
/// running, and so on) are conflicts with the job's current state.
fn classify_job(err: &JobError) -> Classified {
    match err {
        JobError::Conflict(_) | JobError::NotRunning(_) | JobError::NotPaused(_) => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        JobError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        JobError::Invalid(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        JobError::Unsupported(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string()),
        JobError::Signal { .. } | JobError::Config(_) | JobError::Spawn(_) => {
            internal("Job control error", &err.to_string())
        }
    }
}

fn classify_pipeline(err: &PipelineError) -> Classified {
    match err {
        PipelineError::MissingArtifact(_) | PipelineError::CheckpointNotFound(_) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
        }
        _ => internal("Pipeline error", &err.to_string()),
    }
}

fn internal(context: &'static str, msg: &str) -> Classified {
    tracing::error!(error = %msg, "{context}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn job_errors_map_to_http_statuses() {
        assert_eq!(status_of(JobError::Conflict("p".into()).into()), StatusCode::CONFLICT);
        assert_eq!(status_of(JobError::NotPaused("p".into()).into()), StatusCode::CONFLICT);
        assert_eq!(status_of(JobError::NotFound("p".into()).into()), StatusCode::NOT_FOUND);
        assert_eq!(status_of(JobError::Invalid("bad".into()).into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(JobError::Config("disk full".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_artifacts_are_not_found() {
        assert_eq!(
            status_of(PipelineError::CheckpointNotFound("iter_1.pth".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PipelineError::Toolkit("crashed".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
