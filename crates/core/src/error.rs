/// Domain-level errors shared by every crate in the workspace.
///
/// Transport layers map these onto their own status codes; see
/// `sculpt_api::error::AppError`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} '{id}'")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}
