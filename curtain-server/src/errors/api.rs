use super::CurtainError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Curtain error: {0}")]
    CurtainError(#[from] CurtainError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}
