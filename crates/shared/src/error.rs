//! Error types for Atendo

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// A claim lost its race; carries the attendant who won it
    #[error("Conversation already taken")]
    AssignmentConflict { attendant_id: Option<Uuid> },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".to_string()),
            other => CoreError::Database(other.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
