// Errors surfaced by the leaderboard and admin services.

use thiserror::Error;
use tierlist_core::model::PlayerId;
use tierlist_core::roles::{AdminRole, AdminTab};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("player {0} not found")]
    PlayerNotFound(String),

    #[error("player id {0} not found")]
    PlayerIdNotFound(PlayerId),

    #[error("application {0} not found or already reviewed")]
    ApplicationNotReviewable(i64),

    #[error("staff member {0} not found")]
    StaffNotFound(i64),

    #[error("invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("invalid secret key")]
    InvalidCredentials,

    #[error("admin session is missing or expired")]
    Unauthorized,

    #[error("the {role} role cannot access the {tab} tab")]
    Forbidden { role: AdminRole, tab: AdminTab },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ServiceError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
