use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::response::ApiResponse;

/// Errors surfaced by handlers and extractors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error")]
    Validation(Vec<String>),

    #[error("Invalid request body")]
    BadBody { status: StatusCode, detail: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Could not validate credentials")]
    Unauthorized,

    #[error("Access forbidden")]
    Forbidden,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Missing X-Client-ID header")]
    MissingClientId,

    #[error(transparent)]
    Internal(anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadBody { status, .. } => *status,
            AppError::InvalidCredentials
            | AppError::Unauthorized
            | AppError::Forbidden
            | AppError::MissingClientId => StatusCode::UNAUTHORIZED,
            AppError::UserAlreadyExists => StatusCode::BAD_REQUEST,
            AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BadBody { .. } => "INVALID_REQUEST_BODY",
            AppError::InvalidCredentials | AppError::Unauthorized => "INVALID_CREDENTIALS",
            AppError::Forbidden => "ACCESS_FORBIDDEN",
            AppError::UserAlreadyExists => "USER_ALREADY_EXISTS",
            AppError::UserNotFound => "USER_NOT_FOUND",
            AppError::MissingClientId => "MISSING_CLIENT_ID",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn reasons(&self) -> Vec<String> {
        match self {
            AppError::Validation(errors) => errors.clone(),
            AppError::BadBody { detail, .. } => vec![detail.clone()],
            AppError::Forbidden => vec!["insufficient role".into()],
            AppError::UserAlreadyExists => vec!["A user with this email already exists".into()],
            AppError::Internal(_) => vec!["An internal error occurred".into()],
            other => vec![other.to_string()],
        }
    }
}

/// Unique violations from the store become [`AppError::UserAlreadyExists`];
/// everything else is internal.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(sqlx::Error::Database(db)) = err.downcast_ref::<sqlx::Error>() {
            if db.is_unique_violation() {
                return AppError::UserAlreadyExists;
            }
        }
        AppError::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            error!(error = ?err, "request failed");
        }
        let status = self.status();
        let body = ApiResponse::error(self.to_string(), self.code(), self.reasons());
        (status, body).into_response()
    }
}
