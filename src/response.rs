//! Response envelope shared by every endpoint, and a JSON extractor whose
//! rejections use it.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::errors::AppError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::maybe(message, Some(data))
    }

    /// Success with possibly empty data; lookups that find nothing use this.
    pub fn maybe(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            error_code: None,
            errors: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>, code: &'static str, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_code: Some(code),
            errors: Some(errors),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `axum::Json` with rejections rendered as [`AppError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(rejection_error(rejection)),
        }
    }
}

fn rejection_error(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::MissingJsonContentType(err) => AppError::BadBody {
            status: err.status(),
            detail: "Missing Content-Type header. Expected 'application/json'.".into(),
        },
        JsonRejection::JsonDataError(err) => AppError::BadBody {
            status: axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            detail: err.body_text(),
        },
        JsonRejection::JsonSyntaxError(err) => AppError::BadBody {
            status: axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            detail: err.body_text(),
        },
        other => AppError::BadBody {
            status: other.status(),
            detail: other.body_text(),
        },
    }
}

/// `axum::extract::Path` whose parse failures are validation errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ApiPath(value)),
            Err(rejection) => Err(AppError::Validation(vec![rejection.body_text()])),
        }
    }
}

/// `axum::extract::Query` whose parse failures are validation errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(AppError::Validation(vec![rejection.body_text()])),
        }
    }
}
