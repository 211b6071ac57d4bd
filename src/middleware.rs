use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{errors::AppError, state::AppState};

pub const CLIENT_ID_HEADER: &str = "x-client-id";

const API_PREFIX: &str = "/api/v1";
const EXCLUDED_PATHS: &[&str] = &["/api/v1/health", "/api/v1/docs"];

fn needs_client_id(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    let under_api = path == API_PREFIX || path.starts_with("/api/v1/");
    under_api && !EXCLUDED_PATHS.contains(&path)
}

/// Rejects API calls that do not identify their client application.
pub async fn require_client_id(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.config.require_client_id && needs_client_id(req.uri().path()) {
        let present = req
            .headers()
            .get(CLIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| !v.trim().is_empty());
        if !present {
            warn!(path = %req.uri().path(), "request without client id");
            return Err(AppError::MissingClientId);
        }
    }
    Ok(next.run(req).await)
}
