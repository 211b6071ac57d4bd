use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
};
use tracing::{info, instrument, warn};

use super::dto::{EmailQuery, ListUsersQuery, PublicUser, UserCreate, UserUpdate};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    errors::AppError,
    response::{ApiJson, ApiPath, ApiQuery, ApiResponse},
    state::AppState,
};

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

#[instrument(skip_all, fields(user_id = user.id))]
pub async fn get_me(AuthUser(user): AuthUser) -> ApiResponse<PublicUser> {
    ApiResponse::ok("Current user retrieved successfully", user.into())
}

#[instrument(skip_all, fields(user_id = user.id))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<UserUpdate>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let payload = payload.normalize().self_service();
    payload.validate().map_err(AppError::Validation)?;
    let updated = state
        .users
        .update(user.id, payload)
        .await?
        .ok_or(AppError::UserNotFound)?;
    Ok(ApiResponse::ok("User updated successfully", updated.into()))
}

#[instrument(skip(state, _caller))]
pub async fn get_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let user = state.users.get(id).await?;
    Ok(ApiResponse::maybe(
        "User retrieved successfully",
        user.map(Into::into),
    ))
}

#[instrument(skip_all)]
pub async fn get_user_by_email(
    State(state): State<AppState>,
    _caller: AuthUser,
    ApiQuery(q): ApiQuery<EmailQuery>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let user = state.users.get_by_email(q.email.trim()).await?;
    Ok(ApiResponse::maybe(
        "User retrieved successfully",
        user.map(Into::into),
    ))
}

#[instrument(skip(state, _admin, q))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(q): ApiQuery<ListUsersQuery>,
) -> Result<(HeaderMap, ApiResponse<Vec<PublicUser>>), AppError> {
    let (page, filters) = q.into_parts().map_err(AppError::Validation)?;
    let (users, total) = state.users.list(page, &filters).await?;

    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from(total));

    let items = users.into_iter().map(PublicUser::from).collect();
    Ok((headers, ApiResponse::ok("Users retrieved successfully", items)))
}

#[instrument(skip(state, admin, payload), fields(admin_id = admin.id))]
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(payload): ApiJson<UserCreate>,
) -> Result<(StatusCode, ApiResponse<PublicUser>), AppError> {
    let payload = payload.normalize();
    payload.validate().map_err(AppError::Validation)?;
    if state.users.get_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::UserAlreadyExists);
    }
    let user = state.users.create(payload).await?;
    info!(user_id = user.id, "user created by admin");
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("User created successfully", user.into()),
    ))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UserUpdate>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let payload = payload.normalize();
    payload.validate().map_err(AppError::Validation)?;
    let user = state
        .users
        .update(id, payload)
        .await?
        .ok_or(AppError::UserNotFound)?;
    Ok(ApiResponse::ok("User updated successfully", user.into()))
}

#[instrument(skip(state, _admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let user = state.users.delete(id).await?.ok_or(AppError::UserNotFound)?;
    Ok(ApiResponse::ok("User deleted successfully", user.into()))
}
