use axum::{
    extract::{rejection::FormRejection, FromRef, State},
    http::StatusCode,
    Form, Json,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{LoginRequest, TokenForm, TokenResponse},
    jwt::JwtKeys,
};
use crate::{
    errors::AppError,
    response::{ApiJson, ApiResponse},
    state::AppState,
    users::{
        dto::{normalize_email, PublicUser, UserCreate},
        model::{Role, User},
    },
};

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UserCreate>,
) -> Result<(StatusCode, ApiResponse<PublicUser>), AppError> {
    let mut payload = payload.normalize();
    payload.validate().map_err(|errors| {
        warn!(email = %payload.email, "invalid registration");
        AppError::Validation(errors)
    })?;
    // Self-registration never grants elevated roles.
    payload.role = Role::User;

    // Ensure email is not taken
    if state.users.get_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::UserAlreadyExists);
    }

    let user = state.users.create(payload).await?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("User created successfully", user.into()),
    ))
}

async fn login_user(state: &AppState, email: &str, password: &str) -> Result<(User, String), AppError> {
    let email = normalize_email(email);
    let Some(user) = state.users.authenticate(&email, password).await? else {
        warn!(email = %email, "login rejected");
        return Err(AppError::InvalidCredentials);
    };

    let keys = JwtKeys::from_ref(state);
    let token = keys.sign_access(&user.email)?;
    info!(user_id = user.id, "user logged in");
    Ok((user, token))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<ApiResponse<String>, AppError> {
    payload.validate().map_err(AppError::Validation)?;
    let (_, token) = login_user(&state, &payload.email, &payload.password).await?;
    Ok(ApiResponse::ok("User logged in successfully", token))
}

/// OAuth2 password grant for interactive API clients.
#[instrument(skip(state, form))]
pub async fn token(
    State(state): State<AppState>,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Form(form) = form.map_err(|rejection| AppError::BadBody {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        detail: rejection.body_text(),
    })?;
    let (_, access_token) = login_user(&state, &form.username, &form.password).await?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}
