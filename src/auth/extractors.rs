use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::jwt::{AccessClaims, JwtKeys};
use crate::{
    errors::AppError,
    state::AppState,
    users::model::{Role, User},
};

fn bearer_token(parts: &Parts) -> Option<&str> {
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extracts and validates the bearer JWT, resolving it to an active user.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;

        let keys = JwtKeys::from_ref(state);
        let Some(claims) = keys.verify::<AccessClaims>(token) else {
            warn!("invalid or expired token");
            return Err(AppError::Unauthorized);
        };

        let user = state
            .users
            .get_by_email(&claims.claims.email)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| {
                warn!(email = %claims.claims.email, "token for unknown or inactive user");
                AppError::Unauthorized
            })?;

        Ok(AuthUser(user))
    }
}

pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        warn!(user_id = user.id, role = %user.role, "insufficient role");
        Err(AppError::Forbidden)
    }
}

/// An authenticated user holding the `ADMIN` role.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        require_role(&user, &[Role::Admin])?;
        Ok(AdminUser(user))
    }
}
