use crate::state::AppState;
use axum::{routing::get, Router};

pub mod dto;
pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod model;
pub mod repo;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/users/me", get(handlers::get_me).patch(handlers::update_me))
        .route("/users/by-email", get(handlers::get_user_by_email))
        .route(
            "/users/:id",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
}
