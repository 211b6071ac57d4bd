pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod middleware;
pub mod repository;
pub mod response;
pub mod state;
pub mod users;
