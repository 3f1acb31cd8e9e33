use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;

use super::handlers::{
    get_root, get_value, ping, post_update_json, post_update_plain, post_updates, post_value,
};
use super::middleware::{check_subnet, log_requests, sign_response};
use super::state::AppState;

/// Ingestion and query routes with logging, subnet guard and response
/// signing applied (outermost first).
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_root))
        .route("/ping", get(ping))
        .route("/updates", post(post_updates))
        .route("/updates/", post(post_updates))
        .route("/update", post(post_update_json))
        .route("/update/", post(post_update_json))
        .route("/update/{kind}/{name}/{value}", post(post_update_plain))
        .route("/value", post(post_value))
        .route("/value/", post(post_value))
        .route("/value/{kind}/{name}", get(get_value))
        .layer(from_fn_with_state(state.clone(), sign_response))
        .layer(from_fn_with_state(state.clone(), check_subnet))
        .layer(from_fn(log_requests))
        .with_state(state)
}
