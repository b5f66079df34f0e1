use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no session: liveness and the login gateway.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers. Does not touch the store.
        .route("/health", get(|| async { "ok" }))
        // POST /login
        // JSON credentials in, bearer token and profile out.
        .route("/login", post(handlers::login))
}
