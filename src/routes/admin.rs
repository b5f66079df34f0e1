use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Account management. Mounted under `/admin` behind the authentication layer; every
/// handler requires `manage_users`, which only the admin role holds.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /admin/users
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        // PUT/DELETE /admin/users/{id}
        // A blank password on PUT keeps the stored credential. DELETE refuses the caller's
        // own account.
        .route(
            "/users/{id}",
            put(handlers::update_user).delete(handlers::delete_user),
        )
}
