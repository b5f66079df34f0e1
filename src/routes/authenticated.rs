use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Everything an agent does day to day. The router is wrapped in the authentication layer,
/// and every handler additionally checks the capability its operation needs before it
/// touches the store.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Session ---
        // POST /logout
        .route("/logout", post(handlers::logout))
        // GET /me
        // Profile plus effective capabilities, used by clients to hide unavailable actions.
        .route("/me", get(handlers::get_me))
        // POST /password
        // Self-service password change (`change_own_password`).
        .route("/password", post(handlers::change_password))
        // --- Fichas ---
        // GET/POST /fichas
        .route(
            "/fichas",
            get(handlers::list_fichas).post(handlers::create_ficha),
        )
        // GET /fichas/search?q=...&categoria=...
        .route("/fichas/search", get(handlers::search_fichas))
        // GET/PUT/DELETE /fichas/{id}
        // Each verb is gated by its own capability (view, edit, delete).
        .route(
            "/fichas/{id}",
            get(handlers::get_ficha)
                .put(handlers::update_ficha)
                .delete(handlers::delete_ficha),
        )
        // GET /fichas/{id}/edit
        // Form view with list fields joined one item per line.
        .route("/fichas/{id}/edit", get(handlers::edit_ficha_form))
        // GET /api/problemas/{categoria}
        // Canned problem titles that feed the ficha form's selector.
        .route(
            "/api/problemas/{categoria}",
            get(handlers::problems_by_category),
        )
        // --- Visual solutions ---
        .route(
            "/soluciones-visuales",
            get(handlers::list_visual_solutions).post(handlers::create_visual_solution),
        )
        .route(
            "/soluciones-visuales/{id}",
            get(handlers::get_visual_solution)
                .put(handlers::update_visual_solution)
                .delete(handlers::delete_visual_solution),
        )
}
