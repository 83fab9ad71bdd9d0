pub mod account;
pub mod auth;
pub mod connection;
pub mod error;
pub mod groups;
pub mod hooks;
pub mod messages;
pub mod send;
pub mod status;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (a user must be resolved from a bearer token or the session cookie).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(account::health))
        .route("/auth/setup", get(account::setup))
        .route("/auth/logout", post(account::logout));

    let protected = Router::new()
        .route("/auth/me", get(account::me))
        // Connection
        .route("/api/status", get(status::get_status))
        .route("/api/disconnect", post(connection::disconnect))
        .route("/api/reconnect", post(connection::reconnect))
        // Stored data
        .route("/api/stats", get(status::get_stats))
        .route("/api/messages", get(messages::list_messages))
        // Messaging
        .route("/api/send-message", post(send::send_message))
        .route("/api/send-group-message", post(send::send_group_message))
        // Groups
        .route("/api/groups", get(groups::list_groups))
        .route("/api/join-group", post(groups::join_group))
        .route("/api/leave-group", post(groups::leave_group))
        .route("/api/add-to-group", post(groups::add_to_group))
        // Webhooks
        .route("/api/hooks", get(hooks::list_hooks))
        .route("/api/hooks/register", post(hooks::register_hook))
        .route("/api/hooks/unregister", delete(hooks::unregister_hook))
        .route_layer(middleware::from_fn_with_state(state, auth::require_user));

    public.merge(protected)
}
