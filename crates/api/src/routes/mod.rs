//! API routes

pub mod conversations;
pub mod health;
pub mod messages;
pub mod webhooks;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_auth, realtime::ws_handler, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        // Conversation lifecycle
        .route("/conversations", post(conversations::create_conversation))
        .route(
            "/conversations/:conversation_id/claim",
            post(conversations::claim_conversation),
        )
        .route(
            "/conversations/:conversation_id/status",
            patch(conversations::change_conversation_status),
        )
        .route(
            "/conversations/:conversation_id/transfer",
            post(conversations::transfer_conversation),
        )
        // Message threads
        .route(
            "/conversations/:conversation_id/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/messages/:message_id", delete(messages::delete_message))
        .route(
            "/messages/:message_id/reaction",
            post(messages::toggle_reaction),
        )
        // Webhook subscriptions
        .route(
            "/webhook-subscriptions/:subscription_id/test",
            post(webhooks::test_subscription),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // WebSocket route (auth handled in handler via query parameter)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    let api_v1_routes = Router::new()
        .merge(protected_api_routes)
        .merge(websocket_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
