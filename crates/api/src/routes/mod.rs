//! API routes

pub mod admin;
pub mod chat;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use livechat_shared::ConversationId;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{ApiError, ApiResult},
    state::AppState,
    websocket::ws_handler,
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Chat widget routes
    let chat_routes = Router::new()
        .route("/conversation", post(chat::open_conversation))
        .route("/conversation/:conversation_id", get(chat::get_conversation))
        .route("/conversation/:conversation_id/close", post(chat::close_conversation))
        .route(
            "/customer/:customer_id/conversations",
            get(chat::customer_conversations),
        );

    // Agent dashboard routes
    let admin_routes = Router::new()
        .route("/conversations", get(admin::list_conversations))
        .route("/conversations/:conversation_id", get(admin::get_conversation));

    // Customers and agents share one socket endpoint
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    let cors = build_cors_layer(&state.config);

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api/chat", chat_routes)
        .nest("/api/admin", admin_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB global limit
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Parse a `:conversation_id` path segment
fn parse_conversation_id(raw: &str) -> ApiResult<ConversationId> {
    Uuid::parse_str(raw)
        .map(ConversationId::from)
        .map_err(|_| ApiError::BadRequest(format!("Invalid conversation id: {raw}")))
}

/// Build the CORS layer.
///
/// With no configured origins every origin is allowed.
fn build_cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if config.cors_allowed_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    tracing::info!(origins = ?config.cors_allowed_origins, "CORS: restricting origins");
    cors.allow_origin(origins)
}
