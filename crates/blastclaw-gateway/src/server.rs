//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use blastclaw_core::config::GatewayConfig;
use blastclaw_engine::CampaignEngine;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CampaignEngine>,
    pub start_time: std::time::Instant,
    /// Token Meta echoes back on webhook verification.
    pub webhook_verify_token: String,
}

impl AppState {
    pub fn new(engine: Arc<CampaignEngine>, webhook_verify_token: String) -> Self {
        Self {
            engine,
            start_time: std::time::Instant::now(),
            webhook_verify_token,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    let api = Router::new()
        .route("/api/v1/health", get(super::routes::health_check))
        // Contacts
        .route("/api/v1/contacts", get(super::routes::list_contacts))
        .route("/api/v1/contacts", post(super::routes::create_contact))
        .route("/api/v1/contacts/{id}", put(super::routes::update_contact))
        .route(
            "/api/v1/contacts/delete-bulk",
            post(super::routes::delete_contacts_bulk),
        )
        // Templates
        .route("/api/v1/templates", get(super::routes::list_templates))
        .route("/api/v1/templates", post(super::routes::create_template))
        .route("/api/v1/templates/{id}", get(super::routes::get_template))
        .route("/api/v1/templates/{id}", put(super::routes::update_template))
        .route(
            "/api/v1/templates/{id}",
            axum::routing::delete(super::routes::delete_template),
        )
        // Messages
        .route("/api/v1/messages", get(super::routes::list_messages))
        .route("/api/v1/messages/schedule", post(super::routes::schedule_messages))
        .route("/api/v1/messages/{id}/cancel", post(super::routes::cancel_message))
        .route("/api/v1/messages/{id}/retry", post(super::routes::retry_message))
        .route(
            "/api/v1/messages/delete-bulk",
            post(super::routes::delete_messages_bulk),
        )
        // Settings
        .route("/api/v1/settings", get(super::routes::get_settings))
        .route("/api/v1/settings/update", post(super::routes::update_settings))
        // Import flow
        .route("/api/v1/import/parse", post(super::routes::import_parse))
        .route("/api/v1/import/classify", post(super::routes::import_classify))
        .route("/api/v1/import/commit", post(super::routes::import_commit))
        // WhatsApp webhook — must stay public for Meta verification
        .route(
            "/api/v1/webhook/whatsapp",
            get(super::routes::whatsapp_webhook_verify).post(super::routes::whatsapp_webhook),
        )
        // Event push
        .route("/ws", get(super::ws::ws_handler));

    api.layer(
        CorsLayer::new()
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers(Any)
            .allow_origin(Any),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(shared)
}

/// Start the HTTP server. Runs until the process exits.
pub async fn start(engine: Arc<CampaignEngine>, config: &GatewayConfig, verify_token: String) -> std::io::Result<()> {
    let state = AppState::new(engine, verify_token);
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Gateway server listening on http://{addr}");
    axum::serve(listener, app).await
}
