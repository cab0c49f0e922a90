//! REST route handlers.
//!
//! Every response is an `{"ok": bool, ...}` envelope; errors map the
//! taxonomy onto status codes (validation 422, conflict 409, not-found
//! 404, config 400, store 503).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use blastclaw_core::error::BlastClawError;
use blastclaw_core::types::{ImportRecord, NewContact, NewTemplate, RawContact, SendWindow};

use crate::server::AppState;

/// Error wrapper translating the taxonomy to HTTP.
pub struct ApiError(BlastClawError);

impl From<BlastClawError> for ApiError {
    fn from(e: BlastClawError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BlastClawError::Validation(_) | BlastClawError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BlastClawError::Conflict(_) => StatusCode::CONFLICT,
            BlastClawError::NotFound(_) => StatusCode::NOT_FOUND,
            BlastClawError::Config(_) => StatusCode::BAD_REQUEST,
            BlastClawError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            BlastClawError::Channel(_) => StatusCode::BAD_GATEWAY,
            BlastClawError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let code = if self.0.is_duplicate_phone() {
            "DUPLICATE_PHONE"
        } else {
            self.0.code()
        };
        let body = Json(json!({"ok": false, "code": code, "error": self.0.to_string()}));
        (status, body).into_response()
    }
}

type Api = Result<Json<serde_json::Value>, ApiError>;

// ─── Health ──────────────────────────────────────

pub async fn health_check(State(state): State<Arc<AppState>>) -> Api {
    Ok(Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    })))
}

// ─── Contacts ──────────────────────────────────────

pub async fn list_contacts(State(state): State<Arc<AppState>>) -> Api {
    let contacts = state.engine.contacts().await?;
    Ok(Json(json!({"ok": true, "contacts": contacts})))
}

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Json(data): Json<NewContact>,
) -> Api {
    let contact = state.engine.create_contact(data).await?;
    Ok(Json(json!({"ok": true, "contact": contact})))
}

pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(data): Json<NewContact>,
) -> Api {
    let contact = state.engine.update_contact(&id, data).await?;
    Ok(Json(json!({"ok": true, "contact": contact})))
}

#[derive(Deserialize)]
pub struct IdList {
    pub ids: Vec<String>,
}

pub async fn delete_contacts_bulk(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdList>,
) -> Api {
    let outcome = state.engine.delete_contacts(&body.ids).await;
    Ok(Json(json!({
        "ok": true,
        "deleted": outcome.deleted,
        "errors": outcome.errors,
        "total": outcome.total,
    })))
}

// ─── Templates ──────────────────────────────────────

pub async fn list_templates(State(state): State<Arc<AppState>>) -> Api {
    let templates = state.engine.templates().await?;
    Ok(Json(json!({"ok": true, "templates": templates})))
}

pub async fn get_template(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Api {
    let template = state.engine.template(&id).await?;
    Ok(Json(json!({"ok": true, "template": template})))
}

pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(data): Json<NewTemplate>,
) -> Api {
    let template = state.engine.create_template(data).await?;
    Ok(Json(json!({"ok": true, "template": template})))
}

pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(data): Json<NewTemplate>,
) -> Api {
    let template = state.engine.update_template(&id, data).await?;
    Ok(Json(json!({"ok": true, "template": template})))
}

pub async fn delete_template(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Api {
    state.engine.delete_template(&id).await?;
    Ok(Json(json!({"ok": true})))
}

// ─── Messages ──────────────────────────────────────

pub async fn list_messages(State(state): State<Arc<AppState>>) -> Api {
    let messages = state.engine.scheduled_messages().await;
    Ok(Json(json!({"ok": true, "messages": messages})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub contact_ids: Vec<String>,
    pub template_id: String,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
}

pub async fn schedule_messages(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScheduleRequest>,
) -> Api {
    let outcome = state
        .engine
        .schedule_messages(&body.contact_ids, &body.template_id, body.scheduled_time)
        .await?;
    Ok(Json(json!({
        "ok": true,
        "success": outcome.success,
        "scheduledCount": outcome.scheduled_count,
    })))
}

pub async fn cancel_message(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Api {
    let message = state.engine.cancel_scheduled_message(&id).await?;
    Ok(Json(json!({"ok": true, "message": message})))
}

pub async fn retry_message(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Api {
    let message = state.engine.retry_failed_message(&id).await?;
    Ok(Json(json!({"ok": true, "message": message})))
}

pub async fn delete_messages_bulk(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdList>,
) -> Api {
    let outcome = state.engine.delete_messages(&body.ids).await;
    Ok(Json(json!({
        "ok": true,
        "deleted": outcome.deleted,
        "errors": outcome.errors,
        "total": outcome.total,
    })))
}

// ─── Settings ──────────────────────────────────────

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Api {
    let window = state.engine.send_window().await?;
    Ok(Json(json!({"ok": true, "settings": window})))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(window): Json<SendWindow>,
) -> Api {
    state.engine.update_send_window(&window).await?;
    Ok(Json(json!({"ok": true, "settings": window})))
}

// ─── Import flow ──────────────────────────────────────

#[derive(Deserialize)]
pub struct ParseRequest {
    pub path: String,
    pub ext: String,
}

pub async fn import_parse(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ParseRequest>,
) -> Api {
    let contacts = state
        .engine
        .parse_contacts_file(std::path::Path::new(&body.path), &body.ext)?;
    Ok(Json(json!({"ok": true, "contacts": contacts})))
}

#[derive(Deserialize)]
pub struct ClassifyRequest {
    pub contacts: Vec<RawContact>,
}

pub async fn import_classify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClassifyRequest>,
) -> Api {
    let batch = state.engine.classify_import(body.contacts).await?;
    Ok(Json(json!({
        "ok": true,
        "records": batch.records(),
        "counts": batch.counts(),
    })))
}

#[derive(Deserialize)]
pub struct CommitRequest {
    pub records: Vec<ImportRecord>,
}

pub async fn import_commit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CommitRequest>,
) -> Api {
    let report = state.engine.commit_import(body.records).await?;
    Ok(Json(json!({
        "ok": true,
        "imported": report.outcome.imported,
        "duplicates": report.outcome.duplicates,
        "errors": report.outcome.errors,
        "total": report.outcome.total,
        "failures": report.failures,
    })))
}

// ─── WhatsApp webhook ──────────────────────────────────────

/// Meta's subscription handshake: echo `hub.challenge` when the verify
/// token matches.
pub async fn whatsapp_webhook_verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if mode == Some("subscribe") && token == Some(state.webhook_verify_token.as_str()) {
        challenge.into_response()
    } else {
        tracing::warn!("Webhook verification rejected (mode={mode:?})");
        StatusCode::FORBIDDEN.into_response()
    }
}

/// Inbound status events. Always answered 200 — Meta retries otherwise,
/// and the reconciler is idempotent anyway.
pub async fn whatsapp_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Api {
    let events = blastclaw_channels::parse_status_webhook(&payload);
    let received = events.len();
    if received > 0 {
        tracing::debug!("Webhook delivered {received} status event(s)");
        state.engine.push_status_events(events);
    }
    Ok(Json(json!({"ok": true, "received": received})))
}
