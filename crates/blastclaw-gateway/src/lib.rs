//! # BlastClaw Gateway
//!
//! The HTTP/WebSocket surface of the campaign engine. REST routes cover
//! contacts, templates, messages, settings, and the import flow; the
//! WebSocket pushes engine events (message-sent, message-status-update,
//! import-progress, delete-progress) to connected clients; the public
//! WhatsApp webhook pair feeds delivery-status events into the
//! reconciler.

pub mod routes;
pub mod server;
pub mod ws;

pub use server::{build_router, start, AppState};
