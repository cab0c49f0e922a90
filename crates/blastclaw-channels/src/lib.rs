//! # BlastClaw Channels
//! External messaging channel implementations.
//!
//! The campaign engine talks to [`blastclaw_core::traits::Channel`] only;
//! this crate provides the WhatsApp Business Cloud API adapter used in
//! production and an in-memory mock used by tests and dry runs.

pub mod mock;
pub mod whatsapp;

pub use mock::MockChannel;
pub use whatsapp::{parse_status_webhook, WhatsAppChannel};
