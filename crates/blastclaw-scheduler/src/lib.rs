//! # BlastClaw Scheduler
//!
//! Pure send-window math: given a window policy (active weekdays, daily
//! time range, per-message spacing), compute the next legal dispatch
//! instant and plan out a whole batch. Deterministic — no clock reads,
//! callers pass `now` in.

pub mod window;

pub use window::{next_send_slot, plan_batch};
