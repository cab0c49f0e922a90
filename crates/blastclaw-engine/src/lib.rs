//! # BlastClaw Engine
//!
//! The campaign engine glues the stores, the window scheduler, and the
//! external channel together:
//!
//! - `CampaignEngine` — the command/query surface (schedule, cancel,
//!   retry, import, bulk delete) plus event emission.
//! - `Dispatcher` — tokio interval loop handing due messages to the
//!   channel inside the sending window.
//! - `Reconciler` — absorbs asynchronous status events, applies them
//!   monotonically, and debounces a consolidated store refresh.
//!
//! All store mutation funnels through one `Arc<tokio::sync::Mutex>` —
//! one logical owner per store instance, never free-threaded sharing.

pub mod bus;
pub mod debounce;
pub mod dispatcher;
pub mod engine;
pub mod reconciler;

pub use bus::{EngineEvent, EventBus};
pub use debounce::DebounceTimer;
pub use dispatcher::Dispatcher;
pub use engine::{CampaignEngine, SharedStore};
pub use reconciler::{Reconciler, RECONCILE_QUIET_MS};
