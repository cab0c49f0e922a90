//! Injected collaborator contracts.
//!
//! The engine never talks to a concrete transport or store type — it holds
//! these traits, so tests substitute in-memory fakes.

use async_trait::async_trait;
use futures::stream::Stream;

use crate::error::Result;
use crate::types::{Contact, NewContact, StatusEvent};

/// An external messaging channel the campaign engine delivers through.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Hand one message to the channel. Returns the channel-assigned
    /// external id used to correlate later status events.
    async fn send_text(&self, to: &str, body: &str, image_path: Option<&str>) -> Result<String>;

    /// Delivery-status events pushed by the channel. Channels whose
    /// statuses arrive over a webhook return a pending stream — the
    /// gateway feeds the reconciler instead.
    async fn listen(&self) -> Result<Box<dyn Stream<Item = StatusEvent> + Send + Unpin>>;
}

/// Sink the admission pipeline commits accepted records into.
///
/// A duplicate phone number must surface as a `Conflict` whose message
/// carries the `DUPLICATE_PHONE` code (see
/// [`crate::error::BlastClawError::is_duplicate_phone`]) so commits can
/// count races as duplicates rather than errors.
#[async_trait]
pub trait ContactWriter: Send + Sync {
    async fn create_contact(&self, contact: NewContact) -> Result<Contact>;
}
