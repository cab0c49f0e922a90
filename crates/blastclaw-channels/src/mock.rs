//! In-memory channel for tests and dry runs.
//!
//! Hands out deterministic external ids, records every outbound send, and
//! lets tests push status events into the listen stream by hand.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use blastclaw_core::error::{BlastClawError, Result};
use blastclaw_core::traits::Channel;
use blastclaw_core::types::StatusEvent;

/// One recorded outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub external_id: String,
    pub to: String,
    pub body: String,
    pub image_path: Option<String>,
}

pub struct MockChannel {
    counter: AtomicU64,
    sent: Mutex<Vec<SentRecord>>,
    /// Numbers whose sends fail — for failure-path tests.
    fail_numbers: Mutex<HashSet<String>>,
    events_tx: mpsc::UnboundedSender<StatusEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<StatusEvent>>>,
    connected: bool,
}

impl MockChannel {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            counter: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            fail_numbers: Mutex::new(HashSet::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            connected: true,
        }
    }

    /// Make every send to `number` fail with a channel error.
    pub fn fail_sends_to(&self, number: &str) {
        self.fail_numbers.lock().unwrap().insert(number.to_string());
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    /// Push a status event into the listen stream.
    pub fn push_status(&self, event: StatusEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &str { "mock" }

    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool { self.connected }

    async fn send_text(&self, to: &str, body: &str, image_path: Option<&str>) -> Result<String> {
        if self.fail_numbers.lock().unwrap().contains(to) {
            return Err(BlastClawError::Channel(format!("mock: send to {to} refused")));
        }
        let external_id = format!("mock-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.sent.lock().unwrap().push(SentRecord {
            external_id: external_id.clone(),
            to: to.to_string(),
            body: body.to_string(),
            image_path: image_path.map(String::from),
        });
        Ok(external_id)
    }

    async fn listen(&self) -> Result<Box<dyn Stream<Item = StatusEvent> + Send + Unpin>> {
        let rx = self
            .events_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BlastClawError::Channel("mock listen stream already taken".into()))?;
        Ok(Box::new(UnboundedReceiverStream::new(rx)))
    }
}
