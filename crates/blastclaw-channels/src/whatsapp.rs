//! WhatsApp Business Cloud API channel.
//!
//! Uses the official WhatsApp Business Platform (Cloud API) for outbound
//! delivery. Requires: Access Token + Phone Number ID from Meta Business
//! Suite. Delivery-status events arrive on the gateway's webhook, not on
//! this channel's listen stream.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::Stream;

use blastclaw_core::config::WhatsAppChannelConfig;
use blastclaw_core::error::{BlastClawError, Result};
use blastclaw_core::traits::Channel;
use blastclaw_core::types::{MessageStatus, StatusEvent};

/// WhatsApp Business channel implementation.
pub struct WhatsAppChannel {
    config: WhatsAppChannelConfig,
    client: reqwest::Client,
    connected: bool,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppChannelConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            connected: false,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://graph.facebook.com/v21.0/{}/messages",
            self.config.phone_number_id
        )
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str { "whatsapp" }

    async fn connect(&mut self) -> Result<()> {
        if self.config.access_token.is_empty() {
            return Err(BlastClawError::Config(
                "WhatsApp access_token not configured".into()
            ));
        }
        if self.config.phone_number_id.is_empty() {
            return Err(BlastClawError::Config(
                "WhatsApp phone_number_id not configured".into()
            ));
        }

        // Verify token by checking the phone number object
        let url = format!(
            "https://graph.facebook.com/v21.0/{}",
            self.config.phone_number_id
        );
        let response = self.client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .send()
            .await
            .map_err(|e| BlastClawError::Channel(format!("WhatsApp verification failed: {e}")))?;

        if response.status().is_success() {
            self.connected = true;
            tracing::info!("WhatsApp Business: connected (phone_id={})", self.config.phone_number_id);
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(BlastClawError::Channel(format!(
                "WhatsApp token verification failed: {text}"
            )))
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        tracing::info!("WhatsApp Business: disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool { self.connected }

    async fn send_text(&self, to: &str, body: &str, image_path: Option<&str>) -> Result<String> {
        let payload = match image_path {
            // Cloud API image messages take a hosted link; the campaign
            // stores the snapshot path/URL verbatim.
            Some(link) => serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "image",
                "image": {
                    "link": link,
                    "caption": body
                }
            }),
            None => serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "text",
                "text": {
                    "preview_url": false,
                    "body": body
                }
            }),
        };

        let response = self.client
            .post(self.messages_url())
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| BlastClawError::Channel(format!("WhatsApp API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BlastClawError::Channel(format!(
                "WhatsApp API error {status}: {error_text}"
            )));
        }

        let result: serde_json::Value = response.json().await
            .map_err(|e| BlastClawError::Channel(format!("Invalid WhatsApp response: {e}")))?;

        let msg_id = result["messages"][0]["id"]
            .as_str()
            .ok_or_else(|| {
                BlastClawError::Channel("WhatsApp response carried no message id".into())
            })?
            .to_string();

        tracing::debug!("WhatsApp message sent: {} → {}", msg_id, to);
        Ok(msg_id)
    }

    async fn listen(&self) -> Result<Box<dyn Stream<Item = StatusEvent> + Send + Unpin>> {
        // Status events arrive via webhook (HTTP POST) — the gateway
        // parses them and feeds the reconciler.
        tracing::info!("WhatsApp: listening via webhook endpoint");
        Ok(Box::new(futures::stream::pending::<StatusEvent>()))
    }
}

/// Parse a Cloud API status webhook payload into status events.
///
/// The interesting part of the payload is
/// `entry[].changes[].value.statuses[]`, each entry carrying the message
/// id, a lowercase status string, and a unix-seconds timestamp.
pub fn parse_status_webhook(payload: &serde_json::Value) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    let Some(entries) = payload["entry"].as_array() else {
        return events;
    };
    for entry in entries {
        let Some(changes) = entry["changes"].as_array() else { continue };
        for change in changes {
            let Some(statuses) = change["value"]["statuses"].as_array() else { continue };
            for status in statuses {
                let Some(external_id) = status["id"].as_str() else { continue };
                let Some(parsed) = status["status"].as_str().and_then(MessageStatus::parse) else {
                    tracing::debug!(
                        "Ignoring unknown webhook status: {:?}",
                        status["status"]
                    );
                    continue;
                };
                let timestamp = parse_unix_seconds(&status["timestamp"])
                    .unwrap_or_else(Utc::now);
                let error_message = status["errors"][0]["title"]
                    .as_str()
                    .or_else(|| status["errors"][0]["message"].as_str())
                    .map(String::from);
                events.push(StatusEvent {
                    external_id: external_id.to_string(),
                    status: parsed,
                    timestamp,
                    sent_time: None,
                    delivered_time: None,
                    read_time: None,
                    error_message,
                });
            }
        }
    }
    events
}

/// Cloud API timestamps are unix seconds, sometimes as a string.
fn parse_unix_seconds(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let secs = value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))?;
    Utc.timestamp_opt(secs, 0).single()
}
