//! BlastClaw configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::SendWindow;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlastClawConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Sending-window defaults used to seed the settings store on first
    /// launch. The live window is edited through the settings surface.
    #[serde(default)]
    pub window: SendWindow,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for BlastClawConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            channel: ChannelConfig::default(),
            window: SendWindow::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl BlastClawConfig {
    /// Load config from the default path (~/.blastclaw/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::BlastClawError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::BlastClawError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BlastClawError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".blastclaw")
            .join("config.toml")
    }

    /// Get the BlastClaw home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".blastclaw")
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 3100 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    #[serde(default)]
    pub whatsapp: Option<WhatsAppChannelConfig>,
}

/// WhatsApp Business Cloud API channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Facebook Graph API access token
    #[serde(default)]
    pub access_token: String,
    /// WhatsApp Phone Number ID
    #[serde(default)]
    pub phone_number_id: String,
    /// Webhook verify token (for inbound status events)
    #[serde(default)]
    pub webhook_verify_token: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.blastclaw/campaign.db".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BlastClawConfig::default();
        assert_eq!(config.gateway.port, 3100);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert!(config.channel.whatsapp.is_none());
        assert_eq!(config.window.active_days, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [gateway]
            port = 8080

            [channel.whatsapp]
            enabled = true
            access_token = "tok"
            phone_number_id = "12345"

            [window]
            activeDays = [6, 7]
            startMinute = 600
            endMinute = 720
            messageIntervalSecs = 30
            isActive = true
        "#;

        let config: BlastClawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gateway.port, 8080);
        let wa = config.channel.whatsapp.unwrap();
        assert!(wa.enabled);
        assert_eq!(wa.phone_number_id, "12345");
        assert_eq!(config.window.active_days, vec![6, 7]);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let toml_str = "";
        let config: BlastClawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gateway.port, 3100);
        assert_eq!(config.storage.db_path, "~/.blastclaw/campaign.db");
    }

    #[test]
    fn test_home_dir() {
        let home = BlastClawConfig::home_dir();
        assert!(home.to_string_lossy().contains("blastclaw"));
    }
}
