//! # BlastClaw — Bulk-Messaging Campaign Engine
//!
//! Import contacts, pick a template, and let the engine deliver inside
//! the configured sending window; delivery status streams back through
//! the gateway webhook and WebSocket.
//!
//! Usage:
//!   blastclaw                        # Start with ~/.blastclaw/config.toml
//!   blastclaw --port 8080            # Custom gateway port
//!   blastclaw --dry-run              # Mock channel, nothing leaves the box

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use blastclaw_channels::{MockChannel, WhatsAppChannel};
use blastclaw_core::traits::Channel;
use blastclaw_core::BlastClawConfig;
use blastclaw_engine::CampaignEngine;
use blastclaw_store::CampaignStore;

#[derive(Parser)]
#[command(
    name = "blastclaw",
    version,
    about = "BlastClaw — bulk-messaging campaign engine"
)]
struct Cli {
    /// Gateway port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path (default: ~/.blastclaw/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Campaign database path (overrides config)
    #[arg(long)]
    db_path: Option<String>,

    /// Use the in-memory mock channel — nothing is actually sent
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "blastclaw=debug,tower_http=debug"
    } else {
        "blastclaw=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => BlastClawConfig::load_from(std::path::Path::new(&expand_path(path)))
            .context("loading config")?,
        None => BlastClawConfig::load().context("loading config")?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(db_path) = &cli.db_path {
        config.storage.db_path = db_path.clone();
    }

    let db_path = expand_path(&config.storage.db_path);
    let store = CampaignStore::open(std::path::Path::new(&db_path))
        .with_context(|| format!("opening campaign database at {db_path}"))?;
    tracing::info!("Campaign database: {db_path}");

    let whatsapp = config.channel.whatsapp.clone().filter(|c| c.enabled);
    let verify_token = whatsapp
        .as_ref()
        .map(|c| c.webhook_verify_token.clone())
        .unwrap_or_default();

    let channel: Arc<dyn Channel> = match (&whatsapp, cli.dry_run) {
        (Some(wa_config), false) => {
            let mut channel = WhatsAppChannel::new(wa_config.clone());
            channel
                .connect()
                .await
                .context("connecting WhatsApp channel")?;
            Arc::new(channel)
        }
        _ => {
            if cli.dry_run {
                tracing::info!("Dry run: using the mock channel");
            } else {
                tracing::warn!("No channel configured — using the mock channel");
            }
            Arc::new(MockChannel::new())
        }
    };

    let engine = Arc::new(CampaignEngine::new(store, channel, config.window.clone()));
    engine.spawn_background();

    blastclaw_gateway::start(engine, &config.gateway, verify_token)
        .await
        .context("gateway server")?;
    Ok(())
}
