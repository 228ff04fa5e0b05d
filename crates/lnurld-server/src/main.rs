//! # lnurld-server
//!
//! LNURL gateway in front of an LND node.
//!
//! This binary provides:
//! - **LNURL-auth** login challenges bound to wallet identities
//! - **LNURL-pay** raffle ticket sales, optionally paid as Nostr zaps
//! - **Lightning Addresses** for donation accounts
//! - **LNURL-withdraw** payouts of raffle proceeds, each paid at most once
//! - **Raffle draws** with winners committed to append-only records
//! - **Events** that verified identities can sign up for
//! - **REST API** (axum) for the operator console

mod accounts;
mod api;
mod auth;
mod cache;
mod config;
mod error;
mod events;
mod invoices;
mod node;
mod raffle;
mod withdrawal;
mod zap;

use std::sync::Arc;
use std::time::Duration;

use lnurld_shared::constants::APP_NAME;
use lnurld_store::RecordStore;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::cache::SystemClock;
use crate::config::ServerConfig;
use crate::node::LndRestNode;
use crate::zap::{LogReceiptPublisher, ReceiptPublisher};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lnurld_server=debug")),
        )
        .init();

    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    config.validate()?;
    let accounts = config.load_accounts()?;
    info!(?config, "Loaded configuration");
    info!(
        public_url = %config.public_url,
        console_users = config.console_credentials.len(),
        zaps_enabled = config.nostr_pubkey.is_some(),
        accounts = accounts.len(),
        "Gateway settings"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Record store (creates directory if missing)
    let store = Arc::new(RecordStore::new(config.data_dir.clone()).await?);

    let node = Arc::new(LndRestNode::new(
        &config.lnd_rest_url,
        config.lnd_macaroon()?,
        config.lnd_cert_pem()?.as_deref(),
    )?);

    let publisher = config.nostr_pubkey.clone().map(|public_key| {
        Arc::new(LogReceiptPublisher::new(public_key)) as Arc<dyn ReceiptPublisher>
    });

    let http_addr = config.http_addr;
    let app_state = AppState::new(
        config,
        accounts,
        store,
        node,
        publisher,
        Arc::new(SystemClock),
    );

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic cleanup of expired auth challenges and withdrawal grants
    let auth = app_state.auth.clone();
    let withdrawals = app_state.withdrawals.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let challenges = auth.purge_expired().await;
            let grants = withdrawals.purge_expired().await;
            if challenges + grants > 0 {
                debug!(challenges, grants, "Purged expired requests");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
