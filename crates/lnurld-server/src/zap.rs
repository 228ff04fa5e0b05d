//! Zap receipts for ticket purchases paid through Nostr zap requests.
//!
//! After the pay callback returns, a detached watcher polls the invoice until
//! it settles or expires and hands settled invoices to a
//! [`ReceiptPublisher`]. Nothing here can fail the original request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lnurld_shared::constants::NOSTR_KIND_ZAP_RECEIPT;
use lnurld_shared::{Invoice, PaymentHash, ZapRequest};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::invoices::InvoiceGateway;

/// Signs and publishes a zap receipt (kind 9735) for a settled invoice.
#[async_trait]
pub trait ReceiptPublisher: Send + Sync + 'static {
    /// x-only public key advertised as `nostrPubkey`.
    fn public_key(&self) -> &str;

    async fn publish(&self, zap: &ZapRequest, invoice: &Invoice) -> anyhow::Result<()>;
}

/// Publisher that records the hand-off in the log. Relay publishing is done
/// by an external signer.
pub struct LogReceiptPublisher {
    public_key: String,
}

impl LogReceiptPublisher {
    pub fn new(public_key: String) -> Self {
        Self { public_key }
    }
}

#[async_trait]
impl ReceiptPublisher for LogReceiptPublisher {
    fn public_key(&self) -> &str {
        &self.public_key
    }

    async fn publish(&self, zap: &ZapRequest, invoice: &Invoice) -> anyhow::Result<()> {
        info!(
            kind = NOSTR_KIND_ZAP_RECEIPT,
            payment_hash = %invoice.payment_hash,
            sender = %zap.event.pubkey,
            relays = ?zap.relays(),
            tags = ?zap.receipt_tags(),
            "Zap receipt ready"
        );
        Ok(())
    }
}

/// Poll `payment_hash` every `interval` for up to `timeout`, then publish a
/// receipt if it settled.
pub fn spawn_settlement_watcher(
    invoices: Arc<InvoiceGateway>,
    publisher: Arc<dyn ReceiptPublisher>,
    zap: ZapRequest,
    payment_hash: PaymentHash,
    interval: Duration,
    timeout: Duration,
) -> JoinHandle<bool> {
    tokio::spawn(async move {
        let watch = async {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match invoices.get_invoice(&payment_hash).await {
                    Ok(Some(invoice)) if invoice.is_settled() => return Some(invoice),
                    Ok(Some(invoice)) if invoice.is_terminal() => return None,
                    Ok(_) => {}
                    Err(e) => debug!(payment_hash = %payment_hash, error = %e, "Zap invoice poll failed"),
                }
            }
        };

        match tokio::time::timeout(timeout, watch).await {
            Ok(Some(invoice)) => match publisher.publish(&zap, &invoice).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(payment_hash = %payment_hash, error = %e, "Failed to publish zap receipt");
                    false
                }
            },
            Ok(None) => {
                debug!(payment_hash = %payment_hash, "Zap invoice canceled");
                false
            }
            Err(_) => {
                debug!(payment_hash = %payment_hash, "Zap invoice expired unpaid");
                false
            }
        }
    })
}
