//! Invoice Gateway: issues invoices on the payment node and resolves their
//! state, caching only invoices that can no longer change.

use std::sync::Arc;

use lnurld_shared::{Invoice, PaymentHash};
use tracing::{debug, error, info};

use crate::cache::{BoundedCache, Clock};
use crate::error::ServerError;
use crate::node::{DecodedPaymentRequest, InvoiceRequest, NodeError, PaymentNode};

pub struct InvoiceGateway {
    node: Arc<dyn PaymentNode>,
    settled: BoundedCache<PaymentHash, Invoice>,
    expiry_secs: u64,
}

impl InvoiceGateway {
    pub fn new(
        node: Arc<dyn PaymentNode>,
        cache_capacity: usize,
        expiry_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            node,
            settled: BoundedCache::new("invoices", cache_capacity, None, clock),
            expiry_secs,
        }
    }

    pub fn expiry_secs(&self) -> u64 {
        self.expiry_secs
    }

    pub async fn create_invoice(
        &self,
        amount_msat: i64,
        memo: &str,
        description_hash: Option<[u8; 32]>,
    ) -> Result<Invoice, ServerError> {
        if amount_msat <= 0 {
            return Err(ServerError::BadRequest("amount must be positive".into()));
        }
        let request = InvoiceRequest {
            amount_msat,
            memo: memo.to_string(),
            description_hash,
            expiry_secs: self.expiry_secs,
        };
        let invoice = self.node.add_invoice(&request).await.map_err(|e| {
            error!(error = %e, amount_msat, "Failed to create invoice");
            ServerError::from(e)
        })?;
        info!(payment_hash = %invoice.payment_hash, amount_msat, "Invoice created");
        Ok(invoice)
    }

    /// Current state of an invoice, or `None` if the node does not know it.
    pub async fn get_invoice(
        &self,
        payment_hash: &PaymentHash,
    ) -> Result<Option<Invoice>, ServerError> {
        if let Some(invoice) = self.settled.get(payment_hash).await {
            debug!(payment_hash = %payment_hash, "Invoice served from cache");
            return Ok(Some(invoice));
        }

        let invoice = self.node.lookup_invoice(payment_hash).await.map_err(|e| {
            error!(error = %e, payment_hash = %payment_hash, "Invoice lookup failed");
            ServerError::from(e)
        })?;

        if let Some(invoice) = &invoice {
            if invoice.is_terminal() {
                self.settled.insert(*payment_hash, invoice.clone()).await;
            }
        }
        Ok(invoice)
    }

    pub async fn is_settled(&self, payment_hash: &PaymentHash) -> Result<bool, ServerError> {
        Ok(self
            .get_invoice(payment_hash)
            .await?
            .is_some_and(|invoice| invoice.is_settled()))
    }

    pub async fn decode_payment_request(
        &self,
        payment_request: &str,
    ) -> Result<DecodedPaymentRequest, ServerError> {
        self.node
            .decode_payment_request(payment_request)
            .await
            .map_err(|e| match e {
                NodeError::Unreachable(_) => {
                    error!(error = %e, "Failed to decode payment request");
                    ServerError::from(e)
                }
                other => ServerError::BadRequest(format!("invalid payment request: {other}")),
            })
    }

    /// Pay `payment_request` with at most `fee_limit_sats` routing fees.
    /// Never retried: a failed or ambiguous payment is reported to the caller.
    pub async fn send_payment(
        &self,
        payment_request: &str,
        fee_limit_sats: i64,
    ) -> Result<(), ServerError> {
        self.node
            .send_payment(payment_request, fee_limit_sats)
            .await
            .map_err(ServerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SystemClock;
    use crate::node::testing::MockNode;
    use lnurld_shared::InvoiceState;

    fn gateway(node: Arc<MockNode>) -> InvoiceGateway {
        InvoiceGateway::new(node, 16, 300, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_create_invoice() {
        let node = Arc::new(MockNode::default());
        let gateway = gateway(node.clone());

        let invoice = gateway.create_invoice(21_000, "1× Raffle", None).await.unwrap();
        assert_eq!(invoice.amount_msat, 21_000);
        assert_eq!(invoice.state, InvoiceState::Pending);
        assert!(invoice.preimage.is_some());

        assert!(matches!(
            gateway.create_invoice(0, "free", None).await,
            Err(ServerError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_invoices_are_not_cached() {
        let node = Arc::new(MockNode::default());
        let gateway = gateway(node.clone());
        let invoice = gateway.create_invoice(21_000, "memo", None).await.unwrap();
        let hash = invoice.payment_hash;

        assert!(!gateway.is_settled(&hash).await.unwrap());
        assert!(!gateway.is_settled(&hash).await.unwrap());
        assert_eq!(*node.lookups.lock().unwrap(), 2);

        node.settle(&hash);
        assert!(gateway.is_settled(&hash).await.unwrap());
        assert!(gateway.is_settled(&hash).await.unwrap());
        assert_eq!(*node.lookups.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_terminal_invoice_served_while_node_down() {
        let node = Arc::new(MockNode::default());
        let gateway = gateway(node.clone());
        let hash = gateway
            .create_invoice(21_000, "memo", None)
            .await
            .unwrap()
            .payment_hash;
        node.set_state(&hash, InvoiceState::Canceled);
        assert!(gateway.get_invoice(&hash).await.unwrap().is_some());

        node.set_unreachable(true);
        let cached = gateway.get_invoice(&hash).await.unwrap().unwrap();
        assert_eq!(cached.state, InvoiceState::Canceled);
    }

    #[tokio::test]
    async fn test_decode_payment_request_errors() {
        let node = Arc::new(MockNode::default());
        let gateway = gateway(node.clone());
        let pr = node.register_payment_request(1_000);
        assert_eq!(gateway.decode_payment_request(&pr).await.unwrap().amount_sats, 1_000);

        assert!(matches!(
            gateway.decode_payment_request("lnbcrtunknown").await,
            Err(ServerError::BadRequest(_))
        ));

        node.set_unreachable(true);
        assert!(matches!(
            gateway.decode_payment_request(&pr).await,
            Err(ServerError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_invoice_and_unreachable_node() {
        let node = Arc::new(MockNode::default());
        let gateway = gateway(node.clone());
        assert!(gateway.get_invoice(&PaymentHash([9u8; 32])).await.unwrap().is_none());

        node.set_unreachable(true);
        assert!(matches!(
            gateway.get_invoice(&PaymentHash([9u8; 32])).await,
            Err(ServerError::UpstreamUnavailable(_))
        ));
    }
}
