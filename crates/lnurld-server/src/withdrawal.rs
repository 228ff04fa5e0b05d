//! LNURL-withdraw grants.
//!
//! A grant lives in a small expiring cache keyed by its k1 and pays out to a
//! wallet invoice at most once. The once-only guarantee comes from the
//! redemption record at the grant's destination, which is created before the
//! payment is dispatched.

use std::sync::Arc;
use std::time::Duration;

use lnurld_shared::constants::WITHDRAWAL_REQUEST_CAPACITY;
use lnurld_shared::crypto::random_k1;
use lnurld_shared::invoice::msats;
use lnurld_shared::lnurl::{WithdrawParams, WITHDRAW_REQUEST_TAG};
use lnurld_store::{RecordStore, StoreError};
use tracing::{error, info, warn};

use crate::cache::{BoundedCache, Clock};
use crate::error::ServerError;
use crate::invoices::InvoiceGateway;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalGrant {
    /// Record key created once the grant is redeemed.
    pub destination: String,
    /// Amount the wallet must invoice for, in sats.
    pub net_amount: i64,
    /// Routing fee budget in sats.
    pub fee_limit: i64,
    pub description: String,
}

/// Fee deducted from a withdrawal of `gross_amount` sats.
pub fn withdrawal_fee(gross_amount: i64, fee_percent: f64) -> i64 {
    (gross_amount as f64 * fee_percent / 100.0).floor() as i64
}

pub struct WithdrawalService {
    requests: BoundedCache<String, WithdrawalGrant>,
    fee_percent: f64,
    store: Arc<RecordStore>,
    invoices: Arc<InvoiceGateway>,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<RecordStore>,
        invoices: Arc<InvoiceGateway>,
        fee_percent: f64,
        expiry: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests: BoundedCache::new(
                "withdrawal-requests",
                WITHDRAWAL_REQUEST_CAPACITY,
                Some(expiry),
                clock,
            ),
            fee_percent,
            store,
            invoices,
        }
    }

    pub async fn create_request(
        &self,
        destination: &str,
        gross_amount: i64,
        description: &str,
    ) -> Result<String, ServerError> {
        let fee = withdrawal_fee(gross_amount, self.fee_percent);
        let net_amount = gross_amount - fee;
        if net_amount <= 0 {
            return Err(ServerError::BadRequest("nothing to withdraw".into()));
        }

        let k1 = random_k1();
        self.requests
            .insert(
                k1.clone(),
                WithdrawalGrant {
                    destination: destination.to_string(),
                    net_amount,
                    fee_limit: fee,
                    description: description.to_string(),
                },
            )
            .await;
        info!(k1 = %k1, destination, gross_amount, net_amount, fee, "Withdrawal request created");
        Ok(k1)
    }

    pub async fn get_request(&self, k1: &str) -> Option<WithdrawalGrant> {
        self.requests.get(&k1.to_string()).await
    }

    pub async fn remove_request(&self, k1: &str) {
        self.requests.remove(&k1.to_string()).await;
    }

    /// First LNURL-withdraw response for the grant behind `k1`.
    pub async fn withdraw_params(
        &self,
        k1: &str,
        callback: String,
    ) -> Result<WithdrawParams, ServerError> {
        let grant = self
            .get_request(k1)
            .await
            .ok_or(ServerError::InvalidChallenge)?;
        Ok(WithdrawParams {
            tag: WITHDRAW_REQUEST_TAG.to_string(),
            k1: k1.to_string(),
            callback,
            min_withdrawable: msats(grant.net_amount),
            max_withdrawable: msats(grant.net_amount),
            default_description: grant.description,
        })
    }

    /// Pay the wallet invoice `payment_request` from the grant behind `k1`.
    pub async fn redeem(&self, k1: &str, payment_request: &str) -> Result<(), ServerError> {
        let grant = self
            .get_request(k1)
            .await
            .ok_or(ServerError::InvalidChallenge)?;

        let decoded = self.invoices.decode_payment_request(payment_request).await?;
        if decoded.amount_sats != grant.net_amount {
            warn!(
                k1 = %k1,
                expected = grant.net_amount,
                actual = decoded.amount_sats,
                "Withdrawal invoice amount mismatch"
            );
            return Err(ServerError::AmountMismatch {
                expected: grant.net_amount,
                actual: decoded.amount_sats,
            });
        }

        match self
            .store
            .create_redemption(&grant.destination, &decoded.payment_hash)
            .await
        {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => {
                warn!(k1 = %k1, destination = %grant.destination, "Withdrawal already redeemed");
                self.remove_request(k1).await;
                return Err(ServerError::AlreadyRedeemed);
            }
            Err(e) => {
                error!(k1 = %k1, destination = %grant.destination, error = %e, "Failed to record redemption");
                return Err(e.into());
            }
        }

        if let Err(e) = self
            .invoices
            .send_payment(payment_request, grant.fee_limit)
            .await
        {
            // The redemption record already exists, so this grant can never
            // be paid again. Needs manual reconciliation.
            error!(
                k1 = %k1,
                destination = %grant.destination,
                payment_hash = %decoded.payment_hash,
                amount = grant.net_amount,
                error = %e,
                "Withdrawal payment failed after redemption was recorded"
            );
            self.remove_request(k1).await;
            return Err(e);
        }

        self.remove_request(k1).await;
        info!(
            k1 = %k1,
            destination = %grant.destination,
            payment_hash = %decoded.payment_hash,
            amount = grant.net_amount,
            "Withdrawal paid"
        );
        Ok(())
    }

    pub async fn purge_expired(&self) -> usize {
        self.requests.purge_expired().await
    }
}
