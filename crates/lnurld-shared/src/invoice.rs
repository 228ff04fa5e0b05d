use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MSATS_PER_SAT;
use crate::types::PaymentHash;

/// Lifecycle of an invoice as reported by the payment node.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Pending,
    Settled,
    Canceled,
}

/// A Lightning invoice issued through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub payment_hash: PaymentHash,
    /// BOLT11-encoded payment request.
    pub payment_request: String,
    /// Hex preimage, known once the node reveals it.
    pub preimage: Option<String>,
    pub amount_msat: i64,
    pub state: InvoiceState,
    pub settle_time: Option<DateTime<Utc>>,
    pub memo: String,
}

impl Invoice {
    pub fn is_settled(&self) -> bool {
        self.state == InvoiceState::Settled
    }

    /// Settled and canceled invoices never change again and may be cached.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, InvoiceState::Settled | InvoiceState::Canceled)
    }

    pub fn amount_sats(&self) -> i64 {
        self.amount_msat / MSATS_PER_SAT
    }
}

pub fn msats(sats: i64) -> i64 {
    sats * MSATS_PER_SAT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(state: InvoiceState) -> Invoice {
        Invoice {
            payment_hash: PaymentHash([7u8; 32]),
            payment_request: "lnbc210n1...".to_string(),
            preimage: None,
            amount_msat: 21_000,
            state,
            settle_time: None,
            memo: String::new(),
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!invoice(InvoiceState::Pending).is_terminal());
        assert!(invoice(InvoiceState::Settled).is_terminal());
        assert!(invoice(InvoiceState::Canceled).is_terminal());
        assert!(!invoice(InvoiceState::Canceled).is_settled());
    }

    #[test]
    fn test_amounts() {
        assert_eq!(invoice(InvoiceState::Settled).amount_sats(), 21);
        assert_eq!(msats(21), 21_000);
    }
}
