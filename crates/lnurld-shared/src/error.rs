use thiserror::Error;

#[derive(Error, Debug)]
pub enum LnurldError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Ticket error: {0}")]
    Ticket(#[from] TicketError),

    #[error("Zap request error: {0}")]
    Zap(#[from] ZapError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid hex encoding")]
    InvalidHex,

    #[error("Invalid k1")]
    InvalidK1,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("LNURL encoding failed: {0}")]
    LnurlEncoding(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TicketError {
    #[error("Invalid payment hash: {0}")]
    InvalidPaymentHash(String),

    #[error("Invalid ticket quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid ticket index: {0}")]
    InvalidIndex(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ZapError {
    #[error("Malformed zap request: {0}")]
    Malformed(String),

    #[error("Not a zap request")]
    WrongKind,

    #[error("Invalid number of '{0}' tags")]
    TagCount(&'static str),

    #[error("Invalid 'amount' tag")]
    AmountMismatch,

    #[error("Invalid event id")]
    InvalidId,

    #[error("Invalid signature")]
    InvalidSignature,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}
