//! Payment node RPC.
//!
//! [`PaymentNode`] is the seam between the engines and the Lightning node;
//! [`LndRestNode`] implements it against LND's REST API.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use lnurld_shared::{Invoice, InvoiceState, PaymentHash};
use rand::RngCore;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Node unreachable: {0}")]
    Unreachable(String),

    #[error("Node rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid node response: {0}")]
    InvalidResponse(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),
}

#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub amount_msat: i64,
    pub memo: String,
    /// SHA-256 commitment embedded in the invoice instead of the memo.
    pub description_hash: Option<[u8; 32]>,
    pub expiry_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPaymentRequest {
    pub payment_hash: PaymentHash,
    pub amount_sats: i64,
}

#[async_trait]
pub trait PaymentNode: Send + Sync + 'static {
    async fn add_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, NodeError>;

    /// `None` if the node does not know the payment hash.
    async fn lookup_invoice(&self, payment_hash: &PaymentHash)
        -> Result<Option<Invoice>, NodeError>;

    async fn decode_payment_request(
        &self,
        payment_request: &str,
    ) -> Result<DecodedPaymentRequest, NodeError>;

    async fn send_payment(&self, payment_request: &str, fee_limit_sats: i64)
        -> Result<(), NodeError>;
}

// ---------------------------------------------------------------------------
// LND REST
// ---------------------------------------------------------------------------

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

pub struct LndRestNode {
    client: reqwest::Client,
    base_url: String,
    macaroon_hex: Option<String>,
}

impl LndRestNode {
    pub fn new(
        base_url: &str,
        macaroon_hex: Option<String>,
        cert_pem: Option<&[u8]>,
    ) -> Result<Self, NodeError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60));
        if let Some(pem) = cert_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| NodeError::InvalidResponse(format!("invalid certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| NodeError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            macaroon_hex,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(macaroon) = &self.macaroon_hex {
            request = request.header(MACAROON_HEADER, macaroon);
        }
        request
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, NodeError> {
        let response = request
            .send()
            .await
            .map_err(|e| NodeError::Unreachable(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<LndErrorBody>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            if message.contains("unable to locate invoice") {
                return Ok(None);
            }
            return Err(NodeError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| NodeError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentNode for LndRestNode {
    async fn add_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, NodeError> {
        let mut preimage = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut preimage);

        let mut body = serde_json::json!({
            "r_preimage": BASE64.encode(preimage),
            "value_msat": request.amount_msat.to_string(),
            "memo": request.memo,
            "expiry": request.expiry_secs.to_string(),
        });
        if let Some(hash) = request.description_hash {
            body["description_hash"] = BASE64.encode(hash).into();
        }

        let added: LndAddInvoiceResponse = self
            .send(self.request(reqwest::Method::POST, "/v1/invoices").json(&body))
            .await?
            .ok_or_else(|| NodeError::InvalidResponse("invoice endpoint not found".into()))?;

        let payment_hash = decode_hash(&added.r_hash)?;
        debug!(payment_hash = %payment_hash, amount_msat = request.amount_msat, "Invoice added");

        Ok(Invoice {
            payment_hash,
            payment_request: added.payment_request,
            preimage: Some(hex::encode(preimage)),
            amount_msat: request.amount_msat,
            state: InvoiceState::Pending,
            settle_time: None,
            memo: request.memo.clone(),
        })
    }

    async fn lookup_invoice(
        &self,
        payment_hash: &PaymentHash,
    ) -> Result<Option<Invoice>, NodeError> {
        let path = format!("/v1/invoice/{}", payment_hash.to_hex());
        let invoice: Option<LndInvoice> = self.send(self.request(reqwest::Method::GET, &path)).await?;
        invoice.map(LndInvoice::into_invoice).transpose()
    }

    async fn decode_payment_request(
        &self,
        payment_request: &str,
    ) -> Result<DecodedPaymentRequest, NodeError> {
        check_payment_request(payment_request)?;
        let path = format!("/v1/payreq/{payment_request}");
        let decoded: LndPayReq = self
            .send(self.request(reqwest::Method::GET, &path))
            .await?
            .ok_or_else(|| NodeError::InvalidResponse("payment request not decodable".into()))?;

        Ok(DecodedPaymentRequest {
            payment_hash: PaymentHash::from_hex(&decoded.payment_hash)
                .map_err(|e| NodeError::InvalidResponse(e.to_string()))?,
            amount_sats: decoded.num_satoshis,
        })
    }

    async fn send_payment(&self, payment_request: &str, fee_limit_sats: i64) -> Result<(), NodeError> {
        let body = serde_json::json!({
            "payment_request": payment_request,
            "fee_limit": { "fixed": fee_limit_sats.to_string() },
        });
        let result: LndSendResponse = self
            .send(
                self.request(reqwest::Method::POST, "/v1/channels/transactions")
                    .json(&body),
            )
            .await?
            .ok_or_else(|| NodeError::InvalidResponse("payment endpoint not found".into()))?;

        if !result.payment_error.is_empty() {
            warn!(error = %result.payment_error, "Payment failed");
            return Err(NodeError::PaymentFailed(result.payment_error));
        }
        Ok(())
    }
}

/// BOLT 11 strings are bech32: ASCII letters and digits only. Anything else
/// never reaches a node URL.
fn check_payment_request(payment_request: &str) -> Result<(), NodeError> {
    if payment_request.is_empty() || !payment_request.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(NodeError::Rejected {
            status: 400,
            message: "malformed payment request".into(),
        });
    }
    Ok(())
}

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

fn decode_hash(encoded: &str) -> Result<PaymentHash, NodeError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| NodeError::InvalidResponse(format!("r_hash: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| NodeError::InvalidResponse("r_hash is not 32 bytes".into()))?;
    Ok(PaymentHash(bytes))
}

/// LND renders 64-bit integers as JSON strings.
fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }
    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(value) => Ok(value),
        IntOrString::Str(value) if value.is_empty() => Ok(0),
        IntOrString::Str(value) => value.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
struct LndErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct LndAddInvoiceResponse {
    r_hash: String,
    payment_request: String,
}

#[derive(Debug, Deserialize)]
struct LndInvoice {
    #[serde(default)]
    memo: String,
    #[serde(default)]
    r_preimage: String,
    r_hash: String,
    #[serde(default, deserialize_with = "de_i64")]
    value_msat: i64,
    #[serde(default, deserialize_with = "de_i64")]
    settle_date: i64,
    #[serde(default)]
    payment_request: String,
    #[serde(default)]
    state: String,
}

impl LndInvoice {
    fn into_invoice(self) -> Result<Invoice, NodeError> {
        let state = match self.state.as_str() {
            "SETTLED" => InvoiceState::Settled,
            "CANCELED" => InvoiceState::Canceled,
            // OPEN and ACCEPTED (held) are not final
            _ => InvoiceState::Pending,
        };
        let settle_time: Option<DateTime<Utc>> = match state {
            InvoiceState::Settled if self.settle_date > 0 => {
                Utc.timestamp_opt(self.settle_date, 0).single()
            }
            _ => None,
        };
        let preimage = BASE64
            .decode(&self.r_preimage)
            .ok()
            .filter(|bytes| !bytes.is_empty())
            .map(hex::encode);

        Ok(Invoice {
            payment_hash: decode_hash(&self.r_hash)?,
            payment_request: self.payment_request,
            preimage,
            amount_msat: self.value_msat,
            state,
            settle_time,
            memo: self.memo,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LndPayReq {
    payment_hash: String,
    #[serde(default, deserialize_with = "de_i64")]
    num_satoshis: i64,
}

#[derive(Debug, Deserialize)]
struct LndSendResponse {
    #[serde(default)]
    payment_error: String,
}

// ---------------------------------------------------------------------------
// In-memory node for tests
// ---------------------------------------------------------------------------
