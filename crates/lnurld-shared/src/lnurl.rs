//! LNURL wire types (LUD-03, LUD-04, LUD-06, LUD-09, LUD-57 zaps).

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

pub const PAY_REQUEST_TAG: &str = "payRequest";
pub const WITHDRAW_REQUEST_TAG: &str = "withdrawRequest";
pub const LOGIN_TAG: &str = "login";

/// First LNURL-pay response: what the wallet may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayParams {
    pub callback: String,
    pub min_sendable: i64,
    pub max_sendable: i64,
    /// JSON-encoded metadata array; its SHA-256 is the invoice description hash.
    pub metadata: String,
    pub comment_allowed: i64,
    pub allows_nostr: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nostr_pubkey: Option<String>,
    pub tag: String,
}

/// Second LNURL-pay response: the invoice to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayValues {
    pub pr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_action: Option<SuccessAction>,
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessAction {
    pub tag: String,
    pub message: String,
}

impl SuccessAction {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            tag: "message".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawParams {
    pub tag: String,
    pub k1: String,
    pub callback: String,
    pub min_withdrawable: i64,
    pub max_withdrawable: i64,
    pub default_description: String,
}

/// `{"status":"OK"}` or `{"status":"ERROR","reason":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Error,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            reason: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason: Some(reason.into()),
        }
    }
}

/// Metadata array advertised in a pay request.
pub fn pay_metadata(description: &str) -> String {
    serde_json::json!([["text/plain", description]]).to_string()
}

/// Bech32-encode a URL as an upper-case LNURL (QR-friendly alphanumeric mode).
pub fn encode_lnurl(url: &str) -> Result<String, CryptoError> {
    let hrp = Hrp::parse("lnurl").map_err(|e| CryptoError::LnurlEncoding(e.to_string()))?;
    bech32::encode_upper::<Bech32>(hrp, url.as_bytes())
        .map_err(|e| CryptoError::LnurlEncoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_lnurl() {
        let url = "https://service.com/ln/auth/verify?tag=login&k1=00";
        let encoded = encode_lnurl(url).unwrap();
        assert!(encoded.starts_with("LNURL1"));
        assert_eq!(encoded, encoded.to_uppercase());

        let (hrp, data) = bech32::decode(&encoded).unwrap();
        assert_eq!(hrp.to_lowercase(), "lnurl");
        assert_eq!(String::from_utf8(data).unwrap(), url);
    }

    #[test]
    fn test_status_response() {
        assert_eq!(
            serde_json::to_string(&StatusResponse::ok()).unwrap(),
            r#"{"status":"OK"}"#
        );
        assert_eq!(
            serde_json::to_string(&StatusResponse::error("invalid k1")).unwrap(),
            r#"{"status":"ERROR","reason":"invalid k1"}"#
        );
    }

    #[test]
    fn test_pay_params_wire_names() {
        let params = PayParams {
            callback: "https://x/cb".to_string(),
            min_sendable: 1000,
            max_sendable: 10_000,
            metadata: pay_metadata("Raffle"),
            comment_allowed: 0,
            allows_nostr: false,
            nostr_pubkey: None,
            tag: PAY_REQUEST_TAG.to_string(),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["minSendable"], 1000);
        assert_eq!(json["maxSendable"], 10_000);
        assert_eq!(json["metadata"], r#"[["text/plain","Raffle"]]"#);
        assert_eq!(json["tag"], "payRequest");
        assert!(json.get("nostrPubkey").is_none());
    }
}
