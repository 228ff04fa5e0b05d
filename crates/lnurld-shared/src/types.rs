use serde::{Deserialize, Serialize};

use crate::constants::{PAYMENT_HASH_SIZE, PUBLIC_ID_LENGTH};
use crate::error::CryptoError;

/// Invoice identifier: SHA-256 of the payment preimage (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentHash(pub [u8; PAYMENT_HASH_SIZE]);

impl PaymentHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim()).map_err(|_| CryptoError::InvalidHex)?;
        let arr: [u8; PAYMENT_HASH_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidHex)?;
        Ok(Self(arr))
    }

    /// Base58 rendering of the raw bytes; ticket numbers are windows into it.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Abbreviated form for logs and listings, e.g. `d643d…2fd4d`.
    pub fn short(&self) -> String {
        let hex = self.to_hex();
        format!("{}…{}", &hex[..5], &hex[hex.len() - 5..])
    }
}

impl std::fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for PaymentHash {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for PaymentHash {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<PaymentHash> for String {
    fn from(value: PaymentHash) -> Self {
        value.to_hex()
    }
}

/// A hex-encoded public key bound to a verified LNURL-auth challenge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short public display id: first 7 base58 symbols of the raw key bytes.
    ///
    /// Keeps the full key out of listings. Keys that are not valid hex (or
    /// shorter than 7 bytes) render as `unknown`.
    pub fn public_id(&self) -> String {
        match hex::decode(&self.0) {
            Ok(bytes) if bytes.len() >= PUBLIC_ID_LENGTH => bs58::encode(bytes)
                .into_string()
                .chars()
                .take(PUBLIC_ID_LENGTH)
                .collect(),
            _ => "unknown".to_string(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Cad,
    Chf,
    Czk,
    #[default]
    Eur,
    Gbp,
    Usd,
}

impl Currency {
    pub fn all() -> [Currency; 6] {
        [
            Currency::Cad,
            Currency::Chf,
            Currency::Czk,
            Currency::Eur,
            Currency::Gbp,
            Currency::Usd,
        ]
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Cad => "cad",
            Currency::Chf => "chf",
            Currency::Czk => "czk",
            Currency::Eur => "eur",
            Currency::Gbp => "gbp",
            Currency::Usd => "usd",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "d643d24061a5410f96693978711071819a9700d38b006285246c8e227e32fd4d";

    #[test]
    fn test_payment_hash_hex() {
        let hash = PaymentHash::from_hex(HASH).unwrap();
        assert_eq!(hash.to_hex(), HASH);
        assert_eq!(hash.short(), "d643d…2fd4d");
        assert!(PaymentHash::from_hex("abcd").is_err());
        assert!(PaymentHash::from_hex("zz").is_err());
    }

    #[test]
    fn test_payment_hash_serde() {
        let hash = PaymentHash::from_hex(HASH).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{HASH}\""));
        let parsed: PaymentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_identity_public_id() {
        let identity =
            Identity::new("02c3b844b8104f0c1b15c507774c9ba7fc609f58f343b9b149122e944dd20c9362");
        assert_eq!(
            identity.as_str(),
            "02c3b844b8104f0c1b15c507774c9ba7fc609f58f343b9b149122e944dd20c9362"
        );
        assert_eq!(identity.public_id(), "pdeDCJ5");
        assert_eq!(Identity::new("invalid").public_id(), "unknown");
        assert_eq!(Identity::new("0102").public_id(), "unknown");
    }

    #[test]
    fn test_currency_serde() {
        assert_eq!(serde_json::to_string(&Currency::Czk).unwrap(), "\"czk\"");
        assert_eq!(Currency::default(), Currency::Eur);
        assert_eq!(Currency::all().len(), 6);
    }
}
