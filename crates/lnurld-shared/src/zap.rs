//! Nostr zap requests (NIP-57, kind 9734) attached to LNURL-pay callbacks.
//!
//! Only validation lives here. Signing and publishing the zap receipt is the
//! job of a receipt publisher.

use secp256k1::{schnorr, Message, XOnlyPublicKey, SECP256K1};
use serde::{Deserialize, Serialize};

use crate::constants::NOSTR_KIND_ZAP_REQUEST;
use crate::crypto::sha256;
use crate::error::ZapError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostrEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl NostrEvent {
    /// NIP-01 event id: SHA-256 of `[0, pubkey, created_at, kind, tags, content]`.
    pub fn compute_id(&self) -> [u8; 32] {
        let serialized = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ])
        .to_string();
        sha256(serialized.as_bytes())
    }

    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Vec<String>> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
    }

    pub fn first_tag<'a>(&'a self, name: &'a str) -> Option<&'a Vec<String>> {
        self.tags_named(name).next()
    }

    fn verify_signature(&self) -> Result<(), ZapError> {
        let id = self.compute_id();
        if hex::encode(id) != self.id {
            return Err(ZapError::InvalidId);
        }

        let pubkey_bytes = hex::decode(&self.pubkey).map_err(|_| ZapError::InvalidSignature)?;
        let pubkey =
            XOnlyPublicKey::from_slice(&pubkey_bytes).map_err(|_| ZapError::InvalidSignature)?;
        let sig_bytes = hex::decode(&self.sig).map_err(|_| ZapError::InvalidSignature)?;
        let signature =
            schnorr::Signature::from_slice(&sig_bytes).map_err(|_| ZapError::InvalidSignature)?;

        SECP256K1
            .verify_schnorr(&signature, &Message::from_digest(id), &pubkey)
            .map_err(|_| ZapError::InvalidSignature)
    }
}

/// A validated zap request together with its original JSON text.
#[derive(Debug, Clone)]
pub struct ZapRequest {
    pub event: NostrEvent,
    /// Exactly as received; hashed into the invoice description.
    pub raw: String,
}

impl ZapRequest {
    /// Parse and validate a zap request sent along with a pay callback for
    /// `amount_msat`.
    pub fn parse(raw: &str, amount_msat: i64) -> Result<Self, ZapError> {
        let event: NostrEvent =
            serde_json::from_str(raw).map_err(|e| ZapError::Malformed(e.to_string()))?;

        if event.kind != NOSTR_KIND_ZAP_REQUEST {
            return Err(ZapError::WrongKind);
        }
        if event.tags_named("p").count() != 1 {
            return Err(ZapError::TagCount("p"));
        }
        if event.tags_named("e").count() > 1 {
            return Err(ZapError::TagCount("e"));
        }
        if event.tags_named("relays").count() != 1 {
            return Err(ZapError::TagCount("relays"));
        }
        if let Some(tag) = event.first_tag("amount") {
            if tag.get(1) != Some(&amount_msat.to_string()) {
                return Err(ZapError::AmountMismatch);
            }
        }
        event.verify_signature()?;

        Ok(Self {
            event,
            raw: raw.to_string(),
        })
    }

    pub fn description_hash(&self) -> [u8; 32] {
        sha256(self.raw.as_bytes())
    }

    /// Relays the sender asked the receipt to be published to.
    pub fn relays(&self) -> Vec<String> {
        self.event
            .first_tag("relays")
            .map(|tag| tag.iter().skip(1).cloned().collect())
            .unwrap_or_default()
    }

    /// Tags copied into the zap receipt: `p`, and `e`/`a` when present.
    pub fn receipt_tags(&self) -> Vec<Vec<String>> {
        let mut tags: Vec<Vec<String>> = self.event.tags_named("p").cloned().collect();
        for name in ["e", "a"] {
            if let Some(tag) = self.event.first_tag(name) {
                tags.push(tag.clone());
            }
        }
        tags
    }
}
