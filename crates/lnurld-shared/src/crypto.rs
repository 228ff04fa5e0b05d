use base64::Engine;
use rand::RngCore;
use secp256k1::{ecdsa::Signature, Message, PublicKey, SECP256K1};
use sha2::{Digest, Sha256};

use crate::constants::{K1_SIZE, RECORD_ID_SIZE};
use crate::error::CryptoError;

/// Fresh 32-byte challenge, hex-encoded.
pub fn random_k1() -> String {
    let mut k1 = [0u8; K1_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut k1);
    hex::encode(k1)
}

/// Short random record id (base58 of 5 random bytes).
pub fn random_id() -> String {
    let mut id = [0u8; RECORD_ID_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut id);
    bs58::encode(id).into_string()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Console access token: base64(SHA-256(user ":" password)).
pub fn access_token(user: &str, password: &str) -> String {
    let hash = sha256(format!("{user}:{password}").as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Verify an LNURL-auth (LUD-04) signature: DER-encoded secp256k1 ECDSA over
/// the raw k1 bytes, under a compressed public key. All inputs are hex.
pub fn verify_k1_signature(k1: &str, sig: &str, key: &str) -> Result<(), CryptoError> {
    let k1_bytes = hex::decode(k1).map_err(|_| CryptoError::InvalidK1)?;
    let message = Message::from_digest_slice(&k1_bytes).map_err(|_| CryptoError::InvalidK1)?;

    let sig_bytes = hex::decode(sig).map_err(|_| CryptoError::InvalidSignature)?;
    let mut signature =
        Signature::from_der(&sig_bytes).map_err(|_| CryptoError::InvalidSignature)?;
    // wallets are not required to produce low-S signatures
    signature.normalize_s();

    let key_bytes = hex::decode(key).map_err(|_| CryptoError::InvalidPublicKey)?;
    let public_key = PublicKey::from_slice(&key_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;

    SECP256K1
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| CryptoError::InvalidSignature)
}
