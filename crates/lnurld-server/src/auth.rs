//! LNURL-auth challenges and console sessions.

use std::sync::Arc;
use std::time::Duration;

use lnurld_shared::constants::AUTH_CHALLENGE_CAPACITY;
use lnurld_shared::crypto::{access_token, random_k1, verify_k1_signature};
use lnurld_shared::Identity;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use crate::cache::{BoundedCache, Clock};
use crate::config::ConsoleCredential;
use crate::error::ServerError;

/// Issues LNURL-auth challenges and binds each to at most one identity.
///
/// An entry holding `None` is an issued challenge; `Some(identity)` is a
/// verified one. Verified challenges never change again.
pub struct AuthenticationService {
    challenges: BoundedCache<String, Option<Identity>>,
}

impl AuthenticationService {
    pub fn new(expiry: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            challenges: BoundedCache::new(
                "auth-challenges",
                AUTH_CHALLENGE_CAPACITY,
                Some(expiry),
                clock,
            ),
        }
    }

    pub async fn generate_challenge(&self) -> String {
        let k1 = random_k1();
        self.challenges.insert(k1.clone(), None).await;
        debug!(k1 = %k1, "Issued auth challenge");
        k1
    }

    pub async fn verify_challenge(&self, k1: &str, sig: &str, key: &str) -> Result<(), ServerError> {
        let identity = Identity::new(key.to_lowercase());
        self.challenges
            .with_entry(&k1.to_string(), |entry| -> Result<(), ServerError> {
                match entry {
                    Some(slot) if slot.is_none() => {
                        verify_k1_signature(k1, sig, key)?;
                        *slot = Some(identity.clone());
                        Ok(())
                    }
                    _ => Err(ServerError::InvalidChallenge),
                }
            })
            .await?;

        info!(k1 = %k1, public_id = %identity.public_id(), "Challenge verified");
        Ok(())
    }

    /// Identity bound to `k1`, once verified.
    pub async fn get_identity(&self, k1: &str) -> Option<Identity> {
        self.challenges.get(&k1.to_string()).await.flatten()
    }

    pub async fn purge_expired(&self) -> usize {
        self.challenges.purge_expired().await
    }
}

#[cfg(test)]
impl AuthenticationService {
    /// Register a known k1 so fixed signature vectors can be verified.
    pub(crate) async fn insert_challenge_for_test(&self, k1: &str) {
        self.challenges.insert(k1.to_string(), None).await;
    }
}

/// Console logins, fixed at start-up.
///
/// Each credential is reduced to an access token; changing a password needs
/// a restart.
pub struct ConsoleSessions {
    tokens: Vec<(String, String)>,
}

impl ConsoleSessions {
    pub fn new(credentials: &[ConsoleCredential]) -> Self {
        let tokens = credentials
            .iter()
            .map(|c| (access_token(&c.user, &c.password), c.user.clone()))
            .collect();
        Self { tokens }
    }

    pub fn verify_credentials(&self, user: &str, password: &str) -> bool {
        self.get_user(&access_token(user, password))
            .is_some_and(|u| u == user)
    }

    pub fn get_token(&self, user: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find(|(_, u)| u == user)
            .map(|(token, _)| token.as_str())
    }

    /// User owning `token`, compared in constant time.
    pub fn get_user(&self, token: &str) -> Option<String> {
        let mut found = None;
        for (expected, user) in &self.tokens {
            if expected.len() == token.len() && bool::from(expected.as_bytes().ct_eq(token.as_bytes())) {
                found = Some(user.clone());
            }
        }
        found
    }
}
