//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the gateway starts against a local LND
//! node with zero configuration, except console credentials which must be
//! supplied.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use lnurld_shared::account::validate_account_name;
use lnurld_shared::Account;
use lnurld_shared::constants::{MAX_FEE_PERCENT, MAX_REQUEST_EXPIRY_SECS, MIN_REQUEST_EXPIRY_SECS};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("CONSOLE_CREDENTIALS must define at least one user")]
    NoCredentials,

    #[error("Failed to read {name}: {reason}")]
    File { name: &'static str, reason: String },

    #[error("Invalid account {name}: {reason}")]
    InvalidAccount { name: String, reason: String },
}

/// A console login. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsoleCredential {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for ConsoleCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleCredential")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `HTTP_ADDR`, default `127.0.0.1:8088`
    pub http_addr: SocketAddr,

    /// Base URL wallets use to reach this server; LNURL callbacks are built
    /// from it.
    /// Env: `PUBLIC_URL`, default `http://127.0.0.1:8088`
    pub public_url: String,

    /// Env: `DATA_DIR`, default `./data`
    pub data_dir: PathBuf,

    /// Env: `LND_REST_URL`, default `https://127.0.0.1:8080`
    pub lnd_rest_url: String,

    /// Env: `LND_MACAROON_FILE`
    pub lnd_macaroon_file: Option<PathBuf>,

    /// Takes precedence over the file.
    /// Env: `LND_MACAROON_HEX`
    pub lnd_macaroon_hex: Option<String>,

    /// PEM certificate of the node's REST endpoint.
    /// Env: `LND_CERT_FILE`
    pub lnd_cert_file: Option<PathBuf>,

    /// Env: `CONSOLE_CREDENTIALS` as `user:password,user2:password2`
    pub console_credentials: Vec<ConsoleCredential>,

    /// Env: `AUTH_REQUEST_EXPIRY_SECS`, default 300
    pub auth_request_expiry_secs: u64,

    /// Env: `WITHDRAWAL_REQUEST_EXPIRY_SECS`, default 300
    pub withdrawal_request_expiry_secs: u64,

    /// Env: `WITHDRAWAL_FEE_PERCENT`, default 0
    pub withdrawal_fee_percent: f64,

    /// Env: `INVOICE_CACHE_CAPACITY`, default 1024
    pub invoice_cache_capacity: usize,

    /// Env: `INVOICE_EXPIRY_SECS`, default 300
    pub invoice_expiry_secs: u64,

    /// x-only public key (hex) the zap receipt publisher signs with. Zaps are
    /// only advertised when set.
    /// Env: `NOSTR_PUBKEY`
    pub nostr_pubkey: Option<String>,

    /// JSON object of Lightning Address accounts keyed by name.
    /// Env: `ACCOUNTS_FILE`
    pub accounts_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([127, 0, 0, 1], 8088).into(),
            public_url: "http://127.0.0.1:8088".to_string(),
            data_dir: PathBuf::from("./data"),
            lnd_rest_url: "https://127.0.0.1:8080".to_string(),
            lnd_macaroon_file: None,
            lnd_macaroon_hex: None,
            lnd_cert_file: None,
            console_credentials: Vec::new(),
            auth_request_expiry_secs: 300,
            withdrawal_request_expiry_secs: 300,
            withdrawal_fee_percent: 0.0,
            invoice_cache_capacity: 1024,
            invoice_expiry_secs: 300,
            nostr_pubkey: None,
            accounts_file: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        parse_var("HTTP_ADDR", &mut config.http_addr);

        if let Ok(url) = std::env::var("PUBLIC_URL") {
            config.public_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(path) = std::env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("LND_REST_URL") {
            config.lnd_rest_url = url.trim_end_matches('/').to_string();
        }

        config.lnd_macaroon_file = non_empty_var("LND_MACAROON_FILE").map(PathBuf::from);
        config.lnd_macaroon_hex = non_empty_var("LND_MACAROON_HEX");
        config.lnd_cert_file = non_empty_var("LND_CERT_FILE").map(PathBuf::from);

        if let Ok(value) = std::env::var("CONSOLE_CREDENTIALS") {
            config.console_credentials = parse_credentials(&value);
        }

        parse_var("AUTH_REQUEST_EXPIRY_SECS", &mut config.auth_request_expiry_secs);
        parse_var(
            "WITHDRAWAL_REQUEST_EXPIRY_SECS",
            &mut config.withdrawal_request_expiry_secs,
        );
        parse_var("WITHDRAWAL_FEE_PERCENT", &mut config.withdrawal_fee_percent);
        parse_var("INVOICE_CACHE_CAPACITY", &mut config.invoice_cache_capacity);
        parse_var("INVOICE_EXPIRY_SECS", &mut config.invoice_expiry_secs);

        config.nostr_pubkey = non_empty_var("NOSTR_PUBKEY");
        config.accounts_file = non_empty_var("ACCOUNTS_FILE").map(PathBuf::from);

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let expiry_range = (MIN_REQUEST_EXPIRY_SECS as f64, MAX_REQUEST_EXPIRY_SECS as f64);
        check_range(
            "AUTH_REQUEST_EXPIRY_SECS",
            self.auth_request_expiry_secs as f64,
            expiry_range,
        )?;
        check_range(
            "WITHDRAWAL_REQUEST_EXPIRY_SECS",
            self.withdrawal_request_expiry_secs as f64,
            expiry_range,
        )?;
        check_range(
            "WITHDRAWAL_FEE_PERCENT",
            self.withdrawal_fee_percent,
            (0.0, MAX_FEE_PERCENT),
        )?;
        check_range(
            "INVOICE_CACHE_CAPACITY",
            self.invoice_cache_capacity as f64,
            (1.0, f64::MAX),
        )?;
        check_range(
            "INVOICE_EXPIRY_SECS",
            self.invoice_expiry_secs as f64,
            (1.0, f64::MAX),
        )?;
        if self.console_credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }
        Ok(())
    }

    /// Macaroon for the node's REST API, hex-encoded.
    pub fn lnd_macaroon(&self) -> Result<Option<String>, ConfigError> {
        if let Some(hex) = &self.lnd_macaroon_hex {
            return Ok(Some(hex.clone()));
        }
        match &self.lnd_macaroon_file {
            Some(path) => std::fs::read(path)
                .map(|bytes| Some(hex::encode(bytes)))
                .map_err(|e| ConfigError::File {
                    name: "LND_MACAROON_FILE",
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn lnd_cert_pem(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        match &self.lnd_cert_file {
            Some(path) => std::fs::read(path).map(Some).map_err(|e| ConfigError::File {
                name: "LND_CERT_FILE",
                reason: e.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Accounts from `ACCOUNTS_FILE`, validated. None configured is fine.
    pub fn load_accounts(&self) -> Result<BTreeMap<String, Account>, ConfigError> {
        let Some(path) = &self.accounts_file else {
            return Ok(BTreeMap::new());
        };
        let file_error = |reason: String| ConfigError::File {
            name: "ACCOUNTS_FILE",
            reason,
        };
        let json = std::fs::read(path).map_err(|e| file_error(e.to_string()))?;
        let accounts: BTreeMap<String, Account> =
            serde_json::from_slice(&json).map_err(|e| file_error(e.to_string()))?;

        for (name, account) in &accounts {
            validate_account_name(name)
                .and_then(|()| account.validate())
                .map_err(|e| ConfigError::InvalidAccount {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(accounts)
    }

    /// Host part of the public URL, used in calendar UIDs.
    pub fn public_host(&self) -> &str {
        let without_scheme = self
            .public_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.public_url);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(value) = std::env::var(name) {
        match value.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(value = %value, "Invalid {name}, using default"),
        }
    }
}

fn check_range(name: &'static str, value: f64, (min, max): (f64, f64)) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            name,
            min,
            max,
            value,
        });
    }
    Ok(())
}

/// Parse `user:password` pairs separated by commas. Malformed entries are
/// skipped with a warning.
fn parse_credentials(value: &str) -> Vec<ConsoleCredential> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once(':') {
            Some((user, password)) if !user.is_empty() && !password.is_empty() => {
                Some(ConsoleCredential {
                    user: user.to_string(),
                    password: password.to_string(),
                })
            }
            _ => {
                tracing::warn!("Ignoring malformed CONSOLE_CREDENTIALS entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        ServerConfig {
            console_credentials: parse_credentials("satoshi:4dm!nS3cr3t"),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 8088).into());
        assert_eq!(config.auth_request_expiry_secs, 300);
        assert_eq!(config.withdrawal_fee_percent, 0.0);
        assert_eq!(config.invoice_cache_capacity, 1024);
        assert_eq!(config.validate(), Err(ConfigError::NoCredentials));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_ranges() {
        let config = ServerConfig {
            withdrawal_fee_percent: 10.5,
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "WITHDRAWAL_FEE_PERCENT", .. })
        ));

        let config = ServerConfig {
            auth_request_expiry_secs: 59,
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            withdrawal_request_expiry_secs: 601,
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            invoice_cache_capacity: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_credentials() {
        let credentials = parse_credentials("satoshi:4dm!n:S3cr3t, hal:pw ,broken,:nouser,");
        assert_eq!(credentials.len(), 2);
        assert_eq!(credentials[0].user, "satoshi");
        assert_eq!(credentials[0].password, "4dm!n:S3cr3t");
        assert_eq!(credentials[1].user, "hal");
        assert!(!format!("{:?}", credentials[0]).contains("S3cr3t"));
    }

    #[test]
    fn test_public_host() {
        let config = ServerConfig {
            public_url: "https://lnurld.example/base".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(config.public_host(), "lnurld.example");
    }

    #[test]
    fn test_load_accounts() {
        assert!(valid_config().load_accounts().unwrap().is_empty());

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("accounts.json");
        std::fs::write(
            &path,
            r#"{
                "bar": { "description": "Tips for the bar", "minSendable": 100, "maxSendable": 100000, "commentAllowed": 140 },
                "club": { "description": "Club fees", "minSendable": 1000, "maxSendable": 1000, "currency": "chf" }
            }"#,
        )
        .unwrap();
        let config = ServerConfig {
            accounts_file: Some(path.clone()),
            ..valid_config()
        };
        let accounts = config.load_accounts().unwrap();
        assert_eq!(accounts.keys().collect::<Vec<_>>(), vec!["bar", "club"]);
        assert_eq!(accounts["bar"].comment_allowed, 140);
        assert_eq!(accounts["club"].comment_allowed, 0);

        std::fs::write(
            &path,
            r#"{ "bar": { "description": "Tips", "minSendable": 500, "maxSendable": 100 } }"#,
        )
        .unwrap();
        assert!(matches!(
            config.load_accounts(),
            Err(ConfigError::InvalidAccount { name, .. }) if name == "bar"
        ));

        std::fs::write(
            &path,
            r#"{ "Bar/../x": { "description": "Tips", "minSendable": 1, "maxSendable": 100 } }"#,
        )
        .unwrap();
        assert!(config.load_accounts().is_err());

        let missing = ServerConfig {
            accounts_file: Some(dir.path().join("missing.json")),
            ..valid_config()
        };
        assert!(matches!(
            missing.load_accounts(),
            Err(ConfigError::File { name: "ACCOUNTS_FILE", .. })
        ));
    }

    #[test]
    fn test_macaroon_hex_takes_precedence() {
        let config = ServerConfig {
            lnd_macaroon_hex: Some("0201".to_string()),
            lnd_macaroon_file: Some(PathBuf::from("/nonexistent")),
            ..ServerConfig::default()
        };
        assert_eq!(config.lnd_macaroon().unwrap(), Some("0201".to_string()));
    }
}
