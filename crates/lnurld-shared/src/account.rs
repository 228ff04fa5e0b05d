//! Donation accounts reachable as Lightning Addresses (LUD-16).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_ACCOUNT_NAME_LENGTH, MAX_COMMENT_ALLOWED, MAX_TITLE_LENGTH};
use crate::error::ValidationError;
use crate::invoice::msats;
use crate::raffle::validate_text;
use crate::types::Currency;

/// A configured account. Amounts are in sats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub description: String,
    pub min_sendable: i64,
    pub max_sendable: i64,
    /// Longest comment a payer may attach; 0 disables comments.
    #[serde(default)]
    pub comment_allowed: u16,
    /// Advertise the address as `text/email` rather than `text/identifier`.
    #[serde(default)]
    pub is_also_email: bool,
    #[serde(default)]
    pub currency: Currency,
    /// Console users allowed to see the account. Empty means everyone.
    #[serde(default)]
    pub users: Vec<String>,
}

impl Account {
    pub fn min_sendable_msat(&self) -> i64 {
        msats(self.min_sendable)
    }

    pub fn max_sendable_msat(&self) -> i64 {
        msats(self.max_sendable)
    }

    pub fn accepts_amount(&self, amount_msat: i64) -> bool {
        (self.min_sendable_msat()..=self.max_sendable_msat()).contains(&amount_msat)
    }

    pub fn accepts_comment(&self, comment: &str) -> bool {
        comment.chars().count() <= self.comment_allowed as usize
    }

    pub fn is_visible_to(&self, user: &str) -> bool {
        self.users.is_empty() || self.users.iter().any(|u| u == user)
    }

    /// LUD-06 metadata with the LUD-16 address `name@host`.
    pub fn metadata(&self, name: &str, host: &str) -> String {
        let address_type = if self.is_also_email {
            "text/email"
        } else {
            "text/identifier"
        };
        serde_json::json!([
            ["text/plain", self.description],
            [address_type, format!("{name}@{host}")]
        ])
        .to_string()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_text("description", &self.description, MAX_TITLE_LENGTH)?;
        if self.max_sendable < 1 {
            return Err(ValidationError::new("maxSendable", "must be at least 1"));
        }
        if self.min_sendable < 1 || self.min_sendable > self.max_sendable {
            return Err(ValidationError::new(
                "minSendable",
                "must be between 1 and maxSendable",
            ));
        }
        if self.comment_allowed > MAX_COMMENT_ALLOWED {
            return Err(ValidationError::new(
                "commentAllowed",
                format!("must be at most {MAX_COMMENT_ALLOWED}"),
            ));
        }
        Ok(())
    }
}

/// Account names are the local part of a Lightning Address.
pub fn validate_account_name(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_ACCOUNT_NAME_LENGTH
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"-_.".contains(&b))
        && !name.starts_with('.');
    if !valid {
        return Err(ValidationError::new(
            "name",
            "must be lowercase letters, digits, '-', '_' or '.'",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountComment {
    pub amount: i64,
    pub settle_time: Option<DateTime<Utc>>,
    pub comment: String,
}

/// What an account has received so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub name: String,
    pub currency: Currency,
    pub invoices_issued: usize,
    pub invoices_settled: usize,
    pub total_sats_received: i64,
    /// Newest first.
    pub comments: Vec<AccountComment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tips() -> Account {
        Account {
            description: "Tips for the bar".to_string(),
            min_sendable: 100,
            max_sendable: 100_000,
            comment_allowed: 10,
            is_also_email: false,
            currency: Currency::Chf,
            users: Vec::new(),
        }
    }

    #[test]
    fn test_amounts_and_comments() {
        let account = tips();
        assert!(account.accepts_amount(100_000));
        assert!(account.accepts_amount(100_000_000));
        assert!(!account.accepts_amount(99_999));
        assert!(!account.accepts_amount(100_000_001));

        assert!(account.accepts_comment(""));
        assert!(account.accepts_comment("Prost! 🍺🍺"));
        assert!(!account.accepts_comment("Thanks a lot"));
    }

    #[test]
    fn test_metadata() {
        let account = tips();
        assert_eq!(
            account.metadata("bar", "lnurld.example"),
            r#"[["text/plain","Tips for the bar"],["text/identifier","bar@lnurld.example"]]"#
        );

        let email = Account {
            is_also_email: true,
            ..tips()
        };
        assert!(email
            .metadata("bar", "lnurld.example")
            .contains(r#"["text/email","bar@lnurld.example"]"#));
    }

    #[test]
    fn test_validate() {
        assert!(tips().validate().is_ok());
        for invalid in [
            Account { description: " ".into(), ..tips() },
            Account { max_sendable: 0, ..tips() },
            Account { min_sendable: 200_000, ..tips() },
            Account { comment_allowed: 2001, ..tips() },
        ] {
            assert!(invalid.validate().is_err(), "{invalid:?}");
        }
    }

    #[test]
    fn test_visibility() {
        let account = Account {
            users: vec!["satoshi".into()],
            ..tips()
        };
        assert!(account.is_visible_to("satoshi"));
        assert!(!account.is_visible_to("hal"));
        assert!(tips().is_visible_to("hal"));
    }

    #[test]
    fn test_account_names() {
        for name in ["bar", "tips-2024", "a.b_c"] {
            assert!(validate_account_name(name).is_ok(), "{name}");
        }
        for name in ["", "Bar", "../x", ".hidden", "a/b", "a b"] {
            assert!(validate_account_name(name).is_err(), "{name}");
        }
    }
}
