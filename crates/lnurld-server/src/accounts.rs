//! Donation accounts reachable as Lightning Addresses.
//!
//! Every invoice issued for an account is logged, and the account summary is
//! rebuilt from the node's view of those invoices.

use std::collections::BTreeMap;
use std::sync::Arc;

use lnurld_shared::crypto::sha256;
use lnurld_shared::lnurl::{PayParams, PayValues, SuccessAction, PAY_REQUEST_TAG};
use lnurld_shared::{Account, AccountComment, AccountSummary};
use lnurld_store::RecordStore;
use tracing::{error, info, warn};

use crate::error::ServerError;
use crate::invoices::InvoiceGateway;

const THANK_YOU: &str = "Thanks, payment received!";

pub struct AccountService {
    accounts: BTreeMap<String, Account>,
    store: Arc<RecordStore>,
    invoices: Arc<InvoiceGateway>,
}

impl AccountService {
    pub fn new(
        accounts: BTreeMap<String, Account>,
        store: Arc<RecordStore>,
        invoices: Arc<InvoiceGateway>,
    ) -> Self {
        Self {
            accounts,
            store,
            invoices,
        }
    }

    pub fn get_account(&self, name: &str) -> Result<&Account, ServerError> {
        self.accounts
            .get(name)
            .ok_or_else(|| ServerError::NotFound(format!("account {name}")))
    }

    pub fn pay_params(&self, name: &str, callback: String, host: &str) -> Result<PayParams, ServerError> {
        let account = self.get_account(name)?;
        Ok(PayParams {
            callback,
            min_sendable: account.min_sendable_msat(),
            max_sendable: account.max_sendable_msat(),
            metadata: account.metadata(name, host),
            comment_allowed: account.comment_allowed.into(),
            allows_nostr: false,
            nostr_pubkey: None,
            tag: PAY_REQUEST_TAG.to_string(),
        })
    }

    /// Issue an invoice paying into the account. The comment becomes the
    /// invoice memo.
    pub async fn issue_invoice(
        &self,
        name: &str,
        amount_msat: i64,
        comment: &str,
        host: &str,
    ) -> Result<PayValues, ServerError> {
        let account = self.get_account(name)?;
        if !account.accepts_amount(amount_msat) {
            return Err(ServerError::BadRequest("Invalid amount".into()));
        }
        if !account.accepts_comment(comment) {
            return Err(ServerError::BadRequest(format!(
                "comment is longer than {} characters",
                account.comment_allowed
            )));
        }

        let description_hash = sha256(account.metadata(name, host).as_bytes());
        let invoice = self
            .invoices
            .create_invoice(amount_msat, comment, Some(description_hash))
            .await?;
        self.store
            .add_account_invoice(name, &invoice.payment_hash)
            .await
            .map_err(|e| {
                error!(account = name, payment_hash = %invoice.payment_hash, error = %e, "Failed to log account invoice");
                ServerError::from(e)
            })?;
        info!(account = name, payment_hash = %invoice.payment_hash, amount_msat, "Account invoice issued");

        Ok(PayValues {
            pr: invoice.payment_request,
            success_action: Some(SuccessAction::message(THANK_YOU)),
            routes: Vec::new(),
        })
    }

    /// Names of the accounts `user` may see, sorted.
    pub fn list_accounts(&self, user: &str) -> Vec<String> {
        self.accounts
            .iter()
            .filter(|(_, account)| account.is_visible_to(user))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn summary(&self, name: &str, user: &str) -> Result<AccountSummary, ServerError> {
        let account = self
            .get_account(name)
            .ok()
            .filter(|account| account.is_visible_to(user))
            .ok_or_else(|| ServerError::NotFound(format!("account {name}")))?;

        let hashes = self.store.get_account_invoices(name).await?;
        let mut summary = AccountSummary {
            name: name.to_string(),
            currency: account.currency,
            invoices_issued: hashes.len(),
            invoices_settled: 0,
            total_sats_received: 0,
            comments: Vec::new(),
        };

        for hash in &hashes {
            let Some(invoice) = self.invoices.get_invoice(hash).await? else {
                warn!(account = name, payment_hash = %hash, "Logged invoice unknown to the node");
                continue;
            };
            if !invoice.is_settled() {
                continue;
            }
            summary.invoices_settled += 1;
            summary.total_sats_received += invoice.amount_sats();
            if !invoice.memo.is_empty() {
                summary.comments.push(AccountComment {
                    amount: invoice.amount_sats(),
                    settle_time: invoice.settle_time,
                    comment: invoice.memo,
                });
            }
        }
        summary
            .comments
            .sort_by(|a, b| b.settle_time.cmp(&a.settle_time));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use lnurld_shared::{Currency, InvoiceState, PaymentHash};
    use tempfile::TempDir;

    use crate::cache::SystemClock;
    use crate::node::testing::MockNode;

    const HOST: &str = "lnurld.example";

    struct Fixture {
        node: Arc<MockNode>,
        store: Arc<RecordStore>,
        accounts: AccountService,
        _dir: TempDir,
    }

    fn bar() -> Account {
        Account {
            description: "Tips for the bar".to_string(),
            min_sendable: 100,
            max_sendable: 100_000,
            comment_allowed: 20,
            is_also_email: false,
            currency: Currency::Chf,
            users: vec!["satoshi".into()],
        }
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordStore::new(dir.path().to_path_buf()).await.unwrap());
        let node = Arc::new(MockNode::default());
        let invoices = Arc::new(InvoiceGateway::new(node.clone(), 64, 300, Arc::new(SystemClock)));
        let accounts = BTreeMap::from([
            ("bar".to_string(), bar()),
            (
                "club".to_string(),
                Account {
                    description: "Club fees".into(),
                    comment_allowed: 0,
                    users: Vec::new(),
                    ..bar()
                },
            ),
        ]);
        Fixture {
            node,
            accounts: AccountService::new(accounts, store.clone(), invoices),
            store,
            _dir: dir,
        }
    }

    fn hash_of(values: &PayValues) -> PaymentHash {
        PaymentHash::from_hex(values.pr.trim_start_matches("lnbcrt")).unwrap()
    }

    #[tokio::test]
    async fn test_pay_params() {
        let f = fixture().await;
        let params = f
            .accounts
            .pay_params("bar", "https://lnurld.example/ln/pay/bar".into(), HOST)
            .unwrap();
        assert_eq!(params.min_sendable, 100_000);
        assert_eq!(params.max_sendable, 100_000_000);
        assert_eq!(params.comment_allowed, 20);
        assert!(params.metadata.contains(r#"["text/identifier","bar@lnurld.example"]"#));
        assert!(!params.allows_nostr);

        assert!(matches!(
            f.accounts.pay_params("nope", String::new(), HOST),
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_issue_invoice_logs_hash() {
        let f = fixture().await;
        let values = f
            .accounts
            .issue_invoice("bar", 21_000_000, "Prost!", HOST)
            .await
            .unwrap();
        assert_eq!(
            values.success_action.as_ref().map(|a| a.message.as_str()),
            Some(THANK_YOU)
        );
        assert_eq!(
            f.store.get_account_invoices("bar").await.unwrap(),
            vec![hash_of(&values)]
        );
        assert!(f.store.get_account_invoices("club").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_issue_invoice_rejects_bad_input() {
        let f = fixture().await;
        for amount in [99_999, 100_000_001] {
            assert!(matches!(
                f.accounts.issue_invoice("bar", amount, "", HOST).await,
                Err(ServerError::BadRequest(reason)) if reason == "Invalid amount"
            ));
        }
        assert!(matches!(
            f.accounts.issue_invoice("bar", 100_000, &"x".repeat(21), HOST).await,
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            f.accounts.issue_invoice("club", 100_000, "hi", HOST).await,
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            f.accounts.issue_invoice("nope", 100_000, "", HOST).await,
            Err(ServerError::NotFound(_))
        ));
        assert!(f.store.get_account_invoices("bar").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_summary_counts_settled_invoices() {
        let f = fixture().await;
        let first = f.accounts.issue_invoice("bar", 1_000_000, "first", HOST).await.unwrap();
        let second = f.accounts.issue_invoice("bar", 2_000_000, "", HOST).await.unwrap();
        let third = f.accounts.issue_invoice("bar", 4_000_000, "third", HOST).await.unwrap();
        let canceled = f.accounts.issue_invoice("bar", 8_000_000, "gone", HOST).await.unwrap();
        f.accounts.issue_invoice("bar", 16_000_000, "open", HOST).await.unwrap();

        for values in [&first, &second, &third] {
            f.node.settle(&hash_of(values));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        f.node.set_state(&hash_of(&canceled), InvoiceState::Canceled);

        let summary = f.accounts.summary("bar", "satoshi").await.unwrap();
        assert_eq!(summary.invoices_issued, 5);
        assert_eq!(summary.invoices_settled, 3);
        assert_eq!(summary.total_sats_received, 7_000);
        assert_eq!(summary.currency, Currency::Chf);
        let comments: Vec<_> = summary.comments.iter().map(|c| c.comment.as_str()).collect();
        assert_eq!(comments, vec!["third", "first"]);
        assert_eq!(summary.comments[0].amount, 4_000);
    }

    #[tokio::test]
    async fn test_visibility() {
        let f = fixture().await;
        assert_eq!(f.accounts.list_accounts("satoshi"), vec!["bar", "club"]);
        assert_eq!(f.accounts.list_accounts("hal"), vec!["club"]);

        assert!(matches!(
            f.accounts.summary("bar", "hal").await,
            Err(ServerError::NotFound(_))
        ));
        let summary = f.accounts.summary("club", "hal").await.unwrap();
        assert_eq!(summary.invoices_issued, 0);
        assert!(summary.comments.is_empty());
    }
}
