//! Account invoice logs.
//!
//! ```text
//! accounts/<name>/invoices.csv  one payment hash per issued invoice
//! ```

use lnurld_shared::PaymentHash;
use tracing::{debug, warn};

use crate::error::Result;
use crate::records::RecordStore;

fn invoices_key(name: &str) -> String {
    format!("accounts/{name}/invoices.csv")
}

impl RecordStore {
    pub async fn add_account_invoice(&self, name: &str, payment_hash: &PaymentHash) -> Result<()> {
        self.append_line(&invoices_key(name), &payment_hash.to_hex())
            .await?;
        debug!(account = name, payment_hash = %payment_hash, "Logged account invoice");
        Ok(())
    }

    /// Payment hashes issued for the account, oldest first. Unreadable lines
    /// are skipped.
    pub async fn get_account_invoices(&self, name: &str) -> Result<Vec<PaymentHash>> {
        let mut hashes = Vec::new();
        for line in self.read_lines(&invoices_key(name)).await? {
            match PaymentHash::from_hex(&line) {
                Ok(hash) => hashes.push(hash),
                Err(_) => warn!(account = name, line = %line, "Skipping malformed invoice line"),
            }
        }
        Ok(hashes)
    }
}
