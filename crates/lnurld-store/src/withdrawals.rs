use lnurld_shared::PaymentHash;
use tracing::info;

use crate::error::Result;
use crate::records::RecordStore;

impl RecordStore {
    /// Record that the grant paying out to `destination` has been redeemed by
    /// the invoice `payment_hash`. Fails with `AlreadyExists` on a second
    /// redemption of the same destination.
    pub async fn create_redemption(&self, destination: &str, payment_hash: &PaymentHash) -> Result<()> {
        self.create_exclusive(destination, &[payment_hash.to_hex()])
            .await?;
        info!(destination, payment_hash = %payment_hash, "Redemption recorded");
        Ok(())
    }

    pub async fn get_redemption(&self, destination: &str) -> Result<Option<PaymentHash>> {
        Ok(self
            .read_lines(destination)
            .await?
            .first()
            .and_then(|line| PaymentHash::from_hex(line).ok()))
    }
}
