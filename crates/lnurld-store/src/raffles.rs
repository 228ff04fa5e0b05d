//! Raffle records.
//!
//! ```text
//! raffles/<id>/raffle.json     definition, created once
//! raffles/<id>/tickets.csv     purchase log, one `hash,quantity` per line
//! raffles/<id>/draw.csv        drawn order, created once
//! raffles/<id>/winners.csv     committed winners, created once
//! raffles/<id>/locked          lock marker, created once
//! raffles/<id>/withdrawal.csv  proceeds redemption record, created once
//! ```

use lnurld_shared::{Raffle, RaffleTicket, RaffleTickets};
use tracing::debug;

use crate::error::Result;
use crate::records::RecordStore;

const RAFFLES: &str = "raffles";

fn raffle_key(id: &str, file: &str) -> String {
    format!("{RAFFLES}/{id}/{file}")
}

impl RecordStore {
    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    pub async fn create_raffle(&self, raffle: &Raffle) -> Result<()> {
        self.create_object(&raffle_key(&raffle.id, "raffle.json"), raffle)
            .await?;
        debug!(raffle = %raffle.id, "Stored raffle");
        Ok(())
    }

    pub async fn get_raffle(&self, id: &str) -> Result<Option<Raffle>> {
        self.read_object(&raffle_key(id, "raffle.json")).await
    }

    pub async fn list_raffles(&self) -> Result<Vec<Raffle>> {
        let mut raffles = Vec::new();
        for id in self.list_dirs(RAFFLES).await? {
            if let Some(raffle) = self.get_raffle(&id).await? {
                raffles.push(raffle);
            }
        }
        Ok(raffles)
    }

    // ------------------------------------------------------------------
    // Ticket purchases
    // ------------------------------------------------------------------

    pub async fn add_tickets(&self, id: &str, tickets: &RaffleTickets) -> Result<()> {
        self.append_line(&raffle_key(id, "tickets.csv"), &tickets.to_string())
            .await
    }

    pub async fn get_tickets(&self, id: &str) -> Result<Vec<RaffleTickets>> {
        self.read_lines(&raffle_key(id, "tickets.csv"))
            .await?
            .iter()
            .map(|line| RaffleTickets::parse(line).map_err(Into::into))
            .collect()
    }

    // ------------------------------------------------------------------
    // Draw and commit
    // ------------------------------------------------------------------

    pub async fn create_draw(&self, id: &str, order: &[RaffleTicket]) -> Result<()> {
        self.create_tickets(&raffle_key(id, "draw.csv"), order).await
    }

    /// Drawn order, or `None` if the raffle has not been drawn.
    pub async fn get_draw(&self, id: &str) -> Result<Option<Vec<RaffleTicket>>> {
        self.read_tickets(&raffle_key(id, "draw.csv")).await
    }

    pub async fn create_winners(&self, id: &str, winners: &[RaffleTicket]) -> Result<()> {
        self.create_tickets(&raffle_key(id, "winners.csv"), winners)
            .await
    }

    /// Committed winners, or `None` if the raffle has not been committed.
    pub async fn get_winners(&self, id: &str) -> Result<Option<Vec<RaffleTicket>>> {
        self.read_tickets(&raffle_key(id, "winners.csv")).await
    }

    async fn create_tickets(&self, key: &str, tickets: &[RaffleTicket]) -> Result<()> {
        let lines: Vec<String> = tickets.iter().map(RaffleTicket::to_string).collect();
        self.create_exclusive(key, &lines).await
    }

    async fn read_tickets(&self, key: &str) -> Result<Option<Vec<RaffleTicket>>> {
        if !self.exists(key).await? {
            return Ok(None);
        }
        let tickets = self
            .read_lines(key)
            .await?
            .iter()
            .map(|line| RaffleTicket::parse(line))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Some(tickets))
    }

    // ------------------------------------------------------------------
    // Lock and withdrawal
    // ------------------------------------------------------------------

    pub async fn lock_raffle(&self, id: &str) -> Result<()> {
        self.create_exclusive(&raffle_key(id, "locked"), &[]).await
    }

    pub async fn is_raffle_locked(&self, id: &str) -> Result<bool> {
        self.exists(&raffle_key(id, "locked")).await
    }

    /// Redemption record key for the raffle's proceeds.
    pub fn raffle_withdrawal_key(&self, id: &str) -> String {
        raffle_key(id, "withdrawal.csv")
    }

    pub async fn is_raffle_withdrawn(&self, id: &str) -> Result<bool> {
        self.exists(&self.raffle_withdrawal_key(id)).await
    }
}
