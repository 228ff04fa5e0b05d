//! Raffle Engine: ticket sales over LNURL-pay, the draw, the commit and the
//! proceeds withdrawal.
//!
//! Every one-shot transition (draw, commit, lock, withdrawal redemption) is an
//! exclusive create in the record store. Losing that race means the
//! transition already happened, and the stored result is returned instead.

use std::sync::Arc;

use lnurld_shared::crypto::{random_id, sha256};
use lnurld_shared::lnurl::{pay_metadata, PayParams, PayValues, SuccessAction, PAY_REQUEST_TAG};
use lnurld_shared::raffle::{assign_prizes, sort_raffles};
use lnurld_shared::{Invoice, PrizeWinner, Raffle, RaffleTicket, RaffleTickets, ZapRequest};
use lnurld_store::{RecordStore, StoreError};
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::ServerError;
use crate::invoices::InvoiceGateway;
use crate::withdrawal::WithdrawalService;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RaffleStatus {
    pub drawn: bool,
    pub committed: bool,
    pub locked: bool,
    pub withdrawn: bool,
}

/// Invoice issued for a ticket purchase, with what the buyer is shown.
#[derive(Debug, Clone)]
pub struct TicketSale {
    pub invoice: Invoice,
    pub tickets: RaffleTickets,
    pub pay_values: PayValues,
}

pub struct RaffleEngine {
    store: Arc<RecordStore>,
    invoices: Arc<InvoiceGateway>,
    withdrawals: Arc<WithdrawalService>,
}

impl RaffleEngine {
    pub fn new(
        store: Arc<RecordStore>,
        invoices: Arc<InvoiceGateway>,
        withdrawals: Arc<WithdrawalService>,
    ) -> Self {
        Self {
            store,
            invoices,
            withdrawals,
        }
    }

    // ------------------------------------------------------------------
    // Raffle records
    // ------------------------------------------------------------------

    pub async fn create_raffle(&self, owner: &str, mut raffle: Raffle) -> Result<Raffle, ServerError> {
        raffle.title = raffle.title.trim().to_string();
        raffle.validate()?;
        raffle.id = random_id();
        raffle.owner = owner.to_string();
        self.store.create_raffle(&raffle).await?;
        info!(raffle = %raffle.id, owner, title = %raffle.title, "Raffle created");
        Ok(raffle)
    }

    pub async fn get_raffle(&self, id: &str) -> Result<Raffle, ServerError> {
        self.store
            .get_raffle(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("raffle {id}")))
    }

    /// All raffles, the caller's own first.
    pub async fn list_raffles(&self, user: &str) -> Result<Vec<Raffle>, ServerError> {
        let mut raffles = self.store.list_raffles().await?;
        sort_raffles(&mut raffles, user);
        Ok(raffles)
    }

    pub async fn status(&self, id: &str) -> Result<RaffleStatus, ServerError> {
        Ok(RaffleStatus {
            drawn: self.store.get_draw(id).await?.is_some(),
            committed: self.store.get_winners(id).await?.is_some(),
            locked: self.store.is_raffle_locked(id).await?,
            withdrawn: self.store.is_raffle_withdrawn(id).await?,
        })
    }

    // ------------------------------------------------------------------
    // Ticket sales
    // ------------------------------------------------------------------

    pub fn pay_params(&self, raffle: &Raffle, callback: String, nostr_pubkey: Option<&str>) -> PayParams {
        PayParams {
            callback,
            min_sendable: raffle.min_sendable(),
            max_sendable: raffle.max_sendable(),
            metadata: pay_metadata(&raffle.title),
            comment_allowed: 0,
            allows_nostr: nostr_pubkey.is_some(),
            nostr_pubkey: nostr_pubkey.map(str::to_string),
            tag: PAY_REQUEST_TAG.to_string(),
        }
    }

    /// Issue an invoice for `amount_msat` worth of tickets and log the
    /// purchase. With a zap request the invoice commits to the zap request
    /// instead of the pay metadata.
    pub async fn issue_tickets(
        &self,
        id: &str,
        amount_msat: i64,
        zap: Option<&ZapRequest>,
    ) -> Result<TicketSale, ServerError> {
        let raffle = self.get_raffle(id).await?;
        // sales close with the draw
        if self.store.get_draw(id).await?.is_some() {
            return Err(ServerError::AlreadyDrawn);
        }
        let quantity = raffle.quantity_for(amount_msat).ok_or_else(|| {
            ServerError::BadRequest(format!(
                "amount must be a multiple of {} msats between {} and {}",
                raffle.min_sendable(),
                raffle.min_sendable(),
                raffle.max_sendable()
            ))
        })?;

        let description_hash = match zap {
            Some(zap) => zap.description_hash(),
            None => sha256(pay_metadata(&raffle.title).as_bytes()),
        };
        let invoice = self
            .invoices
            .create_invoice(amount_msat, &raffle.description(quantity), Some(description_hash))
            .await?;

        let tickets = RaffleTickets::new(invoice.payment_hash, quantity)?;
        self.store.add_tickets(id, &tickets).await.map_err(|e| {
            error!(raffle = %id, payment_hash = %invoice.payment_hash, error = %e, "Failed to log ticket purchase");
            ServerError::from(e)
        })?;
        info!(raffle = %id, payment_hash = %invoice.payment_hash, quantity, "Tickets issued");

        let pay_values = PayValues {
            pr: invoice.payment_request.clone(),
            success_action: Some(SuccessAction::message(raffle.success_message(&tickets))),
            routes: Vec::new(),
        };
        Ok(TicketSale {
            invoice,
            tickets,
            pay_values,
        })
    }

    /// Settled tickets of a raffle, expanded to one entry per unit, together
    /// with the settled amount in sats.
    async fn settled_tickets(&self, id: &str) -> Result<(Vec<RaffleTicket>, i64), ServerError> {
        let mut tickets = Vec::new();
        let mut proceeds = 0;
        for purchase in self.store.get_tickets(id).await? {
            match self.invoices.get_invoice(&purchase.payment_hash).await? {
                Some(invoice) if invoice.is_settled() => {
                    proceeds += invoice.amount_sats();
                    tickets.extend(purchase.tickets());
                }
                Some(_) => {}
                None => {
                    warn!(raffle = %id, payment_hash = %purchase.payment_hash, "Unknown invoice in ticket log");
                }
            }
        }
        Ok((tickets, proceeds))
    }

    // ------------------------------------------------------------------
    // Draw and commit
    // ------------------------------------------------------------------

    /// Shuffle the settled tickets into the draw order. Drawing is done once;
    /// later calls return the stored order.
    pub async fn draw(&self, id: &str) -> Result<Vec<RaffleTicket>, ServerError> {
        let raffle = self.get_raffle(id).await?;
        if let Some(order) = self.store.get_draw(id).await? {
            debug!(raffle = %id, "Returning existing draw");
            return Ok(order);
        }

        let (mut tickets, _) = self.settled_tickets(id).await?;
        let required = raffle.prizes_count();
        if tickets.len() < required {
            return Err(ServerError::InsufficientTickets {
                available: tickets.len(),
                required,
            });
        }

        tickets.shuffle(&mut rand::thread_rng());

        match self.store.create_draw(id, &tickets).await {
            Ok(()) => {
                info!(raffle = %id, tickets = tickets.len(), "Raffle drawn");
                Ok(tickets)
            }
            Err(StoreError::AlreadyExists(_)) => {
                debug!(raffle = %id, "Concurrent draw won, returning its order");
                self.store
                    .get_draw(id)
                    .await?
                    .ok_or_else(|| ServerError::PersistenceFailure(format!("draw of {id} vanished")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Commit the winners: skip `skipped` from the front of the draw order,
    /// take one ticket per prize and store them.
    pub async fn commit(
        &self,
        id: &str,
        skipped: &[RaffleTicket],
    ) -> Result<Vec<PrizeWinner>, ServerError> {
        let raffle = self.get_raffle(id).await?;
        let order = self.store.get_draw(id).await?.ok_or(ServerError::NotDrawn)?;
        if self.store.get_winners(id).await?.is_some() {
            return Err(ServerError::AlreadyCommitted);
        }

        let winners = select_winners(&order, skipped, raffle.prizes_count())?;

        match self.store.create_winners(id, &winners).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => return Err(ServerError::AlreadyCommitted),
            Err(e) => return Err(e.into()),
        }
        info!(raffle = %id, winners = winners.len(), skipped = skipped.len(), "Raffle committed");

        Ok(assign_prizes(&raffle, &winners))
    }

    /// Committed winners with their prizes, if committed.
    pub async fn winners(&self, id: &str) -> Result<Option<Vec<PrizeWinner>>, ServerError> {
        let raffle = self.get_raffle(id).await?;
        Ok(self
            .store
            .get_winners(id)
            .await?
            .map(|winners| assign_prizes(&raffle, &winners)))
    }

    // ------------------------------------------------------------------
    // Lock and withdrawal
    // ------------------------------------------------------------------

    /// Seal a committed raffle against withdrawal. Locking twice is a no-op.
    pub async fn lock(&self, id: &str) -> Result<(), ServerError> {
        self.get_raffle(id).await?;
        if self.store.get_winners(id).await?.is_none() {
            return Err(ServerError::NotCommitted);
        }
        if self.store.is_raffle_withdrawn(id).await? {
            return Err(ServerError::AlreadyRedeemed);
        }
        match self.store.lock_raffle(id).await {
            Ok(()) => info!(raffle = %id, "Raffle locked"),
            Err(StoreError::AlreadyExists(_)) => debug!(raffle = %id, "Raffle already locked"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Create a withdrawal grant for the settled proceeds. Returns its k1.
    pub async fn withdraw(&self, id: &str) -> Result<String, ServerError> {
        let raffle = self.get_raffle(id).await?;
        if self.store.get_winners(id).await?.is_none() {
            return Err(ServerError::NotCommitted);
        }
        if self.store.is_raffle_locked(id).await? {
            return Err(ServerError::Locked);
        }
        if self.store.is_raffle_withdrawn(id).await? {
            return Err(ServerError::AlreadyRedeemed);
        }

        let (_, proceeds) = self.settled_tickets(id).await?;
        self.withdrawals
            .create_request(
                &self.store.raffle_withdrawal_key(id),
                proceeds,
                &format!("Withdrawal of {}", raffle.title),
            )
            .await
    }
}

/// Drop `skipped` from the front of `order` and pick `count` winners.
///
/// Skips must match the head of the order exactly and in sequence.
fn select_winners(
    order: &[RaffleTicket],
    skipped: &[RaffleTicket],
    count: usize,
) -> Result<Vec<RaffleTicket>, ServerError> {
    if !order.starts_with(skipped) {
        return Err(ServerError::BadRequest(
            "skipped tickets must be the next tickets in draw order".into(),
        ));
    }
    let remaining = &order[skipped.len()..];
    if remaining.len() < count {
        return Err(ServerError::InsufficientTickets {
            available: remaining.len(),
            required: count,
        });
    }
    Ok(reverse_before_persist(&remaining[..count]))
}

/// Winners are stored last-drawn first; prize assignment reads them in that
/// order.
fn reverse_before_persist(winners: &[RaffleTicket]) -> Vec<RaffleTicket> {
    winners.iter().rev().copied().collect()
}
