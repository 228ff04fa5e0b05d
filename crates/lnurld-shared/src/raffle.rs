//! Raffle domain model and deterministic ticket numbering.
//!
//! A purchase ([`RaffleTickets`]) covers `quantity` units bought with a single
//! invoice. Each unit is a [`RaffleTicket`] identified by the purchase's
//! payment hash and an index. Ticket numbers are never stored: they are
//! 5-symbol windows into the base58 rendering of the payment hash, advanced by
//! 4 symbols per index.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::constants::{
    MAX_PRIZES, MAX_PRIZE_QUANTITY, MAX_TICKETS_PER_PURCHASE, MAX_TICKET_PRICE_SATS,
    MAX_TITLE_LENGTH, MSATS_PER_SAT, TICKET_NUMBER_LENGTH, TICKET_NUMBER_STRIDE,
};
use crate::error::{TicketError, ValidationError};
use crate::types::{Currency, PaymentHash};

// ---------------------------------------------------------------------------
// Raffle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Raffle {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub owner: String,
    pub title: String,
    /// Price of one ticket in sats.
    pub ticket_price: u32,
    #[serde(default)]
    pub fiat_currency: Currency,
    pub prizes: Vec<RafflePrize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RafflePrize {
    pub name: String,
    pub quantity: u8,
}

impl RafflePrize {
    pub fn new(name: impl Into<String>, quantity: u8) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}

impl Raffle {
    pub fn prizes_count(&self) -> usize {
        self.prizes.iter().map(|prize| prize.quantity as usize).sum()
    }

    /// One prize name per unit, in declaration order.
    pub fn prizes(&self) -> Vec<String> {
        self.prizes
            .iter()
            .flat_map(|prize| std::iter::repeat(prize.name.clone()).take(prize.quantity as usize))
            .collect()
    }

    /// Invoice memo for a purchase of `quantity` tickets.
    pub fn description(&self, quantity: u32) -> String {
        format!("{quantity}× {}", self.title)
    }

    /// Amount in msats for `quantity` tickets.
    pub fn sendable(&self, quantity: u32) -> i64 {
        self.ticket_price as i64 * quantity as i64 * MSATS_PER_SAT
    }

    pub fn min_sendable(&self) -> i64 {
        self.sendable(1)
    }

    pub fn max_sendable(&self) -> i64 {
        self.sendable(MAX_TICKETS_PER_PURCHASE)
    }

    /// Ticket quantity paid for by `msats`, if it is an exact multiple of the
    /// ticket price within the per-purchase limit.
    pub fn quantity_for(&self, msats: i64) -> Option<u32> {
        let unit = self.min_sendable();
        if unit <= 0 || msats < unit || msats > self.max_sendable() || msats % unit != 0 {
            return None;
        }
        u32::try_from(msats / unit).ok()
    }

    /// Success action text shown to the buyer: title followed by the numbers.
    pub fn success_message(&self, tickets: &RaffleTickets) -> String {
        let mut message = self.title.clone();
        for number in tickets.numbers() {
            message.push_str("\n• ");
            message.push_str(&number);
        }
        message
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_text("title", &self.title, MAX_TITLE_LENGTH)?;
        if self.ticket_price < 1 || self.ticket_price > MAX_TICKET_PRICE_SATS {
            return Err(ValidationError::new(
                "ticketPrice",
                format!("must be between 1 and {MAX_TICKET_PRICE_SATS}"),
            ));
        }
        if self.prizes.is_empty() || self.prizes.len() > MAX_PRIZES {
            return Err(ValidationError::new(
                "prizes",
                format!("must contain between 1 and {MAX_PRIZES} entries"),
            ));
        }
        for prize in &self.prizes {
            validate_text("prize name", &prize.name, MAX_TITLE_LENGTH)?;
            if prize.quantity < 1 || prize.quantity > MAX_PRIZE_QUANTITY {
                return Err(ValidationError::new(
                    "prize quantity",
                    format!("must be between 1 and {MAX_PRIZE_QUANTITY}"),
                ));
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_text(
    field: &'static str,
    value: &str,
    max_length: usize,
) -> Result<(), ValidationError> {
    let length = value.trim().chars().count();
    if length == 0 || value.chars().count() > max_length {
        return Err(ValidationError::new(
            field,
            format!("must be between 1 and {max_length} characters"),
        ));
    }
    Ok(())
}

/// Own raffles first, then by title with embedded numbers compared by value.
pub fn sort_raffles(raffles: &mut [Raffle], owner: &str) {
    raffles.sort_by(|a, b| {
        let a_mine = a.owner == owner;
        let b_mine = b.owner == owner;
        b_mine
            .cmp(&a_mine)
            .then_with(|| natural_cmp(&a.title, &b.title))
    });
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x_digits = take_digits(&mut a_chars);
                let y_digits = take_digits(&mut b_chars);
                let x_trimmed = x_digits.trim_start_matches('0');
                let y_trimmed = y_digits.trim_start_matches('0');
                let ordering = x_trimmed
                    .len()
                    .cmp(&y_trimmed.len())
                    .then_with(|| x_trimmed.cmp(y_trimmed));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    digits
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// A single purchase: one invoice covering `quantity` tickets.
///
/// Canonical line form: `<paymentHash>,<quantity>`. A bare payment hash is a
/// purchase of one ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RaffleTickets {
    pub payment_hash: PaymentHash,
    pub quantity: u32,
}

impl RaffleTickets {
    pub fn new(payment_hash: PaymentHash, quantity: u32) -> Result<Self, TicketError> {
        if quantity < 1 || quantity > MAX_TICKETS_PER_PURCHASE {
            return Err(TicketError::InvalidQuantity(quantity.to_string()));
        }
        Ok(Self {
            payment_hash,
            quantity,
        })
    }

    pub fn parse(line: &str) -> Result<Self, TicketError> {
        let (hash, quantity) = match line.trim().split_once(',') {
            Some((hash, quantity)) => {
                let quantity = quantity
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| TicketError::InvalidQuantity(quantity.to_string()))?;
                (hash, quantity)
            }
            None => (line.trim(), 1),
        };
        let payment_hash = PaymentHash::from_hex(hash)
            .map_err(|_| TicketError::InvalidPaymentHash(hash.to_string()))?;
        Self::new(payment_hash, quantity)
    }

    /// Expand the purchase into its individual tickets.
    pub fn tickets(&self) -> Vec<RaffleTicket> {
        (0..self.quantity)
            .map(|index| RaffleTicket {
                payment_hash: self.payment_hash,
                index,
            })
            .collect()
    }

    /// All ticket numbers of this purchase, sorted case-insensitively.
    pub fn numbers(&self) -> Vec<String> {
        let symbols = self.payment_hash.to_base58();
        let mut numbers: Vec<String> = (0..self.quantity)
            .filter_map(|index| ticket_number(&symbols, index))
            .collect();
        numbers.sort_by_key(|number| number.to_lowercase());
        numbers
    }
}

impl std::fmt::Display for RaffleTickets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.payment_hash, self.quantity)
    }
}

/// One ticket unit within a purchase.
///
/// Canonical form: `<paymentHash>:<index>`. A bare payment hash is index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RaffleTicket {
    pub payment_hash: PaymentHash,
    pub index: u32,
}

impl RaffleTicket {
    pub fn parse(value: &str) -> Result<Self, TicketError> {
        let (hash, index) = match value.trim().split_once(':') {
            Some((hash, index)) => {
                let index = index
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|index| *index < MAX_TICKETS_PER_PURCHASE)
                    .ok_or_else(|| TicketError::InvalidIndex(index.to_string()))?;
                (hash, index)
            }
            None => (value.trim(), 0),
        };
        let payment_hash = PaymentHash::from_hex(hash)
            .map_err(|_| TicketError::InvalidPaymentHash(hash.to_string()))?;
        Ok(Self {
            payment_hash,
            index,
        })
    }

    pub fn number(&self) -> String {
        ticket_number(&self.payment_hash.to_base58(), self.index).unwrap_or_default()
    }
}

impl std::fmt::Display for RaffleTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.payment_hash, self.index)
    }
}

impl TryFrom<String> for RaffleTicket {
    type Error = TicketError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RaffleTicket> for String {
    fn from(value: RaffleTicket) -> Self {
        value.to_string()
    }
}

fn ticket_number(symbols: &str, index: u32) -> Option<String> {
    let start = index as usize * TICKET_NUMBER_STRIDE;
    symbols
        .get(start..start + TICKET_NUMBER_LENGTH)
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Prize assignment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeWinner {
    pub prize: String,
    pub ticket: RaffleTicket,
    pub number: String,
}

/// Pair committed winners with prizes, consuming `quantity` winners per prize
/// in declaration order.
pub fn assign_prizes(raffle: &Raffle, winners: &[RaffleTicket]) -> Vec<PrizeWinner> {
    raffle
        .prizes()
        .into_iter()
        .zip(winners)
        .map(|(prize, ticket)| PrizeWinner {
            prize,
            ticket: *ticket,
            number: ticket.number(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "d643d24061a5410f96693978711071819a9700d38b006285246c8e227e32fd4d";

    fn raffle() -> Raffle {
        Raffle {
            id: "r1".to_string(),
            owner: "satoshi".to_string(),
            title: "Lightning Raffle".to_string(),
            ticket_price: 21,
            fiat_currency: Currency::Eur,
            prizes: vec![
                RafflePrize::new("Trezor", 1),
                RafflePrize::new("Book", 2),
                RafflePrize::new("Stickers", 3),
            ],
        }
    }

    #[test]
    fn test_raffle() {
        let raffle = raffle();
        let tickets = RaffleTickets::parse(&format!("{HASH},3")).unwrap();
        assert_eq!(raffle.description(3), "3× Lightning Raffle");
        assert_eq!(raffle.sendable(7), 147_000);
        assert_eq!(
            raffle.success_message(&tickets),
            "Lightning Raffle\n• FRQEG\n• Gk7zz\n• z758a"
        );
        assert_eq!(raffle.prizes_count(), 6);
        assert_eq!(
            raffle.prizes(),
            vec!["Trezor", "Book", "Book", "Stickers", "Stickers", "Stickers"]
        );
    }

    #[test]
    fn test_quantity_for() {
        let raffle = raffle();
        assert_eq!(raffle.quantity_for(21_000), Some(1));
        assert_eq!(raffle.quantity_for(210_000), Some(10));
        assert_eq!(raffle.quantity_for(231_000), None);
        assert_eq!(raffle.quantity_for(21_500), None);
        assert_eq!(raffle.quantity_for(0), None);
    }

    #[test]
    fn test_raffle_tickets_parse() {
        let cases = [
            ("", 1, vec!["FRQEG"]),
            (",1", 1, vec!["FRQEG"]),
            (",2", 2, vec!["FRQEG", "Gk7zz"]),
            (
                ",10",
                10,
                vec![
                    "aPHsr", "CcdyC", "CVyiK", "FRQEG", "Gk7zz", "KWPnD", "Nenno", "oUAMC",
                    "r1YiN", "z758a",
                ],
            ),
        ];
        for (suffix, quantity, numbers) in cases {
            let tickets = RaffleTickets::parse(&format!("{HASH}{suffix}")).unwrap();
            assert_eq!(tickets.payment_hash.to_hex(), HASH);
            assert_eq!(tickets.quantity, quantity);
            assert_eq!(tickets.to_string(), format!("{HASH},{quantity}"));
            assert_eq!(tickets.numbers(), numbers);
        }
    }

    #[test]
    fn test_raffle_tickets_rejects_bad_quantity() {
        assert!(RaffleTickets::parse(&format!("{HASH},0")).is_err());
        assert!(RaffleTickets::parse(&format!("{HASH},11")).is_err());
        assert!(RaffleTickets::parse(&format!("{HASH},x")).is_err());
        assert!(RaffleTickets::parse("nothex,1").is_err());
    }

    #[test]
    fn test_raffle_ticket_parse() {
        let hash = "a5506d48d2e456769e4f557d440e8e502c815e6670bfb6a4299d136a52db54fd";
        for (suffix, index, number) in [
            ("", 0, "C8KQC"),
            (":0", 0, "C8KQC"),
            (":1", 1, "CsoRG"),
            (":9", 9, "soGi8"),
        ] {
            let ticket = RaffleTicket::parse(&format!("{hash}{suffix}")).unwrap();
            assert_eq!(ticket.payment_hash.to_hex(), hash);
            assert_eq!(ticket.index, index);
            assert_eq!(ticket.to_string(), format!("{hash}:{index}"));
            assert_eq!(ticket.number(), number);
        }
        assert!(RaffleTicket::parse(&format!("{hash}:10")).is_err());
    }

    #[test]
    fn test_ticket_numbers_deterministic_and_distinct() {
        let tickets = RaffleTickets::parse(&format!("{HASH},10")).unwrap();
        assert_eq!(tickets.numbers(), tickets.numbers());

        let mut numbers: Vec<String> = tickets.tickets().iter().map(RaffleTicket::number).collect();
        assert_eq!(numbers.len(), 10);
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 10);
    }

    #[test]
    fn test_assign_prizes() {
        let raffle = Raffle {
            prizes: vec![RafflePrize::new("Trezor", 1), RafflePrize::new("Book", 2)],
            ..raffle()
        };
        let tickets = RaffleTickets::parse(&format!("{HASH},3")).unwrap().tickets();
        let winners = assign_prizes(&raffle, &tickets);
        let prizes: Vec<&str> = winners.iter().map(|w| w.prize.as_str()).collect();
        assert_eq!(prizes, vec!["Trezor", "Book", "Book"]);
        assert_eq!(winners[0].number, "FRQEG");
    }

    #[test]
    fn test_validate() {
        assert!(raffle().validate().is_ok());
        assert!(Raffle { title: " ".into(), ..raffle() }.validate().is_err());
        assert!(Raffle { ticket_price: 0, ..raffle() }.validate().is_err());
        assert!(Raffle { prizes: vec![], ..raffle() }.validate().is_err());
        assert!(Raffle {
            prizes: vec![RafflePrize::new("Trezor", 11)],
            ..raffle()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_sort_raffles() {
        let titled = |title: &str, owner: &str| Raffle {
            title: title.to_string(),
            owner: owner.to_string(),
            ..raffle()
        };
        let mut raffles = vec![
            titled("Raffle #1", "alice"),
            titled("Raffle #11", "alice"),
            titled("Raffle #2", "alice"),
            titled("Zebra", "bob"),
        ];
        sort_raffles(&mut raffles, "bob");
        let titles: Vec<&str> = raffles.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Zebra", "Raffle #1", "Raffle #2", "Raffle #11"]);
    }
}
