//! Domain types and primitives shared by the lnurld store and server.

pub mod account;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod event;
pub mod invoice;
pub mod lnurl;
pub mod raffle;
pub mod types;
pub mod zap;

pub use account::{Account, AccountComment, AccountSummary};
pub use error::{CryptoError, LnurldError, TicketError, ValidationError, ZapError};
pub use event::{Event, EventLocation};
pub use invoice::{Invoice, InvoiceState};
pub use raffle::{PrizeWinner, Raffle, RafflePrize, RaffleTicket, RaffleTickets};
pub use types::{Currency, Identity, PaymentHash};
pub use zap::{NostrEvent, ZapRequest};
