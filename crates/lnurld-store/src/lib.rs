//! # lnurld-store
//!
//! Durable records for the lnurld gateway, kept as plain files under a data
//! directory.
//!
//! Two write primitives cover every use: appending a line to a log (ticket
//! purchases, account invoices, event attendees) and creating a record
//! exclusively (draws, commits, locks, withdrawal redemptions). Exclusive
//! creation is atomic on the filesystem, so concurrent creators of one key
//! see exactly one winner.

pub mod accounts;
pub mod events;
pub mod raffles;
pub mod records;
pub mod withdrawals;

mod error;

pub use error::{Result, StoreError};
pub use records::RecordStore;
