/// Application name
pub const APP_NAME: &str = "LNURL Daemon";

/// Size of a k1 challenge in bytes
pub const K1_SIZE: usize = 32;

/// Size of a payment hash in bytes
pub const PAYMENT_HASH_SIZE: usize = 32;

/// Length of the public display id derived from an identity
pub const PUBLIC_ID_LENGTH: usize = 7;

/// Capacity of the LNURL-auth challenge cache
pub const AUTH_CHALLENGE_CAPACITY: usize = 1024;

/// Capacity of the LNURL-withdraw grant cache
pub const WITHDRAWAL_REQUEST_CAPACITY: usize = 32;

/// Bounds for challenge and grant expiry, in seconds
pub const MIN_REQUEST_EXPIRY_SECS: u64 = 60;
pub const MAX_REQUEST_EXPIRY_SECS: u64 = 600;

/// Upper bound of the withdrawal fee percentage
pub const MAX_FEE_PERCENT: f64 = 10.0;

/// Raffle ticket numbering: a 5-symbol window advanced by 4 symbols per unit
pub const TICKET_NUMBER_LENGTH: usize = 5;
pub const TICKET_NUMBER_STRIDE: usize = 4;

/// Maximum number of tickets in a single purchase
pub const MAX_TICKETS_PER_PURCHASE: u32 = 10;

/// Raffle validation limits
pub const MAX_TITLE_LENGTH: usize = 50;
pub const MAX_TICKET_PRICE_SATS: u32 = 1_000_000;
pub const MAX_PRIZES: usize = 21;
pub const MAX_PRIZE_QUANTITY: u8 = 10;

/// Event validation limits
pub const MAX_EVENT_CAPACITY: u16 = 1000;
pub const MAX_EVENT_DESCRIPTION_LENGTH: usize = 500;
pub const MAX_LOCATION_URL_LENGTH: usize = 100;

/// Length of random record ids (bytes, before base58)
pub const RECORD_ID_SIZE: usize = 5;

/// Millisatoshis per satoshi
pub const MSATS_PER_SAT: i64 = 1000;

/// Nostr event kinds for zaps (NIP-57)
pub const NOSTR_KIND_ZAP_REQUEST: u32 = 9734;
pub const NOSTR_KIND_ZAP_RECEIPT: u32 = 9735;

/// Account limits
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 64;
pub const MAX_COMMENT_ALLOWED: u16 = 2000;
