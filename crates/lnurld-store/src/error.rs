use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An exclusive create found the record already present.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// Key contains characters or segments that could escape the data directory.
    #[error("Invalid record key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored ticket line failed to parse.
    #[error("Corrupt ticket record: {0}")]
    Ticket(#[from] lnurld_shared::TicketError),
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
