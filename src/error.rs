// auction_core/src/error.rs
//
// The error taxonomy. Three families, matching the three places an error
// can originate: a bad order at the door (OrderError), a store that refused
// to write (PersistenceError), and bad settings at startup (ConfigError).
//
// Invariant violations (empty heap access when can_match said otherwise,
// negative remaining quantity) are NOT represented here — those are bugs,
// not recoverable conditions, and are raised with `debug_assert!`/`panic!`
// at the point of detection.

use thiserror::Error;

/// Why an order submission was rejected before ever reaching the book.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("price must be positive, got {0}")]
    InvalidPrice(i64),

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("symbol '{0}' exceeds the 10-character limit")]
    SymbolTooLong(String),

    #[error("unrecognized side string '{0}'")]
    UnknownSide(String),
}

/// Failures surfaced by the persistence boundary. The in-memory engine
/// state remains authoritative; the core never retries on these.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("duplicate key for {entity} id {id}")]
    DuplicateKey { entity: &'static str, id: u64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("store connection lost: {0}")]
    ConnectionLost(String),

    #[error("audit log write failed: {0}")]
    AuditLogWrite(#[from] std::io::Error),
}

/// Failures loading configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
