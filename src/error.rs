use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Quantity must be greater than zero, got {0}")]
    InvalidQuantity(i64),

    #[error("Menu item {0} not found")]
    UnknownMenuItem(i64),

    #[error("Session {0} is already active; close it before starting another")]
    SessionAlreadyActive(i64),

    #[error("Session {0} not found")]
    SessionNotFound(i64),

    #[error("Session {0} is already closed")]
    SessionAlreadyClosed(i64),

    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("{0} must not be negative")]
    NegativeAmount(&'static str),

    #[error("Amount overflow while computing {0}")]
    AmountOverflow(&'static str),

    #[error("Date {0} is outside the supported calendar range")]
    DateOutOfRange(NaiveDate),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Stable machine-readable code surfaced by the gateway.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidQuantity(_) => "INVALID_QUANTITY",
            LedgerError::UnknownMenuItem(_) => "UNKNOWN_MENU_ITEM",
            LedgerError::SessionAlreadyActive(_) => "SESSION_ALREADY_ACTIVE",
            LedgerError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            LedgerError::SessionAlreadyClosed(_) => "SESSION_ALREADY_CLOSED",
            LedgerError::InvalidRange { .. } => "INVALID_RANGE",
            LedgerError::NegativeAmount(_) => "NEGATIVE_AMOUNT",
            LedgerError::AmountOverflow(_) => "AMOUNT_OVERFLOW",
            LedgerError::DateOutOfRange(_) => "DATE_OUT_OF_RANGE",
            LedgerError::Storage(_) => "STORAGE",
            LedgerError::LockPoisoned => "LOCK_POISONED",
            LedgerError::Config(_) => "CONFIG",
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        LedgerError::LockPoisoned
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
