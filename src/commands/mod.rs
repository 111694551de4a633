//! Command functions exposed through the gateway, one per request kind.
//!
//! Each command is a thin call into the ledger, session registry, aggregator
//! or catalog held by [`AppState`](crate::AppState). Failures come back as a
//! [`CommandError`] carrying the stable code of the underlying error.

pub mod menu;
pub mod reports;
pub mod sales;
pub mod sessions;

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl CommandError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        CommandError {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_request(reason: impl Display) -> Self {
        Self::new("INVALID_REQUEST", reason.to_string())
    }

    pub fn unknown_command(command: &str) -> Self {
        Self::new("UNKNOWN_COMMAND", format!("Unknown command '{command}'"))
    }
}

impl From<LedgerError> for CommandError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::Storage(_) | LedgerError::LockPoisoned => {
                warn!(error = %err, "Command failed in the store")
            }
            _ => warn!(code = err.code(), error = %err, "Command rejected"),
        }
        CommandError::new(err.code(), err.to_string())
    }
}

impl Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
