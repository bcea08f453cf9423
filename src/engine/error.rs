//! Error types for lifecycle operations.

use thiserror::Error;

use crate::Points;
use crate::ledger::LedgerError;
use crate::model::{LifecycleEvent, UserId, WagerId, WagerStatus};
use crate::repository::RepositoryError;

/// Top-level error returned by every [`Engine`](super::Engine) operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid wager: {0}")]
    Validation(#[from] ValidationError),

    #[error("wager {0} not found")]
    WagerNotFound(WagerId),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("insufficient points for {user}: available {available}, required {required}")]
    InsufficientFunds {
        user: UserId,
        available: Points,
        required: Points,
    },

    #[error("cannot {event} wager {wager} while {status}: {reason}")]
    InvalidTransition {
        wager: WagerId,
        status: WagerStatus,
        event: LifecycleEvent,
        reason: Rejection,
    },

    #[error("wager {wager} changed concurrently: expected {expected}, found {actual}")]
    Conflict {
        wager: WagerId,
        expected: WagerStatus,
        actual: WagerStatus,
    },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    /// A message safe to show to the caller.
    pub fn client_message(&self) -> String {
        match self {
            EngineError::Storage(_) => "Internal error".to_string(),
            EngineError::WagerNotFound(_) => "Wager not found".to_string(),
            EngineError::UserNotFound(_) => "User not found".to_string(),
            EngineError::InsufficientFunds { .. } => "Insufficient balance".to_string(),
            EngineError::Conflict { .. } => {
                "Wager was updated by someone else, please retry".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Bad input, detected before any stored state is read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("receiver is required")]
    MissingReceiver,
    #[error("description is required")]
    MissingDescription,
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("amount {0} is too large to pay out")]
    AmountTooLarge(Points),
    #[error("expiration must be in the future")]
    ExpirationInPast,
    #[error("creator and receiver must differ")]
    SelfWager,
}

/// Why a lifecycle event was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The event is not valid from the current status.
    Status,
    /// Only the receiver may accept or decline.
    NotReceiver,
    /// Only the creator may resolve.
    NotCreator,
    /// The declared winner is not a party to the wager.
    WinnerNotParty,
    /// The offer lapsed before the response arrived.
    Lapsed,
    /// Expiration requested before the deadline.
    NotDue,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Rejection::Status => "not allowed from this status",
            Rejection::NotReceiver => "caller is not the receiver",
            Rejection::NotCreator => "caller is not the creator",
            Rejection::WinnerNotParty => "winner is not a party to the wager",
            Rejection::Lapsed => "offer has expired",
            Rejection::NotDue => "expiration has not been reached",
        };
        f.write_str(s)
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound(user) => EngineError::UserNotFound(user),
            LedgerError::InsufficientFunds {
                user,
                available,
                required,
            } => EngineError::InsufficientFunds {
                user,
                available,
                required,
            },
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(wager) => EngineError::WagerNotFound(wager),
            RepositoryError::Conflict {
                wager,
                expected,
                actual,
            } => EngineError::Conflict {
                wager,
                expected,
                actual,
            },
            other => EngineError::Storage(other.to_string()),
        }
    }
}
