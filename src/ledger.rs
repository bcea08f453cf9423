//! Point balances keyed by user.
//!
//! The engine is the only caller that moves points as a wager effect; every
//! mutation goes through [`LedgerStore::apply_delta`], which checks and
//! writes under one lock so a balance can never be driven below zero.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::Points;
use crate::model::UserId;

/// Errors raised by a [`LedgerStore`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(UserId),

    #[error("account {0} already exists")]
    AccountExists(UserId),

    #[error("insufficient points for {user}: available {available}, required {required}")]
    InsufficientFunds {
        user: UserId,
        available: Points,
        required: Points,
    },

    #[error("balance of {0} would overflow")]
    Overflow(UserId),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Storage of per-user point balances.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open an account with an initial balance.
    async fn open_account(&self, user: &UserId, initial: Points) -> LedgerResult<()>;

    /// Whether the user has an account.
    async fn contains(&self, user: &UserId) -> bool;

    /// Current balance of a user.
    async fn balance(&self, user: &UserId) -> LedgerResult<Points>;

    /// Atomically add `delta` (which may be negative) to a balance and return
    /// the new balance. Fails without mutating if the result would be negative.
    async fn apply_delta(&self, user: &UserId, delta: i64) -> LedgerResult<Points>;

    /// Every account and its balance, sorted by user id.
    async fn accounts(&self) -> Vec<(UserId, Points)>;
}

/// In-process ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<UserId, Points>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn open_account(&self, user: &UserId, initial: Points) -> LedgerResult<()> {
        let mut balances = self.balances.lock().await;
        if balances.contains_key(user) {
            return Err(LedgerError::AccountExists(user.clone()));
        }
        balances.insert(user.clone(), initial);
        Ok(())
    }

    async fn contains(&self, user: &UserId) -> bool {
        self.balances.lock().await.contains_key(user)
    }

    async fn balance(&self, user: &UserId) -> LedgerResult<Points> {
        self.balances
            .lock()
            .await
            .get(user)
            .copied()
            .ok_or_else(|| LedgerError::AccountNotFound(user.clone()))
    }

    async fn apply_delta(&self, user: &UserId, delta: i64) -> LedgerResult<Points> {
        let mut balances = self.balances.lock().await;
        let balance = balances
            .get_mut(user)
            .ok_or_else(|| LedgerError::AccountNotFound(user.clone()))?;

        let updated = match balance.checked_apply(delta) {
            Some(updated) => updated,
            None if delta < 0 => {
                return Err(LedgerError::InsufficientFunds {
                    user: user.clone(),
                    available: *balance,
                    required: Points::new(delta.unsigned_abs()),
                });
            }
            None => return Err(LedgerError::Overflow(user.clone())),
        };

        *balance = updated;
        Ok(updated)
    }

    async fn accounts(&self) -> Vec<(UserId, Points)> {
        let mut accounts: Vec<_> = self
            .balances
            .lock()
            .await
            .iter()
            .map(|(user, balance)| (user.clone(), *balance))
            .collect();
        accounts.sort();
        accounts
    }
}
