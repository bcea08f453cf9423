//! Wager records keyed by wager id.
//!
//! Records are never deleted. The only mutation after creation is
//! [`WagerRepository::update_status`], a compare-and-swap on the status field.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::model::{UserId, Wager, WagerId, WagerStatus};

/// Errors raised by a [`WagerRepository`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("wager {0} not found")]
    NotFound(WagerId),

    #[error("wager {0} already exists")]
    DuplicateId(WagerId),

    #[error("wager {wager} is {actual}, expected {expected}")]
    Conflict {
        wager: WagerId,
        expected: WagerStatus,
        actual: WagerStatus,
    },
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Storage of wager records.
#[async_trait]
pub trait WagerRepository: Send + Sync {
    /// Store a new wager.
    async fn create(&self, wager: Wager) -> RepositoryResult<WagerId>;

    /// Fetch a wager by id.
    async fn get(&self, id: &WagerId) -> RepositoryResult<Wager>;

    /// Every wager the user is party to, in either role, newest first.
    async fn list_for_user(&self, user: &UserId) -> RepositoryResult<Vec<Wager>>;

    /// Proposed wagers whose expiration is at or before `now`.
    async fn list_overdue(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Wager>>;

    /// Set the status to `new` only if it is currently `expected`.
    async fn update_status(
        &self,
        id: &WagerId,
        expected: WagerStatus,
        new: WagerStatus,
    ) -> RepositoryResult<()>;
}

#[derive(Debug)]
struct StoredWager {
    /// Insertion order, breaks ties between equal save times.
    seq: u64,
    wager: Wager,
}

#[derive(Debug, Default)]
struct Records {
    next_seq: u64,
    wagers: HashMap<WagerId, StoredWager>,
}

/// In-process wager repository.
#[derive(Debug, Default)]
pub struct InMemoryWagerRepository {
    records: Mutex<Records>,
}

impl InMemoryWagerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WagerRepository for InMemoryWagerRepository {
    async fn create(&self, wager: Wager) -> RepositoryResult<WagerId> {
        let mut records = self.records.lock().await;
        if records.wagers.contains_key(&wager.id) {
            return Err(RepositoryError::DuplicateId(wager.id));
        }

        let id = wager.id.clone();
        let seq = records.next_seq;
        records.next_seq += 1;
        records.wagers.insert(id.clone(), StoredWager { seq, wager });
        Ok(id)
    }

    async fn get(&self, id: &WagerId) -> RepositoryResult<Wager> {
        self.records
            .lock()
            .await
            .wagers
            .get(id)
            .map(|stored| stored.wager.clone())
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    async fn list_for_user(&self, user: &UserId) -> RepositoryResult<Vec<Wager>> {
        let records = self.records.lock().await;
        let mut matching: Vec<&StoredWager> = records
            .wagers
            .values()
            .filter(|stored| stored.wager.involves(user))
            .collect();

        // newest first
        matching.sort_by(|a, b| {
            b.wager
                .saved_at
                .cmp(&a.wager.saved_at)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(matching.into_iter().map(|s| s.wager.clone()).collect())
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Wager>> {
        let records = self.records.lock().await;
        let mut overdue: Vec<&StoredWager> = records
            .wagers
            .values()
            .filter(|stored| stored.wager.is_overdue(now))
            .collect();
        overdue.sort_by_key(|stored| stored.seq);

        Ok(overdue.into_iter().map(|s| s.wager.clone()).collect())
    }

    async fn update_status(
        &self,
        id: &WagerId,
        expected: WagerStatus,
        new: WagerStatus,
    ) -> RepositoryResult<()> {
        let mut records = self.records.lock().await;
        let stored = records
            .wagers
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;

        if stored.wager.status != expected {
            return Err(RepositoryError::Conflict {
                wager: id.clone(),
                expected,
                actual: stored.wager.status,
            });
        }

        stored.wager.status = new;
        Ok(())
    }
}
