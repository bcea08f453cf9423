//! Wager lifecycle engine.
//!
//! The engine is the single mutation path for wagers and for wager-driven
//! balance changes. Each operation pairs one status change with one balance
//! change and applies both or neither:
//! - debits (escrow) are taken before the status compare-and-swap and
//!   refunded if the swap loses
//! - credits (refunds, payouts) are made only by the swap winner, and the
//!   status is swapped back if the credit cannot be applied
//!
//! A lost swap is reported as [`EngineError::Conflict`]; the engine never
//! retries on its own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::Points;
use crate::clock::Clock;
use crate::ledger::{InMemoryLedger, LedgerStore};
use crate::model::{
    LifecycleEvent, NewWager, Payout, UserId, Wager, WagerFilter, WagerId, WagerStatus,
};
use crate::repository::{InMemoryWagerRepository, WagerRepository};

mod error;
pub use error::{EngineError, Rejection, ValidationError};

/// The wager lifecycle engine.
///
/// Cheap to share behind an `Arc`; all state lives in the stores.
pub struct Engine {
    ledger: Arc<dyn LedgerStore>,
    wagers: Arc<dyn WagerRepository>,
    clock: Arc<dyn Clock>,
}

/// Public API
impl Engine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        wagers: Arc<dyn WagerRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            wagers,
            clock,
        }
    }

    /// An engine backed by fresh in-memory stores.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemoryWagerRepository::new()),
            clock,
        )
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Open a user account with a starting balance.
    pub async fn open_account(&self, user: &UserId, initial: Points) -> Result<(), EngineError> {
        self.ledger.open_account(user, initial).await?;
        info!(user = %user, balance = %initial, "account opened");
        Ok(())
    }

    /// Current balance of a user.
    pub async fn balance(&self, user: &UserId) -> Result<Points, EngineError> {
        Ok(self.ledger.balance(user).await?)
    }

    /// Every account and its balance, sorted by user id.
    pub async fn balances(&self) -> Vec<(UserId, Points)> {
        self.ledger.accounts().await
    }

    /// Propose a wager, escrowing the creator's stake.
    pub async fn create_wager(&self, new: NewWager) -> Result<Wager, EngineError> {
        let creator = new.creator.clone();
        let amount = new.amount;
        let result = self.apply_create(new).await;
        match &result {
            Ok(wager) => info!(
                wager = %wager.id,
                user = %creator,
                receiver = %wager.receiver,
                amount = %amount,
                "create applied"
            ),
            Err(e) => info!(user = %creator, amount = %amount, reason = %e, "create skipped"),
        }
        result
    }

    /// Receiver accepts a proposed wager, escrowing their stake.
    pub async fn accept(&self, id: &WagerId, caller: &UserId) -> Result<Wager, EngineError> {
        let result = self.apply_accept(id, caller).await;
        Self::log_result(LifecycleEvent::Accept, id, Some(caller), &result);
        result
    }

    /// Receiver declines a proposed wager; the creator's stake is returned.
    pub async fn decline(&self, id: &WagerId, caller: &UserId) -> Result<Wager, EngineError> {
        let result = self.apply_decline(id, caller).await;
        Self::log_result(LifecycleEvent::Decline, id, Some(caller), &result);
        result
    }

    /// Creator settles an active wager; the winner receives both stakes.
    pub async fn resolve(
        &self,
        id: &WagerId,
        caller: &UserId,
        winner: &UserId,
    ) -> Result<Payout, EngineError> {
        let result = self.apply_resolve(id, caller, winner).await;
        Self::log_result(LifecycleEvent::Resolve, id, Some(caller), &result);
        result
    }

    /// Expire an overdue proposed wager; the creator's stake is returned.
    pub async fn expire(&self, id: &WagerId) -> Result<Wager, EngineError> {
        let result = self.apply_expire(id).await;
        Self::log_result(LifecycleEvent::Expire, id, None, &result);
        result
    }

    /// Fetch a wager, expiring it first if its offer has lapsed.
    pub async fn get_wager(&self, id: &WagerId) -> Result<Wager, EngineError> {
        let wager = self.wagers.get(id).await?;
        self.settle_overdue(wager).await
    }

    /// A user's wagers in either role, newest first. Lapsed offers are expired
    /// before they are returned.
    pub async fn list_wagers(
        &self,
        user: &UserId,
        filter: WagerFilter,
    ) -> Result<Vec<Wager>, EngineError> {
        if !self.ledger.contains(user).await {
            return Err(EngineError::UserNotFound(user.clone()));
        }

        let mut listed = Vec::new();
        for wager in self.wagers.list_for_user(user).await? {
            let wager = self.settle_overdue(wager).await?;
            if filter.matches(&wager) {
                listed.push(wager);
            }
        }
        Ok(listed)
    }

    /// Offers awaiting this user's response, newest first.
    pub async fn list_incoming(&self, user: &UserId) -> Result<Vec<Wager>, EngineError> {
        Ok(self
            .list_wagers(user, WagerFilter::Actionable)
            .await?
            .into_iter()
            .filter(|w| &w.receiver == user && w.status == WagerStatus::Proposed)
            .collect())
    }

    /// Proposed wagers whose deadline has passed, oldest first.
    pub async fn overdue(&self) -> Result<Vec<Wager>, EngineError> {
        Ok(self.wagers.list_overdue(self.clock.now()).await?)
    }
}

/// Private API
impl Engine {
    /// Small helper to log transition results
    fn log_result<T, E: std::fmt::Display>(
        event: LifecycleEvent,
        wager: &WagerId,
        caller: Option<&UserId>,
        result: &Result<T, E>,
    ) {
        match (result, caller) {
            (Ok(_), Some(user)) => info!(wager = %wager, user = %user, "{event} applied"),
            (Ok(_), None) => info!(wager = %wager, "{event} applied"),
            (Err(e), Some(user)) => {
                info!(wager = %wager, user = %user, reason = %e, "{event} skipped")
            }
            (Err(e), None) => info!(wager = %wager, reason = %e, "{event} skipped"),
        }
    }

    /// Check the terms of a new wager without touching storage.
    fn validate(new: &NewWager, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if new.receiver.as_str().trim().is_empty() {
            return Err(ValidationError::MissingReceiver);
        }
        if new.description.trim().is_empty() {
            return Err(ValidationError::MissingDescription);
        }
        if new.amount.is_zero() {
            return Err(ValidationError::NonPositiveAmount);
        }
        if new
            .amount
            .doubled()
            .is_none_or(|payout| payout.value() > i64::MAX as u64)
        {
            return Err(ValidationError::AmountTooLarge(new.amount));
        }
        if new.expires_at <= now {
            return Err(ValidationError::ExpirationInPast);
        }
        if new.creator == new.receiver {
            return Err(ValidationError::SelfWager);
        }
        Ok(())
    }

    /// Target status for `event`, or the reason it is refused.
    fn transition(wager: &Wager, event: LifecycleEvent) -> Result<WagerStatus, EngineError> {
        wager.status.apply(event).ok_or_else(|| {
            let reason = match (wager.status, event) {
                (WagerStatus::Expired, LifecycleEvent::Accept | LifecycleEvent::Decline) => {
                    Rejection::Lapsed
                }
                _ => Rejection::Status,
            };
            Self::rejected(wager, event, reason)
        })
    }

    fn rejected(wager: &Wager, event: LifecycleEvent, reason: Rejection) -> EngineError {
        EngineError::InvalidTransition {
            wager: wager.id.clone(),
            status: wager.status,
            event,
            reason,
        }
    }

    /// Expire `wager` if its offer has lapsed and return its current state.
    /// Losing the expiry to another caller is fine: the stored record is
    /// re-read instead.
    async fn settle_overdue(&self, wager: Wager) -> Result<Wager, EngineError> {
        if !wager.is_overdue(self.clock.now()) {
            return Ok(wager);
        }

        match self.expire(&wager.id).await {
            Ok(expired) => Ok(expired),
            Err(EngineError::Conflict { .. } | EngineError::InvalidTransition { .. }) => {
                Ok(self.wagers.get(&wager.id).await?)
            }
            Err(e) => Err(e),
        }
    }

    /// Take `amount` from `payer`, then swap the status. The debit is
    /// refunded if the swap loses.
    async fn debit_then_swap(
        &self,
        wager: &Wager,
        to: WagerStatus,
        payer: &UserId,
        amount: Points,
    ) -> Result<(), EngineError> {
        self.ledger.apply_delta(payer, amount.as_debit()).await?;

        if let Err(err) = self.wagers.update_status(&wager.id, wager.status, to).await {
            self.refund(&wager.id, payer, amount).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Swap the status, then give `amount` to `payee`. The status is swapped
    /// back if the credit cannot be applied.
    async fn swap_then_credit(
        &self,
        wager: &Wager,
        to: WagerStatus,
        payee: &UserId,
        amount: Points,
    ) -> Result<(), EngineError> {
        self.wagers.update_status(&wager.id, wager.status, to).await?;

        if let Err(err) = self.ledger.apply_delta(payee, amount.as_credit()).await {
            warn!(
                wager = %wager.id,
                user = %payee,
                amount = %amount,
                reason = %err,
                "credit failed, reverting status"
            );
            if let Err(revert) = self.wagers.update_status(&wager.id, to, wager.status).await {
                error!(wager = %wager.id, reason = %revert, "status revert failed");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Compensating credit for an escrow debit that did not stick.
    async fn refund(&self, wager: &WagerId, user: &UserId, amount: Points) {
        match self.ledger.apply_delta(user, amount.as_credit()).await {
            Ok(_) => warn!(wager = %wager, user = %user, amount = %amount, "escrow refunded"),
            Err(e) => error!(
                wager = %wager,
                user = %user,
                amount = %amount,
                reason = %e,
                "escrow refund failed"
            ),
        }
    }

    /// Apply a create:
    /// - Validate terms against the clock
    /// - Ensure receiver exists
    /// - Escrow the creator's stake
    /// - Store the wager as proposed (refund on failure)
    async fn apply_create(&self, new: NewWager) -> Result<Wager, EngineError> {
        let now = self.clock.now();
        Self::validate(&new, now)?;

        if !self.ledger.contains(&new.receiver).await {
            return Err(EngineError::UserNotFound(new.receiver));
        }

        let wager = Wager {
            id: WagerId::generate(),
            creator: new.creator,
            receiver: new.receiver,
            description: new.description,
            amount: new.amount,
            expires_at: new.expires_at,
            saved_at: now,
            status: WagerStatus::Proposed,
        };

        self.ledger
            .apply_delta(&wager.creator, wager.amount.as_debit())
            .await?;

        if let Err(err) = self.wagers.create(wager.clone()).await {
            self.refund(&wager.id, &wager.creator, wager.amount).await;
            return Err(err.into());
        }

        Ok(wager)
    }

    /// Apply an accept:
    /// - Expire a lapsed offer first, then refuse it
    /// - Ensure caller is the receiver
    /// - Check the deadline again right before escrow
    /// - Escrow the receiver's stake and move to active
    async fn apply_accept(&self, id: &WagerId, caller: &UserId) -> Result<Wager, EngineError> {
        use LifecycleEvent::Accept;

        let wager = self.get_wager(id).await?;
        let to = Self::transition(&wager, Accept)?;

        if &wager.receiver != caller {
            return Err(Self::rejected(&wager, Accept, Rejection::NotReceiver));
        }

        // the deadline may have passed since the read
        if wager.is_overdue(self.clock.now()) {
            let wager = self.settle_overdue(wager).await?;
            return Err(Self::rejected(&wager, Accept, Rejection::Lapsed));
        }

        self.debit_then_swap(&wager, to, caller, wager.amount).await?;

        Ok(Wager { status: to, ..wager })
    }

    /// Apply a decline:
    /// - Expire a lapsed offer first, then refuse it
    /// - Ensure caller is the receiver
    /// - Move to declined and return the creator's stake
    async fn apply_decline(&self, id: &WagerId, caller: &UserId) -> Result<Wager, EngineError> {
        let wager = self.get_wager(id).await?;
        let to = Self::transition(&wager, LifecycleEvent::Decline)?;

        if &wager.receiver != caller {
            return Err(Self::rejected(
                &wager,
                LifecycleEvent::Decline,
                Rejection::NotReceiver,
            ));
        }

        self.swap_then_credit(&wager, to, &wager.creator, wager.amount).await?;

        Ok(Wager { status: to, ..wager })
    }

    /// Apply a resolve:
    /// - Ensure wager is active and caller is the creator
    /// - Ensure the winner is one of the two parties
    /// - Move to resolved and pay both stakes to the winner
    async fn apply_resolve(
        &self,
        id: &WagerId,
        caller: &UserId,
        winner: &UserId,
    ) -> Result<Payout, EngineError> {
        use LifecycleEvent::Resolve;

        let wager = self.get_wager(id).await?;
        let to = Self::transition(&wager, Resolve)?;

        if &wager.creator != caller {
            return Err(Self::rejected(&wager, Resolve, Rejection::NotCreator));
        }
        if !wager.involves(winner) {
            return Err(Self::rejected(&wager, Resolve, Rejection::WinnerNotParty));
        }

        // bounded at creation
        let payout = wager.amount.doubled().ok_or_else(|| {
            EngineError::Validation(ValidationError::AmountTooLarge(wager.amount))
        })?;

        self.swap_then_credit(&wager, to, winner, payout).await?;

        Ok(Payout {
            wager: wager.id,
            winner: winner.clone(),
            amount: payout,
        })
    }

    /// Apply an expire:
    /// - Ensure wager is still proposed and its deadline has passed
    /// - Move to expired and return the creator's stake
    async fn apply_expire(&self, id: &WagerId) -> Result<Wager, EngineError> {
        use LifecycleEvent::Expire;

        let wager = self.wagers.get(id).await?;
        let to = Self::transition(&wager, Expire)?;

        if !wager.is_overdue(self.clock.now()) {
            return Err(Self::rejected(&wager, Expire, Rejection::NotDue));
        }

        self.swap_then_credit(&wager, to, &wager.creator, wager.amount).await?;

        Ok(Wager { status: to, ..wager })
    }
}
