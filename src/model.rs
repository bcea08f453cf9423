//! Core domain types for the wager ledger.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Points;

/// User identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId(id.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque wager identifier, generated once at creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WagerId(String);

impl WagerId {
    pub fn generate() -> Self {
        WagerId(format!("wager_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WagerId {
    fn from(id: &str) -> Self {
        WagerId(id.to_string())
    }
}

impl fmt::Display for WagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    /// Awaiting the receiver's response; creator stake escrowed.
    #[default]
    Proposed,
    /// Accepted; both stakes escrowed.
    Active,
    /// Winner paid out (terminal).
    Resolved,
    /// Receiver declined, creator stake returned (terminal).
    Declined,
    /// Never answered in time, creator stake returned (terminal).
    Expired,
}

impl WagerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Declined | Self::Expired)
    }

    /// Proposed or active wagers still expect an action from someone.
    pub fn is_actionable(self) -> bool {
        !self.is_terminal()
    }

    /// The status reached by applying `event`, or `None` if the event is not
    /// valid from this status. Every mutating path goes through here.
    pub fn apply(self, event: LifecycleEvent) -> Option<WagerStatus> {
        use LifecycleEvent::*;
        use WagerStatus::*;

        match (self, event) {
            (Proposed, Accept) => Some(Active),
            (Proposed, Decline) => Some(Declined),
            (Proposed, Expire) => Some(Expired),
            (Active, Resolve) => Some(Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WagerStatus::Proposed => "proposed",
            WagerStatus::Active => "active",
            WagerStatus::Resolved => "resolved",
            WagerStatus::Declined => "declined",
            WagerStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// An event that moves an existing wager between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Accept,
    Decline,
    Expire,
    Resolve,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 4] = [Self::Accept, Self::Decline, Self::Expire, Self::Resolve];
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleEvent::Accept => "accept",
            LifecycleEvent::Decline => "decline",
            LifecycleEvent::Expire => "expire",
            LifecycleEvent::Resolve => "resolve",
        };
        f.write_str(s)
    }
}

/// A stored wager record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub creator: UserId,
    pub receiver: UserId,
    pub description: String,
    pub amount: Points,
    pub expires_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    pub status: WagerStatus,
}

impl Wager {
    /// Whether `user` is the creator or the receiver.
    pub fn involves(&self, user: &UserId) -> bool {
        &self.creator == user || &self.receiver == user
    }

    /// A proposed wager whose deadline has passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == WagerStatus::Proposed && now >= self.expires_at
    }
}

/// Terms of a wager about to be proposed.
#[derive(Debug, Clone)]
pub struct NewWager {
    pub creator: UserId,
    pub receiver: UserId,
    pub description: String,
    pub amount: Points,
    pub expires_at: DateTime<Utc>,
}

/// Which of a user's wagers to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WagerFilter {
    #[default]
    All,
    /// Only proposed or active wagers.
    Actionable,
}

impl WagerFilter {
    pub fn matches(self, wager: &Wager) -> bool {
        match self {
            WagerFilter::All => true,
            WagerFilter::Actionable => wager.status.is_actionable(),
        }
    }
}

/// Points credited to the winner when a wager is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payout {
    pub wager: WagerId,
    pub winner: UserId,
    pub amount: Points,
}
