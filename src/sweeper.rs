//! Background expiry of lapsed wager offers.
//!
//! The sweeper owns no state of its own. It asks the engine for overdue
//! proposals and drives [`Engine::expire`] on each one; the repository's
//! status compare-and-swap makes it safe to race with accept or decline on
//! the same wager.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineError};

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Wagers this sweep moved to expired.
    pub expired: usize,
    /// Wagers another caller settled first.
    pub skipped: usize,
}

/// Expires overdue proposed wagers, on demand or on a fixed interval.
pub struct ExpirationSweeper {
    engine: Arc<Engine>,
}

impl ExpirationSweeper {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Expire every wager that is overdue right now.
    pub async fn sweep_once(&self) -> Result<SweepReport, EngineError> {
        let mut report = SweepReport::default();

        for wager in self.engine.overdue().await? {
            match self.engine.expire(&wager.id).await {
                Ok(_) => report.expired += 1,
                // lost to a concurrent accept, decline or expire
                Err(EngineError::Conflict { .. } | EngineError::InvalidTransition { .. }) => {
                    report.skipped += 1
                }
                Err(e) => return Err(e),
            }
        }

        if report.expired > 0 || report.skipped > 0 {
            info!(
                expired = report.expired,
                skipped = report.skipped,
                "sweep finished"
            );
        }
        Ok(report)
    }

    /// Run sweeps every `interval` until `shutdown` changes or its sender
    /// is dropped.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            warn!(reason = %e, "sweep failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        debug!("sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}
