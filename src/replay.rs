//! Scripted driver for the engine.
//!
//! Plays a stream of timestamped commands against an [`Engine`] running on a
//! [`ManualClock`]. Rows refer to wagers by a script-local label; the engine
//! still generates the real ids.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::Points;
use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::csv::{Command, TimedCommand};
use crate::engine::{Engine, EngineError};
use crate::model::{NewWager, Wager, WagerId};
use crate::sweeper::ExpirationSweeper;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("unknown wager label '{0}'")]
    UnknownLabel(String),

    #[error("wager label '{0}' already used")]
    DuplicateLabel(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub struct Replay {
    engine: Arc<Engine>,
    clock: Arc<ManualClock>,
    sweeper: Option<ExpirationSweeper>,
    default_balance: Points,
    labels: HashMap<String, WagerId>,
}

impl Replay {
    pub fn new(engine: Arc<Engine>, clock: Arc<ManualClock>, config: &Config) -> Self {
        let sweeper = config.sweep_each_row.then(|| ExpirationSweeper::new(engine.clone()));

        Self {
            engine,
            clock,
            sweeper,
            default_balance: config.default_balance,
            labels: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Run every command in the stream; failures are logged and skipped.
    pub async fn run(&mut self, mut stream: impl Stream<Item = TimedCommand> + Unpin) {
        while let Some(cmd) = stream.next().await {
            let line = cmd.line;
            if let Err(e) = self.apply(cmd).await {
                warn!(line, reason = %e, "command skipped");
            }
        }
    }

    /// Move the clock to the command's time and run it.
    pub async fn apply(&mut self, cmd: TimedCommand) -> Result<(), ReplayError> {
        // logical time never runs backwards
        if cmd.at > self.clock.now() {
            self.clock.set(cmd.at);
        }

        if let Some(sweeper) = &self.sweeper {
            sweeper.sweep_once().await?;
        }

        match cmd.command {
            Command::Open { user, balance } => {
                let balance = balance.unwrap_or(self.default_balance);
                self.engine.open_account(&user, balance).await?;
            }
            Command::Create {
                user,
                label,
                receiver,
                amount,
                expires_at,
                description,
            } => {
                if self.labels.contains_key(&label) {
                    return Err(ReplayError::DuplicateLabel(label));
                }
                let wager = self
                    .engine
                    .create_wager(NewWager {
                        creator: user,
                        receiver,
                        description,
                        amount,
                        expires_at,
                    })
                    .await?;
                debug!(label = %label, wager = %wager.id, "label bound");
                self.labels.insert(label, wager.id);
            }
            Command::Accept { user, label } => {
                let id = self.resolve_label(&label)?;
                self.engine.accept(&id, &user).await?;
            }
            Command::Decline { user, label } => {
                let id = self.resolve_label(&label)?;
                self.engine.decline(&id, &user).await?;
            }
            Command::Resolve {
                user,
                label,
                winner,
            } => {
                let id = self.resolve_label(&label)?;
                self.engine.resolve(&id, &user, &winner).await?;
            }
            Command::Expire { label } => {
                let id = self.resolve_label(&label)?;
                self.engine.expire(&id).await?;
            }
        }
        Ok(())
    }

    /// Every labelled wager as of the current logical time, sorted by label.
    pub async fn wagers(&self) -> Result<Vec<(String, Wager)>, ReplayError> {
        let mut labels: Vec<_> = self.labels.iter().collect();
        labels.sort();

        let mut wagers = Vec::with_capacity(labels.len());
        for (label, id) in labels {
            wagers.push((label.clone(), self.engine.get_wager(id).await?));
        }
        Ok(wagers)
    }

    fn resolve_label(&self, label: &str) -> Result<WagerId, ReplayError> {
        self.labels
            .get(label)
            .cloned()
            .ok_or_else(|| ReplayError::UnknownLabel(label.to_string()))
    }
}
