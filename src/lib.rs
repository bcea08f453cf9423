pub mod clock;
pub mod config;
pub mod csv;
pub mod engine;
pub mod ledger;
pub mod model;
pub mod points;
pub mod replay;
pub mod repository;
pub mod sweeper;

pub use engine::{Engine, EngineError};
pub use model::{NewWager, Payout, UserId, Wager, WagerFilter, WagerId, WagerStatus};
pub use points::Points;
