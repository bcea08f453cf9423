use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Points;
use crate::model::{UserId, Wager};

/// Errors that can occur when reading or writing csv
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: PathBuf, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized command '{command}'")]
    UnrecognizedCommand { line: usize, command: String },

    #[error("line {line}: {command} missing {field}")]
    MissingField {
        line: usize,
        command: String,
        field: &'static str,
    },

    #[error("line {line}: timestamp {value} out of range")]
    InvalidTimestamp { line: usize, value: i64 },

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to write csv: {0}")]
    Io(#[from] io::Error),
}

/// A scripted call into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open an account; `balance` falls back to the configured default.
    Open {
        user: UserId,
        balance: Option<Points>,
    },
    /// Propose a wager, referred to by `label` in later rows.
    Create {
        user: UserId,
        label: String,
        receiver: UserId,
        amount: Points,
        expires_at: DateTime<Utc>,
        description: String,
    },
    Accept {
        user: UserId,
        label: String,
    },
    Decline {
        user: UserId,
        label: String,
    },
    Resolve {
        user: UserId,
        label: String,
        winner: UserId,
    },
    Expire {
        label: String,
    },
}

/// A command together with the logical time it runs at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedCommand {
    pub line: usize,
    pub at: DateTime<Utc>,
    pub command: Command,
}

#[derive(Debug, Deserialize)]
struct InputRow {
    at: i64,
    r#type: String,
    user: Option<String>,
    wager: Option<String>,
    counterparty: Option<String>,
    amount: Option<u64>,
    expires_at: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct BalanceRow<'a> {
    user: &'a str,
    balance: u64,
}

#[derive(Debug, Serialize)]
struct WagerRow<'a> {
    label: &'a str,
    id: &'a str,
    creator: &'a str,
    receiver: &'a str,
    amount: u64,
    status: String,
    saved_at: i64,
    expires_at: i64,
    description: &'a str,
}

/// Read commands from a csv file
pub fn read_commands(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<TimedCommand, CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            parse_row(line, row)
        }))
}

fn parse_row(line: usize, row: InputRow) -> Result<TimedCommand, CsvError> {
    let command_name = row.r#type.to_ascii_lowercase();
    let missing = |field: &'static str| CsvError::MissingField {
        line,
        command: command_name.clone(),
        field,
    };
    let timestamp = |secs: i64| {
        DateTime::from_timestamp(secs, 0).ok_or(CsvError::InvalidTimestamp { line, value: secs })
    };

    let user = row.user.map(UserId::new);
    let label = row.wager;
    let counterparty = row.counterparty.map(UserId::new);

    let command = match command_name.as_str() {
        "open" => Command::Open {
            user: user.ok_or_else(|| missing("user"))?,
            balance: row.amount.map(Points::new),
        },
        "create" => Command::Create {
            user: user.ok_or_else(|| missing("user"))?,
            label: label.ok_or_else(|| missing("wager"))?,
            receiver: counterparty.ok_or_else(|| missing("counterparty"))?,
            amount: row.amount.map(Points::new).ok_or_else(|| missing("amount"))?,
            expires_at: timestamp(row.expires_at.ok_or_else(|| missing("expires_at"))?)?,
            description: row.description.ok_or_else(|| missing("description"))?,
        },
        "accept" => Command::Accept {
            user: user.ok_or_else(|| missing("user"))?,
            label: label.ok_or_else(|| missing("wager"))?,
        },
        "decline" => Command::Decline {
            user: user.ok_or_else(|| missing("user"))?,
            label: label.ok_or_else(|| missing("wager"))?,
        },
        "resolve" => Command::Resolve {
            user: user.ok_or_else(|| missing("user"))?,
            label: label.ok_or_else(|| missing("wager"))?,
            winner: counterparty.ok_or_else(|| missing("counterparty"))?,
        },
        "expire" => Command::Expire {
            label: label.ok_or_else(|| missing("wager"))?,
        },
        _ => {
            return Err(CsvError::UnrecognizedCommand {
                line,
                command: row.r#type,
            });
        }
    };

    Ok(TimedCommand {
        line,
        at: timestamp(row.at)?,
        command,
    })
}

/// Write account balances in csv format
pub fn write_balances(
    writer: impl io::Write,
    accounts: impl IntoIterator<Item = (UserId, Points)>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for (user, balance) in accounts {
        writer.serialize(BalanceRow {
            user: user.as_str(),
            balance: balance.value(),
        })?;
    }

    writer.flush()?;
    Ok(())
}

/// Write labelled wagers in csv format
pub fn write_wagers<'a>(
    writer: impl io::Write,
    wagers: impl IntoIterator<Item = (&'a str, &'a Wager)>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for (label, wager) in wagers {
        writer.serialize(WagerRow {
            label,
            id: wager.id.as_str(),
            creator: wager.creator.as_str(),
            receiver: wager.receiver.as_str(),
            amount: wager.amount.value(),
            status: wager.status.to_string(),
            saved_at: wager.saved_at.timestamp(),
            expires_at: wager.expires_at.timestamp(),
            description: &wager.description,
        })?;
    }

    writer.flush()?;
    Ok(())
}
