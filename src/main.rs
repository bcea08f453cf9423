use std::env;
use std::fs::File;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use wager_ledger::Engine;
use wager_ledger::clock::ManualClock;
use wager_ledger::config::Config;
use wager_ledger::csv::{read_commands, write_balances, write_wagers};
use wager_ledger::replay::Replay;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::WARN.into()))
        .with_writer(io::stderr)
        .init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: wager-ledger <commands.csv>");
        return ExitCode::from(2);
    };

    if !path.ends_with(".csv") {
        warn!(path = %path, "input file seems to not be a csv file");
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let commands = match read_commands(path.clone()) {
        Ok(commands) => commands,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
    let engine = Arc::new(Engine::in_memory(clock.clone()));
    let mut replay = Replay::new(engine.clone(), clock, &config);
    let (cmd_sender, cmd_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in commands {
            match result {
                Ok(cmd) => {
                    if cmd_sender.send(cmd).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    replay.run(ReceiverStream::new(cmd_receiver)).await;

    if let Err(e) = write_balances(io::stdout().lock(), engine.balances().await) {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    if let Some(dump_path) = &config.dump_path {
        let result = match (replay.wagers().await, File::create(dump_path)) {
            (Ok(wagers), Ok(file)) => write_wagers(
                file,
                wagers.iter().map(|(label, wager)| (label.as_str(), wager)),
            )
            .map_err(|e| e.to_string()),
            (Err(e), _) => Err(e.to_string()),
            (_, Err(e)) => Err(e.to_string()),
        };
        if let Err(e) = result {
            error!(path = %dump_path.display(), "failed to write wagers: {e}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
