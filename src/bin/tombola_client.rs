use std::{error::Error, process::ExitCode};

use clap::Parser;
use log::{debug, error, info};
use tombola::{
    CancellationToken, Config, CsvSource, EventLog, Session, SignalListener,
    protocol::TcpConnector,
};

fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize env_logger at the configured level; RUST_LOG still wins
    env_logger::Builder::new()
        .filter_level(config.log_level)
        .parse_default_env()
        .init();

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("action: exit | result: fail | error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<(), Box<dyn Error>> {
    debug!(
        "action: config | result: success | client_id: {} | server_address: {} | batch_max_amount: {} | batch_max_bytes: {} | data_path: {} | winners_cooldown_ms: {} | winners_timeout_ms: {} | log_level: {}",
        config.id,
        config.server_address,
        config.batch_max_amount,
        config.batch_max_bytes,
        config.data_path().display(),
        config.winners_cooldown_ms,
        config.winners_timeout_ms,
        config.log_level,
    );

    let cancel = CancellationToken::new();
    let _signals = SignalListener::install(cancel.clone())?;

    let source = CsvSource::open(config.data_path())?;
    let connector = TcpConnector::new(config.server_address.clone(), config.connect_timeout());
    let mut session = Session::new(
        config.session_config(),
        connector,
        source,
        cancel,
        EventLog::global(config.id),
    )?;

    let report = session.run()?;
    info!(
        "action: session | result: success | client_id: {} | batches: {} | bets: {} | winners: {}",
        config.id,
        report.batches_sent,
        report.bets_sent,
        report.winners.len()
    );
    Ok(())
}
