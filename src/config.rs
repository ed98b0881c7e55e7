//! Client configuration.
//!
//! Every option can be given as a flag or through the environment variable next to it,
//! flags taking precedence.
use std::{path::PathBuf, time::Duration};

use clap::Parser;
use log::LevelFilter;

use crate::{
    batch::BatchLimits,
    protocol::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_POLL_INTERVAL},
    session::SessionConfig,
};

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Agency identifier sent with every request
    #[arg(long, env = "CLI_ID")]
    pub id: u8,

    /// Lottery server address, as host:port
    #[arg(long, env = "CLI_SERVER_ADDRESS")]
    pub server_address: String,

    /// Most bets sent in a single batch
    #[arg(
        long,
        env = "CLI_BATCH_MAXAMOUNT",
        default_value_t = 50,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub batch_max_amount: u32,

    /// Largest batch frame in bytes, header included
    #[arg(
        long,
        env = "CLI_BATCH_MAXBYTES",
        default_value_t = 8192,
        value_parser = clap::value_parser!(u32).range(5..)
    )]
    pub batch_max_bytes: u32,

    /// Bets file [default: ./.data/agency-<ID>.csv]
    #[arg(long, env = "CLI_DATA_PATH")]
    pub data_path: Option<PathBuf>,

    /// Pause between winners queries while the lottery is unfinished
    #[arg(long, env = "CLI_WINNERS_COOLDOWN_MS", default_value_t = 1000)]
    pub winners_cooldown_ms: u64,

    /// Deadline for a single winners query
    #[arg(
        long,
        env = "CLI_WINNERS_TIMEOUT_MS",
        default_value_t = 5000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub winners_timeout_ms: u64,

    /// Deadline for opening a connection
    #[arg(
        long,
        env = "CLI_CONNECT_TIMEOUT_MS",
        default_value_t = DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub connect_timeout_ms: u64,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(long, env = "CLI_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

impl Config {
    pub fn data_path(&self) -> PathBuf {
        self.data_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("./.data/agency-{}.csv", self.id)))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_amount: self.batch_max_amount as usize,
            max_bytes: self.batch_max_bytes as usize,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            agency: self.id,
            limits: self.batch_limits(),
            winners_cooldown: Duration::from_millis(self.winners_cooldown_ms),
            winners_timeout: Duration::from_millis(self.winners_timeout_ms),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, error::ErrorKind};

    use super::*;

    fn parse(args: &[&str]) -> Result<Config, clap::Error> {
        Config::try_parse_from(std::iter::once("tombola-client").chain(args.iter().copied()))
    }

    #[test]
    fn command_is_well_formed() {
        Config::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let config = parse(&["--id", "4", "--server-address", "server:12345"]).unwrap();

        assert_eq!(config.id, 4);
        assert_eq!(config.server_address, "server:12345");
        assert_eq!(config.data_path(), PathBuf::from("./.data/agency-4.csv"));
        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);

        let session = config.session_config();
        assert_eq!(session.agency, 4);
        assert_eq!(
            session.limits,
            BatchLimits {
                max_amount: 50,
                max_bytes: 8192
            }
        );
        assert_eq!(session.winners_cooldown, Duration::from_secs(1));
        assert_eq!(session.winners_timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides() {
        let config = parse(&[
            "--id=1",
            "--server-address=127.0.0.1:9000",
            "--batch-max-amount=3",
            "--batch-max-bytes=512",
            "--data-path=/tmp/bets.csv",
            "--winners-cooldown-ms=10",
            "--log-level=debug",
        ])
        .unwrap();

        assert_eq!(config.data_path(), PathBuf::from("/tmp/bets.csv"));
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(
            config.batch_limits(),
            BatchLimits {
                max_amount: 3,
                max_bytes: 512
            }
        );
        assert_eq!(
            config.session_config().winners_cooldown,
            Duration::from_millis(10)
        );
    }

    #[test]
    fn rejects_invalid_limits() {
        let base = ["--id=1", "--server-address=s:1"];

        let err = parse(&[base[0], base[1], "--batch-max-amount=0"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);

        let err = parse(&[base[0], base[1], "--batch-max-bytes=4"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn rejects_out_of_range_agency() {
        let err = parse(&["--id=256", "--server-address=s:1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn options_read_environment() {
        let command = Config::command();
        let env = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .and_then(|env| env.to_str())
                .map(str::to_owned)
        };

        assert_eq!(env("id").as_deref(), Some("CLI_ID"));
        assert_eq!(env("server_address").as_deref(), Some("CLI_SERVER_ADDRESS"));
        assert_eq!(env("batch_max_amount").as_deref(), Some("CLI_BATCH_MAXAMOUNT"));
        assert_eq!(env("batch_max_bytes").as_deref(), Some("CLI_BATCH_MAXBYTES"));
        assert_eq!(env("data_path").as_deref(), Some("CLI_DATA_PATH"));
        assert_eq!(
            env("winners_cooldown_ms").as_deref(),
            Some("CLI_WINNERS_COOLDOWN_MS")
        );
        assert_eq!(
            env("winners_timeout_ms").as_deref(),
            Some("CLI_WINNERS_TIMEOUT_MS")
        );
        assert_eq!(
            env("connect_timeout_ms").as_deref(),
            Some("CLI_CONNECT_TIMEOUT_MS")
        );
        assert_eq!(env("log_level").as_deref(), Some("CLI_LOG_LEVEL"));
    }
}
