pub mod batch;
mod bet;
pub mod config;
mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod shutdown;
pub mod source;

pub use batch::{BatchError, BatchLimits, Batcher};
pub use bet::{Bet, BetError, NAME_MAX_LENGTH, RawBet};
pub use config::Config;
pub use error::ClientError;
pub use event::EventLog;
pub use session::{Session, SessionConfig, SessionReport, SessionState};
pub use shutdown::{CancellationToken, SignalListener};
pub use source::{CsvSource, MemorySource, RecordSource, SourceError};
