//! Bet batching under count and size limits.
//!
//! The [`Batcher`] pulls records from a [`RecordSource`] one at a time and groups them
//! into [`BetBatch`]es. A batch never holds more than `max_amount` bets, and the frame
//! that carries it, header included, never exceeds `max_bytes`. Size is measured by
//! encoding the tentative packet, so the limit matches what goes on the wire exactly.
//!
//! A bet that would overflow the current batch is carried over and opens the next one.
use thiserror::Error;

use crate::{
    Bet, BetError, CancellationToken, EventLog,
    protocol::{BetBatch, CodecError},
    source::{RecordSource, SourceError},
};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to read bets: {0}")]
    Source(#[from] SourceError),
    #[error("invalid bet at record {record}: {cause}")]
    Bet { record: usize, cause: BetError },
    #[error("bet at record {record} needs a {size} byte frame, over the {max_bytes} byte limit")]
    RecordTooLarge {
        record: usize,
        size: usize,
        max_bytes: usize,
    },
    #[error("failed to measure batch: {0}")]
    Codec(#[from] CodecError),
    #[error("batch limit must allow at least one bet")]
    ZeroAmount,
}

/// Upper bounds for a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Most bets in one batch.
    pub max_amount: usize,
    /// Largest frame, header included, in bytes.
    pub max_bytes: usize,
}

pub struct Batcher<S: RecordSource> {
    source: S,
    agency: u8,
    limits: BatchLimits,
    cancel: CancellationToken,
    log: EventLog,
    exhausted: bool,
    carried: Option<Bet>,
    records: usize,
}

impl<S: RecordSource> Batcher<S> {
    /// Fails when `limits` cannot hold a single bet by count.
    pub fn new(
        source: S,
        agency: u8,
        limits: BatchLimits,
        cancel: CancellationToken,
        log: EventLog,
    ) -> Result<Self, BatchError> {
        if limits.max_amount == 0 {
            return Err(BatchError::ZeroAmount);
        }

        Ok(Self {
            source,
            agency,
            limits,
            cancel,
            log,
            exhausted: false,
            carried: None,
            records: 0,
        })
    }

    /// Whether every record has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.carried.is_none()
    }

    /// Records read from the source so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Builds the next batch.
    ///
    /// The flag is `true` once the source is exhausted or cancellation was requested.
    /// An empty batch with the flag unset is not the end of the input.
    pub fn next_batch(&mut self) -> Result<(BetBatch, bool), BatchError> {
        let mut batch = BetBatch::new(self.agency);

        if self.cancel.is_cancelled() || self.is_exhausted() {
            return Ok((batch, true));
        }

        loop {
            if self.cancel.is_cancelled() {
                self.log.info(format_args!(
                    "action: batch_processing | result: interrupted | processed_bets: {}",
                    batch.len()
                ));
                break;
            }
            if batch.len() >= self.limits.max_amount {
                break;
            }

            let bet = match self.carried.take() {
                Some(bet) => bet,
                None => match self.read_bet()? {
                    Some(bet) => bet,
                    None => {
                        self.exhausted = true;
                        break;
                    }
                },
            };

            batch.bets.push(bet);
            let size = batch.frame_len()?;
            if size > self.limits.max_bytes {
                self.carried = batch.bets.pop();
                if batch.is_empty() {
                    return Err(BatchError::RecordTooLarge {
                        record: self.records,
                        size,
                        max_bytes: self.limits.max_bytes,
                    });
                }
                break;
            }
        }

        if !batch.is_empty() {
            self.log.debug(format_args!(
                "action: batch_created | result: success | bet_count: {}",
                batch.len()
            ));
        }
        Ok((batch, self.is_exhausted()))
    }

    /// Releases the record source.
    pub fn close(&mut self) -> Result<(), SourceError> {
        self.carried = None;
        self.exhausted = true;
        self.source.close()
    }

    fn read_bet(&mut self) -> Result<Option<Bet>, BatchError> {
        let Some(raw) = self.source.next_record()? else {
            return Ok(None);
        };
        self.records += 1;

        match Bet::try_from(raw) {
            Ok(bet) => Ok(Some(bet)),
            Err(cause) => {
                self.log.error(format_args!(
                    "action: read_bet | result: fail | record: {} | error: {cause}",
                    self.records
                ));
                Err(BatchError::Bet {
                    record: self.records,
                    cause,
                })
            }
        }
    }
}
