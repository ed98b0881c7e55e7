//! The agency's side of a lottery round.
//!
//! # Overview
//!
//! A [`Session`] walks one agency through the whole exchange with the server:
//!
//! 1. Open a connection and announce the upload with `BetStart`.
//! 2. Send every bet, one [`BetBatch`] at a time, waiting for each `Reply`.
//! 3. Close the upload with `BetFinish` and drop the connection.
//! 4. Ask for the agency's winners on a fresh connection per attempt, cooling down while
//!    the server reports the lottery as unfinished.
//!
//! Only one request is ever outstanding. The session stops at the first failure; nothing
//! is retried except a winners query answered with
//! [`LOTTERY_NOT_FINISHED`](crate::protocol::LOTTERY_NOT_FINISHED).
//!
//! # Key Components
//!
//! - [`SessionState`]: Where the session is, observable through [`Session::state`].
//! - [`SessionReport`]: What the session achieved, returned on success.
//!
//! # See Also
//!
//! - [`batch`](crate::batch): Where batches come from.
//! - [`protocol`](crate::protocol): How requests travel.
use std::{fmt, time::Duration};

use crate::{
    CancellationToken, ClientError, EventLog,
    batch::{BatchLimits, Batcher},
    protocol::{BetBatch, Connector, Packet, ProtocolTransport, Reply, Request, TransportError},
    source::RecordSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    SentStart,
    SendingBatches,
    SentFinish,
    PollingWinners,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::SentStart => "sent_start",
            SessionState::SendingBatches => "sending_batches",
            SessionState::SentFinish => "sent_finish",
            SessionState::PollingWinners => "polling_winners",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub agency: u8,
    pub limits: BatchLimits,
    /// Pause between winners queries while the lottery is unfinished.
    pub winners_cooldown: Duration,
    /// Deadline for a single winners query, connection excluded.
    pub winners_timeout: Duration,
    /// Longest wait on the server before cancellation is rechecked.
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub batches_sent: usize,
    pub bets_sent: usize,
    /// Sum of the done counts the server acknowledged.
    pub acknowledged: u64,
    pub poll_attempts: usize,
    pub cooldowns: usize,
    pub winners: Vec<u32>,
}

pub struct Session<C: Connector, S: RecordSource> {
    config: SessionConfig,
    transport: ProtocolTransport<C>,
    batcher: Batcher<S>,
    cancel: CancellationToken,
    log: EventLog,
    state: SessionState,
    report: SessionReport,
}

impl<C: Connector, S: RecordSource> Session<C, S> {
    /// Fails when the batch limits in `config` cannot hold a single bet.
    pub fn new(
        config: SessionConfig,
        connector: C,
        source: S,
        cancel: CancellationToken,
        log: EventLog,
    ) -> Result<Self, ClientError> {
        let batcher = Batcher::new(
            source,
            config.agency,
            config.limits,
            cancel.clone(),
            log.clone(),
        )?;
        let transport = ProtocolTransport::new(connector, cancel.clone(), log.clone())
            .with_poll_interval(config.poll_interval);

        Ok(Self {
            config,
            transport,
            batcher,
            cancel,
            log,
            state: SessionState::Init,
            report: SessionReport::default(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Progress so far, also available after a failure.
    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn connector(&self) -> &C {
        self.transport.connector()
    }

    /// Drives the session to [`SessionState::Done`] or [`SessionState::Failed`].
    ///
    /// The record source and any open connection are released before returning,
    /// whatever the outcome. A session runs once; later calls fail with
    /// [`ClientError::AlreadyRun`].
    pub fn run(&mut self) -> Result<SessionReport, ClientError> {
        if self.state != SessionState::Init {
            return Err(ClientError::AlreadyRun(self.state));
        }

        let res = self.drive();
        self.clean_up();

        match res {
            Ok(()) => {
                self.state = SessionState::Done;
                Ok(self.report.clone())
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.log.info(format_args!(
                        "action: shutdown | result: success | phase: {} | batches_sent: {}",
                        self.state, self.report.batches_sent
                    ));
                } else {
                    self.log.error(format_args!(
                        "action: session | result: fail | phase: {} | error: {e}",
                        self.state
                    ));
                }
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    fn drive(&mut self) -> Result<(), ClientError> {
        self.send_start()?;
        self.send_batches()?;
        self.send_finish()?;
        self.poll_winners()
    }

    fn send_start(&mut self) -> Result<(), ClientError> {
        self.log.info(format_args!(
            "action: send_batch_start | result: in_progress"
        ));

        self.transport
            .connect()
            .map_err(|e| ClientError::transport(self.state, e))?;
        let request = Request::bet_start(self.config.agency);
        let response = self.transport.round_trip(&request, None);
        self.expect_reply(response)?;

        self.log
            .info(format_args!("action: send_batch_start | result: success"));
        self.state = SessionState::SentStart;
        Ok(())
    }

    fn send_batches(&mut self) -> Result<(), ClientError> {
        self.state = SessionState::SendingBatches;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            let (batch, exhausted) = self.batcher.next_batch()?;
            if self.cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            if batch.is_empty() {
                if exhausted {
                    break;
                }
                continue;
            }

            self.send_batch(batch)?;
            if exhausted {
                break;
            }
        }

        self.log.info(format_args!(
            "action: processing_complete | result: success | total_batches: {}",
            self.report.batches_sent
        ));
        Ok(())
    }

    fn send_batch(&mut self, batch: BetBatch) -> Result<(), ClientError> {
        let size = batch.len();
        let batch_id = self.report.batches_sent + 1;

        let response = self.transport.round_trip(&Request::bets(batch), None);
        let reply = match self.expect_reply(response) {
            Ok(reply) => reply,
            Err(e) => {
                self.log.error(format_args!(
                    "action: apuestas_enviada | result: fail | batch_size: {size} | batch_id: {batch_id} | error: {e}"
                ));
                return Err(e);
            }
        };

        if reply.done_count as usize != size {
            self.log.warn(format_args!(
                "action: apuestas_enviada | result: mismatch | batch_size: {size} | done_count: {}",
                reply.done_count
            ));
        }
        self.log.info(format_args!(
            "action: apuestas_enviada | result: success | batch_size: {size} | batch_id: {batch_id}"
        ));

        self.report.batches_sent += 1;
        self.report.bets_sent += size;
        self.report.acknowledged += u64::from(reply.done_count);
        Ok(())
    }

    fn send_finish(&mut self) -> Result<(), ClientError> {
        self.state = SessionState::SentFinish;
        self.log
            .debug(format_args!("action: send_bet_finish | result: in_progress"));

        let request = Request::bet_finish(self.config.agency);
        let response = self.transport.round_trip(&request, None);
        self.transport.disconnect();
        self.expect_reply(response)?;

        self.log
            .info(format_args!("action: send_bet_finish | result: success"));
        Ok(())
    }

    fn poll_winners(&mut self) -> Result<(), ClientError> {
        self.state = SessionState::PollingWinners;
        let request = Request::get_winners(self.config.agency);

        loop {
            if self.cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            self.report.poll_attempts += 1;

            let response = self.transport.connect().and_then(|_| {
                self.transport
                    .round_trip(&request, Some(self.config.winners_timeout))
            });
            self.transport.disconnect();

            let packet = response.map_err(|e| ClientError::transport(self.state, e))?;
            match packet {
                Packet::ReplyWinners(winners) => {
                    if winners.agency != self.config.agency {
                        return Err(ClientError::AgencyMismatch {
                            expected: self.config.agency,
                            received: winners.agency,
                        });
                    }

                    self.log.info(format_args!(
                        "action: consulta_ganadores | result: success | cant_ganadores: {}",
                        winners.documents.len()
                    ));
                    self.report.winners = winners.documents;
                    return Ok(());
                }
                Packet::Error(error) if error.is_lottery_pending() => {
                    self.log.debug(format_args!(
                        "action: consulta_ganadores | result: pending | attempt: {}",
                        self.report.poll_attempts
                    ));
                    if !self.cancel.sleep(self.config.winners_cooldown) {
                        return Err(ClientError::Cancelled);
                    }
                    self.report.cooldowns += 1;
                }
                Packet::Error(error) => return Err(ClientError::server(self.state, error)),
                packet => {
                    return Err(ClientError::UnexpectedPacket {
                        phase: self.state,
                        packet,
                    });
                }
            }
        }
    }

    /// Accepts a `Reply`; anything else ends the session.
    fn expect_reply(
        &mut self,
        response: Result<Packet, TransportError>,
    ) -> Result<Reply, ClientError> {
        match response.map_err(|e| ClientError::transport(self.state, e))? {
            Packet::Reply(reply) => Ok(reply),
            Packet::Error(error) => {
                self.log.info(format_args!(
                    "action: {} | result: error | code: {} | msg: {}",
                    self.state,
                    error.reason(),
                    error.message
                ));
                Err(ClientError::server(self.state, error))
            }
            packet => {
                self.transport.disconnect();
                Err(ClientError::UnexpectedPacket {
                    phase: self.state,
                    packet,
                })
            }
        }
    }

    fn clean_up(&mut self) {
        self.log
            .info(format_args!("action: clean_up | result: in_progress"));

        match self.batcher.close() {
            Ok(()) => self
                .log
                .debug(format_args!("action: closing_bet_file | result: success")),
            Err(e) => self.log.warn(format_args!(
                "action: closing_bet_file | result: fail | error: {e}"
            )),
        }
        self.transport.disconnect();

        self.log
            .info(format_args!("action: clean_up | result: success"));
        self.log.flush();
    }
}
