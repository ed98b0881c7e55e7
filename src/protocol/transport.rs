use std::{
    io::{self, ErrorKind, Read, Write},
    net::{TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{CancellationToken, EventLog};

use super::{
    Packet, Request,
    codec::{CodecError, HEADER_SIZE, Header},
};

/// Longest single wait on the peer before cancellation and the deadline are rechecked.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default bound on dialing the server.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),
    #[error("transport is not connected")]
    NotConnected,
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("peer accepted no bytes after {written} of {total}")]
    WriteZero { written: usize, total: usize },
    #[error("connection closed by peer")]
    EndOfStream,
    #[error("connection closed after {received} of {expected} frame bytes")]
    UnexpectedEof { received: usize, expected: usize },
    #[error("round trip deadline exceeded")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
    #[error("protocol violation: {0}")]
    Codec(#[from] CodecError),
}

impl TransportError {
    /// Whether the peer sent something that is not a valid frame.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, TransportError::Codec(_))
    }
}

/// Byte stream the transport can bound in time.
pub trait Stream: Read + Write {
    /// Bounds how long a single read or write may block.
    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Stream for TcpStream {
    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }
}

/// Opens new connections to the server.
pub trait Connector {
    type Stream: Stream;

    fn connect(&mut self) -> io::Result<Self::Stream>;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self) -> io::Result<TcpStream> {
        let mut last_err = None;

        for addr in self.address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                ErrorKind::AddrNotAvailable,
                format!("'{}' did not resolve to any address", self.address),
            )
        }))
    }
}

/// Framed packet exchange over a single connection at a time.
///
/// The transport is either disconnected or owns exactly one stream. Reads and writes
/// loop until the whole frame moved, however the stream splits it.
pub struct ProtocolTransport<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
    cancel: CancellationToken,
    poll_interval: Duration,
    deadline: Option<Instant>,
    log: EventLog,
}

impl<C: Connector> ProtocolTransport<C> {
    pub fn new(connector: C, cancel: CancellationToken, log: EventLog) -> Self {
        Self {
            connector,
            stream: None,
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
            log,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Opens a connection unless one is already open.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self.connector.connect().map_err(TransportError::Connect)?;
        self.log.debug(format_args!("action: connect | result: success"));
        self.stream = Some(stream);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            self.log.debug(format_args!("action: disconnect | result: success"));
        }
    }

    /// Writes the full frame of `request`.
    ///
    /// Any failure leaves the transport disconnected.
    pub fn send(&mut self, request: &Request) -> Result<(), TransportError> {
        let res = self.write_request(request);
        if res.is_err() {
            self.disconnect();
        }
        res
    }

    /// Reads the next frame and decodes it.
    ///
    /// Any failure, protocol violations included, leaves the transport disconnected.
    pub fn recv(&mut self) -> Result<Packet, TransportError> {
        let res = self.read_packet();
        if res.is_err() {
            self.disconnect();
        }
        res
    }

    /// Sends `request` and waits for its response, within `timeout` when given.
    pub fn round_trip(
        &mut self,
        request: &Request,
        timeout: Option<Duration>,
    ) -> Result<Packet, TransportError> {
        self.deadline = timeout.map(|timeout| Instant::now() + timeout);
        let res = self.send(request).and_then(|_| self.recv());
        self.deadline = None;
        res
    }

    fn write_request(&mut self, request: &Request) -> Result<(), TransportError> {
        let frame = request.to_frame()?;
        self.write_exact(&frame)?;
        self.log.debug(format_args!(
            "action: send_packet | result: success | type: {:?} | bytes: {}",
            request.message_type(),
            frame.len()
        ));
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Packet, TransportError> {
        let mut header = [0; HEADER_SIZE];
        self.read_exact(&mut header, 0)?;
        let header = Header::parse(&header)?;

        let mut payload = vec![0; header.payload_length as usize];
        self.read_exact(&mut payload, HEADER_SIZE)?;

        let packet = Packet::decode(header.message_type, &payload)?;
        self.log.debug(format_args!(
            "action: recv_packet | result: success | packet: {packet}"
        ));
        Ok(packet)
    }

    /// Time the next blocking call may wait, or `Timeout` once the deadline passed.
    fn next_wait(&self) -> Result<Duration, TransportError> {
        match self.deadline {
            None => Ok(self.poll_interval),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(TransportError::Timeout);
                }
                Ok(remaining.min(self.poll_interval))
            }
        }
    }

    fn write_exact(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;

        while written < buf.len() {
            if self.cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            let wait = self.next_wait()?;
            let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
            stream.set_io_timeout(Some(wait))?;

            match stream.write(&buf[written..]) {
                Ok(0) => {
                    return Err(TransportError::WriteZero {
                        written,
                        total: buf.len(),
                    });
                }
                Ok(n) => written += n,
                Err(e) if retryable(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream.flush()?;
        Ok(())
    }

    /// Fills `buf` completely. `offset` is how many bytes of the current frame were
    /// already read, which decides between a clean end of stream and a truncated frame.
    ///
    /// Bytes the peer already delivered are always consumed; cancellation is only
    /// observed when a wait on the peer runs out without data.
    fn read_exact(&mut self, buf: &mut [u8], offset: usize) -> Result<(), TransportError> {
        let mut filled = 0;

        while filled < buf.len() {
            let wait = self.next_wait()?;
            let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
            stream.set_io_timeout(Some(wait))?;

            match stream.read(&mut buf[filled..]) {
                Ok(0) if offset + filled == 0 => return Err(TransportError::EndOfStream),
                Ok(0) => {
                    return Err(TransportError::UnexpectedEof {
                        received: offset + filled,
                        expected: offset + buf.len(),
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if expired(&e) => {
                    if self.cancel.is_cancelled() {
                        return Err(TransportError::Cancelled);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl<C: Connector> Drop for ProtocolTransport<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn expired(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn retryable(e: &io::Error) -> bool {
    e.kind() == ErrorKind::Interrupted || expired(e)
}

#[cfg(test)]
mod tests {
    use std::{
        net::{Shutdown, TcpListener},
        thread,
    };

    use crate::{
        Bet,
        event::testing::capture,
        protocol::{
            BetBatch, Reply, Winners,
            codec::encode_frame,
            testing::{ScriptedConnector, ScriptedStream, frame, read_frames},
        },
    };

    use super::*;

    fn transport(
        streams: Vec<ScriptedStream>,
    ) -> (ProtocolTransport<ScriptedConnector>, CancellationToken) {
        let cancel = CancellationToken::new();
        let (log, _) = capture(1);
        let transport = ProtocolTransport::new(ScriptedConnector::new(streams), cancel.clone(), log)
            .with_poll_interval(Duration::from_millis(5));
        (transport, cancel)
    }

    fn reply(done_count: u32) -> Packet {
        Packet::Reply(Reply {
            done_count,
            message: "STORED".into(),
        })
    }

    #[test]
    fn connect_is_idempotent() {
        let (mut transport, _) = transport(vec![ScriptedStream::new()]);

        transport.connect().unwrap();
        transport.connect().unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.connector().connects(), 1);

        transport.disconnect();
        assert!(!transport.is_connected());
    }

    #[test]
    fn connect_failure() {
        let (mut transport, _) = transport(vec![]);
        assert!(matches!(
            transport.connect(),
            Err(TransportError::Connect(_))
        ));
    }

    #[test]
    fn send_without_connection() {
        let (mut transport, _) = transport(vec![]);
        let err = transport.send(&Request::bet_start(1)).unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[test]
    fn short_writes_are_resumed() {
        let stream = ScriptedStream::new().write_chunk(2);
        let written = stream.written();
        let (mut transport, _) = transport(vec![stream]);

        let mut batch = BetBatch::new(1);
        batch
            .bets
            .push(Bet::new("Ana", "Perez", 7, 19990317, 2).unwrap());
        let request = Request::bets(batch);

        transport.connect().unwrap();
        transport.send(&request).unwrap();

        assert_eq!(*written.lock().unwrap(), request.to_frame().unwrap());
    }

    #[test]
    fn zero_write_aborts() {
        let (mut transport, _) = transport(vec![ScriptedStream::new().write_chunk(0)]);

        transport.connect().unwrap();
        let err = transport.send(&Request::bet_start(1)).unwrap_err();

        assert!(matches!(
            err,
            TransportError::WriteZero {
                written: 0,
                total: 6
            }
        ));
        assert!(!transport.is_connected());
    }

    #[test]
    fn short_reads_are_resumed() {
        let packet = Packet::ReplyWinners(Winners {
            agency: 1,
            documents: vec![111, 222],
        });
        let bytes = encode_frame(&packet).unwrap();
        let mut stream = ScriptedStream::new();
        for byte in bytes {
            stream = stream.data(vec![byte]).stall();
        }
        let (mut transport, _) = transport(vec![stream]);

        transport.connect().unwrap();
        assert_eq!(transport.recv().unwrap(), packet);
    }

    #[test]
    fn clean_close_is_end_of_stream() {
        let (mut transport, _) = transport(vec![ScriptedStream::new()]);

        transport.connect().unwrap();
        assert!(matches!(transport.recv(), Err(TransportError::EndOfStream)));
    }

    #[test]
    fn partial_header_is_unexpected_eof() {
        let bytes = frame(reply(1));
        let stream = ScriptedStream::new().data(bytes[..3].to_vec());
        let (mut transport, _) = transport(vec![stream]);

        transport.connect().unwrap();
        let err = transport.recv().unwrap_err();

        assert!(matches!(
            err,
            TransportError::UnexpectedEof {
                received: 3,
                expected: 5
            }
        ));
        assert!(!transport.is_connected());
    }

    #[test]
    fn missing_payload_is_unexpected_eof() {
        let bytes = frame(reply(1));
        let stream = ScriptedStream::new().data(bytes[..HEADER_SIZE].to_vec());
        let (mut transport, _) = transport(vec![stream]);

        transport.connect().unwrap();
        assert!(matches!(
            transport.recv(),
            Err(TransportError::UnexpectedEof { received: 5, .. })
        ));
    }

    #[test]
    fn unknown_type_is_protocol_violation() {
        let stream = ScriptedStream::new().data(vec![0x2a, 0, 0, 0, 0]);
        let (mut transport, _) = transport(vec![stream]);

        transport.connect().unwrap();
        let err = transport.recv().unwrap_err();

        assert!(err.is_protocol_violation());
        assert!(!transport.is_connected());
    }

    #[test]
    fn cancelled_before_write() {
        let stream = ScriptedStream::new();
        let written = stream.written();
        let (mut transport, cancel) = transport(vec![stream]);

        transport.connect().unwrap();
        cancel.cancel();

        assert!(matches!(
            transport.send(&Request::bet_start(1)),
            Err(TransportError::Cancelled)
        ));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn cancelled_while_waiting() {
        let stream = ScriptedStream::new().stall_forever();
        let (mut transport, cancel) = transport(vec![stream]);

        transport.connect().unwrap();
        cancel.cancel();
        assert!(matches!(transport.recv(), Err(TransportError::Cancelled)));
    }

    #[test]
    fn delivered_reply_survives_cancellation() {
        let stream = ScriptedStream::new().data(frame(reply(3)));
        let (mut transport, cancel) = transport(vec![stream]);

        transport.connect().unwrap();
        cancel.cancel();
        assert_eq!(transport.recv().unwrap(), reply(3));
    }

    #[test]
    fn deadline_expires() {
        let stream = ScriptedStream::new().stall_forever();
        let written = stream.written();
        let (mut transport, _) = transport(vec![stream]);

        transport.connect().unwrap();
        let err = transport
            .round_trip(&Request::get_winners(1), Some(Duration::from_millis(30)))
            .unwrap_err();

        assert!(matches!(err, TransportError::Timeout));
        assert_eq!(
            read_frames(&written.lock().unwrap()),
            vec![Packet::from(Request::get_winners(1))]
        );
    }

    #[test]
    fn tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0; 6];
            stream.read_exact(&mut request).unwrap();

            let response = frame(reply(0));
            let (head, tail) = response.split_at(2);
            stream.write_all(head).unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(20));
            stream.write_all(tail).unwrap();
            request
        });

        let (log, _) = capture(5);
        let connector = TcpConnector::new(address.to_string(), DEFAULT_CONNECT_TIMEOUT);
        let mut transport = ProtocolTransport::new(connector, CancellationToken::new(), log);

        transport.connect().unwrap();
        let response = transport
            .round_trip(&Request::bet_start(5), Some(Duration::from_secs(5)))
            .unwrap();

        assert_eq!(response, reply(0));
        assert_eq!(server.join().unwrap(), [0x01, 0, 0, 0, 1, 5]);
    }

    #[test]
    fn tcp_partial_header() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&[0x04, 0, 0]).unwrap();
            stream.shutdown(Shutdown::Both).unwrap();
        });

        let (log, _) = capture(5);
        let connector = TcpConnector::new(address.to_string(), DEFAULT_CONNECT_TIMEOUT);
        let mut transport = ProtocolTransport::new(connector, CancellationToken::new(), log);

        transport.connect().unwrap();
        server.join().unwrap();

        assert!(matches!(
            transport.recv(),
            Err(TransportError::UnexpectedEof {
                received: 3,
                expected: 5
            })
        ));
    }

    #[test]
    fn tcp_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let mut connector = TcpConnector::new(address.to_string(), Duration::from_secs(1));
        assert!(connector.connect().is_err());
    }
}
