//! In-memory streams with a scripted peer.
use std::{
    collections::VecDeque,
    io::{self, ErrorKind, Read, Write},
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use crate::CancellationToken;

use super::{
    Packet,
    codec::{HEADER_SIZE, Header, encode_frame},
    transport::{Connector, Stream},
};

enum Step {
    Data(Vec<u8>),
    Stall,
}

/// Stream whose reads replay a script and whose writes are recorded.
pub(crate) struct ScriptedStream {
    input: VecDeque<Step>,
    stall_forever: bool,
    timeout: Option<Duration>,
    written: Arc<Mutex<Vec<u8>>>,
    write_chunk: Option<usize>,
    cancel_on_write: Option<(CancellationToken, usize)>,
    writes: usize,
}

impl ScriptedStream {
    pub(crate) fn new() -> Self {
        Self {
            input: VecDeque::new(),
            stall_forever: false,
            timeout: None,
            written: Arc::default(),
            write_chunk: None,
            cancel_on_write: None,
            writes: 0,
        }
    }

    /// Bytes delivered to the next reads.
    pub(crate) fn data(mut self, bytes: Vec<u8>) -> Self {
        self.input.push_back(Step::Data(bytes));
        self
    }

    /// Frame delivered to the next reads.
    pub(crate) fn packet(self, packet: Packet) -> Self {
        self.data(frame(packet))
    }

    /// One read that times out without data.
    pub(crate) fn stall(mut self) -> Self {
        self.input.push_back(Step::Stall);
        self
    }

    /// Once the script runs out, time out instead of closing.
    pub(crate) fn stall_forever(mut self) -> Self {
        self.stall_forever = true;
        self
    }

    /// Accept at most `n` bytes per write call.
    pub(crate) fn write_chunk(mut self, n: usize) -> Self {
        self.write_chunk = Some(n);
        self
    }

    /// Cancel `token` during the `nth` write call, counting from one.
    pub(crate) fn cancel_on_write(mut self, token: CancellationToken, nth: usize) -> Self {
        self.cancel_on_write = Some((token, nth));
        self
    }

    pub(crate) fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    fn wait(&self) -> io::Error {
        thread::sleep(self.timeout.unwrap_or(Duration::from_millis(1)));
        io::Error::from(ErrorKind::WouldBlock)
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.input.pop_front() {
            Some(Step::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.input.push_front(Step::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Step::Stall) => Err(self.wait()),
            None if self.stall_forever => Err(self.wait()),
            None => Ok(0),
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.write_chunk.unwrap_or(buf.len()));
        self.written.lock().unwrap().extend_from_slice(&buf[..n]);

        self.writes += 1;
        if let Some((token, nth)) = &self.cancel_on_write {
            if self.writes == *nth {
                token.cancel();
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for ScriptedStream {
    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}

/// Hands out one scripted stream per connection; refuses once they run out.
pub(crate) struct ScriptedConnector {
    streams: VecDeque<ScriptedStream>,
    connects: usize,
}

impl ScriptedConnector {
    pub(crate) fn new(streams: Vec<ScriptedStream>) -> Self {
        Self {
            streams: streams.into(),
            connects: 0,
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects
    }
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;

    fn connect(&mut self) -> io::Result<ScriptedStream> {
        let stream = self
            .streams
            .pop_front()
            .ok_or_else(|| io::Error::from(ErrorKind::ConnectionRefused))?;
        self.connects += 1;
        Ok(stream)
    }
}

pub(crate) fn frame(packet: Packet) -> Vec<u8> {
    encode_frame(&packet).unwrap()
}

/// Splits recorded bytes back into packets.
pub(crate) fn read_frames(mut bytes: &[u8]) -> Vec<Packet> {
    let mut packets = Vec::new();

    while !bytes.is_empty() {
        let header = Header::parse(bytes[..HEADER_SIZE].try_into().unwrap()).unwrap();
        let end = HEADER_SIZE + header.payload_length as usize;
        packets.push(Packet::decode(header.message_type, &bytes[HEADER_SIZE..end]).unwrap());
        bytes = &bytes[end..];
    }
    packets
}
