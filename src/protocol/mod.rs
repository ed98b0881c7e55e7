//! Client-server communication protocol.
//!
//! This module defines the protocol spoken between an agency and the lottery server:
//! the packet set, its binary framing, and the transport that moves frames over a
//! connection while honoring deadlines and cancellation.
//!
//! # Key Components
//!
//! - [`Packet`]: Closed set of every message, decoded by [`Packet::decode`] according to
//!   the header's message type.
//! - [`Request`]: The client side subset of [`Packet`]; the only thing that can be
//!   encoded and sent.
//! - [`ProtocolTransport`]: Exact-size reads and writes over a [`Connector`]'s stream.
//!
//! # Binary Format
//!
//! - Each frame begins with a 5 byte header: message type (`u8`) and payload length
//!   (`u32`).
//! - The payload follows, exactly as long as announced.
//! - All integers are big-endian; strings carry a one byte length prefix.
//!
//! | Type         | Code | Payload                                   |
//! |--------------|------|-------------------------------------------|
//! | BetStart     | 0x01 | agency `u8`                               |
//! | Bets         | 0x02 | agency `u8`, count `u32`, count × bet      |
//! | BetFinish    | 0x03 | agency `u8`                               |
//! | Reply        | 0x04 | done count `u32`, message                 |
//! | GetWinners   | 0x05 | agency `u8`                               |
//! | ReplyWinners | 0x06 | agency `u8`, count `u32`, count × `u32`    |
//! | Error        | 0x07 | code `u8`, message                        |
//!
//! # See Also
//!
//! - [`session`](crate::session): Drives the request sequence over a transport.
pub mod codec;
mod packet;
mod request;
mod response;
#[cfg(test)]
pub(crate) mod testing;
mod transport;

pub use codec::{CodecError, HEADER_SIZE, Header};
pub use packet::{MessageType, Packet};
pub use request::{Agency, BetBatch, Request};
pub use response::{INVALID_BET, INVALID_PACKET, LOTTERY_NOT_FINISHED, Reply, ServerError, Winners};
pub use transport::{
    Connector, DEFAULT_CONNECT_TIMEOUT, DEFAULT_POLL_INTERVAL, ProtocolTransport, Stream,
    TcpConnector, TransportError,
};
