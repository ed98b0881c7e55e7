//! Wire framing.
//!
//! Every frame is a fixed 5 byte [`Header`] followed by exactly `payload_length` payload
//! bytes:
//!
//! ```text
//! ┌──────────────┬────────────────┬──────────────────────┐
//! │ message type │ payload length │ payload              │
//! │ u8           │ u32 BE         │ payload_length bytes │
//! └──────────────┴────────────────┴──────────────────────┘
//! ```
//!
//! Integers use bincode's big-endian, fixed-width encoding. Strings are prefixed by a
//! single length byte, so they can carry at most 255 bytes; that part is written by hand
//! in [`encode_str`] and [`decode_str`].
use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    de::{Decoder, read::Reader},
    enc::{Encoder, write::Writer},
    error::{DecodeError, EncodeError},
};
use thiserror::Error;

use super::{MessageType, Packet};

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 5;

/// Largest payload accepted from the peer (16 MiB).
pub const MAX_PAYLOAD_LENGTH: u32 = 16 * 1024 * 1024;

/// Longest string a single length byte can describe.
pub const STRING_MAX_LENGTH: usize = u8::MAX as usize;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode packet: {0}")]
    Serialize(#[from] EncodeError),
    #[error("failed to decode packet: {0}")]
    Deserialize(#[from] DecodeError),
    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),
    #[error("payload of {length} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge { length: usize, max: u32 },
    #[error("{unread} unread bytes left after decoding a {kind:?} payload")]
    TrailingBytes { kind: MessageType, unread: usize },
}

pub(crate) fn config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Fixed size prefix of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Header {
    pub message_type: u8,
    pub payload_length: u32,
}

impl Header {
    /// Parses a header, rejecting frames that announce more than [`MAX_PAYLOAD_LENGTH`].
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self, CodecError> {
        let (header, _): (Header, usize) = bincode::decode_from_slice(bytes, config())?;

        if header.payload_length > MAX_PAYLOAD_LENGTH {
            return Err(CodecError::PayloadTooLarge {
                length: header.payload_length as usize,
                max: MAX_PAYLOAD_LENGTH,
            });
        }
        Ok(header)
    }

    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE], CodecError> {
        let mut buf = [0; HEADER_SIZE];
        bincode::encode_into_slice(self, &mut buf, config())?;
        Ok(buf)
    }
}

/// Serializes a packet into a complete frame.
///
/// The frame is built in memory, so a failure never leaves partial output behind.
pub(crate) fn encode_frame(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let payload = packet.encode_payload()?;
    let payload_length =
        u32::try_from(payload.len()).map_err(|_| CodecError::PayloadTooLarge {
            length: payload.len(),
            max: u32::MAX,
        })?;

    let header = Header {
        message_type: packet.message_type().into(),
        payload_length,
    };

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header.to_bytes()?);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Size of the frame that would carry `payload`, header included.
pub fn frame_len<T: Encode>(payload: &T) -> Result<usize, CodecError> {
    Ok(HEADER_SIZE + bincode::encode_to_vec(payload, config())?.len())
}

pub(crate) fn encode_payload<T: Encode>(payload: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::encode_to_vec(payload, config())?)
}

/// Decodes `payload` as `T`, requiring every byte to be consumed.
pub(crate) fn decode_payload<T: Decode<()>>(
    kind: MessageType,
    payload: &[u8],
) -> Result<T, CodecError> {
    let (value, read): (T, usize) = bincode::decode_from_slice(payload, config())?;

    if read != payload.len() {
        return Err(CodecError::TrailingBytes {
            kind,
            unread: payload.len() - read,
        });
    }
    Ok(value)
}

/// Writes `len:u8` followed by the string bytes.
///
/// Nothing is written when the string does not fit the length byte.
pub(crate) fn encode_str<E: Encoder>(value: &str, encoder: &mut E) -> Result<(), EncodeError> {
    let len = u8::try_from(value.len())
        .map_err(|_| EncodeError::Other("string field is longer than 255 bytes"))?;

    len.encode(encoder)?;
    encoder.writer().write(value.as_bytes())
}

pub(crate) fn decode_str<D: Decoder>(decoder: &mut D) -> Result<String, DecodeError> {
    let len: u8 = Decode::decode(decoder)?;
    let len = len as usize;

    decoder.claim_bytes_read(len)?;
    let mut bytes = vec![0; len];
    decoder.reader().read(&mut bytes)?;

    String::from_utf8(bytes).map_err(|e| DecodeError::Utf8 {
        inner: e.utf8_error(),
    })
}

/// Writes `count:u32` ahead of a sequence.
pub(crate) fn encode_count<E: Encoder>(len: usize, encoder: &mut E) -> Result<(), EncodeError> {
    u32::try_from(len)
        .map_err(|_| EncodeError::Other("sequence has more than u32::MAX elements"))?
        .encode(encoder)
}

/// Reads `count:u32` followed by `count` values of `T`.
pub(crate) fn decode_seq<D, T>(decoder: &mut D) -> Result<Vec<T>, DecodeError>
where
    D: Decoder,
    T: Decode<D::Context>,
{
    let count: u32 = Decode::decode(decoder)?;
    let count = count as usize;

    decoder.claim_container_read::<T>(count)?;
    // The count comes from the peer; let the payload length bound the allocation.
    let mut values = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        values.push(T::decode(decoder)?);
    }
    Ok(values)
}
