use std::fmt;

use super::{
    Agency, BetBatch, Reply, ServerError, Winners,
    codec::{self, CodecError},
};

/// Discriminant carried in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    BetStart,
    Bets,
    BetFinish,
    Reply,
    GetWinners,
    ReplyWinners,
    Error,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        match value {
            0x01 => Ok(MessageType::BetStart),
            0x02 => Ok(MessageType::Bets),
            0x03 => Ok(MessageType::BetFinish),
            0x04 => Ok(MessageType::Reply),
            0x05 => Ok(MessageType::GetWinners),
            0x06 => Ok(MessageType::ReplyWinners),
            0x07 => Ok(MessageType::Error),
            other => Err(CodecError::UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::BetStart => 0x01,
            MessageType::Bets => 0x02,
            MessageType::BetFinish => 0x03,
            MessageType::Reply => 0x04,
            MessageType::GetWinners => 0x05,
            MessageType::ReplyWinners => 0x06,
            MessageType::Error => 0x07,
        }
    }
}

/// Every message that can travel on the wire, in either direction.
///
/// Only [`Request`](super::Request) exposes encoding, so the client can never put a
/// server-side variant on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    BetStart(Agency),
    Bets(BetBatch),
    BetFinish(Agency),
    Reply(Reply),
    GetWinners(Agency),
    ReplyWinners(Winners),
    Error(ServerError),
}

impl Packet {
    pub fn message_type(&self) -> MessageType {
        match self {
            Packet::BetStart(_) => MessageType::BetStart,
            Packet::Bets(_) => MessageType::Bets,
            Packet::BetFinish(_) => MessageType::BetFinish,
            Packet::Reply(_) => MessageType::Reply,
            Packet::GetWinners(_) => MessageType::GetWinners,
            Packet::ReplyWinners(_) => MessageType::ReplyWinners,
            Packet::Error(_) => MessageType::Error,
        }
    }

    /// Decodes a payload according to the message type announced by its header.
    pub fn decode(message_type: u8, payload: &[u8]) -> Result<Self, CodecError> {
        let kind = MessageType::try_from(message_type)?;

        Ok(match kind {
            MessageType::BetStart => Packet::BetStart(codec::decode_payload(kind, payload)?),
            MessageType::Bets => Packet::Bets(codec::decode_payload(kind, payload)?),
            MessageType::BetFinish => Packet::BetFinish(codec::decode_payload(kind, payload)?),
            MessageType::Reply => Packet::Reply(codec::decode_payload(kind, payload)?),
            MessageType::GetWinners => Packet::GetWinners(codec::decode_payload(kind, payload)?),
            MessageType::ReplyWinners => {
                Packet::ReplyWinners(codec::decode_payload(kind, payload)?)
            }
            MessageType::Error => Packet::Error(codec::decode_payload(kind, payload)?),
        })
    }

    pub(crate) fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Packet::BetStart(p) | Packet::BetFinish(p) | Packet::GetWinners(p) => {
                codec::encode_payload(p)
            }
            Packet::Bets(p) => codec::encode_payload(p),
            Packet::Reply(p) => codec::encode_payload(p),
            Packet::ReplyWinners(p) => codec::encode_payload(p),
            Packet::Error(p) => codec::encode_payload(p),
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Bets(batch) => write!(f, "Bets({} bets)", batch.bets.len()),
            Packet::ReplyWinners(winners) => {
                write!(f, "ReplyWinners({} winners)", winners.documents.len())
            }
            other => write!(f, "{other:?}"),
        }
    }
}
