use bincode::{
    Decode, Encode,
    de::Decoder,
    enc::Encoder,
    error::{DecodeError, EncodeError},
};

use crate::Bet;

use super::{
    MessageType, Packet,
    codec::{self, CodecError},
};

/// Payload shared by the requests that only identify the agency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Agency {
    pub id: u8,
}

/// Bets sent together in a single packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BetBatch {
    pub agency: u8,
    pub bets: Vec<Bet>,
}

impl BetBatch {
    pub fn new(agency: u8) -> Self {
        Self {
            agency,
            bets: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    /// Size of the frame this batch would be sent in.
    pub fn frame_len(&self) -> Result<usize, CodecError> {
        codec::frame_len(self)
    }
}

impl Encode for Bet {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        codec::encode_str(self.first_name(), encoder)?;
        codec::encode_str(self.last_name(), encoder)?;
        self.document().encode(encoder)?;
        self.birthdate().encode(encoder)?;
        self.number().encode(encoder)
    }
}

impl<Context> Decode<Context> for Bet {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let first_name = codec::decode_str(decoder)?;
        let last_name = codec::decode_str(decoder)?;
        let document: u32 = Decode::decode(decoder)?;
        let birthdate: u32 = Decode::decode(decoder)?;
        let number: u16 = Decode::decode(decoder)?;

        Bet::new(first_name, last_name, document, birthdate, number)
            .map_err(|e| DecodeError::OtherString(e.to_string()))
    }
}

impl Encode for BetBatch {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.agency.encode(encoder)?;
        codec::encode_count(self.bets.len(), encoder)?;
        for bet in &self.bets {
            bet.encode(encoder)?;
        }
        Ok(())
    }
}

impl<Context> Decode<Context> for BetBatch {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let agency: u8 = Decode::decode(decoder)?;
        let bets = codec::decode_seq(decoder)?;
        Ok(Self { agency, bets })
    }
}

/// A packet the client is allowed to send.
///
/// Requests can only be built through the constructors below, which cover the four
/// client-side variants of [`Packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request(Packet);

impl Request {
    pub fn bet_start(agency: u8) -> Self {
        Self(Packet::BetStart(Agency { id: agency }))
    }

    pub fn bets(batch: BetBatch) -> Self {
        Self(Packet::Bets(batch))
    }

    pub fn bet_finish(agency: u8) -> Self {
        Self(Packet::BetFinish(Agency { id: agency }))
    }

    pub fn get_winners(agency: u8) -> Self {
        Self(Packet::GetWinners(Agency { id: agency }))
    }

    pub fn message_type(&self) -> MessageType {
        self.0.message_type()
    }

    /// Header and payload, ready to be written to the wire.
    pub fn to_frame(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode_frame(&self.0)
    }
}

impl From<Request> for Packet {
    fn from(value: Request) -> Self {
        value.0
    }
}
