use bincode::{
    Decode, Encode,
    de::Decoder,
    enc::Encoder,
    error::{DecodeError, EncodeError},
};

use super::codec;

/// The packet could not be parsed or was not valid in the session.
pub const INVALID_PACKET: u8 = 0x01;
/// The bets of a batch could not be parsed or stored.
pub const INVALID_BET: u8 = 0x02;
/// Winners were requested before every agency finished sending bets.
pub const LOTTERY_NOT_FINISHED: u8 = 0x03;

/// Acknowledgement of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub done_count: u32,
    pub message: String,
}

/// Winning documents of an agency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winners {
    pub agency: u8,
    pub documents: Vec<u32>,
}

/// Failure reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: u8,
    pub message: String,
}

impl ServerError {
    pub fn is_lottery_pending(&self) -> bool {
        self.code == LOTTERY_NOT_FINISHED
    }

    /// Short name for the error code.
    pub fn reason(&self) -> &'static str {
        match self.code {
            INVALID_PACKET => "INVALID_PACKET",
            INVALID_BET => "INVALID_BET",
            LOTTERY_NOT_FINISHED => "LOTTERY_NOT_FINISHED",
            _ => "UNKNOWN_ERROR",
        }
    }
}

impl Encode for Reply {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.done_count.encode(encoder)?;
        codec::encode_str(&self.message, encoder)
    }
}

impl<Context> Decode<Context> for Reply {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let done_count: u32 = Decode::decode(decoder)?;
        let message = codec::decode_str(decoder)?;
        Ok(Self {
            done_count,
            message,
        })
    }
}

impl Encode for Winners {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.agency.encode(encoder)?;
        codec::encode_count(self.documents.len(), encoder)?;
        for document in &self.documents {
            document.encode(encoder)?;
        }
        Ok(())
    }
}

impl<Context> Decode<Context> for Winners {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let agency: u8 = Decode::decode(decoder)?;
        let documents = codec::decode_seq(decoder)?;
        Ok(Self { agency, documents })
    }
}

impl Encode for ServerError {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.code.encode(encoder)?;
        codec::encode_str(&self.message, encoder)
    }
}

impl<Context> Decode<Context> for ServerError {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let code: u8 = Decode::decode(decoder)?;
        let message = codec::decode_str(decoder)?;
        Ok(Self { code, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_reasons() {
        let inputs = vec![
            (INVALID_PACKET, "INVALID_PACKET", false),
            (INVALID_BET, "INVALID_BET", false),
            (LOTTERY_NOT_FINISHED, "LOTTERY_NOT_FINISHED", true),
            (0x42, "UNKNOWN_ERROR", false),
        ];

        for (code, reason, pending) in inputs {
            let err = ServerError {
                code,
                message: String::new(),
            };
            assert_eq!(err.reason(), reason);
            assert_eq!(err.is_lottery_pending(), pending);
        }
    }
}
