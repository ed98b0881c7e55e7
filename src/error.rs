use thiserror::Error;

use crate::{
    batch::BatchError,
    protocol::{Packet, ServerError, TransportError},
    session::SessionState,
};

/// Why a session stopped before reaching [`SessionState::Done`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build batch: {0}")]
    Batch(#[from] BatchError),
    #[error("{phase}: {source}")]
    Transport {
        phase: SessionState,
        #[source]
        source: TransportError,
    },
    #[error("{phase}: server answered {code:#04x} ({reason}): {message}")]
    Server {
        phase: SessionState,
        code: u8,
        reason: &'static str,
        message: String,
    },
    #[error("{phase}: unexpected response {packet}")]
    UnexpectedPacket { phase: SessionState, packet: Packet },
    #[error("winners addressed to agency {received}, expected {expected}")]
    AgencyMismatch { expected: u8, received: u8 },
    #[error("session cancelled")]
    Cancelled,
    #[error("session already ran and is {0}")]
    AlreadyRun(SessionState),
}

impl ClientError {
    pub(crate) fn transport(phase: SessionState, source: TransportError) -> Self {
        match source {
            TransportError::Cancelled => ClientError::Cancelled,
            source => ClientError::Transport { phase, source },
        }
    }

    pub(crate) fn server(phase: SessionState, error: ServerError) -> Self {
        ClientError::Server {
            phase,
            code: error.code,
            reason: error.reason(),
            message: error.message,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    /// Whether the peer broke the protocol rather than failing a request.
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            ClientError::Transport { source, .. } => source.is_protocol_violation(),
            ClientError::UnexpectedPacket { .. } | ClientError::AgencyMismatch { .. } => true,
            _ => false,
        }
    }
}
