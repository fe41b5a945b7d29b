use std::io;

use crate::net::NetState;
use crate::packet::{AbortReason, PacketType};

pub type Result<T, E = NetplayError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum NetplayError {
    #[error("packet with invalid type {0} received")]
    InvalidType(u16),
    #[error("packet of type {kind} has bad length field ({len})")]
    BadLength { kind: PacketType, len: usize },
    #[error("malformed {kind} packet: {reason}")]
    Malformed {
        kind: PacketType,
        reason: &'static str,
    },
    #[error("packet of type {kind} received in wrong state {state}")]
    WrongState { kind: PacketType, state: NetState },
    #[error("protocol version {major}.{minor} not supported")]
    ProtocolVersion { major: u8, minor: u8 },
    #[error("remote application version {remote} is too old ({required} is required)")]
    AppVersion { remote: String, required: String },
    #[error("input delay {0} is out of range")]
    InputDelay(u32),
    #[error("battle input buffer full")]
    InputBufferFull,
    #[error("connection aborted by remote side ({0})")]
    RemoteAbort(AbortReason),
    #[error("connection closed by remote side")]
    RemoteClosed,
    #[error("{op} is not valid in state {state}")]
    InvalidOperation { op: &'static str, state: NetState },
    #[error("connection is not connected")]
    NotConnected,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// OS-style classification handed to error callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadMessage,
    NotSupported,
    NoBuffers,
    ConnectionAborted,
    ConnectionReset,
    InvalidArgument,
    NotConnected,
    Io(io::ErrorKind),
}

impl NetplayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidType(_)
            | Self::BadLength { .. }
            | Self::Malformed { .. }
            | Self::WrongState { .. }
            | Self::InputDelay(_) => ErrorCode::BadMessage,
            Self::ProtocolVersion { .. } | Self::AppVersion { .. } => ErrorCode::NotSupported,
            Self::InputBufferFull => ErrorCode::NoBuffers,
            Self::RemoteAbort(_) => ErrorCode::ConnectionAborted,
            Self::RemoteClosed => ErrorCode::ConnectionReset,
            Self::InvalidOperation { .. } => ErrorCode::InvalidArgument,
            Self::NotConnected => ErrorCode::NotConnected,
            Self::Io(e) => ErrorCode::Io(e.kind()),
        }
    }

    /// Wire-level and protocol-level violations, as opposed to local misuse or I/O failure.
    pub fn is_protocol_violation(&self) -> bool {
        self.code() == ErrorCode::BadMessage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_to_bad_message() {
        let err = NetplayError::WrongState {
            kind: PacketType::Fleet,
            state: NetState::PreBattle,
        };
        assert_eq!(err.code(), ErrorCode::BadMessage);
        assert!(err.is_protocol_violation());
        assert_eq!(
            err.to_string(),
            "packet of type Fleet received in wrong state preBattle"
        );
    }

    #[test]
    fn io_errors_keep_their_kind() {
        let err = NetplayError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert_eq!(err.code(), ErrorCode::Io(io::ErrorKind::BrokenPipe));
        assert!(!err.is_protocol_violation());
    }
}
