use std::io;

use thiserror::Error;

use crate::tftp::shared::err_packet::{ErrorPacket, TFTPError};
use crate::tftp::shared::{Opcode, TFTPEncodeError, TFTPParseError};

/// Every way a single transfer can end early. All of them are terminal for
/// the transfer they occur in.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error(transparent)]
    Malformed(#[from] TFTPParseError),

    #[error("failed to build packet: {0}")]
    Encode(#[from] TFTPEncodeError),

    #[error("unexpected opcode {actual}, expected {expected}")]
    UnexpectedOpcode { expected: Opcode, actual: Opcode },

    #[error("invalid block number [{actual}] expected [{expected}]")]
    Sequence { expected: u16, actual: u16 },

    #[error("tftp error {code} ({message})")]
    Remote { code: u16, message: String },

    #[error("local i/o error: {0}")]
    LocalIo(#[source] io::Error),
}

impl TransferError {
    /// The ERROR packet owed to the peer before giving up, if any.
    ///
    /// Only protocol violations committed by the peer are reported back;
    /// a peer that already sent ERROR hears nothing further.
    pub fn peer_notification(&self) -> Option<ErrorPacket> {
        match self {
            TransferError::Sequence { .. } => {
                Some(ErrorPacket::new_custom(1, "invalid block number"))
            }
            TransferError::UnexpectedOpcode { .. } => {
                Some(ErrorPacket::new(TFTPError::IllegalOperation))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_only_for_peer_violations() {
        let seq = TransferError::Sequence {
            expected: 3,
            actual: 5,
        };
        let ep = seq.peer_notification().unwrap();
        assert_eq!(ep.code(), 1);
        assert_eq!(seq.to_string(), "invalid block number [5] expected [3]");

        let op = TransferError::UnexpectedOpcode {
            expected: Opcode::Data,
            actual: Opcode::Ack,
        };
        assert_eq!(op.peer_notification().unwrap().code(), 4);
        assert_eq!(op.to_string(), "unexpected opcode ACK, expected DATA");

        let remote = TransferError::Remote {
            code: 1,
            message: "File not found.".to_string(),
        };
        assert!(remote.peer_notification().is_none());
        assert!(TransferError::Malformed(TFTPParseError::UnknownOpcode(9))
            .peer_notification()
            .is_none());
    }
}
