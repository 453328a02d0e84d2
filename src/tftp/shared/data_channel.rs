use tracing::debug;

use crate::tftp::shared::ack_packet::AckPacket;
use crate::tftp::shared::data_packet::DataPacket;
use crate::tftp::shared::error::TransferError;
use crate::tftp::shared::{is_final_block, next_blk, Opcode, TFTPPacket};

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum DataChannelState {
    AwaitFirstData,
    AwaitNextData,
    Done,
    Failed,
}

/// Receiving side of a read transfer.
///
/// Validates each DATA packet against the block number it expects next and
/// keeps the running byte count. It does no I/O: the caller stores the
/// accepted payload and sends [`DataChannel::ack`] back.
#[derive(Debug)]
pub struct DataChannel {
    blk: u16,
    bytes: usize,
    state: DataChannelState,
}

impl DataChannel {
    pub fn new() -> Self {
        DataChannel {
            blk: 0,
            bytes: 0,
            state: DataChannelState::AwaitFirstData,
        }
    }

    /// Block number the next DATA packet must carry.
    pub fn expected_blk(&self) -> u16 {
        next_blk(self.blk)
    }

    /// Feeds one received packet into the channel.
    ///
    /// Returns the DATA packet when it is the one expected; anything else
    /// moves the channel to `Failed` and is returned as the error.
    pub fn on_packet(&mut self, packet: TFTPPacket) -> Result<DataPacket, TransferError> {
        debug_assert!(!self.is_finished(), "packet fed to a finished channel");

        let dp = match packet {
            TFTPPacket::DATA(dp) => dp,
            TFTPPacket::ERR(ep) => {
                return Err(self.fail(TransferError::Remote {
                    code: ep.code(),
                    message: ep.err().to_string(),
                }))
            }
            other => {
                return Err(self.fail(TransferError::UnexpectedOpcode {
                    expected: Opcode::Data,
                    actual: other.opcode(),
                }))
            }
        };

        let expected = self.expected_blk();
        if dp.blk() != expected {
            return Err(self.fail(TransferError::Sequence {
                expected,
                actual: dp.blk(),
            }));
        }

        self.blk = dp.blk();
        self.bytes += dp.len();

        if is_final_block(dp.len()) {
            self.set_state(DataChannelState::Done);
        } else {
            self.set_state(DataChannelState::AwaitNextData);
        }

        Ok(dp)
    }

    /// Acknowledgement for the last accepted block.
    pub fn ack(&self) -> AckPacket {
        AckPacket::new(self.blk)
    }

    fn fail(&mut self, err: TransferError) -> TransferError {
        debug!("{}", err);
        self.set_state(DataChannelState::Failed);
        err
    }

    fn set_state(&mut self, state: DataChannelState) {
        debug!("Moving to {:?}", state);
        self.state = state;
    }

    pub fn state(&self) -> DataChannelState {
        self.state
    }

    pub fn transfer_size(&self) -> usize {
        self.bytes
    }

    pub fn blk(&self) -> u16 {
        self.blk
    }

    pub fn is_done(&self) -> bool {
        self.state == DataChannelState::Done
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            DataChannelState::Done | DataChannelState::Failed
        )
    }
}
