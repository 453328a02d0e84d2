//! ACK packets are acknowledged by  DATA  or ERROR packets.
//! the opcode is 4.
//!
//! The  block  number  in an  ACK echoes
//! the block number of the DATA packet being acknowledged.

use byteorder::{ByteOrder, NetworkEndian};

use crate::tftp::shared::{
    put_u16, Deserializable, Opcode, Serializable, TFTPEncodeError, TFTPPacket, TFTPParseError,
};

const ACK_LEN: usize = 4;
const BLK_NUM_OFFSET: usize = 2;

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct AckPacket {
    blk: u16,
}

impl AckPacket {
    pub fn new(blk: u16) -> Self {
        AckPacket { blk }
    }

    pub fn blk(&self) -> u16 {
        self.blk
    }
}

impl Serializable for AckPacket {
    fn serialize(&self) -> Result<Vec<u8>, TFTPEncodeError> {
        let mut buf = Vec::with_capacity(ACK_LEN);
        put_u16(&mut buf, Opcode::Ack.as_u16());
        put_u16(&mut buf, self.blk);

        Ok(buf)
    }
}

impl Deserializable for AckPacket {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
        if buf.len() < ACK_LEN {
            return Err(TFTPParseError::Malformed("ACK shorter than 4 bytes"));
        }

        let op = NetworkEndian::read_u16(buf);
        if op != Opcode::Ack.as_u16() {
            return Err(TFTPParseError::Malformed("not an ACK packet"));
        }

        let blk = NetworkEndian::read_u16(&buf[BLK_NUM_OFFSET..]);
        Ok(TFTPPacket::ACK(AckPacket::new(blk)))
    }
}
