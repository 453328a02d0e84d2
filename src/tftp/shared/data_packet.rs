use byteorder::{ByteOrder, NetworkEndian};

use crate::tftp::shared::{
    put_u16, Deserializable, Opcode, Serializable, TFTPEncodeError, TFTPPacket, TFTPParseError,
    OP_LEN, STRIDE_SIZE,
};

const BLK_NUM_LEN: usize = 2;
const DATA_OFFSET: usize = OP_LEN + BLK_NUM_LEN;

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct DataPacket {
    blk: u16,
    data: Vec<u8>,
}

impl DataPacket {
    pub fn new(blk: u16, data: Vec<u8>) -> Self {
        DataPacket { blk, data }
    }

    pub fn blk(&self) -> u16 {
        self.blk
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Serializable for DataPacket {
    fn serialize(&self) -> Result<Vec<u8>, TFTPEncodeError> {
        if self.data.len() > STRIDE_SIZE {
            return Err(TFTPEncodeError::BlockTooLarge(self.data.len()));
        }

        let mut buf: Vec<u8> = Vec::with_capacity(DATA_OFFSET + self.data.len());
        put_u16(&mut buf, Opcode::Data.as_u16());
        put_u16(&mut buf, self.blk);
        buf.extend_from_slice(&self.data);

        Ok(buf)
    }
}

impl Deserializable for DataPacket {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
        if buf.len() < DATA_OFFSET {
            return Err(TFTPParseError::Malformed("DATA shorter than its header"));
        }

        if NetworkEndian::read_u16(buf) != Opcode::Data.as_u16() {
            return Err(TFTPParseError::Malformed("not a DATA packet"));
        }

        let blk = NetworkEndian::read_u16(&buf[OP_LEN..]);
        let data = &buf[DATA_OFFSET..];

        if data.len() > STRIDE_SIZE {
            return Err(TFTPParseError::Malformed("DATA payload exceeds block size"));
        }

        Ok(TFTPPacket::DATA(DataPacket::new(blk, data.to_vec())))
    }
}
