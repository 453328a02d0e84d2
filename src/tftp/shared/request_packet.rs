use byteorder::{ByteOrder, NetworkEndian};

use crate::tftp::shared::{
    check_capacity, put_u16, read_str, write_str, Deserializable, Opcode, Serializable,
    TFTPEncodeError, TFTPPacket, TFTPParseError, OP_LEN,
};

pub trait Request: Serializable + Deserializable {
    fn filename(&self) -> &str;
    fn mode(&self) -> &str;
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ReadRequestPacket {
    req: RequestPacket,
}

impl ReadRequestPacket {
    pub fn new(filename: &str, mode: &str) -> ReadRequestPacket {
        ReadRequestPacket {
            req: RequestPacket::new(Opcode::Rrq, filename, mode),
        }
    }
}

impl Request for ReadRequestPacket {
    fn filename(&self) -> &str {
        &self.req.filename
    }

    fn mode(&self) -> &str {
        &self.req.mode
    }
}

impl Serializable for ReadRequestPacket {
    fn serialize(&self) -> Result<Vec<u8>, TFTPEncodeError> {
        self.req.serialize()
    }
}

impl Deserializable for ReadRequestPacket {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
        RequestPacket::deserialize(buf)
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct WriteRequestPacket {
    req: RequestPacket,
}

impl WriteRequestPacket {
    pub fn new(filename: &str, mode: &str) -> WriteRequestPacket {
        WriteRequestPacket {
            req: RequestPacket::new(Opcode::Wrq, filename, mode),
        }
    }
}

impl Request for WriteRequestPacket {
    fn filename(&self) -> &str {
        &self.req.filename
    }

    fn mode(&self) -> &str {
        &self.req.mode
    }
}

impl Serializable for WriteRequestPacket {
    fn serialize(&self) -> Result<Vec<u8>, TFTPEncodeError> {
        self.req.serialize()
    }
}

impl Deserializable for WriteRequestPacket {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
        RequestPacket::deserialize(buf)
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
struct RequestPacket {
    op: Opcode,
    filename: String,
    mode: String,
}

impl RequestPacket {
    fn new(op: Opcode, filename: &str, mode: &str) -> Self {
        RequestPacket {
            op,
            filename: String::from(filename),
            mode: String::from(mode),
        }
    }
}

impl Serializable for RequestPacket {
    fn serialize(&self) -> Result<Vec<u8>, TFTPEncodeError> {
        let length = OP_LEN + self.filename.len() + self.mode.len() + 2;
        let mut buf = Vec::with_capacity(length);
        put_u16(&mut buf, self.op.as_u16());
        write_str(&mut buf, &self.filename)?;
        write_str(&mut buf, &self.mode)?;
        check_capacity(buf)
    }
}

impl Deserializable for RequestPacket {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
        if buf.len() < OP_LEN {
            return Err(TFTPParseError::Malformed("missing opcode"));
        }

        let op = match Opcode::from_u16(NetworkEndian::read_u16(buf)) {
            Some(op @ (Opcode::Rrq | Opcode::Wrq)) => op,
            _ => return Err(TFTPParseError::Malformed("not a request packet")),
        };

        let (filename, rest) = read_str(&buf[OP_LEN..])?;
        let (mode, _) = read_str(rest)?;

        let packet = match op {
            Opcode::Rrq => TFTPPacket::RRQ(ReadRequestPacket::new(filename, mode)),
            _ => TFTPPacket::WRQ(WriteRequestPacket::new(filename, mode)),
        };

        Ok(packet)
    }
}
