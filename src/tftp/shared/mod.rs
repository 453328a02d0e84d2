use std::fmt;
use std::fmt::{Display, Formatter};

use byteorder::{ByteOrder, NetworkEndian};
use thiserror::Error;

use crate::tftp::shared::ack_packet::AckPacket;
use crate::tftp::shared::data_packet::DataPacket;
use crate::tftp::shared::err_packet::ErrorPacket;
use crate::tftp::shared::request_packet::*;

pub mod ack_packet;
pub mod channel;
pub mod data_channel;
pub mod data_packet;
pub mod err_packet;
pub mod error;
pub mod request_packet;

const OP_LEN: usize = 2;
/// Stride size for reading / writing files.
pub const STRIDE_SIZE: usize = 512;
/// Largest datagram we build or accept.
pub const BUFFER_SIZE: usize = 2 * STRIDE_SIZE;
/// The only transfer mode this implementation produces.
pub const OCTET_MODE: &str = "octet";

/// TFTP opcodes as carried in the first two bytes of every packet.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Err = 5,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Opcode::Rrq),
            2 => Some(Opcode::Wrq),
            3 => Some(Opcode::Data),
            4 => Some(Opcode::Ack),
            5 => Some(Opcode::Err),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Rrq => "RRQ",
            Opcode::Wrq => "WRQ",
            Opcode::Data => "DATA",
            Opcode::Ack => "ACK",
            Opcode::Err => "ERROR",
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum TFTPPacket {
    RRQ(ReadRequestPacket),
    WRQ(WriteRequestPacket),
    ACK(AckPacket),
    ERR(ErrorPacket),
    DATA(DataPacket),
}

impl TFTPPacket {
    pub fn opcode(&self) -> Opcode {
        match self {
            TFTPPacket::RRQ(_) => Opcode::Rrq,
            TFTPPacket::WRQ(_) => Opcode::Wrq,
            TFTPPacket::DATA(_) => Opcode::Data,
            TFTPPacket::ACK(_) => Opcode::Ack,
            TFTPPacket::ERR(_) => Opcode::Err,
        }
    }

    /// Encodes whichever packet this is into its wire form.
    pub fn encode(&self) -> Result<Vec<u8>, TFTPEncodeError> {
        match self {
            TFTPPacket::RRQ(p) => p.serialize(),
            TFTPPacket::WRQ(p) => p.serialize(),
            TFTPPacket::ACK(p) => p.serialize(),
            TFTPPacket::ERR(p) => p.serialize(),
            TFTPPacket::DATA(p) => p.serialize(),
        }
    }
}

impl Display for TFTPPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let desc = match self {
            TFTPPacket::RRQ(p) => format!("RRQ [{}] [{}]", p.filename(), p.mode()),
            TFTPPacket::WRQ(p) => format!("WRQ [{}] [{}]", p.filename(), p.mode()),
            TFTPPacket::ACK(p) => format!("ACK [{}]", p.blk()),
            TFTPPacket::ERR(p) => format!("ERR [{}]: {}", p.code(), p.err()),
            TFTPPacket::DATA(p) => format!("DATA [{}] ({} bytes)", p.blk(), p.len()),
        };

        write!(f, "{}", desc)
    }
}

pub trait Serializable {
    fn serialize(&self) -> Result<Vec<u8>, TFTPEncodeError>;
}

pub trait Deserializable {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError>;
}

/// Decodes one received datagram, dispatching on its opcode.
pub fn parse_udp_packet(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
    if buf.len() < OP_LEN {
        return Err(TFTPParseError::Malformed("missing opcode"));
    }

    match NetworkEndian::read_u16(buf) {
        1 => ReadRequestPacket::deserialize(buf),
        2 => WriteRequestPacket::deserialize(buf),
        3 => DataPacket::deserialize(buf),
        4 => AckPacket::deserialize(buf),
        5 => ErrorPacket::deserialize(buf),
        op => Err(TFTPParseError::UnknownOpcode(op)),
    }
}

/// Block number that must follow `blk`, wrapping after 65535.
pub fn next_blk(blk: u16) -> u16 {
    blk.wrapping_add(1)
}

/// A payload shorter than a full stride ends the transfer.
pub fn is_final_block(len: usize) -> bool {
    len < STRIDE_SIZE
}

#[derive(Debug, Eq, PartialEq, Clone, Error)]
pub enum TFTPParseError {
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
    #[error("unknown opcode [{0}]")]
    UnknownOpcode(u16),
}

#[derive(Debug, Eq, PartialEq, Clone, Error)]
pub enum TFTPEncodeError {
    #[error("packet of {0} bytes exceeds the {max} byte buffer", max = BUFFER_SIZE)]
    PacketTooLarge(usize),
    #[error("data block of {0} bytes exceeds {max} bytes", max = STRIDE_SIZE)]
    BlockTooLarge(usize),
    #[error("text field contains a NUL byte")]
    EmbeddedNul,
}

/// Reads a NUL-terminated string, returning it and the bytes after the terminator.
fn read_str(buf: &[u8]) -> Result<(&str, &[u8]), TFTPParseError> {
    let end = buf
        .iter()
        .position(|&byte| byte == 0)
        .ok_or(TFTPParseError::Malformed("text field not terminated"))?;

    let text = std::str::from_utf8(&buf[..end])
        .map_err(|_| TFTPParseError::Malformed("text field is not valid UTF-8"))?;

    Ok((text, &buf[end + 1..]))
}

fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<(), TFTPEncodeError> {
    if s.as_bytes().contains(&0) {
        return Err(TFTPEncodeError::EmbeddedNul);
    }

    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(())
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    let mut field = [0; 2];
    NetworkEndian::write_u16(&mut field, value);
    buf.extend_from_slice(&field);
}

fn check_capacity(buf: Vec<u8>) -> Result<Vec<u8>, TFTPEncodeError> {
    if buf.len() > BUFFER_SIZE {
        return Err(TFTPEncodeError::PacketTooLarge(buf.len()));
    }

    Ok(buf)
}
