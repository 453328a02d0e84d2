//! ERROR packet can be the acknowledgment of any other type of packet.
//! The error code is an integer indicating the nature of the error.  A
//! table of values and meanings is given in the appendix.  (Note that
//! several error codes have been added to this version of this
//! document.) The error message is intended for human consumption, and
//! should be in netascii.  Like all other strings, it is terminated with
//! a zero byte.

use std::io;

use byteorder::{ByteOrder, NetworkEndian};

use crate::tftp::shared::{
    check_capacity, put_u16, read_str, write_str, Deserializable, Opcode, Serializable,
    TFTPEncodeError, TFTPPacket, TFTPParseError,
};

const ERR_LEN: usize = 4;
const CODE_OFFSET: usize = 2;

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ErrorPacket {
    code: u16,
    err: String,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TFTPError {
    UndefinedError,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTID,
    FileExists,
    NoSuchUser,
}

fn get_err_details(err: TFTPError) -> (u16, &'static str) {
    match err {
        TFTPError::UndefinedError => (0, "Not defined, see error message (if any)."),
        TFTPError::FileNotFound => (1, "File not found."),
        TFTPError::AccessViolation => (2, "Access violation."),
        TFTPError::DiskFull => (3, "Disk full or allocation exceeded."),
        TFTPError::IllegalOperation => (4, "Illegal TFTP operation."),
        TFTPError::UnknownTID => (5, "Unknown transfer ID."),
        TFTPError::FileExists => (6, "File already exists."),
        TFTPError::NoSuchUser => (7, "No such user."),
    }
}

impl ErrorPacket {
    pub fn new(err: TFTPError) -> Self {
        let (code, msg) = get_err_details(err);
        ErrorPacket::new_custom(code, msg)
    }

    pub fn new_custom(code: u16, msg: &str) -> Self {
        ErrorPacket {
            code,
            err: msg.to_string(),
        }
    }

    /// Mirrors a local I/O failure onto the wire, carrying the OS error
    /// number as the code the way the C server reports `errno`.
    pub fn from_io(err: &io::Error) -> Self {
        let code = err
            .raw_os_error()
            .and_then(|errno| u16::try_from(errno).ok())
            .unwrap_or(0);

        ErrorPacket::new_custom(code, &err.to_string())
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn err(&self) -> &str {
        &self.err
    }
}

impl Serializable for ErrorPacket {
    fn serialize(&self) -> Result<Vec<u8>, TFTPEncodeError> {
        let mut buf = Vec::with_capacity(ERR_LEN + self.err.len() + 1);
        put_u16(&mut buf, Opcode::Err.as_u16());
        put_u16(&mut buf, self.code);
        write_str(&mut buf, &self.err)?;
        check_capacity(buf)
    }
}

impl Deserializable for ErrorPacket {
    fn deserialize(buf: &[u8]) -> Result<TFTPPacket, TFTPParseError> {
        if buf.len() < ERR_LEN {
            return Err(TFTPParseError::Malformed("ERROR shorter than 4 bytes"));
        }

        let op = NetworkEndian::read_u16(buf);
        if op != Opcode::Err.as_u16() {
            return Err(TFTPParseError::Malformed("not an ERROR packet"));
        }

        let code = NetworkEndian::read_u16(&buf[CODE_OFFSET..]);
        let (msg, _) = read_str(&buf[ERR_LEN..])?;

        Ok(TFTPPacket::ERR(ErrorPacket::new_custom(code, msg)))
    }
}
