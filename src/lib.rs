//! A small RFC 1350 TFTP client and server.
//!
//! Both sides run one lockstep transfer at a time over a blocking UDP
//! socket: every DATA block must be acknowledged before the next is sent,
//! and a block shorter than 512 bytes ends the transfer.

pub mod tftp;
