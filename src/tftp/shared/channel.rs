//! The datagram seam both sides talk through.
//!
//! Transfers only ever need to send one datagram to a peer and block for the
//! next one from anybody, so that is all [`DatagramChannel`] asks for. The
//! real implementation is `std::net::UdpSocket`; tests script one in memory.

use std::fmt::Write;
use std::io;
use std::net::{SocketAddr, UdpSocket};

use tracing::{debug, trace};

use crate::tftp::shared::err_packet::ErrorPacket;
use crate::tftp::shared::error::TransferError;
use crate::tftp::shared::{parse_udp_packet, TFTPPacket};

pub trait DatagramChannel {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize>;
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

impl DatagramChannel for UdpSocket {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, peer)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf)
    }
}

impl<C: DatagramChannel + ?Sized> DatagramChannel for &C {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        (**self).send_to(buf, peer)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        (**self).recv_from(buf)
    }
}

/// Encodes and sends one packet.
pub fn send_packet<C: DatagramChannel + ?Sized>(
    channel: &C,
    packet: &TFTPPacket,
    peer: SocketAddr,
) -> Result<(), TransferError> {
    let bytes = packet.encode()?;
    trace!("-> {} {}", peer, dump(&bytes));

    channel
        .send_to(&bytes, peer)
        .map_err(TransferError::Transport)?;
    Ok(())
}

/// Blocks for the next datagram, returning its length and sender.
pub fn recv_datagram<C: DatagramChannel + ?Sized>(
    channel: &C,
    buf: &mut [u8],
) -> Result<(usize, SocketAddr), TransferError> {
    let (len, peer) = channel.recv_from(buf).map_err(TransferError::Transport)?;
    trace!("<- {} {}", peer, dump(&buf[..len]));
    Ok((len, peer))
}

/// Blocks for the next datagram and decodes it.
pub fn recv_packet<C: DatagramChannel + ?Sized>(
    channel: &C,
    buf: &mut [u8],
) -> Result<(TFTPPacket, SocketAddr), TransferError> {
    let (len, peer) = recv_datagram(channel, buf)?;
    let packet = parse_udp_packet(&buf[..len])?;
    Ok((packet, peer))
}

/// Fire-and-forget ERROR delivery: the transfer is over either way.
pub fn notify_peer<C: DatagramChannel + ?Sized>(channel: &C, err: ErrorPacket, peer: SocketAddr) {
    if let Err(e) = send_packet(channel, &TFTPPacket::ERR(err), peer) {
        debug!("could not deliver ERROR to {}: {}", peer, e);
    }
}

/// Renders a datagram as `(len) text` with non-printable bytes as `\xx`.
pub fn dump(buf: &[u8]) -> String {
    let mut out = format!("({}) ", buf.len());
    for &byte in buf {
        if (0x20..=0x7E).contains(&byte) {
            out.push(byte as char);
        } else {
            let _ = write!(out, "\\{:02x}", byte);
        }
    }
    out
}
