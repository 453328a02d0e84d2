use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::Path;
use std::time::{Duration, Instant};

use pretty_bytes::converter::convert;
use tracing::{debug, info, warn};

use crate::tftp::shared::channel::{notify_peer, recv_packet, send_packet, DatagramChannel};
use crate::tftp::shared::data_channel::DataChannel;
use crate::tftp::shared::data_packet::DataPacket;
use crate::tftp::shared::error::TransferError;
use crate::tftp::shared::request_packet::ReadRequestPacket;
use crate::tftp::shared::{TFTPPacket, BUFFER_SIZE, OCTET_MODE};

/// What a finished download reports back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    pub bytes: usize,
    pub elapsed: Duration,
}

impl TransferStats {
    pub fn bits_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.bytes as f64 * 8.0) / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes ({}) in {:.1} seconds [{:.0} bit/s]",
            self.bytes,
            convert(self.bytes as f64),
            self.elapsed.as_secs_f64(),
            self.bits_per_second()
        )
    }
}

/// A TFTP client that reads one file per call from a single server.
pub struct TFTPClient<C: DatagramChannel> {
    channel: C,
    server: SocketAddr,
}

impl<C: DatagramChannel> TFTPClient<C> {
    pub fn new(channel: C, server: SocketAddr) -> Self {
        TFTPClient { channel, server }
    }

    /// Reads `filename` from the server into the local file `dest`.
    ///
    /// `dest` is only created once the first DATA block has been accepted,
    /// so a refused request leaves nothing behind.
    pub fn download(&mut self, filename: &str, dest: &Path) -> Result<TransferStats, TransferError> {
        self.fetch(filename, || create_output(dest))
    }

    /// Reads `filename` from the server into the sink returned by `open_sink`.
    pub fn fetch<W, F>(&mut self, filename: &str, open_sink: F) -> Result<TransferStats, TransferError>
    where
        W: Write,
        F: FnOnce() -> io::Result<W>,
    {
        let start = Instant::now();
        let mut buf = [0; BUFFER_SIZE];
        let mut dc = DataChannel::new();

        info!("Requesting {} from {}", filename, self.server);
        let rrq = TFTPPacket::RRQ(ReadRequestPacket::new(filename, OCTET_MODE));
        send_packet(&self.channel, &rrq, self.server)?;

        let first = self.next_data(&mut dc, &mut buf)?;
        let mut sink = open_sink().map_err(TransferError::LocalIo)?;
        self.store(&dc, &mut sink, first)?;

        while !dc.is_done() {
            let dp = self.next_data(&mut dc, &mut buf)?;
            self.store(&dc, &mut sink, dp)?;
        }

        sink.flush().map_err(TransferError::LocalIo)?;

        let stats = TransferStats {
            bytes: dc.transfer_size(),
            elapsed: start.elapsed(),
        };
        info!("{} transferred successfully.", convert(stats.bytes as f64));
        Ok(stats)
    }

    /// Receives until the channel accepts a DATA packet or the transfer fails.
    fn next_data(&mut self, dc: &mut DataChannel, buf: &mut [u8]) -> Result<DataPacket, TransferError> {
        let (packet, peer) = recv_packet(&self.channel, buf)?;

        // The server may answer from a different port than the one we
        // addressed; everything after that goes to where DATA came from.
        if peer != self.server {
            debug!("Server answered from {}", peer);
            self.server = peer;
        }

        dc.on_packet(packet).map_err(|err| {
            if let Some(ep) = err.peer_notification() {
                notify_peer(&self.channel, ep, peer);
            }
            err
        })
    }

    /// Stores an accepted block, then acknowledges it.
    fn store<W: Write>(&self, dc: &DataChannel, sink: &mut W, dp: DataPacket) -> Result<(), TransferError> {
        debug!("Received block {} [{}]", dp.blk(), convert(dp.len() as f64));
        sink.write_all(dp.payload()).map_err(TransferError::LocalIo)?;
        send_packet(&self.channel, &TFTPPacket::ACK(dc.ack()), self.server)
    }
}

/// Creates (or truncates) the local copy with `rw-r--r--` permissions.
pub fn create_output(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }

    options.open(path)
}

/// Entry point for TFTP client.
///
/// Resolves `server_address`, binds an ephemeral local port of the same
/// address family and downloads `filename` into `dest`.
pub fn client_main(server_address: &str, filename: &str, dest: &Path) -> Result<TransferStats, TransferError> {
    let server = server_address
        .to_socket_addrs()
        .map_err(TransferError::Transport)?
        .next()
        .ok_or_else(|| {
            TransferError::Transport(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {}", server_address),
            ))
        })?;

    let bind_addr = match server {
        SocketAddr::V4(_) => "0.0.0.0:0",
        SocketAddr::V6(_) => "[::]:0",
    };
    let sock = UdpSocket::bind(bind_addr).map_err(TransferError::Transport)?;
    debug!("[CLIENT_ADDRESS]: {:?}", sock.local_addr());

    let mut client = TFTPClient::new(sock, server);
    client.download(filename, dest).map_err(|err| {
        warn!("Transfer of {} failed: {}", filename, err);
        err
    })
}
