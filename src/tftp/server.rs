use std::fs::File;
use std::io::{self, Read};
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::tftp::shared::ack_packet::AckPacket;
use crate::tftp::shared::channel::{notify_peer, recv_datagram, send_packet, DatagramChannel};
use crate::tftp::shared::data_packet::DataPacket;
use crate::tftp::shared::err_packet::{ErrorPacket, TFTPError};
use crate::tftp::shared::error::TransferError;
use crate::tftp::shared::request_packet::{ReadRequestPacket, Request};
use crate::tftp::shared::{
    is_final_block, next_blk, parse_udp_packet, TFTPPacket, BUFFER_SIZE, STRIDE_SIZE,
};

/// `ETXTBSY`, sent when a read request arrives while another is served.
const BUSY_CODE: u16 = 26;
const BUSY_MSG: &str = "Text file busy";
/// `EBADRQC`, sent for request kinds this server does not handle.
const BAD_REQUEST_CODE: u16 = 56;
const BAD_REQUEST_MSG: &str = "Invalid request code";

/// TFTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub root_directory: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:69".to_string(),
            root_directory: PathBuf::from("."),
        }
    }
}

/// What is left to do after an ACK moved a transfer along.
#[derive(Debug, Eq, PartialEq)]
enum Progress {
    Sent,
    Complete,
}

/// The one read transfer the server is currently serving.
#[derive(Debug)]
pub struct ActiveTransfer {
    peer: SocketAddr,
    filename: String,
    source: File,
    blk: u16,
    last_len: usize,
    sent: u64,
    size: u64,
}

impl ActiveTransfer {
    /// Opens `path` and captures its size. The size is not looked at
    /// again, so a file that grows or shrinks mid-transfer is not noticed.
    fn open(peer: SocketAddr, filename: &str, path: &Path) -> io::Result<Self> {
        let source = File::open(path)?;
        let size = source.metadata()?.len();

        Ok(ActiveTransfer {
            peer,
            filename: filename.to_string(),
            source,
            blk: 0,
            last_len: 0,
            sent: 0,
            size,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn blk(&self) -> u16 {
        self.blk
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }

    /// Sends the next DATA block built from `payload`.
    fn send_block<C: DatagramChannel + ?Sized>(
        &mut self,
        channel: &C,
        payload: Vec<u8>,
    ) -> Result<(), TransferError> {
        let blk = next_blk(self.blk);
        let len = payload.len();

        send_packet(channel, &TFTPPacket::DATA(DataPacket::new(blk, payload)), self.peer)?;

        self.blk = blk;
        self.last_len = len;
        self.sent += len as u64;
        Ok(())
    }

    fn send_first<C: DatagramChannel + ?Sized>(&mut self, channel: &C) -> Result<(), TransferError> {
        let payload = read_chunk(&mut self.source).map_err(TransferError::LocalIo)?;
        self.send_block(channel, payload)
    }

    /// Handles the ACK for the block last sent.
    fn on_ack<C: DatagramChannel + ?Sized>(&mut self, channel: &C) -> Result<Progress, TransferError> {
        if is_final_block(self.last_len) {
            return Ok(Progress::Complete);
        }

        // A file whose size is an exact multiple of the block size still
        // ends with a short (empty) block.
        let payload = if self.sent < self.size {
            read_chunk(&mut self.source).map_err(TransferError::LocalIo)?
        } else {
            Vec::new()
        };

        self.send_block(channel, payload)?;
        Ok(Progress::Sent)
    }
}

/// A TFTP server that supports a single client.
///
/// Datagrams are handled one at a time; the only state carried between
/// them is the optional active transfer.
pub struct TFTPServer<C: DatagramChannel> {
    channel: C,
    root: PathBuf,
    active: Option<ActiveTransfer>,
}

impl<C: DatagramChannel> TFTPServer<C> {
    pub fn new(channel: C, root: impl Into<PathBuf>) -> Self {
        TFTPServer {
            channel,
            root: root.into(),
            active: None,
        }
    }

    pub fn is_serving(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActiveTransfer> {
        self.active.as_ref()
    }

    /// Main server loop. Never returns; a failed receive is reported and
    /// the loop carries on.
    pub fn serve(&mut self) -> ! {
        let mut buf = [0; BUFFER_SIZE];

        loop {
            match recv_datagram(&self.channel, &mut buf) {
                Ok((len, peer)) => self.handle_datagram(&buf[..len], peer),
                Err(e) => warn!("tftp_recv error: {}", e),
            }
        }
    }

    /// Processes one datagram received from `peer`.
    pub fn handle_datagram(&mut self, buf: &[u8], peer: SocketAddr) {
        let packet = match parse_udp_packet(buf) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping datagram from {}: {}", peer, e);
                return;
            }
        };

        debug!("{} from {}", packet, peer);

        match packet {
            TFTPPacket::RRQ(rrq) => self.on_rrq(rrq, peer),
            TFTPPacket::ACK(ap) => self.on_ack(ap, peer),
            TFTPPacket::ERR(ep) => self.on_err(ep, peer),
            TFTPPacket::WRQ(_) | TFTPPacket::DATA(_) => {
                notify_peer(
                    &self.channel,
                    ErrorPacket::new_custom(BAD_REQUEST_CODE, BAD_REQUEST_MSG),
                    peer,
                );
            }
        }
    }

    fn on_rrq(&mut self, rrq: ReadRequestPacket, peer: SocketAddr) {
        if let Some(active) = &self.active {
            info!(
                "Rejecting {} from {}: {} already opened for {}",
                rrq.filename(),
                peer,
                active.filename,
                active.peer
            );
            notify_peer(
                &self.channel,
                ErrorPacket::new_custom(BUSY_CODE, BUSY_MSG),
                peer,
            );
            return;
        }

        info!(
            "Client {} request to read {} ({})",
            peer,
            rrq.filename(),
            rrq.mode()
        );

        let opened = resolve_path(&self.root, rrq.filename()).and_then(|path| {
            ActiveTransfer::open(peer, rrq.filename(), &path).map_err(|e| ErrorPacket::from_io(&e))
        });

        let mut transfer = match opened {
            Ok(transfer) => transfer,
            Err(ep) => {
                warn!("Cannot serve {} to {}: {}", rrq.filename(), peer, ep.err());
                notify_peer(&self.channel, ep, peer);
                return;
            }
        };

        debug!("file: {}, size: {}", transfer.filename, transfer.size);

        match transfer.send_first(&self.channel) {
            Ok(()) => self.active = Some(transfer),
            Err(e) => self.abort(transfer, e),
        }
    }

    fn on_ack(&mut self, ap: AckPacket, peer: SocketAddr) {
        let transfer = match self.active.as_mut() {
            Some(transfer) => transfer,
            None => {
                debug!("Unexpected ACK from {} (no file opened)", peer);
                return;
            }
        };

        // Any ACK moves the transfer on, and the next block goes to
        // whoever sent it.
        if ap.blk() != transfer.blk {
            debug!("ACK [{}] while last sent is [{}]", ap.blk(), transfer.blk);
        }
        if transfer.peer != peer {
            debug!("ACK from {}, was serving {}", peer, transfer.peer);
            transfer.peer = peer;
        }

        match transfer.on_ack(&self.channel) {
            Ok(Progress::Sent) => {}
            Ok(Progress::Complete) => {
                if let Some(done) = self.active.take() {
                    info!("File {} sent to {} ({} bytes)", done.filename, done.peer, done.sent);
                }
            }
            Err(e) => {
                if let Some(transfer) = self.active.take() {
                    self.abort(transfer, e);
                }
            }
        }
    }

    fn on_err(&mut self, ep: ErrorPacket, peer: SocketAddr) {
        warn!("tftp error {} ({}) from {}", ep.code(), ep.err(), peer);

        if let Some(transfer) = self.active.take() {
            info!("Closing {} after peer error", transfer.filename);
        }
    }

    /// Drops a transfer that failed locally, telling the peer when the
    /// failure was reading the file.
    fn abort(&self, transfer: ActiveTransfer, err: TransferError) {
        warn!("Transfer of {} to {} aborted: {}", transfer.filename, transfer.peer, err);

        if let TransferError::LocalIo(e) = &err {
            notify_peer(&self.channel, ErrorPacket::from_io(e), transfer.peer);
        }
    }
}

/// Reads up to one block from `source`.
fn read_chunk<R: Read>(source: &mut R) -> io::Result<Vec<u8>> {
    let mut chunk = Vec::with_capacity(STRIDE_SIZE);
    source.take(STRIDE_SIZE as u64).read_to_end(&mut chunk)?;
    Ok(chunk)
}

/// Resolves `filename` under `root`, refusing anything that escapes it.
fn resolve_path(root: &Path, filename: &str) -> Result<PathBuf, ErrorPacket> {
    let root_canon = root.canonicalize().map_err(|e| ErrorPacket::from_io(&e))?;
    let path_canon = root
        .join(filename)
        .canonicalize()
        .map_err(|e| ErrorPacket::from_io(&e))?;

    if !path_canon.starts_with(&root_canon) {
        return Err(ErrorPacket::new(TFTPError::AccessViolation));
    }

    Ok(path_canon)
}

/// Entry point for TFTP server: binds `config.bind_address` and serves
/// `config.root_directory` until the process is killed.
pub fn server_main(config: &ServerConfig) -> Result<(), TransferError> {
    let sock = UdpSocket::bind(&config.bind_address).map_err(TransferError::Transport)?;
    info!(
        "TFTP server listening on {}, serving files from {}",
        sock.local_addr().map_err(TransferError::Transport)?,
        config.root_directory.display()
    );

    TFTPServer::new(sock, config.root_directory.clone()).serve()
}
