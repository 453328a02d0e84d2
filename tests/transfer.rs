use std::fs;
use std::net::{SocketAddr, UdpSocket};
use std::path::Path;
use std::thread;
use std::time::Duration;

use tempfile::{tempdir, TempDir};

use tftplite::tftp::client::{client_main, TFTPClient};
use tftplite::tftp::server::TFTPServer;
use tftplite::tftp::shared::ack_packet::AckPacket;
use tftplite::tftp::shared::error::TransferError;
use tftplite::tftp::shared::request_packet::ReadRequestPacket;
use tftplite::tftp::shared::{parse_udp_packet, TFTPPacket, BUFFER_SIZE, OCTET_MODE};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Starts a server on a loopback port serving `root`. The thread is left
/// running when the test ends.
fn spawn_server(root: &Path) -> SocketAddr {
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = sock.local_addr().unwrap();
    let root = root.to_path_buf();

    thread::spawn(move || {
        TFTPServer::new(sock, root).serve();
    });

    addr
}

fn client_socket() -> UdpSocket {
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    sock.set_read_timeout(Some(TIMEOUT)).unwrap();
    sock
}

fn served_file(name: &str, contents: &[u8]) -> (TempDir, SocketAddr) {
    let root = tempdir().unwrap();
    fs::write(root.path().join(name), contents).unwrap();
    let addr = spawn_server(root.path());
    (root, addr)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn downloads_exact_block_file() {
    let contents = pattern(512);
    let (_root, server) = served_file("exact.bin", &contents);
    let out = tempdir().unwrap();
    let dest = out.path().join("exact.bin");

    let stats = TFTPClient::new(client_socket(), server)
        .download("exact.bin", &dest)
        .unwrap();

    assert_eq!(stats.bytes, 512);
    assert_eq!(fs::read(&dest).unwrap(), contents);
}

#[test]
fn downloads_short_file() {
    let (_root, server) = served_file("hello.txt", b"0123456789");
    let out = tempdir().unwrap();
    let dest = out.path().join("hello.txt");

    let stats = TFTPClient::new(client_socket(), server)
        .download("hello.txt", &dest)
        .unwrap();

    assert_eq!(stats.bytes, 10);
    assert_eq!(fs::read(&dest).unwrap(), b"0123456789");
}

#[test]
fn downloads_multi_block_file() {
    let contents = pattern(3 * 512 + 77);
    let (_root, server) = served_file("big.bin", &contents);
    let out = tempdir().unwrap();
    let dest = out.path().join("big.bin");

    let stats = TFTPClient::new(client_socket(), server)
        .download("big.bin", &dest)
        .unwrap();

    assert_eq!(stats.bytes, contents.len());
    assert_eq!(fs::read(&dest).unwrap(), contents);
}

#[test]
fn missing_file_leaves_no_output() {
    let root = tempdir().unwrap();
    let server = spawn_server(root.path());
    let out = tempdir().unwrap();
    let dest = out.path().join("nope.txt");

    let err = TFTPClient::new(client_socket(), server)
        .download("nope.txt", &dest)
        .unwrap_err();

    assert!(matches!(err, TransferError::Remote { .. }));
    assert!(!dest.exists());
}

#[test]
fn server_is_reusable_after_a_transfer() {
    let (_root, server) = served_file("again.txt", b"twice");
    let out = tempdir().unwrap();

    for name in ["first.txt", "second.txt"] {
        let dest = out.path().join(name);
        TFTPClient::new(client_socket(), server)
            .download("again.txt", &dest)
            .unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"twice");
    }
}

#[test]
fn second_reader_is_refused_while_busy() {
    let contents = pattern(2 * 512);
    let (_root, server) = served_file("busy.bin", &contents);

    // Hold the server in the middle of a transfer by not acknowledging.
    let holder = client_socket();
    let rrq = TFTPPacket::RRQ(ReadRequestPacket::new("busy.bin", OCTET_MODE));
    holder.send_to(&rrq.encode().unwrap(), server).unwrap();

    let mut buf = [0; BUFFER_SIZE];
    let (len, _) = holder.recv_from(&mut buf).unwrap();
    assert!(matches!(
        parse_udp_packet(&buf[..len]).unwrap(),
        TFTPPacket::DATA(ref dp) if dp.blk() == 1
    ));

    let out = tempdir().unwrap();
    let err = TFTPClient::new(client_socket(), server)
        .download("busy.bin", &out.path().join("busy.bin"))
        .unwrap_err();
    match err {
        TransferError::Remote { code, .. } => assert_eq!(code, 26),
        e => panic!("unexpected error {:?}", e),
    }

    // The held transfer is unaffected and runs to completion.
    let mut received = Vec::new();
    let mut blk = 1;
    loop {
        let ack = TFTPPacket::ACK(AckPacket::new(blk));
        holder.send_to(&ack.encode().unwrap(), server).unwrap();
        if blk == 3 {
            break;
        }
        let (len, _) = holder.recv_from(&mut buf).unwrap();
        match parse_udp_packet(&buf[..len]).unwrap() {
            TFTPPacket::DATA(dp) => {
                assert_eq!(dp.blk(), blk + 1);
                received.extend_from_slice(dp.payload());
            }
            p => panic!("unexpected packet {}", p),
        }
        blk += 1;
    }

    assert_eq!(received.len(), 512);
}

#[test]
fn client_main_resolves_and_downloads() {
    let (_root, server) = served_file("main.txt", b"via client_main");
    let out = tempdir().unwrap();
    let dest = out.path().join("main.txt");

    let stats = client_main(&server.to_string(), "main.txt", &dest).unwrap();

    assert_eq!(stats.bytes, 15);
    assert_eq!(fs::read(&dest).unwrap(), b"via client_main");
}
