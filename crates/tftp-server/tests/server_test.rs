//! Integration tests for the TFTP server
//!
//! These tests run the dispatcher on a loopback UDP socket and talk to it
//! with a minimal client built from the packet codec.

use std::net::SocketAddr;
use std::time::Duration;
use tftp_server::packet::{decode_data, encode_ack, encode_error, encode_read_request};
use tftp_server::{DataPacket, ErrorCode, TftpServer, TransferSettings};
use tokio::net::UdpSocket;
use tokio::time::timeout;

const CLIENT_DEADLINE: Duration = Duration::from_secs(5);

fn fast_settings(retries: u8) -> TransferSettings {
    TransferSettings {
        retries,
        timeout: Duration::from_millis(100),
    }
}

async fn start_server(payload: Vec<u8>, settings: TransferSettings) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = socket.local_addr().expect("listener addr");
    let server = TftpServer::new(payload, settings);
    tokio::spawn(async move { server.serve(socket).await });
    addr
}

async fn recv_data(client: &UdpSocket) -> (DataPacket, SocketAddr) {
    let mut buf = [0u8; 1024];
    let (n, from) = timeout(CLIENT_DEADLINE, client.recv_from(&mut buf))
        .await
        .expect("server answered in time")
        .expect("recv");
    (decode_data(&buf[..n]).expect("data packet"), from)
}

/// Download the payload, acknowledging every block.
async fn fetch(server: SocketAddr) -> Vec<u8> {
    let client = UdpSocket::bind("127.0.0.1:0").await.expect("bind client");
    client
        .send_to(&encode_read_request("payload.bin", "octet"), server)
        .await
        .expect("send request");

    let mut received = Vec::new();
    let mut expected: u16 = 1;
    loop {
        let (data, from) = recv_data(&client).await;
        assert_ne!(from, server, "data must come from a dedicated endpoint");
        if data.block == expected.wrapping_sub(1) {
            // Retransmission of a block we already have: our ack was late.
            continue;
        }
        assert_eq!(data.block, expected);

        received.extend_from_slice(&data.payload);
        client.send_to(&encode_ack(data.block), from).await.expect("send ack");

        if data.is_final() {
            return received;
        }
        expected = expected.wrapping_add(1);
    }
}

async fn assert_silent(client: &UdpSocket, wait: Duration) {
    let mut buf = [0u8; 1024];
    let result = timeout(wait, client.recv_from(&mut buf)).await;
    assert!(result.is_err(), "expected no further datagrams");
}

fn sample_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

#[tokio::test]
async fn test_serves_payload_in_blocks() {
    let payload = sample_payload(1000);
    let server = start_server(payload.clone(), fast_settings(5)).await;

    assert_eq!(fetch(server).await, payload);
}

#[tokio::test]
async fn test_serves_multi_block_and_exact_multiple_payloads() {
    for len in [0, 512, 1024, 5000] {
        let payload = sample_payload(len);
        let server = start_server(payload.clone(), fast_settings(5)).await;

        assert_eq!(fetch(server).await, payload, "payload of {len} bytes");
    }
}

#[tokio::test]
async fn test_serves_concurrent_clients() {
    let payload = sample_payload(3000);
    let server = start_server(payload.clone(), fast_settings(5)).await;

    let (a, b, c) = tokio::join!(fetch(server), fetch(server), fetch(server));

    assert_eq!(a, payload);
    assert_eq!(b, payload);
    assert_eq!(c, payload);
}

#[tokio::test]
async fn test_dispatcher_survives_bad_requests() {
    let payload = sample_payload(700);
    let server = start_server(payload.clone(), fast_settings(5)).await;

    let noisy = UdpSocket::bind("127.0.0.1:0").await.expect("bind noisy client");
    noisy.send_to(&[0xde, 0xad], server).await.expect("send garbage");
    noisy
        .send_to(&encode_read_request("payload.bin", "netascii"), server)
        .await
        .expect("send netascii request");
    noisy
        .send_to(b"\x00\x02payload.bin\x00octet\x00", server)
        .await
        .expect("send write request");

    // Rejected requests are dropped without any reply.
    assert_silent(&noisy, Duration::from_millis(300)).await;

    assert_eq!(fetch(server).await, payload);
}

#[tokio::test]
async fn test_unacknowledged_block_is_resent_until_retries_run_out() {
    let server = start_server(sample_payload(800), fast_settings(3)).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.expect("bind client");
    client
        .send_to(&encode_read_request("payload.bin", "octet"), server)
        .await
        .expect("send request");

    let (first, _) = recv_data(&client).await;
    let (second, _) = recv_data(&client).await;
    let (third, _) = recv_data(&client).await;

    assert_eq!(first.block, 1);
    assert_eq!(second, first);
    assert_eq!(third, first);
    assert_silent(&client, Duration::from_millis(500)).await;
}

#[tokio::test]
async fn test_client_error_aborts_transfer() {
    // Long enough that a retransmission never races the error packet.
    let settings = TransferSettings {
        retries: 10,
        timeout: Duration::from_secs(1),
    };
    let server = start_server(sample_payload(2000), settings).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.expect("bind client");
    client
        .send_to(&encode_read_request("payload.bin", "octet"), server)
        .await
        .expect("send request");

    let (data, from) = recv_data(&client).await;
    assert_eq!(data.block, 1);
    client
        .send_to(&encode_error(ErrorCode::DiskFull, "no space left"), from)
        .await
        .expect("send error");

    assert_silent(&client, Duration::from_millis(1500)).await;
}
