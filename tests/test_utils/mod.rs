//! Helpers shared by the integration tests: spawning servers on real
//! sockets and exchanging raw RESP bytes with them.
#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use rudis::server::RedisServer;

/// Spawns a server with the given extra flags and waits until it accepts
/// connections.
pub async fn spawn_server(port: u16, extra_args: &[&str]) {
    let mut args = vec![
        "rudis-server".to_string(),
        "--port".to_string(),
        port.to_string(),
    ];
    args.extend(extra_args.iter().map(|s| s.to_string()));

    let server = RedisServer::new(args).expect("server arguments should parse");
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    wait_until_listening(port).await;
}

/// Spawns a master on `master_port` and a replica of it on `replica_port`,
/// giving the handshake time to settle.
pub async fn spawn_master_and_replica(master_port: u16, replica_port: u16) {
    spawn_server(master_port, &[]).await;
    spawn_server(
        replica_port,
        &["--replicaof", &format!("127.0.0.1 {}", master_port)],
    )
    .await;

    // Let the PSYNC handshake and snapshot transfer finish.
    tokio::time::sleep(Duration::from_millis(300)).await;
}

pub async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(format!("127.0.0.1:{}", port))
        .await
        .expect("server should accept connections")
}

async fn wait_until_listening(port: u16) {
    for _ in 0..100 {
        if TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .is_ok()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server on port {} never came up", port);
}

/// Writes raw bytes and reads one chunk of the reply.
pub async fn send(stream: &mut TcpStream, request: &[u8]) -> Vec<u8> {
    stream
        .write_all(request)
        .await
        .expect("request should be written");
    stream.flush().await.expect("request should be flushed");

    read_chunk(stream).await
}

/// Reads whatever the server has sent within a short window.
pub async fn read_chunk(stream: &mut TcpStream) -> Vec<u8> {
    let mut buffer = [0u8; 4096];
    let bytes_read = timeout(Duration::from_secs(2), stream.read(&mut buffer))
        .await
        .expect("server should reply in time")
        .expect("read should succeed");

    buffer[..bytes_read].to_vec()
}

/// Keeps reading until `expected` bytes have arrived or the window closes.
pub async fn read_exactly(stream: &mut TcpStream, expected: usize) -> Vec<u8> {
    let mut collected = Vec::with_capacity(expected);
    let mut buffer = [0u8; 4096];

    while collected.len() < expected {
        let bytes_read = timeout(Duration::from_secs(2), stream.read(&mut buffer))
            .await
            .expect("server should keep sending")
            .expect("read should succeed");

        if bytes_read == 0 {
            break;
        }

        collected.extend_from_slice(&buffer[..bytes_read]);
    }

    collected
}

pub fn command(parts: &[&str]) -> Vec<u8> {
    let mut encoded = format!("*{}\r\n", parts.len());
    for part in parts {
        encoded.push_str(&format!("${}\r\n{}\r\n", part.len(), part));
    }
    encoded.into_bytes()
}

pub fn bulk_string(value: &str) -> Vec<u8> {
    format!("${}\r\n{}\r\n", value.len(), value).into_bytes()
}
