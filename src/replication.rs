//! Master/replica replication: the PSYNC handshake, write fan-out and
//! offset accounting.
//!
//! A master tracks each replica link in a registry keyed by peer address.
//! Accepted write commands are fanned out as their raw received bytes, so
//! the replication offset is byte-exact without re-serialization.

use std::sync::Arc;

use bytes::BytesMut;
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::resp::{RespError, RespValue, parse_rdb_payload};
use crate::server::RedisServer;

/// A registered replica link on a master.
#[derive(Debug, Clone)]
pub struct ReplicaHandle {
    pub writer: Arc<RwLock<OwnedWriteHalf>>,
    /// The replication offset this replica most recently acknowledged.
    pub acked_offset: u64,
    /// The port the replica declared via `REPLCONF listening-port`.
    pub listening_port: Option<u32>,
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("I/O error talking to master: {0}")]
    Io(#[from] std::io::Error),
    #[error("master closed the connection")]
    ConnectionClosed,
    #[error("protocol error from master: {0}")]
    Protocol(#[from] RespError),
    #[error("unexpected reply from master: {0}")]
    UnexpectedReply(String),
}

/// Performs the replica side of the replication handshake.
///
/// Sends PING, both REPLCONF commands and PSYNC, then consumes the
/// `+FULLRESYNC <id> <offset>` reply and the bulk-framed RDB payload.
/// Returns any bytes that arrived after the payload; those are already
/// propagated commands and must be fed to the replica dispatcher.
pub async fn handshake(
    stream: &mut TcpStream,
    server: &Arc<RwLock<RedisServer>>,
) -> Result<BytesMut, HandshakeError> {
    let mut buffer = BytesMut::with_capacity(4096);

    let reply = exchange(stream, &mut buffer, RespValue::command(&["PING"])).await?;
    expect_simple_string(&reply, "PONG")?;

    let port = {
        let server_guard = server.read().await;
        server_guard.port.to_string()
    };

    let reply = exchange(
        stream,
        &mut buffer,
        RespValue::command(&["REPLCONF", "listening-port", &port]),
    )
    .await?;
    expect_simple_string(&reply, "OK")?;

    let reply = exchange(
        stream,
        &mut buffer,
        RespValue::command(&["REPLCONF", "capa", "psync2"]),
    )
    .await?;
    expect_simple_string(&reply, "OK")?;

    let reply = exchange(stream, &mut buffer, RespValue::command(&["PSYNC", "?", "-1"])).await?;
    let master_replid = parse_fullresync(&reply)?;

    // The RDB payload has no trailing CRLF and may span multiple reads.
    let payload_length = loop {
        match parse_rdb_payload(&buffer)? {
            Some((payload, consumed)) => {
                debug!(bytes = payload.len(), "received full resync snapshot");
                break consumed;
            }
            None => read_more(stream, &mut buffer).await?,
        }
    };

    let _ = buffer.split_to(payload_length);

    {
        let mut server_guard = server.write().await;
        server_guard.repl_id = master_replid;
        server_guard.repl_offset = 0;
    }

    Ok(buffer)
}

/// Records an accepted write under an already-held registry guard:
/// advances the offset, stores the raw bytes in the backlog and returns
/// the replica writers to fan out to.
///
/// The caller holds the guard across the keyspace mutation and the
/// fan-out, so replicas receive writes in exactly the order they were
/// applied.
pub fn record_write(
    server: &mut RedisServer,
    raw: &[u8],
) -> Vec<(String, Arc<RwLock<OwnedWriteHalf>>)> {
    if server.replicas.is_none() {
        return Vec::new();
    }

    let offset = server.repl_offset;
    server.repl_offset += raw.len() as u64;
    server.replication_backlog.insert(offset, raw.to_vec());

    collect_writers(server)
}

/// Snapshots the master offset and broadcasts `REPLCONF GETACK *` to every
/// replica, advancing the offset by the encoded length of that frame.
///
/// Returns the snapshotted target offset that WAIT compares ACKs against.
pub async fn broadcast_getack(server: &Arc<RwLock<RedisServer>>) -> u64 {
    let getack = RespValue::command(&["REPLCONF", "GETACK", "*"]).encode();

    let mut server_guard = server.write().await;

    let target = server_guard.repl_offset;
    server_guard.repl_offset += getack.len() as u64;

    let writers = collect_writers(&server_guard);
    let failed = write_to_writers(writers, getack.as_bytes()).await;
    deregister_replicas(&mut server_guard, &failed);

    target
}

/// Counts the replicas whose last acknowledged offset has reached `target`.
pub async fn count_acked_replicas(server: &Arc<RwLock<RedisServer>>, target: u64) -> usize {
    let server_guard = server.read().await;

    match &server_guard.replicas {
        Some(replicas) => replicas
            .values()
            .filter(|handle| handle.acked_offset >= target)
            .count(),
        None => 0,
    }
}

fn collect_writers(server: &RedisServer) -> Vec<(String, Arc<RwLock<OwnedWriteHalf>>)> {
    match &server.replicas {
        Some(replicas) => replicas
            .iter()
            .map(|(address, handle)| (address.clone(), Arc::clone(&handle.writer)))
            .collect(),
        None => Vec::new(),
    }
}

/// Writes propagated bytes to each replica writer, returning the addresses
/// whose sockets failed.
pub async fn write_to_writers(
    writers: Vec<(String, Arc<RwLock<OwnedWriteHalf>>)>,
    bytes: &[u8],
) -> Vec<String> {
    let mut failed = Vec::new();

    for (address, writer) in writers {
        let result = {
            let mut writer_guard = writer.write().await;
            match writer_guard.write_all(bytes).await {
                Ok(()) => writer_guard.flush().await,
                Err(e) => Err(e),
            }
        };

        if let Err(e) = result {
            warn!(replica = %address, error = %e, "dropping replica after write failure");
            failed.push(address);
        }
    }

    failed
}

/// Removes replicas that failed a propagation write from the registry.
pub fn deregister_replicas(server: &mut RedisServer, failed: &[String]) {
    if let Some(replicas) = &mut server.replicas {
        for address in failed {
            replicas.remove(address);
        }
    }
}

async fn exchange(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    command: RespValue,
) -> Result<RespValue, HandshakeError> {
    stream.write_all(command.encode().as_bytes()).await?;
    stream.flush().await?;

    loop {
        if let Some((value, consumed)) = RespValue::parse(buffer)? {
            let _ = buffer.split_to(consumed);
            return Ok(value);
        }

        read_more(stream, buffer).await?;
    }
}

async fn read_more(stream: &mut TcpStream, buffer: &mut BytesMut) -> Result<(), HandshakeError> {
    let bytes_read = stream.read_buf(buffer).await?;

    if bytes_read == 0 {
        return Err(HandshakeError::ConnectionClosed);
    }

    Ok(())
}

fn expect_simple_string(reply: &RespValue, expected: &str) -> Result<(), HandshakeError> {
    if *reply != RespValue::SimpleString(expected.to_string()) {
        return Err(HandshakeError::UnexpectedReply(format!(
            "expected +{}, got {:?}",
            expected, reply
        )));
    }

    Ok(())
}

/// Extracts the master replication id from a `+FULLRESYNC <id> <offset>`
/// reply.
fn parse_fullresync(reply: &RespValue) -> Result<String, HandshakeError> {
    let RespValue::SimpleString(line) = reply else {
        return Err(HandshakeError::UnexpectedReply(format!("{:?}", reply)));
    };

    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() != 3 || parts[0] != "FULLRESYNC" || !is_valid_repl_id(parts[1]) {
        return Err(HandshakeError::UnexpectedReply(line.clone()));
    }

    Ok(parts[1].to_string())
}

fn is_valid_repl_id(repl_id: &str) -> bool {
    match Regex::new(r"^[a-zA-Z0-9]{40}$") {
        Ok(re) => re.is_match(repl_id),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::resp::RespValue;

    use super::{is_valid_repl_id, parse_fullresync};

    #[test]
    fn test_is_valid_repl_id() {
        let test_cases = vec![
            ("8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb", true),
            ("8371B4FB1155B71F4A04D3E1BC3E18C4A990AEEB", true),
            ("short", false),
            ("", false),
            ("8371b4fb1155b71f4a04d3e1bc3e18c4a990aee!", false),
            ("8371b4fb1155b71f4a04d3e1bc3e18c4a990aeebff", false),
        ];

        for (input, expected) in test_cases {
            assert_eq!(is_valid_repl_id(input), expected, "validating {}", input);
        }
    }

    #[test]
    fn test_parse_fullresync() {
        let repl_id = "8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb";

        let reply = RespValue::SimpleString(format!("FULLRESYNC {} 0", repl_id));
        assert_eq!(parse_fullresync(&reply).unwrap(), repl_id);

        let invalid_cases = vec![
            RespValue::SimpleString("FULLRESYNC short 0".to_string()),
            RespValue::SimpleString("FULLRESYNC".to_string()),
            RespValue::SimpleString(format!("CONTINUE {} 0", repl_id)),
            RespValue::BulkString(format!("FULLRESYNC {} 0", repl_id)),
        ];

        for reply in invalid_cases {
            assert!(
                parse_fullresync(&reply).is_err(),
                "expected error for {:?}",
                reply
            );
        }
    }
}
