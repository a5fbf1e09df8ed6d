//! Per-connection I/O loops.
//!
//! Each client connection runs [`handle_client_connection`]: an incremental
//! read buffer feeding the command dispatcher, with the MULTI transaction
//! queue carried as session-local state. A replica additionally runs
//! [`handle_master_connection`] against its upstream link.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::commands::{CommandError, CommandHandler, CommandResult};
use crate::key_value_store::KeyValueStore;
use crate::rdb;
use crate::replication::ReplicaHandle;
use crate::resp::RespValue;
use crate::server::RedisServer;
use crate::state::State;

/// Transaction state of one client session.
///
/// The queue lives here, owned by the connection task, so sessions can
/// never interfere with each other through address reuse.
#[derive(Debug)]
enum SessionState {
    Normal,
    QueuedMulti(Vec<CommandHandler>),
}

pub async fn handle_client_connection(
    stream: TcpStream,
    server: Arc<RwLock<RedisServer>>,
    client_address: String,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
) {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(RwLock::new(writer));

    let mut buffer = BytesMut::with_capacity(4096);
    let mut session = SessionState::Normal;

    loop {
        match reader.read_buf(&mut buffer).await {
            Ok(0) => {
                cleanup_connection(&server, &client_address).await;
                return;
            }
            Ok(_) => (),
            Err(e) => {
                debug!(client = %client_address, error = %e, "read failed");
                cleanup_connection(&server, &client_address).await;
                return;
            }
        }

        loop {
            let (input, raw) = match RespValue::parse(&buffer) {
                Ok(Some((input, consumed))) => {
                    let raw = buffer[..consumed].to_vec();
                    buffer.advance(consumed);
                    (input, raw)
                }
                Ok(None) => break,
                Err(e) => {
                    // A malformed frame poisons the rest of the byte
                    // stream, so the connection is closed.
                    warn!(client = %client_address, error = %e, "protocol error");
                    cleanup_connection(&server, &client_address).await;
                    return;
                }
            };

            let handler = match CommandHandler::new(&input, raw) {
                Ok(handler) => handler,
                Err(e) => {
                    write_reply(&writer, &client_address, e.as_string().as_bytes()).await;
                    continue;
                }
            };

            if write_command_forbidden(&server, &handler).await {
                write_reply(
                    &writer,
                    &client_address,
                    CommandError::ReplicaReadOnly.as_string().as_bytes(),
                )
                .await;
                continue;
            }

            let result = dispatch_command(
                handler,
                &mut session,
                &client_address,
                &server,
                &store,
                &state,
            )
            .await;

            match result {
                Ok(CommandResult::Response(reply)) | Ok(CommandResult::Write(reply)) => {
                    write_reply(&writer, &client_address, reply.as_bytes()).await;
                }
                Ok(CommandResult::NoResponse) => (),
                Ok(CommandResult::FullResync { reply }) => {
                    write_reply(&writer, &client_address, reply.as_bytes()).await;
                    register_replica(&server, &client_address, &writer).await;
                }
                Err(e) => {
                    write_reply(&writer, &client_address, e.as_string().as_bytes()).await;
                }
            }
        }
    }
}

/// Runs one command through the session state machine.
///
/// MULTI, EXEC and DISCARD drive the transitions; any other command is
/// queued while a transaction is open and executed immediately otherwise.
async fn dispatch_command(
    handler: CommandHandler,
    session: &mut SessionState,
    client_address: &str,
    server: &Arc<RwLock<RedisServer>>,
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
) -> Result<CommandResult, CommandError> {
    match handler.name.as_str() {
        "MULTI" => match session {
            SessionState::Normal => {
                *session = SessionState::QueuedMulti(Vec::new());
                Ok(CommandResult::Response(
                    RespValue::SimpleString("OK".to_string()).encode(),
                ))
            }
            SessionState::QueuedMulti(_) => Err(CommandError::MultiNested),
        },
        "EXEC" => match std::mem::replace(session, SessionState::Normal) {
            SessionState::Normal => Err(CommandError::ExecWithoutMulti),
            SessionState::QueuedMulti(queued) => {
                let mut replies = Vec::with_capacity(queued.len() + 1);
                replies.push(format!("*{}\r\n", queued.len()));

                for command in queued {
                    // Every queued command contributes exactly one element,
                    // so the reply array length always matches the queue.
                    match command
                        .execute_for_client(client_address, server, store, state)
                        .await
                    {
                        Ok(CommandResult::Response(reply)) | Ok(CommandResult::Write(reply)) => {
                            replies.push(reply);
                        }
                        Ok(_) => replies.push(RespValue::NullBulkString.encode()),
                        Err(e) => replies.push(e.as_string()),
                    }
                }

                Ok(CommandResult::Response(replies.join("")))
            }
        },
        "DISCARD" => match session {
            SessionState::Normal => Err(CommandError::DiscardWithoutMulti),
            SessionState::QueuedMulti(_) => {
                *session = SessionState::Normal;
                Ok(CommandResult::Response(
                    RespValue::SimpleString("OK".to_string()).encode(),
                ))
            }
        },
        _ => match session {
            SessionState::QueuedMulti(queued) => {
                if let Some(e) = handler.validate_arguments() {
                    return Err(e);
                }

                queued.push(handler);
                Ok(CommandResult::Response(
                    RespValue::SimpleString("QUEUED".to_string()).encode(),
                ))
            }
            SessionState::Normal => {
                handler
                    .execute_for_client(client_address, server, store, state)
                    .await
            }
        },
    }
}

/// Processes commands arriving on the replica's upstream connection.
///
/// Commands from the master produce no replies except the ACK answer to
/// `REPLCONF GETACK *`, and every processed frame advances the replica's
/// offset by its byte length, recognized or not. The ACK is computed before
/// the GETACK frame itself is counted.
pub async fn handle_master_connection(
    mut stream: TcpStream,
    mut buffer: BytesMut,
    server: Arc<RwLock<RedisServer>>,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
) {
    loop {
        loop {
            let (input, raw) = match RespValue::parse(&buffer) {
                Ok(Some((input, consumed))) => {
                    let raw = buffer[..consumed].to_vec();
                    buffer.advance(consumed);
                    (input, raw)
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "protocol error on master connection");
                    return;
                }
            };

            let consumed = raw.len();

            if let Ok(handler) = CommandHandler::new(&input, raw) {
                if let Some(reply) = handler.apply_from_master(&server, &store, &state).await {
                    if let Err(e) = stream.write_all(reply.as_bytes()).await {
                        warn!(error = %e, "failed to answer master");
                        return;
                    }
                }
            }

            let mut server_guard = server.write().await;
            server_guard.repl_offset += consumed as u64;
        }

        match stream.read_buf(&mut buffer).await {
            Ok(0) => {
                info!("master connection closed");
                return;
            }
            Ok(_) => (),
            Err(e) => {
                warn!(error = %e, "failed to read from master");
                return;
            }
        }
    }
}

/// Registers a connection that completed PSYNC as a replica link: streams
/// the snapshot payload and adds the writer to the registry.
async fn register_replica(
    server: &Arc<RwLock<RedisServer>>,
    client_address: &str,
    writer: &Arc<RwLock<OwnedWriteHalf>>,
) {
    let (dir, filename) = {
        let server_guard = server.read().await;
        (
            server_guard.rdb_dir.clone(),
            server_guard.rdb_filename.clone(),
        )
    };

    let payload = rdb::snapshot_payload(&dir, &filename).await;
    write_reply(writer, client_address, &payload).await;

    let mut server_guard = server.write().await;
    let listening_port = server_guard.pending_replica_ports.remove(client_address);

    if let Some(replicas) = &mut server_guard.replicas {
        replicas.insert(
            client_address.to_string(),
            ReplicaHandle {
                writer: Arc::clone(writer),
                acked_offset: 0,
                listening_port,
            },
        );
        info!(replica = %client_address, "registered replica");
    }
}

async fn write_reply(writer: &Arc<RwLock<OwnedWriteHalf>>, client_address: &str, reply: &[u8]) {
    let mut writer_guard = writer.write().await;

    let result = match writer_guard.write_all(reply).await {
        Ok(()) => writer_guard.flush().await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        debug!(client = %client_address, error = %e, "failed to write reply");
    }
}

/// Write commands from ordinary clients are rejected on a replica; its
/// keyspace changes only through the master stream.
async fn write_command_forbidden(
    server: &Arc<RwLock<RedisServer>>,
    handler: &CommandHandler,
) -> bool {
    handler.is_write_command() && !server.read().await.is_master()
}

/// Drops whatever per-connection state the server holds for a closed
/// connection: a registered replica link and any pending listening port.
async fn cleanup_connection(server: &Arc<RwLock<RedisServer>>, client_address: &str) {
    let mut server_guard = server.write().await;

    server_guard.pending_replica_ports.remove(client_address);

    if let Some(replicas) = &mut server_guard.replicas {
        if replicas.remove(client_address).is_some() {
            info!(replica = %client_address, "deregistered replica");
        }
    }
}
