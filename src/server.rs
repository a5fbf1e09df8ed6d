//! Server configuration and the accept loop.
//!
//! A server runs as either a master or a replica; the role is fixed for the
//! lifetime of the process. The `RedisServer` value doubles as the shared
//! replication state: masters keep the replica registry, the backlog and the
//! replication offset here, behind an `Arc<RwLock<_>>`.

use std::collections::HashMap;
use std::sync::Arc;

use rand::distr::{Alphanumeric, SampleString};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::connection::{handle_client_connection, handle_master_connection};
use crate::key_value_store::KeyValueStore;
use crate::rdb;
use crate::replication::{self, HandshakeError, ReplicaHandle};
use crate::state::State;

/// Errors from command-line argument parsing.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CliError {
    #[error("invalid command line flag")]
    InvalidCommandLineFlag,
    #[error("invalid port flag value")]
    InvalidPortFlagValue,
    #[error("invalid master address")]
    InvalidMasterAddress,
    #[error("invalid master port")]
    InvalidMasterPort,
}

/// Fatal errors during startup; the process exits with status 1 on these.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind TCP listener: {0}")]
    Bind(std::io::Error),
    #[error("failed to connect to master: {0}")]
    MasterUnreachable(std::io::Error),
    #[error("replication handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
}

#[derive(Debug, PartialEq, Clone)]
pub enum RedisRole {
    Master,
    /// A replica mirroring the master at the given (host, port).
    Replica((String, u32)),
}

impl RedisRole {
    /// The role label used by INFO; replicas report the historical name.
    pub fn as_string(&self) -> &str {
        match self {
            RedisRole::Master => "master",
            RedisRole::Replica(_) => "slave",
        }
    }
}

/// Configuration and replication state for one server instance.
#[derive(Debug, Clone)]
pub struct RedisServer {
    pub port: u32,
    pub role: RedisRole,
    /// 40-character alphanumeric replication id, generated at startup. A
    /// replica overwrites it with the master's id during the handshake.
    pub repl_id: String,
    /// Byte offset of the replication stream. On a master this counts
    /// propagated command bytes; on a replica, bytes processed from the
    /// upstream connection.
    pub repl_offset: u64,
    /// Directory holding the RDB snapshot, from `--dir`.
    pub rdb_dir: String,
    /// RDB snapshot file name, from `--dbfilename`.
    pub rdb_filename: String,
    /// Replica registry, present only on masters.
    pub replicas: Option<HashMap<String, ReplicaHandle>>,
    /// Listening ports declared via `REPLCONF listening-port` before the
    /// PSYNC that registers the connection.
    pub pending_replica_ports: HashMap<String, u32>,
    /// Raw command bytes keyed by the offset they were emitted at. Retained
    /// for observability; full resync is the only sync path.
    pub replication_backlog: HashMap<u64, Vec<u8>>,
}

impl RedisServer {
    /// Builds a server from command-line arguments.
    ///
    /// Recognised flags: `--port <int>`, `--dir <path>`,
    /// `--dbfilename <name>` and `--replicaof "<host> <port>"`.
    pub fn new<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut port: Option<u32> = None;
        let mut role: Option<RedisRole> = None;
        let mut rdb_dir: Option<String> = None;
        let mut rdb_filename: Option<String> = None;

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => {
                    let Some(port_str) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    port = Some(parse_port(&port_str, CliError::InvalidPortFlagValue)?);
                }
                "--dir" => {
                    let Some(dir) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    rdb_dir = Some(dir);
                }
                "--dbfilename" => {
                    let Some(filename) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    rdb_filename = Some(filename);
                }
                "--replicaof" => {
                    let Some(master_address) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    let (address, master_port) = validate_master_address(&master_address)?;
                    role = Some(RedisRole::Replica((address, master_port)));
                }
                _ => return Err(CliError::InvalidCommandLineFlag),
            }
        }

        let role = role.unwrap_or(RedisRole::Master);

        let replicas = if role == RedisRole::Master {
            Some(HashMap::new())
        } else {
            None
        };

        Ok(RedisServer {
            port: port.unwrap_or(6379),
            role,
            repl_id: Alphanumeric.sample_string(&mut rand::rng(), 40),
            repl_offset: 0,
            rdb_dir: rdb_dir.unwrap_or_default(),
            rdb_filename: rdb_filename.unwrap_or_default(),
            replicas,
            pending_replica_ports: HashMap::new(),
            replication_backlog: HashMap::new(),
        })
    }

    pub fn is_master(&self) -> bool {
        self.role == RedisRole::Master
    }

    /// Runs the server until the process is terminated.
    ///
    /// Loads the RDB snapshot into the keyspace, performs the replication
    /// handshake when running as a replica, then accepts client connections
    /// and serves each one in its own task.
    pub async fn run(self) -> Result<(), ServerError> {
        let store = Arc::new(Mutex::new(KeyValueStore::new()));
        let state = Arc::new(Mutex::new(State::new()));

        rdb::bootstrap(&store, &self.rdb_dir, &self.rdb_filename).await;

        let port = self.port;
        let role = self.role.clone();
        let server = Arc::new(RwLock::new(self));

        if let RedisRole::Replica((address, master_port)) = role {
            let master_address = format!("{}:{}", address, master_port);

            let mut stream = TcpStream::connect(&master_address)
                .await
                .map_err(ServerError::MasterUnreachable)?;

            let leftover = replication::handshake(&mut stream, &server).await?;
            info!(master = %master_address, "replication handshake complete");

            let server_clone = Arc::clone(&server);
            let store_clone = Arc::clone(&store);
            let state_clone = Arc::clone(&state);

            tokio::spawn(async move {
                handle_master_connection(stream, leftover, server_clone, store_clone, state_clone)
                    .await;
            });
        }

        let listener = TcpListener::bind(format!("127.0.0.1:{}", port))
            .await
            .map_err(ServerError::Bind)?;
        info!(port, "listening for connections");

        loop {
            match listener.accept().await {
                Ok((stream, client_address)) => {
                    let server_clone = Arc::clone(&server);
                    let store_clone = Arc::clone(&store);
                    let state_clone = Arc::clone(&state);

                    tokio::spawn(async move {
                        handle_client_connection(
                            stream,
                            server_clone,
                            client_address.to_string(),
                            store_clone,
                            state_clone,
                        )
                        .await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

fn parse_port(value: &str, error: CliError) -> Result<u32, CliError> {
    match value.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port),
        _ => Err(error),
    }
}

/// Validates a `--replicaof` value: `"<host> <port>"` where host is an IPv4
/// address or hostname.
fn validate_master_address(master_address: &str) -> Result<(String, u32), CliError> {
    let Some((host, port)) = master_address.split_once(' ') else {
        return Err(CliError::InvalidMasterAddress);
    };

    if port.contains(' ') || !is_valid_host(host) {
        return Err(CliError::InvalidMasterAddress);
    }

    let port = parse_port(port, CliError::InvalidMasterPort)?;

    Ok((host.to_string(), port))
}

/// A host made only of digits and dots must be a well-formed dotted-quad
/// IPv4 address; anything else is accepted as a hostname as long as it
/// sticks to alphanumerics, dashes and dots.
fn is_valid_host(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }

    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        let octets: Vec<&str> = host.split('.').collect();
        return octets.len() == 4 && octets.iter().all(|octet| octet.parse::<u8>().is_ok());
    }

    host.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}
