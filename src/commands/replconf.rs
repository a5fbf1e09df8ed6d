use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::resp::RespValue;
use crate::server::RedisServer;

pub struct ReplconfArguments {
    subcommand: String,
    rest: Vec<String>,
}

impl ReplconfArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        let Some(subcommand) = arguments.first() else {
            return Err(CommandError::Arity {
                command: "REPLCONF",
                minimum: 1,
            });
        };

        Ok(Self {
            subcommand: subcommand.clone(),
            rest: arguments[1..].to_vec(),
        })
    }
}

/// Handles REPLCONF on a master.
///
/// `listening-port` records the port a connecting replica declares before
/// PSYNC registers it. `ACK <offset>` updates the replica's acknowledged
/// offset and produces no reply. Everything else, including capabilities,
/// is acknowledged with `+OK`.
pub async fn replconf(
    client_address: &str,
    server: &Arc<RwLock<RedisServer>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let replconf_arguments = ReplconfArguments::parse(arguments)?;

    match replconf_arguments.subcommand.to_lowercase().as_str() {
        "listening-port" => {
            let port = replconf_arguments
                .rest
                .first()
                .and_then(|value| value.parse::<u32>().ok())
                .ok_or(CommandError::InvalidReplconfArgument)?;

            let mut server_guard = server.write().await;
            server_guard
                .pending_replica_ports
                .insert(client_address.to_string(), port);

            Ok(CommandResult::Response(
                RespValue::SimpleString("OK".to_string()).encode(),
            ))
        }
        "ack" => {
            let offset = replconf_arguments
                .rest
                .first()
                .and_then(|value| value.parse::<u64>().ok())
                .ok_or(CommandError::InvalidReplconfArgument)?;

            let mut server_guard = server.write().await;
            if let Some(replicas) = &mut server_guard.replicas {
                if let Some(handle) = replicas.get_mut(client_address) {
                    handle.acked_offset = offset;
                    debug!(replica = %client_address, offset, "recorded replica ACK");
                }
            }

            Ok(CommandResult::NoResponse)
        }
        _ => Ok(CommandResult::Response(
            RespValue::SimpleString("OK".to_string()).encode(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::RwLock;

    use crate::commands::command_error::CommandError;
    use crate::commands::command_handler::CommandResult;
    use crate::server::RedisServer;

    use super::replconf;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_replconf_listening_port_and_capa() {
        let server = Arc::new(RwLock::new(
            RedisServer::new(vec!["rudis-server".to_string()]).unwrap(),
        ));

        assert_eq!(
            replconf("127.0.0.1:5000", &server, &args(&["listening-port", "6380"])).await,
            Ok(CommandResult::Response("+OK\r\n".to_string()))
        );
        assert_eq!(
            replconf("127.0.0.1:5000", &server, &args(&["capa", "psync2"])).await,
            Ok(CommandResult::Response("+OK\r\n".to_string()))
        );

        let server_guard = server.read().await;
        assert_eq!(
            server_guard.pending_replica_ports.get("127.0.0.1:5000"),
            Some(&6380)
        );
    }

    #[tokio::test]
    async fn test_replconf_invalid_port() {
        let server = Arc::new(RwLock::new(
            RedisServer::new(vec!["rudis-server".to_string()]).unwrap(),
        ));

        assert_eq!(
            replconf("127.0.0.1:5000", &server, &args(&["listening-port", "abc"])).await,
            Err(CommandError::InvalidReplconfArgument)
        );
        assert_eq!(
            replconf("127.0.0.1:5000", &server, &[]).await,
            Err(CommandError::Arity {
                command: "REPLCONF",
                minimum: 1
            })
        );
    }

    #[tokio::test]
    async fn test_replconf_ack_produces_no_reply() {
        let server = Arc::new(RwLock::new(
            RedisServer::new(vec!["rudis-server".to_string()]).unwrap(),
        ));

        assert_eq!(
            replconf("127.0.0.1:5000", &server, &args(&["ACK", "150"])).await,
            Ok(CommandResult::NoResponse)
        );
    }
}
