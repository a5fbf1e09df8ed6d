use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::resp::RespValue;
use crate::server::RedisServer;

pub struct PsyncArguments {
    repl_id: String,
    offset: i64,
}

impl PsyncArguments {
    /// Parses `PSYNC <replid> <offset>`; a fresh replica sends `? -1`.
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 2 {
            return Err(CommandError::Arity {
                command: "PSYNC",
                minimum: 2,
            });
        }

        let offset = arguments[1]
            .parse::<i64>()
            .map_err(|_| CommandError::InvalidPsyncOffset)?;

        Ok(Self {
            repl_id: arguments[0].clone(),
            offset,
        })
    }
}

/// Handles PSYNC on a master: always answers with a full resync.
///
/// The connection loop sends the `+FULLRESYNC` reply, streams the snapshot
/// payload and registers the connection as a replica link.
pub async fn psync(
    server: &Arc<RwLock<RedisServer>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let psync_arguments = PsyncArguments::parse(arguments)?;

    let server_guard = server.read().await;

    if psync_arguments.repl_id != "?" && psync_arguments.repl_id != server_guard.repl_id {
        return Err(CommandError::InvalidPsyncReplicationId);
    }

    debug!(
        repl_id = %psync_arguments.repl_id,
        offset = psync_arguments.offset,
        "replica requested sync, answering with full resync"
    );

    Ok(CommandResult::FullResync {
        reply: RespValue::SimpleString(format!("FULLRESYNC {} 0", server_guard.repl_id)).encode(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::RwLock;

    use crate::commands::command_error::CommandError;
    use crate::commands::command_handler::CommandResult;
    use crate::server::RedisServer;

    use super::psync;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_psync_full_resync() {
        let server = RedisServer::new(vec!["rudis-server".to_string()]).unwrap();
        let repl_id = server.repl_id.clone();
        let server = Arc::new(RwLock::new(server));

        let result = psync(&server, &args(&["?", "-1"])).await.unwrap();
        assert_eq!(
            result,
            CommandResult::FullResync {
                reply: format!("+FULLRESYNC {} 0\r\n", repl_id),
            }
        );
    }

    #[tokio::test]
    async fn test_psync_errors() {
        let server = Arc::new(RwLock::new(
            RedisServer::new(vec!["rudis-server".to_string()]).unwrap(),
        ));

        assert_eq!(
            psync(&server, &args(&["?"])).await,
            Err(CommandError::Arity {
                command: "PSYNC",
                minimum: 2
            })
        );
        assert_eq!(
            psync(&server, &args(&["?", "zero"])).await,
            Err(CommandError::InvalidPsyncOffset)
        );
        assert_eq!(
            psync(&server, &args(&["0000000000000000000000000000000000000000", "-1"])).await,
            Err(CommandError::InvalidPsyncReplicationId)
        );
    }
}
