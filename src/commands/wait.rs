use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::replication;
use crate::resp::RespValue;
use crate::server::RedisServer;

/// How often WAIT re-checks replica acknowledgements while blocked.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct WaitArguments {
    replica_count: usize,
    timeout: Option<Duration>,
}

impl WaitArguments {
    /// Parses `WAIT numreplicas timeout_ms`; a zero timeout blocks until
    /// enough replicas acknowledge.
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 2 {
            return Err(CommandError::Arity {
                command: "WAIT",
                minimum: 2,
            });
        }

        let replica_count = arguments[0]
            .parse::<usize>()
            .map_err(|_| CommandError::InvalidWaitArgument)?;
        let timeout_ms = arguments[1]
            .parse::<u64>()
            .map_err(|_| CommandError::InvalidWaitArgument)?;

        let timeout = match timeout_ms {
            0 => None,
            duration => Some(Duration::from_millis(duration)),
        };

        Ok(Self {
            replica_count,
            timeout,
        })
    }
}

/// Blocks until at least `numreplicas` replicas have acknowledged the
/// current master offset, or the timeout elapses. Replies with the count of
/// replicas caught up at return.
///
/// When nothing has been written yet there is nothing to acknowledge, so
/// the reply is simply the number of registered replicas.
pub async fn wait(
    server: &Arc<RwLock<RedisServer>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let wait_arguments = WaitArguments::parse(arguments)?;

    {
        let server_guard = server.read().await;

        let Some(replicas) = &server_guard.replicas else {
            return Err(CommandError::WaitOnReplica);
        };

        if server_guard.repl_offset == 0 {
            return Ok(CommandResult::Response(
                RespValue::Integer(replicas.len() as i64).encode(),
            ));
        }
    }

    let target = replication::broadcast_getack(server).await;

    let deadline = wait_arguments
        .timeout
        .map(|timeout| Instant::now() + timeout);

    let acked = loop {
        let acked = replication::count_acked_replicas(server, target).await;

        if acked >= wait_arguments.replica_count {
            break acked;
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break acked;
        }

        tokio::time::sleep(ACK_POLL_INTERVAL).await;
    };

    Ok(CommandResult::Response(
        RespValue::Integer(acked as i64).encode(),
    ))
}
