use std::sync::Arc;

use tokio::sync::RwLock;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::resp::RespValue;
use crate::server::RedisServer;

pub struct ConfigGetArguments {
    parameter: String,
}

impl ConfigGetArguments {
    /// Parses `CONFIG GET <name>`; GET is the only supported subcommand.
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 2 {
            return Err(CommandError::Arity {
                command: "CONFIG",
                minimum: 2,
            });
        }

        if !arguments[0].eq_ignore_ascii_case("GET") {
            return Err(CommandError::InvalidConfigSubcommand);
        }

        Ok(Self {
            parameter: arguments[1].clone(),
        })
    }
}

pub async fn config_get(
    server: &Arc<RwLock<RedisServer>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let config_arguments = ConfigGetArguments::parse(arguments)?;

    let server_guard = server.read().await;

    let reply = match config_arguments.parameter.as_str() {
        "dir" => RespValue::Array(vec![
            RespValue::BulkString("dir".to_string()),
            RespValue::BulkString(server_guard.rdb_dir.clone()),
        ]),
        "dbfilename" => RespValue::Array(vec![
            RespValue::BulkString("dbfilename".to_string()),
            RespValue::BulkString(server_guard.rdb_filename.clone()),
        ]),
        _ => RespValue::BulkString(String::new()),
    };

    Ok(CommandResult::Response(reply.encode()))
}
