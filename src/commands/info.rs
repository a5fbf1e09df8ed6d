use std::sync::Arc;

use tokio::sync::RwLock;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::resp::RespValue;
use crate::server::RedisServer;

pub struct InfoArguments {
    section: String,
}

impl InfoArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        Ok(Self {
            section: arguments
                .first()
                .cloned()
                .unwrap_or_else(|| "replication".to_string()),
        })
    }
}

pub async fn info(
    server: &Arc<RwLock<RedisServer>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let info_arguments = InfoArguments::parse(arguments)?;

    let server_guard = server.read().await;
    let role = server_guard.role.as_string();

    let body = format!(
        "# {}\nrole:{}\n{}_replid:{}\n{}_repl_offset:{}\n",
        info_arguments.section,
        role,
        role,
        server_guard.repl_id,
        role,
        server_guard.repl_offset,
    );

    Ok(CommandResult::Response(
        RespValue::BulkString(body).encode(),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::RwLock;

    use crate::commands::command_handler::CommandResult;
    use crate::server::RedisServer;

    use super::info;

    #[tokio::test]
    async fn test_info_master() {
        let server = RedisServer::new(vec!["rudis-server".to_string()]).unwrap();
        let repl_id = server.repl_id.clone();
        let server = Arc::new(RwLock::new(server));

        let result = info(&server, &["replication".to_string()]).await.unwrap();
        let CommandResult::Response(reply) = result else {
            panic!("expected a response");
        };

        let expected_body = format!(
            "# replication\nrole:master\nmaster_replid:{}\nmaster_repl_offset:0\n",
            repl_id
        );
        assert_eq!(reply, format!("${}\r\n{}\r\n", expected_body.len(), expected_body));
    }

    #[tokio::test]
    async fn test_info_replica_role() {
        let args = vec![
            "rudis-server".to_string(),
            "--replicaof".to_string(),
            "127.0.0.1 6380".to_string(),
        ];
        let server = Arc::new(RwLock::new(RedisServer::new(args).unwrap()));

        let result = info(&server, &[]).await.unwrap();
        let CommandResult::Response(reply) = result else {
            panic!("expected a response");
        };

        assert!(reply.contains("role:slave"));
        assert!(reply.contains("slave_replid:"));
        assert!(reply.contains("slave_repl_offset:0"));
    }
}
