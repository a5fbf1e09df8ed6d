use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::commands::{
    command_error::CommandError,
    config_get::{ConfigGetArguments, config_get},
    copy::{CopyArguments, copy},
    del::{DelArguments, del},
    echo::{EchoArguments, echo},
    exists::{ExistsArguments, exists},
    get::{GetArguments, get},
    incr::{IncrArguments, incr},
    info::{InfoArguments, info},
    keys::{KeysArguments, keys},
    ping::{PingArguments, ping},
    psync::{PsyncArguments, psync},
    replconf::{ReplconfArguments, replconf},
    set::{SetArguments, set},
    type_command::{TypeArguments, type_command},
    wait::{WaitArguments, wait},
    xadd::{XaddArguments, xadd},
    xrange::{XrangeArguments, xrange},
    xread::{XreadArguments, xread},
};
use crate::key_value_store::KeyValueStore;
use crate::replication;
use crate::resp::RespValue;
use crate::server::RedisServer;
use crate::state::State;

/// Commands that mutate the keyspace and are propagated to replicas.
const WRITE_COMMANDS: [&str; 5] = ["SET", "DEL", "COPY", "INCR", "XADD"];

/// The outcome of executing one command.
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// An ordinary reply to send back.
    Response(String),
    /// A reply to send back for a command that mutated the keyspace and
    /// must be propagated to replicas.
    Write(String),
    /// Nothing to send (e.g. `REPLCONF ACK` bookkeeping).
    NoResponse,
    /// PSYNC accepted: the connection loop sends the reply, streams the
    /// snapshot and registers the connection as a replica link.
    FullResync { reply: String },
}

/// A parsed command: name, arguments and the raw bytes it arrived as.
///
/// The raw bytes are kept so that propagation to replicas uses exactly what
/// the client sent, making the replication offset byte-exact.
#[derive(Debug, PartialEq, Clone)]
pub struct CommandHandler {
    pub name: String,
    pub arguments: Vec<String>,
    pub raw: Vec<u8>,
}

impl CommandHandler {
    /// Builds a handler from a parsed RESP frame.
    ///
    /// A client command must be an array of bulk strings; the first element
    /// is the command name (case-insensitive), the rest are arguments.
    pub fn new(input: &RespValue, raw: Vec<u8>) -> Result<Self, CommandError> {
        let RespValue::Array(elements) = input else {
            return Err(CommandError::InvalidCommandFrame);
        };

        let name = match elements.first() {
            Some(RespValue::BulkString(s)) => s.to_uppercase(),
            _ => return Err(CommandError::InvalidCommandFrame),
        };

        let mut arguments = Vec::with_capacity(elements.len().saturating_sub(1));

        for element in elements[1..].iter() {
            match element {
                RespValue::BulkString(s) => arguments.push(s.clone()),
                _ => return Err(CommandError::InvalidCommandFrame),
            }
        }

        Ok(Self {
            name,
            arguments,
            raw,
        })
    }

    /// Checks arguments without executing; used when queueing inside MULTI.
    pub fn validate_arguments(&self) -> Option<CommandError> {
        match self.name.as_str() {
            "PING" => PingArguments::parse(&self.arguments).err(),
            "ECHO" => EchoArguments::parse(&self.arguments).err(),
            "GET" => GetArguments::parse(&self.arguments).err(),
            "SET" => SetArguments::parse(&self.arguments).err(),
            "DEL" => DelArguments::parse(&self.arguments).err(),
            "EXISTS" => ExistsArguments::parse(&self.arguments).err(),
            "COPY" => CopyArguments::parse(&self.arguments).err(),
            "INCR" => IncrArguments::parse(&self.arguments).err(),
            "KEYS" => KeysArguments::parse(&self.arguments).err(),
            "TYPE" => TypeArguments::parse(&self.arguments).err(),
            "CONFIG" => ConfigGetArguments::parse(&self.arguments).err(),
            "INFO" => InfoArguments::parse(&self.arguments).err(),
            "XADD" => XaddArguments::parse(&self.arguments).err(),
            "XRANGE" => XrangeArguments::parse(&self.arguments).err(),
            "XREAD" => XreadArguments::parse(&self.arguments).err(),
            "REPLCONF" => ReplconfArguments::parse(&self.arguments).err(),
            "PSYNC" => PsyncArguments::parse(&self.arguments).err(),
            "WAIT" => WaitArguments::parse(&self.arguments).err(),
            _ => Some(CommandError::UnknownCommand),
        }
    }

    pub fn is_write_command(&self) -> bool {
        WRITE_COMMANDS.contains(&self.name.as_str())
    }

    /// Executes a command on behalf of a directly connected client.
    ///
    /// On a master, a successful write is recorded with the replication
    /// engine while the registry guard spans the keyspace mutation, so
    /// replicas receive writes in application order. Error replies and
    /// failed SET conditions never advance the offset.
    pub async fn execute_for_client(
        &self,
        client_address: &str,
        server: &Arc<RwLock<RedisServer>>,
        store: &Arc<Mutex<KeyValueStore>>,
        state: &Arc<Mutex<State>>,
    ) -> Result<CommandResult, CommandError> {
        let propagates = self.is_write_command() && server.read().await.is_master();

        if !propagates {
            return self.execute(client_address, server, store, state).await;
        }

        // Write commands only touch the keyspace, never the server state,
        // so holding the registry guard across execution cannot deadlock.
        // Keeping it across the fan-out keeps the wire order equal to the
        // application order.
        let mut server_guard = server.write().await;
        let result = self.execute(client_address, server, store, state).await?;

        if let CommandResult::Write(_) = &result {
            let writers = replication::record_write(&mut server_guard, &self.raw);
            let failed = replication::write_to_writers(writers, &self.raw).await;
            replication::deregister_replicas(&mut server_guard, &failed);
        }

        Ok(result)
    }

    /// Applies a command received on the replica's upstream connection.
    ///
    /// Produces no reply except the ACK answer to `REPLCONF GETACK *`.
    /// Errors are logged and swallowed: the upstream stream must keep
    /// flowing so the byte offset stays in lockstep with the master.
    pub async fn apply_from_master(
        &self,
        server: &Arc<RwLock<RedisServer>>,
        store: &Arc<Mutex<KeyValueStore>>,
        state: &Arc<Mutex<State>>,
    ) -> Option<String> {
        match self.name.as_str() {
            "PING" => None,
            "REPLCONF" => {
                let is_getack = self
                    .arguments
                    .first()
                    .is_some_and(|arg| arg.eq_ignore_ascii_case("GETACK"));

                if !is_getack {
                    return None;
                }

                let offset = server.read().await.repl_offset;
                Some(
                    RespValue::command(&["REPLCONF", "ACK", &offset.to_string()]).encode(),
                )
            }
            "SET" | "DEL" | "COPY" | "INCR" | "XADD" => {
                if let Err(e) = self.execute("master", server, store, state).await {
                    warn!(command = %self.name, error = %e, "failed to apply command from master");
                }
                None
            }
            other => {
                debug!(command = %other, "ignoring command from master");
                None
            }
        }
    }

    async fn execute(
        &self,
        client_address: &str,
        server: &Arc<RwLock<RedisServer>>,
        store: &Arc<Mutex<KeyValueStore>>,
        state: &Arc<Mutex<State>>,
    ) -> Result<CommandResult, CommandError> {
        match self.name.as_str() {
            "PING" => ping(&self.arguments),
            "ECHO" => echo(&self.arguments),
            "GET" => get(store, &self.arguments).await,
            "SET" => set(store, &self.arguments).await,
            "DEL" => del(store, &self.arguments).await,
            "EXISTS" => exists(store, &self.arguments).await,
            "COPY" => copy(store, &self.arguments).await,
            "INCR" => incr(store, &self.arguments).await,
            "KEYS" => keys(store, &self.arguments).await,
            "TYPE" => type_command(store, &self.arguments).await,
            "CONFIG" => config_get(server, &self.arguments).await,
            "INFO" => info(server, &self.arguments).await,
            "XADD" => xadd(store, state, &self.arguments).await,
            "XRANGE" => xrange(store, &self.arguments).await,
            "XREAD" => xread(client_address, store, state, &self.arguments).await,
            "REPLCONF" => replconf(client_address, server, &self.arguments).await,
            "PSYNC" => psync(server, &self.arguments).await,
            "WAIT" => wait(server, &self.arguments).await,
            _ => Err(CommandError::UnknownCommand),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::resp::RespValue;

    use super::{CommandError, CommandHandler};

    #[test]
    fn test_new_parses_command_frames() {
        let input = RespValue::command(&["set", "fruit", "mango"]);
        let raw = input.encode().into_bytes();

        let handler = CommandHandler::new(&input, raw.clone()).unwrap();
        assert_eq!(handler.name, "SET");
        assert_eq!(
            handler.arguments,
            vec!["fruit".to_string(), "mango".to_string()]
        );
        assert_eq!(handler.raw, raw);
    }

    #[test]
    fn test_new_rejects_invalid_frames() {
        let test_cases = vec![
            RespValue::SimpleString("PING".to_string()),
            RespValue::Array(vec![]),
            RespValue::Array(vec![RespValue::Integer(1)]),
            RespValue::Array(vec![
                RespValue::BulkString("SET".to_string()),
                RespValue::Integer(1),
            ]),
        ];

        for input in test_cases {
            assert_eq!(
                CommandHandler::new(&input, Vec::new()),
                Err(CommandError::InvalidCommandFrame),
                "parsing {:?}",
                input
            );
        }
    }

    #[test]
    fn test_validate_arguments() {
        let valid = CommandHandler {
            name: "GET".to_string(),
            arguments: vec!["key".to_string()],
            raw: Vec::new(),
        };
        assert!(valid.validate_arguments().is_none());

        let missing_args = CommandHandler {
            name: "GET".to_string(),
            arguments: vec![],
            raw: Vec::new(),
        };
        assert_eq!(
            missing_args.validate_arguments(),
            Some(CommandError::Arity {
                command: "GET",
                minimum: 1
            })
        );

        let unknown = CommandHandler {
            name: "FLUSHALL".to_string(),
            arguments: vec![],
            raw: Vec::new(),
        };
        assert_eq!(
            unknown.validate_arguments(),
            Some(CommandError::UnknownCommand)
        );
    }
}
