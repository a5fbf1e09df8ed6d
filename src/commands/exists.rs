use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;

pub struct ExistsArguments {
    keys: Vec<String>,
}

impl ExistsArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.is_empty() {
            return Err(CommandError::Arity {
                command: "EXISTS",
                minimum: 1,
            });
        }

        Ok(Self {
            keys: arguments.to_vec(),
        })
    }
}

pub async fn exists(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let exists_arguments = ExistsArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    let count = store_guard.exists(&exists_arguments.keys);

    Ok(CommandResult::Response(
        RespValue::Integer(count as i64).encode(),
    ))
}
