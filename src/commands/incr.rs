use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;

pub struct IncrArguments {
    key: String,
}

impl IncrArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        let Some(key) = arguments.first() else {
            return Err(CommandError::Arity {
                command: "INCR",
                minimum: 1,
            });
        };

        Ok(Self { key: key.clone() })
    }
}

pub async fn incr(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let incr_arguments = IncrArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    let new_value = store_guard.increment(&incr_arguments.key)?;

    Ok(CommandResult::Write(
        RespValue::Integer(new_value).encode(),
    ))
}
