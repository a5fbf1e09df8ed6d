use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;

pub struct TypeArguments {
    key: String,
}

impl TypeArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        let Some(key) = arguments.first() else {
            return Err(CommandError::Arity {
                command: "TYPE",
                minimum: 1,
            });
        };

        Ok(Self { key: key.clone() })
    }
}

pub async fn type_command(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let type_arguments = TypeArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    let key_type = store_guard.key_type(&type_arguments.key);

    Ok(CommandResult::Response(
        RespValue::SimpleString(key_type.to_string()).encode(),
    ))
}
