use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;

pub struct GetArguments {
    key: String,
}

impl GetArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        let Some(key) = arguments.first() else {
            return Err(CommandError::Arity {
                command: "GET",
                minimum: 1,
            });
        };

        Ok(Self { key: key.clone() })
    }
}

pub async fn get(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let get_arguments = GetArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let reply = match store_guard.get_string(&get_arguments.key)? {
        Some(value) => RespValue::BulkString(value),
        None => RespValue::NullBulkString,
    };

    Ok(CommandResult::Response(reply.encode()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use crate::commands::command_error::CommandError;
    use crate::commands::command_handler::CommandResult;
    use crate::key_value_store::KeyValueStore;

    use super::get;

    #[tokio::test]
    async fn test_get() {
        let mut store = KeyValueStore::new();
        store.set("fruit".to_string(), "mango".to_string());
        store.stream_mut_or_default("events").unwrap();
        let store = Arc::new(Mutex::new(store));

        assert_eq!(
            get(&store, &["fruit".to_string()]).await,
            Ok(CommandResult::Response("$5\r\nmango\r\n".to_string()))
        );
        assert_eq!(
            get(&store, &["missing".to_string()]).await,
            Ok(CommandResult::Response("$-1\r\n".to_string()))
        );
        assert_eq!(
            get(&store, &["events".to_string()]).await,
            Err(CommandError::WrongDataType)
        );
        assert_eq!(
            get(&store, &[]).await,
            Err(CommandError::Arity {
                command: "GET",
                minimum: 1
            })
        );
    }
}
