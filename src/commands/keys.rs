use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;

pub struct KeysArguments {
    pattern: String,
}

impl KeysArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        let Some(pattern) = arguments.first() else {
            return Err(CommandError::Arity {
                command: "KEYS",
                minimum: 1,
            });
        };

        Ok(Self {
            pattern: pattern.clone(),
        })
    }
}

pub async fn keys(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let keys_arguments = KeysArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    let matched = store_guard.keys_matching(&keys_arguments.pattern);

    let reply = RespValue::Array(matched.into_iter().map(RespValue::BulkString).collect());

    Ok(CommandResult::Response(reply.encode()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use crate::commands::command_handler::CommandResult;
    use crate::key_value_store::KeyValueStore;

    use super::keys;

    #[tokio::test]
    async fn test_keys() {
        let mut store = KeyValueStore::new();
        store.set("apple".to_string(), "1".to_string());
        let store = Arc::new(Mutex::new(store));

        assert_eq!(
            keys(&store, &["a*".to_string()]).await,
            Ok(CommandResult::Response("*1\r\n$5\r\napple\r\n".to_string()))
        );
        assert_eq!(
            keys(&store, &["z*".to_string()]).await,
            Ok(CommandResult::Response("*0\r\n".to_string()))
        );
    }
}
