use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;

pub struct DelArguments {
    keys: Vec<String>,
}

impl DelArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.is_empty() {
            return Err(CommandError::Arity {
                command: "DEL",
                minimum: 1,
            });
        }

        Ok(Self {
            keys: arguments.to_vec(),
        })
    }
}

pub async fn del(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let del_arguments = DelArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    let removed = store_guard.delete(&del_arguments.keys);

    Ok(CommandResult::Write(
        RespValue::Integer(removed as i64).encode(),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use crate::commands::command_error::CommandError;
    use crate::commands::command_handler::CommandResult;
    use crate::key_value_store::KeyValueStore;

    use super::del;

    #[tokio::test]
    async fn test_del() {
        let mut store = KeyValueStore::new();
        store.set("a".to_string(), "1".to_string());
        store.set("b".to_string(), "2".to_string());
        let store = Arc::new(Mutex::new(store));

        assert_eq!(
            del(
                &store,
                &["a".to_string(), "b".to_string(), "missing".to_string()]
            )
            .await,
            Ok(CommandResult::Write(":2\r\n".to_string()))
        );
        assert_eq!(
            del(&store, &["a".to_string()]).await,
            Ok(CommandResult::Write(":0\r\n".to_string()))
        );
        assert_eq!(
            del(&store, &[]).await,
            Err(CommandError::Arity {
                command: "DEL",
                minimum: 1
            })
        );
    }
}
