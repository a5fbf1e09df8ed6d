use std::sync::Arc;

use jiff::Timestamp;
use tokio::sync::Mutex;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;
use crate::state::State;
use crate::stream::EntryIdSpec;

pub struct XaddArguments {
    key: String,
    id_spec: EntryIdSpec,
    fields: Vec<(String, String)>,
}

impl XaddArguments {
    /// Parses `XADD key id field value [field value ...]`.
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 4 {
            return Err(CommandError::Arity {
                command: "XADD",
                minimum: 4,
            });
        }

        if arguments[2..].len() % 2 != 0 {
            return Err(CommandError::Arity {
                command: "XADD",
                minimum: 4,
            });
        }

        let id_spec = EntryIdSpec::parse(&arguments[1])?;

        Ok(Self {
            key: arguments[0].clone(),
            id_spec,
            fields: arguments[2..]
                .chunks(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect(),
        })
    }
}

pub async fn xadd(
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let xadd_arguments = XaddArguments::parse(arguments)?;
    let now_ms = Timestamp::now().as_millisecond() as u64;

    let assigned_id = {
        let mut store_guard = store.lock().await;

        let key_existed = store_guard.contains_key(&xadd_arguments.key);
        let stream = store_guard.stream_mut_or_default(&xadd_arguments.key)?;

        match stream.append(xadd_arguments.id_spec, xadd_arguments.fields, now_ms) {
            Ok(id) => id,
            Err(e) => {
                // Do not leave behind a stream key that a rejected first
                // append created.
                if !key_existed {
                    store_guard.remove(&xadd_arguments.key);
                }
                return Err(e.into());
            }
        }
    };

    let mut state_guard = state.lock().await;
    state_guard.notify_xread_subscribers(&xadd_arguments.key);

    Ok(CommandResult::Write(
        RespValue::BulkString(assigned_id.to_string()).encode(),
    ))
}
