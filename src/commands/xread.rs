use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use crate::commands::{
    command_error::CommandError, command_handler::CommandResult, stream_utils::entries_to_resp,
};
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;
use crate::state::{State, XreadSubscriber};
use crate::stream::{StreamEntry, StreamId};

pub struct XreadArguments {
    block_ms: Option<u64>,
    keys: Vec<String>,
    ids: Vec<String>,
}

impl XreadArguments {
    /// Parses `XREAD [BLOCK ms] STREAMS key [key ...] id [id ...]`.
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 3 {
            return Err(CommandError::Arity {
                command: "XREAD",
                minimum: 3,
            });
        }

        let (block_ms, streams_index) = if arguments[0].eq_ignore_ascii_case("BLOCK") {
            let duration = arguments[1]
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidXReadBlockDuration)?;
            (Some(duration), 2)
        } else {
            (None, 0)
        };

        let Some(streams_keyword) = arguments.get(streams_index) else {
            return Err(CommandError::InvalidXReadOption);
        };
        if !streams_keyword.eq_ignore_ascii_case("STREAMS") {
            return Err(CommandError::InvalidXReadOption);
        }

        let data = &arguments[streams_index + 1..];
        if data.is_empty() || data.len() % 2 != 0 {
            return Err(CommandError::Arity {
                command: "XREAD",
                minimum: 3,
            });
        }

        let half = data.len() / 2;

        Ok(Self {
            block_ms,
            keys: data[..half].to_vec(),
            ids: data[half..].to_vec(),
        })
    }
}

pub async fn xread(
    client_address: &str,
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let xread_arguments = XreadArguments::parse(arguments)?;

    // The `$` sentinel resolves to each key's current last id at argument
    // time, so a blocking read only sees entries added afterwards.
    let pairs = {
        let mut store_guard = store.lock().await;
        let mut pairs = Vec::with_capacity(xread_arguments.keys.len());

        for (key, id_argument) in xread_arguments.keys.iter().zip(&xread_arguments.ids) {
            let id = if id_argument == "$" {
                store_guard.last_stream_id(key)?
            } else {
                StreamId::parse_read_start(id_argument)?
            };

            pairs.push((key.clone(), id));
        }

        pairs
    };

    let results = read_streams(store, &pairs).await?;
    if !results.is_empty() {
        return Ok(CommandResult::Response(encode_results(&results)));
    }

    let Some(block_ms) = xread_arguments.block_ms else {
        return Ok(CommandResult::Response(RespValue::Array(Vec::new()).encode()));
    };

    let (sender, mut receiver) = mpsc::channel(32);

    {
        let mut state_guard = state.lock().await;
        for (key, _) in &pairs {
            state_guard.add_xread_subscriber(
                key.clone(),
                XreadSubscriber {
                    client_address: client_address.to_string(),
                    sender: sender.clone(),
                },
            );
        }
    }

    let result = block_until_data(store, &pairs, &mut receiver, block_ms).await;

    {
        let mut state_guard = state.lock().await;
        state_guard.remove_xread_subscribers(&xread_arguments.keys, client_address);
    }

    result
}

/// Waits for an XADD wakeup on any requested key, re-reading after each one
/// until data appears or the deadline elapses. `block_ms == 0` blocks
/// indefinitely.
async fn block_until_data(
    store: &Arc<Mutex<KeyValueStore>>,
    pairs: &[(String, StreamId)],
    receiver: &mut mpsc::Receiver<()>,
    block_ms: u64,
) -> Result<CommandResult, CommandError> {
    let deadline = match block_ms {
        0 => None,
        duration => Some(Instant::now() + Duration::from_millis(duration)),
    };

    loop {
        // A writer may have slipped in between the initial read and the
        // subscription, so check before waiting.
        let results = read_streams(store, pairs).await?;
        if !results.is_empty() {
            return Ok(CommandResult::Response(encode_results(&results)));
        }

        let woken = match deadline {
            None => receiver.recv().await,
            Some(deadline) => match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Ok(message) => message,
                Err(_) => None,
            },
        };

        if woken.is_none() {
            return Ok(CommandResult::Response(RespValue::NullBulkString.encode()));
        }
    }
}

/// Entries strictly after the supplied id for each requested key, in the
/// caller-supplied key order. Keys with no matching entries are omitted.
async fn read_streams(
    store: &Arc<Mutex<KeyValueStore>>,
    pairs: &[(String, StreamId)],
) -> Result<Vec<(String, Vec<StreamEntry>)>, CommandError> {
    let mut store_guard = store.lock().await;
    let mut results = Vec::new();

    for (key, id) in pairs {
        let Some(stream) = store_guard.stream(key)? else {
            continue;
        };

        let matching = stream.entries_after(*id);
        if !matching.is_empty() {
            results.push((key.clone(), matching.to_vec()));
        }
    }

    Ok(results)
}

fn encode_results(results: &[(String, Vec<StreamEntry>)]) -> String {
    RespValue::Array(
        results
            .iter()
            .map(|(key, entries)| {
                RespValue::Array(vec![
                    RespValue::BulkString(key.clone()),
                    entries_to_resp(entries),
                ])
            })
            .collect(),
    )
    .encode()
}
