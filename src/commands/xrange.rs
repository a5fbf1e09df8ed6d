use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::{
    command_error::CommandError, command_handler::CommandResult, stream_utils::entries_to_resp,
};
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;
use crate::stream::StreamId;

pub struct XrangeArguments {
    key: String,
    start: StreamId,
    end: StreamId,
}

impl XrangeArguments {
    /// Parses `XRANGE key start end` where the bounds accept `-`, `+`,
    /// `<ms>` and `<ms>-<seq>`.
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 3 {
            return Err(CommandError::Arity {
                command: "XRANGE",
                minimum: 3,
            });
        }

        Ok(Self {
            key: arguments[0].clone(),
            start: StreamId::parse_range_start(&arguments[1])?,
            end: StreamId::parse_range_end(&arguments[2])?,
        })
    }
}

pub async fn xrange(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let xrange_arguments = XrangeArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let reply = match store_guard.stream(&xrange_arguments.key)? {
        Some(stream) => {
            entries_to_resp(stream.range(xrange_arguments.start, xrange_arguments.end))
        }
        None => RespValue::Array(Vec::new()),
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
    use crate::stream::{EntryIdSpec, StreamId};

    use super::xrange;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    async fn store_with_entries() -> Arc<Mutex<KeyValueStore>> {
        let mut store = KeyValueStore::new();
        let stream = store.stream_mut_or_default("s").unwrap();

        for (ms, seq, value) in [(1, 1, "a"), (2, 0, "b"), (3, 0, "c")] {
            stream
                .append(
                    EntryIdSpec::Explicit(StreamId::new(ms, seq)),
                    vec![("v".to_string(), value.to_string())],
                    0,
                )
                .unwrap();
        }

        Arc::new(Mutex::new(store))
    }

    #[tokio::test]
    async fn test_xrange_full_and_partial_ranges() {
        let store = store_with_entries().await;

        let full = xrange(&store, &args(&["s", "-", "+"])).await.unwrap();
        let CommandResult::Response(reply) = full else {
            panic!("expected a response");
        };
        assert!(reply.starts_with("*3\r\n"));

        // Closed interval: both endpoints included.
        assert_eq!(
            xrange(&store, &args(&["s", "1-1", "2-0"])).await,
            Ok(CommandResult::Response(
                "*2\r\n*2\r\n$3\r\n1-1\r\n*2\r\n$1\r\nv\r\n$1\r\na\r\n*2\r\n$3\r\n2-0\r\n*2\r\n$1\r\nv\r\n$1\r\nb\r\n"
                    .to_string()
            ))
        );

        // A bare millisecond covers the whole millisecond.
        assert_eq!(
            xrange(&store, &args(&["s", "2", "2"])).await,
            Ok(CommandResult::Response(
                "*1\r\n*2\r\n$3\r\n2-0\r\n*2\r\n$1\r\nv\r\n$1\r\nb\r\n".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_xrange_missing_key_and_errors() {
        let store = store_with_entries().await;

        assert_eq!(
            xrange(&store, &args(&["missing", "-", "+"])).await,
            Ok(CommandResult::Response("*0\r\n".to_string()))
        );
        assert_eq!(
            xrange(&store, &args(&["s", "-"])).await,
            Err(CommandError::Arity {
                command: "XRANGE",
                minimum: 3
            })
        );
        assert!(xrange(&store, &args(&["s", "bogus-id-x", "+"])).await.is_err());
    }
}
