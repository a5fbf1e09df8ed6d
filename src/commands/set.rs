use std::sync::Arc;

use jiff::Timestamp;
use tokio::sync::Mutex;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::key_value_store::{KeyValueStore, timestamp_after_ms};
use crate::resp::RespValue;

#[derive(Debug, PartialEq, Clone, Copy)]
enum SetCondition {
    /// NX: only set the key if it does not already exist.
    IfAbsent,
    /// XX: only set the key if it already exists.
    IfPresent,
}

pub struct SetArguments {
    key: String,
    value: String,
    expiry_ms: Option<u64>,
    condition: Option<SetCondition>,
}

impl SetArguments {
    /// Parses `SET key value [EX seconds | PX milliseconds] [NX|XX]`.
    ///
    /// EX and PX are mutually exclusive; options are case-insensitive.
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 2 {
            return Err(CommandError::Arity {
                command: "SET",
                minimum: 2,
            });
        }

        let mut expiry_ms: Option<u64> = None;
        let mut condition: Option<SetCondition> = None;

        let mut index = 2;
        while index < arguments.len() {
            match arguments[index].to_uppercase().as_str() {
                "EX" => {
                    if expiry_ms.is_some() {
                        return Err(CommandError::SyntaxError);
                    }

                    let seconds = parse_expiry_value(arguments.get(index + 1))?;
                    expiry_ms = Some(seconds * 1000);
                    index += 2;
                }
                "PX" => {
                    if expiry_ms.is_some() {
                        return Err(CommandError::SyntaxError);
                    }

                    expiry_ms = Some(parse_expiry_value(arguments.get(index + 1))?);
                    index += 2;
                }
                "NX" => {
                    condition = Some(SetCondition::IfAbsent);
                    index += 1;
                }
                "XX" => {
                    condition = Some(SetCondition::IfPresent);
                    index += 1;
                }
                _ => return Err(CommandError::SyntaxError),
            }
        }

        Ok(Self {
            key: arguments[0].clone(),
            value: arguments[1].clone(),
            expiry_ms,
            condition,
        })
    }

    fn expires_at(&self) -> Option<Timestamp> {
        self.expiry_ms.map(timestamp_after_ms)
    }
}

fn parse_expiry_value(argument: Option<&String>) -> Result<u64, CommandError> {
    argument
        .ok_or(CommandError::InvalidSetExpiration)?
        .parse::<u64>()
        .map_err(|_| CommandError::InvalidSetExpiration)
}

pub async fn set(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let set_arguments = SetArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let key_exists = store_guard.contains_key(&set_arguments.key);
    let condition_failed = match set_arguments.condition {
        Some(SetCondition::IfAbsent) => key_exists,
        Some(SetCondition::IfPresent) => !key_exists,
        None => false,
    };

    if condition_failed {
        return Ok(CommandResult::Response(RespValue::NullBulkString.encode()));
    }

    match set_arguments.expires_at() {
        Some(expires_at) => {
            store_guard.set_with_expiry(set_arguments.key, set_arguments.value, expires_at)
        }
        None => store_guard.set(set_arguments.key, set_arguments.value),
    }

    Ok(CommandResult::Write(
        RespValue::SimpleString("OK".to_string()).encode(),
    ))
}
