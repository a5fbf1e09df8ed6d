use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;

pub struct CopyArguments {
    source: String,
    destination: String,
    replace: bool,
}

impl CopyArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 2 {
            return Err(CommandError::Arity {
                command: "COPY",
                minimum: 2,
            });
        }

        let mut replace = false;
        for option in &arguments[2..] {
            if option.eq_ignore_ascii_case("REPLACE") {
                replace = true;
            } else {
                return Err(CommandError::SyntaxError);
            }
        }

        Ok(Self {
            source: arguments[0].clone(),
            destination: arguments[1].clone(),
            replace,
        })
    }
}

pub async fn copy(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let copy_arguments = CopyArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    let copied = store_guard.copy(
        &copy_arguments.source,
        &copy_arguments.destination,
        copy_arguments.replace,
    );

    if copied {
        Ok(CommandResult::Write(RespValue::Integer(1).encode()))
    } else {
        Ok(CommandResult::Response(RespValue::Integer(0).encode()))
    }
}
