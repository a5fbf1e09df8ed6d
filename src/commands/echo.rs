use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::resp::RespValue;

pub struct EchoArguments {
    message: String,
}

impl EchoArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        let Some(message) = arguments.first() else {
            return Err(CommandError::Arity {
                command: "ECHO",
                minimum: 1,
            });
        };

        Ok(Self {
            message: message.clone(),
        })
    }
}

pub fn echo(arguments: &[String]) -> Result<CommandResult, CommandError> {
    let echo_arguments = EchoArguments::parse(arguments)?;

    Ok(CommandResult::Response(
        RespValue::BulkString(echo_arguments.message).encode(),
    ))
}

#[cfg(test)]
mod tests {
    use crate::commands::command_handler::CommandResult;
    use crate::commands::command_error::CommandError;

    use super::echo;

    #[test]
    fn test_echo() {
        assert_eq!(
            echo(&["banana".to_string()]),
            Ok(CommandResult::Response("$6\r\nbanana\r\n".to_string()))
        );
        assert_eq!(
            echo(&[]),
            Err(CommandError::Arity {
                command: "ECHO",
                minimum: 1
            })
        );
    }
}
