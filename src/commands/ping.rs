use crate::commands::{command_error::CommandError, command_handler::CommandResult};
use crate::resp::RespValue;

pub struct PingArguments {
    message: Option<String>,
}

impl PingArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        Ok(Self {
            message: arguments.first().cloned(),
        })
    }
}

pub fn ping(arguments: &[String]) -> Result<CommandResult, CommandError> {
    let ping_arguments = PingArguments::parse(arguments)?;

    let reply = match ping_arguments.message {
        Some(message) => RespValue::BulkString(message),
        None => RespValue::SimpleString("PONG".to_string()),
    };

    Ok(CommandResult::Response(reply.encode()))
}

#[cfg(test)]
mod tests {
    use crate::commands::command_handler::CommandResult;

    use super::ping;

    #[test]
    fn test_ping() {
        assert_eq!(
            ping(&[]),
            Ok(CommandResult::Response("+PONG\r\n".to_string()))
        );
        assert_eq!(
            ping(&["hello".to_string()]),
            Ok(CommandResult::Response("$5\r\nhello\r\n".to_string()))
        );
    }
}
