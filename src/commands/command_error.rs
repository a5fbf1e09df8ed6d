use thiserror::Error;

use crate::key_value_store::StoreError;
use crate::resp::RespValue;
use crate::stream::StreamError;

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("unknown command")]
    UnknownCommand,
    #[error("invalid command frame")]
    InvalidCommandFrame,
    #[error("{command} requires at least {minimum} arguments")]
    Arity {
        command: &'static str,
        minimum: usize,
    },
    #[error("syntax error")]
    SyntaxError,
    #[error("invalid SET expiration")]
    InvalidSetExpiration,
    #[error("invalid data type for key")]
    WrongDataType,
    #[error("value is not an integer or out of range")]
    ValueNotInteger,
    #[error("{0}")]
    Stream(#[from] StreamError),
    #[error("MULTI calls can not be nested")]
    MultiNested,
    #[error("EXEC without MULTI")]
    ExecWithoutMulti,
    #[error("DISCARD without MULTI")]
    DiscardWithoutMulti,
    #[error("invalid XREAD option")]
    InvalidXReadOption,
    #[error("invalid XREAD block duration")]
    InvalidXReadBlockDuration,
    #[error("unsupported CONFIG subcommand")]
    InvalidConfigSubcommand,
    #[error("invalid REPLCONF argument")]
    InvalidReplconfArgument,
    #[error("invalid PSYNC replication id")]
    InvalidPsyncReplicationId,
    #[error("invalid PSYNC offset")]
    InvalidPsyncOffset,
    #[error("invalid WAIT argument")]
    InvalidWaitArgument,
    #[error("WAIT is only valid on a master")]
    WaitOnReplica,
    #[error("write commands not allowed in replica")]
    ReplicaReadOnly,
}

impl CommandError {
    /// The RESP error reply for this error.
    pub fn as_string(&self) -> String {
        let message = match self {
            CommandError::UnknownCommand => "ERR unknown command".to_string(),
            CommandError::InvalidCommandFrame => "ERR invalid command frame".to_string(),
            CommandError::Arity { command, minimum } => {
                format!("ERR {} requires at least {} arguments", command, minimum)
            }
            CommandError::SyntaxError => "ERR syntax error".to_string(),
            CommandError::InvalidSetExpiration => "ERR invalid SET expiration".to_string(),
            CommandError::WrongDataType => "ERR Invalid data type for key".to_string(),
            CommandError::ValueNotInteger => {
                "ERR value is not an integer or out of range".to_string()
            }
            CommandError::Stream(e) => format!("ERR {}", e),
            CommandError::MultiNested => "ERR MULTI calls can not be nested".to_string(),
            CommandError::ExecWithoutMulti => "ERR EXEC without MULTI".to_string(),
            CommandError::DiscardWithoutMulti => "ERR DISCARD without MULTI".to_string(),
            CommandError::InvalidXReadOption => "ERR Invalid XREAD option".to_string(),
            CommandError::InvalidXReadBlockDuration => {
                "ERR Invalid XREAD block duration".to_string()
            }
            CommandError::InvalidConfigSubcommand => {
                "ERR unsupported CONFIG subcommand".to_string()
            }
            CommandError::InvalidReplconfArgument => "ERR Invalid REPLCONF argument".to_string(),
            CommandError::InvalidPsyncReplicationId => {
                "ERR Invalid PSYNC replication id".to_string()
            }
            CommandError::InvalidPsyncOffset => "ERR Invalid PSYNC offset".to_string(),
            CommandError::InvalidWaitArgument => "ERR Invalid WAIT argument".to_string(),
            CommandError::WaitOnReplica => "ERR WAIT is only valid on a master".to_string(),
            CommandError::ReplicaReadOnly => {
                "ERR write commands not allowed in replica".to_string()
            }
        };

        RespValue::Error(message).encode()
    }
}

impl From<StoreError> for CommandError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ValueNotInteger => CommandError::ValueNotInteger,
            StoreError::WrongDataType => CommandError::WrongDataType,
        }
    }
}
