//! Redis Serialization Protocol (RESP-2) framing.
//!
//! The parser is incremental: it consumes exactly one complete top-level
//! frame from the read buffer and reports how many bytes it used, so the
//! connection loop can keep partial frames around and process pipelined
//! commands one at a time.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RespError {
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unknown RESP frame type: {0}")]
    UnknownFrameType(char),
    #[error("failed to parse integer")]
    FailedToParseInteger,
    #[error("invalid bulk string")]
    InvalidBulkString,
    #[error("invalid array")]
    InvalidArray,
}

#[derive(Debug, PartialEq, Clone)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(String),
    NullBulkString,
    Array(Vec<RespValue>),
    NullArray,
}

impl RespValue {
    /// Encodes the value into its RESP wire representation.
    pub fn encode(&self) -> String {
        match self {
            RespValue::SimpleString(s) => format!("+{}\r\n", s),
            RespValue::Error(s) => format!("-{}\r\n", s),
            RespValue::Integer(i) => format!(":{}\r\n", i),
            RespValue::BulkString(s) => format!("${}\r\n{}\r\n", s.len(), s),
            RespValue::NullBulkString => "$-1\r\n".to_string(),
            RespValue::Array(elements) => {
                let mut encoded = format!("*{}\r\n", elements.len());
                for element in elements {
                    encoded.push_str(&element.encode());
                }
                encoded
            }
            RespValue::NullArray => "*-1\r\n".to_string(),
        }
    }

    /// Builds the canonical command frame: an array of bulk strings.
    pub fn command(parts: &[&str]) -> RespValue {
        RespValue::Array(
            parts
                .iter()
                .map(|part| RespValue::BulkString(part.to_string()))
                .collect(),
        )
    }

    /// Parses one complete frame from the front of `buffer`.
    ///
    /// Returns `Ok(Some((value, consumed)))` when a full frame is available,
    /// `Ok(None)` when more bytes are needed (nothing is consumed), and an
    /// error when the buffer holds bytes that can never become a valid frame.
    pub fn parse(buffer: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        Self::parse_at(buffer, 0)
    }

    fn parse_at(buffer: &[u8], start: usize) -> Result<Option<(RespValue, usize)>, RespError> {
        let Some((line, after_line)) = read_line(buffer, start)? else {
            return Ok(None);
        };

        let Some(prefix) = line.chars().next() else {
            return Err(RespError::UnknownFrameType('\0'));
        };
        let content = &line[prefix.len_utf8()..];

        match prefix {
            '+' => Ok(Some((
                RespValue::SimpleString(content.to_string()),
                after_line,
            ))),
            '-' => Ok(Some((RespValue::Error(content.to_string()), after_line))),
            ':' => {
                let value = content
                    .parse::<i64>()
                    .map_err(|_| RespError::FailedToParseInteger)?;
                Ok(Some((RespValue::Integer(value), after_line)))
            }
            '$' => {
                if content == "-1" {
                    return Ok(Some((RespValue::NullBulkString, after_line)));
                }

                let length = content
                    .parse::<usize>()
                    .map_err(|_| RespError::InvalidBulkString)?;

                if buffer.len() < after_line + length + 2 {
                    return Ok(None);
                }

                let data = &buffer[after_line..after_line + length];
                if &buffer[after_line + length..after_line + length + 2] != b"\r\n" {
                    return Err(RespError::InvalidBulkString);
                }

                let content = str::from_utf8(data).map_err(|_| RespError::InvalidUtf8)?;
                Ok(Some((
                    RespValue::BulkString(content.to_string()),
                    after_line + length + 2,
                )))
            }
            '*' => {
                if content == "-1" {
                    return Ok(Some((RespValue::NullArray, after_line)));
                }

                let length = content
                    .parse::<usize>()
                    .map_err(|_| RespError::InvalidArray)?;

                let mut elements = Vec::with_capacity(length);
                let mut cursor = after_line;

                for _ in 0..length {
                    let Some((element, next_cursor)) = Self::parse_at(buffer, cursor)? else {
                        return Ok(None);
                    };
                    elements.push(element);
                    cursor = next_cursor;
                }

                Ok(Some((RespValue::Array(elements), cursor)))
            }
            other => Err(RespError::UnknownFrameType(other)),
        }
    }
}

/// Parses the RDB payload frame a master sends after `+FULLRESYNC`.
///
/// The payload is framed like a bulk string but carries no trailing CRLF:
/// `$<n>\r\n<n bytes>`.
pub fn parse_rdb_payload(buffer: &[u8]) -> Result<Option<(Vec<u8>, usize)>, RespError> {
    let Some((line, after_line)) = read_line(buffer, 0)? else {
        return Ok(None);
    };

    let Some(declared_length) = line.strip_prefix('$') else {
        return Err(RespError::InvalidBulkString);
    };

    let length = declared_length
        .parse::<usize>()
        .map_err(|_| RespError::InvalidBulkString)?;

    if buffer.len() < after_line + length {
        return Ok(None);
    }

    Ok(Some((
        buffer[after_line..after_line + length].to_vec(),
        after_line + length,
    )))
}

/// Reads one CRLF-terminated line starting at `start`.
///
/// Returns the line without its terminator and the offset just past it,
/// or `None` when the terminator has not arrived yet.
fn read_line(buffer: &[u8], start: usize) -> Result<Option<(&str, usize)>, RespError> {
    let search_area = &buffer[start.min(buffer.len())..];

    let Some(position) = search_area.windows(2).position(|window| window == b"\r\n") else {
        return Ok(None);
    };

    let line = str::from_utf8(&search_area[..position]).map_err(|_| RespError::InvalidUtf8)?;

    Ok(Some((line, start + position + 2)))
}

#[cfg(test)]
mod tests {
    use super::{RespError, RespValue, parse_rdb_payload};

    #[test]
    fn test_encode() {
        let test_cases = vec![
            (RespValue::SimpleString("OK".to_string()), "+OK\r\n"),
            (
                RespValue::Error("ERR unknown command".to_string()),
                "-ERR unknown command\r\n",
            ),
            (RespValue::Integer(42), ":42\r\n"),
            (RespValue::Integer(-7), ":-7\r\n"),
            (RespValue::BulkString("hello".to_string()), "$5\r\nhello\r\n"),
            (RespValue::BulkString("".to_string()), "$0\r\n\r\n"),
            (RespValue::NullBulkString, "$-1\r\n"),
            (RespValue::NullArray, "*-1\r\n"),
            (RespValue::Array(vec![]), "*0\r\n"),
            (
                RespValue::command(&["SET", "key", "value"]),
                "*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n",
            ),
            (
                RespValue::Array(vec![
                    RespValue::Array(vec![RespValue::BulkString("a".to_string())]),
                    RespValue::Integer(1),
                ]),
                "*2\r\n*1\r\n$1\r\na\r\n:1\r\n",
            ),
        ];

        for (value, expected) in test_cases {
            assert_eq!(value.encode(), expected, "encoding {:?}", value);
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        let test_cases = vec![
            RespValue::SimpleString("PONG".to_string()),
            RespValue::Error("ERR boom".to_string()),
            RespValue::Integer(1024),
            RespValue::BulkString("strawberry".to_string()),
            RespValue::NullBulkString,
            RespValue::NullArray,
            RespValue::command(&["XADD", "fruits", "1-1", "name", "apple"]),
            RespValue::Array(vec![RespValue::Array(vec![
                RespValue::BulkString("1-1".to_string()),
                RespValue::Array(vec![
                    RespValue::BulkString("name".to_string()),
                    RespValue::BulkString("apple".to_string()),
                ]),
            ])]),
        ];

        for value in test_cases {
            let encoded = value.encode();
            let parsed = RespValue::parse(encoded.as_bytes()).unwrap();
            assert_eq!(
                parsed,
                Some((value.clone(), encoded.len())),
                "round-tripping {:?}",
                value
            );
        }
    }

    #[test]
    fn test_parse_incomplete_frames() {
        let test_cases: Vec<&[u8]> = vec![
            b"",
            b"+PON",
            b"$5\r\nhel",
            b"$5\r\nhello",
            b"*2\r\n$4\r\nECHO\r\n",
            b"*2\r\n$4\r\nECHO\r\n$3\r\nhi",
        ];

        for input in test_cases {
            assert_eq!(
                RespValue::parse(input),
                Ok(None),
                "parsing incomplete input {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_parse_pipelined_frames() {
        let input = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n";

        let (first, consumed) = RespValue::parse(input).unwrap().unwrap();
        assert_eq!(first, RespValue::command(&["SET", "k", "v"]));
        assert_eq!(consumed, 27);

        let (second, consumed) = RespValue::parse(&input[consumed..]).unwrap().unwrap();
        assert_eq!(second, RespValue::command(&["GET", "k"]));
        assert_eq!(consumed, 20);
    }

    #[test]
    fn test_parse_errors() {
        let test_cases: Vec<(&[u8], RespError)> = vec![
            (b"!bad\r\n", RespError::UnknownFrameType('!')),
            (b":abc\r\n", RespError::FailedToParseInteger),
            (b"$x\r\n", RespError::InvalidBulkString),
            (b"$3\r\nabcXXtrailing\r\n", RespError::InvalidBulkString),
            (b"*x\r\n", RespError::InvalidArray),
        ];

        for (input, expected) in test_cases {
            assert_eq!(
                RespValue::parse(input),
                Err(expected),
                "parsing invalid input {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_parse_rdb_payload() {
        let mut input = b"$5\r\nREDIS".to_vec();
        input.extend_from_slice(b"*1\r\n$4\r\nPING\r\n");

        let (payload, consumed) = parse_rdb_payload(&input).unwrap().unwrap();
        assert_eq!(payload, b"REDIS");
        assert_eq!(consumed, 9);
        assert_eq!(&input[consumed..], b"*1\r\n$4\r\nPING\r\n");

        assert_eq!(parse_rdb_payload(b"$10\r\nREDIS"), Ok(None));
        assert_eq!(
            parse_rdb_payload(b"+FULLRESYNC\r\n"),
            Err(RespError::InvalidBulkString)
        );
    }
}
