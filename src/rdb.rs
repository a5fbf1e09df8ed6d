//! RDB snapshot bootstrap.
//!
//! The decoder understands the subset of the RDB format the server needs at
//! startup: string key-value pairs with optional seconds/milliseconds expiry
//! opcodes, with metadata and database-selection opcodes skipped. It yields
//! typed [`RdbRecord`]s; the bootstrap adapter loads the non-expired ones
//! into the keyspace before the listener starts.

use std::path::Path;
use std::sync::Arc;

use jiff::Timestamp;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::key_value_store::{DataType, KeyValueStore, Value};

/// A canonical empty RDB snapshot, sent to replicas requesting a full
/// resync when no snapshot file is available.
pub const EMPTY_RDB: [u8; 88] = [
    0x52, 0x45, 0x44, 0x49, 0x53, 0x30, 0x30, 0x31, 0x31, 0xfa, 0x09, 0x72, 0x65, 0x64, 0x69,
    0x73, 0x2d, 0x76, 0x65, 0x72, 0x05, 0x37, 0x2e, 0x32, 0x2e, 0x30, 0xfa, 0x0a, 0x72, 0x65,
    0x64, 0x69, 0x73, 0x2d, 0x62, 0x69, 0x74, 0x73, 0xc0, 0x40, 0xfa, 0x05, 0x63, 0x74, 0x69,
    0x6d, 0x65, 0xc2, 0x6d, 0x08, 0xbc, 0x65, 0xfa, 0x08, 0x75, 0x73, 0x65, 0x64, 0x2d, 0x6d,
    0x65, 0x6d, 0xc2, 0xb0, 0xc4, 0x10, 0x00, 0xfa, 0x08, 0x61, 0x6f, 0x66, 0x2d, 0x62, 0x61,
    0x73, 0x65, 0xc0, 0x00, 0xff, 0xf0, 0x6e, 0x3b, 0xfe, 0xc0, 0xff, 0x5a, 0xa2,
];

#[derive(Error, Debug, PartialEq)]
pub enum RdbError {
    #[error("missing RDB magic header")]
    InvalidMagic,
    #[error("unexpected end of RDB data")]
    UnexpectedEof,
    #[error("unsupported RDB encoding: {0:#04x}")]
    UnsupportedEncoding(u8),
    #[error("invalid UTF-8 in RDB string")]
    InvalidUtf8,
    #[error("invalid expiry timestamp")]
    InvalidExpiry,
}

/// One decoded key-value record.
#[derive(Debug, Clone, PartialEq)]
pub struct RdbRecord {
    pub key: String,
    pub value: String,
    pub expires_at: Option<Timestamp>,
}

/// Decodes every key-value record from an RDB snapshot.
pub fn decode(bytes: &[u8]) -> Result<Vec<RdbRecord>, RdbError> {
    let magic = take(bytes, 0, 9)?;
    if &magic[..5] != b"REDIS" {
        return Err(RdbError::InvalidMagic);
    }

    let mut cursor = 9;
    let mut records = Vec::new();
    let mut pending_expiry: Option<Timestamp> = None;

    while cursor < bytes.len() {
        let opcode = take(bytes, cursor, 1)?[0];
        cursor += 1;

        match opcode {
            // Auxiliary metadata: two strings, ignored.
            0xFA => {
                let (_, read) = parse_string(bytes, cursor)?;
                cursor += read;
                let (_, read) = parse_string(bytes, cursor)?;
                cursor += read;
            }
            // Database selector.
            0xFE => {
                let (_, read) = parse_length(bytes, cursor)?;
                cursor += read;
            }
            // Hash table size hints.
            0xFB => {
                let (_, read) = parse_length(bytes, cursor)?;
                cursor += read;
                let (_, read) = parse_length(bytes, cursor)?;
                cursor += read;
            }
            // Expiry in seconds, applies to the next key-value pair.
            0xFD => {
                let raw = take(bytes, cursor, 4)?;
                cursor += 4;
                let seconds = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                pending_expiry = Some(
                    Timestamp::from_second(seconds as i64).map_err(|_| RdbError::InvalidExpiry)?,
                );
            }
            // Expiry in milliseconds.
            0xFC => {
                let raw = take(bytes, cursor, 8)?;
                cursor += 8;
                let milliseconds = u64::from_le_bytes([
                    raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
                ]);
                pending_expiry = Some(
                    Timestamp::from_millisecond(milliseconds as i64)
                        .map_err(|_| RdbError::InvalidExpiry)?,
                );
            }
            // End of file, followed by a CRC64 checksum we do not verify.
            0xFF => break,
            // String value type.
            0x00 => {
                let (key, read) = parse_string(bytes, cursor)?;
                cursor += read;
                let (value, read) = parse_string(bytes, cursor)?;
                cursor += read;

                records.push(RdbRecord {
                    key,
                    value,
                    expires_at: pending_expiry.take(),
                });
            }
            other => return Err(RdbError::UnsupportedEncoding(other)),
        }
    }

    Ok(records)
}

/// Loads the snapshot at `<dir>/<filename>` into the keyspace, skipping
/// records that have already expired. A missing file leaves the keyspace
/// empty, which is the normal cold-start path.
pub async fn bootstrap(store: &Arc<Mutex<KeyValueStore>>, dir: &str, filename: &str) {
    if filename.is_empty() {
        return;
    }

    let path = Path::new(dir).join(filename);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            info!(path = %path.display(), error = %e, "no RDB snapshot loaded");
            return;
        }
    };

    let records = match decode(&bytes) {
        Ok(records) => records,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to decode RDB snapshot");
            return;
        }
    };

    let now = Timestamp::now();
    let mut store_guard = store.lock().await;
    let mut loaded = 0;

    for record in records {
        if record.expires_at.is_some_and(|expires_at| now >= expires_at) {
            debug!(key = %record.key, "skipping expired RDB record");
            continue;
        }

        store_guard.insert(
            record.key,
            Value {
                data: DataType::String(record.value),
                expires_at: record.expires_at,
            },
        );
        loaded += 1;
    }

    info!(path = %path.display(), keys = loaded, "loaded RDB snapshot");
}

/// The bulk-framed snapshot payload sent to a replica after `+FULLRESYNC`:
/// `$<n>\r\n<n bytes>` with no trailing CRLF. Falls back to the embedded
/// empty snapshot when the file cannot be read.
pub async fn snapshot_payload(dir: &str, filename: &str) -> Vec<u8> {
    let content = if filename.is_empty() {
        EMPTY_RDB.to_vec()
    } else {
        match tokio::fs::read(Path::new(dir).join(filename)).await {
            Ok(bytes) => bytes,
            Err(_) => EMPTY_RDB.to_vec(),
        }
    };

    let mut payload = format!("${}\r\n", content.len()).into_bytes();
    payload.extend_from_slice(&content);
    payload
}

enum StringEncoding {
    Plain(usize),
    Int8,
    Int16,
    Int32,
}

fn take(bytes: &[u8], cursor: usize, count: usize) -> Result<&[u8], RdbError> {
    if cursor + count > bytes.len() {
        return Err(RdbError::UnexpectedEof);
    }
    Ok(&bytes[cursor..cursor + count])
}

/// Parses a length-encoded integer: the top two bits of the first byte
/// select a 6-bit, 14-bit or 32-bit length.
fn parse_length(bytes: &[u8], cursor: usize) -> Result<(usize, usize), RdbError> {
    let first = take(bytes, cursor, 1)?[0];

    match first >> 6 {
        0b00 => Ok(((first & 0x3F) as usize, 1)),
        0b01 => {
            let second = take(bytes, cursor + 1, 1)?[0];
            Ok(((((first & 0x3F) as usize) << 8) | second as usize, 2))
        }
        0b10 => {
            let raw = take(bytes, cursor + 1, 4)?;
            let length = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
            Ok((length as usize, 5))
        }
        _ => Err(RdbError::UnsupportedEncoding(first)),
    }
}

fn parse_string_encoding(bytes: &[u8], cursor: usize) -> Result<(StringEncoding, usize), RdbError> {
    let first = take(bytes, cursor, 1)?[0];

    if first >> 6 != 0b11 {
        let (length, read) = parse_length(bytes, cursor)?;
        return Ok((StringEncoding::Plain(length), read));
    }

    match first & 0x3F {
        0 => Ok((StringEncoding::Int8, 1)),
        1 => Ok((StringEncoding::Int16, 1)),
        2 => Ok((StringEncoding::Int32, 1)),
        // 3 is LZF compression, which this decoder does not support.
        _ => Err(RdbError::UnsupportedEncoding(first)),
    }
}

fn parse_string(bytes: &[u8], cursor: usize) -> Result<(String, usize), RdbError> {
    let (encoding, mut read) = parse_string_encoding(bytes, cursor)?;

    let value = match encoding {
        StringEncoding::Plain(length) => {
            let raw = take(bytes, cursor + read, length)?;
            read += length;
            str::from_utf8(raw)
                .map_err(|_| RdbError::InvalidUtf8)?
                .to_string()
        }
        StringEncoding::Int8 => {
            let raw = take(bytes, cursor + read, 1)?;
            read += 1;
            (raw[0] as i8).to_string()
        }
        StringEncoding::Int16 => {
            let raw = take(bytes, cursor + read, 2)?;
            read += 2;
            i16::from_le_bytes([raw[0], raw[1]]).to_string()
        }
        StringEncoding::Int32 => {
            let raw = take(bytes, cursor + read, 4)?;
            read += 4;
            i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]).to_string()
        }
    };

    Ok((value, read))
}

#[cfg(test)]
mod tests {
    use super::{EMPTY_RDB, RdbError, RdbRecord, decode, parse_length, parse_string};

    /// Builds a minimal RDB snapshot around the given body opcodes.
    fn snapshot(body: &[u8]) -> Vec<u8> {
        let mut bytes = b"REDIS0011".to_vec();
        bytes.extend_from_slice(body);
        bytes.push(0xFF);
        bytes.extend_from_slice(&[0; 8]);
        bytes
    }

    fn string_kv(key: &str, value: &str) -> Vec<u8> {
        let mut bytes = vec![0x00, key.len() as u8];
        bytes.extend_from_slice(key.as_bytes());
        bytes.push(value.len() as u8);
        bytes.extend_from_slice(value.as_bytes());
        bytes
    }

    #[test]
    fn test_decode_empty_snapshot() {
        assert_eq!(decode(&EMPTY_RDB), Ok(vec![]));
    }

    #[test]
    fn test_decode_string_records() {
        let mut body = string_kv("fruit", "mango");
        body.extend_from_slice(&string_kv("count", "42"));

        let records = decode(&snapshot(&body)).unwrap();
        assert_eq!(
            records,
            vec![
                RdbRecord {
                    key: "fruit".to_string(),
                    value: "mango".to_string(),
                    expires_at: None,
                },
                RdbRecord {
                    key: "count".to_string(),
                    value: "42".to_string(),
                    expires_at: None,
                },
            ]
        );
    }

    #[test]
    fn test_decode_expiry_applies_to_next_record_only() {
        let mut body = vec![0xFC];
        body.extend_from_slice(&1_700_000_000_123u64.to_le_bytes());
        body.extend_from_slice(&string_kv("temp", "1"));
        body.extend_from_slice(&string_kv("keep", "2"));

        let records = decode(&snapshot(&body)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].expires_at.map(|t| t.as_millisecond()),
            Some(1_700_000_000_123)
        );
        assert_eq!(records[1].expires_at, None);
    }

    #[test]
    fn test_decode_seconds_expiry() {
        let mut body = vec![0xFD];
        body.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        body.extend_from_slice(&string_kv("temp", "1"));

        let records = decode(&snapshot(&body)).unwrap();
        assert_eq!(
            records[0].expires_at.map(|t| t.as_second()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_decode_skips_metadata_and_db_opcodes() {
        let mut body = Vec::new();
        // Aux field.
        body.push(0xFA);
        body.push(3);
        body.extend_from_slice(b"ver");
        body.push(3);
        body.extend_from_slice(b"7.2");
        // Select db 0 and resize hints.
        body.extend_from_slice(&[0xFE, 0x00]);
        body.extend_from_slice(&[0xFB, 0x01, 0x00]);
        body.extend_from_slice(&string_kv("k", "v"));

        let records = decode(&snapshot(&body)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "k");
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(b"NOTRDB!!!"), Err(RdbError::InvalidMagic));
        assert_eq!(decode(b"REDIS"), Err(RdbError::UnexpectedEof));
        assert_eq!(
            decode(&snapshot(&[0x04])),
            Err(RdbError::UnsupportedEncoding(0x04))
        );
    }

    #[test]
    fn test_parse_length_encodings() {
        // 6-bit length.
        assert_eq!(parse_length(&[0x0A], 0), Ok((10, 1)));
        // 14-bit length: 0b01 prefix.
        assert_eq!(parse_length(&[0x41, 0x02], 0), Ok((258, 2)));
        // 32-bit length: 0b10 prefix, big-endian.
        assert_eq!(
            parse_length(&[0x80, 0x00, 0x00, 0x01, 0x00], 0),
            Ok((256, 5))
        );
    }

    #[test]
    fn test_parse_integer_strings() {
        // The ctime aux value inside the canonical empty snapshot uses the
        // int32 encoding.
        assert_eq!(parse_string(&[0xC0, 0x40], 0), Ok(("64".to_string(), 2)));
        assert_eq!(
            parse_string(&[0xC1, 0x39, 0x30], 0),
            Ok(("12345".to_string(), 3))
        );
        assert_eq!(
            parse_string(&[0xC2, 0x15, 0xCD, 0x5B, 0x07], 0),
            Ok(("123456789".to_string(), 5))
        );
        assert_eq!(
            parse_string(&[0xC3, 0x00], 0),
            Err(RdbError::UnsupportedEncoding(0xC3))
        );
    }
}
