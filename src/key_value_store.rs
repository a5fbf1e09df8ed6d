//! The keyspace: a map from keys to string or stream values with per-key
//! expiry and glob-pattern key matching.
//!
//! Expiry is lazy: every read access first checks the absolute `expires_at`
//! timestamp and removes the key when it has passed.

use std::collections::HashMap;

use jiff::Timestamp;
use regex::Regex;
use thiserror::Error;

use crate::stream::{Stream, StreamId};

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("value is not an integer or out of range")]
    ValueNotInteger,
    #[error("invalid data type for key")]
    WrongDataType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    String(String),
    Stream(Stream),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub data: DataType,
    /// Absolute expiry in milliseconds since epoch. `None` means persistent.
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: HashMap<String, Value>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        KeyValueStore {
            entries: HashMap::new(),
        }
    }

    /// Inserts a value directly, used by the RDB bootstrap and tests.
    pub fn insert(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores a string value, clearing any previous expiry.
    pub fn set(&mut self, key: String, value: String) {
        self.entries.insert(
            key,
            Value {
                data: DataType::String(value),
                expires_at: None,
            },
        );
    }

    /// Stores a string value with an absolute expiry timestamp.
    pub fn set_with_expiry(&mut self, key: String, value: String, expires_at: Timestamp) {
        self.entries.insert(
            key,
            Value {
                data: DataType::String(value),
                expires_at: Some(expires_at),
            },
        );
    }

    pub fn get_string(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        match self.live_entry(key) {
            Some(Value {
                data: DataType::String(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(StoreError::WrongDataType),
            None => Ok(None),
        }
    }

    pub fn contains_key(&mut self, key: &str) -> bool {
        self.live_entry(key).is_some()
    }

    /// Removes the given keys, returning how many were actually removed.
    /// Keys that have already expired do not count.
    pub fn delete(&mut self, keys: &[String]) -> usize {
        let mut removed = 0;

        for key in keys {
            if self.live_entry(key).is_some() {
                self.entries.remove(key.as_str());
                removed += 1;
            }
        }

        removed
    }

    /// Counts how many of the given keys exist. Duplicates count each time.
    pub fn exists(&mut self, keys: &[String]) -> usize {
        keys.iter().filter(|key| self.contains_key(key)).count()
    }

    /// Deep-copies `source` to `destination`, including stream entries and
    /// the expiry timestamp. Returns false when the source is missing or the
    /// destination exists and `replace` is not set.
    pub fn copy(&mut self, source: &str, destination: &str, replace: bool) -> bool {
        if self.live_entry(destination).is_some() && !replace {
            return false;
        }

        let Some(value) = self.live_entry(source).cloned() else {
            return false;
        };

        self.entries.insert(destination.to_string(), value);
        true
    }

    /// Keys matching a Redis glob pattern (`*`, `?`, `[abc]`, `[^a]`, `[a-z]`).
    pub fn keys_matching(&mut self, pattern: &str) -> Vec<String> {
        let now = Timestamp::now();
        self.entries
            .retain(|_, value| !is_expired(value, now));

        let Ok(matcher) = glob_to_regex(pattern) else {
            return Vec::new();
        };

        self.entries
            .keys()
            .filter(|key| matcher.is_match(key))
            .cloned()
            .collect()
    }

    pub fn key_type(&mut self, key: &str) -> &'static str {
        match self.live_entry(key) {
            Some(Value {
                data: DataType::String(_),
                ..
            }) => "string",
            Some(Value {
                data: DataType::Stream(_),
                ..
            }) => "stream",
            None => "none",
        }
    }

    /// Sets the key to expire `milliseconds` from now. Returns false when
    /// the key does not exist.
    pub fn expire_in(&mut self, key: &str, milliseconds: u64) -> bool {
        let expires_at = timestamp_after_ms(milliseconds);

        match self.live_entry_mut(key) {
            Some(value) => {
                value.expires_at = Some(expires_at);
                true
            }
            None => false,
        }
    }

    /// Numeric increment. An absent key counts up from zero; a value that
    /// does not parse as an integer is an error.
    pub fn increment(&mut self, key: &str) -> Result<i64, StoreError> {
        let current = match self.live_entry(key) {
            Some(Value {
                data: DataType::String(value),
                ..
            }) => value
                .parse::<i64>()
                .map_err(|_| StoreError::ValueNotInteger)?,
            Some(_) => return Err(StoreError::WrongDataType),
            None => 0,
        };

        let next = current.checked_add(1).ok_or(StoreError::ValueNotInteger)?;
        self.set(key.to_string(), next.to_string());

        Ok(next)
    }

    pub fn stream(&mut self, key: &str) -> Result<Option<&Stream>, StoreError> {
        match self.live_entry(key) {
            Some(Value {
                data: DataType::Stream(stream),
                ..
            }) => Ok(Some(stream)),
            Some(_) => Err(StoreError::WrongDataType),
            None => Ok(None),
        }
    }

    /// The stream under `key`, creating an empty one when the key is absent.
    pub fn stream_mut_or_default(&mut self, key: &str) -> Result<&mut Stream, StoreError> {
        if self.live_entry(key).is_none() {
            self.entries.insert(
                key.to_string(),
                Value {
                    data: DataType::Stream(Stream::new()),
                    expires_at: None,
                },
            );
        }

        match self.entries.get_mut(key) {
            Some(Value {
                data: DataType::Stream(stream),
                ..
            }) => Ok(stream),
            _ => Err(StoreError::WrongDataType),
        }
    }

    /// The last entry id of the stream under `key`, used to resolve the
    /// XREAD `$` sentinel. Absent or empty streams resolve to `0-0`.
    pub fn last_stream_id(&mut self, key: &str) -> Result<StreamId, StoreError> {
        Ok(self
            .stream(key)?
            .and_then(|stream| stream.last_id())
            .unwrap_or(StreamId::MIN))
    }

    fn live_entry(&mut self, key: &str) -> Option<&Value> {
        if self
            .entries
            .get(key)
            .is_some_and(|value| is_expired(value, Timestamp::now()))
        {
            self.entries.remove(key);
            return None;
        }

        self.entries.get(key)
    }

    fn live_entry_mut(&mut self, key: &str) -> Option<&mut Value> {
        if self
            .entries
            .get(key)
            .is_some_and(|value| is_expired(value, Timestamp::now()))
        {
            self.entries.remove(key);
            return None;
        }

        self.entries.get_mut(key)
    }
}

fn is_expired(value: &Value, now: Timestamp) -> bool {
    value.expires_at.is_some_and(|expires_at| now >= expires_at)
}

/// An absolute timestamp `milliseconds` from now.
pub fn timestamp_after_ms(milliseconds: u64) -> Timestamp {
    Timestamp::from_millisecond(
        Timestamp::now().as_millisecond() + milliseconds as i64,
    )
    .unwrap_or(Timestamp::MAX)
}

/// Translates a Redis glob pattern into an anchored regular expression.
///
/// `*` matches any sequence, `?` a single character, `[abc]`/`[^a]`/`[a-z]`
/// are character classes. Everything else is matched verbatim.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut translated = String::from("^");
    let mut cursor = 0;

    while cursor < pattern.len() {
        let Some(ch) = pattern[cursor..].chars().next() else {
            break;
        };

        match ch {
            '*' => {
                translated.push_str(".*");
                cursor += 1;
            }
            '?' => {
                translated.push('.');
                cursor += 1;
            }
            '[' => {
                // Only treat it as a class when a closing bracket follows;
                // an unterminated bracket is matched verbatim.
                match pattern[cursor + 1..].find(']') {
                    Some(relative_end) => {
                        let class = &pattern[cursor + 1..cursor + 1 + relative_end];
                        translated.push('[');
                        translated.push_str(class);
                        translated.push(']');
                        cursor += relative_end + 2;
                    }
                    None => {
                        translated.push_str(&regex::escape("["));
                        cursor += 1;
                    }
                }
            }
            other => {
                translated.push_str(&regex::escape(&other.to_string()));
                cursor += other.len_utf8();
            }
        }
    }

    translated.push('$');
    Regex::new(&translated)
}
