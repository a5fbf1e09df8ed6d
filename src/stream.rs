//! Ordered stream entries and entry-id arithmetic.
//!
//! A stream is an append-only sequence of entries sorted strictly ascending
//! by `(ms, seq)` id. Appends validate ordering, so every read path can rely
//! on binary search over a sorted vector.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum StreamError {
    #[error("Invalid stream ID specified as stream command argument")]
    InvalidIdFormat,
    #[error("The ID specified in XADD must be greater than 0-0")]
    IdIsZero,
    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    IdNotGreaterThanTop,
}

/// A stream entry id, rendered on the wire as `"<ms>-<seq>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        StreamId { ms, seq }
    }

    /// Parses a fully specified `<ms>-<seq>` id.
    pub fn parse(argument: &str) -> Result<Self, StreamError> {
        let Some((ms_part, seq_part)) = argument.split_once('-') else {
            return Err(StreamError::InvalidIdFormat);
        };

        let ms = ms_part
            .parse::<u64>()
            .map_err(|_| StreamError::InvalidIdFormat)?;
        let seq = seq_part
            .parse::<u64>()
            .map_err(|_| StreamError::InvalidIdFormat)?;

        Ok(StreamId { ms, seq })
    }

    /// Parses an XRANGE start bound: `-`, `<ms>` or `<ms>-<seq>`.
    ///
    /// A bare `<ms>` expands to `(ms, 0)` so the bound covers the whole
    /// millisecond.
    pub fn parse_range_start(argument: &str) -> Result<Self, StreamError> {
        if argument == "-" {
            return Ok(StreamId::MIN);
        }

        match argument.split_once('-') {
            Some(_) => Self::parse(argument),
            None => {
                let ms = argument
                    .parse::<u64>()
                    .map_err(|_| StreamError::InvalidIdFormat)?;
                Ok(StreamId { ms, seq: 0 })
            }
        }
    }

    /// Parses an XRANGE end bound: `+`, `<ms>` or `<ms>-<seq>`.
    ///
    /// A bare `<ms>` expands to `(ms, u64::MAX)`.
    pub fn parse_range_end(argument: &str) -> Result<Self, StreamError> {
        if argument == "+" {
            return Ok(StreamId::MAX);
        }

        match argument.split_once('-') {
            Some(_) => Self::parse(argument),
            None => {
                let ms = argument
                    .parse::<u64>()
                    .map_err(|_| StreamError::InvalidIdFormat)?;
                Ok(StreamId { ms, seq: u64::MAX })
            }
        }
    }

    /// Parses an XREAD id argument: `<ms>` or `<ms>-<seq>`.
    ///
    /// The `$` sentinel is resolved by the caller against the keyspace
    /// before this is reached.
    pub fn parse_read_start(argument: &str) -> Result<Self, StreamError> {
        match argument.split_once('-') {
            Some(_) => Self::parse(argument),
            None => {
                let ms = argument
                    .parse::<u64>()
                    .map_err(|_| StreamError::InvalidIdFormat)?;
                Ok(StreamId { ms, seq: 0 })
            }
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// The id argument of an XADD command before resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryIdSpec {
    /// `*`: both parts are generated.
    Auto,
    /// `<ms>-*`: the sequence is generated for the given millisecond.
    AutoSequence(u64),
    /// `<ms>-<seq>`: fully specified by the client.
    Explicit(StreamId),
}

impl EntryIdSpec {
    pub fn parse(argument: &str) -> Result<Self, StreamError> {
        if argument == "*" {
            return Ok(EntryIdSpec::Auto);
        }

        let Some((ms_part, seq_part)) = argument.split_once('-') else {
            return Err(StreamError::InvalidIdFormat);
        };

        let ms = ms_part
            .parse::<u64>()
            .map_err(|_| StreamError::InvalidIdFormat)?;

        if seq_part == "*" {
            return Ok(EntryIdSpec::AutoSequence(ms));
        }

        let seq = seq_part
            .parse::<u64>()
            .map_err(|_| StreamError::InvalidIdFormat)?;

        Ok(EntryIdSpec::Explicit(StreamId { ms, seq }))
    }
}

/// One stream entry: an id plus field-value pairs in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(String, String)>,
}

/// An ordered sequence of entries, strictly ascending by id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stream {
    entries: Vec<StreamEntry>,
}

impl Stream {
    pub fn new() -> Self {
        Stream {
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    pub fn last_id(&self) -> Option<StreamId> {
        self.entries.last().map(|entry| entry.id)
    }

    /// Resolves the id spec, validates ordering and appends a new entry.
    ///
    /// `now_ms` supplies the wall-clock millisecond for fully automatic ids.
    pub fn append(
        &mut self,
        spec: EntryIdSpec,
        fields: Vec<(String, String)>,
        now_ms: u64,
    ) -> Result<StreamId, StreamError> {
        let id = self.resolve_id(spec, now_ms);

        if id == StreamId::MIN {
            return Err(StreamError::IdIsZero);
        }

        if let Some(last) = self.last_id() {
            if id <= last {
                return Err(StreamError::IdNotGreaterThanTop);
            }
        }

        self.entries.push(StreamEntry { id, fields });

        Ok(id)
    }

    fn resolve_id(&self, spec: EntryIdSpec, now_ms: u64) -> StreamId {
        match spec {
            EntryIdSpec::Explicit(id) => id,
            EntryIdSpec::Auto => {
                let seq = match self.last_id() {
                    Some(last) if last.ms >= now_ms => last.seq + 1,
                    _ => 0,
                };
                StreamId { ms: now_ms, seq }
            }
            EntryIdSpec::AutoSequence(ms) => {
                let seq = match self.last_id() {
                    Some(last) if last.ms == ms => last.seq + 1,
                    _ => {
                        if ms == 0 {
                            1
                        } else {
                            0
                        }
                    }
                };
                StreamId { ms, seq }
            }
        }
    }

    /// Entries with id in the closed interval `[start, end]`.
    pub fn range(&self, start: StreamId, end: StreamId) -> &[StreamEntry] {
        let low = self.entries.partition_point(|entry| entry.id < start);
        let high = self.entries.partition_point(|entry| entry.id <= end);
        &self.entries[low..high]
    }

    /// Entries with id strictly greater than `id`.
    pub fn entries_after(&self, id: StreamId) -> &[StreamEntry] {
        let low = self.entries.partition_point(|entry| entry.id <= id);
        &self.entries[low..]
    }
}
