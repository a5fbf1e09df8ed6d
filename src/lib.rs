//! A Redis-compatible in-memory key-value server.
//!
//! This crate implements the core of a Redis-compatible server:
//!
//! - RESP-2 wire protocol with incremental, pipelining-aware framing
//! - String and stream values with per-key expiry and glob KEYS matching
//! - Stream operations (XADD, XRANGE, XREAD with blocking reads)
//! - Transactions (MULTI, EXEC, DISCARD)
//! - Single-master/multi-replica replication with PSYNC, offset tracking
//!   and WAIT
//! - RDB snapshot bootstrap at startup
//!
//! Concurrency is handled with Tokio: one task per client connection plus
//! one task for the replica's upstream link, sharing the keyspace behind a
//! coarse mutex.

pub mod commands;
pub mod connection;
pub mod key_value_store;
pub mod rdb;
pub mod replication;
pub mod resp;
pub mod server;
pub mod state;
pub mod stream;
