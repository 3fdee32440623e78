//! Internal error hierarchy.
//!
//! These errors never reach the client as `Value::Err` replies; they describe
//! failures that close a connection or abort the process. Client-visible
//! failures are `protocol::ErrorCode` values produced by the command executor.

use std::io;

/// Internal failure distinguishing connection-scoped errors from fatal ones.
#[derive(thiserror::Error, Debug)]
pub enum KvError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Malformed request framing: oversized length prefix, truncated body,
    /// trailing bytes after the last string. The connection is closed with
    /// no reply sent.
    #[error("framing error: {0}")]
    Framing(&'static str),

    /// An unrecoverable failure during process bootstrap (socket/bind/listen/
    /// poll registration). The caller is expected to log this and abort.
    #[error("fatal error: {0}")]
    Fatal(&'static str),
}

pub type KvResult<T> = Result<T, KvError>;
