//! Error types shared by the driver, the worker server and the wire transport.
//!
//! Failures fall into a small taxonomy:
//! - [`Error::Serialization`]: an operation, chunk or envelope could not be
//!   encoded or decoded.
//! - [`Error::Transport`]: a socket could not be bound, connected, read or
//!   written, or a frame was malformed.
//! - [`Error::UnsupportedOperation`] / [`Error::UnknownKind`]: a worker was
//!   asked to run an operation under a kind it does not support.
//!
//! Worker-side failures are shipped back to the driver as a [`ChunkFailure`]
//! and resurface there as [`Error::Remote`], so the driver fails the whole
//! call instead of hanging or returning a partial result.
use std::{fmt, io, net::SocketAddr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{job::JobKind, operation::OperationError};

/// Failures of the length-framed socket layer.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// The peer hung up before a complete frame was read.
    #[error("connection from {peer:?} closed before a full frame arrived")]
    Closed { peer: Option<SocketAddr> },
    /// Read/write failure, including frames exceeding the maximum length.
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("serialization error: {0:#}")]
    Serialization(anyhow::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("operation {op} does not support {kind}")]
    UnsupportedOperation { op: &'static str, kind: JobKind },

    #[error("unsupported job kind tag {0}")]
    UnknownKind(u8),

    #[error("{0}")]
    Operation(OperationError),

    #[error("{0}")]
    Panicked(String),

    /// A worker reported that it could not process a chunk.
    #[error("chunk {index} failed on worker: {failure}")]
    Remote { index: usize, failure: ChunkFailure },

    #[error("timed out after {waited:?} waiting for chunks {missing:?}")]
    Timeout {
        waited: Duration,
        missing: Vec<usize>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<OperationError> for Error {
    fn from(value: OperationError) -> Self {
        Self::Operation(value)
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Transport(TransportError::Io(value))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Category of a worker-side chunk failure.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    Serialization,
    UnsupportedOperation,
    Operation,
    Panic,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialization => write!(f, "serialization"),
            Self::UnsupportedOperation => write!(f, "unsupported operation"),
            Self::Operation => write!(f, "operation"),
            Self::Panic => write!(f, "panic"),
        }
    }
}

/// Error payload carried by an error-tagged result message.
///
/// `Error` isn't serializable, so the worker flattens it into a reason and a
/// rendered message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChunkFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.reason, self.message)
    }
}

impl From<&Error> for ChunkFailure {
    fn from(err: &Error) -> Self {
        let reason = match err {
            Error::Serialization(_) => FailureReason::Serialization,
            Error::UnsupportedOperation { .. } | Error::UnknownKind(_) => {
                FailureReason::UnsupportedOperation
            }
            Error::Panicked(_) => FailureReason::Panic,
            _ => FailureReason::Operation,
        };

        Self {
            reason,
            message: err.to_string(),
        }
    }
}
