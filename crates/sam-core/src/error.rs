//! Error types for the SAM transport core.

use std::io;

use thiserror::Error;

use crate::id::ClientId;

/// Result type for reactor and client operations
pub type ReactorResult<T> = Result<T, ReactorError>;

/// Errors raised by the reactor, its worker pool and buffered clients.
///
/// Transient I/O conditions (would-block, interrupted) never surface as
/// errors; they are retried on the next loop pass.
#[derive(Error, Debug)]
pub enum ReactorError {
    /// OS-level I/O failure (pipe creation, bind, accept).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A close was already accepted on this client's outbound queue.
    #[error("outbound queue of client {0} is closed")]
    QueueClosed(ClientId),

    /// The outbound message could not be encoded and was dropped.
    #[error("message for client {client} dropped: {reason}")]
    MessageDropped {
        client: ClientId,
        reason: String,
    },

    /// A task thread tried to join itself.
    #[error("task thread of client {0} attempted to join itself")]
    SelfJoin(ClientId),

    /// Spawning a reactor, worker, task or acceptor thread failed.
    #[error("failed to spawn {what} thread: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// The reactor has terminated and no longer accepts requests.
    #[error("reactor is shut down")]
    ShutDown,

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),
}
