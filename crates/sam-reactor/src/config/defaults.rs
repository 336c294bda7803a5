//! Library defaults. Every value can be overridden through the
//! environment (see `ReactorConfig::from_env` / `ClientConfig::from_env`).

/// Worker threads servicing pool-mode clients.
pub const NUM_WORKERS: usize = 4;

/// Upper bound on worker threads.
pub const MAX_WORKERS: usize = 256;

/// Destroy cycle period.
pub const DESTROY_INTERVAL_MS: u64 = 2_000;

/// Poll timeout while a destroy sweep is pending.
pub const POLL_TIMEOUT_MS: u64 = 1_000;

/// Log clients that sit in the destroy cycle longer than this.
pub const DESTROY_WARN_MS: u64 = 30_000;

/// Largest single read from a socket.
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Initial capacity of a client's read buffer.
pub const READ_BUFFER_CAPACITY: usize = 4 * 1024;

/// Queued outbound bytes at which a peer counts as a slow consumer.
pub const SLOW_CONSUMER_BYTES: usize = 8 * 1024 * 1024;

/// `thread` or `pool`.
pub const TASK_MODE: &str = "thread";
