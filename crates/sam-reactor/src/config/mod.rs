//! Reactor and client configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use sam_reactor::config::{ReactorConfig, ClientConfig, TaskMode};
//!
//! let reactor = ReactorConfig::from_env().num_workers(2);
//! let client = ClientConfig::from_env().task_mode(TaskMode::Pool);
//! ```

pub mod defaults;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sam_core::{env_get, env_get_opt, ConfigError};
use sam_wire::{CodecConfig, PROTOCOL_MAX_TOTAL};

// ── Task mode ────────────────────────────────────────────────────────

/// Who runs a client's servicing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskMode {
    /// A dedicated task thread per client.
    #[default]
    Thread,
    /// The reactor's worker pool, via `do_work()`.
    Pool,
}

impl FromStr for TaskMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(TaskMode::Thread),
            "pool" => Ok(TaskMode::Pool),
            _ => Err(ConfigError::InvalidValue("task_mode must be 'thread' or 'pool'")),
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskMode::Thread => write!(f, "thread"),
            TaskMode::Pool => write!(f, "pool"),
        }
    }
}

// ── Reactor ──────────────────────────────────────────────────────────

/// Event loop configuration.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Worker pool size
    pub num_workers: usize,
    /// Period of the destroy cycle
    pub destroy_interval: Duration,
    /// Poll timeout while a destroy sweep is pending
    pub poll_timeout_pending: Duration,
    /// Warn about clients stuck in the destroy cycle after this long
    pub destroy_warn_after: Duration,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ReactorConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SAM_NUM_WORKERS` - Worker pool size
    /// - `SAM_DESTROY_INTERVAL_MS` - Destroy cycle period
    /// - `SAM_POLL_TIMEOUT_MS` - Poll timeout while a sweep is pending
    /// - `SAM_DESTROY_WARN_MS` - Stuck-client warning threshold
    pub fn from_env() -> Self {
        Self {
            num_workers: env_get("SAM_NUM_WORKERS", defaults::NUM_WORKERS),
            destroy_interval: Duration::from_millis(env_get(
                "SAM_DESTROY_INTERVAL_MS",
                defaults::DESTROY_INTERVAL_MS,
            )),
            poll_timeout_pending: Duration::from_millis(env_get(
                "SAM_POLL_TIMEOUT_MS",
                defaults::POLL_TIMEOUT_MS,
            )),
            destroy_warn_after: Duration::from_millis(env_get(
                "SAM_DESTROY_WARN_MS",
                defaults::DESTROY_WARN_MS,
            )),
        }
    }

    /// Library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            num_workers: defaults::NUM_WORKERS,
            destroy_interval: Duration::from_millis(defaults::DESTROY_INTERVAL_MS),
            poll_timeout_pending: Duration::from_millis(defaults::POLL_TIMEOUT_MS),
            destroy_warn_after: Duration::from_millis(defaults::DESTROY_WARN_MS),
        }
    }

    // Builder methods

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn destroy_interval(mut self, d: Duration) -> Self {
        self.destroy_interval = d;
        self
    }

    pub fn poll_timeout_pending(mut self, d: Duration) -> Self {
        self.poll_timeout_pending = d;
        self
    }

    pub fn destroy_warn_after(mut self, d: Duration) -> Self {
        self.destroy_warn_after = d;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue("num_workers must be > 0"));
        }
        if self.num_workers > defaults::MAX_WORKERS {
            return Err(ConfigError::InvalidValue("num_workers must be <= 256"));
        }
        if self.destroy_interval.is_zero() {
            return Err(ConfigError::InvalidValue("destroy_interval must be > 0"));
        }
        if self.poll_timeout_pending.is_zero() {
            return Err(ConfigError::InvalidValue("poll_timeout_pending must be > 0"));
        }
        if self.poll_timeout_pending.as_millis() > i32::MAX as u128 {
            return Err(ConfigError::InvalidValue("poll_timeout_pending is too large"));
        }
        Ok(())
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Largest single read
    pub read_chunk_size: usize,
    /// Initial read buffer capacity
    pub read_buffer_capacity: usize,
    /// Outbound backlog that flags a slow consumer
    pub slow_consumer_bytes: usize,
    /// Servicing strategy
    pub task_mode: TaskMode,
    /// Codec limits for `send_message` and framed decoding
    pub codec: CodecConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ClientConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SAM_READ_CHUNK_SIZE` - Largest single read
    /// - `SAM_SLOW_CONSUMER_BYTES` - Slow consumer threshold
    /// - `SAM_TASK_MODE` - `thread` or `pool`
    /// - `SAM_MAX_MESSAGE_SIZE` - Codec message size limit
    pub fn from_env() -> Self {
        let mut config = Self::new();
        config.read_chunk_size = env_get("SAM_READ_CHUNK_SIZE", config.read_chunk_size);
        config.slow_consumer_bytes = env_get("SAM_SLOW_CONSUMER_BYTES", config.slow_consumer_bytes);
        config.task_mode = env_get_opt("SAM_TASK_MODE").unwrap_or(config.task_mode);
        if let Some(n) = env_get_opt::<usize>("SAM_MAX_MESSAGE_SIZE") {
            config.codec = config.codec.max_message_size(n);
        }
        config
    }

    /// Library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            read_chunk_size: defaults::READ_CHUNK_SIZE,
            read_buffer_capacity: defaults::READ_BUFFER_CAPACITY,
            slow_consumer_bytes: defaults::SLOW_CONSUMER_BYTES,
            task_mode: defaults::TASK_MODE.parse().unwrap_or_default(),
            codec: CodecConfig::default(),
        }
    }

    // Builder methods

    pub fn read_chunk_size(mut self, n: usize) -> Self {
        self.read_chunk_size = n;
        self
    }

    pub fn read_buffer_capacity(mut self, n: usize) -> Self {
        self.read_buffer_capacity = n;
        self
    }

    pub fn slow_consumer_bytes(mut self, n: usize) -> Self {
        self.slow_consumer_bytes = n;
        self
    }

    pub fn task_mode(mut self, mode: TaskMode) -> Self {
        self.task_mode = mode;
        self
    }

    pub fn codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("read_chunk_size must be > 0"));
        }
        if self.slow_consumer_bytes == 0 {
            return Err(ConfigError::InvalidValue("slow_consumer_bytes must be > 0"));
        }
        if self.codec.max_message_size == 0 || self.codec.max_message_size > PROTOCOL_MAX_TOTAL {
            return Err(ConfigError::InvalidValue(
                "max_message_size must be in 1..=999999999",
            ));
        }
        if self.codec.max_depth == 0 {
            return Err(ConfigError::InvalidValue("max_depth must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ReactorConfig::new().validate().is_ok());
        assert!(ClientConfig::new().validate().is_ok());
        assert_eq!(ClientConfig::new().task_mode, TaskMode::Thread);
    }

    #[test]
    fn test_builder() {
        let config = ReactorConfig::new()
            .num_workers(8)
            .destroy_interval(Duration::from_millis(50));
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.destroy_interval, Duration::from_millis(50));

        let client = ClientConfig::new().task_mode(TaskMode::Pool).read_chunk_size(7);
        assert_eq!(client.task_mode, TaskMode::Pool);
        assert_eq!(client.read_chunk_size, 7);
    }

    #[test]
    fn test_validation() {
        assert!(ReactorConfig::new().num_workers(0).validate().is_err());
        assert!(ReactorConfig::new().num_workers(1000).validate().is_err());
        assert!(ReactorConfig::new().destroy_interval(Duration::ZERO).validate().is_err());
        assert!(ClientConfig::new().read_chunk_size(0).validate().is_err());
    }

    #[test]
    fn test_task_mode_parse() {
        assert_eq!("pool".parse::<TaskMode>().unwrap(), TaskMode::Pool);
        assert_eq!(" Thread ".parse::<TaskMode>().unwrap(), TaskMode::Thread);
        assert!("fibers".parse::<TaskMode>().is_err());
        assert_eq!(TaskMode::Pool.to_string(), "pool");
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("SAM_SLOW_CONSUMER_BYTES", "4096");
        let config = ClientConfig::from_env();
        assert_eq!(config.slow_consumer_bytes, 4096);
        std::env::remove_var("SAM_SLOW_CONSUMER_BYTES");
    }
}
