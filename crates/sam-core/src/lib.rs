//! # sam-core — Trait definitions for the SAM transport
//!
//! This crate defines the seams of the SAM admin transport. The reactor
//! only ever talks to a connection through [`ReactorClient`]; a connection
//! only ever talks back to the reactor through [`ReactorLink`]; and the
//! bytes go over a [`Transport`]. Concrete implementations live in
//! `sam-reactor`, the wire codec in `sam-wire`.
//!
//! ## Modules
//!
//! - `client` - reactor-client capability, interest mask, attention flags, `ClientCore`
//! - `state` - Idle/Queued/Running run-state machine
//! - `transport` - non-blocking byte transport abstraction
//! - `id` - client identifiers and the injectable ID allocator
//! - `error` - error types
//! - `env` - environment variable utilities

pub mod client;
pub mod env;
pub mod error;
pub mod id;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use client::{AttnFlags, ClientCore, HandleResult, Interest, ReactorClient, ReactorLink};
pub use env::{env_get, env_get_opt};
pub use error::{ConfigError, ReactorError, ReactorResult};
pub use id::{ClientId, IdAllocator, SequenceAllocator};
pub use state::{RunEvent, RunState, RunStateCell};
pub use transport::{is_transient, Transport};

/// Lock a std mutex, recovering the guard if a previous holder panicked.
///
/// Panics in callbacks are contained at thread boundaries, so a poisoned
/// lock only means a unit of work was abandoned; the data is still valid.
#[inline]
pub fn lock<T>(m: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
