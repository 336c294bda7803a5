//! Client identifiers and the ID allocator service.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a registered client
///
/// Allocated by an [`IdAllocator`] when a connection is accepted and used
/// as the registry key inside the reactor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClientId(u64);

impl ClientId {
    /// Create a new ClientId from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        ClientId(id)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ClientId {
    #[inline]
    fn from(id: u64) -> Self {
        ClientId(id)
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out identifiers.
///
/// **Contract:** `next()` is atomic; concurrent callers never observe the
/// same value.
pub trait IdAllocator: Send + Sync {
    fn next(&self) -> ClientId;
}

/// Default allocator: a monotonically increasing counter.
#[derive(Debug)]
pub struct SequenceAllocator {
    next: AtomicU64,
}

impl SequenceAllocator {
    /// Start handing out IDs at `first`.
    pub const fn starting_at(first: u64) -> Self {
        Self { next: AtomicU64::new(first) }
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdAllocator for SequenceAllocator {
    #[inline]
    fn next(&self) -> ClientId {
        ClientId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
