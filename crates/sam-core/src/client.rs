//! Reactor-client capability.
//!
//! A `ReactorClient` is anything the reactor can poll: it exposes a
//! descriptor and an interest mask, and reacts to readiness through
//! `handle_input` / `handle_output` / `handle_close`. The reactor never
//! blocks inside these calls and never calls them from any other thread.
//!
//! Bookkeeping shared by every client lives in [`ClientCore`]: the open
//! flag, counters, run-state, attention bits and the link back to the
//! reactor. Implementors embed one and return it from `core()`.

use std::ops::{BitOr, BitOrAssign};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::id::ClientId;
use crate::lock;
use crate::state::RunStateCell;

// ── Interest mask ────────────────────────────────────────────────────

/// I/O interest bitmask reported by `ReactorClient::events()`.
///
/// Error and hang-up conditions are always reported by the reactor and do
/// not need to be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READ: Interest = Interest(1 << 0);
    pub const WRITE: Interest = Interest(1 << 1);

    #[inline]
    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Interest {
    type Output = Interest;
    #[inline]
    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    #[inline]
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

// ── Handler outcome ──────────────────────────────────────────────────

/// What the reactor should do after `handle_input` / `handle_output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandleResult {
    /// Nothing special.
    #[default]
    Default,
    /// Run the close sequence for this client.
    Close,
    /// More input is likely pending; do not treat a simultaneous hang-up
    /// as final yet.
    ReadAgain,
}

// ── Attention flags ──────────────────────────────────────────────────

/// Attention bits the reactor inspects during its scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttnFlags(u8);

impl AttnFlags {
    pub const NONE: AttnFlags = AttnFlags(0);
    /// The client should be removed from the registry once finished.
    pub const WANT_DELETE: AttnFlags = AttnFlags(1 << 0);
    /// The servicing side (task thread or pool task) has exited.
    pub const SHUTDOWN_DONE: AttnFlags = AttnFlags(1 << 1);

    #[inline]
    pub const fn contains(self, other: AttnFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for AttnFlags {
    type Output = AttnFlags;
    #[inline]
    fn bitor(self, rhs: AttnFlags) -> AttnFlags {
        AttnFlags(self.0 | rhs.0)
    }
}

// ── Reactor back-reference ───────────────────────────────────────────

/// The client-facing side of a reactor.
///
/// **Contract:** every method is asynchronous and never blocks; the work
/// is carried out later on the reactor thread.
pub trait ReactorLink: Send + Sync {
    /// Wake the loop so it re-evaluates interest masks (e.g. new output).
    fn invalidate(&self);

    /// Ask the reactor to run the close sequence for `id`.
    fn request_close(&self, id: ClientId);

    /// Ask the reactor to delete `id` once its destroy cycle completes.
    fn request_delete(&self, id: ClientId);
}

// ── Shared bookkeeping ───────────────────────────────────────────────

/// Per-client registration state shared by the reactor, the worker pool
/// and the servicing thread.
pub struct ClientCore {
    id: ClientId,
    open: AtomicBool,
    run_state: RunStateCell,
    attn: AtomicU8,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    created: Instant,
    /// Milliseconds since `created` of the last successful read or write.
    last_activity_ms: AtomicU64,
    destroy_marked: Mutex<Option<Instant>>,
    link: OnceLock<Arc<dyn ReactorLink>>,
}

impl ClientCore {
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            open: AtomicBool::new(true),
            run_state: RunStateCell::new(),
            attn: AtomicU8::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            created: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            destroy_marked: Mutex::new(None),
            link: OnceLock::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ClientId {
        self.id
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Flip the open flag. Returns `true` only for the caller that
    /// actually closed it, so the close sequence runs exactly once.
    #[inline]
    pub fn mark_closed(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn run_state(&self) -> &RunStateCell {
        &self.run_state
    }

    #[inline]
    pub fn attn(&self) -> AttnFlags {
        AttnFlags(self.attn.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_attn(&self, flags: AttnFlags) {
        self.attn.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Record `n` bytes received.
    pub fn record_read(&self, n: usize) {
        self.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
        self.touch();
    }

    /// Record `n` bytes sent.
    pub fn record_write(&self, n: usize) {
        self.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    /// Time since the last read or write (or since creation).
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.created.elapsed().saturating_sub(last)
    }

    fn touch(&self) {
        let ms = self.created.elapsed().as_millis() as u64;
        self.last_activity_ms.store(ms, Ordering::Relaxed);
    }

    /// Record when the destroy cycle first saw this client and return that
    /// instant on every later call.
    pub fn mark_destroy(&self, now: Instant) -> Instant {
        *lock(&self.destroy_marked).get_or_insert(now)
    }

    /// Attach the reactor back-reference. Only the first call wins.
    pub fn attach(&self, link: Arc<dyn ReactorLink>) -> bool {
        self.link.set(link).is_ok()
    }

    #[inline]
    pub fn link(&self) -> Option<&Arc<dyn ReactorLink>> {
        self.link.get()
    }

    /// Wake the reactor, if attached.
    pub fn invalidate(&self) {
        if let Some(link) = self.link.get() {
            link.invalidate();
        }
    }
}

impl std::fmt::Debug for ClientCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCore")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("run_state", &self.run_state.current())
            .field("attn", &self.attn())
            .field("bytes_in", &self.bytes_in())
            .field("bytes_out", &self.bytes_out())
            .finish()
    }
}

// ── The capability ───────────────────────────────────────────────────

/// A connection the reactor can multiplex.
///
/// **Contract:**
/// - `handle_input`, `handle_output` and `handle_close` are only called on
///   the reactor thread and must never block.
/// - `handle_close` must be idempotent.
/// - `do_work` is only called by a worker that claimed the client through
///   the run-state machine, so at most one worker runs it at a time.
pub trait ReactorClient: Send + Sync {
    /// Shared bookkeeping.
    fn core(&self) -> &ClientCore;

    /// Descriptor to poll; negative once closed.
    fn fd(&self) -> RawFd;

    /// Current interest mask.
    fn events(&self) -> Interest;

    /// Descriptor is readable.
    fn handle_input(&self) -> HandleResult;

    /// Descriptor is writable.
    fn handle_output(&self) -> HandleResult;

    /// Run the close sequence.
    fn handle_close(&self);

    /// Attention bits for the reactor's scans.
    fn attn_flag(&self) -> AttnFlags {
        self.core().attn()
    }

    /// Whether there is work for the worker pool.
    fn wants_service(&self) -> bool {
        false
    }

    /// One unit of pool work.
    fn do_work(&self) {}

    /// Last call before the reactor drops its reference.
    fn finalize(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_interest_ops() {
        let rw = Interest::READ | Interest::WRITE;
        assert!(rw.contains(Interest::READ));
        assert!(rw.contains(Interest::WRITE));
        assert!(!Interest::READ.contains(Interest::WRITE));
        assert!(!rw.contains(Interest::NONE));
        assert!(Interest::NONE.is_empty());

        let mut i = Interest::NONE;
        i |= Interest::WRITE;
        assert_eq!(i, Interest::WRITE);
    }

    #[test]
    fn test_attn_flags_accumulate() {
        let core = ClientCore::new(ClientId::new(1));
        assert_eq!(core.attn(), AttnFlags::NONE);
        core.set_attn(AttnFlags::WANT_DELETE);
        core.set_attn(AttnFlags::SHUTDOWN_DONE);
        let attn = core.attn();
        assert!(attn.contains(AttnFlags::WANT_DELETE));
        assert!(attn.contains(AttnFlags::SHUTDOWN_DONE | AttnFlags::WANT_DELETE));
    }

    #[test]
    fn test_mark_closed_once() {
        let core = ClientCore::new(ClientId::new(1));
        assert!(core.is_open());
        assert!(core.mark_closed());
        assert!(!core.mark_closed());
        assert!(!core.is_open());
    }

    #[test]
    fn test_counters() {
        let core = ClientCore::new(ClientId::new(1));
        core.record_read(10);
        core.record_read(5);
        core.record_write(3);
        assert_eq!(core.bytes_in(), 15);
        assert_eq!(core.bytes_out(), 3);
        assert!(core.idle_for() < Duration::from_secs(5));
    }

    #[test]
    fn test_mark_destroy_keeps_first() {
        let core = ClientCore::new(ClientId::new(1));
        let first = Instant::now();
        assert_eq!(core.mark_destroy(first), first);
        let later = first + Duration::from_secs(3);
        assert_eq!(core.mark_destroy(later), first);
    }

    struct CountingLink(AtomicUsize);

    impl ReactorLink for CountingLink {
        fn invalidate(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
        fn request_close(&self, _id: ClientId) {}
        fn request_delete(&self, _id: ClientId) {}
    }

    #[test]
    fn test_attach_once() {
        let core = ClientCore::new(ClientId::new(1));
        core.invalidate(); // no link yet: no-op

        let link = Arc::new(CountingLink(AtomicUsize::new(0)));
        assert!(core.attach(link.clone()));
        assert!(!core.attach(link.clone()));
        core.invalidate();
        assert_eq!(link.0.load(Ordering::Relaxed), 1);
    }
}
