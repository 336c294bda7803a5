//! `Reactor` — single-threaded poll loop over registered clients.
//!
//! ```text
//!   any thread                          reactor thread
//!   ──────────                          ──────────────
//!   ReactorHandle ──Control──▶ SegQueue ──▶ apply_control
//!                 ──wake──▶ self-pipe ──▶ poll(wake fd + client fds)
//!                                          ├─ handle_input / handle_output / handle_close
//!                                          ├─ attention scan ──Schedule──▶ WorkerPool
//!                                          └─ destroy cycle (every destroy_interval)
//! ```
//!
//! The registry lives on the loop thread only; every other thread talks
//! to it through the control queue. A client is deleted only once it is
//! closed, its servicing has finished and it is idle in the pool.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use nix::errno::Errno;
use sam_core::{
    AttnFlags, ClientId, HandleResult, Interest, ReactorClient, ReactorError, ReactorLink,
    ReactorResult, RunEvent, RunState,
};
use tracing::{debug, error, info, trace, warn};

use crate::config::ReactorConfig;
use crate::waker::Waker;
use crate::worker_pool::WorkerPool;

/// Pause after a poll failure other than EINTR.
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Messages from any thread to the loop.
enum Control {
    AddClient(Arc<dyn ReactorClient>),
    RequestClose(ClientId),
    RequestDelete(ClientId),
    AttentionScan,
    Terminate,
}

/// State shared between the loop and its handles.
struct Shared {
    control: SegQueue<Control>,
    waker: Waker,
    clients: AtomicUsize,
    terminated: AtomicBool,
}

impl Shared {
    fn send(&self, msg: Control) {
        self.control.push(msg);
        self.wake();
    }

    fn wake(&self) {
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "failed to wake reactor");
        }
    }
}

/// Cloneable, thread-safe handle to a running reactor.
#[derive(Clone)]
pub struct ReactorHandle {
    shared: Arc<Shared>,
}

impl ReactorHandle {
    /// Register a client. Attaches this reactor as its back-reference;
    /// the registry insert happens asynchronously on the loop thread.
    pub fn add_client(&self, client: Arc<dyn ReactorClient>) -> ReactorResult<()> {
        if self.shared.terminated.load(Ordering::Acquire) {
            return Err(ReactorError::ShutDown);
        }
        if !client.core().attach(Arc::new(self.clone())) {
            warn!(client = %client.core().id(), "client already attached to a reactor");
        }
        self.shared.send(Control::AddClient(client));
        Ok(())
    }

    /// Registered clients, as of the loop's last pass.
    pub fn client_count(&self) -> usize {
        self.shared.clients.load(Ordering::Acquire)
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::Acquire)
    }
}

impl ReactorLink for ReactorHandle {
    /// Queues an attention scan, so the loop rebuilds its poll set and
    /// re-checks `wants_service` on its next pass.
    fn invalidate(&self) {
        self.shared.send(Control::AttentionScan);
    }

    fn request_close(&self, id: ClientId) {
        self.shared.send(Control::RequestClose(id));
    }

    fn request_delete(&self, id: ClientId) {
        self.shared.send(Control::RequestDelete(id));
    }
}

impl std::fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorHandle")
            .field("clients", &self.client_count())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Owner of the loop thread.
pub struct Reactor {
    handle: ReactorHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl Reactor {
    /// Validate `config`, start the worker pool and the loop thread.
    pub fn start(config: ReactorConfig) -> ReactorResult<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            control: SegQueue::new(),
            waker: Waker::new()?,
            clients: AtomicUsize::new(0),
            terminated: AtomicBool::new(false),
        });
        let pool = WorkerPool::new(config.num_workers)?;
        let workers = pool.total_workers();
        let mut event_loop = EventLoop {
            shared: Arc::clone(&shared),
            pool,
            registry: HashMap::new(),
            destroy_pending: false,
            last_destroy: Instant::now(),
            warned_stuck: HashSet::new(),
            config,
        };
        let thread = thread::Builder::new()
            .name("sam-reactor".into())
            .spawn(move || event_loop.run())
            .map_err(|source| ReactorError::Spawn { what: "reactor", source })?;
        info!(workers, "reactor started");
        Ok(Self { handle: ReactorHandle { shared }, thread: Some(thread) })
    }

    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    pub fn add_client(&self, client: Arc<dyn ReactorClient>) -> ReactorResult<()> {
        self.handle.add_client(client)
    }

    pub fn invalidate(&self) {
        self.handle.invalidate();
    }

    pub fn request_close(&self, id: ClientId) {
        self.handle.request_close(id);
    }

    pub fn request_delete(&self, id: ClientId) {
        self.handle.request_delete(id);
    }

    pub fn client_count(&self) -> usize {
        self.handle.client_count()
    }

    /// Stop the loop: close every client, let servicing finish, join task
    /// threads and the worker pool.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.handle.shared.terminated.store(true, Ordering::Release);
        self.handle.shared.send(Control::Terminate);
        if thread.join().is_err() {
            error!("reactor thread panicked");
        }
        info!("reactor stopped");
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Loop ─────────────────────────────────────────────────────────────

struct EventLoop {
    shared: Arc<Shared>,
    pool: WorkerPool,
    registry: HashMap<ClientId, Arc<dyn ReactorClient>>,
    destroy_pending: bool,
    last_destroy: Instant,
    warned_stuck: HashSet<ClientId>,
    config: ReactorConfig,
}

/// Run `f`, logging a panic as an unknown failure of `what`.
fn guarded(id: ClientId, what: &'static str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(_) => {
            error!(client = %id, "unknown failure in {}", what);
            false
        }
    }
}

impl EventLoop {
    fn run(&mut self) {
        let mut fds: Vec<libc::pollfd> = Vec::new();
        let mut ids: Vec<ClientId> = Vec::new();
        loop {
            self.build_poll_set(&mut fds, &mut ids);
            let timeout = if self.destroy_pending {
                self.config.poll_timeout_pending.as_millis() as libc::c_int
            } else {
                -1
            };
            let rc =
                unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
            if rc < 0 {
                match Errno::last() {
                    Errno::EINTR => {}
                    e => {
                        error!(error = %e, "poll failed");
                        thread::sleep(self.config.poll_timeout_pending.min(POLL_ERROR_BACKOFF));
                    }
                }
            } else if rc > 0 {
                if fds[0].revents != 0 {
                    self.shared.waker.drain();
                }
                for (pfd, id) in fds[1..].iter().zip(&ids) {
                    if pfd.revents != 0 {
                        self.dispatch(*id, pfd.revents);
                    }
                }
            }

            if !self.apply_control() {
                break;
            }
            self.attention_scan();
            if self.destroy_pending && self.last_destroy.elapsed() >= self.config.destroy_interval {
                self.destroy_cycle();
            }
        }
        self.teardown();
    }

    fn build_poll_set(&self, fds: &mut Vec<libc::pollfd>, ids: &mut Vec<ClientId>) {
        fds.clear();
        ids.clear();
        fds.push(libc::pollfd {
            fd: self.shared.waker.read_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        for (id, client) in &self.registry {
            if !client.core().is_open() {
                continue;
            }
            let fd = client.fd();
            if fd < 0 {
                continue;
            }
            let interest = client.events();
            let mut events: libc::c_short = 0;
            if interest.contains(Interest::READ) {
                events |= libc::POLLIN;
            }
            if interest.contains(Interest::WRITE) {
                events |= libc::POLLOUT;
            }
            fds.push(libc::pollfd { fd, events, revents: 0 });
            ids.push(*id);
        }
    }

    /// Readiness for one client: input before output, then close if
    /// either asked for it or the descriptor reported error/hang-up.
    fn dispatch(&mut self, id: ClientId, revents: libc::c_short) {
        let Some(client) = self.registry.get(&id).cloned() else {
            return;
        };
        let ok = guarded(id, "event dispatch", || {
            let hangup = revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0;
            let input = if revents & libc::POLLIN != 0 {
                client.handle_input()
            } else {
                HandleResult::Default
            };
            let mut close = input == HandleResult::Close;
            if !close && revents & libc::POLLOUT != 0 {
                close = client.handle_output() == HandleResult::Close;
            }
            // Unread input keeps a hung-up descriptor alive for another pass.
            if close || (hangup && input != HandleResult::ReadAgain) {
                client.handle_close();
            }
        });
        if !ok {
            guarded(id, "handle_close", || client.handle_close());
        }
    }

    /// Apply queued control messages. Returns `false` on `Terminate`.
    fn apply_control(&mut self) -> bool {
        while let Some(msg) = self.shared.control.pop() {
            match msg {
                Control::AddClient(client) => {
                    let id = client.core().id();
                    if self.registry.insert(id, client).is_some() {
                        warn!(client = %id, "replaced a registered client with the same id");
                    }
                    debug!(client = %id, "client registered");
                }
                Control::RequestClose(id) => {
                    if let Some(client) = self.registry.get(&id).cloned() {
                        guarded(id, "handle_close", || client.handle_close());
                    }
                }
                Control::RequestDelete(id) => {
                    if let Some(client) = self.registry.get(&id) {
                        client.core().set_attn(AttnFlags::WANT_DELETE);
                        self.destroy_pending = true;
                    }
                }
                Control::AttentionScan => {}
                Control::Terminate => return false,
            }
        }
        self.shared.clients.store(self.registry.len(), Ordering::Release);
        true
    }

    /// Hand clients with pending work to the pool; note deletions.
    fn attention_scan(&mut self) {
        for client in self.registry.values() {
            if client.attn_flag().contains(AttnFlags::WANT_DELETE) {
                self.destroy_pending = true;
            }
            if client.wants_service() {
                let (old, _) = client.core().run_state().transition(RunEvent::Schedule);
                if old == RunState::Idle {
                    self.pool.push(Arc::clone(client));
                }
            }
        }
    }

    fn destroy_cycle(&mut self) {
        let now = Instant::now();
        self.last_destroy = now;
        let mut doomed = Vec::new();
        let mut pending = false;

        for (id, client) in &self.registry {
            if !client.attn_flag().contains(AttnFlags::WANT_DELETE) {
                continue;
            }
            let first_seen = client.core().mark_destroy(now);
            if client.core().is_open() {
                guarded(*id, "handle_close", || client.handle_close());
            }
            let attn = client.attn_flag();
            let finished = !client.core().is_open()
                && attn.contains(AttnFlags::SHUTDOWN_DONE)
                && client.core().run_state().current().is_idle();
            if finished {
                doomed.push(*id);
                continue;
            }
            pending = true;
            if now.duration_since(first_seen) >= self.config.destroy_warn_after
                && self.warned_stuck.insert(*id)
            {
                warn!(
                    client = %id,
                    state = %client.core().run_state().current(),
                    shutdown_done = attn.contains(AttnFlags::SHUTDOWN_DONE),
                    pool_pending = self.pool.pending(),
                    busy_workers = self.pool.active_workers(),
                    "client stuck in destroy cycle"
                );
            }
        }

        for id in doomed {
            self.warned_stuck.remove(&id);
            if let Some(client) = self.registry.remove(&id) {
                guarded(id, "finalize", || client.finalize());
                debug!(
                    client = %id,
                    bytes_in = client.core().bytes_in(),
                    bytes_out = client.core().bytes_out(),
                    "client deleted"
                );
            }
        }
        self.destroy_pending = pending;
        self.shared.clients.store(self.registry.len(), Ordering::Release);
    }

    fn teardown(&mut self) {
        trace!(clients = self.registry.len(), "reactor tearing down");
        // Registrations that raced with Terminate.
        while let Some(msg) = self.shared.control.pop() {
            if let Control::AddClient(client) = msg {
                self.registry.insert(client.core().id(), client);
            }
        }
        for (id, client) in &self.registry {
            guarded(*id, "handle_close", || client.handle_close());
        }
        // Pool-mode clients still have to observe their Stop.
        self.attention_scan();
        self.pool.shutdown();
        for (id, client) in self.registry.drain() {
            guarded(id, "finalize", || client.finalize());
        }
        self.shared.clients.store(0, Ordering::Release);
    }
}
