//! `BufferedClient` — the concrete connection object.
//!
//! Bridges the reactor thread and one servicing context:
//!
//! ```text
//!   reactor thread                         servicing context
//!   ──────────────                         ─────────────────
//!   handle_input ──Data──▶ InboundFifo ──▶ ReadBuffer ──▶ ClientCallback
//!   handle_close ──Stop──▶                               process_input
//!                                                       process_close
//!   handle_output ◀────── OutboundQueue ◀── queue() / send_message()
//!                                           (any thread)
//! ```
//!
//! The servicing context is either a dedicated task thread
//! (`TaskMode::Thread`) or the reactor's worker pool (`TaskMode::Pool`);
//! both run the same servicing body, the task thread blocking on the FIFO
//! and the pool returning as soon as it is empty.

use std::os::unix::io::RawFd;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};

use sam_core::{
    is_transient, lock, AttnFlags, ClientCore, ClientId, HandleResult, Interest, ReactorClient,
    ReactorError, ReactorResult, Transport,
};
use sam_wire::{Codec, Container};
use tracing::{debug, error, trace, warn};

use crate::config::{ClientConfig, TaskMode};
use crate::inbound::InboundFifo;
use crate::outbound::{OutboundDepth, OutboundItem, OutboundQueue};
use crate::read_buffer::ReadBuffer;

/// Application hooks of a buffered client.
///
/// Both methods run on the servicing context, never on the reactor
/// thread, and never concurrently for one client.
pub trait ClientCallback: Send + Sync {
    /// Handle the unread input. Returns how many bytes were consumed;
    /// the rest is offered again once more input arrives.
    fn process_input(&self, client: &BufferedClient, data: &[u8]) -> usize;

    /// The connection is closed and all input has been delivered.
    fn process_close(&self, _client: &BufferedClient) {}
}

struct ServiceState {
    buf: ReadBuffer,
    stopped: bool,
    finished: bool,
}

pub struct BufferedClient {
    core: ClientCore,
    transport: Box<dyn Transport>,
    config: ClientConfig,
    codec: Codec,
    inbound: InboundFifo,
    outbound: OutboundQueue,
    callback: RwLock<Option<Arc<dyn ClientCallback>>>,
    released: AtomicBool,
    service: Mutex<ServiceState>,
    /// Thread currently running the servicing body.
    servicing_thread: Mutex<Option<ThreadId>>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Receive buffer for `handle_input`; reactor thread only.
    scratch: Mutex<Vec<u8>>,
    /// Inside a slow-consumer episode.
    slow: AtomicBool,
}

impl BufferedClient {
    /// Build a client without starting any servicing thread.
    pub fn new(
        id: ClientId,
        transport: Box<dyn Transport>,
        callback: Arc<dyn ClientCallback>,
        config: ClientConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: ClientCore::new(id),
            transport,
            codec: Codec::new(config.codec),
            service: Mutex::new(ServiceState {
                buf: ReadBuffer::with_capacity(config.read_buffer_capacity),
                stopped: false,
                finished: false,
            }),
            config,
            inbound: InboundFifo::new(),
            outbound: OutboundQueue::new(),
            callback: RwLock::new(Some(callback)),
            released: AtomicBool::new(false),
            servicing_thread: Mutex::new(None),
            task: Mutex::new(None),
            scratch: Mutex::new(Vec::new()),
            slow: AtomicBool::new(false),
        })
    }

    /// Build a client and, in `Thread` mode, start its task thread.
    pub fn spawn(
        id: ClientId,
        transport: Box<dyn Transport>,
        callback: Arc<dyn ClientCallback>,
        config: ClientConfig,
    ) -> ReactorResult<Arc<Self>> {
        let client = Self::new(id, transport, callback, config);
        if client.config.task_mode == TaskMode::Thread {
            client.start_task()?;
        }
        Ok(client)
    }

    fn start_task(self: &Arc<Self>) -> ReactorResult<()> {
        let client = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("sam-client-{}", self.id()))
            .spawn(move || client.task_main())
            .map_err(|source| ReactorError::Spawn { what: "client task", source })?;
        *lock(&self.task) = Some(handle);
        Ok(())
    }

    fn task_main(&self) {
        trace!(client = %self.id(), "task thread started");
        if catch_unwind(AssertUnwindSafe(|| self.run_service(true))).is_err() {
            error!(client = %self.id(), "unknown failure in task thread");
            self.finish_servicing();
        }
        trace!(client = %self.id(), "task thread exiting");
    }

    #[inline]
    pub fn id(&self) -> ClientId {
        self.core.id()
    }

    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[inline]
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Queue `data` and/or a close. Callable from any thread.
    pub fn queue(&self, data: Option<Vec<u8>>, close: bool) -> ReactorResult<()> {
        self.queue_from(data.map(|buf| (buf, 0)), close)
    }

    /// Queue `buf[pos..]` without copying.
    fn queue_from(&self, data: Option<(Vec<u8>, usize)>, close: bool) -> ReactorResult<()> {
        if !self.core.is_open() {
            return Err(ReactorError::QueueClosed(self.id()));
        }
        let bytes = self
            .outbound
            .push(data, close)
            .ok_or(ReactorError::QueueClosed(self.id()))?;
        self.note_depth(bytes);
        self.core.invalidate();
        Ok(())
    }

    pub fn send_bytes(&self, data: &[u8]) -> ReactorResult<()> {
        self.queue(Some(data.to_vec()), false)
    }

    /// Encode and queue `message`. An encode failure drops the message
    /// and leaves the connection open.
    pub fn send_message(&self, message: &Container) -> ReactorResult<()> {
        match self.codec.encode(message) {
            Ok(encoded) => self.queue_from(Some(encoded.into_parts()), false),
            Err(e) => {
                warn!(
                    client = %self.id(),
                    error = %e,
                    message = message.name(),
                    "dropping outbound message"
                );
                Err(ReactorError::MessageDropped { client: self.id(), reason: e.to_string() })
            }
        }
    }

    /// Flush what is queued, then close.
    pub fn close(&self) -> ReactorResult<()> {
        self.queue(None, true)
    }

    pub fn outbound_depth(&self) -> OutboundDepth {
        self.outbound.depth()
    }

    /// Whether the queued output has reached `slow_consumer_bytes`.
    pub fn is_slow_consumer(&self) -> bool {
        self.outbound.depth().bytes >= self.config.slow_consumer_bytes
    }

    fn note_depth(&self, bytes: usize) {
        if bytes >= self.config.slow_consumer_bytes {
            if !self.slow.swap(true, Ordering::Relaxed) {
                warn!(client = %self.id(), bytes, "slow consumer: outbound backlog over threshold");
            }
        } else if self.slow.load(Ordering::Relaxed) {
            self.slow.store(false, Ordering::Relaxed);
            debug!(client = %self.id(), bytes, "slow consumer caught up");
        }
    }

    // ── Detach ───────────────────────────────────────────────────────

    /// Hard detach: stop delivering to the callback and have the reactor
    /// close and delete this client.
    ///
    /// Waits for an in-flight callback unless called from the servicing
    /// context itself. Never joins the task thread.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.on_servicing_thread() {
            self.callback.write().unwrap_or_else(PoisonError::into_inner).take();
        }
        match self.core.link() {
            Some(link) => {
                link.request_close(self.id());
                link.request_delete(self.id());
            }
            None => debug!(client = %self.id(), "released before registration"),
        }
    }

    fn on_servicing_thread(&self) -> bool {
        *lock(&self.servicing_thread) == Some(thread::current().id())
    }

    /// Join the task thread, if any. Rejected from the task thread itself.
    pub fn join_task(&self) -> ReactorResult<()> {
        // The handle is stored after the thread starts; the servicing id
        // is set before the first callback runs.
        if self.config.task_mode == TaskMode::Thread && self.on_servicing_thread() {
            error!(client = %self.id(), "task thread attempted to join itself");
            return Err(ReactorError::SelfJoin(self.id()));
        }
        let mut slot = lock(&self.task);
        let Some(handle) = slot.take() else {
            return Ok(());
        };
        if handle.thread().id() == thread::current().id() {
            *slot = Some(handle);
            error!(client = %self.id(), "task thread attempted to join itself");
            return Err(ReactorError::SelfJoin(self.id()));
        }
        drop(slot);
        if handle.join().is_err() {
            error!(client = %self.id(), "task thread panicked");
        }
        Ok(())
    }

    // ── Servicing ────────────────────────────────────────────────────

    fn with_callback<R>(&self, f: impl FnOnce(&dyn ClientCallback) -> R) -> Option<R> {
        if self.released.load(Ordering::Acquire) {
            return None;
        }
        let guard = self.callback.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_deref().map(f)
    }

    /// Run the servicing body. Returns `true` once servicing has finished.
    fn run_service(&self, block: bool) -> bool {
        *lock(&self.servicing_thread) = Some(thread::current().id());
        let finished = self.service_body(block);
        *lock(&self.servicing_thread) = None;
        finished
    }

    fn service_body(&self, block: bool) -> bool {
        let mut st = lock(&self.service);
        if st.finished {
            return true;
        }
        loop {
            let drained = self.inbound.drain_into(&mut st.buf, block);
            if drained.stopped {
                st.stopped = true;
            }
            self.deliver(&mut st.buf);
            if st.stopped {
                if !st.buf.is_empty() {
                    debug!(
                        client = %self.id(),
                        bytes = st.buf.available(),
                        "discarding incomplete input at close"
                    );
                    st.buf.clear();
                }
                st.finished = true;
                drop(st);
                self.finish_servicing();
                return true;
            }
            if !block {
                return false;
            }
        }
    }

    /// Offer the unread bytes to the callback until it stops consuming.
    fn deliver(&self, buf: &mut ReadBuffer) {
        while !buf.is_empty() {
            let data = buf.data();
            let outcome = self.with_callback(|cb| {
                catch_unwind(AssertUnwindSafe(|| cb.process_input(self, data)))
            });
            match outcome {
                None => {
                    buf.clear();
                    break;
                }
                Some(Ok(0)) => break,
                Some(Ok(n)) => buf.consume(n),
                Some(Err(_)) => {
                    error!(client = %self.id(), "unknown failure in process_input");
                    buf.clear();
                    self.request_close();
                    break;
                }
            }
        }
        buf.compact();
    }

    fn finish_servicing(&self) {
        if self.core.attn().contains(AttnFlags::SHUTDOWN_DONE) {
            return;
        }
        let closed =
            self.with_callback(|cb| catch_unwind(AssertUnwindSafe(|| cb.process_close(self))));
        if let Some(Err(_)) = closed {
            error!(client = %self.id(), "unknown failure in process_close");
        }
        self.callback.write().unwrap_or_else(PoisonError::into_inner).take();
        self.core.set_attn(AttnFlags::SHUTDOWN_DONE);
        self.core.invalidate();
        trace!(client = %self.id(), "servicing finished");
    }

    fn request_close(&self) {
        if let Some(link) = self.core.link() {
            link.request_close(self.id());
        }
    }
}

impl ReactorClient for BufferedClient {
    fn core(&self) -> &ClientCore {
        &self.core
    }

    fn fd(&self) -> RawFd {
        if self.core.is_open() {
            self.transport.raw_fd()
        } else {
            -1
        }
    }

    fn events(&self) -> Interest {
        if !self.core.is_open() {
            return Interest::NONE;
        }
        if self.outbound.is_empty() {
            Interest::READ
        } else {
            Interest::READ | Interest::WRITE
        }
    }

    fn handle_input(&self) -> HandleResult {
        let chunk = self.config.read_chunk_size;
        let mut scratch = lock(&self.scratch);
        scratch.resize(chunk, 0);
        match self.transport.recv(&mut scratch) {
            Ok(0) => {
                debug!(client = %self.id(), "peer closed");
                HandleResult::Close
            }
            Ok(n) => {
                self.core.record_read(n);
                self.inbound.push_data(scratch[..n].to_vec());
                if n == chunk {
                    HandleResult::ReadAgain
                } else {
                    HandleResult::Default
                }
            }
            Err(e) if is_transient(&e) => HandleResult::Default,
            Err(e) => {
                warn!(client = %self.id(), error = %e, "recv failed");
                HandleResult::Close
            }
        }
    }

    fn handle_output(&self) -> HandleResult {
        let Some(item) = self.outbound.pop() else {
            return HandleResult::Default;
        };
        let (buf, pos) = match item {
            OutboundItem::Close => {
                debug!(client = %self.id(), "output flushed, closing");
                return HandleResult::Close;
            }
            OutboundItem::Data { buf, pos } => (buf, pos),
        };
        match self.transport.send(&buf[pos..]) {
            Ok(n) => {
                self.core.record_write(n);
                if pos + n < buf.len() {
                    self.outbound.requeue(OutboundItem::Data { buf, pos: pos + n });
                }
                self.note_depth(self.outbound.depth().bytes);
                HandleResult::Default
            }
            Err(e) if is_transient(&e) => {
                self.outbound.requeue(OutboundItem::Data { buf, pos });
                HandleResult::Default
            }
            Err(e) => {
                warn!(client = %self.id(), error = %e, "send failed");
                HandleResult::Close
            }
        }
    }

    fn handle_close(&self) {
        if !self.core.mark_closed() {
            return;
        }
        self.transport.close();
        let dropped = self.outbound.shut();
        if dropped > 0 {
            debug!(client = %self.id(), bytes = dropped, "discarding unsent output");
        }
        self.inbound.push_stop();
        self.core.set_attn(AttnFlags::WANT_DELETE);
        debug!(
            client = %self.id(),
            bytes_in = self.core.bytes_in(),
            bytes_out = self.core.bytes_out(),
            "connection closed"
        );
    }

    fn wants_service(&self) -> bool {
        self.config.task_mode == TaskMode::Pool && !self.inbound.is_empty()
    }

    fn do_work(&self) {
        self.run_service(false);
    }

    fn finalize(&self) {
        // Errors are logged by join_task.
        let _ = self.join_task();
    }
}

impl std::fmt::Debug for BufferedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedClient")
            .field("core", &self.core)
            .field("task_mode", &self.config.task_mode)
            .field("outbound", &self.outbound.depth())
            .finish()
    }
}
