//! `WorkerPool` — fixed set of threads servicing pool-mode clients.
//!
//! The reactor pushes a client after moving it `Idle → Queued`. A worker
//! pops it, claims it (`Queued → Running`) and calls `do_work()` until the
//! `Finish` transition reports that no more work arrived meanwhile.
//!
//! Shutdown pushes one `None` sentinel per worker. A worker seeing a
//! sentinel at the head leaves it there, re-notifies and exits, so every
//! other worker observes it too. Work queued before the sentinels is
//! still serviced.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;

use sam_core::{lock, ReactorClient, ReactorError, ReactorResult, RunEvent, RunState};
use tracing::{debug, error, warn};

type Slot = Option<Arc<dyn ReactorClient>>;

/// Shared state between the reactor and workers.
struct PoolInner {
    queue: Mutex<VecDeque<Slot>>,
    ready: Condvar,
    /// Workers currently inside `do_work`.
    active: AtomicUsize,
    total: usize,
}

pub struct WorkerPool {
    inner: Arc<PoolInner>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `n` workers.
    pub fn new(n: usize) -> ReactorResult<Self> {
        let n = n.max(1);
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            active: AtomicUsize::new(0),
            total: n,
        });

        let pool = WorkerPool { inner, handles: Mutex::new(Vec::with_capacity(n)) };
        for worker_id in 0..n {
            let inner = Arc::clone(&pool.inner);
            let spawned = thread::Builder::new()
                .name(format!("sam-worker-{}", worker_id))
                .spawn(move || worker_loop(inner, worker_id));
            match spawned {
                Ok(handle) => lock(&pool.handles).push(handle),
                Err(source) => {
                    pool.shutdown();
                    return Err(ReactorError::Spawn { what: "worker", source });
                }
            }
        }
        Ok(pool)
    }

    /// Hand a client (already moved to `Queued`) to the workers.
    pub fn push(&self, client: Arc<dyn ReactorClient>) {
        lock(&self.inner.queue).push_back(Some(client));
        self.inner.ready.notify_one();
    }

    /// Clients waiting for a worker.
    pub fn pending(&self) -> usize {
        lock(&self.inner.queue).iter().filter(|slot| slot.is_some()).count()
    }

    pub fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    pub fn total_workers(&self) -> usize {
        self.inner.total
    }

    /// Let queued work finish, then stop and join every worker.
    pub fn shutdown(&self) {
        let handles = std::mem::take(&mut *lock(&self.handles));
        if handles.is_empty() {
            return;
        }
        {
            let mut queue = lock(&self.inner.queue);
            for _ in 0..handles.len() {
                queue.push_back(None);
            }
        }
        self.inner.ready.notify_all();
        for handle in handles {
            if handle.join().is_err() {
                error!("worker thread panicked outside a work item");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker thread main loop.
fn worker_loop(inner: Arc<PoolInner>, worker_id: usize) {
    debug!(worker = worker_id, "worker started");
    loop {
        let client = {
            let mut queue = lock(&inner.queue);
            loop {
                let sentinel_at_head = queue.front().map(Option::is_none);
                match sentinel_at_head {
                    None => {
                        queue = inner.ready.wait(queue).unwrap_or_else(PoisonError::into_inner);
                    }
                    Some(true) => {
                        drop(queue);
                        inner.ready.notify_all();
                        debug!(worker = worker_id, "worker exiting");
                        return;
                    }
                    Some(false) => break queue.pop_front().flatten(),
                }
            }
        };
        if let Some(client) = client {
            inner.active.fetch_add(1, Ordering::Relaxed);
            service(&*client, worker_id);
            inner.active.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// Claim `client` and run it until no more work is pending.
fn service(client: &dyn ReactorClient, worker_id: usize) {
    let id = client.core().id();
    let (old, _) = client.core().run_state().transition(RunEvent::Claim);
    if old != RunState::Queued {
        warn!(client = %id, state = %old, "ignoring claim of client that is not queued");
        return;
    }
    loop {
        if catch_unwind(AssertUnwindSafe(|| client.do_work())).is_err() {
            error!(client = %id, worker = worker_id, "unknown failure in do_work");
        }
        let transition = client.core().run_state().transition(RunEvent::Finish);
        if transition != (RunState::Queued, RunState::Running) {
            break;
        }
    }
}
