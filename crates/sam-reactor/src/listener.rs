//! `Acceptor` — blocking accept thread feeding a reactor.
//!
//! Each accepted connection becomes a [`BufferedClient`] over a
//! [`SocketTransport`], with an id from the injected [`IdAllocator`] and a
//! callback from the factory, and is registered through the reactor
//! handle. `accept(2)` is the only blocking socket call in the system.
//!
//! `stop()` raises a flag and connects to the listener once so the
//! blocked `accept` returns.

use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sam_core::{ClientId, IdAllocator, ReactorClient, ReactorError, ReactorResult, Transport};
use tracing::{debug, error, info, warn};

use crate::buffered_client::{BufferedClient, ClientCallback};
use crate::config::ClientConfig;
use crate::reactor::ReactorHandle;
use crate::socket::SocketTransport;

/// Builds the per-connection callback.
pub type CallbackFactory = dyn Fn(ClientId) -> Arc<dyn ClientCallback> + Send + Sync;

/// Pause after an accept failure that is not an interrupt, so a full fd
/// table does not turn into a busy loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Address a listener is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl std::fmt::Display for BoundAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundAddr::Tcp(addr) => write!(f, "tcp://{}", addr),
            BoundAddr::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    fn accept(&self) -> io::Result<(Box<dyn Transport>, String)> {
        match self {
            Listener::Tcp(l) => {
                let (stream, peer) = l.accept()?;
                stream.set_nodelay(true)?;
                Ok((Box::new(SocketTransport::new(stream)?), peer.to_string()))
            }
            Listener::Unix(l) => {
                let (stream, _) = l.accept()?;
                Ok((Box::new(SocketTransport::new(stream)?), "unix".to_string()))
            }
        }
    }
}

/// Everything the accept thread needs to build a client.
struct Wiring {
    handle: ReactorHandle,
    ids: Arc<dyn IdAllocator>,
    config: ClientConfig,
    factory: Arc<CallbackFactory>,
}

impl Wiring {
    /// Returns `false` once the reactor refuses new clients.
    fn admit(&self, transport: Box<dyn Transport>, peer: &str) -> bool {
        let id = self.ids.next();
        let callback = (self.factory)(id);
        let client = match BufferedClient::spawn(id, transport, callback, self.config.clone()) {
            Ok(c) => c,
            Err(e) => {
                warn!(client = %id, error = %e, "could not start client");
                return true;
            }
        };
        match self.handle.add_client(client.clone()) {
            Ok(()) => {
                debug!(client = %id, peer, "connection accepted");
                true
            }
            Err(e) => {
                debug!(client = %id, error = %e, "reactor gone, dropping connection");
                client.handle_close();
                client.finalize();
                false
            }
        }
    }
}

pub struct Acceptor {
    addr: BoundAddr,
    stopping: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Acceptor {
    /// Bind a TCP listener and start accepting.
    pub fn bind_tcp(
        addr: impl ToSocketAddrs,
        handle: ReactorHandle,
        ids: Arc<dyn IdAllocator>,
        config: ClientConfig,
        factory: Arc<CallbackFactory>,
    ) -> ReactorResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(addr)?;
        let addr = BoundAddr::Tcp(listener.local_addr()?);
        Self::start(Listener::Tcp(listener), addr, Wiring { handle, ids, config, factory })
    }

    /// Bind a Unix-domain listener at `path`, replacing a stale socket file.
    pub fn bind_unix(
        path: impl AsRef<Path>,
        handle: ReactorHandle,
        ids: Arc<dyn IdAllocator>,
        config: ClientConfig,
        factory: Arc<CallbackFactory>,
    ) -> ReactorResult<Self> {
        config.validate()?;
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let listener = UnixListener::bind(path)?;
        let addr = BoundAddr::Unix(path.to_path_buf());
        Self::start(Listener::Unix(listener), addr, Wiring { handle, ids, config, factory })
    }

    fn start(listener: Listener, addr: BoundAddr, wiring: Wiring) -> ReactorResult<Self> {
        let stopping = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopping);
        let thread = thread::Builder::new()
            .name("sam-acceptor".into())
            .spawn(move || accept_loop(listener, wiring, flag))
            .map_err(|source| ReactorError::Spawn { what: "acceptor", source })?;
        info!(addr = %addr, "listening");
        Ok(Self { addr, stopping, thread: Some(thread) })
    }

    pub fn local_addr(&self) -> &BoundAddr {
        &self.addr
    }

    /// Stop accepting and join the accept thread. Idempotent.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stopping.store(true, Ordering::Release);
        if !thread.is_finished() {
            if let Err(e) = self.unblock() {
                warn!(addr = %self.addr, error = %e, "could not wake accept thread");
            }
        }
        if thread.join().is_err() {
            error!("acceptor thread panicked");
        }
        if let BoundAddr::Unix(path) = &self.addr {
            let _ = fs::remove_file(path);
        }
        info!(addr = %self.addr, "stopped listening");
    }

    fn unblock(&self) -> io::Result<()> {
        match &self.addr {
            BoundAddr::Tcp(addr) => {
                let mut target = *addr;
                if target.ip().is_unspecified() {
                    target.set_ip(match target.ip() {
                        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
                    });
                }
                TcpStream::connect_timeout(&target, Duration::from_secs(1)).map(drop)
            }
            BoundAddr::Unix(path) => UnixStream::connect(path).map(drop),
        }
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: Listener, wiring: Wiring, stopping: Arc<AtomicBool>) {
    loop {
        let accepted = listener.accept();
        if stopping.load(Ordering::Acquire) {
            break;
        }
        match accepted {
            Ok((transport, peer)) => {
                if !wiring.admit(transport, &peer) {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "accept failed");
                thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }
    debug!("accept loop exiting");
}
