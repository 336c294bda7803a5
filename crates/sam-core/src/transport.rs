//! Non-blocking byte transport abstraction.
//!
//! The buffered client never touches a socket directly; it reads and
//! writes through a `Transport`. The default implementation wraps a
//! non-blocking stream socket (`sam_reactor::socket::SocketTransport`);
//! tests substitute scripted transports that return short counts.

use std::io;
use std::os::unix::io::RawFd;

/// A non-blocking, connected byte stream.
///
/// **Contract:**
/// - `recv` and `send` make a single attempt and never block. A full
///   socket buffer or an empty receive queue is reported as
///   `io::ErrorKind::WouldBlock`.
/// - `recv` returning `Ok(0)` means the peer closed.
/// - `close` releases the descriptor; it is called at most once and
///   `raw_fd` returns a negative value afterwards.
pub trait Transport: Send + Sync {
    fn raw_fd(&self) -> RawFd;

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    fn close(&self);
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    #[inline]
    fn raw_fd(&self) -> RawFd {
        (**self).raw_fd()
    }

    #[inline]
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).recv(buf)
    }

    #[inline]
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).send(buf)
    }

    #[inline]
    fn close(&self) {
        (**self).close()
    }
}

/// Whether an I/O error should simply be retried on the next loop pass.
#[inline]
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }
}
