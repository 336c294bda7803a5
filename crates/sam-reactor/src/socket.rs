//! `SocketTransport` — `Transport` over a non-blocking stream socket.
//!
//! Works for any connected stream that owns its descriptor (`TcpStream`,
//! `UnixStream`). Reads and writes go straight to `recv(2)`/`send(2)` so
//! writes can carry `MSG_NOSIGNAL` and a vanished peer yields `EPIPE`
//! rather than `SIGPIPE`.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use cfg_if::cfg_if;
use nix::errno::Errno;
use sam_core::Transport;

cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
        const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
    } else {
        const SEND_FLAGS: libc::c_int = 0;
    }
}

pub struct SocketTransport<S> {
    stream: S,
    closed: AtomicBool,
}

impl<S: AsRawFd + Send + Sync> SocketTransport<S> {
    /// Wrap `stream`, switching it to non-blocking mode.
    pub fn new(stream: S) -> io::Result<Self> {
        set_nonblocking(stream.as_raw_fd())?;
        Ok(Self { stream, closed: AtomicBool::new(false) })
    }

    #[inline]
    fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(Errno::last().into());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(Errno::last().into());
    }
    Ok(())
}

impl<S: AsRawFd + Send + Sync> Transport for SocketTransport<S> {
    fn raw_fd(&self) -> RawFd {
        if self.closed.load(Ordering::Acquire) {
            -1
        } else {
            self.fd()
        }
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let rc = unsafe {
            libc::recv(self.fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
        };
        if rc < 0 {
            return Err(Errno::last().into());
        }
        Ok(rc as usize)
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let rc = unsafe {
            libc::send(self.fd(), buf.as_ptr() as *const libc::c_void, buf.len(), SEND_FLAGS)
        };
        if rc < 0 {
            return Err(Errno::last().into());
        }
        Ok(rc as usize)
    }

    /// Shut the socket down both ways. The descriptor itself is released
    /// when the transport is dropped, so its number cannot be reused
    /// while the reactor still holds the client.
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        unsafe {
            libc::shutdown(self.fd(), libc::SHUT_RDWR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sam_core::is_transient;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_send_recv_pair() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let t = SocketTransport::new(a).unwrap();
        assert_eq!(t.send(b"hello").unwrap(), 5);
        let mut got = [0u8; 5];
        b.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"hello");

        b.write_all(b"back").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(t.recv(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"back");
    }

    #[test]
    fn test_recv_would_block() {
        let (a, _b) = UnixStream::pair().unwrap();
        let t = SocketTransport::new(a).unwrap();
        let mut buf = [0u8; 4];
        let err = t.recv(&mut buf).unwrap_err();
        assert!(is_transient(&err));
    }

    #[test]
    fn test_peer_close_reads_zero_and_send_fails() {
        let (a, b) = UnixStream::pair().unwrap();
        let t = SocketTransport::new(a).unwrap();
        drop(b);
        let mut buf = [0u8; 4];
        assert_eq!(t.recv(&mut buf).unwrap(), 0);
        let err = t.send(b"x").unwrap_err();
        assert!(!is_transient(&err));
    }

    #[test]
    fn test_close_once() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let t = SocketTransport::new(a).unwrap();
        let fd = t.raw_fd();
        assert!(fd >= 0);
        t.close();
        t.close();
        assert_eq!(t.raw_fd(), -1);
        let mut buf = [0u8; 1];
        assert_eq!(b.read(&mut buf).unwrap(), 0);
    }
}
