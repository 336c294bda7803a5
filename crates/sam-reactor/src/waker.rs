//! Self-pipe waker for the reactor's poll loop.
//!
//! Any thread calls `wake()`; the loop polls `read_fd()` and calls
//! `drain()` when it becomes readable. Wakes are coalesced: while one is
//! pending, further calls do not touch the pipe.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use cfg_if::cfg_if;
use nix::errno::Errno;

pub struct Waker {
    read_fd: RawFd,
    write_fd: RawFd,
    pending: AtomicBool,
}

impl Waker {
    /// Create a non-blocking, close-on-exec pipe pair.
    pub fn new() -> io::Result<Self> {
        let [read_fd, write_fd] = open_pipe()?;
        Ok(Self { read_fd, write_fd, pending: AtomicBool::new(false) })
    }

    /// Descriptor to poll for readability.
    #[inline]
    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    /// Wake the loop.
    pub fn wake(&self) -> io::Result<()> {
        if self.pending.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let byte = 1u8;
        loop {
            let rc = unsafe {
                libc::write(self.write_fd, &byte as *const u8 as *const libc::c_void, 1)
            };
            if rc >= 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                // Pipe full: a wake is already readable.
                Errno::EAGAIN => return Ok(()),
                e => {
                    self.pending.store(false, Ordering::Release);
                    return Err(e.into());
                }
            }
        }
    }

    /// Consume pending wake bytes. Called by the loop only, before it
    /// applies queued control messages.
    pub fn drain(&self) {
        self.empty_pipe();
        self.clear_pending();
    }

    fn empty_pipe(&self) {
        let mut buf = [0u8; 64];
        loop {
            let rc = unsafe {
                libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if rc > 0 {
                continue;
            }
            if rc < 0 && Errno::last() == Errno::EINTR {
                continue;
            }
            break;
        }
    }

    /// Only after the pipe is empty: a wake coalesced before this point
    /// is covered by the control pass that follows the drain, and any
    /// later wake writes a fresh byte.
    fn clear_pending(&self) {
        self.pending.store(false, Ordering::Release);
    }

    #[cfg(test)]
    fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
        fn open_pipe() -> io::Result<[RawFd; 2]> {
            let mut fds = [-1 as RawFd; 2];
            if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) } < 0 {
                return Err(Errno::last().into());
            }
            Ok(fds)
        }
    } else {
        fn open_pipe() -> io::Result<[RawFd; 2]> {
            let mut fds = [-1 as RawFd; 2];
            if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
                return Err(Errno::last().into());
            }
            for fd in fds {
                unsafe {
                    libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK);
                    libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
                }
            }
            Ok(fds)
        }
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}
