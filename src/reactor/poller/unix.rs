//! Linux kernel objects backing the reactor.
//!
//! - wait-sets are `pollfd` arrays observed by `poll(2)`,
//! - wakeup objects are non-blocking `eventfd`s,
//! - the completion port is an `epoll` instance whose registrations are
//!   armed one operation at a time with `EPOLLONESHOT`,
//! - process handles are pidfds, change notifications are inotify watches.

use super::common::{Interest, timeout_arg};

use libc::{
    CLD_EXITED, EFD_CLOEXEC, EFD_NONBLOCK, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL,
    EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLONESHOT, EPOLLOUT, EPOLLRDHUP, IN_ATTRIB,
    IN_CLOEXEC, IN_CLOSE_WRITE, IN_CREATE, IN_DELETE, IN_MODIFY, IN_MOVED_FROM, IN_MOVED_TO,
    IN_NONBLOCK, IN_ONLYDIR, P_PID, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, POLLRDHUP,
    WEXITED, WNOHANG, WNOWAIT, c_void, epoll_event, pollfd,
};
use std::ffi::CStr;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// `revents` bits meaning "readable" for a socket slot.
pub(crate) const POLL_READ: i16 = POLLIN | POLLRDHUP | POLLHUP | POLLERR;

/// `revents` bits meaning "writable" for a socket slot.
pub(crate) const POLL_WRITE: i16 = POLLOUT | POLLHUP | POLLERR;

/// `revents` bits meaning the peer closed or the descriptor is dead.
pub(crate) const POLL_CLOSED: i16 = POLLRDHUP | POLLHUP | POLLNVAL;

/// Change-notification filter covering names, attributes, size and writes.
pub(crate) const WATCH_BROAD: u32 =
    IN_CREATE | IN_DELETE | IN_MOVED_FROM | IN_MOVED_TO | IN_ATTRIB | IN_MODIFY | IN_CLOSE_WRITE;

/// Change-notification filter reporting content writes only.
pub(crate) const WATCH_LAST_WRITE: u32 = IN_MODIFY | IN_CLOSE_WRITE;

/// Builds a `pollfd` entry.
pub(crate) fn poll_entry(fd: RawFd, events: i16) -> pollfd {
    pollfd {
        fd,
        events,
        revents: 0,
    }
}

/// Returns the `poll` mask for a slot.
///
/// Sockets are observed for the requested interest; every other handle
/// kind is observed for "signaled", which the kernel reports as readable.
pub(crate) fn poll_mask(interest: Interest, socket: bool) -> i16 {
    if !socket {
        return POLLIN;
    }

    let mut events = 0;
    if interest.read {
        events |= POLLIN | POLLRDHUP;
    }
    if interest.write {
        events |= POLLOUT;
    }
    events
}

/// Blocks in `poll(2)` until one of `fds` is signaled or `timeout` (ms)
/// elapses. `None` waits forever.
///
/// Returns the number of signaled entries; `0` means the timeout elapsed.
/// `EINTR` is passed through as [`io::ErrorKind::Interrupted`].
pub(crate) fn sys_poll(fds: &mut [pollfd], timeout: Option<u64>) -> io::Result<usize> {
    let rc = unsafe {
        libc::poll(
            fds.as_mut_ptr(),
            fds.len() as libc::nfds_t,
            timeout_arg(timeout),
        )
    };

    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(rc as usize)
}

/// Checks a single descriptor without blocking and returns its `revents`.
pub(crate) fn sys_probe(fd: RawFd, events: i16) -> io::Result<i16> {
    let mut fds = [poll_entry(fd, events)];
    sys_poll(&mut fds, Some(0))?;
    Ok(fds[0].revents)
}

/// Fails with `EBADF` if `fd` is not an open descriptor.
pub(crate) fn sys_check_fd(fd: RawFd) -> io::Result<()> {
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Wakeup object used to interrupt a blocking wait from another thread.
///
/// Wraps a non-blocking `eventfd`. Signals are sticky until
/// [`reset`](Self::reset), so a wakeup sent before the waiter blocks is
/// never lost.
#[derive(Debug)]
pub(crate) struct WakeFd(OwnedFd);

impl WakeFd {
    pub(crate) fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self(unsafe { OwnedFd::from_raw_fd(fd) }))
    }

    /// Sets the object to the signaled state.
    pub(crate) fn signal(&self) {
        let buf: u64 = 1;
        // EAGAIN means the counter is saturated, which is still signaled.
        unsafe {
            libc::write(
                self.0.as_raw_fd(),
                &buf as *const u64 as *const c_void,
                8,
            );
        }
    }

    /// Returns the object to the non-signaled state.
    pub(crate) fn reset(&self) {
        let mut buf: u64 = 0;
        unsafe {
            libc::read(
                self.0.as_raw_fd(),
                &mut buf as *mut u64 as *mut c_void,
                8,
            );
        }
    }

    pub(crate) fn raw(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

/// Kernel side of the completion port.
#[derive(Debug)]
pub(crate) struct Epoll(OwnedFd);

impl Epoll {
    pub(crate) fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self(unsafe { OwnedFd::from_raw_fd(fd) }))
    }

    pub(crate) fn raw(&self) -> RawFd {
        self.0.as_raw_fd()
    }

    fn ctl(&self, op: i32, fd: RawFd, events: u32, token: u64) -> io::Result<()> {
        let mut event = epoll_event { events, u64: token };

        let rc = unsafe { libc::epoll_ctl(self.0.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Associates `fd` with the port without any operation outstanding.
    ///
    /// Fails with `EEXIST` if the descriptor is already associated.
    pub(crate) fn associate(&self, fd: RawFd, token: u64) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, EPOLLONESHOT as u32, token)
    }

    /// Starts one operation for `interest`; it completes at most once.
    pub(crate) fn arm(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        let mut events = EPOLLONESHOT;
        if interest.read {
            events |= EPOLLIN | EPOLLRDHUP;
        }
        if interest.write {
            events |= EPOLLOUT;
        }

        self.ctl(EPOLL_CTL_MOD, fd, events as u32, token)
    }

    /// Cancels any outstanding operation on `fd`.
    pub(crate) fn disarm(&self, fd: RawFd, token: u64) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, EPOLLONESHOT as u32, token)
    }

    pub(crate) fn dissociate(&self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe {
            libc::epoll_ctl(self.0.as_raw_fd(), EPOLL_CTL_DEL, fd, std::ptr::null_mut())
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Dequeues finished operations without blocking.
    pub(crate) fn drain(&self, events: &mut Vec<epoll_event>) -> io::Result<usize> {
        events.clear();

        let n = unsafe {
            libc::epoll_wait(
                self.0.as_raw_fd(),
                events.as_mut_ptr(),
                events.capacity() as i32,
                0,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        unsafe {
            events.set_len(n as usize);
        }

        Ok(n as usize)
    }
}

/// Maps epoll completion bits onto (readable, writable, closed).
pub(crate) fn completion_bits(events: u32) -> (bool, bool, bool) {
    let readable = events & ((EPOLLIN | EPOLLRDHUP | EPOLLHUP | EPOLLERR) as u32) != 0;
    let writable = events & ((EPOLLOUT | EPOLLHUP | EPOLLERR) as u32) != 0;
    let closed = events & ((EPOLLRDHUP | EPOLLHUP) as u32) != 0;

    (readable, writable, closed)
}

/// Maps `poll` revents of a socket slot onto (readable, writable, closed).
pub(crate) fn revents_bits(revents: i16) -> (bool, bool, bool) {
    (
        revents & POLL_READ != 0,
        revents & POLL_WRITE != 0,
        revents & POLL_CLOSED != 0,
    )
}

/// Opens a pollable handle for process `pid`.
pub(crate) fn sys_pidfd_open(pid: u32) -> io::Result<OwnedFd> {
    let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid as libc::pid_t, 0 as libc::c_uint) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

/// Reads the exit status of an exited child without reaping it.
///
/// A child killed by a signal reports the negated signal number.
pub(crate) fn sys_exit_status(pid: u32) -> Option<i32> {
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };

    let rc = unsafe {
        libc::waitid(
            P_PID,
            pid as libc::id_t,
            &mut info,
            WEXITED | WNOHANG | WNOWAIT,
        )
    };
    if rc < 0 {
        return None;
    }

    let (child, status) = unsafe { (info.si_pid(), info.si_status()) };
    if child == 0 {
        return None;
    }

    if info.si_code == CLD_EXITED {
        Some(status)
    } else {
        Some(-status)
    }
}

/// Opens a change-notification handle on directory `path`.
pub(crate) fn sys_watch_dir(path: &CStr, mask: u32) -> io::Result<OwnedFd> {
    let fd = unsafe { libc::inotify_init1(IN_NONBLOCK | IN_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let watch = unsafe { OwnedFd::from_raw_fd(fd) };

    let wd = unsafe { libc::inotify_add_watch(fd, path.as_ptr(), mask | IN_ONLYDIR) };
    if wd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(watch)
}

/// Consumes everything queued on a non-blocking descriptor, returning a
/// change-notification handle to the non-signaled state.
pub(crate) fn sys_drain(fd: RawFd) {
    let mut buf = [0u8; 4096];

    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
        if n <= 0 {
            break;
        }
    }
}
