//! Completion port backend.
//!
//! Overlapped sockets do not take a wait-set slot. Each one is associated
//! with the port once, and every armed operation completes at most once;
//! the queue re-arms it after delivery unless the event is one-shot.
//!
//! Completions are tagged with the event id, generation included, so a
//! completion that was already queued when its event got deleted is
//! recognized as stale and dropped.

use super::poller::common::Interest;
use super::poller::platform::{Epoll, completion_bits, poll_mask, revents_bits, sys_probe};
use crate::event::EventId;
use crate::utils::Key;

use libc::{EEXIST, epoll_event};
use log::{debug, trace};
use std::io;
use std::os::fd::RawFd;

/// A finished operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Completion {
    pub(crate) id: EventId,
    pub(crate) readable: bool,
    pub(crate) writable: bool,
    pub(crate) closed: bool,
}

impl Completion {
    pub(crate) fn state(&self) -> (bool, bool, bool) {
        (self.readable, self.writable, self.closed)
    }
}

pub(crate) struct CompletionPort {
    epoll: Epoll,
    associated: usize,
    buffer: Vec<epoll_event>,
    /// Operations that finished synchronously when armed.
    immediate: Vec<Completion>,
}

impl CompletionPort {
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            epoll: Epoll::new()?,
            associated: 0,
            buffer: Vec::with_capacity(capacity),
            immediate: Vec::new(),
        })
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.epoll.raw()
    }

    /// Number of events associated with the port.
    pub(crate) fn len(&self) -> usize {
        self.associated
    }

    /// Associates `fd` with the port on behalf of `id`.
    ///
    /// A descriptor that is still associated (a previous owner deleted it
    /// with `reuse_fd`) is taken over as is.
    pub(crate) fn associate(&mut self, fd: RawFd, id: EventId) -> io::Result<()> {
        match self.epoll.associate(fd, id.0.to_bits()) {
            Ok(()) => {}
            Err(err) if err.raw_os_error() == Some(EEXIST) => {
                debug!("fd {fd} already associated with the completion port");
            }
            Err(err) => return Err(err),
        }

        self.associated += 1;
        Ok(())
    }

    /// Starts an operation for `interest`.
    ///
    /// With `skip_immediate`, an operation that can finish right away is
    /// not handed to the kernel; it is queued as an immediate completion
    /// and `true` is returned.
    pub(crate) fn arm(
        &mut self,
        fd: RawFd,
        id: EventId,
        interest: Interest,
        skip_immediate: bool,
    ) -> io::Result<bool> {
        if skip_immediate {
            let revents = sys_probe(fd, poll_mask(interest, true))?;
            if revents != 0 {
                let (readable, writable, closed) = revents_bits(revents);
                self.immediate.push(Completion {
                    id,
                    readable,
                    writable,
                    closed,
                });
                return Ok(true);
            }
        }

        self.epoll.arm(fd, id.0.to_bits(), interest)?;
        Ok(false)
    }

    /// Cancels the outstanding operation of `id`.
    pub(crate) fn cancel(&mut self, fd: RawFd, id: EventId) -> io::Result<()> {
        self.immediate.retain(|completion| completion.id != id);
        self.epoll.disarm(fd, id.0.to_bits())
    }

    /// Drops the association of `id`.
    ///
    /// With `reuse_fd` the descriptor may already be closed or reused, so
    /// the kernel registration is left alone.
    pub(crate) fn dissociate(&mut self, fd: RawFd, id: EventId, reuse_fd: bool) -> io::Result<()> {
        self.immediate.retain(|completion| completion.id != id);
        self.associated = self.associated.saturating_sub(1);

        if reuse_fd {
            return Ok(());
        }
        self.epoll.dissociate(fd)
    }

    /// Puts drained completions back in front of the queue.
    pub(crate) fn restore(&mut self, mut completions: Vec<Completion>) {
        completions.append(&mut self.immediate);
        self.immediate = completions;
    }

    /// Dequeues everything finished so far without blocking.
    pub(crate) fn drain(&mut self) -> io::Result<Vec<Completion>> {
        let mut done = std::mem::take(&mut self.immediate);

        self.epoll.drain(&mut self.buffer)?;
        for event in &self.buffer {
            let (readable, writable, closed) = completion_bits(event.events);
            done.push(Completion {
                id: EventId(Key::from_bits(event.u64)),
                readable,
                writable,
                closed,
            });
        }

        if !done.is_empty() {
            trace!("completion port: {} completions", done.len());
        }
        Ok(done)
    }
}
