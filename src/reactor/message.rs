//! Host message queue.
//!
//! The queue only needs to know whether messages are waiting and which
//! descriptor becomes readable when one is posted. Embedders with their
//! own queue implement [`MessageSource`]; [`MessagePort`] is a ready-made
//! in-process queue.

use super::poller::platform::WakeFd;
use crate::event::{Event, EventFlags};

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, PoisonError};

/// A message queue the reactor can wait on.
///
/// The descriptor must stay readable while [`has_pending`](Self::has_pending)
/// is `true`.
pub trait MessageSource: Send + Sync {
    /// Descriptor that becomes readable when a message is posted.
    fn as_raw_fd(&self) -> RawFd;

    /// Whether at least one message is waiting.
    fn has_pending(&self) -> bool;
}

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    wakeup: WakeFd,
}

/// Multi-producer message queue observable by an [`EventQueue`](crate::EventQueue).
///
/// Clones share the same queue.
pub struct MessagePort<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for MessagePort<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> MessagePort<T> {
    /// # Errors
    ///
    /// Fails if the wakeup descriptor cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                wakeup: WakeFd::new()?,
            }),
        })
    }

    /// Appends a message and marks the port readable.
    pub fn post(&self, message: T) {
        let mut queue = self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.push_back(message);
        self.inner.wakeup.signal();
    }

    /// Pops the oldest message.
    pub fn try_recv(&self) -> Option<T> {
        let mut queue = self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let message = queue.pop_front();
        if queue.is_empty() {
            self.inner.wakeup.reset();
        }
        message
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A message event observing this port.
    pub fn event(&self, flags: EventFlags) -> Event {
        Event::message(Arc::new(self.clone()), flags)
    }
}

impl<T: Send + 'static> MessageSource for MessagePort<T> {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.wakeup.raw()
    }

    fn has_pending(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> fmt::Debug for MessagePort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePort")
            .field("fd", &self.inner.wakeup.raw())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::poller::platform::sys_probe;

    #[test]
    fn test_port_is_readable_while_messages_wait() {
        let port = MessagePort::new().expect("port");
        let fd = MessageSource::as_raw_fd(&port);

        assert_eq!(sys_probe(fd, libc::POLLIN).expect("probe"), 0);

        port.post(1);
        port.clone().post(2);
        assert!(port.has_pending());
        assert_ne!(sys_probe(fd, libc::POLLIN).expect("probe"), 0);

        assert_eq!(port.try_recv(), Some(1));
        assert_ne!(sys_probe(fd, libc::POLLIN).expect("probe"), 0);
        assert_eq!(port.try_recv(), Some(2));
        assert_eq!(sys_probe(fd, libc::POLLIN).expect("probe"), 0);
        assert_eq!(port.try_recv(), None);
    }
}
