//! # evq
//!
//! **evq** is an embeddable event reactor: one blocking call that waits on
//! sockets, timers, process exits, directory changes, signals raised from
//! other threads and a host message queue, and returns the list of events
//! that became ready.
//!
//! The reactor is driven by a single thread. It is not an I/O library nor
//! a task executor: it reports readiness, the embedder does the work.
//!
//! - Events beyond the size of one wait-set are moved to worker threads
//!   that report back to the polling thread.
//! - Overlapped sockets can skip the wait-set entirely and complete through
//!   a completion port.
//! - Deadlines are kept per worker and computed from one clock reading per
//!   cycle, so equal timeouts armed together expire in registration order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use evq::{Event, EventFlags, EventQueue, Wait};
//! use std::os::fd::AsRawFd;
//! use std::os::unix::net::UnixStream;
//! use std::time::Duration;
//!
//! let (stream, _peer) = UnixStream::pair()?;
//! let mut queue = EventQueue::new()?;
//!
//! let socket = queue.add(Event::socket(stream.as_raw_fd(), EventFlags::READ))?;
//! queue.add_timer(Event::timer(EventFlags::empty()), Duration::from_millis(100))?;
//!
//! loop {
//!     match queue.wait(None)? {
//!         Wait::Ready(ready) => {
//!             for event in ready {
//!                 if event.id() == socket && event.readiness().is_readable() {
//!                     // read from `stream`
//!                 }
//!             }
//!         }
//!         Wait::NoEvents => break,
//!         Wait::Timeout | Wait::Spurious => continue,
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Platform
//!
//! Linux only: wait-sets are `poll(2)` calls, wakeups are `eventfd`s, the
//! completion port is an `epoll` instance, process events use pidfds and
//! directory watches use inotify.

mod builder;
mod error;
mod event;
mod reactor;
mod utils;

pub use builder::{DEFAULT_MAX_WAIT_OBJECTS, QueueBuilder};
pub use error::{Error, Result};
pub use event::{Event, EventFlags, EventId, Ready, ReadyBits, Readiness, Signal};
pub use reactor::{EventQueue, MessagePort, MessageSource, Signaller, Stats, Wait};
