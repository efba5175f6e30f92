//! Reactor core.
//!
//! This module implements the readiness multiplexing engine:
//! - the [`EventQueue`] and its wait algorithm,
//! - the worker pool working around the wait-set size limit,
//! - the completion port backend for overlapped sockets,
//! - per-worker deadline indexes,
//! - the signal channel and the host message queue.
//!
//! Platform details live in `poller`; the rest is written against the
//! wait-set model it exposes.

mod clock;
mod completion;
mod core;
mod signal;
mod timeout;
mod worker;

pub(crate) mod message;
pub(crate) mod poller;

pub use self::core::{EventQueue, Stats, Wait};
pub use message::{MessagePort, MessageSource};
pub use signal::Signaller;
