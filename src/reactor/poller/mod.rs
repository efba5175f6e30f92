//! Platform-specific wait primitives.
//!
//! This module provides the kernel objects the reactor is built from:
//! - bounded wait-sets observed by one blocking call,
//! - wakeup objects used to interrupt a blocked wait from another thread,
//! - the completion port used for overlapped socket operations,
//! - process and change-notification handles.
//!
//! The concrete implementation is selected at compile time
//! depending on the target operating system.

pub(crate) mod common;

#[cfg(target_os = "linux")]
pub(crate) mod unix;

#[cfg(target_os = "linux")]
pub(crate) use unix as platform;

#[cfg(not(target_os = "linux"))]
compile_error!("evq currently ships a Linux platform layer only");
