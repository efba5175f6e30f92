//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the reactor.
//! In particular, it exposes a generation-tagged [`Slab`] used to hand out
//! event identities that go stale once the event is removed.

mod slab;

pub(crate) use slab::{Key, Slab};
