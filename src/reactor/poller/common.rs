use crate::event::{EventFlags, ReadyBits};

/// Read/write interest requested from a wait-set slot or the completion port.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) fn from_flags(flags: EventFlags) -> Self {
        Self {
            read: flags.contains(EventFlags::READ),
            write: flags.contains(EventFlags::WRITE),
        }
    }

    pub(crate) fn is_empty(self) -> bool {
        !self.read && !self.write
    }

    /// Maps a socket's (readable, writable, closed) state onto this
    /// interest. A closed stream satisfies both directions.
    pub(crate) fn readiness(self, (readable, writable, closed): (bool, bool, bool)) -> ReadyBits {
        let mut bits = ReadyBits::empty();
        if self.read && (readable || closed) {
            bits |= ReadyBits::READ;
        }
        if self.write && (writable || closed) {
            bits |= ReadyBits::WRITE;
        }
        if closed {
            bits |= ReadyBits::EOF;
        }
        bits
    }
}

/// Converts a millisecond budget into the `int` timeout taken by the
/// kernel wait calls. `None` waits forever.
pub(crate) fn timeout_arg(timeout: Option<u64>) -> i32 {
    match timeout {
        None => -1,
        Some(ms) => ms.min(i32::MAX as u64) as i32,
    }
}
