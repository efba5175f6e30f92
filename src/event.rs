//! The reactor's unit of registration.
//!
//! An [`Event`] describes one readiness interest: which handle to watch,
//! what to watch it for and how the registration behaves once it fires.
//! Events are handed to an [`EventQueue`](crate::EventQueue), which returns
//! an [`EventId`] and later reports readiness as [`Ready`] records.

use crate::reactor::message::MessageSource;
use crate::reactor::poller::platform::sys_pidfd_open;
use crate::utils::Key;

use bitflags::bitflags;
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

bitflags! {
    /// Interest, kind and behavior flags of an [`Event`].
    ///
    /// The bits in [`EventFlags::STATE`] are maintained by the queue and
    /// are stripped from anything the embedder passes in.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EventFlags: u32 {
        /// Report read readiness.
        const READ = 1 << 0;
        /// Report write readiness.
        const WRITE = 1 << 1;

        /// The handle is a connected (or connecting) socket.
        const SOCKET = 1 << 2;
        /// The handle is a socket that accepts connections.
        const SOCKET_ACC_CONN = 1 << 3;
        /// Pure timer, no handle.
        const TIMER = 1 << 4;
        /// Interest in a [`Signal`] raised through a [`Signaller`](crate::Signaller).
        const SIGNAL = 1 << 5;
        /// Interest in the host message queue.
        const MESSAGE = 1 << 6;
        /// The handle is a process; fires once it exits.
        const PROCESS = 1 << 7;
        /// Directory change notification.
        const DIRWATCH = 1 << 8;
        /// The socket may use the completion port instead of a wait-set slot.
        const OVERLAPPED = 1 << 9;

        /// Unregister automatically after the first delivery.
        const ONESHOT = 1 << 10;
        /// Do not refresh the deadline when the event is delivered.
        const TIMEOUT_MANUAL = 1 << 11;
        /// Complete synchronously finished operations inline.
        const SKIP_IMMEDIATE = 1 << 12;
        /// Directory watch reports content writes only.
        const WATCH_LAST_WRITE = 1 << 13;

        /// Delivered in the current wait cycle.
        const ACTIVE = 1 << 16;
        /// An operation is outstanding on the completion port.
        const PENDING = 1 << 17;
        /// Associated with the completion port.
        const AIO = 1 << 18;

        /// Bits owned by the queue.
        const STATE = Self::ACTIVE.bits() | Self::PENDING.bits() | Self::AIO.bits();
    }
}

bitflags! {
    /// Conditions that fired for a delivered event.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ReadyBits: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EOF = 1 << 2;
        const TIMEOUT = 1 << 3;
        const EXITED = 1 << 4;
    }
}

/// What fired for an event: any subset of read, write, end-of-stream,
/// timeout and process exit (with its exit code).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    bits: ReadyBits,
    exit_code: Option<i32>,
}

impl Readiness {
    pub(crate) fn new(bits: ReadyBits) -> Self {
        Self {
            bits,
            exit_code: None,
        }
    }

    pub(crate) fn exited(exit_code: Option<i32>) -> Self {
        Self {
            bits: ReadyBits::READ | ReadyBits::EXITED,
            exit_code,
        }
    }

    pub(crate) fn merge(&mut self, other: Readiness) {
        self.bits |= other.bits;
        if other.exit_code.is_some() {
            self.exit_code = other.exit_code;
        }
    }

    pub fn bits(&self) -> ReadyBits {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn is_readable(&self) -> bool {
        self.bits.contains(ReadyBits::READ)
    }

    pub fn is_writable(&self) -> bool {
        self.bits.contains(ReadyBits::WRITE)
    }

    /// The peer closed the stream.
    pub fn is_eof(&self) -> bool {
        self.bits.contains(ReadyBits::EOF)
    }

    /// The event's deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        self.bits.contains(ReadyBits::TIMEOUT)
    }

    pub fn has_exited(&self) -> bool {
        self.bits.contains(ReadyBits::EXITED)
    }

    /// Exit code of a process event.
    ///
    /// A process killed by a signal reports the negated signal number.
    /// `None` if the process has not exited or its status was already
    /// collected elsewhere.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

/// An out-of-band signal number, `0..64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signal(u8);

impl Signal {
    /// Generic "attention requested" signal.
    pub const INTERRUPT: Signal = Signal(0);

    /// Number of distinct signals.
    pub const COUNT: usize = 64;

    pub fn new(number: u8) -> Option<Self> {
        (usize::from(number) < Self::COUNT).then_some(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub(crate) fn mask(self) -> u64 {
        1 << self.0
    }
}

/// Identity of a registered event.
///
/// Ids go stale when the event is unregistered; a stale id is rejected by
/// every queue operation and is never reused for another event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub(crate) Key);

/// The handle an event watches.
pub(crate) enum Source {
    None,
    Fd(RawFd),
    Owned(OwnedFd),
    Process { handle: OwnedFd, pid: u32 },
    Message(Arc<dyn MessageSource>),
    Signal(Signal),
}

impl Source {
    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        match self {
            Source::Fd(fd) => Some(*fd),
            Source::Owned(fd) | Source::Process { handle: fd, .. } => Some(fd.as_raw_fd()),
            Source::Message(source) => Some(MessageSource::as_raw_fd(&**source)),
            Source::None | Source::Signal(_) => None,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::None => f.write_str("None"),
            Source::Fd(fd) => f.debug_tuple("Fd").field(fd).finish(),
            Source::Owned(fd) => f.debug_tuple("Owned").field(fd).finish(),
            Source::Process { handle, pid } => f
                .debug_struct("Process")
                .field("handle", handle)
                .field("pid", pid)
                .finish(),
            Source::Message(source) => f
                .debug_tuple("Message")
                .field(&MessageSource::as_raw_fd(&**source))
                .finish(),
            Source::Signal(signal) => f.debug_tuple("Signal").field(signal).finish(),
        }
    }
}

/// One readiness interest.
///
/// Built with one of the constructors below, which set the kind flag;
/// behavior modifiers such as [`EventFlags::ONESHOT`] are passed in
/// `flags` together with the read/write interest.
#[derive(Debug)]
pub struct Event {
    pub(crate) source: Source,
    pub(crate) flags: EventFlags,
    pub(crate) readiness: Readiness,
}

impl Event {
    fn with_source(source: Source, flags: EventFlags) -> Self {
        Self {
            source,
            flags: flags - EventFlags::STATE,
            readiness: Readiness::default(),
        }
    }

    /// A connected socket. The caller keeps ownership of `fd`.
    pub fn socket(fd: RawFd, flags: EventFlags) -> Self {
        Self::with_source(Source::Fd(fd), flags | EventFlags::SOCKET)
    }

    /// A listening socket, reported readable when a connection is pending.
    pub fn listener(fd: RawFd, flags: EventFlags) -> Self {
        Self::with_source(
            Source::Fd(fd),
            flags | EventFlags::SOCKET | EventFlags::SOCKET_ACC_CONN | EventFlags::READ,
        )
    }

    /// Any other waitable handle (pipe, eventfd, ...), reported readable
    /// once signaled. The caller keeps ownership of `fd`.
    pub fn handle(fd: RawFd, flags: EventFlags) -> Self {
        Self::with_source(Source::Fd(fd), flags)
    }

    /// Process `pid`, reported once it exits together with its exit code.
    ///
    /// # Errors
    ///
    /// Fails if a process handle cannot be opened for `pid`.
    pub fn process(pid: u32, flags: EventFlags) -> io::Result<Self> {
        let handle = sys_pidfd_open(pid)?;

        Ok(Self::with_source(
            Source::Process { handle, pid },
            flags | EventFlags::PROCESS | EventFlags::READ,
        ))
    }

    /// A pure timer; register it with
    /// [`EventQueue::add_timer`](crate::EventQueue::add_timer).
    pub fn timer(flags: EventFlags) -> Self {
        Self::with_source(Source::None, flags | EventFlags::TIMER)
    }

    /// Interest in `signal`.
    pub fn signal(signal: Signal, flags: EventFlags) -> Self {
        Self::with_source(
            Source::Signal(signal),
            flags | EventFlags::SIGNAL | EventFlags::READ,
        )
    }

    /// Interest in a host message queue.
    pub fn message(source: Arc<dyn MessageSource>, flags: EventFlags) -> Self {
        Self::with_source(
            Source::Message(source),
            flags | EventFlags::MESSAGE | EventFlags::READ,
        )
    }

    /// A directory watch; register it with
    /// [`EventQueue::add_dirwatch`](crate::EventQueue::add_dirwatch),
    /// which opens the notification handle.
    pub fn dirwatch(flags: EventFlags) -> Self {
        Self::with_source(
            Source::None,
            flags | EventFlags::DIRWATCH | EventFlags::READ,
        )
    }

    pub fn flags(&self) -> EventFlags {
        self.flags
    }

    /// What fired the last time this event was delivered.
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// The watched descriptor, if the event has one.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.source.raw_fd()
    }

    pub fn pid(&self) -> Option<u32> {
        match self.source {
            Source::Process { pid, .. } => Some(pid),
            _ => None,
        }
    }

    pub(crate) fn signal_number(&self) -> Option<Signal> {
        match self.source {
            Source::Signal(signal) => Some(signal),
            _ => None,
        }
    }

    pub(crate) fn is_oneshot(&self) -> bool {
        self.flags.contains(EventFlags::ONESHOT)
    }
}

/// One entry of a wait cycle's ready list.
#[derive(Debug)]
pub struct Ready {
    pub(crate) id: EventId,
    pub(crate) readiness: Readiness,
    pub(crate) released: Option<Event>,
}

impl Ready {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Whether the event was unregistered as part of this delivery
    /// (one-shot events).
    pub fn is_released(&self) -> bool {
        self.released.is_some()
    }

    /// Takes back a released event, e.g. to register it again.
    pub fn into_event(self) -> Option<Event> {
        self.released
    }
}
