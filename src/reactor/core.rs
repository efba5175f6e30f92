use super::clock::{Clock, Msec, to_msec};
use super::completion::{Completion, CompletionPort};
use super::message::MessageSource;
use super::poller::common::Interest;
use super::poller::platform::{
    self, poll_entry, poll_mask, revents_bits, sys_check_fd, sys_drain, sys_exit_status, sys_poll,
    sys_watch_dir,
};
use super::signal::{SignalChannel, Signaller};
use super::worker::{WorkerCore, WorkerRef, Workers};
use crate::builder::{Config, QueueBuilder};
use crate::error::{Error, Result};
use crate::event::{Event, EventFlags, EventId, Ready, ReadyBits, Readiness, Source};
use crate::utils::{Key, Slab};

use libc::{ENOENT, ENOTDIR, POLLIN, pollfd};
use log::{debug, trace, warn};
use std::ffi::CString;
use std::fmt;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Flags [`EventQueue::modify`] may change.
const MUTABLE: EventFlags = EventFlags::READ
    .union(EventFlags::WRITE)
    .union(EventFlags::ONESHOT)
    .union(EventFlags::TIMEOUT_MANUAL);

/// Subsystem an event is registered with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Binding {
    Slot(WorkerRef),
    Port,
    Signal,
    Message,
    Timer,
}

impl Binding {
    /// Worker whose timeout index holds the event's deadline.
    fn deadline_holder(self) -> WorkerRef {
        match self {
            Binding::Slot(worker) => worker,
            _ => WorkerRef::Head,
        }
    }
}

#[derive(Debug)]
struct Entry {
    event: Event,
    binding: Binding,
    timeout: Option<Msec>,
}

impl Entry {
    fn new(event: Event, binding: Binding) -> Self {
        Self {
            event,
            binding,
            timeout: None,
        }
    }
}

/// Something that fired during a wait cycle, before one-shot release and
/// deadline refresh are applied.
#[derive(Debug)]
struct Hit {
    id: EventId,
    readiness: Readiness,
    expired: bool,
}

impl Hit {
    fn fired(id: EventId, readiness: Readiness) -> Self {
        Self {
            id,
            readiness,
            expired: false,
        }
    }
}

/// Outcome of [`EventQueue::wait`].
#[derive(Debug)]
pub enum Wait {
    /// Events that became ready, each listed once.
    Ready(Vec<Ready>),
    /// Nothing is registered; waiting would block forever.
    NoEvents,
    /// The requested timeout elapsed with nothing ready.
    Timeout,
    /// Woken without anything to report; wait again.
    Spurious,
}

/// Armed event counts per subsystem.
///
/// `events` always equals the sum of the other counts except `workers`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub events: usize,
    pub slots: usize,
    pub completion_port: usize,
    pub timers: usize,
    pub signals: usize,
    pub messages: usize,
    /// Workers alive, head included.
    pub workers: usize,
}

/// The reactor.
///
/// An `EventQueue` multiplexes every registered [`Event`] behind one
/// blocking [`wait`](Self::wait) call, driven by a single thread. Events
/// that do not fit in the head worker's wait-set are moved to worker
/// threads transparently; overlapped sockets go through the completion
/// port; timers, signals and the host message queue need no slot at all.
///
/// # Examples
///
/// ```rust,no_run
/// use evq::{Event, EventFlags, EventQueue, Wait};
/// use std::time::Duration;
///
/// let mut queue = EventQueue::new()?;
/// let timer = queue.add_timer(Event::timer(EventFlags::ONESHOT), Duration::from_millis(50))?;
///
/// if let Wait::Ready(ready) = queue.wait(Some(Duration::from_secs(1)))? {
///     assert_eq!(ready[0].id(), timer);
/// }
/// # Ok::<(), evq::Error>(())
/// ```
pub struct EventQueue {
    config: Config,
    clock: Clock,
    /// Cached reading of `clock`, refreshed once per wait cycle.
    now: Msec,

    registry: Slab<Entry>,
    workers: Workers,
    port: Option<CompletionPort>,
    signals: SignalChannel,
    message: Option<EventId>,
    nevents: usize,

    /// Events delivered by the previous cycle (still flagged `ACTIVE`).
    active: Vec<EventId>,
    /// Port events to re-arm before the next wait.
    rearm: Vec<EventId>,
    fds: Vec<pollfd>,
}

impl EventQueue {
    /// Creates a queue with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] if a primitive cannot be created.
    pub fn new() -> Result<Self> {
        QueueBuilder::new().build()
    }

    pub(crate) fn with_config(config: Config) -> Result<Self> {
        let clock = Clock::new();
        let workers = Workers::new(config.capacity(), clock, config.thread_name.clone())
            .map_err(Error::Init)?;

        let port = if config.completion_port {
            Some(CompletionPort::new(config.max_wait_objects).map_err(Error::Init)?)
        } else {
            None
        };

        debug!(
            "event queue ready: {} slots per worker, completion port {}",
            config.capacity(),
            if port.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            now: clock.now(),
            clock,
            registry: Slab::new(config.max_wait_objects),
            workers,
            port,
            signals: SignalChannel::new(),
            message: None,
            nevents: 0,
            active: Vec::new(),
            rearm: Vec::new(),
            fds: Vec::with_capacity(config.max_wait_objects + 2),
            config,
        })
    }

    /// Releases every primitive owned by the queue.
    ///
    /// Dropping the queue has the same effect.
    pub fn shutdown(self) {
        drop(self);
    }

    /// Number of registered events.
    pub fn len(&self) -> usize {
        self.nevents
    }

    pub fn is_empty(&self) -> bool {
        self.nevents == 0
    }

    /// The registered event behind `id`.
    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.registry.get(id.0).map(|entry| &entry.event)
    }

    /// A handle for raising signals from other threads.
    pub fn signaller(&self) -> Signaller {
        Signaller::new(Arc::clone(self.workers.link()))
    }

    pub fn stats(&self) -> Stats {
        Stats {
            events: self.nevents,
            slots: self.workers.slot_count(),
            completion_port: self.port.as_ref().map_or(0, CompletionPort::len),
            timers: self
                .registry
                .iter()
                .filter(|(_, entry)| entry.binding == Binding::Timer)
                .count(),
            signals: self.signals.len(),
            messages: usize::from(self.message.is_some()),
            workers: self.workers.count(),
        }
    }

    /// Registers `event`.
    ///
    /// Signal and message events need no wait-set slot. Overlapped sockets
    /// go to the completion port when it is enabled. Everything else takes
    /// a slot on the first worker with room, creating one if needed.
    ///
    /// # Errors
    ///
    /// - [`Error::ResourceExhausted`] if no worker can host the event,
    /// - [`Error::Registration`] if the platform rejects the handle,
    /// - [`Error::MessageSlotTaken`] for a second message event.
    pub fn add(&mut self, mut event: Event) -> Result<EventId> {
        event.flags -= EventFlags::STATE;
        let flags = event.flags;

        if flags.contains(EventFlags::SIGNAL) {
            let signal = event
                .signal_number()
                .ok_or_else(|| invalid("signal event without a signal number"))?;

            let key = self.registry.insert(Entry::new(event, Binding::Signal));
            self.signals.add(signal, EventId(key));
            return Ok(self.registered(key));
        }

        if flags.contains(EventFlags::MESSAGE) {
            if self.message.is_some() {
                return Err(Error::MessageSlotTaken);
            }
            if !matches!(event.source, Source::Message(_)) {
                return Err(invalid("message event without a message source"));
            }

            let key = self.registry.insert(Entry::new(event, Binding::Message));
            self.message = Some(EventId(key));
            return Ok(self.registered(key));
        }

        if flags.contains(EventFlags::TIMER) {
            let key = self.registry.insert(Entry::new(event, Binding::Timer));
            return Ok(self.registered(key));
        }

        let fd = event
            .raw_fd()
            .ok_or_else(|| invalid("event has no handle"))?;

        let overlapped = flags.contains(EventFlags::SOCKET | EventFlags::OVERLAPPED)
            && !flags.contains(EventFlags::SOCKET_ACC_CONN);
        if overlapped && self.port.is_some() {
            self.add_overlapped(event, fd)
        } else {
            self.add_slot(event, fd)
        }
    }

    fn registered(&mut self, key: Key) -> EventId {
        self.nevents += 1;
        trace!("registered event {} ({} events)", key.index(), self.nevents);
        EventId(key)
    }

    fn add_slot(&mut self, event: Event, fd: RawFd) -> Result<EventId> {
        // poll(2) would report a dead descriptor as POLLNVAL forever.
        sys_check_fd(fd).map_err(Error::Registration)?;

        let worker = self.workers.place().map_err(Error::ResourceExhausted)?;
        let events = poll_mask(
            Interest::from_flags(event.flags),
            event.flags.contains(EventFlags::SOCKET),
        );

        let key = self.registry.insert(Entry::new(event, Binding::Slot(worker)));
        let id = EventId(key);

        if self
            .workers
            .with_core(worker, |core| core.push(fd, events, id))
            .is_none()
        {
            self.registry.remove(key);
            self.workers.release(worker);
            return Err(Error::ResourceExhausted(io::Error::other("worker is gone")));
        }

        Ok(self.registered(key))
    }

    fn add_overlapped(&mut self, mut event: Event, fd: RawFd) -> Result<EventId> {
        if self.config.skip_immediate {
            event.flags |= EventFlags::SKIP_IMMEDIATE;
        }
        event.flags |= EventFlags::AIO;

        let key = self.registry.insert(Entry::new(event, Binding::Port));
        let id = EventId(key);

        let associated = match self.port.as_mut() {
            Some(port) => port.associate(fd, id),
            None => Err(io::Error::from(io::ErrorKind::Unsupported)),
        };
        if let Err(err) = associated {
            self.registry.remove(key);
            return Err(Error::Registration(err));
        }
        debug!("fd {fd} associated with the completion port");

        if let Err(err) = self.arm(id) {
            if let Some(port) = self.port.as_mut() {
                if let Err(cause) = port.dissociate(fd, id, false) {
                    debug!("failed to dissociate fd {fd} after a failed arm: {cause}");
                }
            }
            self.registry.remove(key);
            return Err(err);
        }

        Ok(self.registered(key))
    }

    /// Starts the next completion port operation of `id`, if it has
    /// interest and nothing is outstanding.
    fn arm(&mut self, id: EventId) -> Result<()> {
        let (Some(entry), Some(port)) = (self.registry.get_mut(id.0), self.port.as_mut()) else {
            return Ok(());
        };
        let Some(fd) = entry.event.raw_fd() else {
            return Ok(());
        };

        let flags = entry.event.flags;
        let interest = Interest::from_flags(flags);
        if interest.is_empty() || flags.contains(EventFlags::PENDING) {
            return Ok(());
        }

        port.arm(fd, id, interest, flags.contains(EventFlags::SKIP_IMMEDIATE))
            .map_err(Error::Registration)?;
        entry.event.flags |= EventFlags::PENDING;

        Ok(())
    }

    /// Registers a pure timer firing `timeout` from now, then periodically
    /// unless it is one-shot.
    pub fn add_timer(&mut self, mut event: Event, timeout: Duration) -> Result<EventId> {
        event.flags |= EventFlags::TIMER;

        let id = self.add(event)?;
        self.set_timeout(id, Some(timeout))?;

        Ok(id)
    }

    /// Watches directory `path` for changes.
    ///
    /// With [`EventFlags::WATCH_LAST_WRITE`] only content writes are
    /// reported; otherwise name, attribute and size changes are too.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if `path` is not an existing
    /// directory.
    pub fn add_dirwatch(&mut self, mut event: Event, path: &Path) -> Result<EventId> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| Error::InvalidPath(path.to_path_buf()))?;

        let mask = if event.flags.contains(EventFlags::WATCH_LAST_WRITE) {
            platform::WATCH_LAST_WRITE
        } else {
            platform::WATCH_BROAD
        };

        let handle = sys_watch_dir(&c_path, mask).map_err(|err| match err.raw_os_error() {
            Some(ENOENT | ENOTDIR) => Error::InvalidPath(path.to_path_buf()),
            _ => Error::Registration(err),
        })?;

        event.source = Source::Owned(handle);
        event.flags |= EventFlags::DIRWATCH | EventFlags::READ;
        self.add(event)
    }

    /// Arms, refreshes or clears (`None`) the deadline of `id`.
    ///
    /// Setting the timeout it already has refreshes the deadline in place.
    pub fn set_timeout(&mut self, id: EventId, timeout: Option<Duration>) -> Result<()> {
        let entry = self.registry.get_mut(id.0).ok_or(Error::UnknownEvent)?;

        let msec = timeout.map(to_msec);
        let old = mem::replace(&mut entry.timeout, msec);
        let holder = entry.binding.deadline_holder();

        let now = self.now;

        self.workers.with_core(holder, |core| match (old, msec) {
            (Some(old), Some(new)) if old == new => refresh(core, id, new, now),
            _ => {
                if let Some(old) = old {
                    core.timeouts.remove(id, old);
                }
                if let Some(new) = msec {
                    core.timeouts.insert(id, new, now);
                }
            }
        });

        if msec.is_none() {
            self.workers.release(holder);
        }

        Ok(())
    }

    /// Unregisters `id` and hands the event back.
    ///
    /// `reuse_fd` tells the queue the handle may already be closed or
    /// reused, so no kernel-side deregistration is attempted on it.
    pub fn delete(&mut self, id: EventId, reuse_fd: bool) -> Result<Event> {
        self.unregister(id, reuse_fd).ok_or(Error::UnknownEvent)
    }

    fn unregister(&mut self, id: EventId, reuse_fd: bool) -> Option<Event> {
        let entry = self.registry.remove(id.0)?;
        self.nevents -= 1;

        let timeout = entry.timeout;
        match entry.binding {
            Binding::Slot(worker) => {
                self.workers.with_core(worker, |core| {
                    core.remove(id);
                    if let Some(msec) = timeout {
                        core.timeouts.remove(id, msec);
                    }
                });
                self.workers.release(worker);
            }
            binding => {
                if let Some(msec) = timeout {
                    self.workers
                        .with_core(WorkerRef::Head, |core| core.timeouts.remove(id, msec));
                }

                match binding {
                    Binding::Port => self.release_port(&entry.event, id, reuse_fd),
                    Binding::Signal => {
                        self.signals.remove(id);
                    }
                    Binding::Message => self.message = None,
                    Binding::Timer | Binding::Slot(_) => {}
                }
            }
        }

        trace!("unregistered event {} ({} events)", id.0.index(), self.nevents);

        let mut event = entry.event;
        event.flags -= EventFlags::STATE;
        Some(event)
    }

    fn release_port(&mut self, event: &Event, id: EventId, reuse_fd: bool) {
        let (Some(port), Some(fd)) = (self.port.as_mut(), event.raw_fd()) else {
            return;
        };

        if event.flags.contains(EventFlags::PENDING) && !reuse_fd {
            if let Err(err) = port.cancel(fd, id) {
                debug!("failed to cancel operation on fd {fd}: {err}");
            }
        }

        if let Err(err) = port.dissociate(fd, id, reuse_fd) {
            debug!("failed to dissociate fd {fd}: {err}");
        }
    }

    /// Changes the read/write interest and behavior flags of `id` in
    /// place. Kind flags are kept.
    pub fn modify(&mut self, id: EventId, flags: EventFlags) -> Result<()> {
        let entry = self.registry.get_mut(id.0).ok_or(Error::UnknownEvent)?;

        let updated = (entry.event.flags - MUTABLE) | (flags & MUTABLE);
        entry.event.flags = updated;
        let binding = entry.binding;

        match binding {
            Binding::Slot(worker) => {
                let events = poll_mask(
                    Interest::from_flags(updated),
                    updated.contains(EventFlags::SOCKET),
                );
                self.workers
                    .with_core(worker, |core| core.set_events(id, events));
            }
            Binding::Port if updated.contains(EventFlags::PENDING) => {
                entry.event.flags -= EventFlags::PENDING;
                let fd = entry.event.raw_fd();

                if let (Some(port), Some(fd)) = (self.port.as_mut(), fd) {
                    port.cancel(fd, id).map_err(Error::Registration)?;
                }
                self.arm(id)?;
            }
            Binding::Port => self.arm(id)?,
            Binding::Signal | Binding::Message | Binding::Timer => {}
        }

        Ok(())
    }

    /// Waits until something is ready or `timeout` (`None` = forever)
    /// elapses.
    ///
    /// One-shot events in the returned list are already unregistered and
    /// carried in their [`Ready`] record. Deadlines of delivered events are
    /// refreshed unless they use [`EventFlags::TIMEOUT_MANUAL`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::WaitFailed`] if the platform wait fails; nothing
    /// is delivered in that case.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Wait> {
        for id in mem::take(&mut self.active) {
            if let Some(entry) = self.registry.get_mut(id.0) {
                entry.event.flags -= EventFlags::ACTIVE;
            }
        }

        for id in mem::take(&mut self.rearm) {
            if let Err(err) = self.arm(id) {
                warn!("failed to re-arm event {}: {err}", id.0.index());
            }
        }

        if self.nevents == 0 {
            return Ok(Wait::NoEvents);
        }
        self.workers.resume();

        self.now = self.clock.now();
        let requested = timeout.map(to_msec);
        let mut budget = self.workers.head.core.timeouts.budget(requested, self.now);

        let mut completions = self.drain_port()?;
        if !completions.is_empty() || self.workers.link().signals_pending() {
            budget = Some(0);
        }

        self.fds.clear();
        self.workers.head.core.fill(&mut self.fds);
        let slots = self.fds.len();
        self.fds
            .push(poll_entry(self.workers.link().wakeup_fd(), POLLIN));
        if let Some(port) = &self.port {
            self.fds.push(poll_entry(port.raw_fd(), POLLIN));
        }
        if let Some(source) = self.message_source() {
            let fd = source.as_raw_fd();
            self.fds.push(poll_entry(fd, POLLIN));
        }

        trace!("waiting on {} descriptors, budget {budget:?}", self.fds.len());
        let polled = sys_poll(&mut self.fds, budget);
        self.now = self.clock.now();

        let timed_out = match polled {
            Ok(n) => {
                self.workers.head.core.record(&self.fds[..slots]);
                n == 0 && budget == requested
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => false,
            Err(err) => {
                if let Some(port) = self.port.as_mut() {
                    port.restore(completions);
                }
                return Err(Error::WaitFailed(err));
            }
        };

        match self.drain_port() {
            Ok(more) => completions.extend(more),
            Err(err) => {
                if let Some(port) = self.port.as_mut() {
                    port.restore(completions);
                }
                return Err(err);
            }
        }

        let mut hits = Vec::new();
        self.complete(completions, &mut hits);

        let now = self.now;
        scan(&mut self.workers.head.core, &self.registry, now, &mut hits);

        let funnel = self.workers.link().drain();
        for key in funnel.ready {
            let registry = &self.registry;
            self.workers
                .collect(key, |core| scan(core, registry, now, &mut hits));
        }

        for id in self.signals.process(funnel.signals) {
            hits.push(Hit::fired(id, Readiness::new(ReadyBits::READ)));
        }

        if let Some(id) = self.message {
            if self.message_source().is_some_and(|source| source.has_pending()) {
                hits.push(Hit::fired(id, Readiness::new(ReadyBits::READ)));
            }
        }

        let mut ready = Vec::new();
        for hit in hits {
            self.deliver(hit, &mut ready);
        }

        Ok(if !ready.is_empty() {
            Wait::Ready(ready)
        } else if timed_out {
            Wait::Timeout
        } else {
            Wait::Spurious
        })
    }

    fn drain_port(&mut self) -> Result<Vec<Completion>> {
        match self.port.as_mut() {
            Some(port) => port.drain().map_err(Error::WaitFailed),
            None => Ok(Vec::new()),
        }
    }

    fn message_source(&self) -> Option<&Arc<dyn MessageSource>> {
        let entry = self.registry.get(self.message?.0)?;
        match &entry.event.source {
            Source::Message(source) => Some(source),
            _ => None,
        }
    }

    /// Turns port completions into hits, dropping those of deleted events
    /// and of operations that were cancelled.
    fn complete(&mut self, completions: Vec<Completion>, hits: &mut Vec<Hit>) {
        for completion in completions {
            let id = completion.id;
            let Some(entry) = self.registry.get_mut(id.0) else {
                trace!("dropping completion of deleted event {}", id.0.index());
                continue;
            };
            if entry.binding != Binding::Port || !entry.event.flags.contains(EventFlags::PENDING) {
                trace!("dropping completion of idle event {}", id.0.index());
                continue;
            }

            entry.event.flags -= EventFlags::PENDING;
            let bits = Interest::from_flags(entry.event.flags).readiness(completion.state());
            if bits.is_empty() {
                self.rearm.push(id);
            } else {
                hits.push(Hit::fired(id, Readiness::new(bits)));
            }
        }
    }

    /// Adds `hit` to the ready list, then releases one-shot events and
    /// refreshes deadlines.
    fn deliver(&mut self, hit: Hit, ready: &mut Vec<Ready>) {
        let Hit {
            id,
            readiness,
            expired,
        } = hit;

        let Some(entry) = self.registry.get_mut(id.0) else {
            // Released earlier in this cycle.
            if let Some(prev) = ready.iter_mut().find(|prev| prev.id == id) {
                prev.readiness.merge(readiness);
            }
            return;
        };

        if entry.event.flags.contains(EventFlags::ACTIVE) {
            entry.event.readiness.merge(readiness);
            if let Some(prev) = ready.iter_mut().find(|prev| prev.id == id) {
                prev.readiness.merge(readiness);
            }
            return;
        }

        entry.event.flags |= EventFlags::ACTIVE;
        entry.event.readiness = readiness;
        let manual = entry.event.flags.contains(EventFlags::TIMEOUT_MANUAL);
        let binding = entry.binding;
        let timeout = entry.timeout;

        if entry.event.is_oneshot() {
            let released = self.unregister(id, false);
            ready.push(Ready {
                id,
                readiness,
                released,
            });
            return;
        }

        self.active.push(id);

        match timeout {
            Some(_) if expired && manual => {
                if let Some(entry) = self.registry.get_mut(id.0) {
                    entry.timeout = None;
                }
            }
            Some(msec) if expired || !manual => {
                let now = self.now;
                self.workers
                    .with_core(binding.deadline_holder(), |core| refresh(core, id, msec, now));
            }
            _ => {}
        }

        if binding == Binding::Port {
            self.rearm.push(id);
        }

        ready.push(Ready {
            id,
            readiness,
            released: None,
        });
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        // Readiness reported by workers but never collected.
        let _ = self.workers.link().drain();
        self.workers.shutdown();

        debug!("event queue shut down with {} events registered", self.nevents);
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("config", &self.config)
            .field("events", &self.nevents)
            .field("workers", &self.workers.count())
            .finish_non_exhaustive()
    }
}

fn invalid(message: &'static str) -> Error {
    Error::Registration(io::Error::new(io::ErrorKind::InvalidInput, message))
}

/// Moves the deadline of `id` to `msec` after `now`, arming it again if it
/// already expired.
fn refresh(core: &mut WorkerCore, id: EventId, msec: Msec, now: Msec) {
    if !core.timeouts.reset(id, msec, now) {
        core.timeouts.insert(id, msec, now);
    }
}

/// Collects expired deadlines, then signaled slots, of one worker.
fn scan(core: &mut WorkerCore, registry: &Slab<Entry>, now: Msec, hits: &mut Vec<Hit>) {
    for (id, _) in core.timeouts.expire(now) {
        hits.push(Hit {
            id,
            readiness: Readiness::new(ReadyBits::TIMEOUT),
            expired: true,
        });
    }

    for (id, revents) in core.take_fired() {
        let Some(entry) = registry.get(id.0) else {
            continue;
        };
        if let Some(readiness) = slot_readiness(&entry.event, revents) {
            hits.push(Hit::fired(id, readiness));
        }
    }
}

/// What a signaled slot means for its event's kind.
fn slot_readiness(event: &Event, revents: i16) -> Option<Readiness> {
    let flags = event.flags;

    if flags.contains(EventFlags::PROCESS) {
        return Some(Readiness::exited(event.pid().and_then(sys_exit_status)));
    }

    if flags.contains(EventFlags::DIRWATCH) {
        if let Some(fd) = event.raw_fd() {
            sys_drain(fd);
        }
        return Some(Readiness::new(ReadyBits::READ));
    }

    if flags.contains(EventFlags::SOCKET) {
        let bits = Interest::from_flags(flags).readiness(revents_bits(revents));
        return (!bits.is_empty()).then(|| Readiness::new(bits));
    }

    Some(Readiness::new(ReadyBits::READ))
}
