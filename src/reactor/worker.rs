//! Worker pool.
//!
//! A single `poll(2)` call observes at most `max_wait_objects` descriptors,
//! one of which is always the worker's own wakeup. Events beyond the head
//! worker's capacity are placed on secondary workers, each blocking in its
//! own thread and reporting back through the head's funnel:
//!
//! 1. the thread wakes because a slot fired or a deadline elapsed,
//! 2. it records the `revents`, marks itself [`Run::Ready`] and pushes its
//!    key into the funnel,
//! 3. the head wakeup is set, which ends the poller's blocking wait,
//! 4. the poller scans the worker's slots and puts it back to sleep.
//!
//! A worker's slots belong to its thread only while it is [`Run::Active`];
//! the thread takes the [`WorkerCore`] out of the shared state for the
//! duration of the wait and hands it back before changing state. Every
//! other access goes through [`Workers::with_core`], which first brings
//! an active worker to rest.

use super::clock::Clock;
use super::poller::platform::{WakeFd, poll_entry, sys_poll};
use super::timeout::TimeoutIndex;
use crate::event::EventId;
use crate::utils::{Key, Slab};

use libc::{POLLIN, pollfd};
use log::{debug, trace, warn};
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Which worker hosts an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkerRef {
    Head,
    Thread(Key),
}

#[derive(Debug)]
struct SlotEntry {
    fd: RawFd,
    events: i16,
    id: EventId,
    revents: i16,
}

/// Slots and deadlines of one worker.
#[derive(Debug)]
pub(crate) struct WorkerCore {
    slots: Vec<SlotEntry>,
    capacity: usize,
    pub(crate) timeouts: TimeoutIndex,
}

impl WorkerCore {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            timeouts: TimeoutIndex::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn has_room(&self) -> bool {
        self.slots.len() < self.capacity
    }

    /// No slot and no deadline; nothing to wait for.
    pub(crate) fn is_idle(&self) -> bool {
        self.slots.is_empty() && self.timeouts.is_empty()
    }

    pub(crate) fn push(&mut self, fd: RawFd, events: i16, id: EventId) {
        self.slots.push(SlotEntry {
            fd,
            events,
            id,
            revents: 0,
        });
    }

    /// Releases the slot of `id`; later slots shift down, keeping order.
    pub(crate) fn remove(&mut self, id: EventId) -> bool {
        match self.slots.iter().position(|slot| slot.id == id) {
            Some(pos) => {
                self.slots.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_events(&mut self, id: EventId, events: i16) -> bool {
        match self.slots.iter_mut().find(|slot| slot.id == id) {
            Some(slot) => {
                slot.events = events;
                slot.revents = 0;
                true
            }
            None => false,
        }
    }

    /// Appends one `pollfd` per slot, in slot order.
    pub(crate) fn fill(&self, fds: &mut Vec<pollfd>) {
        fds.extend(self.slots.iter().map(|slot| poll_entry(slot.fd, slot.events)));
    }

    /// Stores the `revents` of the leading `fds`, as laid out by [`fill`](Self::fill).
    pub(crate) fn record(&mut self, fds: &[pollfd]) {
        for (slot, fd) in self.slots.iter_mut().zip(fds) {
            slot.revents = fd.revents;
        }
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.slots.iter().any(|slot| slot.revents != 0)
    }

    /// Takes every signaled slot with its `revents`, in slot order.
    ///
    /// All slots are collected before any one-shot release shifts the
    /// array, so adjacent signaled slots are never skipped.
    pub(crate) fn take_fired(&mut self) -> Vec<(EventId, i16)> {
        self.slots
            .iter_mut()
            .filter(|slot| slot.revents != 0)
            .map(|slot| (slot.id, mem::take(&mut slot.revents)))
            .collect()
    }
}

/// State shared between the poller and every secondary worker.
#[derive(Debug, Default)]
pub(crate) struct Funnel {
    /// Workers that reported readiness since the last drain.
    pub(crate) ready: Vec<Key>,
    /// Pending signal mask.
    pub(crate) signals: u64,
}

/// The head worker's lock and wakeup, shared with worker threads and
/// [`Signaller`](crate::Signaller)s.
#[derive(Debug)]
pub(crate) struct HeadLink {
    funnel: Mutex<Funnel>,
    wakeup: WakeFd,
}

impl HeadLink {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            funnel: Mutex::new(Funnel::default()),
            wakeup: WakeFd::new()?,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Funnel> {
        self.funnel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wakeup_fd(&self) -> RawFd {
        self.wakeup.raw()
    }

    pub(crate) fn report(&self, worker: Key) {
        self.lock().ready.push(worker);
        self.wakeup.signal();
    }

    pub(crate) fn raise(&self, mask: u64) {
        self.lock().signals |= mask;
        self.wakeup.signal();
    }

    pub(crate) fn signals_pending(&self) -> bool {
        self.lock().signals != 0
    }

    /// Takes everything reported so far and clears the head wakeup.
    pub(crate) fn drain(&self) -> Funnel {
        let mut funnel = self.lock();
        self.wakeup.reset();
        mem::take(&mut *funnel)
    }
}

/// Worker polled inline by the poller thread.
#[derive(Debug)]
pub(crate) struct HeadWorker {
    pub(crate) core: WorkerCore,
    pub(crate) link: Arc<HeadLink>,
}

/// Run state of a secondary worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Run {
    /// Dormant; slots may be reconfigured.
    Sleep,
    /// Blocked in its wait; owns its slots.
    Active,
    /// Reported readiness and waits to be scanned.
    Ready,
    /// Asked to terminate.
    Exit,
}

#[derive(Debug)]
struct WorkerState {
    run: Run,
    core: Option<WorkerCore>,
}

#[derive(Debug)]
struct WorkerShared {
    state: Mutex<WorkerState>,
    cond: Condvar,
    wakeup: WakeFd,
}

impl WorkerShared {
    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, WorkerState>) -> MutexGuard<'a, WorkerState> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker with its own thread.
#[derive(Debug)]
struct ThreadedWorker {
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
    /// Mirrors of the core's counts, readable while the thread owns it.
    slots: usize,
    deadlines: usize,
}

impl ThreadedWorker {
    fn is_idle(&self) -> bool {
        self.slots == 0 && self.deadlines == 0
    }

    /// Brings the worker to rest and returns its state.
    fn settle(&self) -> MutexGuard<'_, WorkerState> {
        let mut state = self.shared.lock();

        if state.run == Run::Active {
            self.shared.wakeup.signal();
            while state.run == Run::Active {
                state = self.shared.wait(state);
            }
        }

        state
    }
}

fn worker_loop(shared: Arc<WorkerShared>, link: Arc<HeadLink>, key: Key, clock: Clock) {
    let mut fds = Vec::new();

    loop {
        let mut core = {
            let mut state = shared.lock();
            while matches!(state.run, Run::Sleep | Run::Ready) {
                state = shared.wait(state);
            }
            if state.run == Run::Exit {
                return;
            }
            match state.core.take() {
                Some(core) => core,
                None => return,
            }
        };

        fds.clear();
        core.fill(&mut fds);
        fds.push(poll_entry(shared.wakeup.raw(), POLLIN));

        let budget = core.timeouts.budget(None, clock.now());
        trace!("worker {}: waiting on {} slots, budget {budget:?}", key.index(), core.len());

        let polled = sys_poll(&mut fds, budget);
        let woken = fds.last().is_some_and(|fd| fd.revents != 0);
        if woken {
            shared.wakeup.reset();
        }

        let mut fired = false;
        match polled {
            Ok(_) => {
                core.record(&fds);
                fired = core.has_fired() || core.timeouts.budget(None, clock.now()) == Some(0);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => warn!("worker {}: wait failed: {err}", key.index()),
        }

        let mut state = shared.lock();
        state.core = Some(core);
        state.run = if fired { Run::Ready } else { Run::Sleep };
        drop(state);
        shared.cond.notify_all();

        if fired {
            link.report(key);
        }
    }
}

/// The head worker followed by any number of threaded workers.
#[derive(Debug)]
pub(crate) struct Workers {
    pub(crate) head: HeadWorker,
    threads: Slab<ThreadedWorker>,
    capacity: usize,
    clock: Clock,
    thread_name: String,
    spawned: usize,
}

impl Workers {
    pub(crate) fn new(
        capacity: usize,
        clock: Clock,
        thread_name: String,
    ) -> io::Result<Self> {
        Ok(Self {
            head: HeadWorker {
                core: WorkerCore::new(capacity),
                link: Arc::new(HeadLink::new()?),
            },
            threads: Slab::new(4),
            capacity,
            clock,
            thread_name,
            spawned: 0,
        })
    }

    pub(crate) fn link(&self) -> &Arc<HeadLink> {
        &self.head.link
    }

    /// Number of workers, head included.
    pub(crate) fn count(&self) -> usize {
        1 + self.threads.len()
    }

    /// Occupied slots across all workers.
    pub(crate) fn slot_count(&self) -> usize {
        self.head.core.len() + self.threads.iter().map(|(_, worker)| worker.slots).sum::<usize>()
    }

    /// Picks the first worker with a free slot, spawning one if every
    /// worker is full.
    pub(crate) fn place(&mut self) -> io::Result<WorkerRef> {
        if self.head.core.has_room() {
            return Ok(WorkerRef::Head);
        }

        if let Some((key, _)) = self
            .threads
            .iter()
            .find(|(_, worker)| worker.slots < self.capacity)
        {
            return Ok(WorkerRef::Thread(key));
        }

        self.spawn().map(WorkerRef::Thread)
    }

    fn spawn(&mut self) -> io::Result<Key> {
        let shared = Arc::new(WorkerShared {
            state: Mutex::new(WorkerState {
                run: Run::Sleep,
                core: Some(WorkerCore::new(self.capacity)),
            }),
            cond: Condvar::new(),
            wakeup: WakeFd::new()?,
        });

        let key = self.threads.insert(ThreadedWorker {
            shared: Arc::clone(&shared),
            thread: None,
            slots: 0,
            deadlines: 0,
        });

        let link = Arc::clone(&self.head.link);
        let clock = self.clock;
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.thread_name, self.spawned))
            .spawn(move || worker_loop(shared, link, key, clock));

        match spawned {
            Ok(handle) => {
                if let Some(worker) = self.threads.get_mut(key) {
                    worker.thread = Some(handle);
                }
                self.spawned += 1;
                debug!("spawned worker {} ({} workers)", key.index(), self.count());
                Ok(key)
            }
            Err(err) => {
                self.threads.remove(key);
                Err(err)
            }
        }
    }

    /// Runs `f` on the worker's core once it is safe to mutate.
    ///
    /// Returns `None` for a worker that no longer exists.
    pub(crate) fn with_core<R>(
        &mut self,
        worker: WorkerRef,
        f: impl FnOnce(&mut WorkerCore) -> R,
    ) -> Option<R> {
        let key = match worker {
            WorkerRef::Head => return Some(f(&mut self.head.core)),
            WorkerRef::Thread(key) => key,
        };

        let worker = self.threads.get_mut(key)?;
        let mut state = worker.settle();
        let core = state.core.as_mut()?;

        let result = f(core);
        let (slots, deadlines) = (core.len(), core.timeouts.len());
        drop(state);

        worker.slots = slots;
        worker.deadlines = deadlines;
        Some(result)
    }

    /// Scans a worker that reported through the funnel and puts it back
    /// to sleep.
    pub(crate) fn collect<R>(
        &mut self,
        key: Key,
        f: impl FnOnce(&mut WorkerCore) -> R,
    ) -> Option<R> {
        let result = self.with_core(WorkerRef::Thread(key), f)?;

        if let Some(worker) = self.threads.get(key) {
            let mut state = worker.shared.lock();
            if state.run == Run::Ready {
                state.run = Run::Sleep;
            }
        }

        Some(result)
    }

    /// Lets every dormant worker with something to wait for block again.
    pub(crate) fn resume(&mut self) {
        for (_, worker) in self.threads.iter() {
            if worker.is_idle() {
                continue;
            }

            let mut state = worker.shared.lock();
            if state.run == Run::Sleep {
                state.run = Run::Active;
                drop(state);
                worker.shared.cond.notify_all();
            }
        }
    }

    /// Tears `worker` down if it has nothing left to wait for.
    pub(crate) fn release(&mut self, worker: WorkerRef) {
        let WorkerRef::Thread(key) = worker else {
            return;
        };

        if self.threads.get(key).is_some_and(ThreadedWorker::is_idle) {
            if let Some(worker) = self.threads.remove(key) {
                Self::stop(worker);
                debug!("tore down worker {} ({} workers)", key.index(), self.count());
            }
        }
    }

    fn stop(mut worker: ThreadedWorker) {
        {
            let mut state = worker.settle();
            state.run = Run::Exit;
        }
        worker.shared.cond.notify_all();

        if let Some(thread) = worker.thread.take() {
            if thread.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }

    /// Stops every threaded worker.
    pub(crate) fn shutdown(&mut self) {
        for worker in self.threads.drain() {
            Self::stop(worker);
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn ids(n: usize) -> Vec<EventId> {
        let mut slab = Slab::new(n);
        (0..n).map(|_| EventId(slab.insert(()))).collect()
    }

    #[test]
    fn test_take_fired_keeps_adjacent_slots() {
        let ids = ids(4);
        let mut core = WorkerCore::new(4);
        for (fd, id) in ids.iter().enumerate() {
            core.push(fd as RawFd, POLLIN, *id);
        }

        let mut fds = Vec::new();
        core.fill(&mut fds);
        fds[1].revents = POLLIN;
        fds[2].revents = POLLIN;
        fds[3].revents = POLLIN;
        core.record(&fds);

        let fired = core.take_fired();
        assert_eq!(
            fired.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![ids[1], ids[2], ids[3]]
        );

        for (id, _) in &fired {
            assert!(core.remove(*id));
        }
        assert_eq!(core.len(), 1);
        assert!(!core.has_fired());
        assert!(core.take_fired().is_empty());
    }

    #[test]
    fn test_capacity() {
        let ids = ids(2);
        let mut core = WorkerCore::new(1);

        assert!(core.is_idle());
        core.push(0, POLLIN, ids[0]);
        assert!(!core.has_room());
        assert!(core.remove(ids[0]));
        assert!(!core.remove(ids[1]));
        assert!(core.has_room());
    }

    #[test]
    fn test_threaded_worker_reports_through_funnel() {
        let (a, mut b) = UnixStream::pair().expect("socketpair");
        let ids = ids(1);

        let mut workers = Workers::new(1, Clock::new(), "evq-test".into()).expect("workers");
        workers.head.core.push(-1, POLLIN, ids[0]);

        let worker = workers.place().expect("place");
        let WorkerRef::Thread(key) = worker else {
            panic!("head should be full");
        };
        workers
            .with_core(worker, |core| core.push(a.as_raw_fd(), POLLIN, ids[0]))
            .expect("core");

        workers.resume();
        b.write_all(b"x").expect("write");

        let mut funnel = workers.link().drain();
        for _ in 0..100 {
            if !funnel.ready.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
            funnel = workers.link().drain();
        }
        assert_eq!(funnel.ready, vec![key]);

        let fired = workers.collect(key, |core| core.take_fired()).expect("collect");
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, ids[0]);

        workers.with_core(worker, |core| core.remove(ids[0]));
        workers.release(worker);
        assert_eq!(workers.count(), 1);
    }
}
