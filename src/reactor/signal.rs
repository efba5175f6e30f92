//! Signal channel.
//!
//! Other threads raise signals through a [`Signaller`]; the raise is
//! recorded in the head worker's funnel and the head wakeup is set, so a
//! blocked `wait` returns. The poller drains the pending set once per
//! cycle and turns it into deliveries for the events registered on it.

use super::worker::HeadLink;
use crate::event::{EventId, Signal};

use std::fmt;
use std::sync::Arc;

/// Cross-thread handle used to raise signals on an
/// [`EventQueue`](crate::EventQueue).
///
/// Cheap to clone; raising never blocks on the waiting thread.
#[derive(Clone)]
pub struct Signaller {
    link: Arc<HeadLink>,
}

impl Signaller {
    pub(crate) fn new(link: Arc<HeadLink>) -> Self {
        Self { link }
    }

    /// Marks `signal` pending and wakes the poller.
    pub fn raise(&self, signal: Signal) {
        self.link.raise(signal.mask());
    }

    /// Raises [`Signal::INTERRUPT`].
    pub fn interrupt(&self) {
        self.raise(Signal::INTERRUPT);
    }
}

impl fmt::Debug for Signaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signaller").finish_non_exhaustive()
    }
}

/// Events registered for signal delivery.
///
/// Registration does not touch any wait-set slot.
#[derive(Debug, Default)]
pub(crate) struct SignalChannel {
    subscribers: Vec<(Signal, EventId)>,
}

impl SignalChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, signal: Signal, id: EventId) {
        self.subscribers.push((signal, id));
    }

    pub(crate) fn remove(&mut self, id: EventId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(_, sub)| *sub != id);
        self.subscribers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Events interested in any signal of the `pending` mask, in
    /// registration order.
    pub(crate) fn process(&self, pending: u64) -> Vec<EventId> {
        self.subscribers
            .iter()
            .filter(|(signal, _)| pending & signal.mask() != 0)
            .map(|(_, id)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Slab;

    #[test]
    fn test_process_selects_pending_signals() {
        let mut slab = Slab::new(3);
        let a = EventId(slab.insert(()));
        let b = EventId(slab.insert(()));
        let c = EventId(slab.insert(()));
        let usr = Signal::new(5).expect("signal");

        let mut channel = SignalChannel::new();
        channel.add(Signal::INTERRUPT, a);
        channel.add(usr, b);
        channel.add(Signal::INTERRUPT, c);

        assert_eq!(channel.process(Signal::INTERRUPT.mask()), vec![a, c]);
        assert_eq!(channel.process(usr.mask()), vec![b]);
        assert!(channel.process(0).is_empty());

        assert!(channel.remove(a));
        assert!(!channel.remove(a));
        assert_eq!(channel.len(), 2);
    }
}
