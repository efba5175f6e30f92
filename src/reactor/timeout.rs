//! Deadline index.
//!
//! Deadlines are grouped by their relative timeout: one FIFO queue per
//! distinct timeout value. Every deadline in a queue was computed as
//! `now + msec` from a non-decreasing `now`, so each queue is already
//! sorted and its front is its earliest deadline. Expiry merges the fronts.
//!
//! Equal timeouts armed in the same cycle therefore expire in the order
//! they were armed, whatever the clock does in between.

use super::clock::Msec;
use crate::event::EventId;

use std::collections::{BTreeMap, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Pending {
    deadline: Msec,
    id: EventId,
}

/// Ordered-by-deadline index, one per worker.
#[derive(Debug, Default)]
pub(crate) struct TimeoutIndex {
    queues: BTreeMap<Msec, VecDeque<Pending>>,
    len: usize,
}

impl TimeoutIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Arms a deadline `msec` after `now`.
    pub(crate) fn insert(&mut self, id: EventId, msec: Msec, now: Msec) {
        self.queues.entry(msec).or_default().push_back(Pending {
            deadline: now.saturating_add(msec),
            id,
        });
        self.len += 1;
    }

    /// Refreshes an existing deadline to `msec` after `now`.
    ///
    /// The event stays in the same queue. It only moves (to the back) if
    /// the new deadline would otherwise overtake a later entry, so
    /// refreshing twice against the same `now` leaves it where it is.
    ///
    /// Returns `false` if `id` has no deadline under `msec`.
    pub(crate) fn reset(&mut self, id: EventId, msec: Msec, now: Msec) -> bool {
        let Some(queue) = self.queues.get_mut(&msec) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|p| p.id == id) else {
            return false;
        };

        let deadline = now.saturating_add(msec);
        let in_order = queue
            .get(pos + 1)
            .is_none_or(|next| next.deadline >= deadline);

        if in_order {
            queue[pos].deadline = deadline;
        } else if let Some(mut pending) = queue.remove(pos) {
            pending.deadline = deadline;
            queue.push_back(pending);
        }

        true
    }

    /// Drops the deadline of `id` armed with `msec`.
    pub(crate) fn remove(&mut self, id: EventId, msec: Msec) -> bool {
        let Some(queue) = self.queues.get_mut(&msec) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|p| p.id == id) else {
            return false;
        };

        queue.remove(pos);
        if queue.is_empty() {
            self.queues.remove(&msec);
        }
        self.len -= 1;

        true
    }

    fn earliest(&self) -> Option<(Msec, Pending)> {
        self.queues
            .iter()
            .filter_map(|(msec, queue)| queue.front().map(|p| (*msec, *p)))
            .min_by_key(|(_, p)| p.deadline)
    }

    /// Shrinks a wait budget (`None` = infinite) to the nearest deadline.
    ///
    /// The result is `Some(0)` when a deadline is already due.
    pub(crate) fn budget(&self, budget: Option<Msec>, now: Msec) -> Option<Msec> {
        let Some((_, next)) = self.earliest() else {
            return budget;
        };

        let until = next.deadline.saturating_sub(now);
        match budget {
            Some(budget) => Some(budget.min(until)),
            None => Some(until),
        }
    }

    /// Removes every deadline due at `now`, returning them in deadline
    /// order together with the timeout they were armed with.
    pub(crate) fn expire(&mut self, now: Msec) -> Vec<(EventId, Msec)> {
        let mut due = Vec::new();

        while let Some((msec, next)) = self.earliest() {
            if next.deadline > now {
                break;
            }

            if let Some(queue) = self.queues.get_mut(&msec) {
                queue.pop_front();
                if queue.is_empty() {
                    self.queues.remove(&msec);
                }
            }
            self.len -= 1;

            due.push((next.id, msec));
        }

        due
    }

    /// Position of `id` inside the queue for `msec`.
    #[cfg(test)]
    pub(crate) fn position(&self, id: EventId, msec: Msec) -> Option<usize> {
        self.queues.get(&msec)?.iter().position(|p| p.id == id)
    }

    #[cfg(test)]
    pub(crate) fn queue_count(&self) -> usize {
        self.queues.len()
    }
}
