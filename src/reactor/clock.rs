use std::time::{Duration, Instant};

/// Milliseconds on the reactor's monotonic clock.
pub(crate) type Msec = u64;

/// Monotonic millisecond clock.
///
/// Readings are milliseconds elapsed since the clock was created. The
/// clock is `Copy` so worker threads can read the same time base as the
/// queue that spawned them.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Clock {
    epoch: Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub(crate) fn now(&self) -> Msec {
        self.epoch.elapsed().as_millis() as Msec
    }
}

/// Converts a user-facing duration into whole milliseconds, rounding up so
/// that a non-zero duration never becomes a zero (non-blocking) wait.
pub(crate) fn to_msec(duration: Duration) -> Msec {
    let ms = duration.as_millis();
    let ms = if Duration::from_millis(ms as u64) < duration {
        ms + 1
    } else {
        ms
    };

    ms.min(u128::from(Msec::MAX)) as Msec
}
