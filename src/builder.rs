use crate::error::Result;
use crate::reactor::EventQueue;

/// Default number of descriptors a single wait call may observe.
pub const DEFAULT_MAX_WAIT_OBJECTS: usize = 64;

/// Settings resolved once when the queue is built.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) max_wait_objects: usize,
    pub(crate) completion_port: bool,
    pub(crate) skip_immediate: bool,
    pub(crate) thread_name: String,
}

impl Config {
    /// Slots per worker; one object is taken by the worker's wakeup.
    pub(crate) fn capacity(&self) -> usize {
        self.max_wait_objects - 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_wait_objects: DEFAULT_MAX_WAIT_OBJECTS,
            completion_port: true,
            skip_immediate: true,
            thread_name: String::from("evq-worker"),
        }
    }
}

/// Builder for configuring and creating an [`EventQueue`].
///
/// # Examples
///
/// ```rust,no_run
/// let queue = evq::QueueBuilder::new()
///     .max_wait_objects(16)
///     .completion_port(false)
///     .build()?;
/// # Ok::<(), evq::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct QueueBuilder {
    config: Config,
}

impl QueueBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many descriptors one wait call observes, the worker's
    /// own wakeup included. Events beyond a worker's share go to
    /// additional worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n < 2`.
    pub fn max_wait_objects(mut self, n: usize) -> Self {
        assert!(n >= 2, "max_wait_objects must be >= 2");

        self.config.max_wait_objects = n;
        self
    }

    /// Enables the completion port for overlapped sockets.
    ///
    /// When disabled, overlapped sockets take a wait-set slot like any
    /// other handle.
    pub fn completion_port(mut self, enabled: bool) -> Self {
        self.config.completion_port = enabled;
        self
    }

    /// Completes operations that can finish synchronously without a round
    /// trip through the completion port.
    pub fn skip_immediate_completion(mut self, enabled: bool) -> Self {
        self.config.skip_immediate = enabled;
        self
    }

    /// Name prefix of worker threads.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name = prefix.into();
        self
    }

    /// Builds the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`](crate::Error::Init) if a primitive cannot
    /// be created.
    pub fn build(self) -> Result<EventQueue> {
        EventQueue::with_config(self.config)
    }
}
