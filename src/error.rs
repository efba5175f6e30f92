use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by an [`EventQueue`](crate::EventQueue).
///
/// Registration errors are local to the call that returned them: the
/// queue's bookkeeping is only updated once the platform accepted the
/// registration.
#[derive(Error, Debug)]
pub enum Error {
    /// A primitive could not be created while building the queue.
    #[error("failed to initialize the event queue: {0}")]
    Init(#[source] io::Error),

    /// No worker had a free slot and a new one could not be created.
    #[error("no worker capacity left: {0}")]
    ResourceExhausted(#[source] io::Error),

    /// The platform rejected the handle.
    #[error("failed to register event: {0}")]
    Registration(#[source] io::Error),

    /// The blocking wait itself failed. The queue should be rebuilt.
    #[error("wait failed: {0}")]
    WaitFailed(#[source] io::Error),

    #[error("invalid directory path {0:?}")]
    InvalidPath(PathBuf),

    /// The id does not name an event registered with this queue.
    #[error("unknown event")]
    UnknownEvent,

    /// A host message event is already registered.
    #[error("a message event is already registered")]
    MessageSlotTaken,
}

impl Error {
    /// The platform error code behind this error, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Error::Init(err)
            | Error::ResourceExhausted(err)
            | Error::Registration(err)
            | Error::WaitFailed(err) => err.raw_os_error(),
            Error::InvalidPath(_) | Error::UnknownEvent | Error::MessageSlotTaken => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_code() {
        let err = Error::Registration(io::Error::from_raw_os_error(libc::EBADF));
        assert_eq!(err.os_code(), Some(libc::EBADF));
        assert_eq!(Error::UnknownEvent.os_code(), None);
        assert!(err.to_string().starts_with("failed to register event"));
    }
}
