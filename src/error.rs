//! Error types for named-semaphore operations

use thiserror::Error;

/// Result type for named-semaphore operations
pub type Result<T> = std::result::Result<T, SemaphoreError>;

/// Classification of the OS error behind a [`SemaphoreError::System`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemErrorKind {
    /// The OS detected a deadlock (`EDEADLK`)
    Deadlock,
    /// The call was interrupted by a signal (`EINTR`)
    Interrupted,
    /// The descriptor does not name a valid semaphore (`EINVAL`)
    InvalidSemaphore,
    /// Insufficient permissions (`EACCES`)
    PermissionDenied,
    /// No semaphore with this name exists (`ENOENT`)
    NotFound,
    /// Any other OS error
    Other,
}

impl SystemErrorKind {
    /// Classify a raw errno value
    pub(crate) fn from_errno(errno: i32) -> Self {
        match errno {
            libc::EDEADLK => Self::Deadlock,
            libc::EINTR => Self::Interrupted,
            libc::EINVAL => Self::InvalidSemaphore,
            libc::EACCES => Self::PermissionDenied,
            libc::ENOENT => Self::NotFound,
            _ => Self::Other,
        }
    }
}

/// Errors surfaced by [`NamedSemaphore`](crate::NamedSemaphore) operations
#[derive(Error, Debug)]
pub enum SemaphoreError {
    /// Caller supplied invalid arguments
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An async wait was requested while one was already in flight
    #[error("wait already in progress")]
    WaitInProgress,

    /// The underlying OS call failed
    #[error("{op} failed ({kind:?}): {source}")]
    System {
        /// The OS call that failed
        op: &'static str,
        /// Classification of the failure
        kind: SystemErrorKind,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },
}

impl SemaphoreError {
    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, SemaphoreError::Config(_))
    }

    /// Check if this is a rejected concurrent async wait
    pub fn is_wait_in_progress(&self) -> bool {
        matches!(self, SemaphoreError::WaitInProgress)
    }

    /// Classification of the OS failure, if this is a system error
    pub fn system_kind(&self) -> Option<SystemErrorKind> {
        match self {
            SemaphoreError::System { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Build a [`SemaphoreError::System`] from a captured OS error
pub(crate) fn system_error_from(op: &'static str, source: std::io::Error) -> SemaphoreError {
    let kind = source
        .raw_os_error()
        .map_or(SystemErrorKind::Other, SystemErrorKind::from_errno);
    SemaphoreError::System { op, kind, source }
}

/// Build a [`SemaphoreError::System`] from the calling thread's errno
pub(crate) fn system_error(op: &'static str) -> SemaphoreError {
    system_error_from(op, std::io::Error::last_os_error())
}

/// Build a [`SemaphoreError::System`] for a descriptor that was already closed
pub(crate) fn closed_error(op: &'static str) -> SemaphoreError {
    SemaphoreError::System {
        op,
        kind: SystemErrorKind::InvalidSemaphore,
        source: std::io::Error::from_raw_os_error(libc::EINVAL),
    }
}
