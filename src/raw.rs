//! Raw POSIX named-semaphore descriptor
//!
//! Thin wrappers over the `sem_*` system calls, translating each failure into
//! a classified [`SemaphoreError`]. Nothing here knows about permit accounting
//! or the async bridge; this module is the only place that touches the
//! descriptor itself.

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{closed_error, system_error, system_error_from, Result, SemaphoreError};

/// Exclusive owner of one `sem_t` descriptor and its name
///
/// The descriptor stays valid until [`close`](Self::close) (or drop). Worker
/// threads share this through an `Arc` and only ever call
/// [`wait`](Self::wait) on it.
#[derive(Debug)]
pub(crate) struct RawSemaphore {
    name: String,
    c_name: CString,
    sem: *mut libc::sem_t,
    closed: AtomicBool,
}

// SAFETY: POSIX semaphore operations on a `sem_t` are thread-safe; the
// pointer is never exposed outside this module and the descriptor is only
// invalidated through the `closed` flag, which is checked before every call.
unsafe impl Send for RawSemaphore {}
unsafe impl Sync for RawSemaphore {}

impl RawSemaphore {
    /// Open the named semaphore, creating it with `initial_value` permits if
    /// it does not exist yet
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::Config`] for an empty name or a name with an
    /// interior NUL byte, and [`SemaphoreError::System`] when `sem_open`
    /// fails (for example, an initial value above the OS maximum).
    pub(crate) fn open(name: &str, initial_value: u32) -> Result<Self> {
        if name.is_empty() {
            return Err(SemaphoreError::Config(
                "semaphore name must not be empty".to_string(),
            ));
        }
        let c_name = CString::new(name).map_err(|_| {
            SemaphoreError::Config("semaphore name must not contain NUL bytes".to_string())
        })?;

        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                0o666,
                initial_value as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(system_error("sem_open"));
        }

        tracing::debug!("opened semaphore {} (initial value {})", name, initial_value);
        Ok(Self {
            name: name.to_string(),
            c_name,
            sem,
            closed: AtomicBool::new(false),
        })
    }

    /// The semaphore's name, as passed to `sem_open`
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Fail with an `InvalidSemaphore` system error if the descriptor has
    /// been closed
    pub(crate) fn ensure_open(&self, op: &'static str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(closed_error(op))
        } else {
            Ok(())
        }
    }

    fn descriptor(&self, op: &'static str) -> Result<*mut libc::sem_t> {
        self.ensure_open(op)?;
        Ok(self.sem)
    }

    /// Block the calling thread until a permit is available, then take it
    pub(crate) fn wait(&self) -> Result<()> {
        let sem = self.descriptor("sem_wait")?;
        if unsafe { libc::sem_wait(sem) } < 0 {
            return Err(system_error("sem_wait"));
        }
        Ok(())
    }

    /// Take a permit if one is immediately available
    ///
    /// Returns `Ok(false)` when the semaphore is at zero; that is not an
    /// error.
    pub(crate) fn try_wait(&self) -> Result<bool> {
        let sem = self.descriptor("sem_trywait")?;
        if unsafe { libc::sem_trywait(sem) } < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EAGAIN) {
                return Ok(false);
            }
            return Err(system_error_from("sem_trywait", err));
        }
        Ok(true)
    }

    /// Make one permit available
    pub(crate) fn post(&self) -> Result<()> {
        let sem = self.descriptor("sem_post")?;
        if unsafe { libc::sem_post(sem) } < 0 {
            return Err(system_error("sem_post"));
        }
        Ok(())
    }

    /// Release the process-local descriptor
    ///
    /// Every later descriptor operation on this handle fails, including a
    /// second `close`.
    pub(crate) fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(closed_error("sem_close"));
        }
        if unsafe { libc::sem_close(self.sem) } < 0 {
            return Err(system_error("sem_close"));
        }
        tracing::debug!("closed semaphore {}", self.name);
        Ok(())
    }

    /// Whether the descriptor has been released
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Remove the semaphore's name from the OS namespace
    ///
    /// Descriptors already open (here or in other processes) keep working;
    /// only future `sem_open` calls are affected. Legal whether or not the
    /// local descriptor has been closed.
    pub(crate) fn unlink(&self) -> Result<()> {
        if unsafe { libc::sem_unlink(self.c_name.as_ptr()) } < 0 {
            return Err(system_error("sem_unlink"));
        }
        tracing::debug!("unlinked semaphore {}", self.name);
        Ok(())
    }
}

impl Drop for RawSemaphore {
    fn drop(&mut self) {
        // Backstop only; normal teardown closes explicitly.
        if !self.closed.swap(true, Ordering::AcqRel) {
            unsafe {
                libc::sem_close(self.sem);
            }
        }
    }
}
