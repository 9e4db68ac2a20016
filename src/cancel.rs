//! Wait workers and their forced termination
//!
//! A worker blocked inside `sem_wait` has no cooperative cancellation point,
//! so unblocking it requires pthread cancellation: the cancellation request
//! is carried by a signal that interrupts the blocked call and forcibly
//! unwinds the thread. Whether the interrupted call had already consumed a
//! permit at that instant is not observable from outside; callers accept that
//! as a documented inconsistency window rather than trying to reconcile it.
//!
//! Workers are raw pthreads instead of `std::thread` because a
//! `std::thread::JoinHandle` cannot be joined safely once its thread has been
//! cancelled out from under it.

use std::ptr;
use std::sync::Arc;

use futures::channel::mpsc::UnboundedSender;

use crate::bridge::WaitMessage;
use crate::error::{Result, SemaphoreError, SystemErrorKind};
use crate::raw::RawSemaphore;

// `libc` types the thread entry point as a plain `extern "C" fn`, which must
// not unwind, but cancellation unwinds out of the worker. Bind pthread_create
// locally with the unwinding ABI so the pointer type stays honest. An
// `extern "C"` shim in between would not help: the unwind would abort at its
// boundary instead of reaching the thread start routine.
extern "C" {
    fn pthread_create(
        native: *mut libc::pthread_t,
        attr: *const libc::pthread_attr_t,
        f: unsafe extern "C-unwind" fn(*mut libc::c_void) -> *mut libc::c_void,
        value: *mut libc::c_void,
    ) -> libc::c_int;
}

struct WorkerContext {
    raw: Arc<RawSemaphore>,
    tx: UnboundedSender<WaitMessage>,
}

/// Worker entry point.
///
/// Must be `extern "C-unwind"`: pthread cancellation unwinds the thread
/// through this frame, and the context (with its channel sender) still has to
/// be dropped on that path.
unsafe extern "C-unwind" fn worker_main(arg: *mut libc::c_void) -> *mut libc::c_void {
    let ctx = unsafe { Box::from_raw(arg.cast::<WorkerContext>()) };
    let outcome = ctx.raw.wait();
    if let Err(ref e) = outcome {
        tracing::debug!("background wait on {} failed: {}", ctx.raw.name(), e);
    }
    let _ = ctx.tx.unbounded_send(WaitMessage::Finished {
        acquired: outcome.is_ok(),
    });
    ptr::null_mut()
}

/// One background thread performing a blocking `sem_wait`
///
/// Consumed by exactly one of [`join`](Self::join) (normal completion) or
/// [`cancel_and_join`](Self::cancel_and_join) (forced termination).
pub(crate) struct WaitWorker {
    thread: libc::pthread_t,
}

impl WaitWorker {
    /// Spawn a worker that blocks in `sem_wait` on `raw` and reports the
    /// outcome through `tx`
    pub(crate) fn spawn(
        raw: Arc<RawSemaphore>,
        tx: UnboundedSender<WaitMessage>,
    ) -> Result<Self> {
        let ctx = Box::into_raw(Box::new(WorkerContext { raw, tx }));
        let mut thread: libc::pthread_t = unsafe { std::mem::zeroed() };
        let rc = unsafe { pthread_create(&mut thread, ptr::null(), worker_main, ctx.cast()) };
        if rc != 0 {
            // pthread_create reports the error as its return value, not errno
            drop(unsafe { Box::from_raw(ctx) });
            return Err(SemaphoreError::System {
                op: "pthread_create",
                kind: SystemErrorKind::Other,
                source: std::io::Error::from_raw_os_error(rc),
            });
        }
        Ok(Self { thread })
    }

    /// Wait for a worker whose blocking call has already returned
    pub(crate) fn join(self) {
        let rc = unsafe { libc::pthread_join(self.thread, ptr::null_mut()) };
        if rc != 0 {
            tracing::warn!(
                "pthread_join failed: {}",
                std::io::Error::from_raw_os_error(rc)
            );
        }
    }

    /// Forcibly terminate a worker that may still be blocked, and wait for it
    /// to fully stop before returning
    ///
    /// `sem_wait` is a cancellation point; if the request lands after the
    /// call already consumed a permit, that permit is lost to this handle's
    /// accounting.
    pub(crate) fn cancel_and_join(self) {
        let rc = unsafe { libc::pthread_cancel(self.thread) };
        if rc != 0 {
            tracing::warn!(
                "pthread_cancel failed: {}",
                std::io::Error::from_raw_os_error(rc)
            );
        }
        self.join();
    }
}
