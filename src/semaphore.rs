//! Cross-process counting semaphore with an async wait bridge
//!
//! [`NamedSemaphore`] owns one OS named-semaphore descriptor and keeps its
//! own account of how many permits the handle currently holds. Synchronous
//! operations map directly to the `sem_*` calls; the async wait path runs the
//! blocking call on a background worker and delivers the result back onto the
//! caller's runtime thread exactly once.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use futures::channel::mpsc;
use futures::StreamExt;

use crate::bridge::{WaitBridge, WaitMessage};
use crate::cancel::WaitWorker;
use crate::error::{Result, SemaphoreError};
use crate::ledger::PermitLedger;
use crate::raw::RawSemaphore;

/// A cross-process counting semaphore addressed by an OS-level name
///
/// The handle is bound to the thread running the compio runtime: completions
/// registered with [`start_async_wait`](Self::start_async_wait) are always
/// invoked on that thread, and permit accounting is only ever touched there.
/// The type is deliberately neither `Send` nor `Sync`; open an independent
/// handle to the same name from other threads or processes instead.
///
/// # Example
///
/// ```rust,no_run
/// use compio_named_sem::NamedSemaphore;
///
/// # fn example() -> compio_named_sem::Result<()> {
/// let sem = NamedSemaphore::create("/my-app-slots", 4)?;
/// if sem.try_wait()? {
///     // got a slot without blocking
///     sem.post()?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct NamedSemaphore {
    inner: Rc<Shared>,
}

struct Shared {
    raw: Arc<RawSemaphore>,
    ledger: PermitLedger,
    bridge: WaitBridge,
}

impl NamedSemaphore {
    /// Open the named semaphore, creating it with `initial_value` permits if
    /// it does not exist yet
    ///
    /// An existing semaphore keeps its current value; `initial_value` only
    /// applies on creation.
    ///
    /// # Errors
    ///
    /// [`SemaphoreError::Config`] for an empty name or a name containing NUL
    /// bytes; [`SemaphoreError::System`] when the OS call fails.
    pub fn create(name: &str, initial_value: u32) -> Result<Self> {
        let raw = RawSemaphore::open(name, initial_value)?;
        Ok(Self {
            inner: Rc::new(Shared {
                raw: Arc::new(raw),
                ledger: PermitLedger::new(),
                bridge: WaitBridge::new(),
            }),
        })
    }

    /// [`create`](Self::create) with the default initial value of one permit
    pub fn create_default(name: &str) -> Result<Self> {
        Self::create(name, 1)
    }

    /// The semaphore's name
    pub fn name(&self) -> &str {
        self.inner.raw.name()
    }

    /// Permits currently held through this handle
    ///
    /// Counts successful waits (synchronous or asynchronous) not yet released
    /// by [`post`](Self::post); never negative by construction.
    pub fn held_permits(&self) -> u32 {
        self.inner.ledger.held()
    }

    /// Block the calling thread until a permit is available, then take it
    ///
    /// This intentionally blocks the runtime thread; use it only where
    /// blocking is acceptable, and prefer
    /// [`start_async_wait`](Self::start_async_wait) otherwise.
    ///
    /// # Errors
    ///
    /// [`SemaphoreError::System`] classified as deadlock, interrupted,
    /// invalid-semaphore, or other.
    pub fn wait(&self) -> Result<()> {
        self.inner.ledger.wait(&self.inner.raw)
    }

    /// Take a permit if one is immediately available
    ///
    /// Returns `Ok(false)` when the semaphore is at zero; that is not an
    /// error and the held count is unchanged.
    pub fn try_wait(&self) -> Result<bool> {
        self.inner.ledger.try_wait(&self.inner.raw)
    }

    /// Release one held permit
    ///
    /// Returns `Ok(false)` without touching the OS semaphore when this handle
    /// holds nothing; a permit can only be released after it was acquired
    /// through this handle. Use [`add_permit`](Self::add_permit) to post
    /// without having acquired.
    pub fn post(&self) -> Result<bool> {
        self.inner.ledger.post(&self.inner.raw)
    }

    /// Make one permit available without having acquired it first
    ///
    /// Bypasses the held-permit accounting entirely; the counterpart of a
    /// plain `sem_post` for producers that only ever signal.
    pub fn add_permit(&self) -> Result<()> {
        self.inner.raw.post()
    }

    /// Release the process-local descriptor
    ///
    /// Any in-flight async wait is cancelled first so no worker can block on
    /// a released descriptor. Held permits are not given back here — only
    /// teardown (drop) drains them before closing, so closing while permits
    /// are held strands them. Later operations on this handle fail, including
    /// a second `close`.
    pub fn close(&self) -> Result<()> {
        self.cancel_async_wait();
        self.inner.raw.close()
    }

    /// Remove the semaphore's name from the OS namespace
    ///
    /// Open descriptors (local or in other processes) keep working; only
    /// future opens of this name are affected.
    ///
    /// # Errors
    ///
    /// [`SemaphoreError::System`] classified as permission-denied, not-found,
    /// or other.
    pub fn unlink(&self) -> Result<()> {
        self.inner.raw.unlink()
    }

    /// Start a background wait and invoke `completion` on the runtime thread
    /// when it resolves
    ///
    /// The completion receives `true` when the blocking wait acquired a
    /// permit (the held count is incremented just before it runs) and `false`
    /// when the wait was cancelled or failed at the OS level; a failed wait
    /// is logged but deliberately reported the same way as cancellation. The
    /// handle is back to idle before the completion is invoked, so a
    /// completion may immediately start the next wait.
    ///
    /// # Errors
    ///
    /// [`SemaphoreError::WaitInProgress`] when a wait is already outstanding
    /// (the first wait is unaffected), and [`SemaphoreError::System`] when
    /// the descriptor is closed or the worker cannot be spawned.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use compio_named_sem::NamedSemaphore;
    ///
    /// # async fn example() -> compio_named_sem::Result<()> {
    /// let sem = NamedSemaphore::create("/my-app-jobs", 0)?;
    /// sem.start_async_wait(|acquired| {
    ///     if acquired {
    ///         println!("job slot acquired");
    ///     }
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn start_async_wait<F>(&self, completion: F) -> Result<()>
    where
        F: FnOnce(bool) + 'static,
    {
        if self.inner.bridge.is_waiting() {
            return Err(SemaphoreError::WaitInProgress);
        }
        self.inner.raw.ensure_open("sem_wait")?;

        let (tx, mut rx) = mpsc::unbounded();
        let worker = WaitWorker::spawn(Arc::clone(&self.inner.raw), tx.clone())?;
        let cycle = self.inner.bridge.begin(worker, tx);
        tracing::debug!("started async wait on {}", self.inner.raw.name());

        let shared = Rc::clone(&self.inner);
        compio::runtime::spawn(async move {
            let message = rx.next().await.unwrap_or(WaitMessage::Cancelled);
            let acquired = matches!(message, WaitMessage::Finished { acquired: true })
                && !cycle.is_cancelled();
            if !cycle.is_cancelled() {
                // Back to idle before the completion runs, so it can start
                // the next wait. The worker already returned; the join is
                // immediate.
                if let Some(worker) = shared.bridge.finish(&cycle) {
                    worker.join();
                }
                if acquired {
                    shared.ledger.record_acquired();
                }
            }
            completion(acquired);
        })
        .detach();
        Ok(())
    }

    /// Abort an in-flight async wait; no-op when idle
    ///
    /// Forcibly terminates the worker, waits for it to fully stop, and
    /// guarantees the pending completion still fires exactly once with
    /// `false`. The held count is never adjusted here: if the blocked call
    /// had already consumed a permit when the termination landed, that permit
    /// is lost to this handle's accounting (an accepted inconsistency of
    /// forced cancellation).
    pub fn cancel_async_wait(&self) {
        if let Some((worker, cancel_tx, cycle)) = self.inner.bridge.take_for_cancel() {
            cycle.mark_cancelled();
            worker.cancel_and_join();
            // The worker is fully stopped; make sure the completion task
            // observes the cancellation even if the worker never reported.
            let _ = cancel_tx.unbounded_send(WaitMessage::Cancelled);
            tracing::debug!("cancelled async wait on {}", self.inner.raw.name());
        }
    }
}

impl fmt::Debug for NamedSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedSemaphore")
            .field("name", &self.name())
            .field("held_permits", &self.held_permits())
            .finish()
    }
}

impl Drop for NamedSemaphore {
    /// Teardown: cancel any outstanding wait, release every held permit,
    /// then close the descriptor
    ///
    /// Errors are swallowed; teardown must complete.
    fn drop(&mut self) {
        self.cancel_async_wait();
        if !self.inner.raw.is_closed() {
            self.inner.ledger.drain(&self.inner.raw);
            if let Err(e) = self.inner.raw.close() {
                tracing::debug!("closing {} during teardown: {}", self.inner.raw.name(), e);
            }
        }
    }
}
