//! Permit accounting for one semaphore handle
//!
//! Single source of truth for how many permits this process holds through a
//! given handle, no matter whether the underlying wait was synchronous or
//! asynchronous. Every acquiring path funnels through this counter, so a
//! `post` can never release more than was acquired and teardown knows exactly
//! how much to give back.
//!
//! The counter is only ever touched from the caller's runtime thread (async
//! acquisitions are recorded inside completions delivered to that thread), so
//! a `Cell` is sufficient and the type is deliberately not `Sync`.

use std::cell::Cell;

use crate::error::Result;
use crate::raw::RawSemaphore;

/// Count of permits this handle has acquired and not yet released
pub(crate) struct PermitLedger {
    held: Cell<u32>,
}

impl PermitLedger {
    pub(crate) fn new() -> Self {
        Self { held: Cell::new(0) }
    }

    /// Permits currently held through this handle
    pub(crate) fn held(&self) -> u32 {
        self.held.get()
    }

    /// Blocking acquire; counts the permit on success
    pub(crate) fn wait(&self, raw: &RawSemaphore) -> Result<()> {
        raw.wait()?;
        self.held.set(self.held.get() + 1);
        Ok(())
    }

    /// Non-blocking acquire; counts the permit only when one was taken
    pub(crate) fn try_wait(&self, raw: &RawSemaphore) -> Result<bool> {
        if raw.try_wait()? {
            self.held.set(self.held.get() + 1);
            return Ok(true);
        }
        Ok(false)
    }

    /// Release one held permit
    ///
    /// Returns `Ok(false)` without touching the OS semaphore when nothing is
    /// held; over-release is rejected here rather than surfacing as an OS
    /// error. When the OS post itself fails, the count is left unchanged.
    pub(crate) fn post(&self, raw: &RawSemaphore) -> Result<bool> {
        let held = self.held.get();
        if held == 0 {
            return Ok(false);
        }
        raw.post()?;
        self.held.set(held - 1);
        Ok(true)
    }

    /// Count a permit acquired by the async wait bridge
    pub(crate) fn record_acquired(&self) {
        self.held.set(self.held.get() + 1);
    }

    /// Release every held permit, swallowing errors; used during teardown
    pub(crate) fn drain(&self, raw: &RawSemaphore) {
        while self.held.get() > 0 {
            match raw.post() {
                Ok(()) => self.held.set(self.held.get() - 1),
                Err(e) => {
                    tracing::warn!(
                        "failed to release held permit on {} during teardown: {}",
                        raw.name(),
                        e
                    );
                    break;
                }
            }
        }
    }
}
