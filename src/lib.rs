//! # compio-named-sem
//!
//! POSIX named semaphores for the [compio](https://github.com/compio-rs/compio)
//! async runtime.
//!
//! A [`NamedSemaphore`] is a cross-process counting semaphore addressed by an
//! OS-level name. Synchronous `wait`/`try_wait`/`post` map directly onto the
//! `sem_*` system calls; the async wait path runs the blocking `sem_wait` on
//! a background worker and marshals the result back onto the runtime thread,
//! so the single-threaded caller is never stalled. The handle tracks how many
//! permits it holds, rejects over-release, and gives every held permit back
//! on teardown.
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_named_sem::NamedSemaphore;
//!
//! # async fn example() -> compio_named_sem::Result<()> {
//! let sem = NamedSemaphore::create("/my-app-slots", 4)?;
//!
//! if sem.try_wait()? {
//!     // got a slot without blocking
//! }
//!
//! // Wait for the next slot without stalling the runtime
//! sem.start_async_wait(|acquired| {
//!     if acquired {
//!         println!("slot acquired");
//!     }
//! })?;
//! # Ok(())
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("compio-named-sem only supports POSIX platforms");

mod bridge;
mod cancel;
mod ledger;
mod raw;

pub mod error;
pub mod semaphore;

// Re-export main types
pub use error::{Result, SemaphoreError, SystemErrorKind};
pub use semaphore::NamedSemaphore;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
