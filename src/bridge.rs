//! State machine bridging blocking waits onto the runtime thread
//!
//! Each handle is either `Idle` or `Waiting`. While `Waiting`, exactly one
//! worker thread is blocked in `sem_wait` and exactly one completion is
//! registered for it; starting another wait is rejected rather than queued.
//! The worker never touches caller-visible state: it reports through a
//! channel whose receiver is polled by a task on the caller's runtime, so the
//! completion only ever runs on the runtime thread.
//!
//! Cancellation resolves a cycle out of band. The canceller takes the worker
//! out of the state, marks the cycle cancelled, and sends its own message;
//! the completion task recognizes a cancelled cycle and leaves whatever wait
//! replaced it untouched.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::channel::mpsc::UnboundedSender;

use crate::cancel::WaitWorker;

/// What a wait cycle reports back to the runtime thread
pub(crate) enum WaitMessage {
    /// The blocking call returned; `acquired` is true only when it took a
    /// permit
    Finished {
        /// Whether `sem_wait` returned success
        acquired: bool,
    },
    /// The worker was forcibly terminated before reporting
    Cancelled,
}

/// Marker for one wait cycle
///
/// Shared between the bridge state and the cycle's completion task; lets a
/// task whose cycle was already resolved by cancellation recognize that the
/// bridge state no longer belongs to it.
pub(crate) struct WaitCycle {
    cancelled: Cell<bool>,
}

impl WaitCycle {
    fn new() -> Self {
        Self {
            cancelled: Cell::new(false),
        }
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.set(true);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

enum BridgeState {
    Idle,
    Waiting {
        worker: WaitWorker,
        cancel_tx: UnboundedSender<WaitMessage>,
        cycle: Rc<WaitCycle>,
    },
}

/// Per-handle async wait state; lives on the runtime thread
pub(crate) struct WaitBridge {
    state: RefCell<BridgeState>,
}

impl WaitBridge {
    pub(crate) fn new() -> Self {
        Self {
            state: RefCell::new(BridgeState::Idle),
        }
    }

    /// Whether a background wait is currently outstanding
    pub(crate) fn is_waiting(&self) -> bool {
        matches!(*self.state.borrow(), BridgeState::Waiting { .. })
    }

    /// Enter `Waiting`; callers must have checked [`is_waiting`](Self::is_waiting)
    pub(crate) fn begin(
        &self,
        worker: WaitWorker,
        cancel_tx: UnboundedSender<WaitMessage>,
    ) -> Rc<WaitCycle> {
        let cycle = Rc::new(WaitCycle::new());
        *self.state.borrow_mut() = BridgeState::Waiting {
            worker,
            cancel_tx,
            cycle: Rc::clone(&cycle),
        };
        cycle
    }

    /// Return to `Idle` on normal completion of `cycle`, handing back the
    /// worker to join
    ///
    /// A stale cycle (already resolved by cancellation, possibly replaced by
    /// a newer wait) leaves the state untouched and gets `None`.
    pub(crate) fn finish(&self, cycle: &Rc<WaitCycle>) -> Option<WaitWorker> {
        let mut state = self.state.borrow_mut();
        let current = match &*state {
            BridgeState::Waiting { cycle: current, .. } => Rc::ptr_eq(current, cycle),
            BridgeState::Idle => false,
        };
        if !current {
            return None;
        }
        match std::mem::replace(&mut *state, BridgeState::Idle) {
            BridgeState::Waiting { worker, .. } => Some(worker),
            BridgeState::Idle => None,
        }
    }

    /// Take the whole waiting state for cancellation; `None` when `Idle`
    #[allow(clippy::type_complexity)]
    pub(crate) fn take_for_cancel(
        &self,
    ) -> Option<(WaitWorker, UnboundedSender<WaitMessage>, Rc<WaitCycle>)> {
        let mut state = self.state.borrow_mut();
        match std::mem::replace(&mut *state, BridgeState::Idle) {
            BridgeState::Waiting {
                worker,
                cancel_tx,
                cycle,
            } => Some((worker, cancel_tx, cycle)),
            BridgeState::Idle => None,
        }
    }
}
