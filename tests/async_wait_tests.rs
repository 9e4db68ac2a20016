//! Integration tests for the async wait bridge
//!
//! These tests exercise real named semaphores end to end: background waits
//! resolving when an independent handle posts, forced cancellation, the
//! one-wait-at-a-time rule, and permit accounting across the async path.

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use compio_named_sem::{NamedSemaphore, SemaphoreError};
use futures::channel::oneshot;

fn unique_name(tag: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    format!(
        "/cns-it-{}-{}-{}",
        tag,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// A blocked async wait resolves with success once an independent handle to
/// the same name posts a permit, and the held count reflects the acquisition.
#[compio::test]
async fn async_wait_completes_when_peer_posts() {
    let name = unique_name("post");
    let sem = NamedSemaphore::create(&name, 0).unwrap();
    let peer = NamedSemaphore::create(&name, 0).unwrap();

    let (tx, rx) = oneshot::channel();
    sem.start_async_wait(move |acquired| {
        let _ = tx.send(acquired);
    })
    .unwrap();

    // The worker may or may not be blocked yet; the permit waits for it.
    peer.add_permit().unwrap();

    assert!(rx.await.unwrap());
    assert_eq!(sem.held_permits(), 1);
    sem.unlink().unwrap();
}

/// Cancelling an in-flight wait still fires the completion exactly once,
/// reporting cancellation, and leaves the held count alone.
#[compio::test]
async fn cancelled_wait_reports_cancellation() {
    let name = unique_name("cancel");
    let sem = NamedSemaphore::create(&name, 0).unwrap();

    let (tx, rx) = oneshot::channel();
    sem.start_async_wait(move |acquired| {
        let _ = tx.send(acquired);
    })
    .unwrap();
    sem.cancel_async_wait();

    assert!(!rx.await.unwrap());
    assert_eq!(sem.held_permits(), 0);
    sem.unlink().unwrap();
}

/// Cancelling with no wait outstanding is a no-op.
#[compio::test]
async fn cancel_while_idle_is_a_no_op() {
    let name = unique_name("idle-cancel");
    let sem = NamedSemaphore::create(&name, 0).unwrap();
    sem.cancel_async_wait();
    assert_eq!(sem.held_permits(), 0);
    sem.unlink().unwrap();
}

/// A second async wait is rejected while the first is in flight, and the
/// first wait's completion is unaffected by the rejection.
#[compio::test]
async fn second_wait_is_rejected_without_disturbing_the_first() {
    let name = unique_name("busy");
    let sem = NamedSemaphore::create(&name, 0).unwrap();
    let peer = NamedSemaphore::create(&name, 0).unwrap();

    let (tx, rx) = oneshot::channel();
    sem.start_async_wait(move |acquired| {
        let _ = tx.send(acquired);
    })
    .unwrap();

    let err = sem.start_async_wait(|_| {}).unwrap_err();
    assert!(matches!(err, SemaphoreError::WaitInProgress));

    peer.add_permit().unwrap();
    assert!(rx.await.unwrap());
    assert_eq!(sem.held_permits(), 1);
    sem.unlink().unwrap();
}

/// The handle is idle again before a completion is invoked, so a completion
/// can immediately start the next wait.
#[compio::test]
async fn completion_can_start_the_next_wait() {
    let name = unique_name("chain");
    let sem = Rc::new(NamedSemaphore::create(&name, 0).unwrap());
    let peer = NamedSemaphore::create(&name, 0).unwrap();

    let (tx, rx) = oneshot::channel();
    let chained = Rc::clone(&sem);
    sem.start_async_wait(move |first| {
        chained
            .start_async_wait(move |second| {
                let _ = tx.send((first, second));
            })
            .unwrap();
    })
    .unwrap();

    peer.add_permit().unwrap();
    peer.add_permit().unwrap();

    let (first, second) = rx.await.unwrap();
    assert!(first);
    assert!(second);
    assert_eq!(sem.held_permits(), 2);
    sem.unlink().unwrap();
}

/// A wait cancelled and restarted resolves the new cycle normally.
#[compio::test]
async fn wait_can_be_restarted_after_cancellation() {
    let name = unique_name("restart");
    let sem = NamedSemaphore::create(&name, 0).unwrap();
    let peer = NamedSemaphore::create(&name, 0).unwrap();

    let (cancel_tx, cancel_rx) = oneshot::channel();
    sem.start_async_wait(move |acquired| {
        let _ = cancel_tx.send(acquired);
    })
    .unwrap();
    sem.cancel_async_wait();

    let (tx, rx) = oneshot::channel();
    sem.start_async_wait(move |acquired| {
        let _ = tx.send(acquired);
    })
    .unwrap();
    peer.add_permit().unwrap();

    assert!(!cancel_rx.await.unwrap());
    assert!(rx.await.unwrap());
    assert_eq!(sem.held_permits(), 1);
    sem.unlink().unwrap();
}

/// Closing a handle with a wait in flight cancels it first; the completion
/// still fires, reporting cancellation.
#[compio::test]
async fn close_cancels_an_outstanding_wait() {
    let name = unique_name("close");
    let sem = NamedSemaphore::create(&name, 0).unwrap();
    sem.unlink().unwrap();

    let (tx, rx) = oneshot::channel();
    sem.start_async_wait(move |acquired| {
        let _ = tx.send(acquired);
    })
    .unwrap();
    sem.close().unwrap();

    assert!(!rx.await.unwrap());
}

/// Dropping a handle with a wait in flight notifies the completion too.
#[compio::test]
async fn teardown_cancels_an_outstanding_wait() {
    let name = unique_name("drop");
    let (tx, rx) = oneshot::channel();
    {
        let sem = NamedSemaphore::create(&name, 0).unwrap();
        sem.unlink().unwrap();
        sem.start_async_wait(move |acquired| {
            let _ = tx.send(acquired);
        })
        .unwrap();
    }
    assert!(!rx.await.unwrap());
}

/// Synchronous and asynchronous acquisitions share one ledger: permits
/// acquired through the bridge can be released with `post`.
#[compio::test]
async fn sync_and_async_paths_share_accounting() {
    let name = unique_name("shared");
    let sem = NamedSemaphore::create(&name, 1).unwrap();
    let peer = NamedSemaphore::create(&name, 0).unwrap();

    assert!(sem.try_wait().unwrap());
    assert_eq!(sem.held_permits(), 1);

    let (tx, rx) = oneshot::channel();
    sem.start_async_wait(move |acquired| {
        let _ = tx.send(acquired);
    })
    .unwrap();
    peer.add_permit().unwrap();
    assert!(rx.await.unwrap());
    assert_eq!(sem.held_permits(), 2);

    assert!(sem.post().unwrap());
    assert!(sem.post().unwrap());
    assert!(!sem.post().unwrap());
    assert_eq!(sem.held_permits(), 0);
    sem.unlink().unwrap();
}
