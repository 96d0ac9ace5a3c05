//! Tests for the single-flight refresh protocol.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Barrier, Notify};
use tokio::task::JoinSet;

use crate::classify::ErrorKind;
use crate::error::{SessionError, TransportError};
use crate::events::{EventSink, SessionEvent};

use super::{refresh_fn, RefreshCoordinator, RefreshFn};

/// Backend whose calls fail with 401 until the session is marked valid.
#[derive(Default)]
struct Backend {
    valid: AtomicBool,
    calls: AtomicUsize,
}

impl Backend {
    fn get(&self, id: usize) -> Result<usize, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.valid.load(Ordering::SeqCst) {
            Ok(id)
        } else {
            Err(TransportError::status(401, "token expired"))
        }
    }
}

fn succeeding_refresh(backend: &Arc<Backend>, delay: Duration) -> RefreshFn {
    let backend = Arc::clone(backend);
    refresh_fn(move || {
        let backend = Arc::clone(&backend);
        async move {
            tokio::time::sleep(delay).await;
            backend.valid.store(true, Ordering::SeqCst);
            Ok(())
        }
    })
}

fn failing_refresh(delay: Duration) -> RefreshFn {
    refresh_fn(move || async move {
        tokio::time::sleep(delay).await;
        Err(TransportError::no_response("connection refused"))
    })
}

fn coordinator(refresh: RefreshFn) -> Arc<RefreshCoordinator> {
    Arc::new(RefreshCoordinator::new(
        refresh,
        Duration::from_secs(5),
        EventSink::none(),
    ))
}

/// Spawn `n` callers whose first attempts all return together, then collect results.
async fn run_cohort(
    n: usize,
    coord: &Arc<RefreshCoordinator>,
    backend: &Arc<Backend>,
) -> Vec<Result<usize, SessionError>> {
    let barrier = Arc::new(Barrier::new(n));
    let mut set = JoinSet::new();
    for id in 0..n {
        let coord = Arc::clone(coord);
        let backend = Arc::clone(backend);
        let barrier = Arc::clone(&barrier);
        set.spawn(async move {
            let mut first = true;
            coord
                .guard(|| {
                    let wait = std::mem::replace(&mut first, false);
                    let backend = Arc::clone(&backend);
                    let barrier = Arc::clone(&barrier);
                    async move {
                        if wait {
                            barrier.wait().await;
                        }
                        backend.get(id)
                    }
                })
                .await
        });
    }
    let mut results = Vec::with_capacity(n);
    while let Some(res) = set.join_next().await {
        results.push(res.expect("caller task panicked"));
    }
    results
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn five_concurrent_401s_share_one_refresh() {
    let backend = Arc::new(Backend::default());
    let coord = coordinator(succeeding_refresh(&backend, Duration::from_millis(50)));

    let results = run_cohort(5, &coord, &backend).await;

    assert_eq!(results.len(), 5);
    let mut ids: Vec<usize> = results.into_iter().map(|r| r.expect("call succeeds")).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    assert_eq!(coord.refresh_count(), 1);
    // One failed attempt and one replay per caller.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 10);
    assert!(!coord.is_refreshing());
    assert_eq!(coord.waiter_count(), 0);
}

#[tokio::test]
async fn single_flight_holds_for_a_hundred_callers() {
    let backend = Arc::new(Backend::default());
    let coord = coordinator(succeeding_refresh(&backend, Duration::from_millis(20)));

    let results = run_cohort(100, &coord, &backend).await;

    assert_eq!(results.len(), 100);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(coord.refresh_count(), 1);
}

#[tokio::test]
async fn refresh_failure_reaches_caller_and_emits_session_lost_once() {
    let backend = Arc::new(Backend::default());
    let (tx, mut rx) = mpsc::channel(8);
    let coord = RefreshCoordinator::new(
        failing_refresh(Duration::ZERO),
        Duration::from_secs(5),
        EventSink::new(tx),
    );

    let result = coord.guard(|| async { backend.get(0) }).await;

    assert_eq!(
        result,
        Err(SessionError::RefreshFailed {
            source: TransportError::no_response("connection refused"),
        })
    );
    assert_eq!(result.unwrap_err().kind(), Some(ErrorKind::Network));
    assert_eq!(rx.try_recv(), Ok(SessionEvent::Lost));
    assert!(rx.try_recv().is_err());
    assert_eq!(coord.refresh_count(), 1);
}

#[tokio::test]
async fn refresh_failure_is_shared_by_the_whole_cohort() {
    let backend = Arc::new(Backend::default());
    let coord = coordinator(failing_refresh(Duration::from_millis(20)));

    let results = run_cohort(10, &coord, &backend).await;

    let expected = SessionError::RefreshFailed {
        source: TransportError::no_response("connection refused"),
    };
    assert!(results.iter().all(|r| r.as_ref().err() == Some(&expected)));
    assert_eq!(coord.refresh_count(), 1);
    // Nobody replays after a failed refresh.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn replay_401_is_terminal_and_does_not_refresh_again() {
    let backend = Arc::new(Backend::default());
    let (tx, mut rx) = mpsc::channel(8);
    // Refresh "succeeds" but never makes the backend accept the session.
    let coord = RefreshCoordinator::new(
        refresh_fn(|| async { Ok(()) }),
        Duration::from_secs(5),
        EventSink::new(tx),
    );

    let result = coord.guard(|| async { backend.get(0) }).await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UnauthorizedTerminal));
    assert!(err.ends_session());
    assert_eq!(coord.refresh_count(), 1);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(rx.try_recv(), Ok(SessionEvent::Confirmed));
    assert_eq!(rx.try_recv(), Ok(SessionEvent::Lost));
}

#[tokio::test]
async fn cohort_replays_that_fail_do_not_start_a_storm() {
    let backend = Arc::new(Backend::default());
    let coord = coordinator(refresh_fn(|| async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(())
    }));

    let results = run_cohort(20, &coord, &backend).await;

    assert!(results.iter().all(|r| {
        r.as_ref().err().and_then(SessionError::kind) == Some(ErrorKind::UnauthorizedTerminal)
    }));
    assert_eq!(coord.refresh_count(), 1);
}

#[tokio::test]
async fn terminal_replays_of_one_episode_report_session_lost_once() {
    let backend = Arc::new(Backend::default());
    let (tx, mut rx) = mpsc::channel(32);
    let coord = Arc::new(RefreshCoordinator::new(
        refresh_fn(|| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(())
        }),
        Duration::from_secs(5),
        EventSink::new(tx),
    ));

    let results = run_cohort(10, &coord, &backend).await;

    assert!(results.iter().all(|r| r.as_ref().is_err_and(SessionError::ends_session)));
    assert_eq!(coord.refresh_count(), 1);
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events, vec![SessionEvent::Confirmed, SessionEvent::Lost]);
}

#[tokio::test]
async fn confirmation_is_observable_before_any_replay() {
    let backend = Arc::new(Backend::default());
    let (tx, rx) = mpsc::channel(8);
    let rx = Arc::new(Mutex::new(rx));
    let coord = RefreshCoordinator::new(
        succeeding_refresh(&backend, Duration::ZERO),
        Duration::from_secs(5),
        EventSink::new(tx),
    );

    let mut first = true;
    let result = coord
        .guard(|| {
            let replaying = !std::mem::replace(&mut first, false);
            let backend = Arc::clone(&backend);
            let rx = Arc::clone(&rx);
            async move {
                if replaying {
                    let seen = rx.lock().unwrap().try_recv();
                    assert_eq!(seen, Ok(SessionEvent::Confirmed));
                }
                backend.get(7)
            }
        })
        .await;

    assert_eq!(result, Ok(7));
}

#[tokio::test]
async fn non_401_outcomes_pass_through_untouched() {
    let coord = coordinator(refresh_fn(|| async { Ok(()) }));

    let not_found: Result<(), _> = coord
        .guard(|| async { Err(TransportError::status(404, "missing")) })
        .await;
    assert_eq!(not_found.unwrap_err().kind(), Some(ErrorKind::Client(404)));

    let calls = AtomicUsize::new(0);
    let calls = &calls;
    let busy: Result<(), _> = coord
        .guard(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::status(503, "busy"))
        })
        .await;
    assert_eq!(busy.unwrap_err().kind(), Some(ErrorKind::Server(503)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let ok = coord.guard(|| async { Ok::<_, TransportError>(42) }).await;
    assert_eq!(ok, Ok(42));
    assert_eq!(coord.refresh_count(), 0);
}

#[tokio::test]
async fn refresh_timeout_counts_as_network_failure() {
    let backend = Arc::new(Backend::default());
    let (tx, mut rx) = mpsc::channel(8);
    let coord = RefreshCoordinator::new(
        succeeding_refresh(&backend, Duration::from_secs(10)),
        Duration::from_millis(20),
        EventSink::new(tx),
    );

    let err = coord.guard(|| async { backend.get(0) }).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::RefreshFailed {
            source: TransportError::NoResponse { .. }
        }
    ));
    assert_eq!(err.kind(), Some(ErrorKind::Network));
    assert_eq!(rx.try_recv(), Ok(SessionEvent::Lost));
    assert!(!coord.is_refreshing());
}

#[tokio::test]
async fn reset_aborts_waiters_and_discards_stale_refresh() {
    let backend = Arc::new(Backend::default());
    let gate = Arc::new(Notify::new());
    let refresh = {
        let gate = Arc::clone(&gate);
        let backend = Arc::clone(&backend);
        refresh_fn(move || {
            let gate = Arc::clone(&gate);
            let backend = Arc::clone(&backend);
            async move {
                gate.notified().await;
                backend.valid.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
    };
    let coord = coordinator(refresh);

    let cohort = {
        let coord = Arc::clone(&coord);
        let backend = Arc::clone(&backend);
        tokio::spawn(async move { run_cohort(4, &coord, &backend).await })
    };

    wait_until(|| coord.waiter_count() == 3).await;
    assert_eq!(coord.reset(), 3);
    assert!(!coord.is_refreshing());
    gate.notify_one();

    let results = cohort.await.unwrap();
    assert!(results
        .iter()
        .all(|r| r.as_ref().err() == Some(&SessionError::SessionReset)));
    assert_eq!(coord.refresh_count(), 1);

    // The next episode starts clean.
    let ok = coord.guard(|| async { backend.get(9) }).await;
    assert_eq!(ok, Ok(9));
}

#[tokio::test]
async fn cancelled_leader_releases_waiters() {
    let backend = Arc::new(Backend::default());
    let coord = coordinator(refresh_fn(|| std::future::pending()));

    let leader = {
        let coord = Arc::clone(&coord);
        let backend = Arc::clone(&backend);
        tokio::spawn(async move { coord.guard(|| async { backend.get(0) }).await })
    };
    wait_until(|| coord.is_refreshing()).await;

    let mut waiters = JoinSet::new();
    for id in 1..=2 {
        let coord = Arc::clone(&coord);
        let backend = Arc::clone(&backend);
        waiters.spawn(async move { coord.guard(|| async { backend.get(id) }).await });
    }
    wait_until(|| coord.waiter_count() == 2).await;

    leader.abort();
    assert!(leader.await.unwrap_err().is_cancelled());

    while let Some(res) = waiters.join_next().await {
        assert_eq!(res.unwrap(), Err(SessionError::RefreshInterrupted));
    }
    assert!(!coord.is_refreshing());
}

#[tokio::test]
async fn refresh_that_hits_401_through_guard_does_not_recurse() {
    let coord = coordinator(refresh_fn(|| async { Ok(()) }));
    let weak = Arc::downgrade(&coord);
    coord.set_refresh(refresh_fn(move || {
        let weak = weak.clone();
        async move {
            let Some(coord) = weak.upgrade() else {
                return Err(TransportError::no_response("client dropped"));
            };
            coord
                .guard(|| async { Err::<(), _>(TransportError::status(401, "refresh expired")) })
                .await
                .map_err(|e| match e {
                    SessionError::Request { source, .. } => source,
                    other => TransportError::no_response(other.to_string()),
                })
        }
    }));

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        coord.guard(|| async { Err::<(), _>(TransportError::status(401, "expired")) }),
    )
    .await
    .expect("re-entrant refresh must not deadlock");

    let err = outcome.unwrap_err();
    assert_eq!(
        err,
        SessionError::RefreshFailed {
            source: TransportError::status(401, "refresh expired"),
        }
    );
    assert_eq!(err.kind(), Some(ErrorKind::UnauthorizedTerminal));
    assert_eq!(coord.refresh_count(), 1);
}

#[tokio::test]
async fn swapped_refresh_applies_to_the_next_episode() {
    let backend = Arc::new(Backend::default());
    let coord = coordinator(failing_refresh(Duration::ZERO));

    let first = coord.guard(|| async { backend.get(1) }).await;
    assert!(matches!(first, Err(SessionError::RefreshFailed { .. })));

    coord.set_refresh(succeeding_refresh(&backend, Duration::ZERO));
    let second = coord.guard(|| async { backend.get(2) }).await;
    assert_eq!(second, Ok(2));
    assert_eq!(coord.refresh_count(), 2);
}
