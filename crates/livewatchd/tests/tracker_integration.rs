//! Integration tests for the liveness tracker.
//!
//! These drive `LivenessTracker::apply` with fetch results and check both the
//! in-memory state and what reached the store.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

mod common;

use std::sync::Arc;

use livewatch_core::{Liveness, Platform, SessionId, Target, Transition};
use livewatch_platforms::FetchError;
use livewatchd::service::{QueryError, StatusService};
use livewatchd::store::SessionStore;
use livewatchd::tracker::{ApplyOutcome, LivenessTracker};

use common::{live, offline, target, MemoryStore};

// ============================================================================
// Test Helpers
// ============================================================================

fn tracker_for(targets: &[Target]) -> (Arc<LivenessTracker>, Arc<MemoryStore>) {
    let store = MemoryStore::new();
    let dyn_store: Arc<dyn SessionStore> = store.clone();
    (Arc::new(LivenessTracker::new(targets, dyn_store)), store)
}

fn went_live(outcome: ApplyOutcome) -> SessionId {
    match outcome {
        ApplyOutcome::Succeeded {
            transition: Transition::WentLive(id),
        } => id,
        other => panic!("expected WentLive, got {other:?}"),
    }
}

// ============================================================================
// Session Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_live_then_offline_records_one_session() {
    let alice = target("alice", Platform::Bilibili, "100");
    let (tracker, store) = tracker_for(std::slice::from_ref(&alice));

    let session = went_live(tracker.apply(&alice, Ok(live(&alice, "A"))).await);

    let state = tracker.get(&alice.id).await.unwrap();
    assert_eq!(state.liveness, Liveness::Live { session });
    assert_eq!(state.title, "A");
    assert!(state.start_time.is_some());

    let sessions = store.sessions_for("alice");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].title, "A");
    assert!(sessions[0].is_open());

    let outcome = tracker.apply(&alice, Ok(offline(&alice))).await;
    assert_eq!(
        outcome,
        ApplyOutcome::Succeeded {
            transition: Transition::WentOffline(session)
        }
    );

    let state = tracker.get(&alice.id).await.unwrap();
    assert_eq!(state.liveness, Liveness::Offline);
    assert!(state.start_time.is_none());

    let sessions = store.sessions_for("alice");
    assert_eq!(sessions.len(), 1);
    let closed = &sessions[0];
    let end = closed.end_time.expect("session should be closed");
    assert!(end >= closed.start_time);
    assert_eq!(closed.duration_secs(), Some((end - closed.start_time).num_seconds()));
}

#[tokio::test]
async fn test_repeated_live_results_keep_one_session() {
    let alice = target("alice", Platform::Douyu, "9999");
    let (tracker, store) = tracker_for(std::slice::from_ref(&alice));

    let session = went_live(tracker.apply(&alice, Ok(live(&alice, "first"))).await);
    for title in ["second", "third", "fourth"] {
        let outcome = tracker.apply(&alice, Ok(live(&alice, title))).await;
        assert_eq!(
            outcome,
            ApplyOutcome::Succeeded {
                transition: Transition::Unchanged
            }
        );
    }

    let sessions = store.sessions_for("alice");
    assert_eq!(sessions.len(), 1);
    // The session keeps the title it opened with.
    assert_eq!(sessions[0].title, "first");

    let state = tracker.get(&alice.id).await.unwrap();
    assert_eq!(state.open_session(), Some(session));
    assert_eq!(state.title, "fourth");
}

#[tokio::test]
async fn test_repeated_offline_results_open_nothing() {
    let alice = target("alice", Platform::Weibo, "55");
    let (tracker, store) = tracker_for(std::slice::from_ref(&alice));

    for _ in 0..3 {
        tracker.apply(&alice, Ok(offline(&alice))).await;
    }

    assert!(store.sessions_for("alice").is_empty());
    let status = store.status_for("alice").unwrap();
    assert!(!status.is_live);
    assert!(!status.last_query_failed);
}

// ============================================================================
// Sticky Field Tests
// ============================================================================

#[tokio::test]
async fn test_empty_fields_never_erase_known_values() {
    let alice = target("alice", Platform::Kuaishou, "kwai_1");
    let (tracker, _store) = tracker_for(std::slice::from_ref(&alice));

    let mut first = live(&alice, "Evening stream");
    first.name = Some("Alice Live".to_string());
    first.avatar = Some("https://img/alice.png".to_string());
    first.viewer_count = Some(1200);
    first.room_url = "https://live.kuaishou.com/u/kwai_1".to_string();
    tracker.apply(&alice, Ok(first)).await;

    let mut second = live(&alice, "");
    second.name = Some(String::new());
    second.avatar = None;
    tracker.apply(&alice, Ok(second)).await;

    let state = tracker.get(&alice.id).await.unwrap();
    assert_eq!(state.title, "Evening stream");
    assert_eq!(state.name, "Alice Live");
    assert_eq!(state.avatar.as_deref(), Some("https://img/alice.png"));
    assert_eq!(state.viewer_count, 1200);
    assert_eq!(state.room_url.as_deref(), Some("https://live.kuaishou.com/u/kwai_1"));
}

#[tokio::test]
async fn test_session_title_falls_back_to_known_title() {
    let alice = target("alice", Platform::Cc163, "361433");
    let (tracker, store) = tracker_for(std::slice::from_ref(&alice));

    let mut quiet = offline(&alice);
    quiet.title = "Weekly show".to_string();
    tracker.apply(&alice, Ok(quiet)).await;

    tracker.apply(&alice, Ok(live(&alice, ""))).await;

    let sessions = store.sessions_for("alice");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].title, "Weekly show");
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test]
async fn test_three_failures_count_and_log_once() {
    let alice = target("alice", Platform::Douyin, "80017709309");
    let (tracker, store) = tracker_for(std::slice::from_ref(&alice));

    let session = went_live(tracker.apply(&alice, Ok(live(&alice, "A"))).await);

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(tracker.apply(&alice, Err(FetchError::Timeout)).await);
    }

    assert_eq!(
        outcomes,
        vec![
            ApplyOutcome::Failed { consecutive: 1, logged: true },
            ApplyOutcome::Failed { consecutive: 2, logged: false },
            ApplyOutcome::Failed { consecutive: 3, logged: false },
        ]
    );

    let state = tracker.get(&alice.id).await.unwrap();
    assert_eq!(state.consecutive_failures, 3);
    assert!(state.last_query_failed);
    assert_eq!(state.liveness, Liveness::Live { session });
    assert_eq!(store.sessions_for("alice").len(), 1);
    assert!(store.sessions_for("alice")[0].is_open());

    // The failed row keeps the last known values.
    let status = store.status_for("alice").unwrap();
    assert!(status.last_query_failed);
    assert!(status.is_live);
    assert_eq!(status.title, "A");
}

#[tokio::test]
async fn test_success_resets_failure_counter() {
    let alice = target("alice", Platform::Douyu, "1");
    let (tracker, _store) = tracker_for(std::slice::from_ref(&alice));

    tracker.apply(&alice, Err(FetchError::Status(503))).await;
    tracker.apply(&alice, Err(FetchError::Status(503))).await;
    tracker.apply(&alice, Ok(offline(&alice))).await;

    let state = tracker.get(&alice.id).await.unwrap();
    assert_eq!(state.consecutive_failures, 0);
    assert!(!state.last_query_failed);

    let outcome = tracker.apply(&alice, Err(FetchError::NoSignal)).await;
    assert_eq!(outcome, ApplyOutcome::Failed { consecutive: 1, logged: true });
}

#[tokio::test]
async fn test_failure_for_one_target_leaves_others_alone() {
    let alice = target("alice", Platform::Bilibili, "1");
    let bob = target("bob", Platform::Bilibili, "2");
    let (tracker, store) = tracker_for(&[alice.clone(), bob.clone()]);

    tracker.apply(&bob, Ok(live(&bob, "B"))).await;
    let before = tracker.get(&bob.id).await.unwrap();

    tracker
        .apply(&alice, Err(FetchError::Transport("connection reset".to_string())))
        .await;

    assert_eq!(tracker.get(&bob.id).await.unwrap(), before);
    assert_eq!(tracker.get(&alice.id).await.unwrap().consecutive_failures, 1);

    // Bob's next fetch is unaffected.
    tracker.apply(&bob, Ok(offline(&bob))).await;
    assert!(!tracker.get(&bob.id).await.unwrap().is_live());
    assert!(store.sessions_for("bob")[0].end_time.is_some());
}

#[tokio::test]
async fn test_cancelled_fetch_records_nothing() {
    let alice = target("alice", Platform::Weibo, "7");
    let (tracker, store) = tracker_for(std::slice::from_ref(&alice));

    let outcome = tracker.apply(&alice, Err(FetchError::Cancelled)).await;

    assert_eq!(outcome, ApplyOutcome::Cancelled);
    assert!(store.status_for("alice").is_none());
    let state = tracker.get(&alice.id).await.unwrap();
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.last_query_time.is_none());
}

#[tokio::test]
async fn test_unknown_target_is_rejected() {
    let alice = target("alice", Platform::Douyu, "1");
    let stranger = target("stranger", Platform::Douyu, "2");
    let (tracker, store) = tracker_for(std::slice::from_ref(&alice));

    let outcome = tracker.apply(&stranger, Ok(live(&stranger, "x"))).await;

    assert_eq!(outcome, ApplyOutcome::UnknownTarget);
    assert!(store.sessions_for("stranger").is_empty());
}

// ============================================================================
// Store Failure Tests
// ============================================================================

#[tokio::test]
async fn test_failed_session_open_stays_offline_and_retries() {
    let alice = target("alice", Platform::Bilibili, "100");
    let (tracker, store) = tracker_for(std::slice::from_ref(&alice));

    store.fail_start_session(true);
    let outcome = tracker.apply(&alice, Ok(live(&alice, "A"))).await;
    assert_eq!(
        outcome,
        ApplyOutcome::Succeeded {
            transition: Transition::Unchanged
        }
    );
    assert!(!tracker.get(&alice.id).await.unwrap().is_live());
    assert!(store.sessions_for("alice").is_empty());

    store.fail_start_session(false);
    went_live(tracker.apply(&alice, Ok(live(&alice, "A"))).await);
    assert_eq!(store.sessions_for("alice").len(), 1);
}

#[tokio::test]
async fn test_failed_session_close_stays_live_and_retries() {
    let alice = target("alice", Platform::Bilibili, "100");
    let (tracker, store) = tracker_for(std::slice::from_ref(&alice));

    let session = went_live(tracker.apply(&alice, Ok(live(&alice, "A"))).await);

    store.fail_end_session(true);
    tracker.apply(&alice, Ok(offline(&alice))).await;
    assert_eq!(tracker.get(&alice.id).await.unwrap().open_session(), Some(session));
    assert!(store.sessions_for("alice")[0].is_open());

    store.fail_end_session(false);
    let outcome = tracker.apply(&alice, Ok(offline(&alice))).await;
    assert_eq!(
        outcome,
        ApplyOutcome::Succeeded {
            transition: Transition::WentOffline(session)
        }
    );
    assert!(!store.sessions_for("alice")[0].is_open());
}

// ============================================================================
// Restore Tests
// ============================================================================

#[tokio::test]
async fn test_restore_adopts_open_session() {
    let alice = target("alice", Platform::Douyu, "9999");
    let bob = target("bob", Platform::Douyu, "8888");
    let store = MemoryStore::new();
    let opened = store
        .start_session(&alice, "Left running", chrono::Utc::now())
        .await
        .unwrap();

    let dyn_store: Arc<dyn SessionStore> = store.clone();
    let tracker = LivenessTracker::new(&[alice.clone(), bob.clone()], dyn_store);
    let report = tracker.restore().await;

    assert_eq!(report.adopted_sessions, 1);
    assert_eq!(report.errors, 0);

    let state = tracker.get(&alice.id).await.unwrap();
    assert_eq!(state.liveness, Liveness::Live { session: opened });
    assert_eq!(state.title, "Left running");
    assert!(!tracker.get(&bob.id).await.unwrap().is_live());

    // Still live: no second session.
    tracker.apply(&alice, Ok(live(&alice, "Left running"))).await;
    assert_eq!(store.sessions_for("alice").len(), 1);

    // Offline closes the adopted session.
    tracker.apply(&alice, Ok(offline(&alice))).await;
    assert!(store.sessions_for("alice")[0].end_time.is_some());
}

#[tokio::test]
async fn test_restore_reads_cached_status_but_not_liveness() {
    let alice = target("alice", Platform::Douyu, "9999");
    let store = MemoryStore::new();
    let outcome = livewatch_core::QueryOutcome {
        is_live: true,
        title: "Stale".to_string(),
        viewer_count: 42,
        failed: true,
    };
    let at = chrono::Utc::now();
    store.record_query_outcome(&alice.id, &outcome, at).await.unwrap();

    let dyn_store: Arc<dyn SessionStore> = store.clone();
    let tracker = LivenessTracker::new(std::slice::from_ref(&alice), dyn_store);
    let report = tracker.restore().await;
    assert_eq!(report.cached_rows, 1);

    let state = tracker.get(&alice.id).await.unwrap();
    assert!(!state.is_live());
    assert_eq!(state.title, "Stale");
    assert_eq!(state.viewer_count, 42);
    assert_eq!(state.last_query_time, Some(at));
    assert!(state.last_query_failed);
}

// ============================================================================
// Query Surface Tests
// ============================================================================

#[tokio::test]
async fn test_service_lists_targets_in_config_order() {
    let targets = vec![
        target("zed", Platform::Weibo, "1"),
        target("amy", Platform::Bilibili, "2"),
        target("kim", Platform::Weibo, "3"),
    ];
    let (tracker, _store) = tracker_for(&targets);
    let service = StatusService::new(tracker, &targets);

    let ids: Vec<_> = service
        .list_targets()
        .await
        .into_iter()
        .map(|s| s.id.to_string())
        .collect();
    assert_eq!(ids, vec!["zed", "amy", "kim"]);
}

#[tokio::test]
async fn test_service_history_and_stats() {
    let alice = target("alice", Platform::Bilibili, "100");
    let (tracker, _store) = tracker_for(std::slice::from_ref(&alice));
    let service = StatusService::new(Arc::clone(&tracker), std::slice::from_ref(&alice));

    for round in 0..3 {
        tracker.apply(&alice, Ok(live(&alice, &format!("stream {round}")))).await;
        tracker.apply(&alice, Ok(offline(&alice))).await;
    }

    let history = service.history("alice", 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|s| s.duration.is_some()));
    assert_eq!(history[0].title, "stream 2");

    let all = service.history("alice", 0).await.unwrap();
    assert_eq!(all.len(), 3);

    let stats = service.stats("alice").await.unwrap();
    assert_eq!(stats.total_sessions, 3);
    assert_eq!(stats.week_sessions, 3);
    assert!(stats.last_live_time.is_some());

    assert!(matches!(
        service.history("nobody", 5).await,
        Err(QueryError::UnknownTarget(id)) if id == "nobody"
    ));
    assert!(matches!(service.stats("nobody").await, Err(QueryError::UnknownTarget(_))));
}
