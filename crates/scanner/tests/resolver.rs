//! Integration tests for the manual lookup resolver actor.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;

use common::{ctx, next_outcome, FakeApi};
use rollcall_client::gateway::SubmissionGateway;
use rollcall_core::attendance::{AttendanceOutcome, ErrorKind};
use rollcall_core::error::CoreError;
use rollcall_core::student::MAX_CANDIDATES;
use rollcall_events::{Channel, EventBus, KioskEvent, KioskEventKind};
use rollcall_scanner::lookup::NO_STUDENT_SELECTED;
use rollcall_scanner::resolver::{LookupHandle, LookupResolver};

struct Harness {
    handle: LookupHandle,
    api: Arc<FakeApi>,
    events: broadcast::Receiver<KioskEvent>,
}

fn harness() -> Harness {
    let api = Arc::new(FakeApi::default());
    let bus = Arc::new(EventBus::default());
    let events = bus.subscribe();
    let gateway = Arc::new(SubmissionGateway::new(api.clone()));
    let handle = LookupResolver::spawn(api.clone(), gateway, bus);
    Harness {
        handle,
        api,
        events,
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Type `query`, let the debounce fire and select the first candidate.
async fn select_first(h: &Harness, query: &str) {
    h.handle.set_context(Some(ctx())).await.unwrap();
    h.handle.query_changed(query).await.unwrap();
    tokio::time::sleep(ms(400)).await;
    h.handle.select(0).await.unwrap();
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn fast_typing_issues_one_search_for_final_text() {
    let h = harness();

    h.handle.query_changed("Ju").await.unwrap();
    tokio::time::sleep(ms(60)).await;
    h.handle.query_changed("Jua").await.unwrap();
    tokio::time::sleep(ms(60)).await;
    h.handle.query_changed("Juan").await.unwrap();

    tokio::time::sleep(ms(299)).await;
    assert!(h.api.searches().is_empty());

    tokio::time::sleep(ms(100)).await;
    assert_eq!(h.api.searches(), vec!["Juan"]);

    let snap = h.handle.snapshot().await.unwrap();
    assert_eq!(snap.candidates.len(), MAX_CANDIDATES);
    assert!(!snap.searching);
}

#[tokio::test(start_paused = true)]
async fn short_queries_never_reach_the_backend() {
    let h = harness();

    let snap = h.handle.query_changed("J").await.unwrap();
    assert!(!snap.searching);
    tokio::time::sleep(ms(1000)).await;
    assert!(h.api.searches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn superseded_search_result_is_discarded() {
    let h = harness();
    h.api.slow_search("Ma", ms(1000));

    h.handle.query_changed("Ma").await.unwrap();
    tokio::time::sleep(ms(350)).await;
    h.handle.query_changed("Maria").await.unwrap();
    tokio::time::sleep(ms(350)).await;

    let snap = h.handle.snapshot().await.unwrap();
    assert!(snap.candidates.iter().all(|s| s.last_name == "Maria"));

    // The slow "Ma" search lands now and must not replace "Maria".
    tokio::time::sleep(ms(1000)).await;
    let snap = h.handle.snapshot().await.unwrap();
    assert_eq!(snap.query, "Maria");
    assert!(!snap.candidates.is_empty());
    assert!(snap.candidates.iter().all(|s| s.last_name == "Maria"));
    assert_eq!(h.api.searches(), vec!["Ma", "Maria"]);
}

#[tokio::test(start_paused = true)]
async fn selection_freezes_query_and_suppresses_search() {
    let h = harness();
    select_first(&h, "Dela Cruz").await;

    let snap = h.handle.snapshot().await.unwrap();
    assert_eq!(snap.query, "2021-001 - Juan Dela Cruz");
    assert!(snap.candidates.is_empty());
    assert!(snap.selected.is_some());

    tokio::time::sleep(ms(1000)).await;
    assert_eq!(h.api.searches(), vec!["Dela Cruz"]);

    let snap = h.handle.query_changed("Santos").await.unwrap();
    assert!(snap.selected.is_none());
    assert!(snap.searching);
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn submit_without_selection_is_refused() {
    let mut h = harness();
    h.handle.set_context(Some(ctx())).await.unwrap();

    assert_matches!(
        h.handle.submit().await,
        Err(CoreError::Validation(msg)) if msg == NO_STUDENT_SELECTED
    );
    assert!(h.api.marks().is_empty());
    assert_matches!(
        next_outcome(&mut h.events).await,
        AttendanceOutcome::Error { kind: ErrorKind::Validation, ref message, .. }
            if message == NO_STUDENT_SELECTED
    );
}

#[tokio::test(start_paused = true)]
async fn successful_submit_resets_the_form() {
    let mut h = harness();
    select_first(&h, "Dela Cruz").await;

    let outcome = h.handle.submit().await.unwrap();
    assert_eq!(
        outcome,
        AttendanceOutcome::Success {
            person_id: "2021-001".into(),
            display_name: "Juan Dela Cruz".into(),
            session: ctx().session,
        }
    );
    assert_eq!(h.api.marks(), vec!["rec-1"]);

    let snap = h.handle.snapshot().await.unwrap();
    assert_eq!(snap.query, "");
    assert!(snap.selected.is_none());

    let event = h.events.recv().await.unwrap();
    assert_matches!(
        event.kind,
        KioskEventKind::Outcome { channel: Channel::Manual, .. }
    );
}

#[tokio::test(start_paused = true)]
async fn already_marked_keeps_the_selection() {
    let mut h = harness();
    h.api.set_duplicate(true);
    select_first(&h, "Dela Cruz").await;

    let outcome = h.handle.submit().await.unwrap();
    assert_eq!(
        outcome,
        AttendanceOutcome::AlreadyMarked {
            person_id: "2021-001".into(),
            display_name: "Juan Dela Cruz".into(),
            session: ctx().session,
            marked_at: Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap(),
        }
    );
    assert_eq!(next_outcome(&mut h.events).await, outcome);

    let snap = h.handle.snapshot().await.unwrap();
    assert!(snap.selected.is_some());
    assert!(!snap.submitting);
}

#[tokio::test(start_paused = true)]
async fn network_error_blocks_resubmission_until_acknowledged() {
    let h = harness();
    h.api.set_offline(true);
    select_first(&h, "Dela Cruz").await;

    assert_matches!(
        h.handle.submit().await,
        Ok(AttendanceOutcome::Error { kind: ErrorKind::Network, .. })
    );
    assert_matches!(h.handle.submit().await, Err(CoreError::Network(_)));
    assert_eq!(h.api.marks().len(), 1);

    h.api.set_offline(false);
    let snap = h.handle.acknowledge_network_error().await.unwrap();
    assert!(!snap.network_blocked);
    assert!(snap.selected.is_some());
    assert!(h.handle.submit().await.unwrap().is_success());
}
