//! Integration tests for the analysis session.
//!
//! A scripted [`AnalysisClient`] stands in for the language model so the
//! state machine, the history store and the compare selection can be
//! driven end to end without network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use psychoanalyze::analysis::{parse_analysis, AnalysisClient, FallbackChain};
use psychoanalyze::compare::ToggleOutcome;
use psychoanalyze::error::{SessionError, GENERIC_ANALYSIS_FAILURE};
use psychoanalyze::history::HistoryStore;
use psychoanalyze::models::{AnalysisResult, RiskLevel};
use psychoanalyze::session::{Session, SessionLimits, SessionStatus};
use psychoanalyze::storage::{FileStore, KeyValueStore, MemoryStore, HISTORY_KEY};
use serde_json::json;
use tempfile::TempDir;

// ─── Scripted client ────────────────────────────────────────────────

enum Reply {
    Result(AnalysisResult),
    Fail(String),
    Hang,
}

struct FakeClient {
    reply: Reply,
    calls: AtomicUsize,
}

impl FakeClient {
    fn returning(result: AnalysisResult) -> Arc<Self> {
        Arc::new(Self {
            reply: Reply::Result(result),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Reply::Fail(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn hanging() -> Arc<Self> {
        Arc::new(Self {
            reply: Reply::Hang,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisClient for FakeClient {
    fn name(&self) -> &str {
        "fake"
    }

    async fn analyze(&self, _transcript: &str) -> Result<AnalysisResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Result(result) => Ok(result.clone()),
            Reply::Fail(message) => Err(anyhow!("{}", message)),
            Reply::Hang => std::future::pending().await,
        }
    }
}

fn result(risk: &str, summary: &str) -> AnalysisResult {
    let body = json!({
        "summary": summary,
        "language": "English",
        "riskLevel": risk,
        "defenseMechanisms": [{
            "name": "Projection",
            "description": "Attributes own feelings to others",
            "frequency": "Medium",
            "exampleQuote": "They are the anxious ones"
        }]
    });
    parse_analysis(&body.to_string()).unwrap()
}

fn session_with(client: Arc<FakeClient>, store: Arc<dyn KeyValueStore>) -> Session {
    let history = HistoryStore::open(store, 20);
    Session::new(client, history, SessionLimits::default())
}

fn transcript(len: usize) -> String {
    "a".repeat(len)
}

fn assert_reset_state(session: &Session) {
    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(session.data().is_none());
    assert!(session.error().is_none());
    assert_eq!(session.progress(), 0.0);
    assert!(session.compare().is_empty());
}

// ─── Validation ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_short_input_never_reaches_client() {
    let client = FakeClient::returning(result("Low", "fine"));
    let mut session = session_with(client.clone(), Arc::new(MemoryStore::new()));

    let err = session.submit("short").await.unwrap_err();
    assert_eq!(err.code(), "too-short");
    assert_eq!(session.status(), SessionStatus::Error);

    let err = session.submit("   \n  ").await.unwrap_err();
    assert_eq!(err, SessionError::EmptyInput);

    // 49 characters after trimming
    let err = session
        .submit(&format!("   {}   ", transcript(49)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "too-short");

    let err = session.submit(&transcript(100_001)).await.unwrap_err();
    assert_eq!(err.code(), "too-long");
    assert_eq!(session.error().map(|e| e.code()), Some("too-long"));

    assert_eq!(client.calls(), 0);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_boundary_lengths_call_client_once() {
    for len in [50, 100_000] {
        let client = FakeClient::returning(result("Low", "fine"));
        let mut session = session_with(client.clone(), Arc::new(MemoryStore::new()));
        session.submit(&transcript(len)).await.unwrap();
        assert_eq!(client.calls(), 1);
        assert_eq!(session.status(), SessionStatus::Success);
    }
}

// ─── Submission ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_successful_submission_records_history() {
    let client = FakeClient::returning(result("Medium", "Persistent worry about work"));
    let mut session = session_with(client.clone(), Arc::new(MemoryStore::new()));

    let data = session.submit(&transcript(200)).await.unwrap();
    assert_eq!(data.risk_level, RiskLevel::Medium);

    assert_eq!(session.status(), SessionStatus::Success);
    assert_eq!(session.progress(), 100.0);
    assert_eq!(session.history().len(), 1);

    let newest = session.history().load(None)[0].clone();
    assert_eq!(session.current_item_id(), Some(newest.id.as_str()));
    assert_eq!(newest.summary, "Persistent worry about work...");
    assert_eq!(newest.user_rating, 0);
}

#[tokio::test]
async fn test_client_failure_enters_error_state() {
    let client = FakeClient::failing("quota exceeded");
    let mut session = session_with(client.clone(), Arc::new(MemoryStore::new()));

    let err = session.submit(&transcript(200)).await.unwrap_err();
    assert_eq!(err, SessionError::AnalysisFailed("quota exceeded".to_string()));
    assert_eq!(session.status(), SessionStatus::Error);
    assert_eq!(session.progress(), 0.0);
    assert!(session.data().is_none());
    assert!(session.history().is_empty());

    // Resubmitting from error is allowed.
    let _ = session.submit(&transcript(200)).await;
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_blank_failure_message_uses_generic_text() {
    let client = FakeClient::failing("");
    let mut session = session_with(client, Arc::new(MemoryStore::new()));

    session.submit(&transcript(200)).await.unwrap_err();
    assert_eq!(
        session.error().map(|e| e.to_string()),
        Some(GENERIC_ANALYSIS_FAILURE.to_string())
    );
}

#[tokio::test]
async fn test_submit_from_success_is_rejected() {
    let client = FakeClient::returning(result("Low", "fine"));
    let mut session = session_with(client.clone(), Arc::new(MemoryStore::new()));
    session.submit(&transcript(60)).await.unwrap();

    let err = session.submit(&transcript(60)).await.unwrap_err();
    assert_eq!(err.code(), "invalid-transition");
    assert!(!err.is_terminal());
    assert_eq!(session.status(), SessionStatus::Success);
    assert!(session.data().is_some());
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_fallback_chain_behind_session() {
    let failing = FakeClient::failing("gemini down");
    let working = FakeClient::returning(result("High", "Acute distress"));
    let clients: Vec<Arc<dyn AnalysisClient>> = vec![failing.clone(), working.clone()];
    let chain = Arc::new(FallbackChain::new(clients).unwrap());

    let history = HistoryStore::open(Arc::new(MemoryStore::new()), 20);
    let mut session = Session::new(chain, history, SessionLimits::default());

    let data = session.submit(&transcript(80)).await.unwrap();
    assert_eq!(data.risk_level, RiskLevel::High);
    assert_eq!(failing.calls(), 1);
    assert_eq!(working.calls(), 1);
}

// ─── Loading and cancellation ───────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_dropped_submission_stays_loading_until_reset() {
    let client = FakeClient::hanging();
    let mut session = session_with(client.clone(), Arc::new(MemoryStore::new()));

    let text = transcript(200);
    let timed_out = tokio::time::timeout(Duration::from_secs(1), session.submit(&text)).await;
    assert!(timed_out.is_err());

    assert_eq!(session.status(), SessionStatus::Loading);
    assert!(session.view().is_loading);
    let progress = session.progress();
    assert!(progress > 0.0 && progress < 90.0, "progress was {}", progress);

    // The ticker died with the future.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(session.progress(), progress);

    assert_eq!(session.submit(&text).await.unwrap_err(), SessionError::Busy);
    assert!(!session.start_comparison());
    assert_eq!(client.calls(), 1);

    session.reset();
    assert_reset_state(&session);
}

#[tokio::test(start_paused = true)]
async fn test_progress_holds_at_ceiling() {
    let client = FakeClient::hanging();
    let mut session = session_with(client, Arc::new(MemoryStore::new()));
    let mut rx = session.subscribe_progress();

    let text = transcript(200);
    let _ = tokio::time::timeout(Duration::from_secs(600), session.submit(&text)).await;

    assert_eq!(*rx.borrow_and_update(), 90.0);
}

// ─── Reset ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reset_from_every_state() {
    let client = FakeClient::returning(result("Low", "fine"));
    let mut session = session_with(client, Arc::new(MemoryStore::new()));

    session.reset();
    assert_reset_state(&session);
    session.reset();
    assert_reset_state(&session);

    session.submit("short").await.unwrap_err();
    session.reset();
    assert_reset_state(&session);

    session.submit(&transcript(60)).await.unwrap();
    let first = session.current_item_id().unwrap().to_string();
    session.reset();
    assert_reset_state(&session);

    session.submit(&transcript(60)).await.unwrap();
    let second = session.current_item_id().unwrap().to_string();
    session.toggle_compare(&first);
    session.toggle_compare(&second);
    assert!(session.start_comparison());
    session.reset();
    assert_reset_state(&session);

    // History survives reset.
    assert_eq!(session.history().len(), 2);
}

// ─── History ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_history_keeps_twenty_most_recent() {
    let client = FakeClient::returning(result("Low", "fine"));
    let mut session = session_with(client, Arc::new(MemoryStore::new()));

    let mut ids = Vec::new();
    for _ in 0..25 {
        session.submit(&transcript(60)).await.unwrap();
        ids.push(session.current_item_id().unwrap().to_string());
        session.reset();
    }

    let listed: Vec<String> = session
        .history()
        .load(None)
        .iter()
        .map(|item| item.id.clone())
        .collect();
    let expected: Vec<String> = ids.iter().rev().take(20).cloned().collect();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn test_history_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(tmp.path().join("data")));

    let client = FakeClient::returning(result("Medium", "Grief after a loss"));
    let mut session = session_with(client.clone(), Arc::clone(&store));
    session.submit(&transcript(120)).await.unwrap();
    assert!(session.rate_current(5));
    let recorded = session.current_item().unwrap().clone();

    let reopened = session_with(client, Arc::new(FileStore::new(tmp.path().join("data"))));
    let restored = reopened.history().get(&recorded.id).unwrap();
    assert_eq!(restored.timestamp, recorded.timestamp);
    assert_eq!(restored.summary, recorded.summary);
    assert_eq!(restored.user_rating, 5);
    assert_eq!(restored.data, recorded.data);
}

#[tokio::test]
async fn test_corrupt_history_hydrates_empty() {
    let tmp = TempDir::new().unwrap();
    let store = FileStore::new(tmp.path());
    store.set(HISTORY_KEY, "[{\"id\": 12, ").unwrap();

    let client = FakeClient::returning(result("Low", "fine"));
    let mut session = session_with(client, Arc::new(store));
    assert!(session.history().is_empty());

    // The next record overwrites the corrupt snapshot.
    session.submit(&transcript(60)).await.unwrap();
    let raw = std::fs::read_to_string(tmp.path().join(HISTORY_KEY)).unwrap();
    let items: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(items.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_persist_failure_keeps_result_in_memory() {
    let store = Arc::new(MemoryStore::new());
    store.fail_writes(true);

    let client = FakeClient::returning(result("Low", "fine"));
    let mut session = session_with(client, store.clone());
    session.submit(&transcript(60)).await.unwrap();

    assert_eq!(session.status(), SessionStatus::Success);
    assert_eq!(session.history().len(), 1);
    assert_eq!(store.get(HISTORY_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_rate_current_targets_displayed_item() {
    let client = FakeClient::returning(result("Low", "fine"));
    let mut session = session_with(client, Arc::new(MemoryStore::new()));

    session.submit(&transcript(60)).await.unwrap();
    let older = session.current_item_id().unwrap().to_string();
    session.reset();
    assert!(!session.rate_current(3));

    session.submit(&transcript(60)).await.unwrap();
    session.reset();

    assert!(session.open_history_item(&older));
    assert_eq!(session.status(), SessionStatus::Success);
    assert!(session.rate_current(3));

    let items = session.history().load(None);
    assert_eq!(items[0].user_rating, 0);
    assert_eq!(items[1].id, older);
    assert_eq!(items[1].user_rating, 3);

    assert!(!session.open_history_item("missing"));
}

// ─── Compare ────────────────────────────────────────────────────────

async fn session_with_two_items() -> (Session, String, String) {
    let client = FakeClient::returning(result("Medium", "fine"));
    let mut session = session_with(client, Arc::new(MemoryStore::new()));
    session.submit(&transcript(60)).await.unwrap();
    let a = session.current_item_id().unwrap().to_string();
    session.reset();
    session.submit(&transcript(60)).await.unwrap();
    let b = session.current_item_id().unwrap().to_string();
    (session, a, b)
}

#[tokio::test]
async fn test_toggle_twice_restores_selection() {
    let (mut session, a, b) = session_with_two_items().await;

    assert_eq!(session.toggle_compare(&a), Some(ToggleOutcome::Added));
    assert!(session.view().can_compare);
    assert_eq!(session.toggle_compare(&a), Some(ToggleOutcome::Removed));
    assert!(session.compare().is_empty());
    assert!(!session.start_comparison());

    assert_eq!(session.toggle_compare(&a), Some(ToggleOutcome::Added));
    assert!(!session.start_comparison());
    assert_eq!(session.toggle_compare(&b), Some(ToggleOutcome::Added));
    assert_eq!(session.toggle_compare("missing"), None);
    assert_eq!(session.compare().ids(), vec![a, b]);
}

#[tokio::test]
async fn test_third_item_is_refused_when_full() {
    let (mut session, a, b) = session_with_two_items().await;
    session.reset();
    session.submit(&transcript(60)).await.unwrap();
    let c = session.current_item_id().unwrap().to_string();

    session.toggle_compare(&a);
    session.toggle_compare(&b);
    assert_eq!(session.toggle_compare(&c), Some(ToggleOutcome::Full));
    assert_eq!(session.compare().ids(), vec![a, b]);
}

#[tokio::test]
async fn test_back_keeps_selection() {
    let (mut session, a, b) = session_with_two_items().await;
    session.toggle_compare(&a);
    session.toggle_compare(&b);

    assert!(session.start_comparison());
    assert_eq!(session.status(), SessionStatus::Comparing);
    assert!(session.data().is_none());
    let summary = session.comparison().unwrap();
    assert_eq!(summary.a.id, a);
    assert_eq!(summary.shared_defenses, vec!["Projection".to_string()]);

    assert!(session.back());
    assert_eq!(session.status(), SessionStatus::Success);
    assert!(session.comparison().is_none());
    assert_eq!(session.compare().len(), 2);
    assert!(!session.back());

    assert!(session.start_comparison());
}

#[tokio::test]
async fn test_full_scenario() {
    let client = FakeClient::returning(result("Medium", "Avoidant coping under stress"));
    let mut session = session_with(client.clone(), Arc::new(MemoryStore::new()));

    let err = session.submit("short").await.unwrap_err();
    assert_eq!(err.code(), "too-short");
    assert_eq!(client.calls(), 0);

    session.submit(&transcript(200)).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Success);
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.data().unwrap().risk_level, RiskLevel::Medium);
    let first = session.current_item_id().unwrap().to_string();

    session.reset();
    session.submit(&transcript(200)).await.unwrap();
    let second = session.current_item_id().unwrap().to_string();

    session.toggle_compare(&first);
    session.toggle_compare(&second);
    assert!(session.view().can_start_comparison);
    assert!(session.start_comparison());
    assert_eq!(session.status(), SessionStatus::Comparing);
    assert!(!session.view().show_input);

    session.reset();
    assert_reset_state(&session);
    assert!(session.view().compare_ids.is_empty());
}
