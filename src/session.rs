//! Analysis session state machine.
//!
//! A [`Session`] owns the [`HistoryStore`] and the [`CompareSelector`] and
//! moves between five states:
//!
//! ```text
//!            submit (valid)            client ok
//!   idle ─────────────────▶ loading ──────────────▶ success
//!    ▲  │                      │                     │  ▲
//!    │  │ submit (invalid)     │ client error        │  │ back
//!    │  ▼                      ▼                     ▼  │
//!    │ error ◀─────────────────┘        start_comparison │
//!    │   │  submit (valid) → loading                  comparing
//!    └───┴──────────── reset (from any state) ◀──────────┘
//! ```
//!
//! Input is validated before the client is called; an invalid transcript
//! never leaves the process. Only one analysis runs at a time: `submit`
//! takes `&mut self` and refuses to start while a previous submission is
//! still marked `loading` (which happens when its future was dropped).
//!
//! While loading, a [`ProgressTicker`] publishes a synthetic estimate. It is
//! owned by the `submit` future, so leaving `loading` on any path, including
//! cancellation, stops it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::analysis::AnalysisClient;
use crate::compare::{CompareSelector, ComparisonSummary, ToggleOutcome};
use crate::config::{Config, SessionConfig};
use crate::error::SessionError;
use crate::history::HistoryStore;
use crate::models::{AnalysisResult, HistoryItem};
use crate::progress::ProgressTicker;
use crate::storage::KeyValueStore;

/// Progress reported once an analysis has succeeded.
pub const PROGRESS_DONE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Loading,
    Success,
    Error,
    Comparing,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
            Self::Comparing => "comparing",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transcript length bounds and progress cadence.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub min_chars: usize,
    pub max_chars: usize,
    pub progress_tick: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionLimits {
    fn from(config: &SessionConfig) -> Self {
        Self {
            min_chars: config.min_chars,
            max_chars: config.max_chars,
            progress_tick: Duration::from_millis(config.progress_tick_ms),
        }
    }
}

/// Check a raw transcript against the length bounds and return the
/// trimmed text that would be sent to the client.
///
/// Lengths are counted in characters, not bytes.
pub fn validate_transcript<'a>(
    text: &'a str,
    limits: &SessionLimits,
) -> Result<&'a str, SessionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SessionError::EmptyInput);
    }
    let len = trimmed.chars().count();
    if len < limits.min_chars {
        return Err(SessionError::TooShort {
            len,
            min: limits.min_chars,
        });
    }
    if len > limits.max_chars {
        return Err(SessionError::TooLong {
            len,
            max: limits.max_chars,
        });
    }
    Ok(trimmed)
}

/// Read-only projection of the session for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub status: SessionStatus,
    pub progress: f64,
    pub error_code: Option<&'static str>,
    pub error_message: Option<String>,
    pub current_item_id: Option<String>,
    pub compare_ids: Vec<String>,
    /// The transcript input is shown in idle, loading and error.
    pub show_input: bool,
    /// Something is selected and the comparison view is not open yet.
    pub can_compare: bool,
    pub can_start_comparison: bool,
    pub is_loading: bool,
}

pub struct Session {
    client: Arc<dyn AnalysisClient>,
    history: HistoryStore,
    compare: CompareSelector,
    limits: SessionLimits,
    status: SessionStatus,
    data: Option<AnalysisResult>,
    current_item_id: Option<String>,
    error: Option<SessionError>,
    progress: Arc<watch::Sender<f64>>,
}

impl Session {
    pub fn new(client: Arc<dyn AnalysisClient>, history: HistoryStore, limits: SessionLimits) -> Self {
        let (tx, _rx) = watch::channel(0.0);
        Self {
            client,
            history,
            compare: CompareSelector::new(),
            limits,
            status: SessionStatus::Idle,
            data: None,
            current_item_id: None,
            error: None,
            progress: Arc::new(tx),
        }
    }

    /// Build a session from configuration, hydrating history from `store`.
    pub fn from_config(
        config: &Config,
        client: Arc<dyn AnalysisClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let history = HistoryStore::open(store, config.session.history_capacity);
        Self::new(client, history, SessionLimits::from(&config.session))
    }

    /// Validate `text` and run it through the analysis client.
    ///
    /// Allowed from `idle` and `error`. Validation failures and client
    /// failures put the session in `error` and are returned. `Busy` and
    /// `InvalidTransition` are returned without touching the state.
    pub async fn submit(&mut self, text: &str) -> Result<&AnalysisResult, SessionError> {
        match self.status {
            SessionStatus::Idle | SessionStatus::Error => {}
            SessionStatus::Loading => return Err(SessionError::Busy),
            status => {
                return Err(SessionError::InvalidTransition {
                    action: "submit",
                    status: status.as_str(),
                })
            }
        }

        let transcript = match validate_transcript(text, &self.limits) {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::debug!(code = e.code(), "transcript rejected before analysis");
                self.fail(e.clone());
                return Err(e);
            }
        };

        self.error = None;
        self.data = None;
        self.current_item_id = None;
        self.status = SessionStatus::Loading;

        let client = Arc::clone(&self.client);
        tracing::info!(
            provider = client.name(),
            chars = transcript.chars().count(),
            "analysis started"
        );

        let ticker = ProgressTicker::start(Arc::clone(&self.progress), self.limits.progress_tick);
        let outcome = client.analyze(transcript).await;
        drop(ticker);

        match outcome {
            Ok(result) => {
                let item = self.history.record(result.clone());
                self.current_item_id = Some(item.id);
                self.status = SessionStatus::Success;
                self.progress.send_replace(PROGRESS_DONE);
                tracing::info!(risk = %result.risk_level, "analysis finished");
                Ok(&*self.data.insert(result))
            }
            Err(e) => {
                tracing::warn!(error = %e, "analysis failed");
                let err = SessionError::analysis_failed(format!("{:#}", e));
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    fn fail(&mut self, error: SessionError) {
        self.status = SessionStatus::Error;
        self.error = Some(error);
        self.data = None;
        self.current_item_id = None;
        self.progress.send_replace(0.0);
    }

    /// Return to `idle`: drop the displayed result and the error, clear the
    /// compare selection, zero the progress.
    ///
    /// Valid from every state. A session left in `loading` by a dropped
    /// `submit` future is recovered this way.
    pub fn reset(&mut self) {
        self.status = SessionStatus::Idle;
        self.data = None;
        self.current_item_id = None;
        self.error = None;
        self.compare.clear();
        self.progress.send_replace(0.0);
    }

    /// Display a stored history item. Unknown ids and calls while loading
    /// are ignored.
    pub fn open_history_item(&mut self, id: &str) -> bool {
        if self.status == SessionStatus::Loading {
            return false;
        }
        let Some(item) = self.history.get(id) else {
            return false;
        };
        self.data = Some(item.data.clone());
        self.current_item_id = Some(item.id.clone());
        self.error = None;
        self.status = SessionStatus::Success;
        self.progress.send_replace(PROGRESS_DONE);
        true
    }

    /// Toggle a history item in the compare selection.
    ///
    /// Returns `None` when no history item has this id.
    pub fn toggle_compare(&mut self, id: &str) -> Option<ToggleOutcome> {
        let item = self.history.get(id)?;
        let outcome = self.compare.toggle(item);
        if outcome == ToggleOutcome::Full {
            tracing::debug!(id, "compare selection full");
        }
        Some(outcome)
    }

    /// Enter `comparing` when exactly two items are selected.
    ///
    /// The displayed single result is cleared; history and selection stay.
    /// Has no effect (returns `false`) with fewer than two selections or
    /// while loading.
    pub fn start_comparison(&mut self) -> bool {
        if self.status == SessionStatus::Loading || !self.compare.can_start_comparison() {
            return false;
        }
        self.status = SessionStatus::Comparing;
        self.data = None;
        self.current_item_id = None;
        self.error = None;
        self.progress.send_replace(0.0);
        true
    }

    /// Leave the comparison view. No result is restored and the selection
    /// is kept, so the comparison can be reopened without reselecting.
    pub fn back(&mut self) -> bool {
        if self.status != SessionStatus::Comparing {
            return false;
        }
        self.status = SessionStatus::Success;
        self.progress.send_replace(PROGRESS_DONE);
        true
    }

    /// Rate the history item currently displayed. No-op when the session
    /// is not showing a recorded result.
    pub fn rate_current(&mut self, rating: i32) -> bool {
        match self.current_item_id.clone() {
            Some(id) => self.history.rate(&id, rating),
            None => false,
        }
    }

    pub fn rate(&mut self, id: &str, rating: i32) -> bool {
        self.history.rate(id, rating)
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// The displayed result; present only in `success`.
    pub fn data(&self) -> Option<&AnalysisResult> {
        self.data.as_ref()
    }

    /// The held error; present only in `error`.
    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    /// Receive every progress update, e.g. to drive a progress bar.
    pub fn subscribe_progress(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    pub fn current_item_id(&self) -> Option<&str> {
        self.current_item_id.as_deref()
    }

    pub fn current_item(&self) -> Option<&HistoryItem> {
        self.current_item_id
            .as_deref()
            .and_then(|id| self.history.get(id))
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn compare(&self) -> &CompareSelector {
        &self.compare
    }

    /// Side-by-side summary of the selection, while `comparing`.
    pub fn comparison(&self) -> Option<ComparisonSummary> {
        if self.status != SessionStatus::Comparing {
            return None;
        }
        ComparisonSummary::from_selection(&self.compare)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            status: self.status,
            progress: self.progress(),
            error_code: self.error.as_ref().map(|e| e.code()),
            error_message: self.error.as_ref().map(|e| e.to_string()),
            current_item_id: self.current_item_id.clone(),
            compare_ids: self.compare.ids(),
            show_input: matches!(
                self.status,
                SessionStatus::Idle | SessionStatus::Loading | SessionStatus::Error
            ),
            can_compare: !self.compare.is_empty() && self.status != SessionStatus::Comparing,
            can_start_comparison: self.compare.can_start_comparison(),
            is_loading: self.status == SessionStatus::Loading,
        }
    }
}
