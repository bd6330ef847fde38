//! Loading progress for an in-flight analysis.
//!
//! The analysis call reports nothing while it runs, so the progress shown
//! to the user is synthetic: [`next_progress`] approaches 90 with shrinking
//! steps and holds there until the call resolves. Only the session jumps it
//! to 100, on success.
//!
//! [`ProgressTicker`] drives the estimate from a tokio interval task and
//! publishes it on a `watch` channel. Dropping the ticker aborts the task,
//! so no tick can land after the session has left `loading`.
//!
//! Reporters render the published value on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Ceiling the synthetic estimate never passes while loading.
pub const LOADING_CEILING: f64 = 90.0;

/// Smallest step taken per tick below the ceiling.
pub const MIN_STEP: f64 = 0.5;

/// One tick of the loading estimate.
pub fn next_progress(prev: f64) -> f64 {
    if prev >= LOADING_CEILING {
        return prev;
    }
    let step = ((LOADING_CEILING - prev) / 20.0).max(MIN_STEP);
    (prev + step).min(LOADING_CEILING)
}

/// Periodic task advancing the estimate on a `watch` channel.
///
/// Aborting the task only requests cancellation; a tick already running on
/// another worker could still land. Each tick therefore checks `active`
/// while holding the channel lock, and `Drop` clears it before returning,
/// so any write made after the ticker is gone wins over the tick.
pub struct ProgressTicker {
    handle: JoinHandle<()>,
    active: Arc<AtomicBool>,
}

impl ProgressTicker {
    /// Reset `tx` to 0 and start ticking every `period`.
    pub fn start(tx: Arc<watch::Sender<f64>>, period: Duration) -> Self {
        tx.send_replace(0.0);
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let advanced = tx.send_if_modified(|p| {
                    if !flag.load(Ordering::SeqCst) {
                        return false;
                    }
                    *p = next_progress(*p);
                    true
                });
                if !advanced {
                    break;
                }
            }
        });
        Self { handle, active }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.handle.abort();
    }
}

/// Renders progress values. Implementations write to stderr.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: f64);

    /// Called once when the analysis resolves.
    fn finish(&self) {}
}

/// Human-friendly bar on stderr: `analyzing  [#########           ]  45%`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, progress: f64) {
        let line = format!("\ranalyzing  [{}]  {:>3.0}%", render_bar(progress, 20), progress);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }

    fn finish(&self) {
        let _ = writeln!(std::io::stderr().lock());
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, progress: f64) {
        let obj = serde_json::json!({
            "event": "progress",
            "phase": "analyzing",
            "progress": (progress * 10.0).round() / 10.0,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _progress: f64) {}
}

fn render_bar(progress: f64, width: usize) -> String {
    let filled = ((progress.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), " ".repeat(width - filled))
}

/// Forward every value published on `rx` to `reporter` until the sender
/// is dropped. Callers usually race this against the analysis itself.
pub async fn forward_progress(mut rx: watch::Receiver<f64>, reporter: &dyn ProgressReporter) {
    while rx.changed().await.is_ok() {
        let value = *rx.borrow_and_update();
        reporter.report(value);
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
