//! Analysis client abstraction and implementations.
//!
//! Defines the [`AnalysisClient`] trait and concrete implementations:
//! - **[`GeminiClient`]**: calls the Gemini `generateContent` API with a JSON
//!   response schema.
//! - **[`OllamaClient`]**: calls a local Ollama instance's `/api/generate`
//!   endpoint and extracts the JSON object from the generated text.
//! - **[`OfflineClient`]**: returns a canned demonstration result; no network.
//! - **[`FallbackChain`]**: tries a list of clients in order and returns the
//!   first success.
//!
//! Every client funnels the model output through [`parse_analysis`], which
//! checks the payload against the [`AnalysisResult`] shape. A payload that
//! does not fit is an error, never a silently half-filled result.
//!
//! # Client Selection
//!
//! Use [`create_client`] to build the chain named by
//! `analysis.providers` in the configuration:
//!
//! ```rust,no_run
//! # use psychoanalyze::config::Config;
//! # use psychoanalyze::analysis::create_client;
//! let config = Config::default(); // gemini → ollama → offline
//! let client = create_client(&config).unwrap();
//! assert_eq!(client.name(), "gemini → ollama → offline");
//! ```
//!
//! # Retry Strategy
//!
//! The Gemini and Ollama clients use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - 2xx whose body does not parse as an analysis → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

mod fallback;
mod gemini;
mod offline;
mod ollama;

pub use fallback::FallbackChain;
pub use gemini::GeminiClient;
pub use offline::OfflineClient;
pub use ollama::OllamaClient;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use crate::config::Config;
use crate::models::{AnalysisResult, TREND_SEGMENTS};

/// A collaborator that turns a transcript into a structured analysis.
///
/// The session hands over text that is already trimmed and within the
/// configured length bounds. Implementations report failures as errors
/// carrying a human-readable message; the session does not distinguish
/// between rate limits, bad payloads and network trouble.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Short label used in logs and error messages (e.g. `"ollama"`).
    fn name(&self) -> &str;

    /// Analyze one transcript.
    async fn analyze(&self, transcript: &str) -> Result<AnalysisResult>;
}

/// Build the client chain named by `analysis.providers`.
///
/// A single provider is returned as-is; several are wrapped in a
/// [`FallbackChain`] in the configured order.
///
/// # Errors
///
/// Returns an error for unknown provider names or an empty list. Missing
/// API keys are not checked here; the Gemini client fails at call time so
/// the rest of the chain can still run.
pub fn create_client(config: &Config) -> Result<Arc<dyn AnalysisClient>> {
    let analysis = &config.analysis;
    let mut clients: Vec<Arc<dyn AnalysisClient>> = Vec::with_capacity(analysis.providers.len());

    for provider in &analysis.providers {
        let client: Arc<dyn AnalysisClient> = match provider.as_str() {
            "gemini" => Arc::new(GeminiClient::new(analysis)?),
            "ollama" => Arc::new(OllamaClient::new(analysis)?),
            "offline" => Arc::new(OfflineClient::new()),
            other => bail!("Unknown analysis provider: {}", other),
        };
        clients.push(client);
    }

    tracing::debug!(providers = clients.len(), "analysis providers configured");
    match clients.len() {
        0 => bail!("analysis.providers must name at least one provider"),
        1 => Ok(clients.remove(0)),
        _ => Ok(Arc::new(FallbackChain::new(clients)?)),
    }
}

/// Parse model output into an [`AnalysisResult`].
///
/// Required fields (`summary`, `language`, `riskLevel`) must be present and
/// typed correctly; missing lists default to empty. Trend sequences that do
/// not have the expected segment count are accepted and logged.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult> {
    let result: AnalysisResult = serde_json::from_str(text.trim())
        .with_context(|| "Model response does not match the analysis schema")?;

    if result.summary.trim().is_empty() {
        bail!("Model response has an empty summary");
    }

    if result.emotion_trend.len() != TREND_SEGMENTS
        || result.sentiment_trend.len() != TREND_SEGMENTS
    {
        tracing::debug!(
            emotion = result.emotion_trend.len(),
            sentiment = result.sentiment_trend.len(),
            "trend length differs from expected segment count"
        );
    }

    Ok(result)
}

/// Slice out the outermost `{ ... }` of free-form model text.
///
/// Local models often wrap the JSON in prose or code fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Instructions sent ahead of the transcript.
pub fn build_instructions(report_language: &str) -> String {
    format!(
        "You are an expert psychologist and research assistant. Analyze the interview \
transcript below using psychoanalytic and psychodynamic approaches.\n\
\n\
IMPORTANT: write every text field in {lang}, regardless of the transcript language.\n\
\n\
1. Detect the transcript language (report it in `language`).\n\
2. Assess psychological risk (Low, Medium, High) from signs of depression, aggression or dissociation.\n\
3. Identify defense mechanisms (Vaillant's classification) with frequency High, Medium or Low.\n\
4. Estimate the attachment style (Bowlby/Ainsworth) with confidence 0-100 and indicators.\n\
5. List emotional triggers and responses with intensity 1-10.\n\
6. Extract key themes with relevance 0-100.\n\
7. Score sentiment for {n} segments (-1.0 negative to 1.0 positive).\n\
8. Score happiness, sadness, anger and anxiety (0-10) for the same {n} segments.\n\
9. Give therapy recommendations based on the profile.\n\
10. Select key quotes with a category and a short analysis.\n\
11. Write structured academic notes in Markdown.\n\
\n\
Respond with a single valid JSON object only.",
        lang = report_language,
        n = TREND_SEGMENTS,
    )
}

/// JSON shape description embedded in prompts for models without schema
/// support.
pub const RESPONSE_SHAPE: &str = r#"{
  "summary": "",
  "language": "",
  "riskLevel": "Low|Medium|High",
  "defenseMechanisms": [{"name": "", "description": "", "frequency": "High|Medium|Low", "exampleQuote": ""}],
  "attachmentProfile": {"style": "", "confidence": 0, "indicators": []},
  "emotionalTriggers": [{"trigger": "", "response": "", "intensity": 1}],
  "themes": [{"title": "", "description": "", "relevanceScore": 0}],
  "sentimentTrend": [{"segment": 1, "score": 0.0, "label": "Positive|Negative|Neutral"}],
  "emotionTrend": [{"segment": 1, "happiness": 0, "sadness": 0, "anger": 0, "anxiety": 0}],
  "therapyRecommendations": [],
  "keyQuotes": [{"text": "", "category": "", "analysis": ""}],
  "academicNotes": ""
}"#;

/// Retry and timeout settings shared by the HTTP clients.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &crate::config::AnalysisConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        }
    }
}

/// POST `body` to `url` and turn the reply into an [`AnalysisResult`] with
/// `parse`, retrying with exponential backoff.
///
/// A reply only counts as a success once it parses. Retry strategy:
/// - HTTP 429 or 5xx → retry
/// - HTTP 2xx whose body does not parse into an analysis → retry
/// - HTTP 4xx (not 429) → fail immediately
/// - Network error → retry
///
/// The last failure is returned once `policy.max_retries` is exhausted.
pub(crate) async fn request_analysis<F>(
    label: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
    policy: RetryPolicy,
    parse: F,
) -> Result<AnalysisResult>
where
    F: Fn(&serde_json::Value) -> Result<AnalysisResult>,
{
    let client = reqwest::Client::builder().timeout(policy.timeout).build()?;

    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(provider = label, attempt, ?delay, "retrying analysis request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                last_err = Some(anyhow!("{} connection error: {}", label, e));
                continue;
            }
        };

        let status = response.status();
        if status.is_success() {
            let parsed = match response.json::<serde_json::Value>().await {
                Ok(json) => parse(&json),
                Err(e) => Err(anyhow!("{} returned an unreadable body: {}", label, e)),
            };
            match parsed {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(provider = label, attempt, error = %e, "malformed analysis reply");
                    last_err = Some(e);
                    continue;
                }
            }
        }

        let reply = response.text().await.unwrap_or_default();
        let err = anyhow!("{} API error {}: {}", label, status, reply);
        if status.as_u16() == 429 || status.is_server_error() {
            last_err = Some(err);
            continue;
        }
        return Err(err);
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} analysis failed after retries", label)))
}
