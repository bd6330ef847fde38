//! Core data models used throughout PsychoAnalyze.
//!
//! These types represent the structured analysis returned by an
//! [`AnalysisClient`](crate::analysis::AnalysisClient) and the history
//! entries that wrap it. Field names are camelCase on the wire and in the
//! persisted history, matching the JSON the language models are asked for.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Number of characters of the result summary kept in a [`HistoryItem`].
pub const SUMMARY_PREVIEW_CHARS: usize = 100;

/// Number of transcript segments the trend sequences are expected to cover.
///
/// Providers are asked for this many points; nothing downstream enforces it.
pub const TREND_SEGMENTS: usize = 10;

/// Overall psychological risk assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// How often a defense mechanism shows up in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Low => write!(f, "Low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefenseMechanism {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub frequency: Frequency,
    #[serde(default)]
    pub example_quote: String,
}

/// Attachment style estimate (Bowlby/Ainsworth).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentProfile {
    #[serde(default)]
    pub style: String,
    /// Confidence in the style label, 0–100.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalTrigger {
    pub trigger: String,
    #[serde(default)]
    pub response: String,
    /// 1–10.
    #[serde(default)]
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// 0–100.
    #[serde(default)]
    pub relevance_score: f64,
}

/// Sentiment of one transcript segment, score in −1.0..=1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentPoint {
    pub segment: u32,
    pub score: f64,
    #[serde(default)]
    pub label: String,
}

/// Four emotion channels for one transcript segment, each 0–10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionPoint {
    pub segment: u32,
    #[serde(default)]
    pub happiness: f64,
    #[serde(default)]
    pub sadness: f64,
    #[serde(default)]
    pub anger: f64,
    #[serde(default)]
    pub anxiety: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub text: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub analysis: String,
}

/// Structured analysis of one transcript.
///
/// `summary`, `language` and `riskLevel` are required; every list defaults
/// to empty when the provider omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub language: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub defense_mechanisms: Vec<DefenseMechanism>,
    #[serde(default)]
    pub attachment_profile: AttachmentProfile,
    #[serde(default)]
    pub emotional_triggers: Vec<EmotionalTrigger>,
    #[serde(default)]
    pub themes: Vec<Theme>,
    #[serde(default)]
    pub sentiment_trend: Vec<SentimentPoint>,
    #[serde(default)]
    pub emotion_trend: Vec<EmotionPoint>,
    #[serde(default)]
    pub therapy_recommendations: Vec<String>,
    #[serde(default)]
    pub key_quotes: Vec<Quote>,
    #[serde(default)]
    pub academic_notes: String,
}

/// A recorded analysis in the local history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    /// UUID v4, assigned once at creation.
    pub id: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Truncated display summary, see [`preview_summary`].
    pub summary: String,
    pub data: AnalysisResult,
    #[serde(default)]
    pub user_rating: i32,
}

impl HistoryItem {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Build the display summary stored on a [`HistoryItem`]: the first
/// [`SUMMARY_PREVIEW_CHARS`] characters followed by `...`.
pub fn preview_summary(summary: &str) -> String {
    let mut preview: String = summary.chars().take(SUMMARY_PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}
