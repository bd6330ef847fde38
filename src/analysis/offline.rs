use anyhow::Result;
use async_trait::async_trait;

use super::AnalysisClient;
use crate::models::{
    AnalysisResult, AttachmentProfile, DefenseMechanism, EmotionPoint, EmotionalTrigger,
    Frequency, Quote, RiskLevel, SentimentPoint, Theme, TREND_SEGMENTS,
};

/// Canned analysis used when no model is reachable.
///
/// The result is a fixed demonstration profile, labelled as such in the
/// summary and notes. Only the detected language and the word count come
/// from the transcript.
#[derive(Debug, Default)]
pub struct OfflineClient;

impl OfflineClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AnalysisClient for OfflineClient {
    fn name(&self) -> &str {
        "offline"
    }

    async fn analyze(&self, transcript: &str) -> Result<AnalysisResult> {
        Ok(demo_result(transcript))
    }
}

fn guess_language(text: &str) -> &'static str {
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let cyrillic = text
        .chars()
        .filter(|c| ('\u{0400}'..='\u{04FF}').contains(c))
        .count();
    if letters > 0 && cyrillic * 2 > letters {
        "Russian"
    } else {
        "English"
    }
}

fn demo_result(transcript: &str) -> AnalysisResult {
    let words = transcript.split_whitespace().count();

    let sentiment_trend = (1..=TREND_SEGMENTS as u32)
        .map(|segment| {
            let score = -0.4 + 0.08 * f64::from(segment);
            SentimentPoint {
                segment,
                score,
                label: if score < -0.1 {
                    "Negative"
                } else if score > 0.1 {
                    "Positive"
                } else {
                    "Neutral"
                }
                .to_string(),
            }
        })
        .collect();

    let emotion_trend = (1..=TREND_SEGMENTS as u32)
        .map(|segment| {
            let t = f64::from(segment);
            EmotionPoint {
                segment,
                happiness: 2.0 + 0.4 * t,
                sadness: 6.0 - 0.3 * t,
                anger: 2.0,
                anxiety: 7.0 - 0.4 * t,
            }
        })
        .collect();

    AnalysisResult {
        summary: format!(
            "Offline demonstration profile for a transcript of {} words; no language model was reached.",
            words
        ),
        language: guess_language(transcript).to_string(),
        risk_level: RiskLevel::Low,
        defense_mechanisms: vec![DefenseMechanism {
            name: "Intellectualization".to_string(),
            description: "Placeholder entry produced without model inference.".to_string(),
            frequency: Frequency::Medium,
            example_quote: String::new(),
        }],
        attachment_profile: AttachmentProfile {
            style: "Undetermined".to_string(),
            confidence: 0.0,
            indicators: vec![],
        },
        emotional_triggers: vec![EmotionalTrigger {
            trigger: "Not assessed offline".to_string(),
            response: String::new(),
            intensity: 1.0,
        }],
        themes: vec![Theme {
            title: "Offline mode".to_string(),
            description: "Configure a Gemini API key or start Ollama for a real analysis."
                .to_string(),
            relevance_score: 0.0,
        }],
        sentiment_trend,
        emotion_trend,
        therapy_recommendations: vec![
            "Re-run the analysis once a language model is available.".to_string(),
        ],
        key_quotes: vec![Quote {
            text: transcript.chars().take(120).collect(),
            category: "Opening".to_string(),
            analysis: "First lines of the transcript, quoted verbatim.".to_string(),
        }],
        academic_notes: "_This report was generated offline and contains no clinical inference._"
            .to_string(),
    }
}
