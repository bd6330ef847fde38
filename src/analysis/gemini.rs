use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{build_instructions, parse_analysis, request_analysis, AnalysisClient, RetryPolicy};
use crate::config::AnalysisConfig;
use crate::models::AnalysisResult;

/// Analysis client using the Gemini API.
///
/// Calls `POST {base_url}/v1beta/models/{model}:generateContent` with a
/// response schema so the model answers with JSON only. The API key is read
/// from the environment variable named by `analysis.gemini.api_key_env`
/// (default `GEMINI_API_KEY`) on every call, so a chain with Gemini first
/// still works offline when the key is missing.
pub struct GeminiClient {
    model: String,
    base_url: String,
    api_key_env: String,
    report_language: String,
    policy: RetryPolicy,
}

impl GeminiClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        if config.gemini.model.trim().is_empty() {
            anyhow::bail!("analysis.gemini.model must not be empty");
        }
        Ok(Self {
            model: config.gemini.model.clone(),
            base_url: config.gemini.base_url.trim_end_matches('/').to_string(),
            api_key_env: config.gemini.api_key_env.clone(),
            report_language: config.report_language.clone(),
            policy: RetryPolicy::from_config(config),
        })
    }

    fn request_body(&self, transcript: &str) -> Value {
        json!({
            "contents": [
                { "role": "user", "parts": [{ "text": build_instructions(&self.report_language) }] },
                { "role": "user", "parts": [{ "text": format!("TRANSCRIPT:\n\n{}", transcript) }] }
            ],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema()
            }
        })
    }
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn analyze(&self, transcript: &str) -> Result<AnalysisResult> {
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", self.api_key_env))?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = self.request_body(transcript);

        tracing::debug!(model = %self.model, chars = transcript.chars().count(), "sending transcript to gemini");
        request_analysis(
            "Gemini",
            &url,
            &[("x-goog-api-key", api_key.as_str())],
            &body,
            self.policy,
            |json| parse_analysis(candidate_text(json)?),
        )
        .await
    }
}

/// Extract `candidates[0].content.parts[0].text`.
fn candidate_text(json: &Value) -> Result<&str> {
    json.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| anyhow!("No response text from Gemini"))
}

fn string() -> Value {
    json!({ "type": "STRING" })
}

fn number(description: &str) -> Value {
    json!({ "type": "NUMBER", "description": description })
}

fn object(properties: Value) -> Value {
    json!({ "type": "OBJECT", "properties": properties })
}

fn array_of(items: Value) -> Value {
    json!({ "type": "ARRAY", "items": items })
}

/// Response schema mirroring [`AnalysisResult`].
fn response_schema() -> Value {
    let level = |values: &[&str]| json!({ "type": "STRING", "enum": values });

    json!({
        "type": "OBJECT",
        "required": ["summary", "language", "riskLevel"],
        "properties": {
            "summary": string(),
            "language": string(),
            "riskLevel": level(&["Low", "Medium", "High"]),
            "defenseMechanisms": array_of(object(json!({
                "name": string(),
                "description": string(),
                "frequency": level(&["High", "Medium", "Low"]),
                "exampleQuote": string()
            }))),
            "attachmentProfile": object(json!({
                "style": string(),
                "confidence": number("0 to 100"),
                "indicators": array_of(string())
            })),
            "emotionalTriggers": array_of(object(json!({
                "trigger": string(),
                "response": string(),
                "intensity": number("1 to 10")
            }))),
            "themes": array_of(object(json!({
                "title": string(),
                "description": string(),
                "relevanceScore": number("0 to 100")
            }))),
            "sentimentTrend": array_of(object(json!({
                "segment": { "type": "INTEGER" },
                "score": number("-1.0 to 1.0"),
                "label": string()
            }))),
            "emotionTrend": array_of(object(json!({
                "segment": { "type": "INTEGER" },
                "happiness": number("0 to 10"),
                "sadness": number("0 to 10"),
                "anger": number("0 to 10"),
                "anxiety": number("0 to 10")
            }))),
            "therapyRecommendations": array_of(string()),
            "keyQuotes": array_of(object(json!({
                "text": string(),
                "category": string(),
                "analysis": string()
            }))),
            "academicNotes": string()
        }
    })
}
