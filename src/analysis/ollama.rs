use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    build_instructions, extract_json_object, parse_analysis, request_analysis, AnalysisClient,
    RetryPolicy, RESPONSE_SHAPE,
};
use crate::config::AnalysisConfig;
use crate::models::AnalysisResult;

/// Analysis client using a local Ollama instance.
///
/// Calls `POST /api/generate` on the configured Ollama URL (default:
/// `http://localhost:11434`) with streaming disabled. Requires Ollama to be
/// running with the model pulled (e.g. `ollama pull llama3.2`).
pub struct OllamaClient {
    model: String,
    url: String,
    report_language: String,
    policy: RetryPolicy,
}

impl OllamaClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        if config.ollama.model.trim().is_empty() {
            anyhow::bail!("analysis.ollama.model must not be empty");
        }
        Ok(Self {
            model: config.ollama.model.clone(),
            url: config.ollama.url.trim_end_matches('/').to_string(),
            report_language: config.report_language.clone(),
            policy: RetryPolicy::from_config(config),
        })
    }

    fn request_body(&self, transcript: &str) -> Value {
        let prompt = format!(
            "{}\n\nUse exactly this JSON format:\n{}\n\nTRANSCRIPT:\n{}",
            build_instructions(&self.report_language),
            RESPONSE_SHAPE,
            transcript
        );
        json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.3,
                "top_p": 0.9
            }
        })
    }
}

#[async_trait]
impl AnalysisClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn analyze(&self, transcript: &str) -> Result<AnalysisResult> {
        let body = self.request_body(transcript);
        let endpoint = format!("{}/api/generate", self.url);

        tracing::debug!(model = %self.model, url = %self.url, "sending transcript to ollama");
        request_analysis("Ollama", &endpoint, &[], &body, self.policy, parse_ollama_response)
            .await
            .with_context(|| format!("Ollama request failed (is Ollama running at {}?)", self.url))
    }
}

fn parse_ollama_response(json: &Value) -> Result<AnalysisResult> {
    let text = json
        .get("response")
        .and_then(|r| r.as_str())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing response text"))?;

    let object = extract_json_object(text)
        .ok_or_else(|| anyhow!("No JSON found in Ollama response"))?;

    parse_analysis(object)
}
