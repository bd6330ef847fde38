use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::AnalysisClient;
use crate::models::AnalysisResult;

/// Ordered composition of clients: the first success wins.
///
/// When every client fails, the error lists each failure in order so the
/// user sees why the whole chain came up empty.
pub struct FallbackChain {
    clients: Vec<Arc<dyn AnalysisClient>>,
    name: String,
}

impl FallbackChain {
    pub fn new(clients: Vec<Arc<dyn AnalysisClient>>) -> Result<Self> {
        if clients.is_empty() {
            bail!("Fallback chain needs at least one client");
        }
        let name = clients
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(" → ");
        Ok(Self { clients, name })
    }
}

#[async_trait]
impl AnalysisClient for FallbackChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, transcript: &str) -> Result<AnalysisResult> {
        let mut failures = Vec::new();

        for client in &self.clients {
            match client.analyze(transcript).await {
                Ok(result) => {
                    if !failures.is_empty() {
                        tracing::info!(
                            provider = client.name(),
                            skipped = failures.len(),
                            "analysis served by fallback provider"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    tracing::warn!(provider = client.name(), error = %e, "analysis provider failed");
                    failures.push(format!("{}: {}", client.name(), e));
                }
            }
        }

        bail!("All analysis providers failed. {}", failures.join("; "))
    }
}
