//! Remote content-moderation client (the second pass of the guardrail
//! filter; the first, local blocklist pass lives in
//! `voice-agent-agent::guardrail`). 2s hard timeout, fail-open.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use voice_agent_config::ClientsConfig;
use voice_agent_core::{ModerationClient, ModerationResult};

use crate::http::OPENAI_BASE_URL;

const MODERATION_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResultWire>,
}

#[derive(Deserialize)]
struct ModerationResultWire {
    flagged: bool,
    categories: std::collections::HashMap<String, bool>,
    category_scores: std::collections::HashMap<String, f32>,
}

pub struct OpenAiModerationClient {
    http: reqwest::Client,
    config: ClientsConfig,
}

impl OpenAiModerationClient {
    pub fn new(http: reqwest::Client, config: ClientsConfig) -> Self {
        if !config.enabled() {
            tracing::warn!("OPENAI_API_KEY not set — remote moderation disabled, check() allows everything");
        }
        Self { http, config }
    }
}

#[async_trait]
impl ModerationClient for OpenAiModerationClient {
    async fn check(&self, text: &str) -> ModerationResult {
        let Some(api_key) = self.config.openai_api_key.as_deref() else {
            return ModerationResult::allow();
        };
        if text.trim().is_empty() {
            return ModerationResult::allow();
        }

        let body = ModerationRequest { input: text };
        let request = self
            .http
            .post(format!("{OPENAI_BASE_URL}/moderations"))
            .bearer_auth(api_key)
            .json(&body)
            .send();

        let resp = match tokio::time::timeout(MODERATION_TIMEOUT, request).await {
            Ok(Ok(resp)) if resp.status().is_success() => resp,
            Ok(Ok(resp)) => {
                tracing::warn!(status = %resp.status(), "moderation request failed, failing open");
                return ModerationResult::allow();
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "moderation transport error, failing open");
                return ModerationResult::allow();
            }
            Err(_) => {
                tracing::warn!("moderation timed out after 2s, failing open");
                return ModerationResult::allow();
            }
        };

        let parsed: ModerationResponse = match resp.json().await {
            Ok(p) => p,
            Err(_) => return ModerationResult::allow(),
        };

        let Some(result) = parsed.results.into_iter().next() else {
            return ModerationResult::allow();
        };
        if !result.flagged {
            return ModerationResult::allow();
        }

        let flagged_categories: Vec<&String> =
            result.categories.iter().filter(|(_, &v)| v).map(|(k, _)| k).collect();
        let top = flagged_categories
            .iter()
            .max_by(|a, b| {
                let sa = result.category_scores.get(**a).copied().unwrap_or(0.0);
                let sb = result.category_scores.get(**b).copied().unwrap_or(0.0);
                sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let confidence = result.category_scores.get(&top).copied().unwrap_or(0.0);

        ModerationResult {
            ok: false,
            category: Some(top.clone()),
            confidence,
            reason: Some(format!(
                "moderation flagged: {}",
                flagged_categories.into_iter().cloned().collect::<Vec<_>>().join(", ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// P8: with no upstream configured, check() returns ok=true deterministically.
    #[tokio::test]
    async fn disabled_client_fails_open() {
        let client = OpenAiModerationClient::new(reqwest::Client::new(), ClientsConfig::default());
        let result = client.check("anything at all").await;
        assert!(result.ok);
    }
}
