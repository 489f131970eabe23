//! Streaming and non-streaming chat completion client.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use voice_agent_config::ClientsConfig;
use voice_agent_core::{CancelSignal, LlmClient, Message, Role};

use crate::http::OPENAI_BASE_URL;

const COMPLETE_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn wire_messages(messages: &[Message]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage { role: role_str(m.role), content: &m.content })
        .collect()
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageContent>,
    delta: Option<ChatMessageContent>,
}

#[derive(Deserialize)]
struct ChatMessageContent {
    content: Option<String>,
}

pub struct OpenAiLlmClient {
    http: reqwest::Client,
    config: ClientsConfig,
}

impl OpenAiLlmClient {
    pub fn new(http: reqwest::Client, config: ClientsConfig) -> Self {
        if !config.enabled() {
            tracing::warn!("OPENAI_API_KEY not set — LLM disabled, calls will return no result");
        }
        Self { http, config }
    }
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Option<String> {
        let api_key = self.config.openai_api_key.as_deref()?;

        let body = ChatRequest {
            model,
            messages: wire_messages(messages),
            max_tokens,
            temperature,
            stream: false,
        };

        let request = self
            .http
            .post(format!("{OPENAI_BASE_URL}/chat/completions"))
            .bearer_auth(api_key)
            .json(&body)
            .send();

        let resp = match tokio::time::timeout(COMPLETE_TIMEOUT, request).await {
            Ok(Ok(resp)) if resp.status().is_success() => resp,
            Ok(Ok(resp)) => {
                tracing::warn!(status = %resp.status(), "LLM completion failed");
                return None;
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "LLM completion transport error");
                return None;
            }
            Err(_) => {
                tracing::warn!("LLM completion timed out after 8s");
                return None;
            }
        };

        let parsed: ChatResponse = resp.json().await.ok()?;
        let content = parsed.choices.into_iter().next()?.message?.content?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    async fn stream_tokens(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f32,
        cancel: CancelSignal,
        tx: mpsc::Sender<String>,
    ) {
        let Some(api_key) = self.config.openai_api_key.clone() else {
            return;
        };

        let body = ChatRequest {
            model,
            messages: wire_messages(messages),
            max_tokens,
            temperature,
            stream: true,
        };

        let response = match self
            .http
            .post(format!("{OPENAI_BASE_URL}/chat/completions"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "LLM stream failed to start");
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "LLM stream transport error");
                return;
            }
        };

        let mut byte_stream = response.bytes_stream();
        let mut line_buf = String::new();

        while let Some(chunk) = byte_stream.next().await {
            if cancel.is_set() {
                return;
            }
            let Ok(bytes) = chunk else { return };
            line_buf.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline_pos) = line_buf.find('\n') {
                let line = line_buf[..newline_pos].trim().to_string();
                line_buf.drain(..=newline_pos);

                let Some(payload) = line.strip_prefix("data: ") else { continue };
                if payload == "[DONE]" {
                    return;
                }
                let Ok(event) = serde_json::from_str::<ChatResponse>(payload) else { continue };
                let Some(choice) = event.choices.into_iter().next() else { continue };
                let Some(delta) = choice.delta.and_then(|d| d.content) else { continue };
                if delta.is_empty() {
                    continue;
                }
                if cancel.is_set() {
                    return;
                }
                if tx.send(delta).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_client_complete_returns_none() {
        let client = OpenAiLlmClient::new(reqwest::Client::new(), ClientsConfig::default());
        let messages = vec![Message::user("hello")];
        assert!(client.complete(&messages, "gpt-4o-mini", 10, 0.0).await.is_none());
    }

    #[tokio::test]
    async fn disabled_client_stream_sends_nothing() {
        let client = OpenAiLlmClient::new(reqwest::Client::new(), ClientsConfig::default());
        let (tx, mut rx) = mpsc::channel(8);
        client
            .stream_tokens(&[Message::user("hi")], "gpt-4o-mini", 10, 0.0, CancelSignal::new(), tx)
            .await;
        assert!(rx.recv().await.is_none());
    }
}
