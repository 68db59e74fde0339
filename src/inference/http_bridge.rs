//! OpenAI-compatible HTTP inference bridge.
//!
//! Implements the callback-style [`InferenceBridge`] against a local model
//! server (llama.cpp server, Ollama). Each `inference` call streams a chat
//! completion and reports every content token through the callback.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client as HttpClient;

use super::bridge::{BridgeCallback, InferenceBridge};
use super::errors::InferenceError;
use super::streaming::parse_sse_stream;
use super::types::{ChatCompletionRequest, ChatMessage, Role};
use crate::config::InferenceConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout for streaming calls.
///
/// Local models can take a long time before the first token on large prompts.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// ─── HttpInferenceBridge ─────────────────────────────────────────────────────

/// Streams completions from an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct HttpInferenceBridge {
    http: HttpClient,
    config: InferenceConfig,
}

impl HttpInferenceBridge {
    /// Build the bridge. Does NOT check connectivity; see [`health_check`](Self::health_check).
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(STREAM_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Check if the model endpoint is reachable.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        match self.http.get(&url).timeout(CONNECT_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Stream one completion, reporting tokens through `callback`.
    async fn stream_completion(&self, prompt: String, callback: &mut BridgeCallback) -> Result<(), InferenceError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        tracing::info!(
            url = %url,
            model = %body.model,
            prompt_chars = body.messages[0].content.len(),
            max_tokens = body.max_tokens,
            "local inference request"
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let mut chunks = Box::pin(parse_sse_stream(response.bytes_stream()));
        let mut token_count = 0usize;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if let Some(token) = chunk.token {
                token_count += 1;
                callback(None, Some(token), false);
            }
        }

        tracing::debug!(tokens = token_count, "local inference stream complete");
        Ok(())
    }
}

impl InferenceBridge for HttpInferenceBridge {
    fn inference(&self, prompt: String, mut callback: BridgeCallback) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                callback(Some(format!("no async runtime available: {e}")), None, true);
                return;
            }
        };

        let bridge = self.clone();
        handle.spawn(async move {
            match bridge.stream_completion(prompt, &mut callback).await {
                Ok(()) => callback(None, None, true),
                Err(e) => callback(Some(e.to_string()), None, true),
            }
        });
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
