//! HTTP client for a locally running Ollama instance.
//!
//! Covers the two roles Replay needs from the server:
//!
//! - **Chat**: `POST /api/chat` with a streamed NDJSON response, delivering
//!   partial output to the caller's delta callback as it arrives.
//! - **Contention guard**: `GET /api/ps` for the currently loaded models,
//!   then a zero-keep-alive chat call per model to force eviction from
//!   shared accelerator memory before a competing consumer starts.

use async_trait::async_trait;
use futures::StreamExt;
use replay_core::chat::{ChatClient, ChatMessage, DeltaFn};
use replay_core::config::DEFAULT_OLLAMA_URL;
use replay_core::transcribe::ContentionGuard;
use replay_core::{ReplayError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Timeout for short API calls (list, unload).
const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a full chat completion.
const CHAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Model used for chat when the caller does not pick one.
const DEFAULT_CHAT_MODEL: &str = "llama3.1";

/// Helper to create a network error.
fn net_err(msg: String) -> ReplayError {
    ReplayError::Network {
        message: msg,
        cause: None,
    }
}

/// A model currently loaded in Ollama memory, as returned by `GET /api/ps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningModel {
    pub name: String,
    pub size: u64,
    pub digest: String,
    #[serde(default)]
    pub size_vram: u64,
    pub expires_at: String,
}

/// Response from `GET /api/ps`.
#[derive(Debug, Deserialize)]
struct PsResponse {
    models: Option<Vec<RunningModel>>,
}

/// A single line from the streamed `POST /api/chat` response.
#[derive(Debug, Deserialize)]
struct ChatStreamLine {
    message: Option<StreamMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

/// HTTP client for a running Ollama instance.
pub struct OllamaClient {
    base_url: String,
    chat_model: String,
    client: reqwest::Client,
    chat_client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new client targeting the given base URL.
    ///
    /// If `base_url` is `None`, defaults to `http://127.0.0.1:11434`.
    pub fn new(base_url: Option<&str>) -> Self {
        let base_url = base_url
            .unwrap_or(DEFAULT_OLLAMA_URL)
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent("replay")
            .build()
            .expect("failed to build reqwest client");

        let chat_client = reqwest::Client::builder()
            .timeout(CHAT_TIMEOUT)
            .user_agent("replay")
            .build()
            .expect("failed to build reqwest chat client");

        Self {
            base_url,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            client,
            chat_client,
        }
    }

    /// Set the model used for chat completions.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// The base URL this client targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List models currently loaded in Ollama's memory.
    pub async fn list_running_models(&self) -> Result<Vec<RunningModel>> {
        let url = format!("{}/api/ps", self.base_url);
        debug!("Listing running Ollama models from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| net_err(format!("Failed to connect to Ollama at {}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: String = response.text().await.unwrap_or_default();
            return Err(net_err(format!("Ollama API returned {}: {}", status, body)));
        }

        let ps: PsResponse = response
            .json()
            .await
            .map_err(|e| net_err(format!("Failed to parse Ollama ps response: {}", e)))?;

        let models = ps.models.unwrap_or_default();
        debug!("Ollama has {} models loaded in memory", models.len());
        Ok(models)
    }

    /// Unload a model from Ollama's memory.
    ///
    /// Sends a chat call with `keep_alive: 0` to immediately free VRAM/RAM.
    pub async fn unload_model(&self, name: &str) -> Result<()> {
        let url = format!("{}/api/chat", self.base_url);
        info!("Unloading Ollama model '{}' from memory", name);

        let body = serde_json::json!({
            "model": name,
            "messages": [],
            "stream": false,
            "keep_alive": 0
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| net_err(format!("Failed to unload model from Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: String = response.text().await.unwrap_or_default();
            return Err(net_err(format!(
                "Ollama unload returned {}: {}",
                status, body
            )));
        }

        info!("Model '{}' unloaded from memory", name);
        Ok(())
    }

    /// Ask the server to release every model it has loaded.
    ///
    /// Cooperative, not a lock: another process can reload a model in the
    /// window between this call and the next consumer's start.
    pub async fn release_loaded_models(&self) -> Result<()> {
        let running = self.list_running_models().await?;
        if running.is_empty() {
            debug!("no models loaded in Ollama; nothing to release");
            return Ok(());
        }

        info!("Releasing {} loaded Ollama models", running.len());
        for model in &running {
            self.unload_model(&model.name).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContentionGuard for OllamaClient {
    async fn release(&self) -> Result<()> {
        self.release_loaded_models().await
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        on_delta: Option<DeltaFn<'_>>,
    ) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        debug!("Sending {} chat messages to {}", messages.len(), url);

        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": messages,
            "stream": true
        });

        let response = self
            .chat_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| net_err(format!("Failed to send chat request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: String = response.text().await.unwrap_or_default();
            return Err(net_err(format!(
                "Ollama chat API returned {}: {}",
                status, body
            )));
        }

        // Consume the streamed NDJSON response, splitting on newlines across
        // chunk boundaries.
        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| net_err(format!("Failed to read Ollama chat stream: {}", e)))?;
            pending.extend_from_slice(&chunk);

            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                apply_stream_line(&String::from_utf8_lossy(&line), &mut full, on_delta)?;
            }
        }

        if !pending.is_empty() {
            apply_stream_line(&String::from_utf8_lossy(&pending), &mut full, on_delta)?;
        }

        debug!("Ollama chat returned {} characters", full.len());
        Ok(full)
    }
}

/// Fold one NDJSON line into the accumulated response, forwarding its
/// content fragment to the delta callback.
fn apply_stream_line(
    line: &str,
    full: &mut String,
    on_delta: Option<DeltaFn<'_>>,
) -> Result<()> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(());
    }

    if let Ok(parsed) = serde_json::from_str::<ChatStreamLine>(trimmed) {
        if let Some(err) = parsed.error {
            return Err(net_err(format!("Ollama chat failed: {}", err)));
        }
        if let Some(message) = parsed.message {
            if !message.content.is_empty() {
                if let Some(deliver) = on_delta {
                    deliver(&message.content);
                }
                full.push_str(&message.content);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_apply_stream_line_accumulates_content() {
        let mut full = String::new();
        apply_stream_line(
            r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
            &mut full,
            None,
        )
        .unwrap();
        apply_stream_line(
            r#"{"message":{"role":"assistant","content":"lo"},"done":false}"#,
            &mut full,
            None,
        )
        .unwrap();
        apply_stream_line(r#"{"message":{"role":"assistant","content":""},"done":true}"#, &mut full, None)
            .unwrap();

        assert_eq!(full, "Hello");
    }

    #[test]
    fn test_apply_stream_line_forwards_deltas() {
        let deltas = Mutex::new(Vec::new());
        let collect = |chunk: &str| deltas.lock().unwrap().push(chunk.to_string());

        let mut full = String::new();
        apply_stream_line(
            r#"{"message":{"content":"chunk"},"done":false}"#,
            &mut full,
            Some(&collect),
        )
        .unwrap();

        assert_eq!(*deltas.lock().unwrap(), vec!["chunk".to_string()]);
    }

    #[test]
    fn test_apply_stream_line_surfaces_server_error() {
        let mut full = String::new();
        let err = apply_stream_line(
            r#"{"error":"model 'missing' not found"}"#,
            &mut full,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("model 'missing' not found"));
    }

    #[test]
    fn test_apply_stream_line_ignores_blank_and_garbage() {
        let mut full = String::new();
        apply_stream_line("", &mut full, None).unwrap();
        apply_stream_line("   ", &mut full, None).unwrap();
        apply_stream_line("not json at all", &mut full, None).unwrap();
        assert!(full.is_empty());
    }

    #[test]
    fn test_ps_response_parsing() {
        let json = r#"{"models":[{"name":"llama3.1","size":4920753328,
            "digest":"abc123","size_vram":4920753328,
            "expires_at":"2024-06-04T14:38:31Z"}]}"#;
        let ps: PsResponse = serde_json::from_str(json).unwrap();
        let models = ps.models.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "llama3.1");
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let client = OllamaClient::new(Some("http://gpu-box:11434/"));
        assert_eq!(client.base_url(), "http://gpu-box:11434");

        let default = OllamaClient::new(None);
        assert_eq!(default.base_url(), "http://127.0.0.1:11434");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_network_error() {
        // Nothing listens on port 1; the connection is refused immediately.
        let client = OllamaClient::new(Some("http://127.0.0.1:1"));
        let err = client.release_loaded_models().await.unwrap_err();
        assert!(matches!(err, ReplayError::Network { .. }));
    }
}
