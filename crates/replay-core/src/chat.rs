//! Memoized chat completions.
//!
//! A chat request is identified by a digest over its canonical form (the
//! ordered list of conversation turns), so two semantically identical
//! requests made at different times map to the same cache entry and the
//! underlying model is called at most once per distinct request.

use crate::cache::DiskCache;
use crate::error::{ReplayError, Result};
use crate::hashing;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Callback receiving partial output while a model streams its response.
pub type DeltaFn<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// A client that can run one chat completion to the end.
///
/// Implementations report partial output to `on_delta` as it arrives and
/// return the full response text once the stream finishes.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        on_delta: Option<DeltaFn<'_>>,
    ) -> Result<String>;
}

/// Digest of the canonical form of a chat request.
///
/// The canonical form is the JSON encoding of the ordered turn list, so the
/// key is stable across invocations and sensitive to both turn order and
/// content.
pub fn request_digest(messages: &[ChatMessage]) -> String {
    let canonical =
        serde_json::to_string(messages).expect("chat messages serialize to JSON");
    hashing::sha256_hex(canonical)
}

/// Memoizing wrapper around a [`ChatClient`].
///
/// Identical message lists hit the disk cache; the wrapped client is only
/// consulted on a miss, and the result is persisted only after the full
/// response is known.
pub struct CachedChat<C> {
    inner: C,
    cache: DiskCache,
}

impl<C: ChatClient> CachedChat<C> {
    pub fn new(inner: C, cache: DiskCache) -> Self {
        Self { inner, cache }
    }

    /// Run a chat completion, serving repeats from the cache.
    ///
    /// On a hit the delta callback fires exactly once with the whole cached
    /// text; the chunk boundaries and timing of the original live stream are
    /// not reproduced.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        on_delta: Option<DeltaFn<'_>>,
    ) -> Result<String> {
        let key = request_digest(messages);

        if let Some(cached) = self.cache.get(&key)? {
            if let Some(deliver) = on_delta {
                deliver(&cached);
            }
            return Ok(cached);
        }

        debug!("cache miss for chat request {}", key);
        let response = self.inner.chat(messages, on_delta).await?;

        if response.trim().is_empty() {
            return Err(ReplayError::EmptyResponse {
                context: "chat model".to_string(),
            });
        }

        self.cache.put(&key, &response)?;
        Ok(response)
    }

    /// The wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: ChatClient> ChatClient for CachedChat<C> {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        on_delta: Option<DeltaFn<'_>>,
    ) -> Result<String> {
        CachedChat::chat(self, messages, on_delta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Counts calls and replies with a fixed text, streamed in two chunks.
    struct CountingClient {
        calls: AtomicUsize,
        reply: String,
    }

    impl CountingClient {
        fn new(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: reply.to_string(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatClient for CountingClient {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            on_delta: Option<DeltaFn<'_>>,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(deliver) = on_delta {
                let (head, tail) = self.reply.split_at(self.reply.len() / 2);
                deliver(head);
                deliver(tail);
            }
            Ok(self.reply.clone())
        }
    }

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are terse."),
            ChatMessage::user("What is the capital of France?"),
        ]
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let chat = CachedChat::new(CountingClient::new("Paris"), cache);

        let first = chat.chat(&messages(), None).await.unwrap();
        let second = chat.chat(&messages(), None).await.unwrap();

        assert_eq!(first, "Paris");
        assert_eq!(second, first);
        assert_eq!(chat.inner().call_count(), 1);
    }

    #[tokio::test]
    async fn test_hit_replays_full_text_to_delta_callback_once() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let chat = CachedChat::new(CountingClient::new("Paris"), cache);

        chat.chat(&messages(), None).await.unwrap();

        let deltas = Mutex::new(Vec::new());
        let collect = |chunk: &str| deltas.lock().unwrap().push(chunk.to_string());
        chat.chat(&messages(), Some(&collect)).await.unwrap();

        // One delivery with the whole cached value, not the live chunking.
        assert_eq!(*deltas.lock().unwrap(), vec!["Paris".to_string()]);
    }

    #[tokio::test]
    async fn test_distinct_requests_use_distinct_keys() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let chat = CachedChat::new(CountingClient::new("answer"), cache);

        chat.chat(&messages(), None).await.unwrap();
        chat.chat(&[ChatMessage::user("Something else")], None)
            .await
            .unwrap();

        assert_eq!(chat.inner().call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_response_is_fatal_and_not_cached() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let chat = CachedChat::new(CountingClient::new("   "), cache);

        let err = chat.chat(&messages(), None).await.unwrap_err();
        assert!(matches!(err, ReplayError::EmptyResponse { .. }));

        // Nothing was written, so a retry consults the model again.
        let _ = chat.chat(&messages(), None).await;
        assert_eq!(chat.inner().call_count(), 2);
    }

    #[test]
    fn test_request_digest_is_order_sensitive() {
        let forward = vec![ChatMessage::user("a"), ChatMessage::user("b")];
        let reversed = vec![ChatMessage::user("b"), ChatMessage::user("a")];

        assert_eq!(request_digest(&forward), request_digest(&forward));
        assert_ne!(request_digest(&forward), request_digest(&reversed));
    }
}
