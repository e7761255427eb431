//! Replay Ollama - local inference server integration for Replay.
//!
//! Implements the chat seam against Ollama's streaming API and the
//! model-contention guard that asks a running server to release its loaded
//! models before a competing consumer needs the accelerator.
//!
//! # Example
//!
//! ```rust,ignore
//! use replay_core::{CachedChat, ChatMessage, DiskCache};
//! use replay_ollama::OllamaClient;
//!
//! #[tokio::main]
//! async fn main() -> replay_core::Result<()> {
//!     let client = OllamaClient::new(None).with_chat_model("llama3.1");
//!     let chat = CachedChat::new(client, DiskCache::new("cache/responses")?);
//!
//!     // The model runs once; every identical request after this replays
//!     // from disk.
//!     let answer = chat
//!         .chat(&[ChatMessage::user("What is a content hash?")], None)
//!         .await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

mod ollama;

pub use ollama::{OllamaClient, RunningModel};

// Re-export replay-core types that are commonly needed with this client
pub use replay_core::chat::{CachedChat, ChatClient, ChatMessage};
pub use replay_core::error::{ReplayError, Result};
pub use replay_core::transcribe::ContentionGuard;
