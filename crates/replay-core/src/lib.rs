//! Replay Core - content-addressable caching and deduplication for model
//! workloads.
//!
//! This crate makes expensive, non-deterministic, or externally-billed
//! operations (LLM calls, audio transcription, image description)
//! idempotent and replayable:
//!
//! - [`hashing`] derives a stable digest that identifies content by bytes,
//!   independent of filename or origin.
//! - [`cache`] memoizes text responses on disk, one immutable file per
//!   request digest.
//! - [`store`] deduplicates resources relationally: at most one row, and at
//!   most one expensive derivation, per distinct content per kind.
//! - [`chat`] wraps any chat client so identical message lists are served
//!   from the cache without a model call.
//! - [`process`] runs external tools to completion, classifying the outcome
//!   by exit code.
//! - [`transcribe`] composes the above into a "transcribe once, reuse
//!   forever" pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use replay_core::{AudioSource, Config, ProcessRunner, ResourceStore, Transcriber};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> replay_core::Result<()> {
//!     let config = Config::default();
//!     let store = Arc::new(ResourceStore::open(config.context_dir().join("replay.db"))?);
//!     let transcriber = Transcriber::new(store, config, ProcessRunner);
//!
//!     let recording = transcriber
//!         .transcribe(AudioSource::File("talk.mp3".into()), &Default::default())
//!         .await?;
//!     println!("{}", recording.transcription);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod hashing;
pub mod process;
pub mod store;
pub mod transcribe;

// Re-export commonly used types
pub use cache::DiskCache;
pub use chat::{CachedChat, ChatClient, ChatMessage, DeltaFn};
pub use config::{CacheDirs, Config, WhisperConfig, DEFAULT_OLLAMA_URL};
pub use error::{ReplayError, Result};
pub use process::{ProcessRunner, ToolRunner};
pub use store::{
    AudioResource, ImageResource, NewAudio, NewImage, NewPdfImage, NewPdfText, NewText,
    PdfImageResource, PdfTextResource, ResourceKind, ResourceStore, TextResource,
};
pub use transcribe::{AudioSource, ContentionGuard, Recording, TranscribeOptions, Transcriber};
