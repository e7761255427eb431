//! Audio transcription pipeline: transcribe once per distinct content,
//! reuse forever.
//!
//! The pipeline composes the resource store (hash identity), the cache
//! layout (materialized recordings and transcript files), the contention
//! guard, and the external tool runner. A repeated request for the same
//! bytes, under any filename, never reaches the guard or the tool.

use crate::config::Config;
use crate::error::{ReplayError, Result};
use crate::hashing;
use crate::process::ToolRunner;
use crate::store::{AudioResource, NewAudio, ResourceStore};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Connect timeout for audio downloads; there is no total timeout because
/// source files can be large.
const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cooperative handshake releasing a shared accelerator before a competing
/// consumer starts.
///
/// Advisory only: nothing prevents another process from reloading a model in
/// the window between release and the consumer's start.
#[async_trait]
pub trait ContentionGuard: Send + Sync {
    async fn release(&self) -> Result<()>;
}

/// Audio input handed to the pipeline.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// A file already on disk.
    File(PathBuf),
    /// Remote audio, fetched once and materialized into the cache.
    Url { url: String, name: String },
    /// In-memory bytes under a display name.
    Bytes { name: String, bytes: Vec<u8> },
}

/// Transcription request options.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    /// Language code passed to the tool.
    pub language: String,
    /// Explicit model override; defaults per language when absent.
    pub model: Option<String>,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            model: None,
        }
    }
}

/// A transcribed recording.
#[derive(Debug, Clone)]
pub struct Recording {
    /// The deduplicated resource row backing this recording.
    pub resource: AudioResource,
    /// Local audio path inside the cache.
    pub audio_path: PathBuf,
    /// Transcript file written by the tool.
    pub transcript_path: PathBuf,
    /// Transcript content.
    pub transcription: String,
}

/// The transcription pipeline.
pub struct Transcriber<R> {
    store: Arc<ResourceStore>,
    config: Config,
    guard: Option<Arc<dyn ContentionGuard>>,
    runner: R,
    http: reqwest::Client,
}

impl<R: ToolRunner> Transcriber<R> {
    pub fn new(store: Arc<ResourceStore>, config: Config, runner: R) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(FETCH_CONNECT_TIMEOUT)
            .user_agent("replay")
            .build()
            .expect("failed to build reqwest client");

        Self {
            store,
            config,
            guard: None,
            runner,
            http,
        }
    }

    /// Release the shared accelerator through `guard` before each tool run.
    pub fn with_guard(mut self, guard: Arc<dyn ContentionGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Transcribe `source`, serving repeated content from the store.
    ///
    /// The content hash is checked first: a hit returns the stored
    /// transcription without materializing anything, releasing any model, or
    /// spawning the tool.
    pub async fn transcribe(
        &self,
        source: AudioSource,
        opts: &TranscribeOptions,
    ) -> Result<Recording> {
        let (name, bytes) = self.resolve_bytes(source).await?;
        let hash = hashing::sha256_hex(&bytes);

        let resource = self
            .store
            .resolve_or_create_audio(&hash, &name, || {
                self.transcribe_uncached(&name, &bytes, &hash, opts)
            })
            .await?;

        let audio_path = PathBuf::from(&resource.path);
        let transcript_path = self.transcript_path(&audio_path);
        Ok(Recording {
            audio_path,
            transcript_path,
            transcription: resource.transcription.clone(),
            resource,
        })
    }

    /// The expensive path: materialize, check the transcript file, contend
    /// for the accelerator, run the tool, read the transcript back.
    async fn transcribe_uncached(
        &self,
        name: &str,
        bytes: &[u8],
        hash: &str,
        opts: &TranscribeOptions,
    ) -> Result<NewAudio> {
        let audio_path = self.materialize(name, bytes, hash)?;
        let transcript_path = self.transcript_path(&audio_path);

        if transcript_path.exists() {
            debug!("transcript already present at {}", transcript_path.display());
        } else {
            if let Some(guard) = &self.guard {
                guard.release().await?;
            }
            self.run_tool(&audio_path, opts)?;
        }

        let transcription = fs::read_to_string(&transcript_path)
            .map_err(|e| ReplayError::io_with_path(e, &transcript_path))?;

        Ok(NewAudio {
            path: audio_path.display().to_string(),
            transcription,
        })
    }

    async fn resolve_bytes(&self, source: AudioSource) -> Result<(String, Vec<u8>)> {
        match source {
            AudioSource::File(path) => {
                if !path.exists() {
                    return Err(ReplayError::FileNotFound(path));
                }
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| ReplayError::Config {
                        message: format!("audio path has no file name: {}", path.display()),
                    })?;
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| ReplayError::io_with_path(e, &path))?;
                Ok((name, bytes))
            }
            AudioSource::Url { url, name } => {
                info!("fetching audio from {}", url);
                let response = self.http.get(&url).send().await.map_err(|e| {
                    ReplayError::Network {
                        message: format!("Failed to fetch audio from {}: {}", url, e),
                        cause: None,
                    }
                })?;
                if !response.status().is_success() {
                    return Err(ReplayError::Network {
                        message: format!("Audio fetch returned {} for {}", response.status(), url),
                        cause: None,
                    });
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| ReplayError::Network {
                        message: format!("Failed to read audio body from {}: {}", url, e),
                        cause: None,
                    })?
                    .to_vec();
                Ok((name, bytes))
            }
            AudioSource::Bytes { name, bytes } => Ok((name, bytes)),
        }
    }

    /// Write the bytes to their cache-addressed path if not already present.
    fn materialize(&self, name: &str, bytes: &[u8], hash: &str) -> Result<PathBuf> {
        let dir = self.config.recordings_dir();
        fs::create_dir_all(&dir).map_err(|e| ReplayError::io_with_path(e, &dir))?;

        let path = dir.join(cache_file_name(name, hash));
        if !path.exists() {
            fs::write(&path, bytes).map_err(|e| ReplayError::io_with_path(e, &path))?;
            debug!("materialized {} bytes at {}", bytes.len(), path.display());
        }
        Ok(path)
    }

    fn run_tool(&self, audio_path: &Path, opts: &TranscribeOptions) -> Result<()> {
        let transcripts_dir = self.config.transcripts_dir();
        fs::create_dir_all(&transcripts_dir)
            .map_err(|e| ReplayError::io_with_path(e, &transcripts_dir))?;

        let model = opts
            .model
            .as_deref()
            .unwrap_or_else(|| self.config.model_for_language(&opts.language));

        let args = vec![
            "--task".to_string(),
            "transcribe".to_string(),
            "--model".to_string(),
            model.to_string(),
            "--language".to_string(),
            opts.language.clone(),
            "--output_format".to_string(),
            self.config.whisper.output_format.clone(),
            "--output_dir".to_string(),
            transcripts_dir.display().to_string(),
            audio_path.display().to_string(),
        ];

        // The tool writes the transcript file itself; its stdout is progress
        // noise and is discarded.
        self.runner.run(&self.config.whisper.binary, &args)?;
        Ok(())
    }

    /// Where the tool leaves the transcript for a given input file.
    fn transcript_path(&self, audio_path: &Path) -> PathBuf {
        let stem = audio_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("transcript");
        self.config.transcripts_dir().join(format!("{stem}.txt"))
    }
}

/// `<stem>-<hash prefix>.<ext>` — the hash prefix keeps filename-derived
/// transcript paths unique per content, so two inputs sharing a name but
/// differing in bytes never collide on one transcript.
fn cache_file_name(name: &str, hash: &str) -> String {
    let file = Path::new(name);
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    let short = &hash[..hash.len().min(8)];
    match file.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}-{short}.{ext}"),
        None => format!("{stem}-{short}"),
    }
}
