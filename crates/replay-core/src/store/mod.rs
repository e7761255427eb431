//! SQLite-backed deduplication store for content-addressed resources.
//!
//! One table per resource kind, each row unique on its content hash: two
//! submissions of the same bytes under different names resolve to the same
//! row, and the expensive derivation (transcription, description, OCR) runs
//! at most once per distinct content.

mod schema;

pub use schema::*;

use crate::error::{ReplayError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// The resource kinds the store deduplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Text,
    Audio,
    Image,
    PdfText,
    PdfImage,
}

impl ResourceKind {
    /// Table backing this kind.
    pub fn table(&self) -> &'static str {
        match self {
            ResourceKind::Text => "text_resources",
            ResourceKind::Audio => "audio_resources",
            ResourceKind::Image => "image_resources",
            ResourceKind::PdfText => "pdf_text_resources",
            ResourceKind::PdfImage => "pdf_image_resources",
        }
    }
}

/// Relational dedup store.
///
/// Thread-safe via an internal mutex on the connection, but there is no
/// per-key locking: two callers racing on the same not-yet-stored hash can
/// both run their compute, and the loser's insert surfaces the UNIQUE
/// violation as a database error.
pub struct ResourceStore {
    conn: Arc<Mutex<Connection>>,
}

impl ResourceStore {
    /// Open or create the store at the given path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ReplayError::io_with_path(e, parent))?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=30000;
            PRAGMA synchronous=NORMAL;
            ",
        )?;

        Self::ensure_schema(&conn)?;
        info!("resource store opened at {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory resource store");
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Shared header on every kind: rowid, unique content hash,
            -- display name at first encounter, creation time.
            CREATE TABLE IF NOT EXISTS text_resources (
                id INTEGER PRIMARY KEY,
                hash TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audio_resources (
                id INTEGER PRIMARY KEY,
                hash TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                transcription TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS image_resources (
                id INTEGER PRIMARY KEY,
                hash TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                original_path TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Page and keyword sets are stored as JSON arrays.
            CREATE TABLE IF NOT EXISTS pdf_text_resources (
                id INTEGER PRIMARY KEY,
                hash TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                pdf_path TEXT NOT NULL,
                pages_json TEXT NOT NULL,
                keywords_json TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pdf_image_resources (
                id INTEGER PRIMARY KEY,
                hash TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                pdf_path TEXT NOT NULL,
                pages_json TEXT NOT NULL,
                keywords_json TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ReplayError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    /// Number of stored rows of a kind.
    pub fn count(&self, kind: ResourceKind) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Text

    /// Look up a text resource by content hash.
    pub fn find_text_by_hash(&self, hash: &str) -> Result<Option<TextResource>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, hash, name, content, created_at FROM text_resources WHERE hash = ?1",
        )?;
        Ok(stmt.query_row(params![hash], row_to_text).optional()?)
    }

    /// Return the stored text resource for `hash`, running `compute` and
    /// inserting its result only if no row exists yet.
    pub async fn resolve_or_create_text<F, Fut>(
        &self,
        hash: &str,
        name: &str,
        compute: F,
    ) -> Result<TextResource>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NewText>>,
    {
        if let Some(existing) = self.find_text_by_hash(hash)? {
            debug!("text resource {} already stored as '{}'", hash, existing.name);
            return Ok(existing);
        }
        let fields = compute().await?;
        self.insert_text(hash, name, fields)
    }

    fn insert_text(&self, hash: &str, name: &str, fields: NewText) -> Result<TextResource> {
        let created_at = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO text_resources (hash, name, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![hash, name, fields.content, created_at.to_rfc3339()],
        )?;
        Ok(TextResource {
            id: conn.last_insert_rowid(),
            hash: hash.to_string(),
            name: name.to_string(),
            content: fields.content,
            created_at,
        })
    }

    // Audio

    /// Look up an audio resource by content hash.
    pub fn find_audio_by_hash(&self, hash: &str) -> Result<Option<AudioResource>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, hash, name, path, transcription, created_at
             FROM audio_resources WHERE hash = ?1",
        )?;
        Ok(stmt.query_row(params![hash], row_to_audio).optional()?)
    }

    /// Return the stored audio resource for `hash`, running `compute` (the
    /// transcription) only if no row exists yet.
    pub async fn resolve_or_create_audio<F, Fut>(
        &self,
        hash: &str,
        name: &str,
        compute: F,
    ) -> Result<AudioResource>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NewAudio>>,
    {
        if let Some(existing) = self.find_audio_by_hash(hash)? {
            debug!("audio resource {} already stored as '{}'", hash, existing.name);
            return Ok(existing);
        }
        let fields = compute().await?;
        self.insert_audio(hash, name, fields)
    }

    fn insert_audio(&self, hash: &str, name: &str, fields: NewAudio) -> Result<AudioResource> {
        let created_at = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO audio_resources (hash, name, path, transcription, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![hash, name, fields.path, fields.transcription, created_at.to_rfc3339()],
        )?;
        Ok(AudioResource {
            id: conn.last_insert_rowid(),
            hash: hash.to_string(),
            name: name.to_string(),
            path: fields.path,
            transcription: fields.transcription,
            created_at,
        })
    }

    // Image

    /// Look up an image resource by content hash.
    pub fn find_image_by_hash(&self, hash: &str) -> Result<Option<ImageResource>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, hash, name, path, original_path, description, created_at
             FROM image_resources WHERE hash = ?1",
        )?;
        Ok(stmt.query_row(params![hash], row_to_image).optional()?)
    }

    /// Return the stored image resource for `hash`, running `compute` (the
    /// description) only if no row exists yet.
    pub async fn resolve_or_create_image<F, Fut>(
        &self,
        hash: &str,
        name: &str,
        compute: F,
    ) -> Result<ImageResource>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NewImage>>,
    {
        if let Some(existing) = self.find_image_by_hash(hash)? {
            debug!("image resource {} already stored as '{}'", hash, existing.name);
            return Ok(existing);
        }
        let fields = compute().await?;
        self.insert_image(hash, name, fields)
    }

    fn insert_image(&self, hash: &str, name: &str, fields: NewImage) -> Result<ImageResource> {
        let created_at = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO image_resources (hash, name, path, original_path, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                hash,
                name,
                fields.path,
                fields.original_path,
                fields.description,
                created_at.to_rfc3339()
            ],
        )?;
        Ok(ImageResource {
            id: conn.last_insert_rowid(),
            hash: hash.to_string(),
            name: name.to_string(),
            path: fields.path,
            original_path: fields.original_path,
            description: fields.description,
            created_at,
        })
    }

    // PDF text

    /// Look up a PDF text resource by content hash.
    pub fn find_pdf_text_by_hash(&self, hash: &str) -> Result<Option<PdfTextResource>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, hash, name, pdf_path, pages_json, keywords_json, content, created_at
             FROM pdf_text_resources WHERE hash = ?1",
        )?;
        Ok(stmt.query_row(params![hash], row_to_pdf_text).optional()?)
    }

    /// Return the stored PDF text resource for `hash`, running `compute`
    /// (the extraction) only if no row exists yet.
    pub async fn resolve_or_create_pdf_text<F, Fut>(
        &self,
        hash: &str,
        name: &str,
        compute: F,
    ) -> Result<PdfTextResource>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NewPdfText>>,
    {
        if let Some(existing) = self.find_pdf_text_by_hash(hash)? {
            debug!("pdf text resource {} already stored as '{}'", hash, existing.name);
            return Ok(existing);
        }
        let fields = compute().await?;
        self.insert_pdf_text(hash, name, fields)
    }

    fn insert_pdf_text(
        &self,
        hash: &str,
        name: &str,
        fields: NewPdfText,
    ) -> Result<PdfTextResource> {
        let created_at = Utc::now();
        let pages_json = serde_json::to_string(&fields.pages)?;
        let keywords_json = serde_json::to_string(&fields.keywords)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pdf_text_resources
             (hash, name, pdf_path, pages_json, keywords_json, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                hash,
                name,
                fields.pdf_path,
                pages_json,
                keywords_json,
                fields.content,
                created_at.to_rfc3339()
            ],
        )?;
        Ok(PdfTextResource {
            id: conn.last_insert_rowid(),
            hash: hash.to_string(),
            name: name.to_string(),
            pdf_path: fields.pdf_path,
            pages: fields.pages,
            keywords: fields.keywords,
            content: fields.content,
            created_at,
        })
    }

    // PDF image

    /// Look up a PDF image resource by content hash.
    pub fn find_pdf_image_by_hash(&self, hash: &str) -> Result<Option<PdfImageResource>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, hash, name, pdf_path, pages_json, keywords_json, description, created_at
             FROM pdf_image_resources WHERE hash = ?1",
        )?;
        Ok(stmt.query_row(params![hash], row_to_pdf_image).optional()?)
    }

    /// Return the stored PDF image resource for `hash`, running `compute`
    /// (the description) only if no row exists yet.
    pub async fn resolve_or_create_pdf_image<F, Fut>(
        &self,
        hash: &str,
        name: &str,
        compute: F,
    ) -> Result<PdfImageResource>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NewPdfImage>>,
    {
        if let Some(existing) = self.find_pdf_image_by_hash(hash)? {
            debug!("pdf image resource {} already stored as '{}'", hash, existing.name);
            return Ok(existing);
        }
        let fields = compute().await?;
        self.insert_pdf_image(hash, name, fields)
    }

    fn insert_pdf_image(
        &self,
        hash: &str,
        name: &str,
        fields: NewPdfImage,
    ) -> Result<PdfImageResource> {
        let created_at = Utc::now();
        let pages_json = serde_json::to_string(&fields.pages)?;
        let keywords_json = serde_json::to_string(&fields.keywords)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pdf_image_resources
             (hash, name, pdf_path, pages_json, keywords_json, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                hash,
                name,
                fields.pdf_path,
                pages_json,
                keywords_json,
                fields.description,
                created_at.to_rfc3339()
            ],
        )?;
        Ok(PdfImageResource {
            id: conn.last_insert_rowid(),
            hash: hash.to_string(),
            name: name.to_string(),
            pdf_path: fields.pdf_path,
            pages: fields.pages,
            keywords: fields.keywords,
            description: fields.description,
            created_at,
        })
    }
}

// Row mapping helpers

fn row_to_text(row: &Row) -> rusqlite::Result<TextResource> {
    Ok(TextResource {
        id: row.get(0)?,
        hash: row.get(1)?,
        name: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_datetime(row, 4)?,
    })
}

fn row_to_audio(row: &Row) -> rusqlite::Result<AudioResource> {
    Ok(AudioResource {
        id: row.get(0)?,
        hash: row.get(1)?,
        name: row.get(2)?,
        path: row.get(3)?,
        transcription: row.get(4)?,
        created_at: parse_datetime(row, 5)?,
    })
}

fn row_to_image(row: &Row) -> rusqlite::Result<ImageResource> {
    Ok(ImageResource {
        id: row.get(0)?,
        hash: row.get(1)?,
        name: row.get(2)?,
        path: row.get(3)?,
        original_path: row.get(4)?,
        description: row.get(5)?,
        created_at: parse_datetime(row, 6)?,
    })
}

fn row_to_pdf_text(row: &Row) -> rusqlite::Result<PdfTextResource> {
    Ok(PdfTextResource {
        id: row.get(0)?,
        hash: row.get(1)?,
        name: row.get(2)?,
        pdf_path: row.get(3)?,
        pages: parse_json_set(row, 4)?,
        keywords: parse_json_set(row, 5)?,
        content: row.get(6)?,
        created_at: parse_datetime(row, 7)?,
    })
}

fn row_to_pdf_image(row: &Row) -> rusqlite::Result<PdfImageResource> {
    Ok(PdfImageResource {
        id: row.get(0)?,
        hash: row.get(1)?,
        name: row.get(2)?,
        pdf_path: row.get(3)?,
        pages: parse_json_set(row, 4)?,
        keywords: parse_json_set(row, 5)?,
        description: row.get(6)?,
        created_at: parse_datetime(row, 7)?,
    })
}

fn parse_datetime(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_json_set<T>(row: &Row, idx: usize) -> rusqlite::Result<BTreeSet<T>>
where
    T: serde::de::DeserializeOwned + Ord,
{
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_race_surfaces_unique_violation() {
        let store = ResourceStore::open_in_memory().unwrap();

        store
            .insert_text(
                "aaaa",
                "first.txt",
                NewText {
                    content: "one".into(),
                },
            )
            .unwrap();

        // A second insert of the same hash models the loser of a race on a
        // not-yet-stored key; the constraint violation is surfaced, not
        // resolved internally.
        let err = store
            .insert_text(
                "aaaa",
                "second.txt",
                NewText {
                    content: "two".into(),
                },
            )
            .unwrap_err();
        assert!(err.is_unique_violation(), "got: {err}");
    }

    #[test]
    fn test_same_hash_allowed_across_kinds() {
        let store = ResourceStore::open_in_memory().unwrap();

        store
            .insert_text("cafe", "a.txt", NewText { content: "x".into() })
            .unwrap();
        store
            .insert_audio(
                "cafe",
                "a.mp3",
                NewAudio {
                    path: "/tmp/a.mp3".into(),
                    transcription: "x".into(),
                },
            )
            .unwrap();

        assert_eq!(store.count(ResourceKind::Text).unwrap(), 1);
        assert_eq!(store.count(ResourceKind::Audio).unwrap(), 1);
    }
}
