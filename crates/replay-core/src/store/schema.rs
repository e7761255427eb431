//! Resource row types, one per deduplicated content kind.
//!
//! Every row carries the shared header (id, content hash, display name,
//! creation time) plus kind-specific derived fields. Derived fields are set
//! once, when the content is first encountered, and never change afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Plain text content addressed by its hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResource {
    pub id: i64,
    pub hash: String,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// An audio file and its transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioResource {
    pub id: i64,
    pub hash: String,
    pub name: String,
    pub path: String,
    pub transcription: String,
    pub created_at: DateTime<Utc>,
}

/// An image, the original it was derived from, and its description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResource {
    pub id: i64,
    pub hash: String,
    pub name: String,
    pub path: String,
    pub original_path: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Text extracted from a page range of a PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfTextResource {
    pub id: i64,
    pub hash: String,
    pub name: String,
    pub pdf_path: String,
    pub pages: BTreeSet<u32>,
    pub keywords: BTreeSet<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// An image extracted from a page range of a PDF, with its description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfImageResource {
    pub id: i64,
    pub hash: String,
    pub name: String,
    pub pdf_path: String,
    pub pages: BTreeSet<u32>,
    pub keywords: BTreeSet<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Derived fields for a new text resource.
#[derive(Debug, Clone)]
pub struct NewText {
    pub content: String,
}

/// Derived fields for a new audio resource.
#[derive(Debug, Clone)]
pub struct NewAudio {
    pub path: String,
    pub transcription: String,
}

/// Derived fields for a new image resource.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub path: String,
    pub original_path: String,
    pub description: String,
}

/// Derived fields for a new PDF text resource.
#[derive(Debug, Clone)]
pub struct NewPdfText {
    pub pdf_path: String,
    pub pages: BTreeSet<u32>,
    pub keywords: BTreeSet<String>,
    pub content: String,
}

/// Derived fields for a new PDF image resource.
#[derive(Debug, Clone)]
pub struct NewPdfImage {
    pub pdf_path: String,
    pub pages: BTreeSet<u32>,
    pub keywords: BTreeSet<String>,
    pub description: String,
}
