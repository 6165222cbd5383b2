//! Export types
//!
//! This module defines the artifact and download-link types and the export
//! error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Concatenated recording tagged with its container media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    data: Vec<u8>,
    mime_type: String,
}

impl Blob {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// Revocable reference to an exported blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hidden link element used to trigger a download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    /// The object URL being downloaded
    pub href: ObjectUrl,
    /// File name offered to the user
    pub download: String,
    /// Media type hint
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// The exported recording currently offered for download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub url: ObjectUrl,
    pub size: usize,
    pub mime_type: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn link(&self) -> DownloadLink {
        DownloadLink {
            href: self.url.clone(),
            download: self.filename.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Export errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Unknown object URL: {0}")]
    UnknownUrl(String),

    #[error("Download failed: {0}")]
    Download(String),
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e.to_string())
    }
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;
