//! Object URL registry
//!
//! Hands out revocable references for exported blobs. The file-backed store
//! keeps each blob in a private temporary directory and exposes it through
//! the webview's asset protocol.

use super::types::{Blob, ExportError, ExportResult, ObjectUrl};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

/// Scheme prefix used for asset URLs served to the webview
pub const ASSET_URL_PREFIX: &str = "asset://localhost/";

/// Creates and revokes object URLs
pub trait ArtifactStore: Send + Sync {
    fn create_object_url(&self, blob: &Blob) -> ExportResult<ObjectUrl>;

    /// Release the resource behind `url`. Revoking an unknown or already
    /// revoked URL does nothing.
    fn revoke_object_url(&self, url: &ObjectUrl) -> ExportResult<()>;

    /// Local file backing a live URL
    fn resolve(&self, url: &ObjectUrl) -> Option<PathBuf>;

    /// Number of URLs that have been created and not yet revoked
    fn live_count(&self) -> usize;
}

/// Store backed by files in a private temporary directory
pub struct FileArtifactStore {
    dir: TempDir,
    live: Mutex<HashMap<ObjectUrl, PathBuf>>,
}

impl FileArtifactStore {
    pub fn new() -> ExportResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("screen-sharing-")
            .tempdir()?;
        tracing::debug!("Artifact store at {:?}", dir.path());
        Ok(Self {
            dir,
            live: Mutex::new(HashMap::new()),
        })
    }
}

/// Build the asset URL the webview uses to read a local file
pub fn asset_url(path: &Path) -> ObjectUrl {
    let encoded = urlencoding::encode(&path.to_string_lossy()).into_owned();
    ObjectUrl::new(format!("{}{}", ASSET_URL_PREFIX, encoded))
}

impl ArtifactStore for FileArtifactStore {
    fn create_object_url(&self, blob: &Blob) -> ExportResult<ObjectUrl> {
        let path = self.dir.path().join(format!("{}.blob", Uuid::new_v4()));
        fs::write(&path, blob.data())?;

        let url = asset_url(&path);
        tracing::debug!(
            "Created object URL for {} byte {} blob at {:?}",
            blob.size(),
            blob.mime_type(),
            path
        );
        self.live.lock().insert(url.clone(), path);
        Ok(url)
    }

    fn revoke_object_url(&self, url: &ObjectUrl) -> ExportResult<()> {
        let Some(path) = self.live.lock().remove(url) else {
            return Ok(());
        };

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ExportError::from(e)),
        }
        tracing::debug!("Revoked object URL {}", url);
        Ok(())
    }

    fn resolve(&self, url: &ObjectUrl) -> Option<PathBuf> {
        self.live.lock().get(url).cloned()
    }

    fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}
