//! Download trigger
//!
//! Completes a click on the hidden download link by copying the linked
//! artifact into the downloads directory.

use super::artifact::ArtifactStore;
use super::types::{DownloadLink, ExportError, ExportResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Performs the equivalent of clicking a download link
pub trait DownloadTrigger: Send + Sync {
    /// Returns where the download landed
    fn click(&self, link: &DownloadLink) -> ExportResult<PathBuf>;
}

/// Saves downloads into a directory, browser style: an existing file is never
/// overwritten, a numbered variant is picked instead.
pub struct DirectoryDownloader {
    store: Arc<dyn ArtifactStore>,
    dir: PathBuf,
}

impl DirectoryDownloader {
    pub fn new(store: Arc<dyn ArtifactStore>, dir: PathBuf) -> Self {
        Self { store, dir }
    }
}

impl DownloadTrigger for DirectoryDownloader {
    fn click(&self, link: &DownloadLink) -> ExportResult<PathBuf> {
        let source = self
            .store
            .resolve(&link.href)
            .ok_or_else(|| ExportError::UnknownUrl(link.href.to_string()))?;

        fs::create_dir_all(&self.dir)?;
        let target = unique_target(&self.dir, &link.download);
        fs::copy(&source, &target)
            .map_err(|e| ExportError::Download(format!("{:?}: {}", target, e)))?;

        tracing::info!("Saved recording to {:?}", target);
        Ok(target)
    }
}

/// `name.ext`, then `name (1).ext`, `name (2).ext`, ...
fn unique_target(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    (1u32..)
        .map(|n| match &extension {
            Some(ext) => dir.join(format!("{} ({}).{}", stem, n, ext)),
            None => dir.join(format!("{} ({})", stem, n)),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(candidate)
}
