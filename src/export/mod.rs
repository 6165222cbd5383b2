//! Recording export
//!
//! Packages the recording buffer into a single blob, registers it behind a
//! revocable object URL, and hands it to the download trigger.

pub mod artifact;
pub mod download;
pub mod types;

pub use artifact::{ArtifactStore, FileArtifactStore};
pub use download::{DirectoryDownloader, DownloadTrigger};
pub use types::{Artifact, Blob, DownloadLink, ExportError, ExportResult, ObjectUrl};

use crate::recorder::RecordingBuffer;

/// Concatenate the buffered chunks, in order, into one blob
pub fn materialize(buffer: &RecordingBuffer, mime_type: &str) -> Blob {
    let mut data = Vec::with_capacity(buffer.total_bytes());
    for chunk in buffer.chunks() {
        data.extend_from_slice(chunk.data());
    }
    Blob::new(data, mime_type)
}
