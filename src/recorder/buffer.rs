//! Recording buffer
//!
//! Ordered, append-only storage for the encoded chunks of one session.

use chrono::{DateTime, Utc};

/// One encoded chunk delivered by the recorder
#[derive(Debug, Clone)]
pub struct Chunk {
    data: Vec<u8>,
    received_at: DateTime<Utc>,
}

impl Chunk {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

}

#[derive(Debug, Default)]
pub struct RecordingBuffer {
    chunks: Vec<Chunk>,
    total_bytes: usize,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are dropped and `false` is returned.
    pub fn push(&mut self, data: Vec<u8>) -> bool {
        if data.is_empty() {
            return false;
        }
        self.total_bytes += data.len();
        self.chunks.push(Chunk {
            data,
            received_at: Utc::now(),
        });
        true
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Wall time between the first and last chunk, in milliseconds
    pub fn span_ms(&self) -> i64 {
        match (self.chunks.first(), self.chunks.last()) {
            (Some(first), Some(last)) => (last.received_at - first.received_at).num_milliseconds(),
            _ => 0,
        }
    }
}
