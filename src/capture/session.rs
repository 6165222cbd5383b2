//! Capture session management
//!
//! Holds at most one capture stream at a time and owns its release.

use super::traits::{CaptureConstraints, CaptureResult, CaptureStream, DisplayMediaSource};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Tracks the lifecycle of the active capture stream
pub struct CaptureSession {
    source: Arc<dyn DisplayMediaSource>,
    constraints: CaptureConstraints,
    stream: Option<Box<dyn CaptureStream>>,
}

impl CaptureSession {
    pub fn new(source: Arc<dyn DisplayMediaSource>, constraints: CaptureConstraints) -> Self {
        Self {
            source,
            constraints,
            stream: None,
        }
    }

    /// Build the capture request.
    ///
    /// The returned future owns everything it needs, so the caller can spawn
    /// it and keep handling other events while the platform prompts the user.
    pub fn acquire(
        &self,
    ) -> impl Future<Output = CaptureResult<Box<dyn CaptureStream>>> + Send + 'static {
        let source = Arc::clone(&self.source);
        let constraints = self.constraints;
        async move { source.get_display_media(&constraints).await }
    }

    /// Take ownership of a granted stream and register its inactive listener.
    pub fn adopt(&mut self, mut stream: Box<dyn CaptureStream>) -> oneshot::Receiver<()> {
        if self.stream.is_some() {
            tracing::warn!("Adopting a new capture stream while one is still held");
            self.release();
        }

        let ended = stream.on_inactive();
        tracing::info!(
            "Capture stream {} granted with {} track(s)",
            stream.id(),
            stream.tracks().len()
        );
        self.stream = Some(stream);
        ended
    }

    /// The stream currently held, if any
    pub fn stream(&self) -> Option<&dyn CaptureStream> {
        self.stream.as_deref()
    }

    /// Stop any still-live tracks and drop the stream.
    ///
    /// Returns false when there was nothing to release.
    pub fn release(&mut self) -> bool {
        let Some(mut stream) = self.stream.take() else {
            return false;
        };

        if stream.is_active() {
            stream.stop_tracks();
        }
        tracing::info!("Capture stream {} released", stream.id());
        true
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::{CaptureError, TrackInfo, TrackKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct StopCounter {
        stops: Mutex<usize>,
    }

    struct FakeStream {
        tracks: Vec<TrackInfo>,
        active: bool,
        counter: Arc<StopCounter>,
    }

    impl CaptureStream for FakeStream {
        fn id(&self) -> &str {
            "fake"
        }

        fn tracks(&self) -> &[TrackInfo] {
            &self.tracks
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn on_inactive(&mut self) -> oneshot::Receiver<()> {
            oneshot::channel().1
        }

        fn stop_tracks(&mut self) {
            self.active = false;
            *self.counter.stops.lock() += 1;
        }
    }

    struct FakeSource {
        grant: bool,
        counter: Arc<StopCounter>,
    }

    #[async_trait]
    impl DisplayMediaSource for FakeSource {
        async fn get_display_media(
            &self,
            constraints: &CaptureConstraints,
        ) -> CaptureResult<Box<dyn CaptureStream>> {
            assert!(constraints.video);
            if !self.grant {
                return Err(CaptureError::Denied("Permission denied".to_string()));
            }
            Ok(Box::new(FakeStream {
                tracks: vec![TrackInfo {
                    id: "v0".to_string(),
                    kind: TrackKind::Video,
                    label: "screen".to_string(),
                }],
                active: true,
                counter: Arc::clone(&self.counter),
            }))
        }
    }

    fn session(grant: bool) -> (CaptureSession, Arc<StopCounter>) {
        let counter = Arc::new(StopCounter::default());
        let source = Arc::new(FakeSource {
            grant,
            counter: Arc::clone(&counter),
        });
        (CaptureSession::new(source, CaptureConstraints::default()), counter)
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (mut session, counter) = session(true);
        let stream = session.acquire().await.unwrap();
        let _ended = session.adopt(stream);
        assert!(session.stream().is_some());

        assert!(session.release());
        assert!(!session.release());
        assert!(!session.stream().is_some());
        assert_eq!(*counter.stops.lock(), 1);
    }

    #[tokio::test]
    async fn test_denied_acquire_holds_nothing() {
        let (session, counter) = session(false);
        let result = session.acquire().await;
        assert!(matches!(result, Err(CaptureError::Denied(_))));
        assert!(!session.stream().is_some());
        assert_eq!(*counter.stops.lock(), 0);
    }

    #[tokio::test]
    async fn test_adopt_replaces_previous_stream() {
        let (mut session, counter) = session(true);
        let first = session.acquire().await.unwrap();
        let second = session.acquire().await.unwrap();
        let _a = session.adopt(first);
        let _b = session.adopt(second);
        assert_eq!(*counter.stops.lock(), 1);

        drop(session);
        assert_eq!(*counter.stops.lock(), 2);
    }
}
