//! Local capture and view sink contracts.

use crate::config::MediaConstraints;
use crate::errors::SessionError;
use crate::types::MediaStream;
use async_trait::async_trait;

/// Access to local audio/video devices.
///
/// Invoked at most once per session; ownership of the returned stream passes
/// to the session, which stops every track on teardown.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Fails with [`SessionError::DeviceUnavailable`] when no device matches
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<MediaStream, SessionError>;
}

/// Where a stream is rendered. Rendering itself is not this crate's concern.
pub trait MediaView: Send + Sync {
    fn attach(&self, stream: &MediaStream);

    fn clear(&self);
}

/// A view that renders nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedView;

impl MediaView for DetachedView {
    fn attach(&self, stream: &MediaStream) {
        log::debug!("Stream {} has no view attached", stream.id);
    }

    fn clear(&self) {}
}
