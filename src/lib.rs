//! rtc-viewer: viewer-side WebRTC negotiation over an external signaling channel
//!
//! This crate drives the viewer half of a WebRTC handshake against a master
//! peer. The signaling channel, the media transport and the local capture
//! devices are injected capabilities; the crate orchestrates them.
//!
//! # Features
//! - Trickle (incremental) and batched ICE candidate negotiation
//! - Regional STUN and relay-only TURN configuration
//! - Optional side channel for text messages
//! - Periodic connection statistics and playback frame-rate metering
//! - Idempotent teardown from any negotiation state
//!
//! # Usage
//! ```rust,ignore
//! use rtc_viewer::{Collaborators, ViewerConfig, ViewerController, ViewerSinks};
//!
//! let controller = ViewerController::new();
//! let session = controller
//!     .start(ViewerConfig::load_or_default(), collaborators, ViewerSinks::default())
//!     .await?;
//! session.send_message("hello master").await?;
//! session.stop().await;
//! ```
pub mod config;
pub mod controller;
pub mod errors;
pub mod ice;
pub mod lifecycle;
pub mod media;
pub mod negotiation;
pub mod peer;
pub mod playback;
pub mod session;
pub mod signaling;
pub mod sinks;
pub mod timing;
pub mod types;

#[cfg(feature = "webrtc")]
pub mod webrtc;

// Testing utilities - scripted collaborators for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::{MediaConstraints, Resolution, ViewerConfig};
pub use controller::{start_session, Collaborators, SessionHandle, ViewerController};
pub use errors::{ErrorKind, SessionError};
pub use ice::{build_rtc_configuration, IceServer, RTCConfiguration};
pub use lifecycle::{ConnectionLifecycle, ResourceSnapshot, StatsPoller};
pub use media::{MediaCapture, MediaView};
pub use negotiation::NegotiationMode;
pub use peer::{EventSender, PeerEvent, PeerFactory, PeerTransport, SessionEvent, SideChannel, SignalingEvent};
pub use playback::{FrameCounters, PlaybackMeter, PlaybackSample, SharedMeter};
pub use session::{Role, Session};
pub use signaling::{NegotiationState, SignalingLink};
pub use sinks::{SessionObserver, ViewerSinks};
pub use types::{IceCandidate, MediaStream, MediaTrack, SessionDescription, StatsReport, TrackKind};

/// Initialize logging for the viewer
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "rtc_viewer=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        webrtc_backend: cfg!(feature = "webrtc"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Whether the webrtc-rs peer transport is compiled in
    pub webrtc_backend: bool,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "rtc-viewer");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
        assert_eq!(info.webrtc_backend, cfg!(feature = "webrtc"));
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging();
        init_logging();
        assert!(std::env::var("RUST_LOG").is_ok());
    }
}
