/// webrtc-rs backed peer transport
///
/// Implements the peer contracts on top of a real `RTCPeerConnection` for
/// applications that do not bring their own media stack.
pub mod peer;

pub use peer::{WebRtcPeer, WebRtcPeerFactory, WebRtcSideChannel};
