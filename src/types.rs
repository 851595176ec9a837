//! Value types exchanged between the negotiation core and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// SDP (Session Description Protocol) type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Number of `a=candidate` lines embedded in the description
    pub fn embedded_candidates(&self) -> usize {
        self.sdp
            .lines()
            .filter(|line| line.trim_start().starts_with("a=candidate:"))
            .count()
    }
}

/// ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single audio or video track.
///
/// Clones share the stopped flag, so stopping any clone stops the track for
/// every holder.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
    pub label: String,
    stopped: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A group of tracks sharing one stream id, local or remote.
#[derive(Debug, Clone)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    pub fn all_stopped(&self) -> bool {
        self.tracks.iter().all(MediaTrack::is_stopped)
    }
}

/// Peer connection state as surfaced by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Raw statistics snapshot; formatting is the sink's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    pub collected_at: DateTime<Utc>,
    pub entries: BTreeMap<String, serde_json::Value>,
}

impl StatsReport {
    pub fn new(entries: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            collected_at: Utc::now(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_clones_share_stop() {
        let track = MediaTrack::new("cam0", TrackKind::Video, "Front camera");
        let held = track.clone();
        track.stop();
        assert!(held.is_stopped());
    }

    #[test]
    fn test_stream_stop_all() {
        let stream = MediaStream::new(
            "local",
            vec![
                MediaTrack::new("a", TrackKind::Audio, "mic"),
                MediaTrack::new("v", TrackKind::Video, "cam"),
            ],
        );
        assert!(!stream.all_stopped());
        stream.stop_all();
        assert!(stream.all_stopped());
    }

    #[test]
    fn test_candidate_wire_names() {
        let json = serde_json::to_value(IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 9 typ host"))
            .unwrap();
        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
        assert!(json.get("usernameFragment").is_none());
    }

    #[test]
    fn test_embedded_candidates() {
        let desc = SessionDescription::offer(
            "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=candidate:1 1 udp 1 10.0.0.1 9 typ host\r\na=candidate:2 1 udp 1 10.0.0.2 9 typ host\r\n",
        );
        assert_eq!(desc.embedded_candidates(), 2);
        assert_eq!(SessionDescription::answer("v=0").embedded_candidates(), 0);
    }
}
