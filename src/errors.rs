use thiserror::Error;

/// Coarse classification of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DeviceUnavailable,
    SignalingLinkError,
    OutOfOrderMessage,
    SideChannelSendFailure,
    Transport,
    InvalidConfig,
    AlreadyActive,
    SessionClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Signaling link error: {0}")]
    SignalingLink(String),
    #[error("Out of order message: {0}")]
    OutOfOrderMessage(String),
    #[error("Side channel send failure: {0}")]
    SideChannelSend(String),
    #[error("Peer transport error: {0}")]
    Transport(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Viewer session already active: {0}")]
    AlreadyActive(String),
    #[error("Session is closed")]
    SessionClosed,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            SessionError::SignalingLink(_) => ErrorKind::SignalingLinkError,
            SessionError::OutOfOrderMessage(_) => ErrorKind::OutOfOrderMessage,
            SessionError::SideChannelSend(_) => ErrorKind::SideChannelSendFailure,
            SessionError::Transport(_) => ErrorKind::Transport,
            SessionError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            SessionError::AlreadyActive(_) => ErrorKind::AlreadyActive,
            SessionError::SessionClosed => ErrorKind::SessionClosed,
        }
    }

    /// Only a capture failure during setup aborts negotiation; everything else is
    /// reported and the session carries on.
    pub fn aborts_negotiation(&self) -> bool {
        matches!(self, SessionError::DeviceUnavailable(_))
    }

    pub fn transport(context: &str, err: impl std::fmt::Display) -> Self {
        SessionError::Transport(format!("{}: {}", context, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            SessionError::DeviceUnavailable("no camera".into()).kind(),
            ErrorKind::DeviceUnavailable
        );
        assert_eq!(
            SessionError::SignalingLink("reset".into()).kind(),
            ErrorKind::SignalingLinkError
        );
        assert_eq!(SessionError::SessionClosed.kind(), ErrorKind::SessionClosed);
    }

    #[test]
    fn test_only_device_failure_aborts() {
        assert!(SessionError::DeviceUnavailable("x".into()).aborts_negotiation());
        assert!(!SessionError::OutOfOrderMessage("x".into()).aborts_negotiation());
        assert!(!SessionError::SideChannelSend("x".into()).aborts_negotiation());
    }

    #[test]
    fn test_transport_helper_formats_context() {
        let err = SessionError::transport("Failed to create offer", "ice agent closed");
        assert_eq!(
            err.to_string(),
            "Peer transport error: Failed to create offer: ice agent closed"
        );
    }
}
