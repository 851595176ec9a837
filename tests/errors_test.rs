#[cfg(test)]
mod error_tests {
    use rtc_viewer::errors::{ErrorKind, SessionError};
    use std::error::Error;

    #[test]
    fn test_device_unavailable() {
        let error = SessionError::DeviceUnavailable("No camera found".to_string());
        assert!(error.to_string().contains("Device unavailable"));
        assert!(error.to_string().contains("No camera found"));
        assert!(error.aborts_negotiation());
    }

    #[test]
    fn test_signaling_link_error_is_not_fatal() {
        let error = SessionError::SignalingLink("socket reset".to_string());
        assert_eq!(error.kind(), ErrorKind::SignalingLinkError);
        assert!(!error.aborts_negotiation());
    }

    #[test]
    fn test_transport_context() {
        let error = SessionError::transport("Failed to create offer", "ice agent closed");
        assert_eq!(error.kind(), ErrorKind::Transport);
        assert_eq!(
            error.to_string(),
            "Peer transport error: Failed to create offer: ice agent closed"
        );
    }

    #[test]
    fn test_session_error_debug_format() {
        let error = SessionError::OutOfOrderMessage("answer before offer".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("OutOfOrderMessage"));
        assert!(debug_str.contains("answer before offer"));
    }

    #[test]
    fn test_session_error_is_std_error() {
        let error = SessionError::SideChannelSend("closed".to_string());
        let boxed: Box<dyn Error> = Box::new(error.clone());
        assert!(boxed.source().is_none());
        assert_eq!(boxed.to_string(), error.to_string());
    }

    #[test]
    fn test_every_kind_is_distinct() {
        let errors = [
            SessionError::DeviceUnavailable(String::new()),
            SessionError::SignalingLink(String::new()),
            SessionError::OutOfOrderMessage(String::new()),
            SessionError::SideChannelSend(String::new()),
            SessionError::Transport(String::new()),
            SessionError::InvalidConfig(String::new()),
            SessionError::AlreadyActive(String::new()),
            SessionError::SessionClosed,
        ];
        let kinds: std::collections::HashSet<ErrorKind> = errors.iter().map(SessionError::kind).collect();
        assert_eq!(kinds.len(), errors.len());
        assert_eq!(
            errors.iter().filter(|e| e.aborts_negotiation()).count(),
            1
        );
    }
}
