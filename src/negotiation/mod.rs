//! Outbound side of the handshake: when offers and candidates leave.

pub mod buffer;
pub mod driver;

pub use buffer::CandidateBuffer;
pub use driver::{DriverOutcome, OutboundDriver};

use crate::config::ViewerConfig;
use serde::{Deserialize, Serialize};

/// How local candidates reach the master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationMode {
    /// Offer sent on creation, candidates streamed as generated (trickle ICE)
    Incremental,
    /// Offer withheld until gathering completes, candidates embedded in it
    Batched,
}

impl NegotiationMode {
    pub fn sends_offer_on_creation(self) -> bool {
        self == NegotiationMode::Incremental
    }

    pub fn streams_candidates(self) -> bool {
        self == NegotiationMode::Incremental
    }
}

/// Select the negotiation mode for a configuration
pub fn mode(config: &ViewerConfig) -> NegotiationMode {
    if config.network.use_trickle_ice {
        NegotiationMode::Incremental
    } else {
        NegotiationMode::Batched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_follows_trickle_flag() {
        let mut config = ViewerConfig::default();
        assert_eq!(mode(&config), NegotiationMode::Incremental);
        config.network.use_trickle_ice = false;
        assert_eq!(mode(&config), NegotiationMode::Batched);
    }

    #[test]
    fn test_mode_behaviour_flags() {
        assert!(NegotiationMode::Incremental.sends_offer_on_creation());
        assert!(NegotiationMode::Incremental.streams_candidates());
        assert!(!NegotiationMode::Batched.sends_offer_on_creation());
        assert!(!NegotiationMode::Batched.streams_candidates());
    }
}
