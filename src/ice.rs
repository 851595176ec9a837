//! ICE server and transport policy derivation.

use crate::config::ViewerConfig;
use serde::{Deserialize, Serialize};

/// Peer connection configuration handed to the peer factory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCConfiguration {
    pub ice_servers: Vec<IceServer>,
    pub ice_transport_policy: IceTransportPolicy,
    pub bundle_policy: BundlePolicy,
}

impl Default for RTCConfiguration {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            ice_transport_policy: IceTransportPolicy::All,
            bundle_policy: BundlePolicy::MaxBundle,
        }
    }
}

/// ICE server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn turn(urls: Vec<String>, username: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            urls,
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    /// True when every url of this entry is a TURN relay
    pub fn is_relay(&self) -> bool {
        !self.urls.is_empty() && self.urls.iter().all(|u| is_relay_url(u))
    }
}

fn is_relay_url(url: &str) -> bool {
    url.starts_with("turn:") || url.starts_with("turns:")
}

/// ICE transport policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceTransportPolicy {
    All,
    Relay,
}

/// Bundle policy for RTC connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundlePolicy {
    Balanced,
    MaxCompat,
    MaxBundle,
}

/// Regional STUN endpoint of the signaling service
pub fn regional_stun_url(region: &str) -> String {
    format!("stun:stun.kinesisvideo.{}.amazonaws.com:443", region)
}

/// Build the peer connection configuration for a viewer.
///
/// `relay_servers` are the TURN servers the channel lookup resolved; the lookup
/// itself happens outside this crate.
pub fn build_rtc_configuration(config: &ViewerConfig, relay_servers: &[IceServer]) -> RTCConfiguration {
    let network = &config.network;
    let mut ice_servers = Vec::new();

    if !network.nat_traversal_disabled && !network.force_turn {
        ice_servers.push(IceServer::stun(regional_stun_url(&config.channel.region)));
    }

    if !network.nat_traversal_disabled {
        for server in relay_servers {
            if network.force_turn {
                let urls: Vec<String> = server
                    .urls
                    .iter()
                    .filter(|u| is_relay_url(u))
                    .cloned()
                    .collect();
                if urls.is_empty() {
                    log::debug!("Dropping non-relay ICE server {:?} under force_turn", server.urls);
                    continue;
                }
                ice_servers.push(IceServer {
                    urls,
                    ..server.clone()
                });
            } else {
                ice_servers.push(server.clone());
            }
        }
    }

    log::info!("ICE servers: {:?}", ice_servers.iter().map(|s| &s.urls).collect::<Vec<_>>());

    RTCConfiguration {
        ice_servers,
        ice_transport_policy: if network.force_turn {
            IceTransportPolicy::Relay
        } else {
            IceTransportPolicy::All
        },
        bundle_policy: BundlePolicy::MaxBundle,
    }
}
