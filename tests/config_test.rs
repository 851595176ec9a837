use rtc_viewer::config::{Resolution, ViewerConfig};
use rtc_viewer::errors::ErrorKind;
use rtc_viewer::ice::{build_rtc_configuration, regional_stun_url, IceServer, IceTransportPolicy};
use rtc_viewer::negotiation::{self, NegotiationMode};
use tempfile::tempdir;

fn named() -> ViewerConfig {
    let mut config = ViewerConfig::default();
    config.channel.channel_name = "lobby".to_string();
    config.channel.region = "eu-central-1".to_string();
    config
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("rtc-viewer.toml");

    let mut config = named();
    config.network.use_trickle_ice = false;
    config.media.widescreen = false;
    config.stats.poll_interval_ms = 250;
    config.save_to_file(&path).unwrap();

    let loaded = ViewerConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(negotiation::mode(&loaded), NegotiationMode::Batched);
    assert_eq!(loaded.media_constraints().video, Some(Resolution::STANDARD));
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let loaded = ViewerConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded.channel.region, "us-west-2");
    assert_eq!(loaded.stats.poll_interval_ms, 1000);
    assert!(loaded.network.use_trickle_ice);
}

#[test]
fn test_malformed_file_is_invalid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[channel\nregion = ").unwrap();

    let err = ViewerConfig::load_from_file(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[test]
fn test_hand_written_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("viewer.toml");
    std::fs::write(
        &path,
        r#"
[channel]
region = "ap-northeast-1"
channel_name = "warehouse"
client_id = "CLIENT0001"

[media]
send_video = false
send_audio = false
widescreen = true
open_data_channel = true

[network]
use_trickle_ice = true
force_turn = true
nat_traversal_disabled = false

[stats]
poll_interval_ms = 500
"#,
    )
    .unwrap();

    let config = ViewerConfig::load_from_file(&path).unwrap();
    assert!(config.validate().is_ok());
    assert!(config.media_constraints().requests_nothing());

    let relay = IceServer::turn(vec!["turns:relay.example.com:443".to_string()], "u", "p");
    let rtc = build_rtc_configuration(&config, &[relay]);
    assert_eq!(rtc.ice_transport_policy, IceTransportPolicy::Relay);
    assert!(rtc
        .ice_servers
        .iter()
        .all(|s| !s.urls.contains(&regional_stun_url("ap-northeast-1"))));
}
