//! Property-based tests for negotiation ordering
//!
//! Candidates, the link opening and gathering completion are interleaved in
//! arbitrary orders; what reaches the signaling link must not depend on it.

use proptest::prelude::*;
use rtc_viewer::negotiation::CandidateBuffer;
use rtc_viewer::peer::SignalingEvent;
use rtc_viewer::testing::{SessionRig, Transmission};
use rtc_viewer::types::IceCandidate;
use rtc_viewer::ViewerConfig;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn candidate(i: usize) -> String {
    format!("candidate:{} 1 udp 2122260223 10.0.{}.1 50000 typ host", i, i)
}

/// Gather `count` candidates with the link reporting open before the
/// `open_at`-th one, optionally ending with gathering completion.
async fn interleave(rig: &mut SessionRig, count: usize, open_at: usize, complete: bool) {
    assert!(rig.open().await.is_ok());
    for i in 0..count {
        if i == open_at {
            rig.link.emit(SignalingEvent::Open);
        }
        rig.peer.gather(&candidate(i));
    }
    if open_at >= count {
        rig.link.emit(SignalingEvent::Open);
    }
    if complete {
        rig.peer.complete_gathering();
    }
    rig.pump().await;
}

proptest! {
    /// The offer is the first thing sent, and every candidate follows it once, in order
    #[test]
    fn incremental_offer_precedes_every_candidate(
        count in 0usize..12,
        open_at in 0usize..13,
        complete in any::<bool>(),
    ) {
        runtime().block_on(async {
            let mut rig = SessionRig::new(ViewerConfig::default());
            interleave(&mut rig, count, open_at, complete).await;

            let transmissions = rig.link.transmissions();
            prop_assert!(matches!(transmissions.first(), Some(Transmission::Offer(_))));
            prop_assert_eq!(rig.link.offers().len(), 1);

            let sent: Vec<String> = rig.link.candidates().into_iter().map(|c| c.candidate).collect();
            let expected: Vec<String> = (0..count).map(candidate).collect();
            prop_assert_eq!(sent, expected);
            Ok(())
        })?;
    }

    /// Batched negotiation sends exactly one offer and no individual candidates
    #[test]
    fn batched_sends_single_offer_with_embedded_candidates(
        count in 0usize..12,
        open_at in 0usize..13,
    ) {
        runtime().block_on(async {
            let mut config = ViewerConfig::default();
            config.network.use_trickle_ice = false;
            let mut rig = SessionRig::new(config);
            interleave(&mut rig, count, open_at, true).await;

            let offers = rig.link.offers();
            prop_assert_eq!(offers.len(), 1);
            prop_assert_eq!(offers[0].embedded_candidates(), count);
            prop_assert!(rig.link.candidates().is_empty());
            Ok(())
        })?;
    }

    /// Releasing from any point of the handshake leaves nothing held, however often it runs
    #[test]
    fn release_is_idempotent_from_any_point(
        count in 0usize..6,
        open_at in 0usize..7,
        complete in any::<bool>(),
        releases in 1usize..4,
    ) {
        runtime().block_on(async {
            let mut rig = SessionRig::new(ViewerConfig::default());
            interleave(&mut rig, count, open_at, complete).await;

            rig.session.release().await;
            let first = rig.session.resources();
            for _ in 1..releases {
                rig.session.release().await;
            }
            prop_assert!(first.is_released());
            prop_assert_eq!(rig.session.resources(), first);
            prop_assert_eq!(rig.link.close_count(), 1);
            Ok(())
        })?;
    }

    /// The buffer hands out everything once, in insertion order
    #[test]
    fn buffer_drains_once_in_order(
        before in proptest::collection::vec("[a-z0-9]{1,8}", 0..16),
        after in proptest::collection::vec("[a-z0-9]{1,8}", 0..4),
    ) {
        let mut buffer = CandidateBuffer::new();
        for c in &before {
            prop_assert!(buffer.add(IceCandidate::new(c.clone())));
        }
        let drained: Vec<String> = buffer.drain_all().into_iter().map(|c| c.candidate).collect();
        prop_assert_eq!(drained, before);

        for c in &after {
            prop_assert!(!buffer.add(IceCandidate::new(c.clone())));
        }
        prop_assert!(buffer.drain_all().is_empty());
    }
}
