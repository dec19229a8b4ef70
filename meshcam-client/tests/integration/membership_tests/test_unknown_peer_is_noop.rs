use meshcam_client::{IceCandidate, PeerId, SignalMessage};

use crate::integration::{create_joined_session, create_settled_session, init_tracing};
use crate::utils::{SIGNAL_TIMEOUT_MS, settle, wait_for_view};

#[tokio::test]
async fn test_peer_left_for_unknown_peer_is_noop() {
    init_tracing();

    let session = create_joined_session("peer-b").await;
    let peer_a = PeerId::from("peer-a");

    session
        .deliver(SignalMessage::CurrentMembers {
            peers: vec![peer_a.clone()],
        })
        .await;
    wait_for_view(&session.handle, |view| view.peers.len() == 1, SIGNAL_TIMEOUT_MS)
        .await
        .expect("Link never created");

    session
        .deliver(SignalMessage::PeerLeft {
            peer_id: PeerId::from("peer-unknown"),
        })
        .await;
    settle().await;

    let view = session.handle.view();
    assert_eq!(view.peers.len(), 1);
    assert!(view.peer(&peer_a).is_some());

    let conn = session
        .connector
        .wait_for_connection(&peer_a, SIGNAL_TIMEOUT_MS)
        .await
        .unwrap();
    assert!(!conn.is_closed().await);
}

#[tokio::test]
async fn test_answer_for_unknown_peer_is_noop() {
    init_tracing();

    let session = create_settled_session("peer-b").await;

    session
        .deliver(SignalMessage::Answer {
            peer_id: PeerId::from("peer-unknown"),
            sdp: "answer".to_owned(),
        })
        .await;
    settle().await;

    assert!(session.handle.view().peers.is_empty());
    assert_eq!(session.connector.connection_count().await, 0);
}

#[tokio::test]
async fn test_signals_outside_room_are_dropped() {
    init_tracing();

    let session = crate::integration::create_test_session("peer-b").await;
    let peer_a = PeerId::from("peer-a");

    session
        .deliver(SignalMessage::IceCandidate {
            peer_id: peer_a.clone(),
            candidate: IceCandidate::new("candidate:1"),
        })
        .await;
    session
        .deliver(SignalMessage::Offer {
            peer_id: peer_a.clone(),
            sdp: "offer".to_owned(),
        })
        .await;
    settle().await;

    assert!(session.handle.view().peers.is_empty());
    assert_eq!(session.connector.connection_count().await, 0);
}
