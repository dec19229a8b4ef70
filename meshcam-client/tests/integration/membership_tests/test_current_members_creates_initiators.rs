use meshcam_client::{NegotiationRole, NegotiationState, PeerId, SignalMessage};

use crate::integration::{create_joined_session, create_settled_session, init_tracing};
use crate::utils::{SIGNAL_TIMEOUT_MS, settle, wait_for_view};

#[tokio::test]
async fn test_current_members_creates_initiators() {
    init_tracing();

    let session = create_joined_session("peer-m").await;
    let members: Vec<PeerId> = ["peer-a", "peer-b", "peer-c"]
        .into_iter()
        .map(PeerId::from)
        .collect();

    session
        .deliver(SignalMessage::CurrentMembers {
            peers: members.clone(),
        })
        .await;

    let view = wait_for_view(
        &session.handle,
        |view| {
            view.peers.len() == 3
                && view
                    .peers
                    .iter()
                    .all(|p| p.negotiation == NegotiationState::OfferSent)
        },
        SIGNAL_TIMEOUT_MS,
    )
    .await
    .expect("Links never reached offer-sent");

    for member in &members {
        let status = view.peer(member).expect("Missing link");
        assert_eq!(status.role, NegotiationRole::Initiator);
        assert_eq!(session.signaling.offers_to(member).await.len(), 1);
    }
    assert_eq!(session.connector.connection_count().await, 3);
}

#[tokio::test]
async fn test_current_members_skips_self_and_known_peers() {
    init_tracing();

    let session = create_joined_session("peer-m").await;
    let peer_a = PeerId::from("peer-a");

    session
        .deliver(SignalMessage::CurrentMembers {
            peers: vec![peer_a.clone(), session.local_peer.clone(), peer_a.clone()],
        })
        .await;
    wait_for_view(&session.handle, |view| view.peers.len() == 1, SIGNAL_TIMEOUT_MS)
        .await
        .expect("Link to peer-a never created");
    settle().await;

    assert_eq!(session.connector.connection_count().await, 1);
    assert_eq!(session.handle.view().peers.len(), 1);
    assert!(session.handle.view().peer(&session.local_peer).is_none());
}

#[tokio::test]
async fn test_unrequested_member_list_is_ignored() {
    init_tracing();

    let session = create_settled_session("peer-m").await;

    session
        .deliver_members(vec![PeerId::from("peer-a")])
        .await;
    settle().await;

    assert!(session.handle.view().peers.is_empty());
    assert_eq!(session.connector.connection_count().await, 0);
}
