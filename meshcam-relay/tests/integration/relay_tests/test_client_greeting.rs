use crate::integration::{init_tracing, start_test_relay};
use crate::utils::TestClient;

#[tokio::test]
async fn test_client_greeting() {
    init_tracing();

    let addr = start_test_relay().await;

    let alice = TestClient::connect(addr).await.expect("Alice failed to connect");
    let bob = TestClient::connect(addr).await.expect("Bob failed to connect");

    assert!(!alice.peer_id.as_str().is_empty());
    assert_ne!(alice.peer_id, bob.peer_id, "Identities must be unique");
    assert_eq!(alice.ice_servers.len(), 1);
    assert_eq!(alice.ice_servers[0].urls, ["stun:stun.test:3478"]);

    alice.close().await.unwrap();
    bob.close().await.unwrap();
}
