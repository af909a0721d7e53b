use meshcall_client::RoomEvent;
use std::collections::HashSet;

use crate::integration::init_tracing;
use crate::utils::{MemoryRelay, SETTLE_TIMEOUT_MS, join_as, wait_for_event};

#[tokio::test]
async fn test_three_participants_learn_display_names() {
    init_tracing();

    let relay = MemoryRelay::new();
    let alice = join_as(&relay, "standup", "alice", "Alice").await.unwrap();
    let bob = join_as(&relay, "standup", "bob", "Bob").await.unwrap();
    alice.wait_connected(1).await.unwrap();
    let mut carol = join_as(&relay, "standup", "carol", "Carol").await.unwrap();

    alice.wait_connected(2).await.unwrap();
    bob.wait_connected(2).await.unwrap();
    let snapshot = carol.wait_connected(2).await.unwrap();

    assert_eq!(
        snapshot.peer(alice.id()).unwrap().display_name.as_deref(),
        Some("Alice")
    );
    assert_eq!(
        snapshot.peer(bob.id()).unwrap().display_name.as_deref(),
        Some("Bob")
    );
    assert_eq!(snapshot.status, "Connected (2 peers)");

    let mut announced = HashSet::new();
    while announced.len() < 2 {
        let event = wait_for_event(&mut carol.events, SETTLE_TIMEOUT_MS, |e| {
            matches!(e, RoomEvent::PeerVideoAvailable { .. })
        })
        .await
        .unwrap();
        if let RoomEvent::PeerVideoAvailable { display_name, .. } = event {
            assert!(announced.insert(display_name), "announced twice");
        }
    }
    assert_eq!(
        announced,
        HashSet::from(["Alice".to_string(), "Bob".to_string()])
    );

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
    carol.handle.leave().await.unwrap();
}
