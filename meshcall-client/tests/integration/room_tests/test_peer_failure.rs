use meshcall_client::{ConnectionState, ErrorKind, RoomEvent, SignalMessage};

use crate::integration::init_tracing;
use crate::utils::{
    MemoryRelay, MockMediaFactory, SETTLE_TIMEOUT_MS, drain_events, join_as, join_with,
    wait_for_event, wait_for_snapshot, wait_until,
};

#[tokio::test]
async fn test_failed_peer_is_removed() {
    init_tracing();

    let relay = MemoryRelay::new();
    let mut alice = join_as(&relay, "demo", "alice", "Alice").await.unwrap();
    let mut bob = join_as(&relay, "demo", "bob", "Bob").await.unwrap();
    let bob_id = bob.id().clone();

    let a = alice.wait_connected(1).await.unwrap();
    let b = bob.wait_connected(1).await.unwrap();
    assert_eq!(a.status, "Connected (1 peer)");
    assert_eq!(b.status, "Connected (1 peer)");
    assert_eq!(b.peer(alice.id()).unwrap().display_name.as_deref(), Some("Alice"));

    let video = alice
        .next_event_matching(|e| matches!(e, RoomEvent::PeerVideoAvailable { .. }))
        .await
        .unwrap();
    let RoomEvent::PeerVideoAvailable {
        peer_id,
        display_name,
        media,
    } = video
    else {
        unreachable!();
    };
    assert_eq!(peer_id, bob_id);
    assert_eq!(display_name, "Bob");
    assert_eq!(media.stream_id, bob_id.to_string());

    let video = bob
        .next_event_matching(|e| matches!(e, RoomEvent::PeerVideoAvailable { .. }))
        .await
        .unwrap();
    assert!(matches!(video, RoomEvent::PeerVideoAvailable { ref display_name, .. } if display_name == "Alice"));

    let session = alice.factory.latest_for(&bob_id).unwrap();
    assert!(session.emit_state(ConnectionState::Failed));

    let mut after_failure = Vec::new();
    loop {
        let event = wait_for_event(&mut alice.events, SETTLE_TIMEOUT_MS, |_| true)
            .await
            .unwrap();
        let removed = matches!(event, RoomEvent::PeerRemoved(ref id) if *id == bob_id);
        after_failure.push(event);
        if removed {
            break;
        }
    }
    assert!(
        !after_failure
            .iter()
            .any(|e| matches!(e, RoomEvent::PeerVideoAvailable { .. })),
        "video is announced once per peer"
    );

    let snapshot = wait_for_snapshot(&alice.handle, SETTLE_TIMEOUT_MS, |s| s.peers.is_empty())
        .await
        .unwrap();
    assert_eq!(snapshot.status, "Connected (alone)");
    wait_until(SETTLE_TIMEOUT_MS, || session.close_count() == 1)
        .await
        .unwrap();

    // Bob is unknown to alice now; his late candidates go nowhere.
    let late = SignalMessage::candidate(
        alice.room().clone(),
        bob_id.clone(),
        alice.id().clone(),
        "candidate:late".into(),
    );
    let candidates_before = session.candidates().len();
    relay.inject(alice.room(), alice.id(), &late.encode().unwrap());
    relay.inject(alice.room(), alice.id(), "barrier");
    alice
        .next_event_matching(|e| {
            matches!(
                e,
                RoomEvent::Error {
                    kind: ErrorKind::MalformedMessage,
                    ..
                }
            )
        })
        .await
        .unwrap();

    assert_eq!(session.candidates().len(), candidates_before);
    assert_eq!(session.close_count(), 1);
    assert_eq!(alice.factory.sessions_for(&bob_id).len(), 1);
    assert!(alice.handle.snapshot().await.unwrap().peers.is_empty());
}

#[tokio::test]
async fn test_media_error_isolates_one_peer() {
    init_tracing();

    let relay = MemoryRelay::new();
    let alice = join_as(&relay, "demo", "alice", "Alice").await.unwrap();
    let mut bob = join_with(
        &relay,
        "demo",
        "bob",
        "Bob",
        MockMediaFactory::failing_answers(),
    )
    .await
    .unwrap();

    let error = bob
        .next_event_matching(|e| matches!(e, RoomEvent::Error { .. }))
        .await
        .unwrap();
    assert!(matches!(
        error,
        RoomEvent::Error {
            kind: ErrorKind::Negotiation,
            ..
        }
    ));
    let removed = bob
        .next_event_matching(|e| matches!(e, RoomEvent::PeerRemoved(_)))
        .await
        .unwrap();
    assert!(matches!(removed, RoomEvent::PeerRemoved(ref id) if id == alice.id()));

    let snapshot = bob.handle.snapshot().await.unwrap();
    assert!(snapshot.peers.is_empty());
    assert_eq!(snapshot.status, "Connected (alone)");
    assert!(bob.handle.is_active());

    let session = bob.factory.latest_for(alice.id()).unwrap();
    wait_until(SETTLE_TIMEOUT_MS, || session.close_count() == 1)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_session_creation_failure_removes_peer() {
    init_tracing();

    let relay = MemoryRelay::new();
    let alice = join_as(&relay, "demo", "alice", "Alice").await.unwrap();
    let factory = MockMediaFactory::new();
    factory.refuse(alice.id());
    let mut bob = join_with(&relay, "demo", "bob", "Bob", factory)
        .await
        .unwrap();

    let error = bob
        .next_event_matching(|e| matches!(e, RoomEvent::Error { .. }))
        .await
        .unwrap();
    let RoomEvent::Error { kind, message } = error else {
        unreachable!();
    };
    assert_eq!(kind, ErrorKind::Negotiation);
    assert!(message.starts_with("alice"), "unexpected message: {}", message);

    let removed = bob
        .next_event_matching(|e| matches!(e, RoomEvent::PeerRemoved(_)))
        .await
        .unwrap();
    assert!(matches!(removed, RoomEvent::PeerRemoved(ref id) if id == alice.id()));

    let snapshot = wait_for_snapshot(&bob.handle, SETTLE_TIMEOUT_MS, |s| s.peers.is_empty())
        .await
        .unwrap();
    assert_eq!(snapshot.status, "Connected (alone)");
    assert!(bob.handle.is_active());
    assert!(bob.factory.sessions_for(alice.id()).is_empty());
    assert!(
        !drain_events(&mut bob.events)
            .iter()
            .any(|e| matches!(e, RoomEvent::PeerVideoAvailable { .. }))
    );
}
