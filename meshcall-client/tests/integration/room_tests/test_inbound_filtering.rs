use meshcall_client::{ErrorKind, RoomEvent, SignalMessage};
use meshcall_core::{PeerId, RoomId};

use crate::integration::init_tracing;
use crate::utils::{MemoryRelay, SETTLE_TIMEOUT_MS, join_as, wait_for_snapshot};

#[tokio::test]
async fn test_self_and_foreign_messages_are_ignored() {
    init_tracing();

    let relay = MemoryRelay::new();
    let alice = join_as(&relay, "demo", "alice", "Alice").await.unwrap();
    let room = alice.room().clone();
    let me = alice.id().clone();

    let noise = [
        SignalMessage::join(room.clone(), me.clone(), Some("Echo".into())),
        SignalMessage::offer(room.clone(), me.clone(), me.clone(), "v=0".into(), None),
        SignalMessage::join(RoomId::from("elsewhere"), PeerId::from("bob"), None),
        SignalMessage::offer(
            room.clone(),
            PeerId::from("bob"),
            PeerId::from("carol"),
            "v=0".into(),
            None,
        ),
        SignalMessage::answer(room.clone(), PeerId::from("ghost"), me.clone(), "v=0".into()),
        SignalMessage::candidate(room.clone(), PeerId::from("ghost"), me.clone(), "c".into()),
    ];
    for msg in &noise {
        assert!(relay.inject(&room, &me, &msg.encode().unwrap()));
    }

    // Frames are handled in order, so once zoe shows up the noise has been seen.
    let zoe = PeerId::from("zoe");
    let join = SignalMessage::join(room.clone(), zoe.clone(), Some("Zoe".into()));
    relay.inject(&room, &me, &join.encode().unwrap());

    let snapshot = wait_for_snapshot(&alice.handle, SETTLE_TIMEOUT_MS, |s| {
        s.peer(&zoe).is_some()
    })
    .await
    .unwrap();

    assert_eq!(snapshot.peers.len(), 1);
    assert!(alice.factory.sessions().iter().all(|s| s.peer_id == zoe));
}

#[tokio::test]
async fn test_malformed_frames_are_reported_and_dropped() {
    init_tracing();

    let relay = MemoryRelay::new();
    let mut alice = join_as(&relay, "demo", "alice", "Alice").await.unwrap();
    let room = alice.room().clone();
    let me = alice.id().clone();

    relay.inject(&room, &me, "not json");
    let event = alice
        .next_event_matching(|e| matches!(e, RoomEvent::Error { .. }))
        .await
        .unwrap();
    assert!(matches!(
        event,
        RoomEvent::Error {
            kind: ErrorKind::MalformedMessage,
            ..
        }
    ));

    relay.inject(
        &room,
        &me,
        r#"{"kind":"offer","room":"demo","from":"bob","to":"alice"}"#,
    );
    let event = alice
        .next_event_matching(|e| matches!(e, RoomEvent::Error { .. }))
        .await
        .unwrap();
    let RoomEvent::Error { kind, message } = event else {
        unreachable!();
    };
    assert_eq!(kind, ErrorKind::MalformedMessage);
    assert!(message.contains("payload"));

    let snapshot = alice.handle.snapshot().await.unwrap();
    assert!(snapshot.peers.is_empty());
    assert_eq!(snapshot.status, "Connected (alone)");
    assert!(alice.handle.is_active());
}
