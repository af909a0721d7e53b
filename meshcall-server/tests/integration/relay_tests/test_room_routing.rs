use meshcall_core::{PeerId, RoomId, SignalKind, SignalMessage};

use crate::integration::init_tracing;
use crate::utils::{QUIET_PERIOD_MS, RELAY_TIMEOUT_MS, connect_raw, recv_signal, send_signal, start_relay};

fn join(room: &str, from: &str) -> SignalMessage {
    SignalMessage::join(RoomId::from(room), PeerId::from(from), Some(from.to_uppercase()))
}

#[tokio::test]
async fn test_join_is_broadcast_within_room_only() {
    init_tracing();

    let relay = start_relay().await.unwrap();
    let mut alice = connect_raw(relay.addr, Some("demo")).await.unwrap();
    let mut bob = connect_raw(relay.addr, Some("demo")).await.unwrap();
    let mut carol = connect_raw(relay.addr, Some("other")).await.unwrap();

    send_signal(&mut alice, &join("demo", "alice")).await.unwrap();
    send_signal(&mut carol, &join("other", "carol")).await.unwrap();
    relay.wait_for_members("demo", 1).await.unwrap();
    relay.wait_for_members("other", 1).await.unwrap();

    send_signal(&mut bob, &join("demo", "bob")).await.unwrap();

    let received = recv_signal(&mut alice, RELAY_TIMEOUT_MS)
        .await
        .expect("alice hears bob");
    assert_eq!(received, join("demo", "bob"));

    assert!(recv_signal(&mut bob, QUIET_PERIOD_MS).await.is_none(), "no echo to sender");
    assert!(recv_signal(&mut carol, QUIET_PERIOD_MS).await.is_none(), "other rooms stay quiet");
}

#[tokio::test]
async fn test_directed_signal_reaches_only_target() {
    init_tracing();

    let relay = start_relay().await.unwrap();
    let mut alice = connect_raw(relay.addr, Some("demo")).await.unwrap();
    let mut bob = connect_raw(relay.addr, Some("demo")).await.unwrap();
    let mut carol = connect_raw(relay.addr, Some("demo")).await.unwrap();

    send_signal(&mut alice, &join("demo", "alice")).await.unwrap();
    relay.wait_for_members("demo", 1).await.unwrap();
    send_signal(&mut bob, &join("demo", "bob")).await.unwrap();
    relay.wait_for_members("demo", 2).await.unwrap();
    send_signal(&mut carol, &join("demo", "carol")).await.unwrap();
    relay.wait_for_members("demo", 3).await.unwrap();

    // Drain the join broadcasts.
    assert_eq!(recv_signal(&mut alice, RELAY_TIMEOUT_MS).await, Some(join("demo", "bob")));
    assert_eq!(recv_signal(&mut alice, RELAY_TIMEOUT_MS).await, Some(join("demo", "carol")));
    assert_eq!(recv_signal(&mut bob, RELAY_TIMEOUT_MS).await, Some(join("demo", "carol")));

    let offer = SignalMessage::offer(
        RoomId::from("demo"),
        PeerId::from("alice"),
        PeerId::from("carol"),
        "v=0".to_string(),
        Some("ALICE".to_string()),
    );
    send_signal(&mut alice, &offer).await.unwrap();

    let received = recv_signal(&mut carol, RELAY_TIMEOUT_MS)
        .await
        .expect("carol gets the offer");
    assert_eq!(received.kind(), SignalKind::Offer);
    assert_eq!(received, offer);
    assert!(recv_signal(&mut bob, QUIET_PERIOD_MS).await.is_none());
}
