use meshcall_client::{ConnectionState, NegotiationError, NegotiationState, PeerCommand};
use meshcall_client::{MediaEvent, SignalBody};
use meshcall_core::PeerId;

use crate::integration::init_tracing;
use crate::integration::negotiation_tests::open_engine;
use crate::utils::MockMediaFactory;

#[tokio::test]
async fn test_answer_while_idle_is_rejected() {
    init_tracing();

    let factory = MockMediaFactory::manual();
    let (mut engine, _rx) = open_engine("alice", "bob", &factory).await;

    let err = engine
        .on_answer_received("v=0".to_string())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NegotiationError::InvalidState {
            state: NegotiationState::Idle,
            ..
        }
    ));
    assert!(!err.is_fatal());
    assert_eq!(engine.state(), NegotiationState::Idle);
}

#[tokio::test]
async fn test_second_offer_is_rejected() {
    let factory = MockMediaFactory::manual();
    let (mut engine, _rx) = open_engine("alice", "bob", &factory).await;

    engine.initiate_offer().await.expect("first offer");
    let err = engine.initiate_offer().await.unwrap_err();
    assert!(matches!(err, NegotiationError::InvalidState { .. }));
    assert_eq!(engine.state(), NegotiationState::OfferSent);

    let session = factory.latest_for(&PeerId::from("bob")).unwrap();
    assert_eq!(session.calls(), vec!["create_offer"]);
}

#[tokio::test]
async fn test_duplicate_offer_is_rejected() {
    let factory = MockMediaFactory::manual();
    let (mut engine, _rx) = open_engine("alice", "bob", &factory).await;

    engine
        .on_offer_received("v=0".to_string())
        .await
        .expect("first offer accepted");
    let err = engine
        .on_offer_received("v=0".to_string())
        .await
        .unwrap_err();

    assert!(!err.is_fatal());
    assert_eq!(engine.state(), NegotiationState::AnswerSent);
    let session = factory.latest_for(&PeerId::from("bob")).unwrap();
    assert_eq!(session.calls(), vec!["set_remote:offer", "create_answer"]);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let factory = MockMediaFactory::manual();
    let (mut engine, _rx) = open_engine("alice", "bob", &factory).await;
    let session = factory.latest_for(&PeerId::from("bob")).unwrap();

    engine.close().await;
    engine.close().await;
    engine.on_connection_state(ConnectionState::Closed).await;

    assert_eq!(engine.state(), NegotiationState::Closed);
    assert_eq!(session.close_count(), 1);
    assert!(engine.initiate_offer().await.is_err());
}

#[tokio::test]
async fn test_media_failure_closes_engine() {
    let factory = MockMediaFactory::manual();
    let (mut engine, _rx) = open_engine("alice", "bob", &factory).await;
    let session = factory.latest_for(&PeerId::from("bob")).unwrap();

    engine.initiate_offer().await.expect("offer");
    engine
        .on_connection_state(ConnectionState::Disconnected)
        .await;
    assert_eq!(engine.state(), NegotiationState::OfferSent);

    engine.on_connection_state(ConnectionState::Failed).await;
    assert_eq!(engine.state(), NegotiationState::Closed);
    assert_eq!(session.close_count(), 1);
}

#[tokio::test]
async fn test_connected_before_answer_is_informational() {
    let factory = MockMediaFactory::manual();
    let (mut engine, _rx) = open_engine("alice", "bob", &factory).await;

    engine.initiate_offer().await.expect("offer");
    engine.on_connection_state(ConnectionState::Connected).await;
    assert_eq!(engine.state(), NegotiationState::OfferSent);
}

#[tokio::test]
async fn test_answer_failure_is_fatal() {
    let factory = MockMediaFactory::failing_answers();
    let (mut engine, _rx) = open_engine("alice", "bob", &factory).await;

    let err = engine
        .on_offer_received("v=0".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, NegotiationError::Media(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_session_events_reach_the_mailbox() {
    let factory = MockMediaFactory::manual();
    let (mut engine, mut rx) = open_engine("alice", "bob", &factory).await;

    let offer = engine.initiate_offer().await.expect("offer");
    assert!(matches!(offer.body, SignalBody::Offer { display_name: Some(ref n), .. } if n == "ALICE"));

    let session = factory.latest_for(&PeerId::from("bob")).unwrap();
    assert!(session.emit_state(ConnectionState::Connecting));

    let mut seen = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
        seen.push(cmd);
    }
    assert!(matches!(
        seen.as_slice(),
        [
            PeerCommand::Media {
                generation: 0,
                event: MediaEvent::LocalCandidate(_)
            },
            PeerCommand::Media {
                generation: 0,
                event: MediaEvent::ConnectionState(ConnectionState::Connecting)
            },
        ]
    ));
}
