//! Integration tests for binding, publishing and subscribing, run against
//! the in-memory broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use peril_broker::{
    BrokerError, Channel, Connection, Consumer, Delivery, ExchangeKind, MemoryBroker,
    MemoryConnection,
};
use peril_protocol::routing::{
    EXCHANGE_PERIL_DEAD_LETTER, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC, PAUSE_KEY,
    QUEUE_PERIL_DEAD_LETTER,
};
use peril_protocol::{GameLog, JsonCodec, PlayingState};
use peril_pubsub::{
    AckType, PubSubError, QueueDurability, declare_and_bind, declare_topology, publish,
    publish_bincode, publish_json, subscribe, subscribe_bincode, subscribe_json,
};
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

async fn setup() -> (MemoryBroker, MemoryConnection) {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    declare_topology(&conn).await.unwrap();
    (broker, conn)
}

/// Polls `check` until it holds or one second passes.
async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 1s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("handler should be called")
        .expect("sender alive")
}

/// Handler that forwards every value to a channel and acks.
fn forward<T: Send + 'static>(
    tx: mpsc::UnboundedSender<T>,
) -> impl Fn(T) -> std::future::Ready<AckType> + Send + Sync + 'static {
    move |value| {
        let _ = tx.send(value);
        std::future::ready(AckType::Ack)
    }
}

// =========================================================================
// Topology and binder
// =========================================================================

#[tokio::test]
async fn test_topology_declares_exchanges_and_dead_letter_queue() {
    let (broker, conn) = setup().await;
    assert!(broker.has_exchange(EXCHANGE_PERIL_DIRECT));
    assert!(broker.has_exchange(EXCHANGE_PERIL_TOPIC));
    assert!(broker.has_exchange(EXCHANGE_PERIL_DEAD_LETTER));
    assert!(broker.has_queue(QUEUE_PERIL_DEAD_LETTER));
    assert_eq!(
        broker.bindings(QUEUE_PERIL_DEAD_LETTER),
        vec![(EXCHANGE_PERIL_DEAD_LETTER.to_string(), String::new())]
    );

    // A second run is harmless.
    declare_topology(&conn).await.unwrap();
}

#[tokio::test]
async fn test_declare_and_bind_applies_flags_dead_letter_and_binding() {
    let (broker, conn) = setup().await;
    let (_ch, info) = declare_and_bind(
        &conn,
        EXCHANGE_PERIL_TOPIC,
        "war",
        "war.*",
        QueueDurability::Durable,
    )
    .await
    .unwrap();

    assert_eq!(info.name, "war");
    assert_eq!(
        broker.queue_options("war"),
        Some(QueueDurability::Durable.options())
    );
    assert_eq!(
        broker
            .queue_arguments("war")
            .and_then(|a| a.dead_letter_exchange),
        Some(EXCHANGE_PERIL_DEAD_LETTER.to_string())
    );
    assert_eq!(
        broker.bindings("war"),
        vec![(EXCHANGE_PERIL_TOPIC.to_string(), "war.*".to_string())]
    );
}

#[tokio::test]
async fn test_transient_queue_is_not_shared_across_connections() {
    let (broker, conn) = setup().await;
    let (_owner, _) = declare_and_bind(
        &conn,
        EXCHANGE_PERIL_DIRECT,
        "pause.alice",
        PAUSE_KEY,
        QueueDurability::Transient,
    )
    .await
    .unwrap();

    let other = broker.connect();
    let err = declare_and_bind(
        &other,
        EXCHANGE_PERIL_DIRECT,
        "pause.alice",
        PAUSE_KEY,
        QueueDurability::Transient,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        PubSubError::Broker(BrokerError::ResourceLocked(_))
    ));
    assert_eq!(broker.open_channel_count(), 1);
}

#[tokio::test]
async fn test_bind_to_missing_exchange_fails_without_side_effects_on_connection() {
    let (broker, conn) = setup().await;
    let err = declare_and_bind(&conn, "nope", "q", "k", QueueDurability::Durable)
        .await
        .unwrap_err();
    assert!(matches!(err, PubSubError::Broker(BrokerError::NotFound(_))));
    assert_eq!(broker.open_channel_count(), 0);

    // The connection is still usable.
    declare_and_bind(
        &conn,
        EXCHANGE_PERIL_TOPIC,
        "q2",
        "k",
        QueueDurability::Durable,
    )
    .await
    .unwrap();
}

// =========================================================================
// Publisher
// =========================================================================

#[tokio::test]
async fn test_publish_tags_content_type_of_codec() {
    let (_broker, conn) = setup().await;
    let (ch, _) = declare_and_bind(
        &conn,
        EXCHANGE_PERIL_TOPIC,
        "logs",
        "game_logs.*",
        QueueDurability::Durable,
    )
    .await
    .unwrap();
    let mut consumer = ch.consume("logs").await.unwrap();

    let log = GameLog::now("alice", "hi");
    publish_json(&ch, EXCHANGE_PERIL_TOPIC, "game_logs.alice", &log)
        .await
        .unwrap();
    publish_bincode(&ch, EXCHANGE_PERIL_TOPIC, "game_logs.alice", &log)
        .await
        .unwrap();

    let first = consumer.recv().await.unwrap().unwrap();
    assert_eq!(first.content_type(), Some("application/json"));
    assert_eq!(first.routing_key(), "game_logs.alice");
    let second = consumer.recv().await.unwrap().unwrap();
    assert_eq!(second.content_type(), Some("application/x-bincode"));
    assert_ne!(first.body(), second.body());
}

#[tokio::test]
async fn test_publish_on_closed_channel_returns_broker_error() {
    let (_broker, conn) = setup().await;
    let ch = conn.create_channel().await.unwrap();
    ch.close().await.unwrap();

    let err = publish(
        &ch,
        EXCHANGE_PERIL_DIRECT,
        PAUSE_KEY,
        &PlayingState { is_paused: true },
        &JsonCodec,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PubSubError::Broker(_)));
}

#[tokio::test]
async fn test_publish_to_unknown_exchange_fails() {
    let (_broker, conn) = setup().await;
    let ch = conn.create_channel().await.unwrap();
    let result = publish_json(&ch, "missing", "k", &PlayingState::default()).await;
    assert!(result.is_err());
}

// =========================================================================
// Subscriber
// =========================================================================

#[tokio::test]
async fn test_fresh_transient_subscriber_receives_pause_signal() {
    let (broker, conn) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let sub = subscribe_json(
        &conn,
        EXCHANGE_PERIL_DIRECT,
        "pause.alice",
        PAUSE_KEY,
        QueueDurability::Transient,
        forward::<PlayingState>(tx),
    )
    .await
    .unwrap();
    assert_eq!(sub.queue_name(), "pause.alice");

    let ch = conn.create_channel().await.unwrap();
    publish_json(
        &ch,
        EXCHANGE_PERIL_DIRECT,
        PAUSE_KEY,
        &PlayingState { is_paused: true },
    )
    .await
    .unwrap();

    assert_eq!(recv(&mut rx).await, PlayingState { is_paused: true });
    eventually(|| broker.ready_count("pause.alice") == Some(0)).await;
}

#[tokio::test]
async fn test_handler_sees_messages_in_delivery_order() {
    let (_broker, conn) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = subscribe_bincode(
        &conn,
        EXCHANGE_PERIL_TOPIC,
        "game_logs",
        "game_logs.*",
        QueueDurability::Durable,
        forward::<GameLog>(tx),
    )
    .await
    .unwrap();

    let ch = conn.create_channel().await.unwrap();
    for i in 0..5 {
        let log = GameLog::now("bob", format!("line {i}"));
        publish_bincode(&ch, EXCHANGE_PERIL_TOPIC, "game_logs.bob", &log)
            .await
            .unwrap();
    }
    for i in 0..5 {
        assert_eq!(recv(&mut rx).await.message, format!("line {i}"));
    }
}

#[tokio::test]
async fn test_nack_requeue_redelivers_until_acked() {
    let (_broker, conn) = setup().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let counter = Arc::clone(&calls);
    let _sub = subscribe_json(
        &conn,
        EXCHANGE_PERIL_DIRECT,
        "pause.bob",
        PAUSE_KEY,
        QueueDurability::Transient,
        move |state: PlayingState| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let tx = tx.clone();
            async move {
                if n < 2 {
                    AckType::NackRequeue
                } else {
                    let _ = tx.send(state);
                    AckType::Ack
                }
            }
        },
    )
    .await
    .unwrap();

    let ch = conn.create_channel().await.unwrap();
    publish_json(
        &ch,
        EXCHANGE_PERIL_DIRECT,
        PAUSE_KEY,
        &PlayingState { is_paused: false },
    )
    .await
    .unwrap();

    assert_eq!(recv(&mut rx).await, PlayingState { is_paused: false });
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_nack_discard_routes_to_dead_letter_queue() {
    let (broker, conn) = setup().await;
    let _sub = subscribe_json(
        &conn,
        EXCHANGE_PERIL_DIRECT,
        "pause.carol",
        PAUSE_KEY,
        QueueDurability::Transient,
        |_: PlayingState| async { AckType::NackDiscard },
    )
    .await
    .unwrap();

    let ch = conn.create_channel().await.unwrap();
    publish_json(&ch, EXCHANGE_PERIL_DIRECT, PAUSE_KEY, &PlayingState::default())
        .await
        .unwrap();

    eventually(|| broker.ready_count(QUEUE_PERIL_DEAD_LETTER) == Some(1)).await;
}

#[tokio::test]
async fn test_undecodable_message_is_dead_lettered_and_loop_continues() {
    let (broker, conn) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = subscribe_json(
        &conn,
        EXCHANGE_PERIL_DIRECT,
        "pause.dave",
        PAUSE_KEY,
        QueueDurability::Transient,
        forward::<PlayingState>(tx),
    )
    .await
    .unwrap();

    let ch = conn.create_channel().await.unwrap();
    ch.publish(
        EXCHANGE_PERIL_DIRECT,
        PAUSE_KEY,
        peril_broker::OutboundMessage {
            content_type: "application/json".into(),
            body: b"{not json".to_vec(),
        },
    )
    .await
    .unwrap();
    publish_json(
        &ch,
        EXCHANGE_PERIL_DIRECT,
        PAUSE_KEY,
        &PlayingState { is_paused: true },
    )
    .await
    .unwrap();

    assert_eq!(recv(&mut rx).await, PlayingState { is_paused: true });
    eventually(|| broker.ready_count(QUEUE_PERIL_DEAD_LETTER) == Some(1)).await;
}

#[tokio::test]
async fn test_stop_cancels_consumer_and_removes_transient_queue() {
    let (broker, conn) = setup().await;
    let sub = subscribe_json(
        &conn,
        EXCHANGE_PERIL_DIRECT,
        "pause.erin",
        PAUSE_KEY,
        QueueDurability::Transient,
        |_: PlayingState| async { AckType::Ack },
    )
    .await
    .unwrap();
    assert_eq!(broker.consumer_count("pause.erin"), Some(1));

    sub.stop().await;
    assert!(!broker.has_queue("pause.erin"));
}

#[tokio::test]
async fn test_stop_keeps_durable_queue_and_its_backlog() {
    let (broker, conn) = setup().await;
    let sub = subscribe_json(
        &conn,
        EXCHANGE_PERIL_TOPIC,
        "war",
        "war.*",
        QueueDurability::Durable,
        |_: PlayingState| async { AckType::Ack },
    )
    .await
    .unwrap();
    sub.stop().await;

    let ch = conn.create_channel().await.unwrap();
    publish_json(&ch, EXCHANGE_PERIL_TOPIC, "war.alice", &PlayingState::default())
        .await
        .unwrap();
    assert_eq!(broker.consumer_count("war"), Some(0));
    assert_eq!(broker.ready_count("war"), Some(1));
}

#[tokio::test]
async fn test_closing_connection_ends_every_loop() {
    let (_broker, conn) = setup().await;
    let a = subscribe_json(
        &conn,
        EXCHANGE_PERIL_DIRECT,
        "pause.fay",
        PAUSE_KEY,
        QueueDurability::Transient,
        |_: PlayingState| async { AckType::Ack },
    )
    .await
    .unwrap();
    let b = subscribe_json(
        &conn,
        EXCHANGE_PERIL_TOPIC,
        "army_moves.fay",
        "army_moves.*",
        QueueDurability::Transient,
        |_: PlayingState| async { AckType::Ack },
    )
    .await
    .unwrap();

    conn.close().await.unwrap();
    eventually(|| a.is_finished() && b.is_finished()).await;
}

#[tokio::test]
async fn test_subscribe_on_closed_connection_fails() {
    let (_broker, conn) = setup().await;
    conn.close().await.unwrap();
    let result = subscribe(
        &conn,
        EXCHANGE_PERIL_DIRECT,
        "pause.gus",
        PAUSE_KEY,
        QueueDurability::Transient,
        |_: PlayingState| async { AckType::Ack },
        JsonCodec,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_shared_durable_queue_splits_work_between_subscribers() {
    let (broker, conn) = setup().await;
    let other = broker.connect();
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();

    let _a = subscribe_json(
        &conn,
        EXCHANGE_PERIL_TOPIC,
        "war",
        "war.*",
        QueueDurability::Durable,
        forward::<PlayingState>(tx_a),
    )
    .await
    .unwrap();
    let _b = subscribe_json(
        &other,
        EXCHANGE_PERIL_TOPIC,
        "war",
        "war.*",
        QueueDurability::Durable,
        forward::<PlayingState>(tx_b),
    )
    .await
    .unwrap();

    let ch = conn.create_channel().await.unwrap();
    for paused in [true, false] {
        publish_json(
            &ch,
            EXCHANGE_PERIL_TOPIC,
            "war.alice",
            &PlayingState { is_paused: paused },
        )
        .await
        .unwrap();
    }

    let a = recv(&mut rx_a).await;
    let b = recv(&mut rx_b).await;
    assert_ne!(a, b);
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn test_exchange_kind_mismatch_surfaces_as_broker_error() {
    let (_broker, conn) = setup().await;
    let ch = conn.create_channel().await.unwrap();
    let err = ch
        .declare_exchange(EXCHANGE_PERIL_TOPIC, ExchangeKind::Fanout, true)
        .await
        .unwrap_err();
    let err: PubSubError = err.into();
    assert!(matches!(
        err,
        PubSubError::Broker(BrokerError::PreconditionFailed(_))
    ));
}

#[tokio::test]
async fn test_topology_conflict_fails_and_closes_its_channel() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.create_channel().await.unwrap();
    ch.declare_exchange(EXCHANGE_PERIL_TOPIC, ExchangeKind::Fanout, true)
        .await
        .unwrap();
    ch.close().await.unwrap();

    let err = declare_topology(&conn).await.unwrap_err();
    assert!(matches!(
        err,
        PubSubError::Broker(BrokerError::PreconditionFailed(_))
    ));
    assert_eq!(broker.open_channel_count(), 0);
}
