//! # Broker Outage and Reconnection
//!
//! A binding that loses its broker session reconnects with backoff and
//! restores its direct, broadcast and channel subscriptions. Requests made
//! while disconnected fail instead of hanging; requests already in flight
//! keep waiting for their response across the reconnect.

#[cfg(test)]
mod tests {
    use crate::integration::node_config;
    use async_trait::async_trait;
    use hstp_bus::InMemoryBroker;
    use hstp_engine::{HandlerResult, MessageContext, OperationHandler};
    use hstp_node::NodeRuntime;
    use hstp_transport::{normalize, TopicLayout};
    use hstp_types::{Did, Header, Message};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    const ALICE: &str = "did:key:alice";
    const BOB: &str = "did:key:bob";
    const ROOM: &str = "did:key:room";

    struct Notify(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl OperationHandler for Notify {
        async fn handle(&self, ctx: MessageContext) -> HandlerResult {
            let _ = self.0.send(ctx.operation().to_string());
            Ok(None)
        }
    }

    /// Replies after a fixed delay.
    struct Slow(Duration);

    #[async_trait]
    impl OperationHandler for Slow {
        async fn handle(&self, ctx: MessageContext) -> HandlerResult {
            sleep(self.0).await;
            let reply = ctx.reply("done").build()?;
            Ok(Some(Message::without_payload(reply)))
        }
    }

    fn did(s: &str) -> Did {
        Did::parse(s).unwrap()
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..300 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    async fn start(broker: &InMemoryBroker, identity: &str, peers: &[&str]) -> NodeRuntime {
        let node = NodeRuntime::with_broker(node_config(identity, peers), broker.clone()).unwrap();
        node.start().await.unwrap();
        node
    }

    #[tokio::test]
    async fn test_requests_fail_during_outage_and_recover_after() {
        let broker = InMemoryBroker::new();
        let alice = start(&broker, ALICE, &[BOB]).await;
        let _bob = start(&broker, BOB, &[ALICE]).await;
        let bob_did = did(BOB);

        alice.engine().probe(&bob_did).await.unwrap();

        broker.set_available(false);
        let during = alice.engine().probe(&bob_did).await;
        assert!(during.is_err());

        broker.set_available(true);
        let mut recovered = false;
        for _ in 0..100 {
            if alice.engine().probe(&bob_did).await.is_ok() {
                recovered = true;
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert!(recovered, "probe never succeeded after the broker came back");
    }

    #[tokio::test]
    async fn test_in_flight_request_survives_dropped_session() {
        let broker = InMemoryBroker::new();
        let alice = start(&broker, ALICE, &[BOB]).await;
        let bob = NodeRuntime::with_handlers(
            node_config(BOB, &[ALICE]),
            broker.clone(),
            vec![(
                "work".to_string(),
                Arc::new(Slow(Duration::from_millis(300))) as Arc<dyn OperationHandler>,
            )],
        )
        .unwrap();
        bob.start().await.unwrap();

        let request = Header::builder("work", did(ALICE))
            .destination(did(BOB))
            .expect_response(true)
            .build()
            .unwrap();
        let request_id = request.id;
        let engine = alice.engine().clone();
        let waiting =
            tokio::spawn(async move { engine.send(Message::without_payload(request)).await });

        let client_id = format!("mqtt-{}", normalize(ALICE));
        sleep(Duration::from_millis(50)).await;
        assert!(broker.disconnect(&client_id));
        eventually(|| broker.is_connected(&client_id)).await;

        let reply = waiting.await.unwrap().unwrap().unwrap();
        assert_eq!(reply.operation(), "done");
        assert_eq!(reply.header().in_reply_to, Some(request_id));
    }

    #[tokio::test]
    async fn test_channel_subscription_survives_dropped_session() {
        let broker = InMemoryBroker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let alice = NodeRuntime::with_handlers(
            node_config(ALICE, &[BOB]),
            broker.clone(),
            vec![(
                "update".to_string(),
                Arc::new(Notify(tx)) as Arc<dyn OperationHandler>,
            )],
        )
        .unwrap();
        alice.start().await.unwrap();
        let bob = start(&broker, BOB, &[ALICE]).await;

        let room = did(ROOM);
        alice.engine().subscribe(&room).await.unwrap();
        let client_id = format!("mqtt-{}", normalize(ALICE));
        let room_topic = TopicLayout::new("hstp").channel(&room);
        assert_eq!(broker.subscriber_count(&room_topic), 1);

        assert!(broker.disconnect(&client_id));
        eventually(|| {
            broker.is_connected(&client_id) && broker.subscriber_count(&room_topic) == 1
        })
        .await;

        let update = Header::builder("update", did(BOB))
            .channel(room)
            .build()
            .unwrap();
        bob.engine()
            .send(Message::without_payload(update))
            .await
            .unwrap();

        let operation = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(operation, "update");
    }

    #[tokio::test]
    async fn test_shutdown_releases_broker_session() {
        let broker = InMemoryBroker::new();
        let alice = start(&broker, ALICE, &[]).await;
        let client_id = format!("mqtt-{}", normalize(ALICE));
        assert!(broker.is_connected(&client_id));

        alice.shutdown().await;

        assert!(!broker.is_connected(&client_id));
        assert!(alice.engine().probe(&did(BOB)).await.is_err());
    }
}
