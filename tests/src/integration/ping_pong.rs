//! # Request/Response Across Nodes
//!
//! Two or more nodes share one in-process broker. Covers:
//!
//! 1. A ping expecting a response resolves to the correlated pong
//! 2. Probes measure a round trip
//! 3. A request for an unknown operation is answered with an error reply
//! 4. Payloads survive the round trip
//! 5. Channel messages reach every subscribed node
//! 6. Unanswered requests time out

#[cfg(test)]
mod tests {
    use crate::integration::node_config;
    use async_trait::async_trait;
    use hstp_bus::InMemoryBroker;
    use hstp_engine::{
        EngineError, HandlerResult, MessageContext, OperationHandler, ERROR_OPERATION,
        ERROR_PROPERTY, PING, PONG,
    };
    use hstp_node::NodeRuntime;
    use hstp_transport::TransportError;
    use hstp_types::{Did, Header, Message, Payload};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const ALICE: &str = "did:key:alice";
    const BOB: &str = "did:key:bob";
    const CAROL: &str = "did:key:carol";
    const ROOM: &str = "did:key:room";

    type Handlers = Vec<(String, Arc<dyn OperationHandler>)>;

    /// Replies to `echo` with the request payload.
    struct Echo;

    #[async_trait]
    impl OperationHandler for Echo {
        async fn handle(&self, ctx: MessageContext) -> HandlerResult {
            let reply = ctx.reply("echoed").build()?;
            let (_, payload) = ctx.message.into_parts();
            let body = payload.collect(64 * 1024).await?;
            Ok(Some(Message::new(reply, Payload::from_bytes(body))))
        }
    }

    /// Reports which node saw a message from whom.
    struct Record {
        tx: mpsc::UnboundedSender<(String, Did)>,
    }

    #[async_trait]
    impl OperationHandler for Record {
        async fn handle(&self, ctx: MessageContext) -> HandlerResult {
            let _ = self
                .tx
                .send((ctx.local.to_string(), ctx.header().source.clone()));
            Ok(None)
        }
    }

    fn did(s: &str) -> Did {
        Did::parse(s).unwrap()
    }

    async fn start(
        broker: &InMemoryBroker,
        identity: &str,
        peers: &[&str],
        handlers: Handlers,
    ) -> NodeRuntime {
        let node =
            NodeRuntime::with_handlers(node_config(identity, peers), broker.clone(), handlers)
                .unwrap();
        node.start().await.unwrap();
        node
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_correlated_pong() {
        let broker = InMemoryBroker::new();
        let alice = start(&broker, ALICE, &[BOB], Vec::new()).await;
        let _bob = start(&broker, BOB, &[ALICE], Vec::new()).await;

        let ping = Header::builder(PING, did(ALICE))
            .destination(did(BOB))
            .expect_response(true)
            .build()
            .unwrap();
        let ping_id = ping.id;

        let pong = alice
            .engine()
            .send(Message::without_payload(ping))
            .await
            .unwrap()
            .unwrap();

        let header = pong.header();
        assert_eq!(header.operation, PONG);
        assert_eq!(header.in_reply_to, Some(ping_id));
        assert_eq!(header.source, did(BOB));
        assert_eq!(header.destination, Some(did(ALICE)));
    }

    #[tokio::test]
    async fn test_probe_reports_round_trip() {
        let broker = InMemoryBroker::new();
        let alice = start(&broker, ALICE, &[BOB], Vec::new()).await;
        let _bob = start(&broker, BOB, &[ALICE], Vec::new()).await;

        let rtt = alice.engine().probe(&did(BOB)).await.unwrap();

        assert!(rtt < Duration::from_secs(2));
        assert_eq!(alice.engine().probes().completed(), 1);
        assert_eq!(alice.engine().probes().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_unknown_operation_gets_error_reply() {
        let broker = InMemoryBroker::new();
        let alice = start(&broker, ALICE, &[BOB], Vec::new()).await;
        let _bob = start(&broker, BOB, &[ALICE], Vec::new()).await;

        let request = Header::builder("teleport", did(ALICE))
            .destination(did(BOB))
            .expect_response(true)
            .build()
            .unwrap();
        let reply = alice
            .engine()
            .send(Message::without_payload(request))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.operation(), ERROR_OPERATION);
        assert_eq!(reply.header().status, Some(404));
        assert!(reply
            .header()
            .property(ERROR_PROPERTY)
            .unwrap()
            .contains("teleport"));
    }

    #[tokio::test]
    async fn test_payload_survives_round_trip() {
        let broker = InMemoryBroker::new();
        let alice = start(&broker, ALICE, &[BOB], Vec::new()).await;
        let _bob = start(
            &broker,
            BOB,
            &[ALICE],
            vec![("echo".to_string(), Arc::new(Echo) as Arc<dyn OperationHandler>)],
        )
        .await;

        let request = Header::builder("echo", did(ALICE))
            .destination(did(BOB))
            .expect_response(true)
            .build()
            .unwrap();
        let reply = alice
            .engine()
            .send(Message::new(request, Payload::from("hello, bob")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.operation(), "echoed");
        let (_, payload) = reply.into_parts();
        assert_eq!(&payload.collect(1024).await.unwrap()[..], b"hello, bob");
    }

    #[tokio::test]
    async fn test_channel_message_reaches_subscribers() {
        let broker = InMemoryBroker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recorder = || -> Handlers {
            vec![(
                "update".to_string(),
                Arc::new(Record { tx: tx.clone() }) as Arc<dyn OperationHandler>,
            )]
        };
        let alice = start(&broker, ALICE, &[BOB], recorder()).await;
        let carol = start(&broker, CAROL, &[BOB], recorder()).await;
        let bob = start(&broker, BOB, &[], Vec::new()).await;
        let room = did(ROOM);
        alice.engine().subscribe(&room).await.unwrap();
        carol.engine().subscribe(&room).await.unwrap();

        let update = Header::builder("update", did(BOB))
            .channel(room.clone())
            .build()
            .unwrap();
        let reply = bob
            .engine()
            .send(Message::without_payload(update))
            .await
            .unwrap();
        assert!(reply.is_none());

        let mut seen = Vec::new();
        for _ in 0..2 {
            let (node, source) = timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(source, did(BOB));
            seen.push(node);
        }
        seen.sort();
        assert_eq!(seen, vec![ALICE.to_string(), CAROL.to_string()]);
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let broker = InMemoryBroker::new();
        let mut config = node_config(ALICE, &[]);
        config.bindings[0].request_timeout_ms = 200;
        let alice = NodeRuntime::with_broker(config, broker).unwrap();
        alice.start().await.unwrap();

        let result = alice.engine().probe(&did("did:key:nobody")).await;

        assert!(matches!(
            result,
            Err(EngineError::Transport(TransportError::Timeout { .. }))
        ));
        assert_eq!(alice.engine().probes().outstanding(), 0);
    }
}
