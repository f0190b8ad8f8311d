//! # Interceptor Ordering Through a Live Engine
//!
//! Interceptors wrap the handler: `A in → B in → H → B out → A out` on
//! both the success and the error path, and a rejecting interceptor stops
//! the message before it reaches a handler.

#[cfg(test)]
mod tests {
    use crate::integration::node_config;
    use async_trait::async_trait;
    use hstp_bus::InMemoryBroker;
    use hstp_engine::{
        EngineBuilder, EngineError, HandlerResult, Interceptor, MessageContext, Next,
        OperationHandler, ERROR_OPERATION,
    };
    use hstp_identity::{CachingDidResolver, ResolverConfig, StaticResolver};
    use hstp_node::NodeRuntime;
    use hstp_transport::{BindingConfig, PubSubBinding};
    use hstp_types::{Did, Header, Message, SystemTimeSource};
    use parking_lot::Mutex;
    use std::sync::Arc;

    const ALICE: &str = "did:key:alice";
    const BOB: &str = "did:key:bob";
    const MALLORY: &str = "did:key:mallory";

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        trace: Trace,
    }

    #[async_trait]
    impl Interceptor for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn intercept(&self, ctx: MessageContext, next: Next<'_>) -> HandlerResult {
            self.trace.lock().push(format!("{} in", self.name));
            let result = next.run(ctx).await;
            let outcome = if result.is_ok() { "ok" } else { "err" };
            self.trace.lock().push(format!("{} out {outcome}", self.name));
            result
        }
    }

    /// Answers `work` with `done`, or fails when the `fail` property is set.
    struct Work {
        trace: Trace,
    }

    #[async_trait]
    impl OperationHandler for Work {
        async fn handle(&self, ctx: MessageContext) -> HandlerResult {
            self.trace.lock().push("H".to_string());
            if ctx.header().property("fail").is_some() {
                return Err(EngineError::Handler {
                    operation: ctx.operation().to_string(),
                    reason: "asked to fail".to_string(),
                });
            }
            Ok(Some(Message::without_payload(ctx.reply("done").build()?)))
        }
    }

    fn did(s: &str) -> Did {
        Did::parse(s).unwrap()
    }

    /// Bob's engine, assembled by hand with two recording interceptors.
    async fn bob(broker: &InMemoryBroker, trace: &Trace) -> Arc<hstp_engine::Engine> {
        let documents = Arc::new(StaticResolver::new(Arc::new(SystemTimeSource::new())));
        let resolver = Arc::new(CachingDidResolver::new(documents, &ResolverConfig::default()));
        let binding = PubSubBinding::new(
            BindingConfig::named("mqtt"),
            did(BOB),
            Arc::new(broker.clone()),
        )
        .unwrap();

        let engine = EngineBuilder::new(did(BOB), resolver)
            .interceptor(Arc::new(Recording {
                name: "A",
                trace: trace.clone(),
            }))
            .interceptor(Arc::new(Recording {
                name: "B",
                trace: trace.clone(),
            }))
            .operation("work", Arc::new(Work { trace: trace.clone() }))
            .binding(Arc::new(binding))
            .build()
            .unwrap();
        engine.start().await.unwrap();
        engine
    }

    fn work(fail: bool) -> Message {
        let mut header = Header::builder("work", did(ALICE))
            .destination(did(BOB))
            .expect_response(true);
        if fail {
            header = header.property("fail", "yes");
        }
        Message::without_payload(header.build().unwrap())
    }

    #[tokio::test]
    async fn test_wrap_order_on_success() {
        let broker = InMemoryBroker::new();
        let trace = Trace::default();
        let _bob = bob(&broker, &trace).await;
        let alice = NodeRuntime::with_broker(node_config(ALICE, &[BOB]), broker.clone()).unwrap();
        alice.start().await.unwrap();

        let reply = alice.engine().send(work(false)).await.unwrap().unwrap();

        assert_eq!(reply.operation(), "done");
        assert_eq!(
            *trace.lock(),
            vec!["A in", "B in", "H", "B out ok", "A out ok"]
        );
    }

    #[tokio::test]
    async fn test_wrap_order_on_error() {
        let broker = InMemoryBroker::new();
        let trace = Trace::default();
        let _bob = bob(&broker, &trace).await;
        let alice = NodeRuntime::with_broker(node_config(ALICE, &[BOB]), broker.clone()).unwrap();
        alice.start().await.unwrap();

        let reply = alice.engine().send(work(true)).await.unwrap().unwrap();

        assert_eq!(reply.operation(), ERROR_OPERATION);
        assert_eq!(reply.header().status, Some(500));
        assert_eq!(
            *trace.lock(),
            vec!["A in", "B in", "H", "B out err", "A out err"]
        );
    }

    #[tokio::test]
    async fn test_strict_identity_policy_rejects_unknown_sender() {
        let broker = InMemoryBroker::new();
        let mut config = node_config(BOB, &[ALICE]);
        config.identity_policy.require_active_source = true;
        config.identity_policy.exempt_operations = vec!["pong".to_string()];
        let bob = NodeRuntime::with_broker(config, broker.clone()).unwrap();
        bob.start().await.unwrap();
        let alice = NodeRuntime::with_broker(node_config(ALICE, &[BOB]), broker.clone()).unwrap();
        alice.start().await.unwrap();
        let mallory =
            NodeRuntime::with_broker(node_config(MALLORY, &[BOB]), broker.clone()).unwrap();
        mallory.start().await.unwrap();

        alice.engine().probe(&did(BOB)).await.unwrap();

        let ping = Header::builder("ping", did(MALLORY))
            .destination(did(BOB))
            .expect_response(true)
            .build()
            .unwrap();
        let reply = mallory
            .engine()
            .send(Message::without_payload(ping))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.operation(), ERROR_OPERATION);
        assert_eq!(reply.header().status, Some(403));
        assert!(matches!(
            mallory.engine().probe(&did(BOB)).await,
            Err(EngineError::Handler { .. })
        ));
    }
}
