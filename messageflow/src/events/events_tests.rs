//! Tests for event fan-out.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::context::{keys, MessageContext};
    use crate::core::{MessageKind, ProcessingStatus};
    use crate::errors::PipelineError;
    use crate::events::EventPipeline;
    use crate::handlers::{Dependencies, HandlerClass, HandlerLocator, HandlerModule, HandlerSearchMethod};
    use crate::options::EventPipelineOptions;
    use crate::repository::{InMemoryMessageRepository, RepositoryOptions};
    use crate::resolver::ServiceRegistry;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default, Serialize)]
    struct OrderPlaced {
        id: u32,
        self_handled: bool,
    }

    #[derive(Debug, Default, Serialize)]
    struct OrderShipped {
        id: u32,
    }

    #[derive(Debug, Serialize)]
    struct NobodyListens;

    #[derive(Default)]
    struct Ledger {
        calls: Mutex<Vec<String>>,
        disposed: AtomicUsize,
    }

    impl Ledger {
        fn record(&self, call: &str) {
            self.calls.lock().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn disposed(&self) -> usize {
            self.disposed.load(Ordering::SeqCst)
        }
    }

    struct EmailHandlers {
        ledger: Arc<Ledger>,
    }

    struct StockHandlers {
        ledger: Arc<Ledger>,
    }

    #[derive(Default)]
    struct AuditHandlers;

    struct MetricsHandlers;

    #[derive(Default)]
    struct BridgeHandlers;

    fn email_handlers() -> HandlerClass {
        HandlerClass::builder::<EmailHandlers>()
            .marked()
            .construct_with(|deps: &Dependencies| {
                Ok(EmailHandlers {
                    ledger: deps.get::<Arc<Ledger>>()?,
                })
            })
            .dispose_with(|h: &mut EmailHandlers| {
                h.ledger.disposed.fetch_add(1, Ordering::SeqCst);
            })
            .handle("HandleOrderPlaced", |h: &mut EmailHandlers, e: &mut OrderPlaced, _: &Dependencies| {
                h.ledger.record(&format!("email {}", e.id));
                Ok(())
            })
            .handle_async(
                "HandleOrderShipped",
                |h: &mut EmailHandlers, e: &mut OrderShipped, _: &Dependencies| {
                    Box::pin(async move {
                        tokio::task::yield_now().await;
                        h.ledger.record(&format!("shipped {}", e.id));
                        anyhow::Ok(())
                    })
                },
            )
            .build()
    }

    fn stock_handlers() -> HandlerClass {
        HandlerClass::builder::<StockHandlers>()
            .marked()
            .construct_with(|deps: &Dependencies| {
                Ok(StockHandlers {
                    ledger: deps.get::<Arc<Ledger>>()?,
                })
            })
            .dispose_with(|h: &mut StockHandlers| {
                h.ledger.disposed.fetch_add(1, Ordering::SeqCst);
            })
            .handle("HandleOrderPlaced", |h: &mut StockHandlers, _: &mut OrderPlaced, _: &Dependencies| {
                h.ledger.record("stock");
                Err::<(), _>(anyhow::anyhow!("stock service down"))
            })
            .build()
    }

    fn audit_handlers() -> HandlerClass {
        HandlerClass::builder::<AuditHandlers>()
            .marked()
            .construct_default()
            .handle("HandleOrderPlaced", |_: &mut AuditHandlers, _: &mut OrderPlaced, _: &Dependencies| {
                Err::<(), _>(anyhow::anyhow!("audit log full"))
            })
            .build()
    }

    fn metrics_handlers() -> HandlerClass {
        HandlerClass::builder::<MetricsHandlers>()
            .marked()
            .handle("HandleOrderPlaced", |_: &mut MetricsHandlers, _: &mut OrderPlaced, _: &Dependencies| {
                Ok(())
            })
            .build()
    }

    fn bridge_handlers(ledger: Arc<Ledger>) -> HandlerClass {
        HandlerClass::builder::<BridgeHandlers>()
            .construct_default()
            .handle("HandleOrderPlaced", move |_: &mut BridgeHandlers, _: &mut OrderPlaced, _: &Dependencies| {
                ledger.record("bridge");
                Ok(())
            })
            .build()
    }

    fn order_placed() -> HandlerClass {
        HandlerClass::builder::<OrderPlaced>()
            .handle_self("HandleOrderPlaced", |e: &mut OrderPlaced, _: &Dependencies| {
                e.self_handled = true;
                Ok(())
            })
            .build()
    }

    fn module() -> HandlerModule {
        HandlerModule::new("notifications")
            .with_class(email_handlers())
            .with_class(stock_handlers())
            .with_class(audit_handlers())
            .with_class(metrics_handlers())
            .with_class(order_placed())
    }

    fn pipeline_with(options: EventPipelineOptions) -> (EventPipeline, Arc<Ledger>) {
        let ledger = Arc::new(Ledger::default());
        let registry = ServiceRegistry::new();
        registry.register_instance(Arc::clone(&ledger));
        let pipeline = EventPipeline::builder()
            .with_resolver(registry.into_resolver())
            .with_module(module())
            .with_options(options)
            .default_pipeline()
            .unwrap();
        (pipeline, ledger)
    }

    fn lenient() -> (EventPipeline, Arc<Ledger>) {
        pipeline_with(EventPipelineOptions::new().with_throw_on_fail(false))
    }

    #[test]
    fn test_default_chain_order() {
        let (pipeline, _) = pipeline_with(EventPipelineOptions::default());
        assert_eq!(
            pipeline.chain().middleware_ids(),
            vec!["handler-locator", "handler-resolver", "handler-executor", "throw-on-fail"]
        );
    }

    #[test]
    fn test_all_handlers_run_and_failures_are_aggregated() {
        let (pipeline, ledger) = lenient();

        let ctx = pipeline.publish(OrderPlaced { id: 7, self_handled: false }).unwrap();

        assert_eq!(ctx.status(), ProcessingStatus::Completed);
        assert_eq!(ledger.calls(), vec!["email 7", "stock"]);
        assert!(ctx.content_as::<OrderPlaced>().unwrap().self_handled);

        let failure = ctx.failure().unwrap();
        assert_eq!(failure.count(), 2);
        assert_eq!(failure.messages(), vec!["stock service down", "audit log full"]);
    }

    #[test]
    fn test_instances_are_disposed_once_even_when_handlers_fail() {
        let (pipeline, ledger) = lenient();

        pipeline.publish(OrderPlaced::default()).unwrap();

        assert_eq!(ledger.disposed(), 2);
    }

    #[test]
    fn test_event_without_handlers_completes() {
        let (pipeline, ledger) = pipeline_with(EventPipelineOptions::default());

        let ctx = pipeline.publish(NobodyListens).unwrap();

        assert_eq!(ctx.status(), ProcessingStatus::Completed);
        assert!(ctx.failure().is_none());
        assert!(ledger.calls().is_empty());
    }

    #[test]
    fn test_throw_on_fail_reports_every_failure() {
        let (pipeline, _) = pipeline_with(EventPipelineOptions::default());

        let err = pipeline.publish(OrderPlaced::default()).unwrap_err();

        let PipelineError::Processing(error) = err else {
            panic!("expected a processing error, got {err:?}");
        };
        assert_eq!(error.status, ProcessingStatus::Completed);
        assert_eq!(error.failure_count(), 2);
        assert_eq!(error.original().unwrap().to_string(), "stock service down");
    }

    #[test]
    fn test_seeded_handlers_are_kept() {
        let (pipeline, ledger) = lenient();
        let bridge = bridge_handlers(Arc::clone(&ledger));
        let mut ctx = MessageContext::for_message(MessageKind::Event, OrderPlaced { id: 1, self_handled: false });
        ctx.set_item(keys::HANDLER_METHODS, bridge.methods().to_vec());

        pipeline.process(&mut ctx).unwrap();

        assert_eq!(ledger.calls(), vec!["bridge", "email 1", "stock"]);
        assert_eq!(ctx.failure().unwrap().count(), 2);
    }

    #[test]
    fn test_repository_records_aggregate_failures() {
        let repository = Arc::new(InMemoryMessageRepository::new());
        let (mut pipeline, _) = pipeline_with(
            EventPipelineOptions::new()
                .with_throw_on_fail(false)
                .with_repository(RepositoryOptions::new()),
        );
        pipeline.use_repository(repository.clone()).unwrap();

        pipeline.publish(OrderPlaced::default()).unwrap();

        let records = repository.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, MessageKind::Event);
        let error = records[0].error.as_ref().unwrap();
        assert_eq!(error.kind, "aggregate");
        assert_eq!(error.causes.len(), 2);
    }

    #[test]
    fn test_locator_scans_once_across_publishes() {
        let locator = Arc::new(HandlerLocator::new(vec![module()], HandlerSearchMethod::Marker).unwrap());
        let ledger = Arc::new(Ledger::default());
        let registry = ServiceRegistry::new();
        registry.register_instance(Arc::clone(&ledger));
        let pipeline = EventPipeline::builder()
            .with_resolver(registry.into_resolver())
            .with_locator(Arc::clone(&locator))
            .with_options(EventPipelineOptions::new().with_throw_on_fail(false))
            .default_pipeline()
            .unwrap();

        pipeline.publish(OrderPlaced::default()).unwrap();
        pipeline.publish(OrderPlaced::default()).unwrap();

        assert_eq!(locator.scan_count(), 1);
        assert_eq!(locator.cache_len(), 1);
    }

    #[test]
    fn test_sync_publish_drives_async_handlers() {
        let (pipeline, ledger) = lenient();

        pipeline.publish(OrderShipped { id: 4 }).unwrap();

        assert_eq!(ledger.calls(), vec!["shipped 4"]);
    }

    #[tokio::test]
    async fn test_async_publish() {
        let (pipeline, ledger) = lenient();

        let ctx = pipeline
            .publish_async(OrderShipped { id: 5 }, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ctx.status(), ProcessingStatus::Completed);
        assert_eq!(ledger.calls(), vec!["shipped 5"]);
        assert_eq!(ledger.disposed(), 1);
    }

    #[tokio::test]
    async fn test_async_publish_collects_failures() {
        let (pipeline, _) = lenient();

        let ctx = pipeline
            .publish_async(OrderPlaced::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ctx.failure().unwrap().count(), 2);
    }

    #[test]
    fn test_use_resolver_needs_resolver_step() {
        let mut pipeline = EventPipeline::new();
        let registry = ServiceRegistry::new();
        assert!(matches!(
            pipeline.use_resolver(registry.into_resolver()),
            Err(PipelineError::MiddlewareNotFound { .. })
        ));
    }
}
