//! End-to-end tests of the three pipelines through the public API.
//!
//! Each test assembles a pipeline the way an application would: handler
//! classes grouped in modules, services in a registry, options deciding the
//! chain.

use async_trait::async_trait;
use messageflow::cancellation::CancellationToken;
use messageflow::errors::{BrokenRule, RepositoryError};
use messageflow::handlers::HandlerClassBuilder;
use messageflow::prelude::*;
use messageflow::testing::{
    assert_completed, assert_failed, assert_failure_count, assert_has_item, assert_rejected, assert_status,
    FailingMiddleware, FlakyRepository, RecordingMiddleware, TestMessage, Trail,
};
use mockall::mock;
use mockall::predicate::always;
use pretty_assertions::assert_eq;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mock! {
    pub Repository {}

    #[async_trait]
    impl MessageRepository for Repository {
        async fn add(&self, record: MessageRecord, token: &CancellationToken) -> Result<(), RepositoryError>;
    }
}

#[derive(Debug, Default, Serialize)]
struct RegisterUser {
    email: String,
    age: u32,
    registered: bool,
}

impl Validate for RegisterUser {
    fn validate(&self) -> Vec<BrokenRule> {
        Rules::new()
            .email("email", &self.email)
            .range("age", self.age, 18, 130)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct DeleteUser {
    id: u32,
}

#[derive(Debug, Serialize)]
struct Orphan;

#[derive(Debug, Serialize)]
struct UserRegistered {
    email: String,
}

#[derive(Default)]
struct Calls(AtomicUsize);

impl Calls {
    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

struct UserHandlers {
    calls: Arc<Calls>,
}

struct WelcomeMailHandlers;
struct CrmHandlers;
struct AnalyticsHandlers;

fn user_class() -> HandlerClassBuilder<UserHandlers> {
    HandlerClass::builder::<UserHandlers>()
        .marked()
        .construct_with(|deps: &Dependencies| {
            Ok(UserHandlers {
                calls: deps.get::<Arc<Calls>>()?,
            })
        })
        .handle("HandleRegister", |h: &mut UserHandlers, cmd: &mut RegisterUser, _: &Dependencies| {
            h.calls.bump();
            cmd.registered = true;
            Ok(())
        })
        .handle("HandleDelete", |h: &mut UserHandlers, cmd: &mut DeleteUser, _: &Dependencies| {
            h.calls.bump();
            Err::<(), _>(anyhow::anyhow!("user {} is locked", cmd.id))
        })
}

fn event_classes() -> Vec<HandlerClass> {
    vec![
        HandlerClass::builder::<WelcomeMailHandlers>()
            .marked()
            .construct_with(|_: &Dependencies| Ok(WelcomeMailHandlers))
            .handle("HandleRegistered", |_: &mut WelcomeMailHandlers, _: &mut UserRegistered, deps: &Dependencies| {
                deps.get::<Arc<Calls>>()?.bump();
                Ok(())
            })
            .build(),
        HandlerClass::builder::<CrmHandlers>()
            .marked()
            .construct_with(|_: &Dependencies| Ok(CrmHandlers))
            .handle("HandleRegistered", |_: &mut CrmHandlers, _: &mut UserRegistered, _: &Dependencies| {
                Err::<(), _>(anyhow::anyhow!("crm offline"))
            })
            .build(),
        HandlerClass::builder::<AnalyticsHandlers>()
            .marked()
            .construct_with(|_: &Dependencies| Ok(AnalyticsHandlers))
            .handle("HandleRegistered", |_: &mut AnalyticsHandlers, e: &mut UserRegistered, _: &Dependencies| {
                Err::<(), _>(anyhow::anyhow!("cannot track {}", e.email))
            })
            .build(),
    ]
}

fn services(calls: &Arc<Calls>) -> Arc<dyn Resolver> {
    let registry = ServiceRegistry::new();
    registry.register_instance(Arc::clone(calls));
    registry.into_resolver()
}

fn users_module() -> HandlerModule {
    HandlerModule::new("users").with_class(user_class())
}

fn commands(options: CommandPipelineOptions) -> (CommandPipeline, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let pipeline = CommandPipeline::builder()
        .with_resolver(services(&calls))
        .with_module(users_module())
        .with_validator::<RegisterUser>()
        .with_options(options)
        .default_pipeline()
        .unwrap();
    (pipeline, calls)
}

fn valid_user() -> RegisterUser {
    RegisterUser {
        email: "ada@example.com".to_string(),
        age: 36,
        registered: false,
    }
}

#[test]
fn command_completes_and_handler_side_effects_are_visible() {
    let (pipeline, calls) = commands(CommandPipelineOptions::default());

    let ctx = pipeline.handle(valid_user()).unwrap();

    assert_completed(&ctx);
    assert!(ctx.content_as::<RegisterUser>().unwrap().registered);
    assert_eq!(calls.get(), 1);
}

#[test]
fn command_without_handler_is_rejected_before_execution() {
    let (mut pipeline, calls) = commands(CommandPipelineOptions::default());
    let trail = Trail::default();
    pipeline
        .chain_mut()
        .insert_middleware_before(RecordingMiddleware::boxed("probe", &trail), Some("handler-executor"))
        .unwrap();

    let mut ctx = MessageContext::for_message(MessageKind::Command, Orphan);
    let err = pipeline.process(&mut ctx).unwrap_err();

    assert!(matches!(err, PipelineError::HandlerNotFound { .. }));
    assert_rejected(&ctx);
    assert_eq!(*trail.lock(), vec!["probe:post"]);
    assert_eq!(calls.get(), 0);
}

#[test]
fn event_reaches_every_handler_and_counts_failures() {
    let calls = Arc::new(Calls::default());
    let module = event_classes()
        .into_iter()
        .fold(HandlerModule::new("notifications"), |module, class| module.with_class(class));
    let pipeline = EventPipeline::builder()
        .with_resolver(services(&calls))
        .with_module(module)
        .with_options(EventPipelineOptions::new().with_throw_on_fail(false))
        .default_pipeline()
        .unwrap();

    let ctx = pipeline
        .publish(UserRegistered {
            email: "ada@example.com".to_string(),
        })
        .unwrap();

    assert_eq!(ctx.status(), ProcessingStatus::Completed);
    assert_eq!(calls.get(), 1);
    assert_failure_count(&ctx, 2);
    assert_eq!(
        ctx.failure().unwrap().messages(),
        vec!["crm offline", "cannot track ada@example.com"]
    );
}

#[test]
fn event_without_handlers_completes_cleanly() {
    let pipeline = EventPipeline::builder()
        .with_module(users_module())
        .default_pipeline()
        .unwrap();

    let ctx = pipeline
        .publish(UserRegistered {
            email: "nobody@example.com".to_string(),
        })
        .unwrap();

    assert_completed(&ctx);
}

#[test]
fn duplicate_middleware_id_leaves_chain_unchanged() {
    let (mut pipeline, _) = commands(CommandPipelineOptions::default());
    let before: Vec<String> = pipeline.chain().middleware_ids().into_iter().map(String::from).collect();
    let trail = Trail::default();

    let err = pipeline
        .chain_mut()
        .insert_middleware_after(RecordingMiddleware::boxed("handler-locator", &trail), None)
        .unwrap_err();

    assert!(matches!(err, PipelineError::DuplicateMiddlewareId { ref id } if id == "handler-locator"));
    assert_eq!(pipeline.chain().middleware_ids(), before);
}

#[test]
fn insert_after_anchor_places_middleware_immediately_behind_it() {
    let (mut pipeline, _) = commands(CommandPipelineOptions::default());
    let trail = Trail::default();
    let chain = pipeline.chain_mut();

    chain
        .insert_middleware_after(RecordingMiddleware::boxed("audit", &trail), Some("handler-locator"))
        .unwrap();
    chain
        .insert_middleware_after(RecordingMiddleware::boxed("metrics", &trail), Some("audit"))
        .unwrap();

    assert_eq!(
        chain.middleware_ids(),
        vec!["handler-locator", "audit", "metrics", "handler-resolver", "handler-executor", "throw-on-fail"]
    );
}

#[test]
fn locator_scans_modules_once() {
    let locator = HandlerLocator::new(vec![users_module()], HandlerSearchMethod::Marker).unwrap();
    let key = TypeKey::of::<RegisterUser>();

    let first = locator.find_command_handler(&key).unwrap();
    let second = locator.find_command_handler(&key).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(locator.scan_count(), 1);
    assert_eq!(locator.cache_len(), 1);
}

#[test]
fn validation_rejects_with_one_rule_per_violation() {
    let (pipeline, calls) = commands(CommandPipelineOptions::new().with_validation(true));
    let mut ctx = MessageContext::for_message(
        MessageKind::Command,
        RegisterUser {
            email: "not-an-email".to_string(),
            age: 7,
            registered: false,
        },
    );

    let err = pipeline.process(&mut ctx).unwrap_err();

    assert_rejected(&ctx);
    let PipelineError::Validation(error) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(error.rules.len(), 2);
    assert!(error.has_field("email"));
    assert!(error.has_field("age"));
    assert_eq!(calls.get(), 0);
}

struct Lists;

fn lists() -> (QueryPipeline, QueryMethod<Lists, (i32, i32), Vec<i32>>, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let registry = Arc::new(QueryRegistry::new());
    registry
        .register_type(HandlerClass::builder::<Lists>().construct_with(|_: &Dependencies| Ok(Lists)))
        .unwrap();
    let counted = Arc::clone(&calls);
    let pair = registry
        .register_method("Pair", &["a", "b"], move |_: &Lists, (a, b): (i32, i32)| {
            counted.bump();
            Ok(vec![a, b])
        })
        .unwrap();
    let pipeline = QueryPipeline::builder(registry).default_pipeline().unwrap();
    (pipeline, pair, calls)
}

#[test]
fn query_fluent_call_and_no_execution_mode() {
    let (pipeline, pair, calls) = lists();

    assert_eq!(pipeline.query::<Lists>().with(&pair, (2, 3)).unwrap(), vec![2, 3]);
    assert_eq!(calls.get(), 1);

    let skipped = pipeline.query::<Lists>().without_execution().with(&pair, (2, 3)).unwrap();
    assert_eq!(skipped, Vec::<i32>::new());
    assert_eq!(calls.get(), 1);
}

#[test]
fn query_raw_call_round_trips_to_fluent_result() {
    let (pipeline, pair, _) = lists();
    let args = match json!({"a": 10, "b": 5}) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };

    let fluent = pipeline.query::<Lists>().with(&pair, (10, 5)).unwrap();
    let raw = pipeline.invoke_raw_json(pair.content_type(), &args).unwrap();

    assert!(pair.content_type().ends_with("Lists.Pair"));
    assert_eq!(raw, json!(fluent));
}

#[test]
fn failed_command_record_reaches_repository_before_error() {
    let mut repository = MockRepository::new();
    repository
        .expect_add()
        .withf(|record, _| record.status == ProcessingStatus::Failed && record.error.is_some())
        .times(1)
        .returning(|_, _| Ok(()));

    let calls = Arc::new(Calls::default());
    let pipeline = CommandPipeline::builder()
        .with_resolver(services(&calls))
        .with_module(users_module())
        .with_repository(Arc::new(repository))
        .with_options(CommandPipelineOptions::new().with_repository(RepositoryOptions::new()))
        .default_pipeline()
        .unwrap();

    let err = pipeline.handle(DeleteUser { id: 9 }).unwrap_err();

    assert_eq!(err.kind_name(), "Processing");
}

#[test]
fn repository_errors_are_swallowed_when_rethrow_is_off() {
    let mut repository = MockRepository::new();
    repository
        .expect_add()
        .with(always(), always())
        .times(1)
        .returning(|_, _| Err(RepositoryError::new("disk full")));

    let calls = Arc::new(Calls::default());
    let pipeline = CommandPipeline::builder()
        .with_resolver(services(&calls))
        .with_module(users_module())
        .with_repository(Arc::new(repository))
        .with_options(
            CommandPipelineOptions::new().with_repository(RepositoryOptions::new().with_rethrow(false)),
        )
        .default_pipeline()
        .unwrap();

    let ctx = pipeline.handle(valid_user()).unwrap();

    assert_completed(&ctx);
}

#[test]
fn repository_errors_propagate_by_default() {
    let mut repository = MockRepository::new();
    repository
        .expect_add()
        .times(1)
        .returning(|_, _| Err(RepositoryError::new("disk full")));

    let calls = Arc::new(Calls::default());
    let pipeline = CommandPipeline::builder()
        .with_resolver(services(&calls))
        .with_module(users_module())
        .with_repository(Arc::new(repository))
        .with_options(CommandPipelineOptions::new().with_repository(RepositoryOptions::new()))
        .default_pipeline()
        .unwrap();

    let err = pipeline.handle(valid_user()).unwrap_err();

    assert!(matches!(err, PipelineError::Repository(_)));
}

#[test]
fn async_command_path_runs_on_a_plain_executor() {
    let (pipeline, calls) = commands(CommandPipelineOptions::default());
    let token = CancellationToken::new();

    let ctx = tokio_test::block_on(pipeline.handle_async(valid_user(), &token)).unwrap();

    assert_completed(&ctx);
    assert_eq!(calls.get(), 1);
}

#[test]
fn failed_command_keeps_its_handler_when_failures_are_not_thrown() {
    let (pipeline, calls) = commands(CommandPipelineOptions::new().with_throw_on_fail(false));

    let ctx = pipeline.handle(DeleteUser { id: 3 }).unwrap();

    assert_failed(&ctx);
    assert_has_item(&ctx, keys::HANDLER_METHOD);
    assert_eq!(ctx.failure().unwrap().messages(), vec!["user 3 is locked"]);
    assert_eq!(calls.get(), 1);
}

#[test]
fn custom_middleware_error_stops_before_the_handler() {
    let (mut pipeline, calls) = commands(CommandPipelineOptions::default());
    let guard = FailingMiddleware::new("maintenance", "read-only mode");
    pipeline
        .chain_mut()
        .insert_middleware_before(Box::new(guard.clone()), Some("handler-executor"))
        .unwrap();

    let mut ctx = TestMessage::command()
        .with_data("tenant", json!("acme"))
        .build(valid_user());
    let err = pipeline.process(&mut ctx).unwrap_err();

    assert!(matches!(err, PipelineError::Middleware(ref message) if message == "read-only mode"));
    assert_status(&ctx, ProcessingStatus::Processing);
    assert_eq!(ctx.data()["tenant"], "acme");
    assert_eq!(guard.call_count(), 1);
    assert_eq!(calls.get(), 0);
}

#[test]
fn flaky_repository_is_tolerated_when_rethrow_is_off() {
    let repository = Arc::new(FlakyRepository::new(1));
    let calls = Arc::new(Calls::default());
    let pipeline = CommandPipeline::builder()
        .with_resolver(services(&calls))
        .with_module(users_module())
        .with_repository(Arc::clone(&repository) as Arc<dyn MessageRepository>)
        .with_options(
            CommandPipelineOptions::new().with_repository(RepositoryOptions::new().with_rethrow(false)),
        )
        .default_pipeline()
        .unwrap();

    assert_completed(&pipeline.handle(valid_user()).unwrap());
    assert!(repository.records().is_empty());

    assert_completed(&pipeline.handle(valid_user()).unwrap());
    let records = repository.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ProcessingStatus::Completed);
    assert_eq!(calls.get(), 2);
}
