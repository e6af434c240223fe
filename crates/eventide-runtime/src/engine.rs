//! Engine assembly.
//!
//! [`EngineBuilder`] collects the registry contents, the data store, the
//! publishers and the command and event wiring once at start-up.
//! [`EngineBuilder::build`] turns that into an [`Engine`], which is the
//! inbound surface of the runtime: commands go in through
//! [`Engine::dispatch`], events from other services through
//! [`Engine::deliver`], and rebuild requests through [`Engine::replay`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use eventide_core::aggregate::Aggregate;
use eventide_core::command::{Command, CommandHandler};
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::EventPayload;
use eventide_core::handler::{EventHandler, EventPublisher};
use eventide_core::registry::EventRegistry;
use eventide_core::store::DataStore;

use crate::aggregate_handler::{AggregateHandler, ReplayCommand, SnapshotPolicy};
use crate::command_bus::CommandBus;
use crate::config::EngineConfig;
use crate::event_bus::{EventBus, PublishMode};
use crate::inbound::decode_envelope;
use crate::matcher::EventMatcher;
use crate::middleware::{CommandMiddleware, layer};
use crate::reader::AggregateReader;
use crate::saga::{Saga, SagaHandler};

type StoreFactory = Box<dyn FnOnce(Arc<EventRegistry>) -> Arc<dyn DataStore> + Send>;
type RouteFn = fn(&CommandBus, Arc<dyn CommandHandler>) -> Result<(), DomainError>;
type AggregateInstaller = Box<dyn FnOnce(&Assembly) -> Arc<dyn CommandHandler> + Send>;
type MiddlewareChain = Vec<Arc<dyn CommandMiddleware>>;

fn route<C: Command>(bus: &CommandBus, handler: Arc<dyn CommandHandler>) -> Result<(), DomainError> {
    bus.register::<C>(handler)
}

enum StoreSource {
    Ready(Arc<dyn DataStore>),
    Factory(StoreFactory),
}

enum LocalHandler {
    Handler(Arc<dyn EventHandler>),
    Saga(Arc<dyn Saga>, EventMatcher),
}

struct AggregateSetup {
    type_name: String,
    install: AggregateInstaller,
    middleware: MiddlewareChain,
    routes: Vec<(RouteFn, MiddlewareChain)>,
}

/// The parts an aggregate handler is built from.
struct Assembly {
    store: Arc<dyn DataStore>,
    event_bus: Arc<EventBus>,
    snapshots: SnapshotPolicy,
    project: bool,
}

/// Collects the command routes and middleware of one aggregate type.
pub struct AggregateWiring<'a> {
    setup: &'a mut AggregateSetup,
}

impl AggregateWiring<'_> {
    /// Routes commands of type `C` to the aggregate.
    pub fn command<C: Command>(&mut self) -> &mut Self {
        self.command_with::<C>(&[])
    }

    /// Routes commands of type `C` to the aggregate through `middleware`,
    /// which runs inside the aggregate's own middleware.
    pub fn command_with<C: Command>(&mut self, middleware: &[Arc<dyn CommandMiddleware>]) -> &mut Self {
        self.setup.routes.push((route::<C>, middleware.to_vec()));
        self
    }

    /// Adds middleware in front of every command of this aggregate,
    /// replays included.
    pub fn middleware(&mut self, middleware: Arc<dyn CommandMiddleware>) -> &mut Self {
        self.setup.middleware.push(middleware);
        self
    }
}

/// Builder for an [`Engine`].
pub struct EngineBuilder {
    registry: Arc<EventRegistry>,
    store: Option<StoreSource>,
    publishers: Vec<Arc<dyn EventPublisher>>,
    config: EngineConfig,
    aggregates: Vec<AggregateSetup>,
    command_handlers: Vec<(RouteFn, Arc<dyn CommandHandler>)>,
    local_handlers: Vec<LocalHandler>,
    setup_errors: Vec<DomainError>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Creates a builder with an empty registry and default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(Arc::new(EventRegistry::new()))
    }

    /// Creates a builder around an existing registry.
    #[must_use]
    pub fn with_registry(registry: Arc<EventRegistry>) -> Self {
        Self {
            registry,
            store: None,
            publishers: Vec::new(),
            config: EngineConfig::default(),
            aggregates: Vec::new(),
            command_handlers: Vec::new(),
            local_handlers: Vec::new(),
            setup_errors: Vec::new(),
        }
    }

    /// Returns the registry being filled.
    #[must_use]
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Registers event payload `T`. Registering a name twice keeps the
    /// first entry and makes [`EngineBuilder::build`] fail.
    pub fn register_event<T: EventPayload>(&mut self, is_local: bool) -> &mut Self {
        if let Err(err) = self.registry.register::<T>(is_local) {
            self.setup_errors.push(err);
        }
        self
    }

    /// Uses `store` as the data store.
    pub fn store(&mut self, store: Arc<dyn DataStore>) -> &mut Self {
        self.store = Some(StoreSource::Ready(store));
        self
    }

    /// Builds the data store from the final registry during `build`.
    pub fn store_factory<F>(&mut self, factory: F) -> &mut Self
    where
        F: FnOnce(Arc<EventRegistry>) -> Arc<dyn DataStore> + Send + 'static,
    {
        self.store = Some(StoreSource::Factory(Box::new(factory)));
        self
    }

    /// Adds an external publisher.
    pub fn add_publisher(&mut self, publisher: Arc<dyn EventPublisher>) -> &mut Self {
        self.publishers.push(publisher);
        self
    }

    /// Replaces the whole configuration.
    pub fn config(&mut self, config: EngineConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// Sets the snapshot threshold; negative disables snapshotting.
    pub fn snapshot_min_version_diff(&mut self, min_version_diff: i64) -> &mut Self {
        self.config.snapshot_min_version_diff = min_version_diff;
        self
    }

    /// Sets the snapshot revision label.
    pub fn snapshot_revision(&mut self, revision: impl Into<String>) -> &mut Self {
        self.config.snapshot_revision = revision.into();
        self
    }

    /// Sets how events are handed to publishers.
    pub fn publish_mode(&mut self, mode: PublishMode) -> &mut Self {
        self.config.publish_mode = mode;
        self
    }

    /// Persists every aggregate's state after each command when `project`
    /// is set.
    pub fn project_aggregates(&mut self, project: bool) -> &mut Self {
        self.config.project_aggregates = project;
        self
    }

    /// Wires aggregate type `A`, built by `factory`, under `type_name`.
    /// Chain [`AggregateWiring::command`] for every command it handles.
    pub fn wire_aggregate<A: Aggregate>(
        &mut self,
        type_name: impl Into<String>,
        factory: impl Fn(&str, &str) -> A + Send + Sync + 'static,
    ) -> AggregateWiring<'_> {
        let type_name = type_name.into();
        let handler_type = type_name.clone();
        let install: AggregateInstaller = Box::new(move |assembly| {
            Arc::new(
                AggregateHandler::new(
                    handler_type,
                    factory,
                    Arc::clone(&assembly.store),
                    Arc::clone(&assembly.event_bus),
                    assembly.snapshots.clone(),
                )
                .with_projection(assembly.project),
            )
        });
        let index = self.aggregates.len();
        self.aggregates.push(AggregateSetup {
            type_name,
            install,
            middleware: Vec::new(),
            routes: Vec::new(),
        });
        AggregateWiring {
            setup: &mut self.aggregates[index],
        }
    }

    /// Routes commands of type `C` to a custom handler.
    pub fn wire_command_handler<C: Command>(&mut self, handler: Arc<dyn CommandHandler>) -> &mut Self {
        self.wire_command_handler_with::<C>(handler, &[])
    }

    /// Routes commands of type `C` to a custom handler through `middleware`.
    pub fn wire_command_handler_with<C: Command>(
        &mut self,
        handler: Arc<dyn CommandHandler>,
        middleware: &[Arc<dyn CommandMiddleware>],
    ) -> &mut Self {
        self.command_handlers.push((route::<C>, layer(handler, middleware)));
        self
    }

    /// Runs `saga` for events accepted by `matcher`.
    pub fn wire_saga(&mut self, saga: Arc<dyn Saga>, matcher: EventMatcher) -> &mut Self {
        self.local_handlers.push(LocalHandler::Saga(saga, matcher));
        self
    }

    /// Adds a local event handler such as a projection.
    pub fn wire_event_handler(&mut self, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.local_handlers.push(LocalHandler::Handler(handler));
        self
    }

    /// Assembles the engine.
    ///
    /// # Errors
    ///
    /// Returns the first registration error (`DomainError::DuplicateEventType`),
    /// `DomainError::Validation` without a data store or when two aggregates
    /// share a type name, and `DomainError::DuplicateHandler` when two
    /// handlers claim one command.
    pub fn build(mut self) -> Result<Engine, DomainError> {
        if !self.setup_errors.is_empty() {
            return Err(self.setup_errors.swap_remove(0));
        }
        let store = match self.store {
            Some(StoreSource::Ready(store)) => store,
            Some(StoreSource::Factory(factory)) => factory(Arc::clone(&self.registry)),
            None => return Err(DomainError::Validation("engine requires a data store".to_owned())),
        };

        let event_bus = Arc::new(EventBus::new(
            Arc::clone(&self.registry),
            self.config.publish_mode,
        ));
        for publisher in self.publishers {
            event_bus.add_publisher(publisher);
        }

        let command_bus = Arc::new(CommandBus::new());
        for local in self.local_handlers {
            let handler: Arc<dyn EventHandler> = match local {
                LocalHandler::Handler(handler) => handler,
                LocalHandler::Saga(saga, matcher) => {
                    Arc::new(SagaHandler::new(saga, matcher, &command_bus))
                }
            };
            event_bus.add_handler(handler);
        }

        let assembly = Assembly {
            store: Arc::clone(&store),
            event_bus: Arc::clone(&event_bus),
            snapshots: self.config.snapshot_policy(),
            project: self.config.project_aggregates,
        };
        let mut aggregates = HashMap::new();
        for setup in self.aggregates {
            if aggregates.contains_key(&setup.type_name) {
                return Err(DomainError::Validation(format!(
                    "aggregate {} is wired twice",
                    setup.type_name
                )));
            }
            if setup.routes.is_empty() {
                tracing::warn!(aggregate_type = %setup.type_name, "aggregate wired without commands");
            }
            let handler = layer((setup.install)(&assembly), &setup.middleware);
            for (route, middleware) in &setup.routes {
                route(&command_bus, layer(Arc::clone(&handler), middleware))?;
            }
            aggregates.insert(setup.type_name, handler);
        }
        for (route, handler) in self.command_handlers {
            route(&command_bus, handler)?;
        }

        tracing::info!(
            commands = command_bus.registered_commands().len(),
            event_types = self.registry.event_types().len(),
            publish_mode = %self.config.publish_mode,
            snapshot_min_version_diff = self.config.snapshot_min_version_diff,
            project_aggregates = self.config.project_aggregates,
            "engine assembled"
        );

        Ok(Engine {
            registry: self.registry,
            store,
            command_bus,
            event_bus,
            aggregates,
            snapshots: assembly.snapshots,
        })
    }
}

/// The assembled runtime.
pub struct Engine {
    registry: Arc<EventRegistry>,
    store: Arc<dyn DataStore>,
    command_bus: Arc<CommandBus>,
    event_bus: Arc<EventBus>,
    aggregates: HashMap<String, Arc<dyn CommandHandler>>,
    snapshots: SnapshotPolicy,
}

impl Engine {
    /// Handles an inbound command.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NoHandlerRegistered` or the handler's error.
    pub async fn dispatch(&self, ctx: &Context, command: &dyn Command) -> Result<(), DomainError> {
        self.command_bus.dispatch(ctx, command).await
    }

    /// Rebuilds one aggregate from its stream and rewrites its snapshot and
    /// projection, without handling a command. Runs through the aggregate's
    /// middleware.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownAggregateType` when no aggregate is wired
    /// under `request.aggregate_type`, otherwise the handler's error.
    pub async fn replay(&self, ctx: &Context, request: &ReplayCommand) -> Result<(), DomainError> {
        let handler = self
            .aggregates
            .get(&request.aggregate_type)
            .ok_or_else(|| DomainError::UnknownAggregateType(request.aggregate_type.clone()))?;
        handler.handle_command(ctx, request).await
    }

    /// Handles an event published by another service. The envelope is
    /// decoded through the registry and delivered to local handlers only.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType`,
    /// `DomainError::MismatchedEventType`, `DomainError::PayloadDecode` or
    /// the first local handler error.
    #[tracing::instrument(skip(self, ctx, envelope), fields(bytes = envelope.len()))]
    pub async fn deliver(
        &self,
        ctx: &Context,
        event_type: &str,
        envelope: &[u8],
    ) -> Result<(), DomainError> {
        let event = decode_envelope(&self.registry, event_type, envelope)?;
        self.event_bus.deliver_local(ctx, &event).await
    }

    /// Returns a reader for aggregates of type `A`, using the engine's store
    /// and snapshot policy.
    pub fn reader<A: Aggregate>(
        &self,
        type_name: impl Into<String>,
        factory: impl Fn(&str, &str) -> A + Send + Sync + 'static,
    ) -> AggregateReader<A> {
        AggregateReader::new(type_name, factory, Arc::clone(&self.store), self.snapshots.clone())
    }

    /// Returns the event registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Returns the data store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Returns the command bus.
    #[must_use]
    pub fn command_bus(&self) -> &Arc<CommandBus> {
        &self.command_bus
    }

    /// Returns the event bus.
    #[must_use]
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Closes the publishers, then the store.
    ///
    /// # Errors
    ///
    /// Returns the first close error; the store is closed regardless.
    pub async fn close(&self) -> Result<(), DomainError> {
        let publishers = self.event_bus.close().await;
        let store = self.store.close().await;
        tracing::info!("engine closed");
        publishers.and(store)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("command_bus", &self.command_bus)
            .field("event_bus", &self.event_bus)
            .field("aggregates", &self.aggregates.keys().collect::<Vec<_>>())
            .field("snapshots", &self.snapshots)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use eventide_core::aggregate::AggregateRoot;
    use eventide_core::event::Event;
    use eventide_store::memory_store::MemoryStore;
    use eventide_test_support::{FailingPublisher, RecordingEventHandler, RecordingPublisher};
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Opened {
        owner: String,
    }

    impl EventPayload for Opened {
        const EVENT_TYPE: &'static str = "Opened";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Audited;

    impl EventPayload for Audited {
        const EVENT_TYPE: &'static str = "Audited";
    }

    #[derive(Debug)]
    struct Open {
        id: String,
        owner: String,
    }

    impl Command for Open {
        fn aggregate_id(&self) -> &str {
            &self.id
        }

        fn command_type(&self) -> &'static str {
            "Open"
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Account {
        root: AggregateRoot,
        owner: Option<String>,
    }

    #[async_trait]
    impl Aggregate for Account {
        fn root(&self) -> &AggregateRoot {
            &self.root
        }

        fn root_mut(&mut self) -> &mut AggregateRoot {
            &mut self.root
        }

        fn apply_event(&mut self, event: &Event) -> Result<(), DomainError> {
            if event.is::<Opened>() {
                let Opened { owner } = event.decode()?;
                self.owner = Some(owner);
            }
            Ok(())
        }

        async fn handle_command(&mut self, ctx: &Context, command: &dyn Command) -> Result<(), DomainError> {
            let open = command
                .downcast_ref::<Open>()
                .ok_or(DomainError::Validation("unsupported".into()))?;
            if self.owner.is_some() {
                return Err(DomainError::Validation("already open".into()));
            }
            self.root.record(ctx, &Opened { owner: open.owner.clone() })?;
            self.root.record(ctx, &Audited)
        }
    }

    fn account(id: &str, type_name: &str) -> Account {
        Account {
            root: AggregateRoot::new(id, type_name),
            owner: None,
        }
    }

    fn builder() -> EngineBuilder {
        let mut builder = EngineBuilder::new();
        builder
            .register_event::<Opened>(false)
            .register_event::<Audited>(true)
            .store_factory(|registry| Arc::new(MemoryStore::new(registry)));
        builder
    }

    type Trail = Arc<Mutex<Vec<String>>>;

    /// Records each command and the correlation id it arrived with.
    struct Inbox(Trail);

    #[async_trait]
    impl CommandHandler for Inbox {
        async fn handle_command(&self, ctx: &Context, command: &dyn Command) -> Result<(), DomainError> {
            self.0
                .lock()
                .push(format!("{} {}", command.command_type(), ctx.correlation_id()));
            Ok(())
        }
    }

    struct Trace(&'static str, Trail);

    #[async_trait]
    impl CommandMiddleware for Trace {
        async fn handle(
            &self,
            ctx: &Context,
            command: &dyn Command,
            next: &dyn CommandHandler,
        ) -> Result<(), DomainError> {
            self.1.lock().push(format!(
                "{} {} {}",
                self.0,
                command.command_type(),
                ctx.correlation_id()
            ));
            next.handle_command(ctx, command).await
        }
    }

    struct Deny;

    #[async_trait]
    impl CommandMiddleware for Deny {
        async fn handle(
            &self,
            _ctx: &Context,
            command: &dyn Command,
            _next: &dyn CommandHandler,
        ) -> Result<(), DomainError> {
            Err(DomainError::Validation(format!("{} not allowed", command.command_type())))
        }
    }

    #[test]
    fn test_build_without_store_fails() {
        let result = EngineBuilder::new().build();

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_duplicate_command_routing_fails_build() {
        let mut builder = builder();
        builder.wire_aggregate("Account", account).command::<Open>();
        builder.wire_aggregate("Ledger", account).command::<Open>();

        let result = builder.build();

        assert!(matches!(result, Err(DomainError::DuplicateHandler("Open"))));
    }

    #[test]
    fn test_duplicate_event_registration_fails_build() {
        // Arrange
        let mut builder = builder();
        builder.register_event::<Audited>(false);

        // Act
        let result = builder.build();

        // Assert
        assert!(matches!(result, Err(DomainError::DuplicateEventType(name)) if name == "Audited"));
    }

    #[test]
    fn test_aggregate_wired_twice_fails_build() {
        let mut builder = builder();
        builder.wire_aggregate("Account", account).command::<Open>();
        builder.wire_aggregate("Account", account);

        let result = builder.build();

        assert!(matches!(result, Err(DomainError::Validation(message)) if message.contains("Account")));
    }

    #[tokio::test]
    async fn test_wire_command_handler_routes_dispatch_with_correlation_id() {
        // Arrange
        let inbox: Trail = Arc::default();
        let mut builder = builder();
        builder.wire_command_handler::<Open>(Arc::new(Inbox(Arc::clone(&inbox))));
        let engine = builder.build().unwrap();
        let correlation_id = Context::new().correlation_id();
        let ctx = Context::new().with_correlation_id(correlation_id);

        // Act
        engine
            .dispatch(&ctx, &Open { id: "A1".into(), owner: "ada".into() })
            .await
            .unwrap();

        // Assert
        assert_eq!(*inbox.lock(), vec![format!("Open {correlation_id}")]);
        assert_eq!(engine.store().stream_version(&ctx, "A1", "Account").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_command_handler_middleware_wraps_plain_handler() {
        let trail: Trail = Arc::default();
        let mut builder = builder();
        builder.wire_command_handler_with::<Open>(
            Arc::new(Inbox(Arc::clone(&trail))),
            &[Arc::new(Trace("audit", Arc::clone(&trail)))],
        );
        let engine = builder.build().unwrap();
        let ctx = Context::new();
        let id = ctx.correlation_id();

        engine
            .dispatch(&ctx, &Open { id: "A1".into(), owner: "ada".into() })
            .await
            .unwrap();

        assert_eq!(*trail.lock(), vec![format!("audit Open {id}"), format!("Open {id}")]);
    }

    #[tokio::test]
    async fn test_aggregate_middleware_runs_outside_command_middleware() {
        // Arrange
        let trail: Trail = Arc::default();
        let mut builder = builder();
        builder
            .wire_aggregate("Account", account)
            .middleware(Arc::new(Trace("outer", Arc::clone(&trail))))
            .middleware(Arc::new(Trace("inner", Arc::clone(&trail))))
            .command_with::<Open>(&[Arc::new(Trace("open", Arc::clone(&trail)))]);
        let engine = builder.build().unwrap();
        let ctx = Context::new();
        let id = ctx.correlation_id();

        // Act
        engine
            .dispatch(&ctx, &Open { id: "A1".into(), owner: "ada".into() })
            .await
            .unwrap();

        // Assert
        assert_eq!(
            *trail.lock(),
            vec![
                format!("outer Open {id}"),
                format!("inner Open {id}"),
                format!("open Open {id}"),
            ]
        );
        assert_eq!(engine.store().stream_version(&ctx, "A1", "Account").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_command_middleware_can_reject_before_the_aggregate_runs() {
        let mut builder = builder();
        builder
            .wire_aggregate("Account", account)
            .command_with::<Open>(&[Arc::new(Deny)]);
        let engine = builder.build().unwrap();
        let ctx = Context::new();

        let result = engine
            .dispatch(&ctx, &Open { id: "A1".into(), owner: "ada".into() })
            .await;

        assert!(matches!(result, Err(DomainError::Validation(message)) if message == "Open not allowed"));
        assert_eq!(engine.store().stream_version(&ctx, "A1", "Account").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replay_passes_aggregate_middleware_and_writes_projection() {
        // Arrange
        let trail: Trail = Arc::default();
        let mut builder = builder();
        builder
            .wire_aggregate("Account", account)
            .middleware(Arc::new(Trace("audit", Arc::clone(&trail))))
            .command_with::<Open>(&[Arc::new(Deny)]);
        let engine = builder.build().unwrap();
        let ctx = Context::new();
        let id = ctx.correlation_id();
        let reader = engine.reader("Account", account);

        // Act
        engine
            .replay(&ctx, &ReplayCommand::new("Account", "A1"))
            .await
            .unwrap();

        // Assert
        assert_eq!(*trail.lock(), vec![format!("audit ReplayCommand {id}")]);
        assert!(reader.load_projected(&ctx, "A1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_projecting_engine_keeps_readable_aggregate_state() {
        // Arrange
        let mut builder = builder();
        builder.project_aggregates(true);
        builder.wire_aggregate("Account", account).command::<Open>();
        let engine = builder.build().unwrap();
        let ctx = Context::new();
        let reader = engine.reader("Account", account);

        // Act
        engine
            .dispatch(&ctx, &Open { id: "A1".into(), owner: "ada".into() })
            .await
            .unwrap();
        engine
            .replay(&ctx, &ReplayCommand::new("Account", "A1"))
            .await
            .unwrap();

        // Assert
        let projected = reader.load_projected(&ctx, "A1").await.unwrap().unwrap();
        assert_eq!(projected.owner.as_deref(), Some("ada"));
        assert_eq!(projected.version(), 2);
        assert_eq!(engine.store().stream_version(&ctx, "A1", "Account").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replay_of_unwired_aggregate_fails() {
        let engine = builder().build().unwrap();

        let result = engine
            .replay(&Context::new(), &ReplayCommand::new("Ledger", "L1"))
            .await;

        assert!(matches!(result, Err(DomainError::UnknownAggregateType(name)) if name == "Ledger"));
    }

    #[tokio::test]
    async fn test_dispatch_runs_handlers_and_forwards_non_local_events() {
        let projection = RecordingEventHandler::new();
        let publisher = Arc::new(RecordingPublisher::new());
        let mut builder = builder();
        builder.wire_aggregate("Account", account).command::<Open>();
        builder
            .wire_event_handler(Arc::new(projection.clone()))
            .add_publisher(publisher.clone());
        let engine = builder.build().unwrap();
        let ctx = Context::new();

        engine
            .dispatch(&ctx, &Open { id: "A1".into(), owner: "ada".into() })
            .await
            .unwrap();

        assert_eq!(projection.event_types(), vec!["Opened", "Audited"]);
        let published: Vec<String> = publisher
            .published()
            .into_iter()
            .map(|event| event.event_type)
            .collect();
        assert_eq!(published, vec!["Opened"]);

        let loaded = engine.reader("Account", account).load(&ctx, "A1").await.unwrap();
        assert_eq!(loaded.owner.as_deref(), Some("ada"));
        assert_eq!(loaded.version(), 2);
    }

    #[tokio::test]
    async fn test_deliver_reaches_local_handlers_only() {
        let projection = RecordingEventHandler::new();
        let publisher = Arc::new(RecordingPublisher::new());
        let mut builder = builder();
        builder
            .wire_event_handler(Arc::new(projection.clone()))
            .add_publisher(publisher.clone());
        let engine = builder.build().unwrap();
        let envelope = json!({
            "aggregate_id": "A9",
            "aggregate_type": "Account",
            "event_type": "Opened",
            "version": 3,
            "timestamp": "2026-01-15T10:00:00Z",
            "data": { "owner": "grace" }
        });

        engine
            .deliver(&Context::new(), "Opened", envelope.to_string().as_bytes())
            .await
            .unwrap();

        let events = projection.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].aggregate_id, "A9");
        assert_eq!(events[0].data["owner"], "grace");
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_rejects_unknown_type() {
        let engine = builder().build().unwrap();

        let result = engine.deliver(&Context::new(), "Closed", b"{}").await;

        assert!(matches!(result, Err(DomainError::UnknownEventType(name)) if name == "Closed"));
    }

    #[tokio::test]
    async fn test_close_reports_publisher_error_and_still_closes_store() {
        let mut builder = builder();
        builder.add_publisher(Arc::new(FailingPublisher::new()));
        let engine = builder.build().unwrap();
        let ctx = Context::new();

        let result = engine.close().await;

        assert!(matches!(result, Err(DomainError::Publish(_))));
        assert!(engine.store().stream_version(&ctx, "A1", "Account").await.is_err());
    }

    #[test]
    fn test_builder_settings_shape_snapshot_policy() {
        let mut builder = builder();
        builder
            .snapshot_min_version_diff(5)
            .snapshot_revision("v3")
            .publish_mode(PublishMode::Concurrent);
        let engine = builder.build().unwrap();

        assert_eq!(engine.snapshots, SnapshotPolicy::every(5).with_revision("v3"));
        assert_eq!(engine.event_bus().mode(), PublishMode::Concurrent);
    }
}
