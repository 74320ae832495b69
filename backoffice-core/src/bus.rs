//! Command bus.
//!
//! Commands are typed messages implementing [`Message`]. Handlers register by
//! type; a name table maps `Message::NAME` to a factory (payload → message)
//! and, when the typed path is wired, a dispatcher. Panels dispatch by name
//! from request payloads; application code dispatches typed messages
//! directly.
//!
//! ```text
//!  dispatch_by_name(name, payload, ids)
//!        │
//!        ▼
//!  ┌──────────────┐  factory   ┌───────────┐  dispatcher  ┌─────────────────┐
//!  │  name table  │──────────▶ │  M: Msg   │─────────────▶│ CommandHandler  │
//!  └──────────────┘ (validate) └───────────┘              └─────────────────┘
//! ```
//!
//! Registration is serialized under a single lock. Dispatch only holds the
//! lock long enough to clone the handler out.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::context::AdminContext;
use crate::error::{AdminError, Result};

/// Typed command or query message.
pub trait Message: DeserializeOwned + Send + Sync + 'static {
    /// Stable name used by the name table.
    const NAME: &'static str;

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Build from a request payload. Record ids are injected as `ids` when
    /// the payload object does not already carry them.
    fn from_payload(payload: &Value, ids: &[String]) -> Result<Self> {
        let mut payload = match payload {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        if let Value::Object(map) = &mut payload {
            if !ids.is_empty() && !map.contains_key("ids") {
                map.insert("ids".into(), Value::from(ids.to_vec()));
            }
        }
        serde_json::from_value(payload).map_err(|e| {
            AdminError::validation(format!("invalid payload for {}: {}", Self::NAME, e))
                .with_component("command_bus")
        })
    }
}

/// Message with a typed response.
pub trait Query: Message {
    type Output: Send + 'static;
}

#[async_trait]
pub trait CommandHandler<M: Message>: Send + Sync {
    async fn execute(&self, ctx: &AdminContext, message: M) -> Result<()>;
}

#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    async fn query(&self, ctx: &AdminContext, query: Q) -> Result<Q::Output>;
}

/// Answers whether a command name can be dispatched.
pub trait CommandCatalog: Send + Sync {
    fn has_command(&self, name: &str) -> bool;
}

impl CommandCatalog for BTreeSet<String> {
    fn has_command(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// Handle for tearing down a handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    kind: HandlerKind,
    type_id: TypeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HandlerKind {
    Command,
    Query,
}

type BoxedMessage = Box<dyn Any + Send>;
type Factory = Arc<dyn Fn(&Value, &[String]) -> Result<BoxedMessage> + Send + Sync>;
type Dispatcher =
    Arc<dyn Fn(AdminContext, BoxedMessage) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Clone)]
struct NamedEntry {
    factory: Factory,
    dispatcher: Option<Dispatcher>,
}

struct Slot {
    subscription_id: u64,
    /// `Arc<dyn CommandHandler<M>>` or `Arc<dyn QueryHandler<Q>>`
    handler: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Registry {
    commands: HashMap<TypeId, Slot>,
    queries: HashMap<TypeId, Slot>,
    named: HashMap<String, NamedEntry>,
}

struct BusInner {
    enabled: AtomicBool,
    next_subscription: AtomicU64,
    registry: Mutex<Registry>,
}

/// Typed command bus with a name table.
#[derive(Clone)]
pub struct CommandBus {
    inner: Arc<BusInner>,
}

impl CommandBus {
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: Arc::new(BusInner {
                enabled: AtomicBool::new(enabled),
                next_subscription: AtomicU64::new(1),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    pub fn enabled() -> Self {
        Self::new(true)
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_subscription(&self) -> u64 {
        self.inner.next_subscription.fetch_add(1, Ordering::SeqCst)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register the typed handler for `M`. Returns `None` on a disabled bus.
    /// A second registration for the same type replaces the first.
    pub fn register_command<M, H>(&self, handler: H) -> Option<Subscription>
    where
        M: Message,
        H: CommandHandler<M> + 'static,
    {
        if !self.is_enabled() {
            debug!(command = M::NAME, "Command bus disabled; handler not registered");
            return None;
        }
        let handler: Arc<dyn CommandHandler<M>> = Arc::new(handler);
        let id = self.next_subscription();
        let type_id = TypeId::of::<M>();
        self.registry().commands.insert(
            type_id,
            Slot {
                subscription_id: id,
                handler: Arc::new(handler),
            },
        );
        debug!(command = M::NAME, subscription = id, "Command handler registered");
        Some(Subscription {
            id,
            kind: HandlerKind::Command,
            type_id,
        })
    }

    /// Register the typed handler for query `Q`. Returns `None` on a disabled
    /// bus.
    pub fn register_query<Q, H>(&self, handler: H) -> Option<Subscription>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        if !self.is_enabled() {
            return None;
        }
        let handler: Arc<dyn QueryHandler<Q>> = Arc::new(handler);
        let id = self.next_subscription();
        let type_id = TypeId::of::<Q>();
        self.registry().queries.insert(
            type_id,
            Slot {
                subscription_id: id,
                handler: Arc::new(handler),
            },
        );
        Some(Subscription {
            id,
            kind: HandlerKind::Query,
            type_id,
        })
    }

    /// Register `M::NAME` with the default payload factory and a dispatcher
    /// that routes to the typed handler.
    pub fn register_message_factory<M: Message>(&self) -> Result<()> {
        self.register_message_factory_with::<M, _>(M::from_payload)
    }

    /// Register `M::NAME` with a custom payload factory.
    pub fn register_message_factory_with<M, F>(&self, build: F) -> Result<()>
    where
        M: Message,
        F: Fn(&Value, &[String]) -> Result<M> + Send + Sync + 'static,
    {
        let dispatcher = self.typed_dispatcher::<M>();
        self.insert_named(M::NAME, Self::erase_factory(build), Some(dispatcher))
    }

    /// Register `M::NAME` for payload validation only. Dispatching it by name
    /// builds and validates the message, then reports the service as
    /// unavailable.
    pub fn register_factory_only<M: Message>(&self) -> Result<()> {
        self.insert_named(M::NAME, Self::erase_factory(M::from_payload), None)
    }

    fn erase_factory<M, F>(build: F) -> Factory
    where
        M: Message,
        F: Fn(&Value, &[String]) -> Result<M> + Send + Sync + 'static,
    {
        Arc::new(move |payload: &Value, ids: &[String]| {
            let message = build(payload, ids)?;
            message.validate()?;
            Ok(Box::new(message) as BoxedMessage)
        })
    }

    fn typed_dispatcher<M: Message>(&self) -> Dispatcher {
        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        Arc::new(move |ctx: AdminContext, boxed: BoxedMessage| {
            let weak = weak.clone();
            async move {
                let inner = weak
                    .upgrade()
                    .ok_or_else(|| AdminError::ServiceUnavailable("command bus dropped".into()))?;
                let bus = CommandBus { inner };
                let message = boxed.downcast::<M>().map_err(|_| {
                    AdminError::Internal(format!("factory for {} built the wrong type", M::NAME))
                })?;
                let handler = bus.command_handler::<M>()?;
                handler.execute(&ctx, *message).await
            }
            .boxed()
        })
    }

    fn insert_named(
        &self,
        name: &str,
        factory: Factory,
        dispatcher: Option<Dispatcher>,
    ) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AdminError::invalid_field("name", "message name must not be empty")
                .with_component("command_bus"));
        }
        let mut registry = self.registry();
        if registry.named.contains_key(name) {
            return Err(AdminError::conflict(
                "duplicate_message_factory",
                format!("message factory {name:?} is already registered"),
                Default::default(),
            ));
        }
        let typed = dispatcher.is_some();
        registry.named.insert(
            name.to_string(),
            NamedEntry {
                factory,
                dispatcher,
            },
        );
        info!(command = %name, dispatcher = typed, "Message factory registered");
        Ok(())
    }

    /// Remove a handler registration. Stale subscriptions are ignored.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut registry = self.registry();
        let slots = match subscription.kind {
            HandlerKind::Command => &mut registry.commands,
            HandlerKind::Query => &mut registry.queries,
        };
        if slots
            .get(&subscription.type_id)
            .is_some_and(|slot| slot.subscription_id == subscription.id)
        {
            slots.remove(&subscription.type_id);
        }
    }

    /// Drop every handler, factory and dispatcher.
    pub fn reset(&self) {
        let mut registry = self.registry();
        registry.commands.clear();
        registry.queries.clear();
        registry.named.clear();
        info!("Command bus reset");
    }

    pub fn has_factory(&self, name: &str) -> bool {
        self.registry().named.contains_key(name)
    }

    pub fn factory_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry().named.keys().cloned().collect();
        names.sort();
        names
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn command_handler<M: Message>(&self) -> Result<Arc<dyn CommandHandler<M>>> {
        let registry = self.registry();
        registry
            .commands
            .get(&TypeId::of::<M>())
            .and_then(|slot| slot.handler.downcast_ref::<Arc<dyn CommandHandler<M>>>())
            .cloned()
            .ok_or_else(|| {
                AdminError::ServiceUnavailable(format!("no handler registered for {}", M::NAME))
            })
    }

    fn query_handler<Q: Query>(&self) -> Result<Arc<dyn QueryHandler<Q>>> {
        let registry = self.registry();
        registry
            .queries
            .get(&TypeId::of::<Q>())
            .and_then(|slot| slot.handler.downcast_ref::<Arc<dyn QueryHandler<Q>>>())
            .cloned()
            .ok_or_else(|| {
                AdminError::ServiceUnavailable(format!("no handler registered for {}", Q::NAME))
            })
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(AdminError::feature_disabled("commands"))
        }
    }

    /// Validate and dispatch a typed command.
    pub async fn dispatch<M: Message>(&self, ctx: &AdminContext, message: M) -> Result<()> {
        self.ensure_enabled()?;
        message.validate()?;
        let handler = self.command_handler::<M>()?;
        handler.execute(ctx, message).await
    }

    /// Validate and run a typed query.
    pub async fn query<Q: Query>(&self, ctx: &AdminContext, query: Q) -> Result<Q::Output> {
        self.ensure_enabled()?;
        query.validate()?;
        let handler = self.query_handler::<Q>()?;
        handler.query(ctx, query).await
    }

    /// Build a message from a payload via the name table and dispatch it.
    pub async fn dispatch_by_name(
        &self,
        ctx: &AdminContext,
        name: &str,
        payload: &Value,
        ids: &[String],
    ) -> Result<()> {
        self.ensure_enabled()?;
        let entry = self
            .registry()
            .named
            .get(name)
            .cloned()
            .ok_or_else(|| AdminError::not_found("command", name))?;

        let message = (entry.factory)(payload, ids)?;
        match entry.dispatcher {
            Some(dispatcher) => {
                debug!(command = %name, ids = ids.len(), "Dispatching command by name");
                dispatcher(ctx.clone(), message).await
            }
            None => Err(AdminError::ServiceUnavailable(format!(
                "no dispatcher registered for {name}"
            ))),
        }
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::enabled()
    }
}

impl CommandCatalog for CommandBus {
    fn has_command(&self, name: &str) -> bool {
        self.has_factory(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Deserialize)]
    struct ArchivePages {
        ids: Vec<String>,
        #[serde(default)]
        reason: String,
    }

    impl Message for ArchivePages {
        const NAME: &'static str = "pages.archive";

        fn validate(&self) -> Result<()> {
            if self.ids.is_empty() {
                return Err(AdminError::invalid_field("ids", "at least one id is required"));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counter {
        calls: Arc<AtomicUsize>,
        last_reason: Arc<Mutex<String>>,
    }

    #[async_trait]
    impl CommandHandler<ArchivePages> for Counter {
        async fn execute(&self, _ctx: &AdminContext, message: ArchivePages) -> Result<()> {
            self.calls.fetch_add(message.ids.len(), Ordering::SeqCst);
            *self.last_reason.lock().unwrap() = message.reason;
            Ok(())
        }
    }

    #[derive(Debug, Deserialize)]
    struct CountPages;

    impl Message for CountPages {
        const NAME: &'static str = "pages.count";
    }

    impl Query for CountPages {
        type Output = usize;
    }

    struct Fixed(usize);

    #[async_trait]
    impl QueryHandler<CountPages> for Fixed {
        async fn query(&self, _ctx: &AdminContext, _query: CountPages) -> Result<usize> {
            Ok(self.0)
        }
    }

    fn ctx() -> AdminContext {
        AdminContext::new("tester")
    }

    #[tokio::test]
    async fn test_dispatch_by_name_injects_ids() {
        let bus = CommandBus::enabled();
        let counter = Counter::default();
        let calls = counter.calls.clone();
        let reason = counter.last_reason.clone();
        bus.register_command::<ArchivePages, _>(counter).unwrap();
        bus.register_message_factory::<ArchivePages>().unwrap();

        let ids = ["a".to_string(), "b".to_string()];
        bus.dispatch_by_name(&ctx(), "pages.archive", &json!({"reason": "stale"}), &ids)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*reason.lock().unwrap(), "stale");
    }

    #[tokio::test]
    async fn test_validation_failure_stops_dispatch() {
        let bus = CommandBus::enabled();
        let counter = Counter::default();
        let calls = counter.calls.clone();
        bus.register_command::<ArchivePages, _>(counter).unwrap();
        bus.register_message_factory::<ArchivePages>().unwrap();

        let err = bus
            .dispatch_by_name(&ctx(), "pages.archive", &json!({}), &[])
            .await
            .unwrap_err();

        assert_eq!(err.text_code(), "VALIDATION_ERROR");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_bus_reports_feature_disabled() {
        let bus = CommandBus::disabled();
        assert!(bus.register_command::<ArchivePages, _>(Counter::default()).is_none());

        let err = bus
            .dispatch_by_name(&ctx(), "pages.archive", &json!({}), &["a".into()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdminError::FeatureDisabled { ref feature } if feature == "commands"
        ));
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let bus = CommandBus::enabled();
        let err = bus
            .dispatch_by_name(&ctx(), "nope", &json!({}), &[])
            .await
            .unwrap_err();
        assert_eq!(err.text_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_factory_only_is_service_unavailable_after_validation() {
        let bus = CommandBus::enabled();
        bus.register_factory_only::<ArchivePages>().unwrap();

        let invalid = bus
            .dispatch_by_name(&ctx(), "pages.archive", &json!({}), &[])
            .await
            .unwrap_err();
        assert_eq!(invalid.text_code(), "VALIDATION_ERROR");

        let valid = bus
            .dispatch_by_name(&ctx(), "pages.archive", &json!({}), &["a".into()])
            .await
            .unwrap_err();
        assert_eq!(valid.text_code(), "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_duplicate_factory_fails() {
        let bus = CommandBus::enabled();
        bus.register_message_factory::<ArchivePages>().unwrap();
        let err = bus.register_message_factory::<ArchivePages>().unwrap_err();
        assert_eq!(err.conflict_type(), Some("duplicate_message_factory"));
    }

    #[tokio::test]
    async fn test_unsubscribe_and_reset() {
        let bus = CommandBus::enabled();
        let sub = bus
            .register_command::<ArchivePages, _>(Counter::default())
            .unwrap();
        bus.register_message_factory::<ArchivePages>().unwrap();

        bus.unsubscribe(sub);
        let err = bus
            .dispatch(&ctx(), ArchivePages { ids: vec!["a".into()], reason: String::new() })
            .await
            .unwrap_err();
        assert_eq!(err.text_code(), "SERVICE_UNAVAILABLE");

        bus.reset();
        assert!(!bus.has_factory("pages.archive"));
        assert!(bus.factory_names().is_empty());
    }

    #[tokio::test]
    async fn test_typed_query() {
        let bus = CommandBus::enabled();
        bus.register_query::<CountPages, _>(Fixed(7)).unwrap();
        assert_eq!(bus.query(&ctx(), CountPages).await.unwrap(), 7);
    }
}
