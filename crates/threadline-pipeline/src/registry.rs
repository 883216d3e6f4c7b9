//! Reducer and strategy registry.
//!
//! Handlers register their schemas, reducers and event strategies into a
//! [`RegistryBuilder`] once at startup. The built [`Registry`] is immutable
//! and shared read-only by every worker.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use threadline_core::aggregate::AggregateType;
use threadline_core::command::CommandEnvelope;
use threadline_core::error::DomainError;
use threadline_core::event::EventEnvelope;
use threadline_core::reduction::{ReduceContext, ReductionResult};
use threadline_core::schema::SchemaRegistries;

/// A structural constraint on a command beyond its type tag.
pub type CommandPredicate = fn(&CommandEnvelope) -> bool;

/// Computes the domain events, snapshots and outbox records that a command
/// produces for one aggregate scope.
#[async_trait]
pub trait CommandReducer: Send + Sync {
    /// Reduces `command`.
    ///
    /// # Errors
    ///
    /// Returns a `DomainError` when the payload is invalid, a required
    /// snapshot is missing, or a collaborator fails.
    async fn reduce(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Translates an inbound event into zero or more commands.
#[async_trait]
pub trait EventStrategy: Send + Sync {
    /// The event type this strategy handles.
    fn event_type(&self) -> &'static str;

    /// Finer-grained match within the event type.
    fn matches(&self, _event: &EventEnvelope) -> bool {
        true
    }

    /// Produces the commands for `event`.
    ///
    /// # Errors
    ///
    /// Returns a `DomainError` when the event body cannot be interpreted.
    async fn handle(
        &self,
        event: &EventEnvelope,
        schemas: &SchemaRegistries,
    ) -> Result<Vec<CommandEnvelope>, DomainError>;
}

/// A unit of business logic that installs itself into the registry.
pub trait CommandHandler: Send + Sync {
    /// Registers schemas, reducers and strategies.
    fn register(self: Arc<Self>, registry: &mut RegistryBuilder);
}

/// One registered reducer.
pub struct ReducerEntry {
    predicate: Option<CommandPredicate>,
    reducer: Arc<dyn CommandReducer>,
}

impl ReducerEntry {
    /// Returns the reducer.
    #[must_use]
    pub fn reducer(&self) -> &dyn CommandReducer {
        self.reducer.as_ref()
    }

    fn matches(&self, command: &CommandEnvelope) -> bool {
        self.predicate.is_none_or(|predicate| predicate(command))
    }
}

impl fmt::Debug for ReducerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerEntry")
            .field("reducer", &self.reducer.name())
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Command type tag -> reducers in registration order.
type Bucket = HashMap<String, Vec<ReducerEntry>>;

/// Mutable registry used during startup.
#[derive(Default)]
pub struct RegistryBuilder {
    buckets: HashMap<AggregateType, Bucket>,
    strategies: HashMap<String, Vec<Arc<dyn EventStrategy>>>,
    schemas: SchemaRegistries,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema registries for handlers to populate.
    pub fn schemas_mut(&mut self) -> &mut SchemaRegistries {
        &mut self.schemas
    }

    /// Registers a reducer for `command_type` in the given scope. Reducers
    /// in a scope are evaluated in registration order; the first whose
    /// predicate matches wins.
    pub fn register_reducer(
        &mut self,
        scope: AggregateType,
        command_type: &str,
        predicate: Option<CommandPredicate>,
        reducer: Arc<dyn CommandReducer>,
    ) {
        self.buckets
            .entry(scope)
            .or_default()
            .entry(command_type.to_owned())
            .or_default()
            .push(ReducerEntry { predicate, reducer });
    }

    /// Registers a server-scope reducer.
    pub fn register_server_reducer(&mut self, command_type: &str, reducer: Arc<dyn CommandReducer>) {
        self.register_reducer(AggregateType::Server, command_type, None, reducer);
    }

    /// Registers a user-scope reducer.
    pub fn register_user_reducer(&mut self, command_type: &str, reducer: Arc<dyn CommandReducer>) {
        self.register_reducer(AggregateType::User, command_type, None, reducer);
    }

    /// Registers a thread-scope reducer.
    pub fn register_thread_reducer(&mut self, command_type: &str, reducer: Arc<dyn CommandReducer>) {
        self.register_reducer(AggregateType::Thread, command_type, None, reducer);
    }

    /// Registers an event strategy.
    pub fn register_strategy(&mut self, strategy: Arc<dyn EventStrategy>) {
        self.strategies
            .entry(strategy.event_type().to_owned())
            .or_default()
            .push(strategy);
    }

    /// Lets `handler` register itself.
    pub fn install<H: CommandHandler + 'static>(&mut self, handler: Arc<H>) -> &mut Self {
        handler.register(self);
        self
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> Registry {
        Registry {
            buckets: self.buckets,
            strategies: self.strategies,
            schemas: self.schemas,
        }
    }
}

/// Immutable registry shared by all workers.
pub struct Registry {
    buckets: HashMap<AggregateType, Bucket>,
    strategies: HashMap<String, Vec<Arc<dyn EventStrategy>>>,
    schemas: SchemaRegistries,
}

impl Registry {
    /// The command and event schema registries.
    #[must_use]
    pub fn schemas(&self) -> &SchemaRegistries {
        &self.schemas
    }

    /// Returns the first reducer in `scope` that matches `command`.
    #[must_use]
    pub fn select(&self, scope: AggregateType, command: &CommandEnvelope) -> Option<&ReducerEntry> {
        self.buckets
            .get(&scope)?
            .get(&command.command_type)?
            .iter()
            .find(|entry| entry.matches(command))
    }

    /// Returns the strategies that apply to `event`, in registration order.
    pub fn strategies_for<'a>(
        &'a self,
        event: &'a EventEnvelope,
    ) -> impl Iterator<Item = &'a Arc<dyn EventStrategy>> + 'a {
        self.strategies
            .get(&event.event_type)
            .into_iter()
            .flatten()
            .filter(move |strategy| strategy.matches(event))
    }

    /// Number of reducers registered in `scope`.
    #[must_use]
    pub fn reducer_count(&self, scope: AggregateType) -> usize {
        self.buckets
            .get(&scope)
            .map_or(0, |bucket| bucket.values().map(Vec::len).sum())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("server_reducers", &self.reducer_count(AggregateType::Server))
            .field("user_reducers", &self.reducer_count(AggregateType::User))
            .field("thread_reducers", &self.reducer_count(AggregateType::Thread))
            .field("strategies", &self.strategies.len())
            .field("schemas", &self.schemas)
            .finish()
    }
}
