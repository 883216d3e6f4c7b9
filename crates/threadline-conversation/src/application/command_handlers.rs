//! Command handlers for the Conversation context.
//!
//! Each handler registers its payload schema and one reducer per aggregate
//! scope it touches. Reducers load the current snapshot, compute the events
//! and the advanced snapshot, and leave persistence to the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use threadline_core::aggregate::{AggregateKey, AggregateType};
use threadline_core::clock::Clock;
use threadline_core::command::CommandEnvelope;
use threadline_core::error::DomainError;
use threadline_core::event::{DomainEventEnvelope, EventEnvelope, MessageEnvelope};
use threadline_core::generation::AssistantGenerator;
use threadline_core::ids::{IdGenerator, derive_event_id};
use threadline_core::outbox::OutboxRecord;
use threadline_core::reduction::{ReduceContext, ReductionResult};
use threadline_core::repository::DomainRepository;
use threadline_core::schema::TypedPayload;
use threadline_core::snapshot::ThreadSnapshot;
use threadline_pipeline::registry::{CommandHandler, CommandReducer, RegistryBuilder};
use tracing::debug;

use crate::domain::aggregates::{
    apply_server_event, apply_thread_event, apply_user_event, next_occurred_at,
};
use crate::domain::commands::{
    CREATE_THREAD, CreateThreadPayload, GENERATE_ASSISTANT_RESPONSE,
    GenerateAssistantResponsePayload, RENAME_THREAD, RenameThreadPayload, SAVE_USER_MESSAGE,
    SaveUserMessagePayload,
};
use crate::domain::events::{
    MessageAdded, ServerEventKind, ServerUserJoined, ThreadCreated, ThreadEventKind,
    ThreadTitleUpdated, UserEventKind, UserThreadAdded,
};
use crate::domain::messages::{
    ASSISTANT_MESSAGE, AssistantMessageBody, USER_MESSAGE, UserMessageBody,
    register_message_schemas,
};

fn domain_event(
    command: &CommandEnvelope,
    key: AggregateKey,
    event_type: &str,
    payload: Value,
    occurred_at: i64,
    version: i64,
) -> DomainEventEnvelope {
    DomainEventEnvelope {
        event_id: derive_event_id(&command.id, &key, event_type),
        occurred_at,
        aggregate_id: key.aggregate_id,
        aggregate_type: key.aggregate_type,
        event_type: event_type.to_owned(),
        payload,
        version: Some(version),
    }
}

/// Applies `event` to the current thread snapshot and packages the event and
/// the advanced snapshot as a reduction.
fn reduce_thread_event(
    command: &CommandEnvelope,
    current: Option<&ThreadSnapshot>,
    thread_id: &str,
    event: &ThreadEventKind,
    occurred_at: i64,
) -> Result<ReductionResult, DomainError> {
    let next = apply_thread_event(current, thread_id, event, occurred_at)?;
    let recorded = domain_event(
        command,
        AggregateKey::thread(thread_id),
        event.event_type(),
        event.to_payload(),
        occurred_at,
        next.version,
    );
    Ok(ReductionResult {
        domain_events: vec![recorded],
        snapshots: vec![next.into()],
        outbox_records: Vec::new(),
    })
}

// --- save user message ---

/// Persists a user's chat message into its thread.
pub struct SaveUserMessage {
    repository: Arc<dyn DomainRepository>,
    clock: Arc<dyn Clock>,
}

impl SaveUserMessage {
    /// Creates the handler.
    #[must_use]
    pub fn new(repository: Arc<dyn DomainRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }
}

#[async_trait]
impl CommandReducer for SaveUserMessage {
    async fn reduce(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError> {
        let payload: SaveUserMessagePayload =
            ctx.schemas.commands.parse(command, Some(SAVE_USER_MESSAGE))?;
        ctx.schemas
            .events
            .parse_payload::<UserMessageBody>(USER_MESSAGE, &command.payload)?;

        let thread = self
            .repository
            .load_thread(&payload.thread_id)
            .await?
            .ok_or_else(|| DomainError::not_found(AggregateType::Thread, &payload.thread_id))?;

        let event = ThreadEventKind::MessageAdded(MessageAdded {
            author_id: ctx.author_id().to_owned(),
            message: MessageEnvelope {
                message_type: USER_MESSAGE.to_owned(),
                payload: command.payload.clone(),
            },
        });
        let occurred_at = next_occurred_at(self.clock.now_millis(), Some(thread.updated_at));

        debug!(thread_id = %payload.thread_id, message_id = %payload.message_id, "Saving user message");
        reduce_thread_event(command, Some(&thread), &payload.thread_id, &event, occurred_at)
    }

    fn name(&self) -> &'static str {
        "SaveUserMessage"
    }
}

impl CommandHandler for SaveUserMessage {
    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        let schemas = registry.schemas_mut();
        schemas.commands.register(
            SAVE_USER_MESSAGE,
            TypedPayload::<SaveUserMessagePayload>::with_check(SaveUserMessagePayload::check),
        );
        register_message_schemas(&mut schemas.events);
        registry.register_thread_reducer(SAVE_USER_MESSAGE, self);
    }
}

// --- reply with assistant message ---

/// Generates an assistant reply, records it in the thread and echoes it back
/// to the originating session.
pub struct ReplyWithAssistantMessage {
    repository: Arc<dyn DomainRepository>,
    generator: Arc<dyn AssistantGenerator>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    assistant_id: String,
}

impl ReplyWithAssistantMessage {
    /// Creates the handler. Replies are credited to `assistant_id`.
    #[must_use]
    pub fn new(
        repository: Arc<dyn DomainRepository>,
        generator: Arc<dyn AssistantGenerator>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        assistant_id: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            generator,
            clock,
            ids,
            assistant_id: assistant_id.into(),
        }
    }
}

#[async_trait]
impl CommandReducer for ReplyWithAssistantMessage {
    async fn reduce(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError> {
        let payload: GenerateAssistantResponsePayload = ctx
            .schemas
            .commands
            .parse(command, Some(GENERATE_ASSISTANT_RESPONSE))?;

        let thread = self
            .repository
            .load_thread(&payload.thread_id)
            .await?
            .ok_or_else(|| DomainError::not_found(AggregateType::Thread, &payload.thread_id))?;

        let text = self.generator.generate(&payload.prompt).await?;

        let occurred_at = next_occurred_at(self.clock.now_millis(), Some(thread.updated_at));
        let body = AssistantMessageBody {
            message_id: self.ids.next_id(),
            response_to: payload.response_to,
            thread_id: payload.thread_id.clone(),
            assistant_id: self.assistant_id.clone(),
            timestamp: occurred_at,
            body: text,
        };
        let body = serde_json::to_value(&body)?;
        ctx.schemas
            .events
            .parse_payload::<AssistantMessageBody>(ASSISTANT_MESSAGE, &body)?;

        let event = ThreadEventKind::MessageAdded(MessageAdded {
            author_id: self.assistant_id.clone(),
            message: MessageEnvelope {
                message_type: ASSISTANT_MESSAGE.to_owned(),
                payload: body.clone(),
            },
        });
        let mut result =
            reduce_thread_event(command, Some(&thread), &payload.thread_id, &event, occurred_at)?;

        let echo = EventEnvelope::new(
            self.ids.next_id(),
            occurred_at,
            ASSISTANT_MESSAGE,
            body,
            ctx.session_id,
            Some(ctx.author_id().to_owned()),
        );
        result
            .outbox_records
            .push(OutboxRecord::echo(self.ids.next_id(), occurred_at, echo));

        debug!(thread_id = %payload.thread_id, "Recorded assistant reply");
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "ReplyWithAssistantMessage"
    }
}

impl CommandHandler for ReplyWithAssistantMessage {
    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        let schemas = registry.schemas_mut();
        schemas.commands.register(
            GENERATE_ASSISTANT_RESPONSE,
            TypedPayload::<GenerateAssistantResponsePayload>::with_check(
                GenerateAssistantResponsePayload::check,
            ),
        );
        register_message_schemas(&mut schemas.events);
        registry.register_thread_reducer(GENERATE_ASSISTANT_RESPONSE, self);
    }
}

// --- create thread ---

/// Opens a thread. Contributes to all three scopes: the thread itself, the
/// owner's thread list, and server membership on the owner's first thread.
pub struct CreateThread {
    repository: Arc<dyn DomainRepository>,
    clock: Arc<dyn Clock>,
    server_id: String,
}

impl CreateThread {
    /// Creates the handler. Users join the server `server_id`.
    #[must_use]
    pub fn new(
        repository: Arc<dyn DomainRepository>,
        clock: Arc<dyn Clock>,
        server_id: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            clock,
            server_id: server_id.into(),
        }
    }

    fn payload(
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<CreateThreadPayload, DomainError> {
        ctx.schemas.commands.parse(command, Some(CREATE_THREAD))
    }

    async fn reduce_server(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError> {
        Self::payload(command, ctx)?;
        let user_id = ctx.author_id();

        let user = self.repository.load_user(user_id).await?;
        if user.is_some_and(|user| !user.threads.is_empty()) {
            return Ok(ReductionResult::empty());
        }
        let server = self.repository.load_server(&self.server_id).await?;
        if server
            .as_ref()
            .is_some_and(|server| server.users.iter().any(|id| id == user_id))
        {
            return Ok(ReductionResult::empty());
        }

        let event = ServerEventKind::UserJoined(ServerUserJoined {
            user_id: user_id.to_owned(),
        });
        let occurred_at = next_occurred_at(
            self.clock.now_millis(),
            server.as_ref().map(|server| server.updated_at),
        );
        let next = apply_server_event(server.as_ref(), &self.server_id, &event, occurred_at);
        Ok(ReductionResult {
            domain_events: vec![domain_event(
                command,
                AggregateKey::server(self.server_id.clone()),
                event.event_type(),
                event.to_payload(),
                occurred_at,
                next.version,
            )],
            snapshots: vec![next.into()],
            outbox_records: Vec::new(),
        })
    }

    async fn reduce_user(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError> {
        let payload = Self::payload(command, ctx)?;
        let user_id = ctx.author_id();

        let user = self.repository.load_user(user_id).await?;
        if user
            .as_ref()
            .is_some_and(|user| user.threads.contains(&payload.thread_id))
        {
            return Ok(ReductionResult::empty());
        }

        let event = UserEventKind::ThreadAdded(UserThreadAdded {
            thread_id: payload.thread_id,
        });
        let occurred_at = next_occurred_at(
            self.clock.now_millis(),
            user.as_ref().map(|user| user.updated_at),
        );
        let next = apply_user_event(user.as_ref(), user_id, &event, occurred_at);
        Ok(ReductionResult {
            domain_events: vec![domain_event(
                command,
                AggregateKey::user(user_id),
                event.event_type(),
                event.to_payload(),
                occurred_at,
                next.version,
            )],
            snapshots: vec![next.into()],
            outbox_records: Vec::new(),
        })
    }

    async fn reduce_thread(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError> {
        let payload = Self::payload(command, ctx)?;
        let event = ThreadEventKind::Created(ThreadCreated {
            thread_id: payload.thread_id.clone(),
            user_id: ctx.author_id().to_owned(),
            title: payload.title,
        });
        // A thread id already in use collides on snapshot version 1.
        reduce_thread_event(
            command,
            None,
            &payload.thread_id,
            &event,
            self.clock.now_millis(),
        )
    }
}

impl CommandHandler for CreateThread {
    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        registry.schemas_mut().commands.register(
            CREATE_THREAD,
            TypedPayload::<CreateThreadPayload>::with_check(CreateThreadPayload::check),
        );
        registry.register_server_reducer(CREATE_THREAD, Arc::new(JoinServer(Arc::clone(&self))));
        registry.register_user_reducer(CREATE_THREAD, Arc::new(AddUserThread(Arc::clone(&self))));
        registry.register_thread_reducer(CREATE_THREAD, Arc::new(StartThread(self)));
    }
}

/// Server-scope half of [`CreateThread`].
struct JoinServer(Arc<CreateThread>);

#[async_trait]
impl CommandReducer for JoinServer {
    async fn reduce(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError> {
        self.0.reduce_server(command, ctx).await
    }

    fn name(&self) -> &'static str {
        "CreateThread::JoinServer"
    }
}

/// User-scope half of [`CreateThread`].
struct AddUserThread(Arc<CreateThread>);

#[async_trait]
impl CommandReducer for AddUserThread {
    async fn reduce(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError> {
        self.0.reduce_user(command, ctx).await
    }

    fn name(&self) -> &'static str {
        "CreateThread::AddUserThread"
    }
}

/// Thread-scope half of [`CreateThread`].
struct StartThread(Arc<CreateThread>);

#[async_trait]
impl CommandReducer for StartThread {
    async fn reduce(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError> {
        self.0.reduce_thread(command, ctx).await
    }

    fn name(&self) -> &'static str {
        "CreateThread::StartThread"
    }
}

// --- rename thread ---

/// Changes a thread's title.
pub struct RenameThread {
    repository: Arc<dyn DomainRepository>,
    clock: Arc<dyn Clock>,
}

impl RenameThread {
    /// Creates the handler.
    #[must_use]
    pub fn new(repository: Arc<dyn DomainRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }
}

#[async_trait]
impl CommandReducer for RenameThread {
    async fn reduce(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError> {
        let payload: RenameThreadPayload =
            ctx.schemas.commands.parse(command, Some(RENAME_THREAD))?;
        let thread = self.repository.load_thread(&payload.thread_id).await?;
        let occurred_at = next_occurred_at(
            self.clock.now_millis(),
            thread.as_ref().map(|thread| thread.updated_at),
        );
        let event = ThreadEventKind::TitleUpdated(ThreadTitleUpdated {
            title: payload.title,
        });
        reduce_thread_event(command, thread.as_ref(), &payload.thread_id, &event, occurred_at)
    }

    fn name(&self) -> &'static str {
        "RenameThread"
    }
}

impl CommandHandler for RenameThread {
    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        registry.schemas_mut().commands.register(
            RENAME_THREAD,
            TypedPayload::<RenameThreadPayload>::with_check(RenameThreadPayload::check),
        );
        registry.register_thread_reducer(RENAME_THREAD, self);
    }
}
