//! Pipeline assembly and lifecycle.

use std::sync::Arc;

use threadline_conversation::{ConversationDeps, register_all};
use threadline_core::bus::MessagePublisher;
use threadline_core::clock::Clock;
use threadline_core::generation::AssistantGenerator;
use threadline_core::ids::IdGenerator;
use threadline_core::repository::{DomainRepository, OutboxStore};
use threadline_pipeline::dead_letter::DeadLetterSink;
use threadline_pipeline::event_processor::EventProcessor;
use threadline_pipeline::outbox::OutboxService;
use threadline_pipeline::processor::CommandProcessor;
use threadline_pipeline::registry::RegistryBuilder;
use threadline_pipeline::worker::PartitionedWorkers;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bus::TopicRouter;
use crate::config::AppConfig;
use crate::state::AppState;

/// Collaborators the pipeline runs against.
#[derive(Clone)]
pub struct RuntimeDeps {
    /// Domain store.
    pub repository: Arc<dyn DomainRepository>,
    /// Outbox access, usually the same store.
    pub outbox_store: Arc<dyn OutboxStore>,
    /// Destination of outbox, domain-change and dead-letter traffic.
    pub publisher: Arc<dyn MessagePublisher>,
    /// Assistant text generation.
    pub generator: Arc<dyn AssistantGenerator>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Id source.
    pub ids: Arc<dyn IdGenerator>,
}

/// The running command and event pipelines plus the outbox sweeper.
#[derive(Debug)]
pub struct Runtime {
    state: AppState,
    events: PartitionedWorkers,
    commands: PartitionedWorkers,
    stop_sweeper: watch::Sender<bool>,
    sweeper: JoinHandle<()>,
}

impl Runtime {
    /// Builds the registry and starts the workers and the sweeper. The
    /// sweeper's first pass redelivers records left by a previous run.
    #[must_use]
    pub fn start(config: &AppConfig, deps: RuntimeDeps) -> Self {
        let mut builder = RegistryBuilder::new();
        register_all(
            &mut builder,
            &ConversationDeps {
                repository: Arc::clone(&deps.repository),
                generator: Arc::clone(&deps.generator),
                clock: Arc::clone(&deps.clock),
                ids: Arc::clone(&deps.ids),
                server_id: config.server_id.clone(),
                assistant_id: config.assistant_id.clone(),
            },
        );
        let registry = Arc::new(builder.build());
        info!(?registry, "Registry built");

        let dead_letters = || {
            DeadLetterSink::new(
                Arc::clone(&deps.publisher),
                config.topics.dead_letter.clone(),
                Arc::clone(&deps.clock),
                Arc::clone(&deps.ids),
            )
        };
        let outbox = Arc::new(OutboxService::new(
            Arc::clone(&deps.repository),
            Arc::clone(&deps.outbox_store),
            Arc::clone(&deps.publisher),
            config.topics.clone(),
            Arc::clone(&deps.clock),
            Arc::clone(&deps.ids),
        ));

        let command_processor = Arc::new(CommandProcessor::new(
            Arc::clone(&registry),
            Arc::clone(&outbox),
            dead_letters(),
        ));
        let commands = PartitionedWorkers::spawn(
            "commands",
            config.partitions,
            config.queue_depth,
            command_processor,
        );

        let router = Arc::new(
            TopicRouter::new(Arc::clone(&deps.publisher))
                .with_local(config.topics.commands.clone(), commands.handle()),
        );
        let event_processor = Arc::new(EventProcessor::new(
            registry,
            router,
            config.topics.commands.clone(),
            dead_letters(),
        ));
        let events = PartitionedWorkers::spawn(
            "events",
            config.partitions,
            config.queue_depth,
            event_processor,
        );

        let (stop_sweeper, sweeper_rx) = watch::channel(false);
        let sweeper = outbox.spawn_sweeper(config.sweep_interval, config.sweep_batch, sweeper_rx);

        Self {
            state: AppState::new(events.handle(), commands.handle()),
            events,
            commands,
            stop_sweeper,
            sweeper,
        }
    }

    /// State for the HTTP routes.
    #[must_use]
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Drains the event workers, then the command workers they feed, then
    /// stops the sweeper.
    pub async fn shutdown(self) {
        self.events.shutdown().await;
        self.commands.shutdown().await;
        // The sweeper may already have exited and dropped its receiver.
        let _ = self.stop_sweeper.send(true);
        if let Err(e) = self.sweeper.await {
            error!(error = %e, "Outbox sweeper failed");
        }
        info!("Pipeline stopped");
    }
}
