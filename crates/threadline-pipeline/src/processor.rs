//! Command processor: parse, validate, reduce, persist, dispatch.
//!
//! Every stage short-circuits on error. Errors are routed to the
//! dead-letter sink and the message counts as handled, except a duplicate
//! transaction, which means an earlier delivery already applied the
//! command.
//!
//! A command keyed by one aggregate may also touch shared ones (a thread
//! creation joins the server), so two partitions can race on the same
//! snapshot version. The loser reduces again against fresh snapshots, up to
//! [`MAX_REDUCE_ATTEMPTS`] times, before the conflict is dead-lettered.

use std::sync::Arc;

use async_trait::async_trait;
use threadline_core::command::CommandEnvelope;
use threadline_core::error::DomainError;
use threadline_core::reduction::ReduceContext;
use tracing::{Span, info, instrument, warn};

use crate::dead_letter::DeadLetterSink;
use crate::outbox::{DispatchReport, OutboxService};
use crate::reducer_chain::ReducerChain;
use crate::registry::Registry;
use crate::worker::MessageHandler;

/// Reductions attempted per command while snapshot versions keep clashing.
pub const MAX_REDUCE_ATTEMPTS: u32 = 3;

/// What happened to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The reduction was persisted; dispatch counts attached.
    Applied(DispatchReport),
    /// No reducer produced anything.
    Ignored,
    /// A previous delivery already persisted this command.
    AlreadyApplied,
    /// The command failed and was sent to the dead-letter topic.
    DeadLettered {
        /// The failure reason recorded with the dead letter.
        reason: String,
    },
}

/// Consumes raw command messages.
pub struct CommandProcessor {
    registry: Arc<Registry>,
    chain: ReducerChain,
    outbox: Arc<OutboxService>,
    dead_letters: DeadLetterSink,
}

impl CommandProcessor {
    /// Creates a new `CommandProcessor`.
    #[must_use]
    pub fn new(registry: Arc<Registry>, outbox: Arc<OutboxService>, dead_letters: DeadLetterSink) -> Self {
        Self {
            chain: ReducerChain::new(Arc::clone(&registry)),
            registry,
            outbox,
            dead_letters,
        }
    }

    /// Processes one raw command message.
    #[instrument(skip_all, fields(command_id, command_type))]
    pub async fn process(&self, raw: &[u8]) -> ProcessOutcome {
        match self.try_process(raw).await {
            Ok(outcome) => outcome,
            Err(error) if error.is_already_applied() => {
                info!(error = %error, "Command already applied; skipping");
                ProcessOutcome::AlreadyApplied
            }
            Err(error) => {
                let reason = error.to_string();
                self.dead_letters.send(&reason, raw).await;
                ProcessOutcome::DeadLettered { reason }
            }
        }
    }

    async fn try_process(&self, raw: &[u8]) -> Result<ProcessOutcome, DomainError> {
        let command = CommandEnvelope::from_slice(raw)?;
        let span = Span::current();
        span.record("command_id", command.id.as_str());
        span.record("command_type", command.command_type.as_str());

        let schemas = self.registry.schemas();
        schemas.commands.validate(&command, None)?;

        let ctx = ReduceContext {
            session_id: &command.session_id,
            user_id: command.user_id.as_deref(),
            schemas,
        };

        let mut attempt = 1;
        loop {
            let result = self.chain.reduce(&command, &ctx).await?;
            if result.is_empty() {
                return Ok(ProcessOutcome::Ignored);
            }

            match self.outbox.persist_and_dispatch(result).await {
                Ok(report) => return Ok(ProcessOutcome::Applied(report)),
                Err(error) if error.is_stale_snapshot() && attempt < MAX_REDUCE_ATTEMPTS => {
                    warn!(error = %error, attempt, "Snapshot changed under command; reducing again");
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl MessageHandler for CommandProcessor {
    async fn handle(&self, payload: Vec<u8>) {
        self.process(&payload).await;
    }
}
