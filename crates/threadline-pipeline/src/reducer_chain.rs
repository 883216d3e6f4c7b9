//! The reducer chain: server, then user, then thread.

use std::sync::Arc;

use threadline_core::aggregate::AggregateType;
use threadline_core::command::CommandEnvelope;
use threadline_core::error::DomainError;
use threadline_core::reduction::{ReduceContext, ReductionResult};
use tracing::debug;

use crate::registry::Registry;

/// Bucket evaluation order.
pub const BUCKET_ORDER: [AggregateType; 3] =
    [AggregateType::Server, AggregateType::User, AggregateType::Thread];

/// Runs every bucket's first matching reducer and concatenates the results.
#[derive(Debug, Clone)]
pub struct ReducerChain {
    registry: Arc<Registry>,
}

impl ReducerChain {
    /// Creates a chain over a built registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Reduces `command` through all three buckets. A bucket with no
    /// matching reducer contributes nothing; if no bucket matches the result
    /// is empty.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a reducer. Nothing produced by
    /// earlier buckets is kept.
    pub async fn reduce(
        &self,
        command: &CommandEnvelope,
        ctx: &ReduceContext<'_>,
    ) -> Result<ReductionResult, DomainError> {
        let mut result = ReductionResult::empty();
        let mut matched = 0;

        for scope in BUCKET_ORDER {
            let Some(entry) = self.registry.select(scope, command) else {
                continue;
            };
            matched += 1;
            let produced = entry.reducer().reduce(command, ctx).await?;
            debug!(
                scope = %scope,
                reducer = entry.reducer().name(),
                events = produced.domain_events.len(),
                snapshots = produced.snapshots.len(),
                outbox = produced.outbox_records.len(),
                "Reducer produced output"
            );
            result.merge(produced);
        }

        if matched == 0 {
            debug!(command_type = %command.command_type, command_id = %command.id, "No reducer matched command");
        }
        Ok(result)
    }
}
