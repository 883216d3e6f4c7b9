//! Service configuration read from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use threadline_core::bus::Topics;

use crate::error::AppError;

/// Where domain state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL at `url`.
    Postgres {
        /// Connection string.
        url: String,
        /// Pool size.
        max_connections: u32,
    },
    /// Process-local store; state is lost on restart.
    Memory,
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Domain store backend.
    pub store: StoreBackend,
    /// Redis connection string for outbound fan-out.
    pub redis_url: String,
    /// Topic names.
    pub topics: Topics,
    /// Worker partitions per pipeline.
    pub partitions: usize,
    /// Queue depth per partition.
    pub queue_depth: usize,
    /// Pause between outbox redelivery sweeps.
    pub sweep_interval: Duration,
    /// Records per outbox sweep.
    pub sweep_batch: u32,
    /// Keep outbox records pending when a publish reaches no subscriber.
    pub require_subscribers: bool,
    /// Server aggregate users join.
    pub server_id: String,
    /// Identity credited with assistant replies.
    pub assistant_id: String,
    /// OTLP collector endpoint; tracing export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a value is missing or invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a value is missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let text = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_owned());

        let store = match text("STORE_BACKEND", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres {
                url: lookup("DATABASE_URL").ok_or_else(|| {
                    AppError::Config("DATABASE_URL environment variable must be set".into())
                })?,
                max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(AppError::Config(format!(
                    "STORE_BACKEND must be postgres or memory, got {other}"
                )));
            }
        };

        let defaults = Topics::default();
        let topics = Topics {
            events: text("EVENTS_TOPIC", &defaults.events),
            commands: text("COMMANDS_TOPIC", &defaults.commands),
            outbox: text("OUTBOX_TOPIC", &defaults.outbox),
            domain_changes: text("DOMAIN_CHANGES_TOPIC", &defaults.domain_changes),
            dead_letter: text("DEAD_LETTER_TOPIC", &defaults.dead_letter),
        };

        let partitions: usize = parsed(&lookup, "PARTITIONS", 8)?;
        if partitions == 0 {
            return Err(AppError::Config("PARTITIONS must be at least 1".into()));
        }

        Ok(Self {
            host: text("HOST", "0.0.0.0"),
            port: parsed(&lookup, "PORT", 3000)?,
            store,
            redis_url: text("REDIS_URL", "redis://127.0.0.1:6379"),
            topics,
            partitions,
            queue_depth: parsed(&lookup, "PARTITION_QUEUE_DEPTH", 1024)?,
            sweep_interval: Duration::from_millis(parsed(&lookup, "OUTBOX_SWEEP_INTERVAL_MS", 5000)?),
            sweep_batch: parsed(&lookup, "OUTBOX_SWEEP_BATCH", 100)?,
            require_subscribers: parsed(&lookup, "OUTBOX_REQUIRE_SUBSCRIBERS", false)?,
            server_id: text("SERVER_ID", "default"),
            assistant_id: text("ASSISTANT_ID", "assistant"),
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.is_empty()),
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{name} has an invalid value: {e}"))),
        None => Ok(default),
    }
}
