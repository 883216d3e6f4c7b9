//! `PostgreSQL` implementation of the `DomainRepository` and `OutboxStore`
//! traits.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

use threadline_core::aggregate::{AggregateKey, AggregateType};
use threadline_core::error::DomainError;
use threadline_core::event::{DomainEventEnvelope, MessageEnvelope, THREAD_MESSAGE_ADDED};
use threadline_core::outbox::OutboxRecord;
use threadline_core::repository::{
    DomainRepository, ListThreadMessagesQuery, ListThreadsQuery, OutboxStore, Page,
};
use threadline_core::snapshot::{AggregateSnapshot, ThreadSnapshot};

use crate::cursor::{self, CursorKey};
use crate::keys;
use crate::listing::{self, DEFAULT_SORT_FIELD};
use crate::schema::CREATE_DOMAIN_STORE;

/// PostgreSQL-backed domain store.
#[derive(Debug, Clone)]
pub struct PgDomainRepository {
    pool: PgPool,
}

impl PgDomainRepository {
    /// Creates a new `PgDomainRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the store tables when they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(CREATE_DOMAIN_STORE)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }
}

fn infrastructure(error: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(error.to_string())
}

fn limit_plus_one(limit: u32) -> i64 {
    i64::from(limit) + 1
}

#[async_trait]
impl DomainRepository for PgDomainRepository {
    async fn load_snapshot(
        &self,
        key: &AggregateKey,
    ) -> Result<Option<AggregateSnapshot>, DomainError> {
        let row = sqlx::query(
            "SELECT body FROM aggregate_snapshots WHERE pk = $1 ORDER BY sk DESC LIMIT 1",
        )
        .bind(keys::aggregate_pk(key))
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;

        row.map(|row| {
            row.try_get::<Json<AggregateSnapshot>, _>("body")
                .map(|body| body.0)
                .map_err(infrastructure)
        })
        .transpose()
    }

    async fn list_threads(
        &self,
        query: &ListThreadsQuery,
    ) -> Result<Page<ThreadSnapshot>, DomainError> {
        let after = query.cursor.as_deref().map(cursor::decode).transpose()?;
        let limit = query.page_limit();

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT pk, body FROM (SELECT DISTINCT ON (pk) pk, body FROM aggregate_snapshots WHERE aggregate_type = ",
        );
        builder.push_bind(AggregateType::Thread.as_str());
        builder.push(" AND owner_id = ");
        builder.push_bind(&query.user_id);
        builder.push(" ORDER BY pk, sk DESC) latest WHERE TRUE");
        if let Some(after) = &after {
            builder.push(" AND pk > ");
            builder.push_bind(&after.pk);
        }
        for (field, value) in &query.filter {
            builder.push(" AND (body ->> ");
            builder.push_bind(field);
            builder.push(") = ");
            builder.push_bind(value);
        }
        builder.push(" ORDER BY pk LIMIT ");
        builder.push_bind(limit_plus_one(limit));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        let mut page = Vec::with_capacity(rows.len());
        for row in &rows {
            let pk: String = row.try_get("pk").map_err(infrastructure)?;
            let Json(snapshot): Json<AggregateSnapshot> =
                row.try_get("body").map_err(infrastructure)?;
            let AggregateSnapshot::Thread(thread) = snapshot else {
                return Err(DomainError::Infrastructure(format!(
                    "{pk} holds a non-thread snapshot"
                )));
            };
            page.push((pk, thread));
        }

        let has_more = page.len() > limit as usize;
        page.truncate(limit as usize);
        let cursor = match (has_more, page.last()) {
            (true, Some((pk, _))) => Some(cursor::encode(&CursorKey {
                pk: pk.clone(),
                sk: None,
            })?),
            _ => None,
        };
        let mut items: Vec<ThreadSnapshot> = page.into_iter().map(|(_, thread)| thread).collect();
        listing::sort_threads(
            &mut items,
            query.sort.as_deref().unwrap_or(DEFAULT_SORT_FIELD),
            query.order.unwrap_or_default(),
        );
        Ok(Page { items, cursor })
    }

    async fn list_thread_messages(
        &self,
        query: &ListThreadMessagesQuery,
    ) -> Result<Page<MessageEnvelope>, DomainError> {
        let pk = keys::aggregate_pk(&AggregateKey::thread(query.thread_id.clone()));
        let after = query.cursor.as_deref().map(cursor::decode).transpose()?;
        let after_sk = match after {
            Some(CursorKey { pk: cursor_pk, sk: Some(sk) }) if cursor_pk == pk => Some(sk),
            Some(_) => {
                return Err(DomainError::Validation(
                    "cursor does not belong to this thread".into(),
                ));
            }
            None => None,
        };
        let limit = query.page_limit();
        let forward = query.scan_forward();

        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT sk, payload FROM domain_events WHERE pk = ");
        builder.push_bind(&pk);
        builder.push(" AND event_type = ");
        builder.push_bind(THREAD_MESSAGE_ADDED);
        if let Some(sk) = &after_sk {
            builder.push(if forward { " AND sk > " } else { " AND sk < " });
            builder.push_bind(sk);
        }
        builder.push(if forward {
            " ORDER BY sk ASC LIMIT "
        } else {
            " ORDER BY sk DESC LIMIT "
        });
        builder.push_bind(limit_plus_one(limit));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        let has_more = rows.len() > limit as usize;
        let mut items = Vec::with_capacity(rows.len().min(limit as usize));
        let mut last_sk = None;
        for row in rows.iter().take(limit as usize) {
            let Json(payload): Json<serde_json::Value> =
                row.try_get("payload").map_err(infrastructure)?;
            items.push(listing::message_from_payload(&payload)?);
            last_sk = Some(row.try_get::<String, _>("sk").map_err(infrastructure)?);
        }

        let cursor = match (has_more, last_sk) {
            (true, Some(sk)) => Some(cursor::encode(&CursorKey {
                pk: pk.clone(),
                sk: Some(sk),
            })?),
            _ => None,
        };
        Ok(Page { items, cursor })
    }

    async fn transact(
        &self,
        events: &[DomainEventEnvelope],
        snapshots: &[AggregateSnapshot],
        outbox: &[OutboxRecord],
    ) -> Result<(), DomainError> {
        if events.is_empty() && snapshots.is_empty() && outbox.is_empty() {
            return Ok(());
        }

        // Dropping `tx` on an early return rolls everything back.
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        for event in events {
            let result = sqlx::query(
                "INSERT INTO domain_events \
                 (pk, sk, event_id, aggregate_type, aggregate_id, event_type, payload, occurred_at, version) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(keys::aggregate_pk(&event.key()))
            .bind(keys::event_sk(event.occurred_at, &event.event_id))
            .bind(&event.event_id)
            .bind(event.aggregate_type.as_str())
            .bind(&event.aggregate_id)
            .bind(&event.event_type)
            .bind(Json(&event.payload))
            .bind(event.occurred_at)
            .bind(event.version)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;

            if result.rows_affected() == 0 {
                return Err(DomainError::TransactionConflict(format!(
                    "event {} already recorded",
                    event.event_id
                )));
            }
        }

        for snapshot in snapshots {
            let result = sqlx::query(
                "INSERT INTO aggregate_snapshots \
                 (pk, sk, aggregate_type, aggregate_id, owner_id, version, updated_at, body) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (pk, sk) DO NOTHING",
            )
            .bind(keys::aggregate_pk(&snapshot.key()))
            .bind(keys::snapshot_sk(snapshot.version()))
            .bind(snapshot.aggregate_type().as_str())
            .bind(snapshot.aggregate_id())
            .bind(snapshot.owner_id())
            .bind(snapshot.version())
            .bind(snapshot.updated_at())
            .bind(Json(snapshot))
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;

            if result.rows_affected() == 0 {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_type: snapshot.aggregate_type(),
                    aggregate_id: snapshot.aggregate_id().to_owned(),
                    version: snapshot.version(),
                });
            }
        }

        for record in outbox {
            sqlx::query(
                "INSERT INTO outbox_records (pk, sk, id, record_type, created_at, body) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (pk) DO UPDATE SET \
                 sk = EXCLUDED.sk, record_type = EXCLUDED.record_type, \
                 created_at = EXCLUDED.created_at, body = EXCLUDED.body",
            )
            .bind(keys::outbox_pk(&record.id))
            .bind(keys::outbox_sk(record.created_at))
            .bind(&record.id)
            .bind(record.record_type())
            .bind(record.created_at)
            .bind(Json(record))
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;
        }

        tx.commit().await.map_err(infrastructure)?;

        debug!(
            events = events.len(),
            snapshots = snapshots.len(),
            outbox = outbox.len(),
            "Committed domain transaction"
        );
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PgDomainRepository {
    async fn delete_outbox_record(&self, record_id: &str) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM outbox_records WHERE pk = $1")
            .bind(keys::outbox_pk(record_id))
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }

    async fn pending_outbox_records(&self, limit: u32) -> Result<Vec<OutboxRecord>, DomainError> {
        let rows = sqlx::query("SELECT body FROM outbox_records ORDER BY created_at, id LIMIT $1")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        rows.iter()
            .map(|row| {
                row.try_get::<Json<OutboxRecord>, _>("body")
                    .map(|body| body.0)
                    .map_err(infrastructure)
            })
            .collect()
    }
}
