use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{
    AggregateId, EventEnvelope, EventStoreError, EventStream, EventStreamVersion, PostgresConfig,
    Result, Version,
    store::{EventStore, loaded_stream, validate_events_for_save, validate_version_for_load},
};

/// Constraint whose violation means another writer got there first.
///
/// A racing first write to `aggregate_root` is caught by its
/// `ON CONFLICT DO NOTHING` insert affecting no rows instead.
const CONCURRENCY_CONSTRAINT: &str = "unique_aggregate_version";

/// PostgreSQL-backed event store implementation.
///
/// `aggregate_root` holds the committed version of each aggregate and
/// `aggregate_root_event` the serialized envelopes. A save moves the version
/// row and inserts the events in one READ COMMITTED transaction.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool from configuration.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn concurrency_error(
        aggregate_id: AggregateId,
        expected: EventStreamVersion,
    ) -> EventStoreError {
        metrics::counter!("event_store_concurrency_conflicts_total").increment(1);
        EventStoreError::Concurrency {
            aggregate_id,
            expected,
        }
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    async fn save(
        &self,
        aggregate_id: AggregateId,
        expected_version: EventStreamVersion,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_events_for_save(aggregate_id, expected_version, &events)?;

        let last_version = events
            .last()
            .map(|e| e.version)
            .unwrap_or_else(Version::first);

        // Dropping the transaction without commit rolls everything back
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;

        // Max was rejected above, so no concrete version means NoStream
        let moved = match expected_version.as_version() {
            None => {
                sqlx::query(
                    "INSERT INTO aggregate_root (id, version) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
                )
                .bind(aggregate_id.as_uuid())
                .bind(last_version.as_i64())
                .execute(&mut *tx)
                .await?
            }
            Some(expected) => {
                sqlx::query("UPDATE aggregate_root SET version = $2 WHERE id = $1 AND version = $3")
                    .bind(aggregate_id.as_uuid())
                    .bind(last_version.as_i64())
                    .bind(expected.as_i64())
                    .execute(&mut *tx)
                    .await?
            }
        };

        if moved.rows_affected() == 0 {
            tracing::warn!("expected version is stale");
            return Err(Self::concurrency_error(aggregate_id, expected_version));
        }

        for event in &events {
            let data = serde_json::to_value(event)?;

            sqlx::query(
                r#"
                INSERT INTO aggregate_root_event (id, aggregate_id, version, data)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(event.header.id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .bind(event.version.as_i64())
            .bind(data)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some(CONCURRENCY_CONSTRAINT)
                {
                    return Self::concurrency_error(aggregate_id, expected_version);
                }
                EventStoreError::Database(e)
            })?;
        }

        tx.commit().await?;

        metrics::counter!("event_store_events_saved_total").increment(events.len() as u64);
        tracing::debug!(%last_version, "events saved");

        Ok(last_version)
    }

    #[tracing::instrument(skip(self))]
    async fn load(
        &self,
        aggregate_id: AggregateId,
        version: EventStreamVersion,
    ) -> Result<EventStream> {
        validate_version_for_load(version)?;

        let upper_bound = version.as_version().map_or(i64::MAX, |v| v.as_i64());

        let rows: Vec<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT data
            FROM aggregate_root_event
            WHERE aggregate_id = $1 AND version <= $2
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .bind(upper_bound)
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .into_iter()
            .map(serde_json::from_value::<EventEnvelope>)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::debug!(event_count = events.len(), "events loaded");

        loaded_stream(aggregate_id, version, events)
    }

    #[tracing::instrument(skip(self))]
    async fn load_after(
        &self,
        aggregate_id: AggregateId,
        seen: EventStreamVersion,
    ) -> Result<Vec<EventEnvelope>> {
        let lower_bound = match seen {
            EventStreamVersion::NoStream => 0,
            EventStreamVersion::At(version) => version.as_i64(),
            EventStreamVersion::Max => return Ok(Vec::new()),
        };

        let rows: Vec<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT data
            FROM aggregate_root_event
            WHERE aggregate_id = $1 AND version > $2
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .bind(lower_bound)
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .into_iter()
            .map(serde_json::from_value::<EventEnvelope>)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::debug!(event_count = events.len(), "unseen events loaded");

        Ok(events)
    }

    async fn version(&self, aggregate_id: AggregateId) -> Result<EventStreamVersion> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM aggregate_root WHERE id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        Ok(version.map_or(EventStreamVersion::NoStream, |v| {
            EventStreamVersion::At(Version::new(v))
        }))
    }
}
