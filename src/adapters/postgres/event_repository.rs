//! PostgreSQL implementation of EventRepository.
//!
//! One instance serves one table; the table name comes from configuration
//! and is interpolated as a quoted identifier, so it is validated on
//! construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::config::is_valid_table_name;
use crate::domain::event_box::EventRecord;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::EventRepository;

/// SQLSTATE codes raised when a concurrent `CREATE ... IF NOT EXISTS` loses the race.
const ALREADY_EXISTS_CODES: [&str; 3] = ["42P07", "42710", "23505"];

const COLUMNS: &str = "id, provider, event_name, event_path, payload, headers, additional_data, \
                       created_at, try_count, try_after_at, processed_at";

/// PostgreSQL implementation of EventRepository.
#[derive(Clone)]
pub struct PostgresEventRepository {
    pool: PgPool,
    table_name: String,
}

impl PostgresEventRepository {
    /// Creates a new repository for `table_name`.
    ///
    /// Fails if the table name is not a plain identifier.
    pub fn new(pool: PgPool, table_name: impl Into<String>) -> Result<Self, DomainError> {
        let table_name = table_name.into();
        if !is_valid_table_name(&table_name) {
            return Err(DomainError::new(
                ErrorCode::ConfigurationError,
                format!("Invalid event table name: {:?}", table_name),
            ));
        }
        Ok(Self { pool, table_name })
    }

    /// Connection pool used by this repository.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a record inside the caller's transaction.
    ///
    /// The record commits or rolls back together with the business write.
    /// Returns `false` if a record with the same id already exists.
    pub async fn insert_event_in_txn(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        record: &EventRecord,
    ) -> Result<bool, DomainError> {
        self.insert_with(&mut **txn, record).await
    }

    async fn insert_with<'e, E>(&self, executor: E, record: &EventRecord) -> Result<bool, DomainError>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            r#"
            INSERT INTO "{}" (
                id, provider, event_name, event_path, payload, headers,
                additional_data, created_at, try_count, try_after_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
            self.table_name
        );

        let result = sqlx::query(&sql)
            .bind(record.id)
            .bind(&record.provider)
            .bind(&record.event_name)
            .bind(&record.event_path)
            .bind(&record.payload)
            .bind(&record.headers)
            .bind(&record.additional_data)
            .bind(record.created_at)
            .bind(record.try_count)
            .bind(record.try_after_at)
            .execute(executor)
            .await
            .map_err(|e| {
                self.db_error(format!(
                    "Error while inserting a new event into the {} table with the {} id: {}",
                    self.table_name, record.id, e
                ))
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_with<'e, E>(&self, executor: E, record: &EventRecord) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        // processed_at is write-once
        let sql = format!(
            r#"
            UPDATE "{}" SET
                try_count = $2,
                try_after_at = $3,
                processed_at = COALESCE(processed_at, $4)
            WHERE id = $1
            "#,
            self.table_name
        );

        let result = sqlx::query(&sql)
            .bind(record.id)
            .bind(record.try_count)
            .bind(record.try_after_at)
            .bind(record.processed_at)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    async fn execute_ddl(&self, sql: &str) -> Result<(), DomainError> {
        match sqlx::query(sql).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db))
                if db
                    .code()
                    .is_some_and(|code| ALREADY_EXISTS_CODES.contains(&&*code)) =>
            {
                Ok(())
            }
            Err(e) => Err(self.db_error(format!(
                "Error while checking/creating the {} table: {}",
                self.table_name, e
            ))),
        }
    }

    fn db_error(&self, message: String) -> DomainError {
        DomainError::database(&self.table_name, message)
    }
}

#[async_trait]
impl EventRepository for PostgresEventRepository {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn create_table_if_not_exists(&self) -> Result<(), DomainError> {
        let table = &self.table_name;

        self.execute_ddl(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                id UUID NOT NULL PRIMARY KEY,
                provider VARCHAR(50) NOT NULL,
                event_name VARCHAR(100) NOT NULL,
                event_path VARCHAR(255),
                payload TEXT NOT NULL,
                headers TEXT,
                additional_data TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                try_count INTEGER NOT NULL DEFAULT 0,
                try_after_at TIMESTAMPTZ NOT NULL,
                processed_at TIMESTAMPTZ DEFAULT NULL
            )
            "#
        ))
        .await?;

        self.execute_ddl(&format!(
            r#"CREATE INDEX IF NOT EXISTS "{table}_unprocessed_idx" ON "{table}" (processed_at, try_after_at)"#
        ))
        .await?;

        self.execute_ddl(&format!(
            r#"CREATE INDEX IF NOT EXISTS "{table}_processed_idx" ON "{table}" (processed_at)"#
        ))
        .await?;

        tracing::debug!(table = %table, "Event table is ready");
        Ok(())
    }

    async fn insert_event(&self, record: &EventRecord) -> Result<bool, DomainError> {
        self.insert_with(&self.pool, record).await
    }

    async fn get_unprocessed_events(&self, limit: u32) -> Result<Vec<EventRecord>, DomainError> {
        let sql = format!(
            r#"
            SELECT {COLUMNS}
            FROM "{}"
            WHERE processed_at IS NULL
              AND try_after_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            self.table_name
        );

        let rows = sqlx::query(&sql)
            .bind(Utc::now())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                self.db_error(format!(
                    "Error while retrieving unprocessed events from the {} table: {}",
                    self.table_name, e
                ))
            })?;

        rows.into_iter()
            .map(|row| row_to_record(&self.table_name, row))
            .collect()
    }

    async fn update_event(&self, record: &EventRecord) -> Result<bool, DomainError> {
        let affected = self.update_with(&self.pool, record).await.map_err(|e| {
            self.db_error(format!(
                "Error while updating the event in the {} table with the {} id: {}",
                self.table_name, record.id, e
            ))
        })?;

        Ok(affected > 0)
    }

    async fn update_events(&self, records: &[EventRecord]) -> Result<bool, DomainError> {
        if records.is_empty() {
            return Ok(false);
        }

        let map_err = |e: sqlx::Error| {
            self.db_error(format!(
                "Error while updating events of the {} table: {}",
                self.table_name, e
            ))
        };

        let mut txn = self.pool.begin().await.map_err(map_err)?;
        let mut affected = 0;
        for record in records {
            affected += self.update_with(&mut *txn, record).await.map_err(map_err)?;
        }
        txn.commit().await.map_err(map_err)?;

        Ok(affected > 0)
    }

    async fn delete_processed_events(
        &self,
        processed_before: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let sql = format!(r#"DELETE FROM "{}" WHERE processed_at < $1"#, self.table_name);

        let result = sqlx::query(&sql)
            .bind(processed_before)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                self.db_error(format!(
                    "Error while deleting processed events from the {} table: {}",
                    self.table_name, e
                ))
            })?;

        Ok(result.rows_affected())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Helper functions
// ════════════════════════════════════════════════════════════════════════════

fn row_to_record(table: &str, row: PgRow) -> Result<EventRecord, DomainError> {
    let column_error = |column: &str, e: sqlx::Error| {
        DomainError::database(table, format!("Failed to get {}: {}", column, e))
    };

    let id: Uuid = row.try_get("id").map_err(|e| column_error("id", e))?;
    let provider: String = row.try_get("provider").map_err(|e| column_error("provider", e))?;
    let event_name: String = row
        .try_get("event_name")
        .map_err(|e| column_error("event_name", e))?;
    let event_path: Option<String> = row
        .try_get("event_path")
        .map_err(|e| column_error("event_path", e))?;
    let payload: String = row.try_get("payload").map_err(|e| column_error("payload", e))?;
    let headers: Option<String> = row.try_get("headers").map_err(|e| column_error("headers", e))?;
    let additional_data: Option<String> = row
        .try_get("additional_data")
        .map_err(|e| column_error("additional_data", e))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| column_error("created_at", e))?;
    let try_count: i32 = row
        .try_get("try_count")
        .map_err(|e| column_error("try_count", e))?;
    let try_after_at: DateTime<Utc> = row
        .try_get("try_after_at")
        .map_err(|e| column_error("try_after_at", e))?;
    let processed_at: Option<DateTime<Utc>> = row
        .try_get("processed_at")
        .map_err(|e| column_error("processed_at", e))?;

    Ok(EventRecord {
        id,
        provider,
        event_name,
        event_path: event_path.unwrap_or_default(),
        payload,
        headers,
        additional_data,
        created_at,
        try_count,
        try_after_at,
        processed_at,
    })
}
