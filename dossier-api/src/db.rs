//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and the
//! PostgreSQL-backed [`RecordStore`].
//!
//! Two tables: `tracked_queries` and `detail_records`. `ensure_schema` creates
//! them idempotently at startup; there is no migration tooling.

use crate::error::{ApiError, ApiResult};
use ::async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use dossier_core::{
    DetailRecord, LifecycleStatus, NewDetailRecord, NewTrackedQuery, QueryKind, RecordId,
    StorageError, TrackedQuery, VersionStatus,
};
use dossier_storage::{IdentifierMatch, QueryFilter, RecordStore, StorageResult};
use serde_json::Value as JsonValue;
use std::fmt::Display;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "dossier".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from `DOSSIER_DB_*` variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("DOSSIER_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("DOSSIER_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("DOSSIER_DB_NAME").unwrap_or_else(|_| "dossier".to_string()),
            user: std::env::var("DOSSIER_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("DOSSIER_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("DOSSIER_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("DOSSIER_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tracked_queries (
    id                       BIGSERIAL PRIMARY KEY,
    kind                     TEXT NOT NULL,
    identifier               TEXT NOT NULL,
    correlation_id           TEXT,
    lifecycle_status         TEXT NOT NULL,
    version_status           TEXT NOT NULL,
    request_payload          JSONB,
    primary_response_payload JSONB,
    callback_payload         JSONB,
    status_code              INTEGER,
    notify_recipient         TEXT,
    created_at               TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at               TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS tracked_queries_key_idx
    ON tracked_queries (kind, identifier, version_status);
CREATE INDEX IF NOT EXISTS tracked_queries_correlation_idx
    ON tracked_queries (correlation_id);

CREATE TABLE IF NOT EXISTS detail_records (
    id                        BIGSERIAL PRIMARY KEY,
    parent_id                 BIGINT NOT NULL REFERENCES tracked_queries (id),
    detail_payload            JSONB NOT NULL,
    has_prejudicial_events    BOOLEAN NOT NULL DEFAULT FALSE,
    has_insolvency_procedures BOOLEAN NOT NULL DEFAULT FALSE,
    has_protests              BOOLEAN NOT NULL DEFAULT FALSE,
    status_code               INTEGER NOT NULL,
    created_at                TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at                TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE UNIQUE INDEX IF NOT EXISTS detail_records_parent_idx
    ON detail_records (parent_id);
"#;

const QUERY_COLUMNS: &str = "id, kind, identifier, correlation_id, lifecycle_status, \
    version_status, request_payload, primary_response_payload, callback_payload, \
    status_code, notify_recipient, created_at, updated_at";

const DETAIL_COLUMNS: &str = "id, parent_id, detail_payload, has_prejudicial_events, \
    has_insolvency_procedures, has_protests, status_code, created_at, updated_at";

/// Session token location inside `request_payload`, as a Postgres path.
const SESSION_TOKEN_SQL_PATH: &str = "request_payload #>> '{callback,headers,session_id}'";

// ============================================================================
// POSTGRES RECORD STORE
// ============================================================================

/// Record store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool,
}

impl PgRecordStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Create tables and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA_SQL).await?;
        tracing::info!("Database schema ensured");
        Ok(())
    }

    async fn get_conn(&self) -> StorageResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(unavailable)
    }
}

fn unavailable(err: impl Display) -> StorageError {
    StorageError::Unavailable {
        reason: err.to_string(),
    }
}

fn corrupt(table: &'static str) -> impl Fn(tokio_postgres::Error) -> StorageError {
    move |err| StorageError::CorruptRow {
        table,
        reason: err.to_string(),
    }
}

fn query_from_row(row: &Row) -> StorageResult<TrackedQuery> {
    let col = corrupt("tracked_queries");
    let kind: String = row.try_get("kind").map_err(&col)?;
    let lifecycle: String = row.try_get("lifecycle_status").map_err(&col)?;
    let version: String = row.try_get("version_status").map_err(&col)?;
    let bad_enum = |e: dossier_core::KindParseError| StorageError::CorruptRow {
        table: "tracked_queries",
        reason: e.to_string(),
    };

    Ok(TrackedQuery {
        id: row.try_get("id").map_err(&col)?,
        kind: kind.parse::<QueryKind>().map_err(bad_enum)?,
        identifier: row.try_get("identifier").map_err(&col)?,
        correlation_id: row.try_get("correlation_id").map_err(&col)?,
        lifecycle_status: lifecycle.parse::<LifecycleStatus>().map_err(bad_enum)?,
        version_status: version.parse::<VersionStatus>().map_err(bad_enum)?,
        request_payload: row.try_get("request_payload").map_err(&col)?,
        primary_response_payload: row.try_get("primary_response_payload").map_err(&col)?,
        callback_payload: row.try_get("callback_payload").map_err(&col)?,
        status_code: row.try_get("status_code").map_err(&col)?,
        notify_recipient: row.try_get("notify_recipient").map_err(&col)?,
        created_at: row.try_get("created_at").map_err(&col)?,
        updated_at: row.try_get("updated_at").map_err(&col)?,
    })
}

fn detail_from_row(row: &Row) -> StorageResult<DetailRecord> {
    let col = corrupt("detail_records");
    Ok(DetailRecord {
        id: row.try_get("id").map_err(&col)?,
        parent_id: row.try_get("parent_id").map_err(&col)?,
        detail_payload: row.try_get("detail_payload").map_err(&col)?,
        has_prejudicial_events: row.try_get("has_prejudicial_events").map_err(&col)?,
        has_insolvency_procedures: row.try_get("has_insolvency_procedures").map_err(&col)?,
        has_protests: row.try_get("has_protests").map_err(&col)?,
        status_code: row.try_get("status_code").map_err(&col)?,
        created_at: row.try_get("created_at").map_err(&col)?,
        updated_at: row.try_get("updated_at").map_err(&col)?,
    })
}

/// WHERE clause and owned parameters for a filter.
fn filter_sql(filter: &QueryFilter) -> (String, Vec<Box<dyn ToSql + Sync + Send>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();

    if let Some(kind) = filter.kind {
        params.push(Box::new(kind.as_str().to_string()));
        clauses.push(format!("kind = ${}", params.len()));
    }
    match &filter.identifier {
        Some(IdentifierMatch::Exact(identifier)) => {
            params.push(Box::new(identifier.clone()));
            clauses.push(format!("identifier = ${}", params.len()));
        }
        Some(IdentifierMatch::Contains(fragment)) => {
            params.push(Box::new(fragment.clone()));
            clauses.push(format!("strpos(identifier, ${}) > 0", params.len()));
        }
        None => {}
    }
    if let Some(correlation_id) = &filter.correlation_id {
        params.push(Box::new(correlation_id.clone()));
        clauses.push(format!("correlation_id = ${}", params.len()));
    }
    if let Some(status) = filter.lifecycle_status {
        params.push(Box::new(status.as_db_str().to_string()));
        clauses.push(format!("lifecycle_status = ${}", params.len()));
    }
    if let Some(status) = filter.version_status {
        params.push(Box::new(status.as_db_str().to_string()));
        clauses.push(format!("version_status = ${}", params.len()));
    }
    if let Some(token) = &filter.session_token {
        params.push(Box::new(token.clone()));
        clauses.push(format!("{} = ${}", SESSION_TOKEN_SQL_PATH, params.len()));
    }

    let mut sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    sql.push_str(" ORDER BY created_at DESC, id DESC");
    if let Some(limit) = filter.limit {
        params.push(Box::new(limit as i64));
        sql.push_str(&format!(" LIMIT ${}", params.len()));
    }
    (sql, params)
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_query(&self, new: NewTrackedQuery) -> StorageResult<TrackedQuery> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "INSERT INTO tracked_queries (kind, identifier, correlation_id, lifecycle_status, \
             version_status, request_payload, primary_response_payload, callback_payload, \
             status_code, notify_recipient) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            QUERY_COLUMNS
        );
        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &new.kind.as_str(),
                    &new.identifier,
                    &new.correlation_id,
                    &new.lifecycle_status.as_db_str(),
                    &VersionStatus::Active.as_db_str(),
                    &new.request_payload,
                    &new.primary_response_payload,
                    &new.callback_payload,
                    &new.status_code,
                    &new.notify_recipient,
                ],
            )
            .await
            .map_err(|e| StorageError::InsertFailed {
                entity: "tracked_query",
                reason: e.to_string(),
            })?;
        query_from_row(&row)
    }

    async fn get_query(&self, id: RecordId) -> StorageResult<Option<TrackedQuery>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM tracked_queries WHERE id = $1", QUERY_COLUMNS);
        let row = conn.query_opt(sql.as_str(), &[&id]).await.map_err(unavailable)?;
        row.as_ref().map(query_from_row).transpose()
    }

    async fn find_queries(&self, filter: &QueryFilter) -> StorageResult<Vec<TrackedQuery>> {
        let conn = self.get_conn().await?;
        let (where_sql, params) = filter_sql(filter);
        let sql = format!("SELECT {} FROM tracked_queries{}", QUERY_COLUMNS, where_sql);
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let rows = conn.query(sql.as_str(), &refs).await.map_err(unavailable)?;
        rows.iter().map(query_from_row).collect()
    }

    async fn demote_active(&self, kind: QueryKind, identifier: &str) -> StorageResult<u64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE tracked_queries SET version_status = $1, updated_at = now() \
             WHERE kind = $2 AND identifier = $3 AND version_status = $4",
            &[
                &VersionStatus::Superseded.as_db_str(),
                &kind.as_str(),
                &identifier,
                &VersionStatus::Active.as_db_str(),
            ],
        )
        .await
        .map_err(unavailable)
    }

    async fn record_callback(
        &self,
        id: RecordId,
        payload: JsonValue,
        status: LifecycleStatus,
    ) -> StorageResult<TrackedQuery> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE tracked_queries SET callback_payload = $2, lifecycle_status = $3, \
             updated_at = now() WHERE id = $1 RETURNING {}",
            QUERY_COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&id, &payload, &status.as_db_str()])
            .await
            .map_err(|e| StorageError::UpdateFailed {
                entity: "tracked_query",
                id,
                reason: e.to_string(),
            })?
            .ok_or(StorageError::QueryNotFound { id })?;
        query_from_row(&row)
    }

    async fn set_lifecycle_status(
        &self,
        id: RecordId,
        status: LifecycleStatus,
    ) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE tracked_queries SET lifecycle_status = $2, updated_at = now() \
                 WHERE id = $1",
                &[&id, &status.as_db_str()],
            )
            .await
            .map_err(|e| StorageError::UpdateFailed {
                entity: "tracked_query",
                id,
                reason: e.to_string(),
            })?;
        if changed == 0 {
            return Err(StorageError::QueryNotFound { id });
        }
        Ok(())
    }

    async fn get_detail(&self, parent_id: RecordId) -> StorageResult<Option<DetailRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM detail_records WHERE parent_id = $1",
            DETAIL_COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&parent_id])
            .await
            .map_err(unavailable)?;
        row.as_ref().map(detail_from_row).transpose()
    }

    async fn insert_detail(&self, new: NewDetailRecord) -> StorageResult<DetailRecord> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "INSERT INTO detail_records (parent_id, detail_payload, has_prejudicial_events, \
             has_insolvency_procedures, has_protests, status_code) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            DETAIL_COLUMNS
        );
        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &new.parent_id,
                    &new.detail_payload,
                    &new.indicators.prejudicial_events,
                    &new.indicators.insolvency_procedures,
                    &new.indicators.protests,
                    &new.status_code,
                ],
            )
            .await
            .map_err(|e| StorageError::InsertFailed {
                entity: "detail_record",
                reason: e.to_string(),
            })?;
        detail_from_row(&row)
    }

    async fn update_detail(
        &self,
        id: RecordId,
        update: &NewDetailRecord,
    ) -> StorageResult<DetailRecord> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE detail_records SET detail_payload = $2, has_prejudicial_events = $3, \
             has_insolvency_procedures = $4, has_protests = $5, status_code = $6, \
             updated_at = now() WHERE id = $1 RETURNING {}",
            DETAIL_COLUMNS
        );
        let row = conn
            .query_opt(
                sql.as_str(),
                &[
                    &id,
                    &update.detail_payload,
                    &update.indicators.prejudicial_events,
                    &update.indicators.insolvency_procedures,
                    &update.indicators.protests,
                    &update.status_code,
                ],
            )
            .await
            .map_err(|e| StorageError::UpdateFailed {
                entity: "detail_record",
                id,
                reason: e.to_string(),
            })?
            .ok_or(StorageError::DetailNotFound { id })?;
        detail_from_row(&row)
    }

    async fn ping(&self) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_db_config() {
        let config = DbConfig::default();
        assert_eq!(config.dbname, "dossier");
        assert_eq!(config.port, 5432);
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_filter_sql_numbers_placeholders_in_order() {
        let filter = QueryFilter::for_kind(QueryKind::AsyncFullProfile)
            .identifier_contains("0123")
            .active()
            .pending()
            .limit(1);
        let (sql, params) = filter_sql(&filter);

        assert_eq!(params.len(), 5);
        assert!(sql.contains("kind = $1"));
        assert!(sql.contains("strpos(identifier, $2) > 0"));
        assert!(sql.contains("lifecycle_status = $3"));
        assert!(sql.contains("version_status = $4"));
        assert!(sql.ends_with("ORDER BY created_at DESC, id DESC LIMIT $5"));
    }

    #[test]
    fn test_filter_sql_session_token_path() {
        let (sql, params) = filter_sql(&QueryFilter::default().session_token("dossier_1"));
        assert_eq!(params.len(), 1);
        assert!(sql.contains("request_payload #>> '{callback,headers,session_id}' = $1"));
    }

    #[test]
    fn test_unfiltered_sql_has_no_where() {
        let (sql, params) = filter_sql(&QueryFilter::default());
        assert!(params.is_empty());
        assert!(!sql.contains("WHERE"));
    }
}
