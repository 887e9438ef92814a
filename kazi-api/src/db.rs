//! Postgres datastore.
//!
//! `PgDatastore` implements the `Datastore` boundary over a deadpool-postgres
//! pool. Rows travel as JSONB in both directions: reads return
//! `to_jsonb(t)`, writes go through `jsonb_populate_record`, and filter
//! values are cast to the column type the same way, so one bound JSON
//! parameter works for uuid, text, numeric, boolean and timestamptz columns.
//!
//! Table and column names are interpolated into SQL, which is why every
//! query and mutation is validated against the identifier grammar first.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use kazi_core::{FilterExpr, FilterOperator, HealthCheck, Record, StorageError};
use kazi_storage::{Datastore, Mutation, MutationOutcome, Query, StorageResult};
use serde_json::{json, Value as JsonValue};
use tokio_postgres::NoTls;

use crate::error::{ApiError, ApiResult};

const PG_UNIQUE_VIOLATION: &str = "23505";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/connect timeout for pool checkouts
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "kazi".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("KAZI_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("KAZI_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("KAZI_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("KAZI_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("KAZI_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("KAZI_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("KAZI_DB_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
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
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: self.max_size,
            timeouts: deadpool_postgres::Timeouts::wait_millis(self.timeout.as_millis() as u64),
            ..Default::default()
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// SQL PARAMETERS
// ============================================================================

/// Bound parameter of a compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Json(JsonValue),
    Text(String),
    Long(i64),
}

impl SqlParam {
    /// Convert this SqlParam to a reference that can be used with tokio_postgres.
    pub fn as_to_sql(&self) -> &(dyn tokio_postgres::types::ToSql + Sync) {
        match self {
            SqlParam::Json(v) => v,
            SqlParam::Text(v) => v,
            SqlParam::Long(v) => v,
        }
    }
}

/// SQL text plus its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
    /// Statement returns rows (`RETURNING to_jsonb(..)`).
    pub returns_rows: bool,
}

impl Statement {
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn param_refs(&self) -> Vec<&(dyn tokio_postgres::types::ToSql + Sync)> {
        self.params.iter().map(SqlParam::as_to_sql).collect()
    }
}

// ============================================================================
// SQL COMPILATION
// ============================================================================

/// Column value cast to the column's declared type.
fn typed_value(stmt: &mut Statement, table: &str, column: &str, value: &JsonValue) -> String {
    let placeholder = stmt.bind(SqlParam::Json(json!({ column: value })));
    format!(
        "(jsonb_populate_record(NULL::{table}, {placeholder}::jsonb)).{column}"
    )
}

fn compile_filter(stmt: &mut Statement, table: &str, filter: &FilterExpr) -> String {
    let column = format!("t.{}", filter.field);
    let field = filter.field.as_str();
    match filter.operator {
        FilterOperator::IsNull => format!("{column} IS NULL"),
        FilterOperator::NotNull => format!("{column} IS NOT NULL"),
        FilterOperator::Eq => format!("{column} = {}", typed_value(stmt, table, field, &filter.value)),
        FilterOperator::Ne => format!("{column} <> {}", typed_value(stmt, table, field, &filter.value)),
        FilterOperator::Gt => format!("{column} > {}", typed_value(stmt, table, field, &filter.value)),
        FilterOperator::Gte => format!("{column} >= {}", typed_value(stmt, table, field, &filter.value)),
        FilterOperator::Lt => format!("{column} < {}", typed_value(stmt, table, field, &filter.value)),
        FilterOperator::Lte => format!("{column} <= {}", typed_value(stmt, table, field, &filter.value)),
        FilterOperator::Contains => match &filter.value {
            JsonValue::String(fragment) => {
                let p = stmt.bind(SqlParam::Text(fragment.clone()));
                format!("strpos({column}::text, {p}::text) > 0")
            }
            other => {
                let p = stmt.bind(SqlParam::Json(other.clone()));
                format!("to_jsonb({column}) @> {p}::jsonb")
            }
        },
        FilterOperator::ILike => {
            let pattern = filter.value.as_str().unwrap_or_default().to_string();
            let p = stmt.bind(SqlParam::Text(pattern));
            format!("{column}::text ILIKE {p}::text")
        }
        FilterOperator::In => {
            let values = match &filter.value {
                JsonValue::Array(values) => JsonValue::Array(values.clone()),
                other => JsonValue::Array(vec![other.clone()]),
            };
            let p = stmt.bind(SqlParam::Json(values));
            format!(
                "{column} = ANY(ARRAY(SELECT (jsonb_populate_record(NULL::{table}, \
                 jsonb_build_object('{field}', e))).{field} FROM jsonb_array_elements({p}::jsonb) e))"
            )
        }
    }
}

fn where_clause(stmt: &mut Statement, table: &str, filters: &[FilterExpr]) -> String {
    if filters.is_empty() {
        return String::new();
    }
    let conditions: Vec<String> = filters
        .iter()
        .map(|f| compile_filter(stmt, table, f))
        .collect();
    format!(" WHERE {}", conditions.join(" AND "))
}

fn column_list(row: &Record) -> String {
    row.keys().cloned().collect::<Vec<_>>().join(", ")
}

/// Compile a validated select.
pub fn compile_select(query: &Query) -> StorageResult<Statement> {
    query.validate()?;
    let mut stmt = Statement {
        sql: String::new(),
        params: Vec::new(),
        returns_rows: true,
    };
    let table = &query.table;
    let mut sql = format!("SELECT to_jsonb(t) FROM {table} t");
    sql.push_str(&where_clause(&mut stmt, table, &query.filters));
    if let Some((column, direction)) = &query.order {
        sql.push_str(&format!(" ORDER BY t.{} {}, t.id {}", column, direction.as_sql(), direction.as_sql()));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if query.offset > 0 {
        sql.push_str(&format!(" OFFSET {}", query.offset));
    }
    stmt.sql = sql;
    Ok(stmt)
}

/// Compile a validated mutation.
pub fn compile_mutation(mutation: &Mutation) -> StorageResult<Statement> {
    mutation.validate()?;
    let mut stmt = Statement {
        sql: String::new(),
        params: Vec::new(),
        returns_rows: true,
    };
    stmt.sql = match mutation {
        Mutation::Insert { table, row } => {
            let columns = column_list(row);
            let p = stmt.bind(SqlParam::Json(JsonValue::Object(row.clone())));
            format!(
                "INSERT INTO {table} ({columns}) SELECT {columns} \
                 FROM jsonb_populate_record(NULL::{table}, {p}::jsonb) RETURNING to_jsonb({table}.*)"
            )
        }
        Mutation::Update {
            table,
            filters,
            patch,
            ..
        } => {
            let assignments = patch
                .keys()
                .map(|c| format!("{c} = p.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let p = stmt.bind(SqlParam::Json(JsonValue::Object(patch.clone())));
            let filter_sql = where_clause(&mut stmt, table, filters);
            format!(
                "UPDATE {table} AS t SET {assignments} \
                 FROM jsonb_populate_record(NULL::{table}, {p}::jsonb) p{filter_sql} RETURNING to_jsonb(t)"
            )
        }
        Mutation::Upsert {
            table,
            row,
            conflict_target,
        } => {
            let columns = column_list(row);
            let target = conflict_target.join(", ");
            let mut updates: Vec<String> = row
                .keys()
                .filter(|c| {
                    !matches!(c.as_str(), "id" | "created_at") && !conflict_target.contains(c)
                })
                .map(|c| format!("{c} = EXCLUDED.{c}"))
                .collect();
            if updates.is_empty() {
                // DO NOTHING would return no row on conflict.
                updates.push(format!("{0} = EXCLUDED.{0}", conflict_target[0]));
            }
            let p = stmt.bind(SqlParam::Json(JsonValue::Object(row.clone())));
            format!(
                "INSERT INTO {table} ({columns}) SELECT {columns} \
                 FROM jsonb_populate_record(NULL::{table}, {p}::jsonb) \
                 ON CONFLICT ({target}) DO UPDATE SET {} RETURNING to_jsonb({table}.*)",
                updates.join(", ")
            )
        }
        Mutation::Delete { table, filters, .. } => {
            stmt.returns_rows = false;
            let filter_sql = where_clause(&mut stmt, table, filters);
            format!("DELETE FROM {table} AS t{filter_sql}")
        }
        Mutation::Increment {
            table,
            filters,
            field,
            by,
            ..
        } => {
            let p = stmt.bind(SqlParam::Long(*by));
            let filter_sql = where_clause(&mut stmt, table, filters);
            format!(
                "UPDATE {table} AS t SET {field} = COALESCE(t.{field}, 0) + {p}::bigint{filter_sql} \
                 RETURNING to_jsonb(t)"
            )
        }
    };
    Ok(stmt)
}

fn requires_match(mutation: &Mutation) -> bool {
    match mutation {
        Mutation::Update { require_match, .. }
        | Mutation::Delete { require_match, .. }
        | Mutation::Increment { require_match, .. } => *require_match,
        Mutation::Insert { .. } | Mutation::Upsert { .. } => false,
    }
}

fn storage_error(table: &str, err: tokio_postgres::Error) -> StorageError {
    if let Some(db) = err.as_db_error() {
        if db.code().code() == PG_UNIQUE_VIOLATION {
            return StorageError::UniqueViolation {
                table: table.to_string(),
                columns: db.constraint().unwrap_or("unique key").to_string(),
            };
        }
    }
    tracing::error!(table, error = ?err, "Postgres statement failed");
    StorageError::Backend {
        reason: err.to_string(),
    }
}

fn row_record(row: &tokio_postgres::Row) -> StorageResult<Record> {
    match row.try_get::<_, JsonValue>(0) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(StorageError::Serialization {
            reason: "row is not a JSON object".to_string(),
        }),
        Err(e) => Err(StorageError::Serialization {
            reason: e.to_string(),
        }),
    }
}

// ============================================================================
// DATASTORE
// ============================================================================

/// `Datastore` backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgDatastore {
    pool: Pool,
}

impl PgDatastore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> StorageResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            tracing::error!(error = ?e, "Connection pool error");
            StorageError::Backend {
                reason: format!("connection pool: {}", e),
            }
        })
    }
}

#[async_trait]
impl Datastore for PgDatastore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn select(&self, query: &Query) -> StorageResult<Vec<Record>> {
        let stmt = compile_select(query)?;
        let conn = self.get_conn().await?;
        let rows = conn
            .query(stmt.sql.as_str(), &stmt.param_refs())
            .await
            .map_err(|e| storage_error(&query.table, e))?;
        rows.iter().map(row_record).collect()
    }

    async fn execute(&self, batch: Vec<Mutation>) -> StorageResult<Vec<MutationOutcome>> {
        let statements = batch
            .iter()
            .map(compile_mutation)
            .collect::<StorageResult<Vec<_>>>()?;

        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(|e| StorageError::TransactionFailed {
            reason: e.to_string(),
        })?;

        let mut outcomes = Vec::with_capacity(batch.len());
        for (mutation, stmt) in batch.iter().zip(&statements) {
            let table = mutation.table();
            let outcome = if stmt.returns_rows {
                let rows = tx
                    .query(stmt.sql.as_str(), &stmt.param_refs())
                    .await
                    .map_err(|e| storage_error(table, e))?;
                MutationOutcome::rows(rows.iter().map(row_record).collect::<StorageResult<_>>()?)
            } else {
                let affected = tx
                    .execute(stmt.sql.as_str(), &stmt.param_refs())
                    .await
                    .map_err(|e| storage_error(table, e))?;
                MutationOutcome::deleted(affected)
            };
            if requires_match(mutation) && outcome.affected == 0 {
                // Dropping the transaction rolls it back.
                return Err(StorageError::NoMatch {
                    table: table.to_string(),
                });
            }
            outcomes.push(outcome);
        }

        tx.commit().await.map_err(|e| StorageError::TransactionFailed {
            reason: e.to_string(),
        })?;
        Ok(outcomes)
    }

    async fn health(&self) -> HealthCheck {
        let start = Instant::now();
        let result = match self.get_conn().await {
            Ok(conn) => conn.query_one("SELECT 1", &[]).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let elapsed = start.elapsed().as_millis() as i64;
        match result {
            Ok(_) => HealthCheck::healthy("datastore")
                .with_response_time(elapsed)
                .with_metadata("backend", json!("postgres"))
                .with_metadata("pool_size", json!(self.pool_size())),
            Err(reason) => HealthCheck::unhealthy("datastore", reason).with_response_time(elapsed),
        }
    }
}
