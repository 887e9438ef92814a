//! Generic owner-scoped gateway over a `Datastore`.
//!
//! `ResourceGateway<R>` is the single implementation behind every entity
//! module. Each call filters by the acting principal in addition to the row
//! id, and every multi-write sequence (exclusive flags, cascades, transitions
//! with audit rows, counter increments) goes through one atomic batch.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, SubsecRound, Utc};
use kazi_core::{
    from_record, new_entity_id, record_timestamp, strip_nulls, to_record, EntityId, EntityRef,
    FilterExpr, OwnerId, Record, StorageError, Timestamp, ValidationError, CREATED_AT_COLUMN,
    DELETED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN,
};
use kazi_storage::{Datastore, Mutation, MutationOutcome, Query};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::error::{ApiError, ApiResult};
use crate::resource::{
    Cascade, ExclusiveFlag, ListFilter, Ownership, Page, Resource, MAX_PAGE_SIZE,
};
use crate::stats::{Coverage, Window};
use crate::telemetry::metrics::record_gateway_operation;

/// Current time at the precision Postgres stores.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

/// Next `updated_at` value: now, or one microsecond past the previous stamp
/// when the clock has not moved past it.
pub fn next_stamp(previous: Option<Timestamp>) -> Timestamp {
    let now = now();
    match previous {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    }
}

// ============================================================================
// TRANSITIONS
// ============================================================================

/// Companion row written in the same batch as a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub table: &'static str,
    /// Column on the audit table that receives the transitioned row's id.
    pub target_column: &'static str,
    pub row: Record,
}

impl AuditEntry {
    pub fn new(table: &'static str, target_column: &'static str, row: Record) -> Self {
        Self {
            table,
            target_column,
            row,
        }
    }

    fn into_mutation(self, target: EntityId, at: Timestamp) -> Mutation {
        let mut row = self.row;
        row.insert(ID_COLUMN.to_string(), json!(new_entity_id()));
        row.insert(CREATED_AT_COLUMN.to_string(), json!(at));
        row.insert(self.target_column.to_string(), json!(target));
        Mutation::insert(self.table, row)
    }
}

/// A guarded status change plus its side effects.
///
/// Built with chained setters:
///
/// ```ignore
/// Transition::to(InvoiceStatus::Completed)
///     .from(&[InvoiceStatus::Pending, InvoiceStatus::Paid])
///     .stamp("completed_at")
///     .set("progress_percentage", json!(100))
/// ```
#[derive(Debug, Clone)]
pub struct Transition<S> {
    status: Option<S>,
    allowed_from: Vec<S>,
    stamp: Option<&'static str>,
    fields: Record,
    increment: Option<(&'static str, i64)>,
    audit: Option<AuditEntry>,
}

impl<S: Serialize + Copy> Transition<S> {
    /// Change the status to `status`.
    pub fn to(status: S) -> Self {
        Self {
            status: Some(status),
            ..Self::unchanged()
        }
    }

    /// Keep the status, only apply fields, counters and audit rows.
    pub fn unchanged() -> Self {
        Self {
            status: None,
            allowed_from: Vec::new(),
            stamp: None,
            fields: Record::new(),
            increment: None,
            audit: None,
        }
    }

    /// Statuses the row must currently be in. Empty means any.
    pub fn from(mut self, allowed: &[S]) -> Self {
        self.allowed_from = allowed.to_vec();
        self
    }

    /// Timestamp column set to the transition time.
    pub fn stamp(mut self, column: &'static str) -> Self {
        self.stamp = Some(column);
        self
    }

    pub fn set(mut self, column: &str, value: Value) -> Self {
        self.fields.insert(column.to_string(), value);
        self
    }

    pub fn increment(mut self, column: &'static str, by: i64) -> Self {
        self.increment = Some((column, by));
        self
    }

    pub fn audit(mut self, entry: AuditEntry) -> Self {
        self.audit = Some(entry);
        self
    }
}

fn status_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

/// Typed CRUD and transitions for one resource.
pub struct ResourceGateway<R> {
    store: Arc<dyn Datastore>,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for ResourceGateway<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> ResourceGateway<R> {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self {
            store,
            _resource: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    async fn observe<T, F>(&self, operation: &'static str, owner: OwnerId, fut: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let elapsed = start.elapsed();
        let status = if result.is_ok() { "ok" } else { "error" };
        record_gateway_operation(operation, R::TABLE, status, elapsed);

        match &result {
            Ok(_) => debug!(
                table = R::TABLE,
                operation,
                owner = %owner,
                elapsed_ms = elapsed.as_millis() as u64,
                "Gateway operation completed"
            ),
            Err(e) if e.code.is_server_error() => error!(
                table = R::TABLE,
                operation,
                owner = %owner,
                code = %e.code,
                "Gateway operation failed: {}",
                e.message
            ),
            Err(e) => warn!(
                table = R::TABLE,
                operation,
                owner = %owner,
                code = %e.code,
                "Gateway operation rejected: {}",
                e.message
            ),
        }
        result
    }

    // ------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------

    /// Filters restricting a table to the rows `owner` may see.
    async fn scope_filters(&self, owner: OwnerId) -> ApiResult<Vec<FilterExpr>> {
        match R::OWNERSHIP {
            Ownership::Column(column) => Ok(vec![FilterExpr::eq(column, json!(owner))]),
            Ownership::Parent {
                column,
                parent_table,
                parent_owner,
            } => {
                let parents = self
                    .store
                    .select(&Query::table(parent_table).filter(FilterExpr::eq(parent_owner, json!(owner))))
                    .await?;
                let ids = parents
                    .into_iter()
                    .filter_map(|mut row| row.remove(ID_COLUMN))
                    .collect();
                Ok(vec![FilterExpr::in_list(column, ids)])
            }
        }
    }

    async fn row_filters(&self, owner: OwnerId, id: EntityId) -> ApiResult<Vec<FilterExpr>> {
        let mut filters = self.scope_filters(owner).await?;
        filters.push(FilterExpr::eq(ID_COLUMN, json!(id)));
        Ok(filters)
    }

    /// The row if it exists and is owned, soft-deleted or not.
    async fn owned_row(&self, owner: OwnerId, id: EntityId) -> ApiResult<Option<Record>> {
        let query = Query::table(R::TABLE)
            .filters(self.row_filters(owner, id).await?)
            .limit(1);
        Ok(self.store.select(&query).await?.into_iter().next())
    }

    /// The row if it exists, is owned and is not soft-deleted.
    async fn live_row(&self, owner: OwnerId, id: EntityId) -> ApiResult<Option<Record>> {
        Ok(self
            .owned_row(owner, id)
            .await?
            .filter(|row| !is_deleted(row)))
    }

    async fn ensure_parent_owned(&self, owner: OwnerId, row: &Record) -> ApiResult<()> {
        let Ownership::Parent {
            column,
            parent_table,
            parent_owner,
        } = R::OWNERSHIP
        else {
            return Ok(());
        };
        let parent_id = row
            .get(column)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| ApiError::missing_field(column))?;
        let query = Query::table(parent_table)
            .filter(FilterExpr::eq(ID_COLUMN, parent_id.clone()))
            .filter(FilterExpr::eq(parent_owner, json!(owner)))
            .limit(1);
        if self.store.select(&query).await?.is_empty() {
            return Err(ApiError::not_found(format!(
                "{} with id {} not found",
                parent_table,
                status_text(&parent_id)
            )));
        }
        Ok(())
    }

    /// Reject a row that would duplicate a live row in any unique scope.
    async fn check_unique(&self, row: &Record, exclude: Option<EntityId>) -> ApiResult<()> {
        for scope in R::UNIQUE {
            let mut columns: Vec<&str> = R::OWNERSHIP.owner_column().into_iter().collect();
            columns.extend(scope.iter().copied());

            let mut query = Query::table(R::TABLE).limit(1);
            let mut complete = true;
            for column in &columns {
                match row.get(*column) {
                    Some(value) if !value.is_null() => {
                        query = query.filter(FilterExpr::eq(*column, value.clone()));
                    }
                    _ => complete = false,
                }
            }
            if !complete {
                continue;
            }
            if R::SOFT_DELETE {
                query = query.filter(FilterExpr::is_null(DELETED_AT_COLUMN));
            }
            if let Some(id) = exclude {
                query = query.filter(FilterExpr::ne(ID_COLUMN, json!(id)));
            }
            if !self.store.select(&query).await?.is_empty() {
                let taken = scope
                    .iter()
                    .map(|c| format!("{}={}", c, row.get(*c).map(status_text).unwrap_or_default()))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ApiError::entity_already_exists(R::ENTITY.as_str(), taken)
                    .with_details(json!({ "columns": scope })));
            }
        }
        Ok(())
    }

    /// Run a batch, turning a failed guard into `on_no_match`.
    async fn run(
        &self,
        batch: Vec<Mutation>,
        on_no_match: impl FnOnce() -> ApiError,
    ) -> ApiResult<Vec<MutationOutcome>> {
        match self.store.execute(batch).await {
            Ok(outcomes) => Ok(outcomes),
            Err(StorageError::NoMatch { .. }) => Err(on_no_match()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_query(&self, scope: Vec<FilterExpr>, filter: &R::Filter, include_deleted: bool) -> Query {
        let (order_column, direction) = R::ORDER_BY;
        let mut query = Query::table(R::TABLE)
            .filters(scope)
            .filters(filter.filters())
            .order_by(order_column, direction);
        if R::SOFT_DELETE && !include_deleted {
            query = query.filter(FilterExpr::is_null(DELETED_AT_COLUMN));
        }
        query
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The owned row, `None` when absent or owned by someone else.
    /// Soft-deleted rows are returned with `deleted_at` set.
    pub async fn get_one(&self, owner: OwnerId, id: EntityId) -> ApiResult<Option<R>> {
        self.observe("get_one", owner, async {
            match self.owned_row(owner, id).await? {
                Some(row) => Ok(Some(from_record(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Like `get_one`, but absence is `ENTITY_NOT_FOUND`.
    pub async fn find_one(&self, owner: OwnerId, id: EntityId) -> ApiResult<R> {
        self.get_one(owner, id)
            .await?
            .ok_or_else(|| R::not_found(id))
    }

    /// Live rows matching the filter, in resource order.
    pub async fn get_many(&self, owner: OwnerId, filter: &R::Filter, page: Page) -> ApiResult<Vec<R>> {
        self.observe("get_many", owner, self.list(owner, filter, page, false))
            .await
    }

    /// Same as `get_many`, soft-deleted rows included.
    pub async fn get_many_including_deleted(
        &self,
        owner: OwnerId,
        filter: &R::Filter,
        page: Page,
    ) -> ApiResult<Vec<R>> {
        self.observe("get_many", owner, self.list(owner, filter, page, true))
            .await
    }

    async fn list(
        &self,
        owner: OwnerId,
        filter: &R::Filter,
        page: Page,
        include_deleted: bool,
    ) -> ApiResult<Vec<R>> {
        let query = self
            .list_query(self.scope_filters(owner).await?, filter, include_deleted)
            .limit(page.resolved_limit(R::DEFAULT_LIMIT))
            .offset(page.resolved_offset());
        self.store
            .select(&query)
            .await?
            .into_iter()
            .map(|row| from_record(row).map_err(ApiError::from))
            .collect()
    }

    /// At most `cap` live rows, flagged `truncated` when more exist.
    pub async fn fetch_window(
        &self,
        owner: OwnerId,
        filter: &R::Filter,
        cap: usize,
    ) -> ApiResult<Window<R>> {
        self.observe("fetch_window", owner, async {
            let cap = cap.clamp(1, MAX_PAGE_SIZE);
            let query = self
                .list_query(self.scope_filters(owner).await?, filter, false)
                .limit(cap + 1);
            let rows = self.store.select(&query).await?;
            let truncated = rows.len() > cap;
            let items = rows
                .into_iter()
                .take(cap)
                .map(|row| from_record(row).map_err(ApiError::from))
                .collect::<ApiResult<Vec<R>>>()?;
            Ok(Window::new(items, cap, truncated))
        })
        .await
    }

    /// Live rows matching the filter, counted up to `MAX_PAGE_SIZE`.
    pub async fn count(&self, owner: OwnerId, filter: &R::Filter) -> ApiResult<u64> {
        Ok(self.count_capped(owner, filter).await?.sample_size as u64)
    }

    /// Like `count`, with `truncated` set when more rows match than were
    /// counted.
    pub async fn count_capped(&self, owner: OwnerId, filter: &R::Filter) -> ApiResult<Coverage> {
        let window = self.fetch_window(owner, filter, MAX_PAGE_SIZE).await?;
        Ok(window.coverage())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert a row: defaults, then the default status, then caller input,
    /// then server-owned columns.
    pub async fn create(&self, owner: OwnerId, input: R::Create) -> ApiResult<R> {
        self.observe("create", owner, async {
            let row = self.new_row(owner, &input).await?;
            let stored = self.store.insert(R::TABLE, row).await?;
            Ok(from_record(stored)?)
        })
        .await
    }

    /// Insert a row already holding the exclusive flag, clearing the flag on
    /// its siblings in the same batch.
    pub async fn create_exclusive(&self, owner: OwnerId, input: R::Create) -> ApiResult<R> {
        self.observe("create_exclusive", owner, async {
            let flag = exclusive_flag::<R>()?;
            let mut row = self.new_row(owner, &input).await?;
            row.insert(flag.field.to_string(), json!(true));

            let id = new_entity_id();
            row.insert(ID_COLUMN.to_string(), json!(id));

            let siblings = self.sibling_filters(owner, flag, &row).await?;
            let mut clear = Record::new();
            clear.insert(flag.field.to_string(), json!(false));
            clear.insert(UPDATED_AT_COLUMN.to_string(), json!(now()));

            let batch = vec![
                Mutation::update(R::TABLE, siblings, clear),
                Mutation::insert(R::TABLE, row),
            ];
            let outcomes = self.run(batch, || R::not_found(id)).await?;
            single_row::<R>(outcomes, 1, id)
        })
        .await
    }

    /// Validated row for `input` with defaults, owner, id and timestamps.
    async fn new_row(&self, owner: OwnerId, input: &R::Create) -> ApiResult<Record> {
        R::validate_create(owner, input)?;

        let mut row = R::defaults();
        if let Some(field) = R::STATUS_FIELD {
            row.insert(field.to_string(), serde_json::to_value(R::Status::default())?);
        }
        row.extend(strip_nulls(R::input_columns(input)?));

        let now = now();
        row.insert(ID_COLUMN.to_string(), json!(new_entity_id()));
        match R::OWNERSHIP {
            Ownership::Column(column) => {
                row.insert(column.to_string(), json!(owner));
            }
            Ownership::Parent { .. } => self.ensure_parent_owned(owner, &row).await?,
        }
        row.insert(CREATED_AT_COLUMN.to_string(), json!(now));
        row.insert(UPDATED_AT_COLUMN.to_string(), json!(now));

        self.check_unique(&row, None).await?;
        Ok(row)
    }

    /// Owned rows in `row`'s flag scope that currently hold the flag.
    async fn sibling_filters(
        &self,
        owner: OwnerId,
        flag: ExclusiveFlag,
        row: &Record,
    ) -> ApiResult<Vec<FilterExpr>> {
        let mut siblings = self.scope_filters(owner).await?;
        for column in flag.scope {
            let value = row
                .get(*column)
                .filter(|v| !v.is_null())
                .cloned()
                .ok_or_else(|| ApiError::missing_field(column))?;
            siblings.push(FilterExpr::eq(*column, value));
        }
        siblings.push(FilterExpr::eq(flag.field, json!(true)));
        Ok(siblings)
    }

    /// Merge the present fields of `input` into a live owned row.
    pub async fn update(&self, owner: OwnerId, id: EntityId, input: R::Update) -> ApiResult<R> {
        self.observe("update", owner, async {
            R::validate_update(&input)?;

            let mut patch = strip_nulls(to_record(&input)?);
            for column in protected_columns::<R>() {
                patch.remove(column);
            }

            let current = self
                .live_row(owner, id)
                .await?
                .ok_or_else(|| R::not_found(id))?;
            R::derive_update(&current, &mut patch);
            if !R::UNIQUE.is_empty() {
                let mut merged = current.clone();
                merged.extend(patch.clone());
                self.check_unique(&merged, Some(id)).await?;
            }
            patch.insert(
                UPDATED_AT_COLUMN.to_string(),
                json!(next_stamp(record_timestamp(&current, UPDATED_AT_COLUMN))),
            );

            let mut filters = self.row_filters(owner, id).await?;
            if R::SOFT_DELETE {
                filters.push(FilterExpr::is_null(DELETED_AT_COLUMN));
            }
            let outcome = self
                .run(vec![Mutation::update(R::TABLE, filters, patch).required()], || {
                    R::not_found(id)
                })
                .await?;
            single_row::<R>(outcome, 0, id)
        })
        .await
    }

    /// Stamp `deleted_at`. A second call returns the row unchanged.
    pub async fn soft_delete(&self, owner: OwnerId, id: EntityId) -> ApiResult<R> {
        self.observe("soft_delete", owner, async {
            require_soft_delete::<R>()?;
            let current = self
                .owned_row(owner, id)
                .await?
                .ok_or_else(|| R::not_found(id))?;
            if is_deleted(&current) {
                return Ok(from_record(current)?);
            }

            let now = now();
            let mut patch = Record::new();
            patch.insert(DELETED_AT_COLUMN.to_string(), json!(now));
            patch.insert(
                UPDATED_AT_COLUMN.to_string(),
                json!(next_stamp(record_timestamp(&current, UPDATED_AT_COLUMN))),
            );
            let mut filters = self.row_filters(owner, id).await?;
            filters.push(FilterExpr::is_null(DELETED_AT_COLUMN));

            match self
                .run(vec![Mutation::update(R::TABLE, filters, patch).required()], || {
                    R::not_found(id)
                })
                .await
            {
                Ok(outcome) => single_row::<R>(outcome, 0, id),
                // Lost a race with another delete: report the row as it now is.
                Err(e) if e.code == crate::error::ErrorCode::EntityNotFound => self
                    .owned_row(owner, id)
                    .await?
                    .map(|row| from_record(row).map_err(ApiError::from))
                    .unwrap_or(Err(e)),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Clear `deleted_at` on an owned row.
    pub async fn restore(&self, owner: OwnerId, id: EntityId) -> ApiResult<R> {
        self.observe("restore", owner, async {
            require_soft_delete::<R>()?;
            let current = self
                .owned_row(owner, id)
                .await?
                .ok_or_else(|| R::not_found(id))?;
            if !is_deleted(&current) {
                return Ok(from_record(current)?);
            }
            self.check_unique(&current, Some(id)).await?;

            let mut patch = Record::new();
            patch.insert(DELETED_AT_COLUMN.to_string(), Value::Null);
            patch.insert(
                UPDATED_AT_COLUMN.to_string(),
                json!(next_stamp(record_timestamp(&current, UPDATED_AT_COLUMN))),
            );
            let filters = self.row_filters(owner, id).await?;
            let outcome = self
                .run(vec![Mutation::update(R::TABLE, filters, patch).required()], || {
                    R::not_found(id)
                })
                .await?;
            single_row::<R>(outcome, 0, id)
        })
        .await
    }

    /// Delete cascade children, then the row, in one batch.
    pub async fn hard_delete(&self, owner: OwnerId, id: EntityId) -> ApiResult<()> {
        self.observe("hard_delete", owner, async {
            if self.owned_row(owner, id).await?.is_none() {
                return Err(R::not_found(id));
            }

            let attached = EntityRef::new(R::ENTITY, id).filters();
            let mut batch = Vec::new();
            for cascade in R::CASCADE {
                match cascade {
                    Cascade::ForeignKey { table, column } => {
                        let by_parent = vec![FilterExpr::eq(*column, json!(id))];
                        batch.push(Mutation::delete(*table, by_parent));
                    }
                    Cascade::Attached { table } => {
                        batch.push(Mutation::delete(*table, attached.clone()));
                    }
                    Cascade::AttachedWith { table, children } => {
                        let child_ids: Vec<Value> = self
                            .store
                            .select(&Query::table(*table).filters(attached.clone()))
                            .await?
                            .into_iter()
                            .filter_map(|row| row.get(ID_COLUMN).cloned())
                            .collect();
                        if !child_ids.is_empty() {
                            for (child_table, column) in *children {
                                batch.push(Mutation::delete(
                                    *child_table,
                                    vec![FilterExpr::in_list(*column, child_ids.clone())],
                                ));
                            }
                        }
                        batch.push(Mutation::delete(*table, attached.clone()));
                    }
                }
            }
            batch.push(Mutation::delete(R::TABLE, self.row_filters(owner, id).await?).required());

            self.run(batch, || R::not_found(id)).await?;
            Ok(())
        })
        .await
    }

    /// Set the exclusive flag on `id` and clear it on every other row in
    /// the same scope, atomically.
    pub async fn set_exclusive(&self, owner: OwnerId, id: EntityId) -> ApiResult<R> {
        self.observe("set_exclusive", owner, async {
            let flag = exclusive_flag::<R>()?;
            let current = self
                .live_row(owner, id)
                .await?
                .ok_or_else(|| R::not_found(id))?;
            let siblings = self.sibling_filters(owner, flag, &current).await?;

            let now = now();
            let mut clear = Record::new();
            clear.insert(flag.field.to_string(), json!(false));
            clear.insert(UPDATED_AT_COLUMN.to_string(), json!(now));

            let mut set = Record::new();
            set.insert(flag.field.to_string(), json!(true));
            set.insert(
                UPDATED_AT_COLUMN.to_string(),
                json!(next_stamp(record_timestamp(&current, UPDATED_AT_COLUMN))),
            );

            let batch = vec![
                Mutation::update(R::TABLE, siblings, clear),
                Mutation::update(R::TABLE, self.row_filters(owner, id).await?, set).required(),
            ];
            let outcomes = self.run(batch, || R::not_found(id)).await?;
            single_row::<R>(outcomes, 1, id)
        })
        .await
    }

    /// Apply a guarded transition: status change, stamp, extra fields,
    /// counter increment and audit row commit together or not at all.
    pub async fn transition(
        &self,
        owner: OwnerId,
        id: EntityId,
        transition: Transition<R::Status>,
    ) -> ApiResult<R> {
        self.observe("transition", owner, async {
            let current = self
                .live_row(owner, id)
                .await?
                .ok_or_else(|| R::not_found(id))?;

            let mut filters = self.row_filters(owner, id).await?;
            if R::SOFT_DELETE {
                filters.push(FilterExpr::is_null(DELETED_AT_COLUMN));
            }

            let mut patch = transition.fields;
            match R::STATUS_FIELD {
                Some(field) => {
                    let current_status = current.get(field).cloned().unwrap_or(Value::Null);
                    let allowed = transition
                        .allowed_from
                        .iter()
                        .map(serde_json::to_value)
                        .collect::<Result<Vec<_>, _>>()?;
                    if !allowed.is_empty() && !allowed.contains(&current_status) {
                        let to = match &transition.status {
                            Some(status) => status_text(&serde_json::to_value(status)?),
                            None => status_text(&current_status),
                        };
                        return Err(ValidationError::InvalidTransition {
                            entity: R::ENTITY.as_str().to_string(),
                            from: status_text(&current_status),
                            to,
                        }
                        .into());
                    }
                    // Guard against a concurrent transition out of the status we checked.
                    filters.push(FilterExpr::eq(field, current_status));
                    if let Some(status) = &transition.status {
                        patch.insert(field.to_string(), serde_json::to_value(status)?);
                    }
                }
                None if transition.status.is_some() || !transition.allowed_from.is_empty() => {
                    return Err(ApiError::validation_failed(format!(
                        "{} has no lifecycle status",
                        R::ENTITY.as_str()
                    )));
                }
                None => {}
            }

            let now = now();
            if let Some(column) = transition.stamp {
                patch.insert(column.to_string(), json!(now));
            }
            patch.insert(
                UPDATED_AT_COLUMN.to_string(),
                json!(next_stamp(record_timestamp(&current, UPDATED_AT_COLUMN))),
            );

            let mut batch = vec![Mutation::update(R::TABLE, filters, patch).required()];
            let returned_at = if let Some((column, by)) = transition.increment {
                batch.push(
                    Mutation::increment(
                        R::TABLE,
                        vec![FilterExpr::eq(ID_COLUMN, json!(id))],
                        column,
                        by,
                    )
                    .required(),
                );
                1
            } else {
                0
            };
            if let Some(audit) = transition.audit {
                batch.push(audit.into_mutation(id, now));
            }

            let outcomes = self
                .run(batch, || {
                    ApiError::state_conflict(format!(
                        "{} {} changed while the transition was applied",
                        R::ENTITY.as_str(),
                        id
                    ))
                })
                .await?;
            single_row::<R>(outcomes, returned_at, id)
        })
        .await
    }
}

fn is_deleted(row: &Record) -> bool {
    row.get(DELETED_AT_COLUMN).is_some_and(|v| !v.is_null())
}

fn require_soft_delete<R: Resource>() -> ApiResult<()> {
    if R::SOFT_DELETE {
        Ok(())
    } else {
        Err(ApiError::validation_failed(format!(
            "{} does not support soft delete",
            R::ENTITY.as_str()
        )))
    }
}

fn exclusive_flag<R: Resource>() -> ApiResult<ExclusiveFlag> {
    R::EXCLUSIVE.ok_or_else(|| {
        ApiError::validation_failed(format!("{} has no default flag", R::ENTITY.as_str()))
    })
}

/// Columns callers can never overwrite through `update`.
fn protected_columns<R: Resource>() -> Vec<&'static str> {
    let mut columns = vec![ID_COLUMN, CREATED_AT_COLUMN, UPDATED_AT_COLUMN, DELETED_AT_COLUMN];
    match R::OWNERSHIP {
        Ownership::Column(column) => columns.push(column),
        Ownership::Parent { column, .. } => columns.push(column),
    }
    columns
}

fn single_row<R: Resource>(
    outcomes: Vec<MutationOutcome>,
    index: usize,
    id: EntityId,
) -> ApiResult<R> {
    let row = outcomes
        .into_iter()
        .nth(index)
        .and_then(MutationOutcome::first)
        .ok_or_else(|| R::not_found(id))?;
    Ok(from_record(row)?)
}
