//! Follow, connection and block edges between users.
//!
//! Edges are keyed by user pairs rather than owned rows, so this module talks
//! to the datastore directly instead of going through `ResourceGateway`.
//! Blocking wins over everything else: a block removes follows and
//! connections in both directions in the same batch that records it, and no
//! new edge can be created while either side has blocked the other.

use std::sync::Arc;

use kazi_core::{
    from_record, new_entity_id, ConnectionStatus, EntityId, FilterExpr, OwnerId, Record,
    SortDirection, Timestamp,
};
use kazi_storage::{Datastore, Mutation, Query};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::gateway::now;
use crate::resource::MAX_PAGE_SIZE;

const FOLLOWS: &str = "user_follows";
const CONNECTIONS: &str = "user_connections";
const BLOCKS: &str = "user_blocks";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserFollow {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub follower_id: OwnerId,
    pub following_id: OwnerId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserConnection {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub requester_id: OwnerId,
    pub addressee_id: OwnerId,
    pub status: ConnectionStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserBlock {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub blocker_id: OwnerId,
    pub blocked_id: OwnerId,
    pub reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Which side of a pair placed the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum BlockedBy {
    /// The asking user blocked the other one.
    Me,
    Them,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BlockStatus {
    pub blocked: bool,
    pub blocked_by: Option<BlockedBy>,
}

fn pair(left: &str, a: OwnerId, right: &str, b: OwnerId) -> Vec<FilterExpr> {
    vec![
        FilterExpr::eq(left, json!(a)),
        FilterExpr::eq(right, json!(b)),
    ]
}

fn reject_self(a: OwnerId, b: OwnerId, action: &str) -> ApiResult<()> {
    if a == b {
        return Err(ApiError::validation_failed(format!(
            "cannot {} yourself",
            action
        )));
    }
    Ok(())
}

fn rows_into<T: serde::de::DeserializeOwned>(rows: Vec<Record>) -> ApiResult<Vec<T>> {
    rows.into_iter()
        .map(|row| from_record(row).map_err(ApiError::from))
        .collect()
}

/// Social graph operations over the shared datastore.
#[derive(Clone)]
pub struct SocialGraph {
    store: Arc<dyn Datastore>,
}

impl SocialGraph {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    async fn block_row(&self, blocker: OwnerId, blocked: OwnerId) -> ApiResult<Option<Record>> {
        let query = Query::table(BLOCKS)
            .filters(pair("blocker_id", blocker, "blocked_id", blocked))
            .limit(1);
        Ok(self.store.select(&query).await?.into_iter().next())
    }

    async fn ensure_not_blocked(&self, a: OwnerId, b: OwnerId) -> ApiResult<()> {
        if self.is_blocked(a, b).await?.blocked {
            return Err(ApiError::forbidden(
                "this action is not available between these users",
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Follows
    // ------------------------------------------------------------------

    /// Follow `target`. Following twice returns the existing edge.
    pub async fn follow(&self, user: OwnerId, target: OwnerId) -> ApiResult<UserFollow> {
        reject_self(user, target, "follow")?;
        self.ensure_not_blocked(user, target).await?;

        let row = super::row(json!({
            "id": new_entity_id(),
            "follower_id": user,
            "following_id": target,
            "created_at": now(),
        }));
        let stored = self
            .store
            .upsert(FOLLOWS, row, &["follower_id", "following_id"])
            .await?;
        debug!(follower = %user, following = %target, "Follow recorded");
        Ok(from_record(stored)?)
    }

    /// Remove a follow. Returns whether one existed.
    pub async fn unfollow(&self, user: OwnerId, target: OwnerId) -> ApiResult<bool> {
        let removed = self
            .store
            .delete(FOLLOWS, &pair("follower_id", user, "following_id", target))
            .await?;
        Ok(removed > 0)
    }

    pub async fn following(&self, user: OwnerId) -> ApiResult<Vec<UserFollow>> {
        let query = Query::table(FOLLOWS)
            .filter(FilterExpr::eq("follower_id", json!(user)))
            .order_by("created_at", SortDirection::Desc)
            .limit(MAX_PAGE_SIZE);
        rows_into(self.store.select(&query).await?)
    }

    pub async fn followers(&self, user: OwnerId) -> ApiResult<Vec<UserFollow>> {
        let query = Query::table(FOLLOWS)
            .filter(FilterExpr::eq("following_id", json!(user)))
            .order_by("created_at", SortDirection::Desc)
            .limit(MAX_PAGE_SIZE);
        rows_into(self.store.select(&query).await?)
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Send a connection request. An existing connection in either
    /// direction is returned as is.
    pub async fn connect(&self, user: OwnerId, target: OwnerId) -> ApiResult<UserConnection> {
        reject_self(user, target, "connect with")?;
        self.ensure_not_blocked(user, target).await?;

        for (requester, addressee) in [(user, target), (target, user)] {
            let query = Query::table(CONNECTIONS)
                .filters(pair("requester_id", requester, "addressee_id", addressee))
                .limit(1);
            if let Some(existing) = self.store.select(&query).await?.into_iter().next() {
                return Ok(from_record(existing)?);
            }
        }

        let at = now();
        let row = super::row(json!({
            "id": new_entity_id(),
            "requester_id": user,
            "addressee_id": target,
            "status": ConnectionStatus::Pending,
            "created_at": at,
            "updated_at": at,
        }));
        Ok(from_record(self.store.insert(CONNECTIONS, row).await?)?)
    }

    /// Answer a pending request sent by `requester` to `user`.
    pub async fn respond_to_connection(
        &self,
        user: OwnerId,
        requester: OwnerId,
        accept: bool,
    ) -> ApiResult<UserConnection> {
        let status = if accept {
            ConnectionStatus::Accepted
        } else {
            ConnectionStatus::Declined
        };
        let mut filters = pair("requester_id", requester, "addressee_id", user);
        filters.push(FilterExpr::eq("status", json!(ConnectionStatus::Pending)));

        let mut patch = Record::new();
        patch.insert("status".to_string(), json!(status));
        patch.insert("updated_at".to_string(), json!(now()));

        let outcome = match self
            .store
            .execute(vec![Mutation::update(CONNECTIONS, filters, patch).required()])
            .await
        {
            Ok(outcome) => outcome,
            Err(kazi_core::StorageError::NoMatch { .. }) => {
                return Err(ApiError::not_found(format!(
                    "no pending connection request from {}",
                    requester
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let row = outcome
            .into_iter()
            .next()
            .and_then(|o| o.first())
            .ok_or_else(|| ApiError::not_found("connection request not found"))?;
        Ok(from_record(row)?)
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Block `target`: drop follows and connections both ways and record
    /// the block, all in one batch. Blocking twice keeps one row and
    /// refreshes the reason.
    pub async fn block_user(
        &self,
        user: OwnerId,
        target: OwnerId,
        reason: Option<String>,
    ) -> ApiResult<UserBlock> {
        reject_self(user, target, "block")?;

        let block = super::row(json!({
            "id": new_entity_id(),
            "blocker_id": user,
            "blocked_id": target,
            "reason": reason,
            "created_at": now(),
        }));
        let batch = vec![
            Mutation::delete(FOLLOWS, pair("follower_id", user, "following_id", target)),
            Mutation::delete(FOLLOWS, pair("follower_id", target, "following_id", user)),
            Mutation::delete(CONNECTIONS, pair("requester_id", user, "addressee_id", target)),
            Mutation::delete(CONNECTIONS, pair("requester_id", target, "addressee_id", user)),
            Mutation::upsert(BLOCKS, block, ["blocker_id", "blocked_id"]),
        ];
        let outcomes = self.store.execute(batch).await?;
        let removed: u64 = outcomes.iter().take(4).map(|o| o.affected).sum();
        let row = outcomes
            .into_iter()
            .nth(4)
            .and_then(|o| o.first())
            .ok_or_else(|| ApiError::database_error("block was not recorded"))?;

        info!(blocker = %user, blocked = %target, edges_removed = removed, "User blocked");
        Ok(from_record(row)?)
    }

    /// Lift a block. Returns whether one existed.
    pub async fn unblock_user(&self, user: OwnerId, target: OwnerId) -> ApiResult<bool> {
        let removed = self
            .store
            .delete(BLOCKS, &pair("blocker_id", user, "blocked_id", target))
            .await?;
        if removed > 0 {
            info!(blocker = %user, blocked = %target, "User unblocked");
        }
        Ok(removed > 0)
    }

    /// Whether either side has blocked the other. A block placed by `user`
    /// is reported as `me` even when `other` blocked back.
    pub async fn is_blocked(&self, user: OwnerId, other: OwnerId) -> ApiResult<BlockStatus> {
        let blocked_by = if self.block_row(user, other).await?.is_some() {
            Some(BlockedBy::Me)
        } else if self.block_row(other, user).await?.is_some() {
            Some(BlockedBy::Them)
        } else {
            None
        };
        Ok(BlockStatus {
            blocked: blocked_by.is_some(),
            blocked_by,
        })
    }

    /// Users blocked by `user`, newest first.
    pub async fn list_blocked(&self, user: OwnerId) -> ApiResult<Vec<UserBlock>> {
        let query = Query::table(BLOCKS)
            .filter(FilterExpr::eq("blocker_id", json!(user)))
            .order_by("created_at", SortDirection::Desc)
            .limit(MAX_PAGE_SIZE);
        rows_into(self.store.select(&query).await?)
    }
}
