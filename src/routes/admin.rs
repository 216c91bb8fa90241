// SPDX-License-Identifier: MIT

//! Admin routes: badge catalog management and batch reconciliation.
//!
//! All routes here sit behind `require_auth` + `require_admin`. Rule
//! criteria enter storage only through the typed payload below, so an
//! unknown field or operator is rejected at this boundary instead of
//! surfacing later as an engine parse failure.

use crate::error::{AppError, Result};
use crate::models::{Badge, BadgeSyncResult, RewardRule, RuleCriteria, RuleField, RuleOperator};
use crate::services::SyncOptions;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const DEFAULT_SYNC_ALL_BATCH_SIZE: u32 = 50;

/// Admin routes (require an admin profile role on top of JWT auth).
/// Both middleware layers are applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/badges", get(list_badges).post(create_badge))
        .route(
            "/api/admin/badges/{id}",
            axum::routing::patch(update_badge).delete(delete_badge),
        )
        .route("/api/admin/badges/{id}/rule", put(upsert_rule))
        .route("/api/admin/users/{id}/badges/sync", post(sync_user))
        .route("/api/admin/badges/sync-all", post(sync_all))
}

// ─── Badge Catalog ───────────────────────────────────────────

/// Catalog entry with its grant count.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AdminBadge {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub name: String,
    pub icon: Option<String>,
    pub created_at: String,
    pub rule: Option<RewardRule>,
    /// How many users currently hold this badge
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub award_count: u64,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AdminBadgesResponse {
    pub badges: Vec<AdminBadge>,
}

/// List the badge catalog with grant counts, newest first.
async fn list_badges(State(state): State<Arc<AppState>>) -> Result<Json<AdminBadgesResponse>> {
    let catalog = state.db.list_badges().await?;

    let mut counts: HashMap<u64, u64> = HashMap::new();
    for award in state.db.list_all_user_badges().await? {
        *counts.entry(award.badge_id).or_insert(0) += 1;
    }

    let badges = catalog
        .into_iter()
        .map(|badge| {
            let award_count = counts.get(&badge.id).copied().unwrap_or(0);
            AdminBadge {
                id: badge.id,
                name: badge.name,
                icon: badge.icon,
                created_at: badge.created_at,
                rule: badge.rule,
                award_count,
            }
        })
        .collect();

    Ok(Json(AdminBadgesResponse { badges }))
}

#[derive(Deserialize, Validate)]
struct CreateBadgeRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[validate(length(max = 2048))]
    icon: Option<String>,
}

/// Create a badge (without a rule; rules are attached separately).
async fn create_badge(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBadgeRequest>,
) -> Result<Json<Badge>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    ensure_name_unused(&state, &payload.name, None).await?;

    let badge = Badge {
        id: state.db.allocate_badge_id().await?,
        name: payload.name,
        icon: payload.icon,
        created_at: format_utc_rfc3339(chrono::Utc::now()),
        rule: None,
    };
    state.db.upsert_badge(&badge).await?;

    tracing::info!(badge_id = badge.id, name = %badge.name, "Badge created");

    Ok(Json(badge))
}

#[derive(Deserialize, Validate)]
struct UpdateBadgeRequest {
    #[validate(length(min = 1, max = 100))]
    name: Option<String>,
    #[validate(length(max = 2048))]
    icon: Option<String>,
}

/// Rename or re-icon a badge.
async fn update_badge(
    State(state): State<Arc<AppState>>,
    Path(badge_id): Path<u64>,
    Json(payload): Json<UpdateBadgeRequest>,
) -> Result<Json<Badge>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut badge = state
        .db
        .get_badge(badge_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("badge {badge_id}")))?;

    if let Some(name) = payload.name {
        if name != badge.name {
            ensure_name_unused(&state, &name, Some(badge_id)).await?;
        }
        badge.name = name;
    }
    if let Some(icon) = payload.icon {
        badge.icon = Some(icon);
    }

    state.db.upsert_badge(&badge).await?;

    Ok(Json(badge))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteBadgeResponse {
    /// Documents removed: the badge plus every grant of it
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub deleted: usize,
}

/// Delete a badge together with every grant of it.
async fn delete_badge(
    State(state): State<Arc<AppState>>,
    Path(badge_id): Path<u64>,
) -> Result<Json<DeleteBadgeResponse>> {
    if state.db.get_badge(badge_id).await?.is_none() {
        return Err(AppError::NotFound(format!("badge {badge_id}")));
    }

    let deleted = state.db.delete_badge_with_awards(badge_id).await?;

    Ok(Json(DeleteBadgeResponse { deleted }))
}

/// Reject a badge name that another badge already uses.
async fn ensure_name_unused(
    state: &AppState,
    name: &str,
    except_badge_id: Option<u64>,
) -> Result<()> {
    let taken = state
        .db
        .list_badges()
        .await?
        .iter()
        .any(|badge| badge.name == name && Some(badge.id) != except_badge_id);

    if taken {
        return Err(AppError::Conflict(format!(
            "badge name '{name}' already in use"
        )));
    }
    Ok(())
}

// ─── Reward Rules ────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct UpsertRuleRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    field: RuleField,
    operator: RuleOperator,
    value: u64,
}

/// Attach or replace a badge's reward rule.
///
/// The criterion arrives already typed, so only the four known fields
/// and operators can be serialized into storage.
async fn upsert_rule(
    State(state): State<Arc<AppState>>,
    Path(badge_id): Path<u64>,
    Json(payload): Json<UpsertRuleRequest>,
) -> Result<Json<Badge>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut badge = state
        .db
        .get_badge(badge_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("badge {badge_id}")))?;

    let criteria = RuleCriteria {
        field: payload.field,
        operator: payload.operator,
        value: payload.value,
    };
    let criteria = serde_json::to_string(&criteria)
        .map_err(|e| anyhow::anyhow!("Failed to serialize criteria: {}", e))?;

    badge.rule = Some(RewardRule {
        name: payload.name,
        criteria,
    });
    state.db.upsert_badge(&badge).await?;

    tracing::info!(badge_id, "Reward rule upserted");

    Ok(Json(badge))
}

// ─── Reconciliation ──────────────────────────────────────────

/// Force a reconciliation pass for one user.
async fn sync_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<u64>,
) -> Result<Json<BadgeSyncResult>> {
    if state.db.get_profile(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("user {user_id}")));
    }

    let result = state
        .engine
        .sync_user_badges(
            user_id,
            SyncOptions {
                force: true,
                now: None,
            },
        )
        .await;

    Ok(Json(result))
}

#[derive(Deserialize, Validate, Default)]
struct SyncAllRequest {
    #[validate(range(min = 1, max = 100))]
    batch_size: Option<u32>,
    /// Opaque cursor from a previous page
    cursor: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncAllResponse {
    /// Users reconciled in this page
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub synced: usize,
    /// Grants across the page
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub added: usize,
    /// Revocations across the page
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub removed: usize,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Reconcile every user's badges, one page per call.
///
/// Callers loop while `has_more`, passing `next_cursor` back in. A
/// user whose pass fails contributes an empty diff and the page keeps
/// going.
async fn sync_all(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SyncAllRequest>,
) -> Result<Json<SyncAllResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let batch_size = payload.batch_size.unwrap_or(DEFAULT_SYNC_ALL_BATCH_SIZE);
    let after_id = parse_cursor(payload.cursor.as_deref())?;

    let page = state.engine.sync_all_users(after_id, batch_size).await?;

    let next_cursor = if page.has_more {
        page.last_user_id.map(encode_cursor)
    } else {
        None
    };

    Ok(Json(SyncAllResponse {
        synced: page.synced,
        added: page.added,
        removed: page.removed,
        next_cursor,
        has_more: page.has_more,
    }))
}

fn parse_cursor(cursor: Option<&str>) -> Result<Option<u64>> {
    cursor
        .map(|raw| {
            let invalid_cursor = || AppError::BadRequest("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let decoded_str = std::str::from_utf8(&decoded).map_err(|_| invalid_cursor())?;

            decoded_str.parse::<u64>().map_err(|_| invalid_cursor())
        })
        .transpose()
}

fn encode_cursor(last_user_id: u64) -> String {
    URL_SAFE_NO_PAD.encode(last_user_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip() {
        let encoded = encode_cursor(42);
        let decoded = parse_cursor(Some(&encoded)).unwrap().unwrap();
        assert_eq!(decoded, 42);
    }

    #[test]
    fn test_cursor_rejects_invalid_input() {
        let err = parse_cursor(Some("not-base64!")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_missing_cursor_is_first_page() {
        assert_eq!(parse_cursor(None).unwrap(), None);
    }
}
