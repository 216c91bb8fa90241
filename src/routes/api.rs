// SPDX-License-Identifier: MIT

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{BadgeSyncResult, ChallengeParticipation, UserRole, UserStats, WorkoutEntry};
use crate::services::SyncOptions;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const LEADERBOARD_LIMIT: usize = 100;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/profile/provision", post(provision_profile))
        .route("/api/me", get(get_me))
        .route("/api/badges/my", get(get_my_badges))
        .route("/api/badges/sync", post(sync_badges))
        .route("/api/participations/{id}/entries", post(log_workout_entry))
}

/// Public API routes (no authentication).
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/leaderboard", get(get_leaderboard))
}

// ─── Profile Provisioning ────────────────────────────────────

#[derive(Deserialize, Validate)]
struct ProvisionRequest {
    #[validate(email)]
    email: Option<String>,
    #[validate(length(max = 100))]
    display_name: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProvisionResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub role: UserRole,
    pub created: bool,
}

/// Get-or-create the caller's profile.
///
/// An existing profile is returned untouched: role and the badge sync
/// marker survive re-provisioning. A new profile starts as CLIENT with
/// no sync marker, so its first badge read triggers a full pass.
async fn provision_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ProvisionRequest>,
) -> Result<Json<ProvisionResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if let Some(existing) = state.db.get_profile(user.user_id).await? {
        return Ok(Json(ProvisionResponse {
            id: existing.id,
            role: existing.role,
            created: false,
        }));
    }

    let profile = crate::models::UserProfile {
        id: user.user_id,
        email: payload.email,
        display_name: payload.display_name,
        role: UserRole::Client,
        created_at: format_utc_rfc3339(chrono::Utc::now()),
        last_badge_sync_at: None,
    };
    state.db.upsert_profile(&profile).await?;

    tracing::info!(user_id = user.user_id, "Provisioned new profile");

    Ok(Json(ProvisionResponse {
        id: profile.id,
        role: profile.role,
        created: true,
    }))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MeResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: UserRole,
    pub created_at: String,
    pub last_badge_sync_at: Option<String>,
    pub stats: UserStats,
}

/// Get current user profile with freshly computed stats.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let profile = state
        .db
        .get_profile(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    let stats = state.engine.compute_user_stats(user.user_id).await?;

    Ok(Json(MeResponse {
        id: profile.id,
        email: profile.email,
        display_name: profile.display_name,
        role: profile.role,
        created_at: profile.created_at,
        last_badge_sync_at: profile.last_badge_sync_at,
        stats,
    }))
}

// ─── Badges ──────────────────────────────────────────────────

/// One badge the caller holds.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AwardedBadge {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub badge_id: u64,
    pub name: String,
    pub icon: Option<String>,
    pub reason: String,
    pub awarded_at: String,
}

/// One badge the caller does not hold yet.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AvailableBadge {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub name: String,
    pub icon: Option<String>,
    /// Whether the badge is granted automatically by a rule
    pub automatic: bool,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MyBadgesResponse {
    /// Held badges, most recent first
    pub badges: Vec<AwardedBadge>,
    /// Catalog badges not held yet
    pub available: Vec<AvailableBadge>,
    /// Reconciliation diff, present when a stale sync ran
    pub sync: Option<BadgeSyncResult>,
}

/// Get the caller's badges, reconciling first if they are stale.
async fn get_my_badges(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MyBadgesResponse>> {
    let sync = state.engine.maybe_sync_user_badges(user.user_id, None).await;

    let catalog = state.db.list_badges().await?;
    let mut awards = state.db.get_user_badges(user.user_id).await?;
    awards.sort_by(|a, b| b.awarded_at.cmp(&a.awarded_at));

    let by_id: HashMap<u64, &crate::models::Badge> =
        catalog.iter().map(|badge| (badge.id, badge)).collect();
    let held: HashSet<u64> = awards.iter().map(|award| award.badge_id).collect();

    let badges = awards
        .iter()
        .filter_map(|award| {
            by_id.get(&award.badge_id).map(|badge| AwardedBadge {
                badge_id: award.badge_id,
                name: badge.name.clone(),
                icon: badge.icon.clone(),
                reason: award.reason.clone(),
                awarded_at: award.awarded_at.clone(),
            })
        })
        .collect();

    let available = catalog
        .iter()
        .filter(|badge| !held.contains(&badge.id))
        .map(|badge| AvailableBadge {
            id: badge.id,
            name: badge.name.clone(),
            icon: badge.icon.clone(),
            automatic: badge.rule.is_some(),
        })
        .collect();

    Ok(Json(MyBadgesResponse {
        badges,
        available,
        sync,
    }))
}

#[derive(Deserialize, Default)]
struct SyncBadgesRequest {
    /// Skip the staleness gate and reconcile unconditionally
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncBadgesResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "Array<number>"))]
    pub added: Vec<u64>,
    #[cfg_attr(feature = "binding-generation", ts(type = "Array<number>"))]
    pub removed: Vec<u64>,
    /// True when the staleness gate skipped the pass
    pub throttled: bool,
}

/// Reconcile the caller's badges on demand.
async fn sync_badges(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<SyncBadgesRequest>,
) -> Result<Json<SyncBadgesResponse>> {
    let (result, throttled) = if payload.force {
        let result = state
            .engine
            .sync_user_badges(
                user.user_id,
                SyncOptions {
                    force: true,
                    now: None,
                },
            )
            .await;
        (result, false)
    } else {
        match state.engine.maybe_sync_user_badges(user.user_id, None).await {
            Some(result) => (result, false),
            None => (BadgeSyncResult::default(), true),
        }
    };

    Ok(Json(SyncBadgesResponse {
        added: result.added,
        removed: result.removed,
        throttled,
    }))
}

// ─── Workout Entries ─────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct LogEntryRequest {
    /// Duration in minutes (at most a week)
    #[validate(range(min = 1, max = 10080))]
    duration_minutes: Option<u32>,
    #[validate(range(max = 100_000))]
    calories: Option<u32>,
    #[validate(length(max = 2000))]
    notes: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LogEntryResponse {
    pub participation: ChallengeParticipation,
    /// Badge changes triggered by this entry, omitted when none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_sync: Option<BadgeSyncResult>,
}

/// Log a workout entry under one of the caller's participations.
///
/// This is the main trigger for badge reconciliation: every logged
/// workout runs a forced pass so a newly crossed threshold shows up
/// immediately.
async fn log_workout_entry(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(participation_id): Path<u64>,
    Json(payload): Json<LogEntryRequest>,
) -> Result<Json<LogEntryResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let participation = state
        .db
        .get_participation(participation_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("participation {participation_id}")))?;

    if participation.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    let entry = WorkoutEntry {
        logged_at: format_utc_rfc3339(chrono::Utc::now()),
        duration_minutes: payload.duration_minutes,
        calories: payload.calories,
        notes: payload.notes,
    };

    let participation = state
        .db
        .append_workout_entry(participation_id, entry)
        .await?;

    tracing::info!(
        user_id = user.user_id,
        participation_id,
        entries = participation.entries.len(),
        "Workout entry logged"
    );

    let sync = state
        .engine
        .sync_user_badges(user.user_id, SyncOptions::default())
        .await;

    Ok(Json(LogEntryResponse {
        participation,
        badge_sync: (!sync.is_noop()).then_some(sync),
    }))
}

// ─── Leaderboard ─────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LeaderboardEntry {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub user_id: u64,
    pub display_name: Option<String>,
    pub stats: UserStats,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
}

/// Top clients ranked by logged sessions.
async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LeaderboardResponse>> {
    let profiles = state.db.list_profiles().await?;
    let participations = state.db.list_all_participations().await?;

    let mut by_user: HashMap<u64, Vec<ChallengeParticipation>> = HashMap::new();
    for participation in participations {
        by_user
            .entry(participation.user_id)
            .or_default()
            .push(participation);
    }

    let mut entries: Vec<LeaderboardEntry> = profiles
        .into_iter()
        .filter(|profile| profile.role == UserRole::Client)
        .filter_map(|profile| {
            let participations = by_user.remove(&profile.id).unwrap_or_default();
            let stats = UserStats::from_participations(&participations);
            (stats.total_sessions > 0).then_some(LeaderboardEntry {
                user_id: profile.id,
                display_name: profile.display_name,
                stats,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.stats
            .total_sessions
            .cmp(&a.stats.total_sessions)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    entries.truncate(LEADERBOARD_LIMIT);

    Ok(Json(LeaderboardResponse { entries }))
}
