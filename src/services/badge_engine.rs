// SPDX-License-Identifier: MIT

//! Badge reconciliation service.
//!
//! Handles the core workflow:
//! 1. Aggregate a user's participations into stats
//! 2. Evaluate every rule-bearing badge against those stats
//! 3. Diff eligible badges against currently granted ones
//! 4. Apply grants, revocations, and the sync marker in one transaction
//!
//! Reconciliation never fails the caller: any error degrades to an
//! empty diff so a profile page or workout save is not blocked by a
//! badge problem.

use chrono::{DateTime, Duration, Utc};
use futures_util::{stream, StreamExt};

use crate::db::FirestoreDb;
use crate::error::Result;
use crate::models::{BadgeSyncResult, UserStats};
use crate::time_utils;

/// Age at which a sync marker counts as stale (one hour).
const DEFAULT_MAX_AGE_MS: i64 = 3_600_000;

/// How many users the catalog-wide sync reconciles at once.
const SYNC_ALL_CONCURRENCY: usize = 4;

/// Options for a single reconciliation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Caller explicitly requested the pass (ignores staleness).
    pub force: bool,
    /// Timestamp to reconcile at. Defaults to the current time; the
    /// staleness-gated path passes its own so the decision and the
    /// written marker agree.
    pub now: Option<DateTime<Utc>>,
}

/// One page of a catalog-wide reconciliation walk.
#[derive(Debug, Clone, Default)]
pub struct SyncAllPage {
    /// Users reconciled in this page
    pub synced: usize,
    /// Total grants across the page
    pub added: usize,
    /// Total revocations across the page
    pub removed: usize,
    /// Highest user id in the page, to resume from
    pub last_user_id: Option<u64>,
    /// Whether another page may exist
    pub has_more: bool,
}

/// Reconcile granted badges against computed user stats.
#[derive(Clone)]
pub struct BadgeEngine {
    db: FirestoreDb,
}

impl BadgeEngine {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    /// Aggregate a user's participations into their current stats.
    pub async fn compute_user_stats(&self, user_id: u64) -> Result<UserStats> {
        let participations = self.db.get_participations_for_user(user_id).await?;
        Ok(UserStats::from_participations(&participations))
    }

    /// Run one full reconciliation pass for a user.
    ///
    /// Always returns a diff. On any failure the error is logged and
    /// an empty diff comes back, so callers can treat the result as
    /// "what changed" without a separate error path. Running twice in
    /// a row yields an empty second diff.
    pub async fn sync_user_badges(&self, user_id: u64, options: SyncOptions) -> BadgeSyncResult {
        let now = options.now.unwrap_or_else(Utc::now);
        let now_str = time_utils::format_utc_rfc3339(now);

        tracing::debug!(user_id, force = options.force, "Reconciling badges");

        match self.db.sync_user_badges_in_txn(user_id, &now_str).await {
            Ok(result) => {
                if !result.is_noop() {
                    tracing::info!(
                        user_id,
                        added = ?result.added,
                        removed = ?result.removed,
                        "Badge grants changed"
                    );
                }
                result
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Badge sync failed, returning empty diff");
                BadgeSyncResult::default()
            }
        }
    }

    /// Reconcile only if the user's badges are stale.
    ///
    /// Returns `None` without touching anything when the profile is
    /// missing, cannot be loaded, or was synced within `max_age`
    /// (default one hour). Otherwise runs a forced pass and returns
    /// its diff.
    pub async fn maybe_sync_user_badges(
        &self,
        user_id: u64,
        max_age: Option<Duration>,
    ) -> Option<BadgeSyncResult> {
        let max_age = max_age.unwrap_or_else(|| Duration::milliseconds(DEFAULT_MAX_AGE_MS));
        let now = Utc::now();

        let profile = match self.db.get_profile(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!(user_id, "Profile not found, skipping badge sync");
                return None;
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load profile for badge sync");
                return None;
            }
        };

        if !sync_due(profile.last_badge_sync_at.as_deref(), now, max_age) {
            tracing::debug!(user_id, "Badges recently synced, skipping");
            return None;
        }

        Some(
            self.sync_user_badges(
                user_id,
                SyncOptions {
                    force: true,
                    now: Some(now),
                },
            )
            .await,
        )
    }

    /// Reconcile one page of users, concurrently but bounded.
    ///
    /// Walks profiles in ascending id order starting after `after_id`.
    /// Per-user failures degrade to empty diffs, so one broken user
    /// does not stop the walk.
    pub async fn sync_all_users(
        &self,
        after_id: Option<u64>,
        batch_size: u32,
    ) -> Result<SyncAllPage> {
        let profiles = self.db.list_profiles_after(after_id, batch_size).await?;
        let has_more = profiles.len() == batch_size as usize;
        let last_user_id = profiles.iter().map(|p| p.id).max();

        let results: Vec<BadgeSyncResult> = stream::iter(profiles)
            .map(|profile| {
                let engine = self.clone();
                async move {
                    engine
                        .sync_user_badges(profile.id, SyncOptions::default())
                        .await
                }
            })
            .buffer_unordered(SYNC_ALL_CONCURRENCY)
            .collect()
            .await;

        let page = SyncAllPage {
            synced: results.len(),
            added: results.iter().map(|r| r.added.len()).sum(),
            removed: results.iter().map(|r| r.removed.len()).sum(),
            last_user_id,
            has_more,
        };

        tracing::info!(
            synced = page.synced,
            added = page.added,
            removed = page.removed,
            has_more = page.has_more,
            "Catalog-wide sync page complete"
        );

        Ok(page)
    }
}

/// Whether a reconciliation pass is due.
///
/// A user with no marker, or a marker that does not parse, is always
/// due. Otherwise the pass is due once the marker is `max_age` old.
fn sync_due(last_badge_sync_at: Option<&str>, now: DateTime<Utc>, max_age: Duration) -> bool {
    let Some(last) = last_badge_sync_at.and_then(time_utils::parse_utc_rfc3339) else {
        return true;
    };
    now.signed_duration_since(last) >= max_age
}
