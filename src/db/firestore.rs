// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Profiles (user accounts and the badge sync marker)
//! - Participations (challenge enrollment with embedded workout entries)
//! - Badges (catalog with optional reward rules)
//! - User-Badges (join collection of granted badges)

use std::collections::{BTreeSet, HashMap};

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    Badge, BadgeSyncResult, ChallengeParticipation, ParticipationStatus, UserBadge, UserProfile,
    UserStats, WorkoutEntry,
};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Counter document for allocating catalog ids.
#[derive(serde::Serialize, serde::Deserialize)]
struct CounterDoc {
    next_id: u64,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // Use ExternalJwtFunctionSource to provide a dummy token without needing async-trait
        // or a custom TokenSource implementation struct.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Profile Operations ──────────────────────────────────────

    /// Get a user profile by id.
    pub async fn get_profile(&self, user_id: u64) -> Result<Option<UserProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROFILES)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a user profile.
    pub async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(profile.id.to_string())
            .object(profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// List every profile (leaderboard aggregation).
    pub async fn list_profiles(&self) -> Result<Vec<UserProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PROFILES)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List a page of profiles ordered by id, starting after the given id.
    ///
    /// Used by the catalog-wide sync to walk all users in stable order.
    pub async fn list_profiles_after(
        &self,
        after_id: Option<u64>,
        limit: u32,
    ) -> Result<Vec<UserProfile>, AppError> {
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PROFILES);

        let query = if let Some(after_id) = after_id {
            query.filter(move |q| q.for_all([q.field("id").greater_than(after_id)]))
        } else {
            query
        };

        query
            .order_by([("id", firestore::FirestoreQueryDirection::Ascending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Participation Operations ────────────────────────────────

    /// Get a participation by id.
    pub async fn get_participation(
        &self,
        participation_id: u64,
    ) -> Result<Option<ChallengeParticipation>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PARTICIPATIONS)
            .obj()
            .one(&participation_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get all participations for a user.
    pub async fn get_participations_for_user(
        &self,
        user_id: u64,
    ) -> Result<Vec<ChallengeParticipation>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PARTICIPATIONS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List every participation (leaderboard aggregation).
    pub async fn list_all_participations(&self) -> Result<Vec<ChallengeParticipation>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PARTICIPATIONS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a participation document.
    pub async fn upsert_participation(
        &self,
        participation: &ChallengeParticipation,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PARTICIPATIONS)
            .document_id(participation.id.to_string())
            .object(participation)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Append a workout entry to a participation atomically.
    ///
    /// Read and write happen in one transaction so two concurrent
    /// appends cannot drop each other's entry. A participation that
    /// has not been started yet moves to IN_PROGRESS.
    pub async fn append_workout_entry(
        &self,
        participation_id: u64,
        entry: WorkoutEntry,
    ) -> Result<ChallengeParticipation, AppError> {
        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let participation: Option<ChallengeParticipation> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PARTICIPATIONS)
            .obj()
            .one(&participation_id.to_string())
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read participation in transaction: {}", e))
            })?;

        let Some(mut participation) = participation else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!(
                "participation {participation_id}"
            )));
        };

        participation.entries.push(entry);
        if participation.status == ParticipationStatus::NotStarted {
            participation.status = ParticipationStatus::InProgress;
        }

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::PARTICIPATIONS)
            .document_id(participation.id.to_string())
            .object(&participation)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add participation to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(participation)
    }

    // ─── Badge Catalog Operations ────────────────────────────────

    /// Get a badge by id.
    pub async fn get_badge(&self, badge_id: u64) -> Result<Option<Badge>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::BADGES)
            .obj()
            .one(&badge_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List the whole badge catalog, newest first.
    pub async fn list_badges(&self) -> Result<Vec<Badge>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::BADGES)
            .order_by([(
                "created_at",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a badge.
    pub async fn upsert_badge(&self, badge: &Badge) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::BADGES)
            .document_id(badge.id.to_string())
            .object(badge)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Allocate the next badge id from the counter document.
    ///
    /// The read and increment happen in one transaction, so two
    /// concurrent creates cannot receive the same id.
    pub async fn allocate_badge_id(&self) -> Result<u64, AppError> {
        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let counter: Option<CounterDoc> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::COUNTERS)
            .obj()
            .one(collections::BADGES)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read counter in transaction: {}", e))
            })?;

        let allocated = counter.map(|c| c.next_id).unwrap_or(1);

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::COUNTERS)
            .document_id(collections::BADGES)
            .object(&CounterDoc {
                next_id: allocated + 1,
            })
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add counter to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(allocated)
    }

    /// Delete a badge and every grant of it.
    ///
    /// Returns the number of documents deleted (grants plus the badge).
    pub async fn delete_badge_with_awards(&self, badge_id: u64) -> Result<usize, AppError> {
        let awards: Vec<UserBadge> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USER_BADGES)
            .filter(move |q| q.for_all([q.field("badge_id").eq(badge_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let count = awards.len();
        self.batch_delete(&awards, collections::USER_BADGES, |award: &UserBadge| {
            UserBadge::document_id(award.user_id, award.badge_id)
        })
        .await?;

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::BADGES)
            .document_id(badge_id.to_string())
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(badge_id, awards = count, "Deleted badge and its grants");

        Ok(count + 1)
    }

    // ─── User-Badge Operations ───────────────────────────────────

    /// Get all badges granted to a user.
    pub async fn get_user_badges(&self, user_id: u64) -> Result<Vec<UserBadge>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USER_BADGES)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List every grant in the system (leaderboard aggregation).
    pub async fn list_all_user_badges(&self) -> Result<Vec<UserBadge>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USER_BADGES)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write a single award directly, outside reconciliation.
    ///
    /// Grants for rule-less badges enter the system this way (seed and
    /// support tooling); the reconciler never revokes them. The doc id
    /// encodes the (user, badge) pair, so re-inserting overwrites.
    pub async fn insert_user_badge(&self, award: &UserBadge) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USER_BADGES)
            .document_id(UserBadge::document_id(award.user_id, award.badge_id))
            .object(award)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Atomic Badge Reconciliation ─────────────────────────────

    /// Atomically reconcile a user's granted badges against their stats.
    ///
    /// Reads the profile, participations, catalog, and current grants,
    /// then stages every grant, revocation, and the profile's sync
    /// marker in a single Firestore transaction so they succeed or fail
    /// together. The sync marker is written even when no badge changes,
    /// so staleness checks see the pass.
    ///
    /// Rule-less badges are never granted or revoked here. A rule whose
    /// criterion fails to parse disables only that badge: it is logged
    /// and skipped, which also means a grant it previously produced is
    /// revoked on this pass.
    pub async fn sync_user_badges_in_txn(
        &self,
        user_id: u64,
        now: &str,
    ) -> Result<BadgeSyncResult, AppError> {
        let Some(mut profile) = self.get_profile(user_id).await? else {
            return Err(AppError::NotFound(format!("user profile {user_id}")));
        };

        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // 1. Compute stats from all of the user's participations
        let participations = self.get_participations_for_user(user_id).await?;
        let stats = UserStats::from_participations(&participations);

        // 2. Evaluate every rule-bearing badge against the stats
        let catalog = self.list_badges().await?;
        let mut auto_badge_ids = BTreeSet::new();
        let mut eligible = BTreeSet::new();
        let mut reasons = HashMap::new();

        for badge in &catalog {
            let Some(rule) = &badge.rule else {
                continue;
            };
            auto_badge_ids.insert(badge.id);

            match rule.parse_criteria() {
                Ok(criteria) => {
                    if criteria.is_satisfied_by(&stats) {
                        eligible.insert(badge.id);
                        reasons.insert(badge.id, rule.name.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        badge_id = badge.id,
                        rule = %rule.name,
                        error = %e,
                        "Skipping badge with unparseable criteria"
                    );
                }
            }
        }

        // 3. Diff against current grants, restricted to rule-bearing badges
        let held: BTreeSet<u64> = self
            .get_user_badges(user_id)
            .await?
            .into_iter()
            .map(|award| award.badge_id)
            .filter(|badge_id| auto_badge_ids.contains(badge_id))
            .collect();

        let result = BadgeSyncResult::diff(&eligible, &held);

        // 4. Stage grants
        for &badge_id in &result.added {
            let reason = reasons
                .get(&badge_id)
                .cloned()
                .unwrap_or_else(|| "Auto-awarded".to_string());
            let award = UserBadge {
                user_id,
                badge_id,
                reason,
                awarded_at: now.to_string(),
            };

            self.get_client()?
                .fluent()
                .update()
                .in_col(collections::USER_BADGES)
                .document_id(UserBadge::document_id(user_id, badge_id))
                .object(&award)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add grant to transaction: {}", e))
                })?;
        }

        // 5. Stage revocations
        for &badge_id in &result.removed {
            self.get_client()?
                .fluent()
                .delete()
                .from(collections::USER_BADGES)
                .document_id(UserBadge::document_id(user_id, badge_id))
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add revocation to transaction: {}", e))
                })?;
        }

        // 6. Stage the profile sync marker, unconditionally
        profile.last_badge_sync_at = Some(now.to_string());
        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(profile.id.to_string())
            .object(&profile)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add profile to transaction: {}", e))
            })?;

        // 7. Commit everything atomically
        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            user_id,
            added = result.added.len(),
            removed = result.removed.len(),
            "Badges reconciled atomically"
        );

        Ok(result)
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}
