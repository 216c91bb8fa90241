// SPDX-License-Identifier: MIT

use fitnet_api::config::Config;
use fitnet_api::db::FirestoreDb;
use fitnet_api::models::{
    Badge, ChallengeParticipation, ParticipationStatus, RewardRule, UserProfile, UserRole,
    WorkoutEntry,
};
use fitnet_api::routes::create_router;
use fitnet_api::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a test app with an offline mock database.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::default();
    let db = test_db_offline();
    let state = Arc::new(AppState::new(config, db));
    (create_router(state.clone()), state)
}

/// Create a test app backed by the Firestore emulator.
#[allow(dead_code)]
pub async fn create_emulator_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::default();
    let db = test_db().await;
    let state = Arc::new(AppState::new(config, db));
    (create_router(state.clone()), state)
}

/// Signed JWT for the given user against the test config key.
#[allow(dead_code)]
pub fn test_jwt(user_id: u64) -> String {
    let config = Config::default();
    fitnet_api::middleware::auth::create_jwt(user_id, &config.jwt_signing_key)
        .expect("Failed to create test JWT")
}

/// Profile fixture with the given role and no sync marker.
#[allow(dead_code)]
pub fn test_profile(user_id: u64, role: UserRole) -> UserProfile {
    UserProfile {
        id: user_id,
        email: Some(format!("user{user_id}@example.com")),
        display_name: Some(format!("User {user_id}")),
        role,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        last_badge_sync_at: None,
    }
}

/// Participation fixture with entries given as (duration, calories) pairs.
#[allow(dead_code)]
pub fn test_participation(
    id: u64,
    user_id: u64,
    status: ParticipationStatus,
    entries: &[(Option<u32>, Option<u32>)],
) -> ChallengeParticipation {
    ChallengeParticipation {
        id,
        user_id,
        challenge_id: 1,
        status,
        joined_at: "2026-01-02T00:00:00Z".to_string(),
        entries: entries
            .iter()
            .map(|&(duration_minutes, calories)| WorkoutEntry {
                logged_at: "2026-01-03T18:00:00Z".to_string(),
                duration_minutes,
                calories,
                notes: None,
            })
            .collect(),
    }
}

/// Badge fixture with an automatic reward rule.
#[allow(dead_code)]
pub fn test_auto_badge(id: u64, name: &str, criteria: &str) -> Badge {
    Badge {
        id,
        name: name.to_string(),
        icon: None,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        rule: Some(RewardRule {
            name: format!("{name} rule"),
            criteria: criteria.to_string(),
        }),
    }
}

/// Badge fixture without a rule (granted manually).
#[allow(dead_code)]
pub fn test_manual_badge(id: u64, name: &str) -> Badge {
    Badge {
        id,
        name: name.to_string(),
        icon: None,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        rule: None,
    }
}
