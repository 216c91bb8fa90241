// SPDX-License-Identifier: MIT

//! End-to-end flows over the authenticated client API.
//!
//! These tests require the Firestore emulator to be running.
//! Run with: ./scripts/test-with-emulator.sh

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use fitnet_api::models::{ParticipationStatus, UserRole};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::{test_auto_badge, test_manual_badge, test_participation, test_profile};

/// Generate a unique user id for test isolation.
fn unique_user_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

/// Send an authed request and return status plus parsed JSON body.
async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));

    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE PROVISIONING
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_provision_then_me() {
    require_emulator!();

    let (app, _state) = common::create_emulator_app().await;
    let user_id = unique_user_id();
    let token = common::test_jwt(user_id);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/profile/provision",
        &token,
        Some(json!({"email": "flow@example.com", "display_name": "Flow Tester"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_u64(), Some(user_id));
    assert_eq!(body["role"], "CLIENT");
    assert_eq!(body["created"], true);

    // Re-provisioning returns the existing profile untouched
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/profile/provision",
        &token,
        Some(json!({"email": "other@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], false);

    let (status, me) = send(&app, Method::GET, "/api/me", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "flow@example.com");
    assert_eq!(me["display_name"], "Flow Tester");
    assert_eq!(me["role"], "CLIENT");
    assert!(me["last_badge_sync_at"].is_null());
    assert_eq!(me["stats"]["total_sessions"], 0);
    assert_eq!(me["stats"]["completed_challenges"], 0);
}

#[tokio::test]
async fn test_me_without_profile_is_not_found() {
    require_emulator!();

    let (app, _state) = common::create_emulator_app().await;
    let token = common::test_jwt(unique_user_id());

    let (status, _) = send(&app, Method::GET, "/api/me", &token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════════════
// WORKOUT LOGGING
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_logging_a_workout_reports_badge_changes() {
    require_emulator!();

    let (app, state) = common::create_emulator_app().await;
    let user_id = unique_user_id();
    let participation_id = user_id + 100;
    let badge_id = user_id + 10;
    let calories = 5000 + (user_id % 500) as u32;
    let token = common::test_jwt(user_id);

    state
        .db
        .upsert_profile(&test_profile(user_id, UserRole::Client))
        .await
        .unwrap();
    state
        .db
        .upsert_participation(&test_participation(
            participation_id,
            user_id,
            ParticipationStatus::NotStarted,
            &[],
        ))
        .await
        .unwrap();
    state
        .db
        .upsert_badge(&test_auto_badge(
            badge_id,
            &format!("Burn {}", user_id),
            &format!(r#"{{"field":"totalCalories","operator":"==","value":{calories}}}"#),
        ))
        .await
        .unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/participations/{}/entries", participation_id),
        &token,
        Some(json!({"duration_minutes": 45, "calories": calories, "notes": "leg day"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The entry landed and the participation started
    assert_eq!(body["participation"]["status"], "IN_PROGRESS");
    let entries = body["participation"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["notes"], "leg day");

    // The newly crossed threshold shows up in the same response
    let added: Vec<u64> = body["badge_sync"]["added"]
        .as_array()
        .expect("diff should be present")
        .iter()
        .filter_map(|v| v.as_u64())
        .collect();
    assert!(added.contains(&badge_id), "Response: {}", body);
}

#[tokio::test]
async fn test_logging_against_someone_elses_participation_is_forbidden() {
    require_emulator!();

    let (app, state) = common::create_emulator_app().await;
    let owner_id = unique_user_id();
    let intruder_id = owner_id + 1;
    let participation_id = owner_id + 100;

    state
        .db
        .upsert_profile(&test_profile(owner_id, UserRole::Client))
        .await
        .unwrap();
    state
        .db
        .upsert_participation(&test_participation(
            participation_id,
            owner_id,
            ParticipationStatus::InProgress,
            &[],
        ))
        .await
        .unwrap();

    let token = common::test_jwt(intruder_id);
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/participations/{}/entries", participation_id),
        &token,
        Some(json!({"duration_minutes": 30})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The entry was not appended
    let stored = state
        .db
        .get_participation(participation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.entries.is_empty());
}

#[tokio::test]
async fn test_logging_against_unknown_participation_is_not_found() {
    require_emulator!();

    let (app, _state) = common::create_emulator_app().await;
    let user_id = unique_user_id();
    let token = common::test_jwt(user_id);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/participations/{}/entries", user_id + 100),
        &token,
        Some(json!({"duration_minutes": 30})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════════════
// BADGE LISTING AND ON-DEMAND SYNC
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_my_badges_splits_held_and_available() {
    require_emulator!();

    let (app, state) = common::create_emulator_app().await;
    let user_id = unique_user_id();
    let earned_badge = user_id + 10;
    let manual_badge = user_id + 11;
    let calories = 5000 + (user_id % 500) as u32;
    let token = common::test_jwt(user_id);

    state
        .db
        .upsert_profile(&test_profile(user_id, UserRole::Client))
        .await
        .unwrap();
    state
        .db
        .upsert_participation(&test_participation(
            user_id + 100,
            user_id,
            ParticipationStatus::InProgress,
            &[(Some(30), Some(calories))],
        ))
        .await
        .unwrap();
    state
        .db
        .upsert_badge(&test_auto_badge(
            earned_badge,
            &format!("Earned {}", user_id),
            &format!(r#"{{"field":"totalCalories","operator":"==","value":{calories}}}"#),
        ))
        .await
        .unwrap();
    state
        .db
        .upsert_badge(&test_manual_badge(
            manual_badge,
            &format!("Hand-picked {}", user_id),
        ))
        .await
        .unwrap();

    // Force the grant, then list
    let (status, synced) = send(
        &app,
        Method::POST,
        "/api/badges/sync",
        &token,
        Some(json!({"force": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(synced["throttled"], false);

    let (status, body) = send(&app, Method::GET, "/api/badges/my", &token, None).await;
    assert_eq!(status, StatusCode::OK);

    let held = body["badges"].as_array().unwrap();
    let earned = held
        .iter()
        .find(|b| b["badge_id"].as_u64() == Some(earned_badge))
        .expect("Earned badge should be held");
    assert_eq!(earned["name"], format!("Earned {}", user_id).as_str());
    assert_eq!(earned["reason"], format!("Earned {} rule", user_id).as_str());

    let available = body["available"].as_array().unwrap();
    let pick = available
        .iter()
        .find(|b| b["id"].as_u64() == Some(manual_badge))
        .expect("Manual badge should be listed as available");
    assert_eq!(pick["automatic"], false);
    assert!(
        available
            .iter()
            .all(|b| b["id"].as_u64() != Some(earned_badge)),
        "Held badges must not appear as available"
    );

    // The forced sync just ran, so the listing itself did not re-sync
    assert!(body["sync"].is_null());
}

#[tokio::test]
async fn test_sync_endpoint_throttles_after_a_fresh_pass() {
    require_emulator!();

    let (app, state) = common::create_emulator_app().await;
    let user_id = unique_user_id();
    let token = common::test_jwt(user_id);

    state
        .db
        .upsert_profile(&test_profile(user_id, UserRole::Client))
        .await
        .unwrap();

    // Never synced: the unforced call runs a pass
    let (status, first) =
        send(&app, Method::POST, "/api/badges/sync", &token, Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["throttled"], false);

    // Immediately after, the gate holds
    let (status, second) =
        send(&app, Method::POST, "/api/badges/sync", &token, Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["throttled"], true);
    assert_eq!(second["added"].as_array().unwrap().len(), 0);

    // Force bypasses the gate
    let (status, third) = send(
        &app,
        Method::POST,
        "/api/badges/sync",
        &token,
        Some(json!({"force": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(third["throttled"], false);
}

// ═══════════════════════════════════════════════════════════════════════════
// LEADERBOARD
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_leaderboard_ranks_clients_by_sessions() {
    require_emulator!();

    let (app, state) = common::create_emulator_app().await;
    let base = unique_user_id();
    let busy_client = base;
    let casual_client = base + 1;
    let idle_client = base + 2;
    let owner = base + 3;

    state
        .db
        .upsert_profile(&test_profile(busy_client, UserRole::Client))
        .await
        .unwrap();
    state
        .db
        .upsert_profile(&test_profile(casual_client, UserRole::Client))
        .await
        .unwrap();
    state
        .db
        .upsert_profile(&test_profile(idle_client, UserRole::Client))
        .await
        .unwrap();
    state
        .db
        .upsert_profile(&test_profile(owner, UserRole::GymOwner))
        .await
        .unwrap();

    state
        .db
        .upsert_participation(&test_participation(
            base + 100,
            busy_client,
            ParticipationStatus::InProgress,
            &[(Some(20), Some(80)), (Some(25), Some(90)), (Some(30), None)],
        ))
        .await
        .unwrap();
    state
        .db
        .upsert_participation(&test_participation(
            base + 101,
            casual_client,
            ParticipationStatus::InProgress,
            &[(Some(15), Some(60))],
        ))
        .await
        .unwrap();
    // The owner also works out, but owners are not ranked
    state
        .db
        .upsert_participation(&test_participation(
            base + 102,
            owner,
            ParticipationStatus::InProgress,
            &[(Some(50), Some(400))],
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/leaderboard")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    let entries = body["entries"].as_array().unwrap();
    let ids: Vec<u64> = entries
        .iter()
        .filter_map(|e| e["user_id"].as_u64())
        .collect();

    let busy_pos = ids
        .iter()
        .position(|&id| id == busy_client)
        .expect("Busy client should be ranked");
    let casual_pos = ids
        .iter()
        .position(|&id| id == casual_client)
        .expect("Casual client should be ranked");
    assert!(
        busy_pos < casual_pos,
        "More sessions should rank higher: {:?}",
        ids
    );

    assert!(
        !ids.contains(&idle_client),
        "Clients without sessions are not ranked"
    );
    assert!(!ids.contains(&owner), "Owners are not ranked");

    let busy_entry = &entries[busy_pos];
    assert_eq!(busy_entry["stats"]["total_sessions"], 3);
    assert_eq!(busy_entry["stats"]["total_calories"], 170);
    assert_eq!(busy_entry["stats"]["total_duration"], 75);
}
