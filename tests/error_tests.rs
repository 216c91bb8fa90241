// SPDX-License-Identifier: MIT

use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use fitnet_api::error::AppError;

async fn response_parts(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap();
    (status, body)
}

#[tokio::test]
async fn test_status_codes() {
    let (status, _) = response_parts(AppError::Unauthorized).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = response_parts(AppError::Forbidden).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = response_parts(AppError::NotFound("badge 7".to_string())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = response_parts(AppError::BadRequest("bad email".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = response_parts(AppError::Conflict("name taken".to_string())).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_not_found_includes_details() {
    let (_, body) = response_parts(AppError::NotFound("participation 42".to_string())).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["details"], "participation 42");
}

#[tokio::test]
async fn test_database_error_hides_details() {
    let (status, body) =
        response_parts(AppError::Database("connection refused at 10.0.0.5".to_string())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let serialized = body.to_string();
    assert!(!serialized.contains("10.0.0.5"));
}

#[tokio::test]
async fn test_internal_error_hides_details() {
    let err = AppError::Internal(anyhow::anyhow!("jwt signing key /secrets/key unreadable"));
    let (status, body) = response_parts(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let serialized = body.to_string();
    assert!(!serialized.contains("/secrets/key"));
}
