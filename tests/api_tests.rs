// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication, validation and CORS tests.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use review_desk::db::Store;
use review_desk::middleware::auth::SESSION_COOKIE;
use review_desk::models::Location;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

use common::{seed_fresh_user, seed_location, seed_review, OTHER_USER, TEST_LOCATION, TEST_USER};

fn authed(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _, _, _) = common::create_test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _, _, _) = common::create_test_app();

    for uri in ["/api/me", "/api/locations", "/api/reviews", "/api/usage"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let (app, _, _, _) = common::create_test_app();
    let forged = review_desk::middleware::auth::create_jwt(TEST_USER, b"some_other_signing_key")
        .unwrap();

    let response = app
        .oneshot(authed(Method::GET, "/api/me", &forged, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_with_cookie() {
    let (app, state, db, _) = common::create_test_app();
    seed_fresh_user(&db, TEST_USER).await;
    let token = common::create_test_jwt(&state, TEST_USER);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], TEST_USER);
    assert_eq!(body["google_connected"], true);
    assert_eq!(body["plan"], "free");
}

#[tokio::test]
async fn test_register_location_canonicalizes_and_dedupes() {
    let (app, state, db, _) = common::create_test_app();
    seed_fresh_user(&db, TEST_USER).await;
    let token = common::create_test_jwt(&state, TEST_USER);

    let response = app
        .clone()
        .oneshot(authed(
            Method::POST,
            "/api/locations",
            &token,
            Some(json!({ "external_id": format!(" {} ", TEST_LOCATION), "name": "Café" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["external_id"], TEST_LOCATION);
    assert_eq!(created["id"], Location::id_for(TEST_LOCATION));
    assert_eq!(created["supports_replies"], true);

    // Same user again: same record
    let again = app
        .clone()
        .oneshot(authed(
            Method::POST,
            "/api/locations",
            &token,
            Some(json!({ "external_id": TEST_LOCATION })),
        ))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(body_json(again).await["id"], created["id"]);
    assert_eq!(
        db.list_locations_for_user(TEST_USER).await.unwrap().len(),
        1
    );

    // Another user cannot take it over
    let other_token = common::create_test_jwt(&state, OTHER_USER);
    let stolen = app
        .oneshot(authed(
            Method::POST,
            "/api/locations",
            &other_token,
            Some(json!({ "external_id": TEST_LOCATION })),
        ))
        .await
        .unwrap();
    assert_eq!(stolen.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_register_location_rejects_garbage() {
    let (app, state, _, _) = common::create_test_app();
    let token = common::create_test_jwt(&state, TEST_USER);

    for external_id in ["", "accounts/x/locations/1", "not a place id"] {
        let response = app
            .clone()
            .oneshot(authed(
                Method::POST,
                "/api/locations",
                &token,
                Some(json!({ "external_id": external_id })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{:?}", external_id);
    }
}

#[tokio::test]
async fn test_malformed_body_gets_error_envelope() {
    let (app, state, db, platform) = common::create_test_app();
    seed_fresh_user(&db, TEST_USER).await;
    let location = seed_location(&db, TEST_USER, TEST_LOCATION).await;
    seed_review(&db, &location, "r1").await;
    let token = common::create_test_jwt(&state, TEST_USER);

    // Wrong field name and type
    let response = app
        .clone()
        .oneshot(authed(
            Method::POST,
            "/api/reviews/r1/reply",
            &token,
            Some(json!({ "txt": 1 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "validation_error");

    // Not JSON at all
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::PATCH)
                .uri(format!("/api/locations/{}", location.id))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{is_active"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "validation_error");

    // Missing content type
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/locations")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::from(json!({ "external_id": TEST_LOCATION }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], false);

    assert_eq!(platform.put_reply_count(), 0);
    assert!(!db.get_review("r1").await.unwrap().unwrap().replied);
}

#[tokio::test]
async fn test_inactive_location_cannot_sync() {
    let (app, state, db, platform) = common::create_test_app();
    seed_fresh_user(&db, TEST_USER).await;
    let location = seed_location(&db, TEST_USER, TEST_LOCATION).await;
    let token = common::create_test_jwt(&state, TEST_USER);

    let patched = app
        .clone()
        .oneshot(authed(
            Method::PATCH,
            &format!("/api/locations/{}", location.id),
            &token,
            Some(json!({ "is_active": false })),
        ))
        .await
        .unwrap();
    assert_eq!(patched.status(), StatusCode::OK);
    assert_eq!(body_json(patched).await["is_active"], false);

    let sync = app
        .oneshot(authed(
            Method::POST,
            &format!("/api/locations/{}/sync", location.id),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(sync.status(), StatusCode::BAD_REQUEST);
    assert_eq!(platform.list_count(), 0);
}

#[tokio::test]
async fn test_manual_sync_returns_counts() {
    let platform = common::FakePlatform::with_pages(vec![vec![
        common::v4_review("r1", "FIVE", None),
        common::v4_review("r2", "TWO", None),
    ]]);
    let (app, state, db, _) = common::create_test_app_with(platform);
    seed_fresh_user(&db, TEST_USER).await;
    let location = seed_location(&db, TEST_USER, TEST_LOCATION).await;
    let token = common::create_test_jwt(&state, TEST_USER);

    let response = app
        .clone()
        .oneshot(authed(
            Method::POST,
            &format!("/api/locations/{}/sync", location.id),
            &token,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["added"], 2);
    assert_eq!(body["updated"], 0);
    assert_eq!(body["total_fetched"], 2);
    assert_eq!(body["partial"], false);

    // Someone else's location
    let other_token = common::create_test_jwt(&state, OTHER_USER);
    let forbidden = app
        .oneshot(authed(
            Method::POST,
            &format!("/api/locations/{}/sync", location.id),
            &other_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sync_without_credential_is_auth_missing() {
    let (app, state, db, _) = common::create_test_app();
    let location = seed_location(&db, TEST_USER, TEST_LOCATION).await;
    let token = common::create_test_jwt(&state, TEST_USER);

    let response = app
        .oneshot(authed(
            Method::POST,
            &format!("/api/locations/{}/sync", location.id),
            &token,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "auth_missing");
}

#[tokio::test]
async fn test_review_listing_pagination_and_filters() {
    let (app, state, db, _) = common::create_test_app();
    seed_fresh_user(&db, TEST_USER).await;
    let location = seed_location(&db, TEST_USER, TEST_LOCATION).await;
    for i in 0..5 {
        seed_review(&db, &location, &format!("rev-{}", i)).await;
    }
    let token = common::create_test_jwt(&state, TEST_USER);

    let page = app
        .clone()
        .oneshot(authed(
            Method::GET,
            "/api/reviews?page=2&per_page=2",
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let body = body_json(page).await;
    assert_eq!(body["reviews"].as_array().unwrap().len(), 2);
    assert_eq!(body["page"], 2);

    let replied = app
        .clone()
        .oneshot(authed(Method::GET, "/api/reviews?replied=true", &token, None))
        .await
        .unwrap();
    assert_eq!(body_json(replied).await["reviews"].as_array().unwrap().len(), 0);

    for bad in ["/api/reviews?page=0", "/api/reviews?per_page=101", "/api/reviews?per_page=0"] {
        let response = app
            .clone()
            .oneshot(authed(Method::GET, bad, &token, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", bad);
    }

    // Filtering on someone else's location
    let other_token = common::create_test_jwt(&state, OTHER_USER);
    let forbidden = app
        .oneshot(authed(
            Method::GET,
            &format!("/api/reviews?location_id={}", location.id),
            &other_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_notification_preferences_round_trip() {
    let (app, state, _, _) = common::create_test_app();
    let token = common::create_test_jwt(&state, TEST_USER);

    let defaults = app
        .clone()
        .oneshot(authed(
            Method::GET,
            "/api/notifications/preferences",
            &token,
            None,
        ))
        .await
        .unwrap();
    let body = body_json(defaults).await;
    assert_eq!(body["notify_all"], true);
    assert_eq!(body["low_rating_threshold"], 2);

    let updated = app
        .clone()
        .oneshot(authed(
            Method::PUT,
            "/api/notifications/preferences",
            &token,
            Some(json!({
                "notify_all": false,
                "notify_low_rating": true,
                "low_rating_threshold": 3,
                "channels": { "in_app": true, "browser": true, "email": false }
            })),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);

    let invalid = app
        .clone()
        .oneshot(authed(
            Method::PUT,
            "/api/notifications/preferences",
            &token,
            Some(json!({
                "notify_all": false,
                "notify_low_rating": true,
                "low_rating_threshold": 6
            })),
        ))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let stored = state.db.get_preferences(TEST_USER).await.unwrap().unwrap();
    assert_eq!(stored.low_rating_threshold, 3);
    assert!(stored.channels.browser);
}

#[tokio::test]
async fn test_generate_reply_validates_before_calling_llm() {
    let (app, state, _, _) = common::create_test_app();
    let token = common::create_test_jwt(&state, TEST_USER);

    let bad_rating = app
        .clone()
        .oneshot(authed(
            Method::POST,
            "/api/ai/generate-reply",
            &token,
            Some(json!({ "reviewText": "Great", "rating": 0 })),
        ))
        .await
        .unwrap();
    assert_eq!(bad_rating.status(), StatusCode::BAD_REQUEST);

    let too_long = app
        .clone()
        .oneshot(authed(
            Method::POST,
            "/api/ai/generate-reply",
            &token,
            Some(json!({ "reviewText": "a".repeat(5001), "rating": 4 })),
        ))
        .await
        .unwrap();
    assert_eq!(too_long.status(), StatusCode::BAD_REQUEST);

    // The test LLM endpoint refuses connections
    let unreachable = app
        .oneshot(authed(
            Method::POST,
            "/api/ai/generate-reply",
            &token,
            Some(json!({ "reviewText": "Great", "rating": 5, "reviewerName": "Luc" })),
        ))
        .await
        .unwrap();
    assert_eq!(unreachable.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(unreachable).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "upstream_unavailable");
}

#[tokio::test]
async fn test_cors_preflight_allows_patch() {
    let (app, _, _, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/locations/loc_1")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
    let methods = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("PATCH"));
}
