//! User management API tests
//!
//! Self-only updates and deletes, the administrator-only update, and the
//! `user:<id>` snapshot kept in step with each write.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use session_service::cache::user_key;
use session_service::errors::SessionError;
use session_service::models::{Role, User};
use session_test_utils::*;
use tower::ServiceExt;

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

/// Alice (`user`) and Bob (`admin`), plus an access token for each.
async fn alice_and_bob(harness: &TestSessionHarness) -> (User, String, User, String) {
    let alice = harness.seed_user(test_user());
    let bob = harness.seed_user(test_user_with(TEST_USER_BOB, TEST_EMAIL_BOB, Role::Admin));
    let alice_token = harness.issuer.issue(&alice).unwrap().access_token;
    let bob_token = harness.issuer.issue(&bob).unwrap().access_token;
    harness.settle().await;
    (alice, alice_token, bob, bob_token)
}

#[tokio::test]
async fn test_list_users_filters_sorts_and_pages() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (_, alice_token, _, _) = alice_and_bob(&harness).await;
    harness.seed_user(test_user_with(
        TEST_USER_GHOST,
        "carol@example.com",
        Role::User,
    ));
    let router = harness.router();

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/users?order=email&sort=asc",
            Some(&alice_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let emails: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["email"].as_str().unwrap())
        .collect();
    assert_eq!(emails, vec![TEST_EMAIL_ALICE, TEST_EMAIL_BOB, "carol@example.com"]);

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/users?role=user&order=email&sort=desc&limit=1&offset=1",
            Some(&alice_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["email"], TEST_EMAIL_ALICE);
    assert!(body[0].get("password_hash").is_none());
}

#[tokio::test]
async fn test_list_users_rejects_bad_parameters() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (_, alice_token, _, _) = alice_and_bob(&harness).await;
    let router = harness.router();

    for uri in [
        "/api/v1/users?sort=sideways",
        "/api/v1/users?order=password",
        "/api/v1/users?limit=0",
        "/api/v1/users?role=root",
    ] {
        let (status, body) =
            send(&router, request(Method::GET, uri, Some(&alice_token), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(error_code(&body), "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn test_user_routes_require_bearer_token() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let alice = harness.seed_user(test_user());
    let router = harness.router();
    let by_id = format!("/api/v1/users/{}", alice.id);
    let private = format!("/api/v1/private/users/{}", alice.id);

    for (method, uri, body) in [
        (Method::GET, "/api/v1/users", None),
        (Method::GET, by_id.as_str(), None),
        (Method::PATCH, by_id.as_str(), Some(json!({ "name": "Eve" }))),
        (Method::DELETE, by_id.as_str(), None),
        (Method::PATCH, private.as_str(), Some(json!({ "role": "admin" }))),
    ] {
        let (status, response) = send(&router, request(method, uri, None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(error_code(&response), "INVALID_TOKEN");
    }
    assert_eq!(harness.users.get(alice.id).unwrap().name, "Test");
}

#[tokio::test]
async fn test_get_user_by_id() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (_, alice_token, bob, _) = alice_and_bob(&harness).await;
    let router = harness.router();

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/v1/users/{}", bob.id),
            Some(&alice_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], bob.id.to_string());
    assert_eq!(body["role"], "admin");

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/v1/users/{TEST_USER_GHOST}"),
            Some(&alice_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "USER_NOT_FOUND");
}

#[tokio::test]
async fn test_update_self_overwrites_snapshot() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (alice, alice_token, _, _) = alice_and_bob(&harness).await;
    let pair = harness.issuer.issue(&alice).unwrap();
    harness.settle().await;
    let router = harness.router();

    let (status, body) = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/v1/users/{}", alice.id),
            Some(&alice_token),
            Some(json!({ "name": "Alice", "email": " alice@example.com " })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Alice");
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(harness.users.get(alice.id).unwrap().email, "alice@example.com");

    let snapshot: User =
        serde_json::from_str(&harness.cache.peek(&user_key(alice.id)).unwrap()).unwrap();
    assert_eq!(snapshot.email, "alice@example.com");

    // Rotation now mints tokens from the new record without a store lookup.
    let rotated = harness.rotator.rotate(&pair.refresh_token).await.unwrap();
    harness.settle().await;
    assert_eq!(
        rotated.access_token.claims(TEST_JWT_SECRET).email,
        "alice@example.com"
    );
    assert_eq!(harness.users.lookups_by_id(), 0);
}

#[tokio::test]
async fn test_update_self_changes_password() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (alice, alice_token, _, _) = alice_and_bob(&harness).await;
    let router = harness.router();

    let (status, _) = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/v1/users/{}", alice.id),
            Some(&alice_token),
            Some(json!({ "password": "a brand new passphrase" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (old, _) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/auth/sign-in",
            None,
            Some(json!({ "email": TEST_EMAIL_ALICE, "password": TEST_PASSWORD })),
        ),
    )
    .await;
    let (new, _) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/auth/sign-in",
            None,
            Some(json!({ "email": TEST_EMAIL_ALICE, "password": "a brand new passphrase" })),
        ),
    )
    .await;
    harness.settle().await;

    assert_eq!(old, StatusCode::UNAUTHORIZED);
    assert_eq!(new, StatusCode::OK);
}

#[tokio::test]
async fn test_update_self_rejects_empty_and_blank_changes() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (alice, alice_token, _, _) = alice_and_bob(&harness).await;
    let router = harness.router();
    let uri = format!("/api/v1/users/{}", alice.id);

    for payload in [
        json!({}),
        json!({ "name": "  " }),
        json!({ "password": "" }),
        json!({ "email": "not-an-email" }),
    ] {
        let (status, body) = send(
            &router,
            request(Method::PATCH, &uri, Some(&alice_token), Some(payload.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert_eq!(error_code(&body), "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn test_update_email_taken_conflicts() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (alice, alice_token, _, _) = alice_and_bob(&harness).await;
    let router = harness.router();

    let (status, body) = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/v1/users/{}", alice.id),
            Some(&alice_token),
            Some(json!({ "email": TEST_EMAIL_BOB })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CONFLICT");
}

#[tokio::test]
async fn test_update_other_user_is_forbidden() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (alice, _, _, bob_token) = alice_and_bob(&harness).await;
    let router = harness.router();

    // Even an admin cannot use the self-service route on someone else.
    let (status, body) = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/v1/users/{}", alice.id),
            Some(&bob_token),
            Some(json!({ "name": "Mallory" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "FORBIDDEN");
    assert_eq!(harness.users.get(alice.id).unwrap().name, "Test");
}

#[tokio::test]
async fn test_delete_self_evicts_snapshot_and_ends_rotation() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (alice, alice_token, _, _) = alice_and_bob(&harness).await;
    let pair = harness.issuer.issue(&alice).unwrap();
    harness.settle().await;
    assert!(harness.cache.peek(&user_key(alice.id)).is_some());
    let router = harness.router();

    let (status, body) = send(
        &router,
        request(
            Method::DELETE,
            &format!("/api/v1/users/{}", alice.id),
            Some(&alice_token),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    assert!(harness.users.get(alice.id).is_none());
    assert_eq!(harness.cache.peek(&user_key(alice.id)), None);

    let result = harness.rotator.rotate(&pair.refresh_token).await;
    harness.settle().await;
    assert!(matches!(result, Err(SessionError::UserNotFound)));
}

#[tokio::test]
async fn test_delete_other_user_is_forbidden() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (alice, _, bob, bob_token) = alice_and_bob(&harness).await;
    let router = harness.router();

    let (status, body) = send(
        &router,
        request(
            Method::DELETE,
            &format!("/api/v1/users/{}", alice.id),
            Some(&bob_token),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "FORBIDDEN");
    assert!(harness.users.get(alice.id).is_some());
    assert!(harness.users.get(bob.id).is_some());
}

#[tokio::test]
async fn test_private_update_by_admin_changes_role() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (alice, _, _, bob_token) = alice_and_bob(&harness).await;
    let pair = harness.issuer.issue(&alice).unwrap();
    harness.settle().await;
    let router = harness.router();

    let (status, body) = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/v1/private/users/{}", alice.id),
            Some(&bob_token),
            Some(json!({ "role": "admin", "surname": "Admin" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");
    assert_eq!(body["surname"], "Admin");
    assert_eq!(harness.users.get(alice.id).unwrap().role, Role::Admin);

    let rotated = harness.rotator.rotate(&pair.refresh_token).await.unwrap();
    harness.settle().await;
    assert_eq!(rotated.access_token.claims(TEST_JWT_SECRET).role, Role::Admin);
}

#[tokio::test]
async fn test_private_update_by_plain_user_is_forbidden() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (alice, alice_token, _, _) = alice_and_bob(&harness).await;
    let router = harness.router();

    // A plain user cannot promote themselves either.
    let (status, body) = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/v1/private/users/{}", alice.id),
            Some(&alice_token),
            Some(json!({ "role": "admin" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "FORBIDDEN");
    assert_eq!(harness.users.get(alice.id).unwrap().role, Role::User);
}

#[tokio::test]
async fn test_private_update_cannot_grant_super_admin() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (alice, _, _, bob_token) = alice_and_bob(&harness).await;
    let router = harness.router();

    let (status, body) = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/v1/private/users/{}", alice.id),
            Some(&bob_token),
            Some(json!({ "role": "super-admin" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
    assert_eq!(harness.users.get(alice.id).unwrap().role, Role::User);
}

#[tokio::test]
async fn test_private_update_unknown_user_is_not_found() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let (_, _, _, bob_token) = alice_and_bob(&harness).await;
    let router = harness.router();

    let (status, body) = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/v1/private/users/{TEST_USER_GHOST}"),
            Some(&bob_token),
            Some(json!({ "name": "Ghost" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "USER_NOT_FOUND");
}
