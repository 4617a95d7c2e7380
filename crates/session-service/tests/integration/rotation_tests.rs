//! Refresh rotation tests
//!
//! Cover the full issue/rotate/reuse lifecycle, the cache-aside user lookup,
//! and the concurrency behavior of both rotation modes.

use session_service::cache::{refresh_key, user_key, REFRESH_KEY_PREFIX};
use session_service::errors::SessionError;
use session_service::models::{Role, User};
use session_test_utils::*;
use std::time::Duration;

/// Issue a session for `user` and wait for its cache entries to land.
async fn issued_session(harness: &TestSessionHarness, user: &User) -> String {
    let pair = harness.issuer.issue(user).expect("issue succeeds");
    harness.settle().await;
    pair.refresh_token
}

#[tokio::test]
async fn test_rotate_then_reuse_old_token_fails() -> Result<(), anyhow::Error> {
    // Arrange
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let alice = harness.seed_user(test_user());
    let rt1 = issued_session(&harness, &alice).await;

    // Act
    let rotated = harness.rotator.rotate(&rt1).await?;
    harness.settle().await;

    // Assert
    assert_ne!(rotated.refresh_token, rt1);
    let claims = rotated.access_token.claims(TEST_JWT_SECRET);
    assert_eq!(claims.sub, alice.id.to_string());
    assert_eq!(claims.email, "a@b.com");
    assert_eq!(claims.role, Role::User);

    let reuse = harness.rotator.rotate(&rt1).await;
    assert!(matches!(reuse, Err(SessionError::RefreshTokenNotFound)));

    Ok(())
}

#[tokio::test]
async fn test_successor_token_rotates_again() -> Result<(), anyhow::Error> {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let alice = harness.seed_user(test_user());
    let rt1 = issued_session(&harness, &alice).await;

    let rt2 = harness.rotator.rotate(&rt1).await?.refresh_token;
    harness.settle().await;
    let rt3 = harness.rotator.rotate(&rt2).await?.refresh_token;
    harness.settle().await;

    assert_ne!(rt3, rt2);
    assert_eq!(
        harness.cache.keys_with_prefix(REFRESH_KEY_PREFIX),
        vec![refresh_key(&rt3)]
    );

    Ok(())
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let alice = harness.seed_user(test_user());
    issued_session(&harness, &alice).await;

    let result = harness.rotator.rotate("never-issued").await;

    assert!(matches!(result, Err(SessionError::RefreshTokenNotFound)));
    assert_eq!(harness.users.lookups_by_id(), 0);
}

#[tokio::test]
async fn test_empty_token_is_not_found_without_cache_access() {
    let harness = TestSessionHarness::new(RotationMode::Detached);

    let result = harness.rotator.rotate("").await;

    assert!(matches!(result, Err(SessionError::RefreshTokenNotFound)));
    assert_eq!(harness.cache.calls(CacheOp::Get), 0);
    assert_eq!(harness.cache.calls(CacheOp::Take), 0);
}

#[tokio::test]
async fn test_cached_snapshot_is_used_without_store_lookup() -> Result<(), anyhow::Error> {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let alice = harness.seed_user(test_user());
    let rt1 = issued_session(&harness, &alice).await;

    // The store changes out of band; the snapshot still wins until it expires.
    harness.users.upsert(test_user_with(
        alice.id,
        "alice@new.example.com",
        Role::Admin,
    ));

    let rotated = harness.rotator.rotate(&rt1).await?;
    harness.settle().await;

    rotated
        .access_token
        .assert_access_token_for(&alice, TEST_JWT_SECRET);
    assert_eq!(harness.users.lookups_by_id(), 0);

    Ok(())
}

#[tokio::test]
async fn test_snapshot_miss_falls_back_to_store() -> Result<(), anyhow::Error> {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let alice = harness.seed_user(test_user());
    let rt1 = issued_session(&harness, &alice).await;

    let updated = harness.seed_user(test_user_with(
        alice.id,
        "alice@new.example.com",
        Role::Admin,
    ));
    harness.cache.remove(&user_key(alice.id));

    let rotated = harness.rotator.rotate(&rt1).await?;
    harness.settle().await;

    rotated
        .access_token
        .assert_access_token_for(&updated, TEST_JWT_SECRET);
    assert_eq!(harness.users.lookups_by_id(), 1);

    // Issuance repopulated the snapshot from the store's copy.
    let snapshot: User = serde_json::from_str(
        &harness
            .cache
            .peek(&user_key(alice.id))
            .expect("snapshot repopulated"),
    )?;
    assert_eq!(snapshot, updated);

    Ok(())
}

#[tokio::test]
async fn test_owner_missing_everywhere_is_user_not_found() {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let ghost = test_user_with(TEST_USER_GHOST, "ghost@example.com", Role::User);
    let rt1 = issued_session(&harness, &ghost).await;
    harness.cache.remove(&user_key(ghost.id));

    let result = harness.rotator.rotate(&rt1).await;

    assert!(matches!(result, Err(SessionError::UserNotFound)));
    // Nothing was issued and the token was not retired.
    assert_eq!(
        harness.cache.keys_with_prefix(REFRESH_KEY_PREFIX),
        vec![refresh_key(&rt1)]
    );
}

#[tokio::test]
async fn test_rotating_one_session_leaves_others_alone() -> Result<(), anyhow::Error> {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let alice = harness.seed_user(test_user());
    let bob = harness.seed_user(test_user_with(TEST_USER_BOB, TEST_EMAIL_BOB, Role::User));
    let alice_rt = issued_session(&harness, &alice).await;
    let bob_rt = issued_session(&harness, &bob).await;

    harness.rotator.rotate(&alice_rt).await?;
    harness.settle().await;

    assert_eq!(
        harness.cache.peek(&refresh_key(&bob_rt)),
        Some(bob.id.to_string())
    );
    let bob_rotated = harness.rotator.rotate(&bob_rt).await?;
    bob_rotated
        .access_token
        .assert_access_token_for(&bob, TEST_JWT_SECRET);

    Ok(())
}

#[tokio::test]
async fn test_detached_double_rotation_keeps_cache_consistent() -> Result<(), anyhow::Error> {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let alice = harness.seed_user(test_user());
    let rt1 = issued_session(&harness, &alice).await;

    // Both rotations run before the detached delete of rt1 lands, so either
    // may succeed. No outcome may corrupt the cache.
    let (first, second) = tokio::join!(harness.rotator.rotate(&rt1), harness.rotator.rotate(&rt1));
    harness.settle().await;

    let successors: Vec<String> = [first, second]
        .into_iter()
        .filter_map(|result| match result {
            Ok(pair) => Some(pair.refresh_token),
            Err(SessionError::RefreshTokenNotFound) => None,
            Err(e) => panic!("unexpected rotation error: {e}"),
        })
        .collect();
    assert!(!successors.is_empty());

    assert_eq!(harness.cache.peek(&refresh_key(&rt1)), None);
    for successor in &successors {
        assert_ne!(successor, &rt1);
        assert_eq!(
            harness.cache.peek(&refresh_key(successor)),
            Some(alice.id.to_string())
        );
    }
    assert_eq!(
        harness.cache.keys_with_prefix(REFRESH_KEY_PREFIX).len(),
        successors.len()
    );

    Ok(())
}

#[tokio::test]
async fn test_detached_mode_schedules_delete_of_presented_token() -> Result<(), anyhow::Error> {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let alice = harness.seed_user(test_user());
    let rt1 = issued_session(&harness, &alice).await;

    harness.rotator.rotate(&rt1).await?;

    // Still live until the detached delete runs.
    assert!(harness.cache.peek(&refresh_key(&rt1)).is_some());
    harness.settle().await;
    assert_eq!(harness.cache.peek(&refresh_key(&rt1)), None);
    assert_eq!(harness.cache.calls(CacheOp::Delete), 1);
    assert_eq!(harness.cache.calls(CacheOp::Take), 0);

    Ok(())
}

#[tokio::test]
async fn test_atomic_mode_retires_token_before_returning() -> Result<(), anyhow::Error> {
    let harness = TestSessionHarness::new(RotationMode::Atomic);
    let alice = harness.seed_user(test_user());
    let rt1 = issued_session(&harness, &alice).await;

    harness.rotator.rotate(&rt1).await?;

    assert_eq!(harness.cache.peek(&refresh_key(&rt1)), None);
    assert_eq!(harness.cache.calls(CacheOp::Take), 1);
    assert_eq!(harness.cache.calls(CacheOp::Delete), 0);

    let reuse = harness.rotator.rotate(&rt1).await;
    assert!(matches!(reuse, Err(SessionError::RefreshTokenNotFound)));
    harness.settle().await;

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_atomic_mode_concurrent_rotations_have_one_winner() -> Result<(), anyhow::Error> {
    let harness = TestSessionHarness::new(RotationMode::Atomic);
    let alice = harness.seed_user(test_user());
    let rt1 = issued_session(&harness, &alice).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let rotator = harness.rotator.clone();
            let token = rt1.clone();
            tokio::spawn(async move { rotator.rotate(&token).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => successes += 1,
            Err(SessionError::RefreshTokenNotFound) => {}
            Err(e) => panic!("unexpected rotation error: {e}"),
        }
    }
    harness.settle().await;

    assert_eq!(successes, 1);
    assert_eq!(harness.cache.keys_with_prefix(REFRESH_KEY_PREFIX).len(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_refresh_token_expires_after_ttl() -> Result<(), anyhow::Error> {
    let harness = TestSessionHarness::new(RotationMode::Detached);
    let alice = harness.seed_user(test_user());
    let rt1 = issued_session(&harness, &alice).await;

    tokio::time::advance(Duration::from_secs(TEST_REFRESH_TTL_SECONDS - 1)).await;
    assert!(harness.cache.peek(&refresh_key(&rt1)).is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    let result = harness.rotator.rotate(&rt1).await;

    assert!(matches!(result, Err(SessionError::RefreshTokenNotFound)));

    Ok(())
}
