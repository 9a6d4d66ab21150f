//! Identity store integration tests.

mod common;

use std::sync::Arc;

use common::{profile_row, Harness};
use evalhub_client::ClientError;
use evalhub_core::{ProfileUpdate, Role, UserId};
use evalhub_store::{
    IdentityStore, MemoryPersistence, PersistedIdentity, Route, SessionPersistence, StoreConfig,
    StoreError,
};

// ============================================================================
// Sign-in and sign-out
// ============================================================================

#[tokio::test]
async fn login_lands_on_role_dashboard() {
    let harness = Harness::new();
    let user_id = UserId::generate();
    harness
        .backend
        .seed("profiles", profile_row(user_id, Role::Faculty, "Ravi Menon", 0));
    harness
        .backend
        .add_account("ravi@example.com", "secret", user_id);

    let identity = harness.identity();
    let route = identity.login("ravi@example.com", "secret").await.unwrap();

    assert_eq!(route, Route::Dashboard(Role::Faculty));
    assert_eq!(route.path(), "/faculty/dashboard");
    assert!(identity.is_authenticated());
    assert_eq!(identity.profile().unwrap().role, Role::Faculty);
    assert!(!identity.status().is_loading("login"));
}

#[tokio::test]
async fn login_while_already_signed_in_counts_as_success() {
    let harness = Harness::new();
    let user_id = UserId::generate();
    harness
        .backend
        .seed("profiles", profile_row(user_id, Role::Student, "Asha Rao", 2));
    let user = harness
        .backend
        .add_account("asha@example.com", "secret", user_id);
    harness.backend.set_current_user(Some(user));
    harness.backend.fail_sign_in(ClientError::Api {
        code: Some("already_authenticated".into()),
        message: "A session already exists".into(),
        status: 400,
    });

    let identity = harness.identity();
    let route = identity.login("asha@example.com", "secret").await.unwrap();

    assert_eq!(route, Route::Dashboard(Role::Student));
    assert_eq!(identity.user_id(), Some(user_id));
    assert!(harness.notices.errors().is_empty());
    assert!(identity.status().error().is_none());
}

#[tokio::test]
async fn bad_credentials_surface_backend_message() {
    let harness = Harness::new();
    let identity = harness.identity();

    let err = identity.login("nobody@example.com", "wrong").await.unwrap_err();

    assert_eq!(err.to_string(), "Invalid login credentials");
    assert_eq!(
        harness.notices.errors(),
        vec!["Invalid login credentials".to_string()]
    );
    assert_eq!(
        identity.status().error().as_deref(),
        Some("Invalid login credentials")
    );
    assert!(!identity.is_authenticated());
}

#[tokio::test]
async fn logout_clears_state_even_when_backend_fails() {
    let harness = Harness::new();
    let persistence = Arc::new(MemoryPersistence::default());
    let user_id = UserId::generate();
    harness
        .backend
        .seed("profiles", profile_row(user_id, Role::Student, "Asha Rao", 1));
    harness
        .backend
        .add_account("asha@example.com", "secret", user_id);
    let identity = IdentityStore::with_persistence(&harness.ctx, persistence.clone());
    identity.login("asha@example.com", "secret").await.unwrap();
    assert!(persistence.snapshot().user.is_some());

    harness.backend.fail("sign_out", "network down");
    let outcome = identity.logout().await;

    assert!(outcome.is_err());
    assert!(!identity.is_authenticated());
    assert!(identity.profile().is_none());
    assert_eq!(persistence.snapshot(), PersistedIdentity::default());
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn hydrate_restores_without_backend_calls() {
    let harness = Harness::new();
    let user_id = UserId::generate();
    let profile = serde_json::from_value(profile_row(user_id, Role::Admin, "Meera", 0)).unwrap();
    let user = harness
        .backend
        .add_account("meera@example.com", "secret", user_id);
    let persistence = Arc::new(MemoryPersistence::with(PersistedIdentity {
        user: Some(user),
        profile: Some(profile),
    }));

    let identity = IdentityStore::with_persistence(&harness.ctx, persistence);
    identity.hydrate().await.unwrap();

    assert_eq!(identity.user_id(), Some(user_id));
    assert_eq!(identity.profile().unwrap().role, Role::Admin);
    assert_eq!(harness.backend.selects("profiles"), 0);
}

#[tokio::test]
async fn session_file_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        session_file: Some(dir.path().join("session").join("identity.json")),
        ..StoreConfig::default()
    };
    let harness = Harness::with_config(config);
    let user_id = UserId::generate();
    harness
        .backend
        .seed("profiles", profile_row(user_id, Role::Student, "Asha Rao", 3));
    harness
        .backend
        .add_account("asha@example.com", "secret", user_id);

    IdentityStore::new(&harness.ctx)
        .login("asha@example.com", "secret")
        .await
        .unwrap();

    let restarted = IdentityStore::new(&harness.ctx);
    restarted.hydrate().await.unwrap();
    assert_eq!(restarted.user_id(), Some(user_id));
    assert_eq!(restarted.profile().unwrap().gs_credit_balance, 3);
}

// ============================================================================
// Profile
// ============================================================================

#[tokio::test]
async fn update_profile_keeps_stored_row() {
    let harness = Harness::new();
    let identity = harness.signed_in(Role::Student, "Asha Rao", 0).await;

    let profile = identity
        .update_profile(&ProfileUpdate {
            full_name: Some("Asha R.".into()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap();

    assert_eq!(profile.full_name.as_deref(), Some("Asha R."));
    assert_eq!(
        identity.profile().unwrap().full_name.as_deref(),
        Some("Asha R.")
    );
    assert_eq!(
        harness.notices.successes(),
        vec!["Profile updated successfully".to_string()]
    );
}

#[tokio::test]
async fn update_profile_requires_sign_in() {
    let harness = Harness::new();
    let identity = harness.identity();

    let err = identity
        .update_profile(&ProfileUpdate {
            phone: Some("+91 98000 00000".into()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::NotAuthenticated));
    assert_eq!(harness.backend.updates("profiles"), 0);
}

// ============================================================================
// Password recovery
// ============================================================================

#[tokio::test]
async fn reset_password_exchanges_link_token() {
    let harness = Harness::new();
    let user = harness
        .backend
        .add_account("asha@example.com", "old", UserId::generate());
    harness.backend.add_recovery_token("hash123", user);
    let identity = harness.identity();

    identity
        .reset_password(
            "n3w-password",
            Some("https://app.example.com/reset-password?token_hash=hash123&type=recovery"),
        )
        .await
        .unwrap();

    assert_eq!(harness.backend.passwords_set(), vec!["n3w-password"]);
    assert_eq!(
        harness.notices.successes(),
        vec!["Password updated successfully".to_string()]
    );
}

#[tokio::test]
async fn reset_password_without_session_or_token_fails() {
    let harness = Harness::new();
    let identity = harness.identity();

    let err = identity
        .reset_password("n3w-password", Some("https://app.example.com/reset-password"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Recovery(_)));
    assert!(harness.backend.passwords_set().is_empty());
}

#[tokio::test]
async fn reset_password_with_expired_token_fails() {
    let harness = Harness::new();
    let identity = harness.identity();

    let err = identity
        .reset_password(
            "n3w-password",
            Some("https://app.example.com/reset-password?token_hash=gone&type=recovery"),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("Invalid or expired reset link"));
    assert!(harness.backend.passwords_set().is_empty());
}

#[tokio::test]
async fn persisted_pair_is_cleared_on_missing_user() {
    let harness = Harness::new();
    let persistence = Arc::new(MemoryPersistence::with(PersistedIdentity {
        user: None,
        profile: serde_json::from_value(profile_row(UserId::generate(), Role::Student, "X", 0))
            .ok(),
    }));
    let identity = IdentityStore::with_persistence(&harness.ctx, persistence.clone());

    assert!(identity.fetch_user().await.unwrap().is_none());
    assert_eq!(persistence.load().await.unwrap(), PersistedIdentity::default());
}
