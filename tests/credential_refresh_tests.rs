// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential refresh-or-delete tests.
//!
//! A permanent provider rejection destroys the stored credential; a
//! transient failure preserves it so a later retry can still succeed.

mod common;
use chrono::{Duration, Utc};
use common::{seed_credential, spawn_provider, test_cipher, test_db, test_manager, TokenMode};
use sheetfin::models::CredentialRow;

const USER: &str = "user-1";

#[tokio::test]
async fn test_valid_credential_returned_without_refresh() {
    let (db, _dir) = test_db().await;
    let provider = spawn_provider(TokenMode::Success {
        refresh_token: Some("rotated".to_string()),
    })
    .await;
    let manager = test_manager(&db, &provider.base_url);

    let token_uri = format!("{}/token", provider.base_url);
    seed_credential(&db, &test_cipher(), USER, &token_uri, Utc::now() + Duration::hours(1)).await;

    let credential = manager.get_credential(USER).await.unwrap().unwrap();
    assert_eq!(credential.access_token, "seeded-access");
    assert_eq!(provider.token_calls(), 0, "Fresh credential needs no refresh");
    assert!(manager.is_authenticated(USER).await);
}

#[tokio::test]
async fn test_expired_credential_refreshes_and_persists() {
    let (db, _dir) = test_db().await;
    let provider = spawn_provider(TokenMode::Success {
        refresh_token: None,
    })
    .await;
    let manager = test_manager(&db, &provider.base_url);

    let token_uri = format!("{}/token", provider.base_url);
    seed_credential(&db, &test_cipher(), USER, &token_uri, Utc::now() - Duration::hours(1)).await;

    let credential = manager.get_credential(USER).await.unwrap().unwrap();
    assert_eq!(credential.access_token, "access-1");
    // Provider omitted a rotated refresh token; the stored one is kept.
    assert_eq!(credential.refresh_token, "seeded-refresh");
    assert_eq!(provider.token_calls(), 1);

    // The refreshed credential was persisted: the next call is a plain read.
    let again = manager.get_credential(USER).await.unwrap().unwrap();
    assert_eq!(again.access_token, "access-1");
    assert_eq!(provider.token_calls(), 1);
}

#[tokio::test]
async fn test_rejected_refresh_deletes_credential() {
    let (db, _dir) = test_db().await;
    let provider = spawn_provider(TokenMode::InvalidGrant).await;
    let manager = test_manager(&db, &provider.base_url);

    let token_uri = format!("{}/token", provider.base_url);
    seed_credential(&db, &test_cipher(), USER, &token_uri, Utc::now() - Duration::hours(1)).await;

    assert!(manager.get_credential(USER).await.unwrap().is_none());

    // Row is gone, and stays gone.
    assert!(db.get_credential(USER).await.unwrap().is_none());
    assert!(manager.get_credential(USER).await.unwrap().is_none());
    assert!(!manager.is_authenticated(USER).await);
}

#[tokio::test]
async fn test_transient_failure_preserves_credential() {
    let (db, _dir) = test_db().await;
    let provider = spawn_provider(TokenMode::Unavailable).await;
    let manager = test_manager(&db, &provider.base_url);

    let token_uri = format!("{}/token", provider.base_url);
    seed_credential(&db, &test_cipher(), USER, &token_uri, Utc::now() - Duration::hours(1)).await;

    // Refresh fails transiently: no credential now, but the row survives.
    assert!(manager.get_credential(USER).await.unwrap().is_none());
    assert!(db.get_credential(USER).await.unwrap().is_some());

    // Once the provider recovers, the same stored credential refreshes.
    provider.set_mode(TokenMode::Success {
        refresh_token: Some("rotated".to_string()),
    });
    let credential = manager.get_credential(USER).await.unwrap().unwrap();
    assert_eq!(credential.refresh_token, "rotated");
}

#[tokio::test]
async fn test_corrupted_payload_self_heals() {
    let (db, _dir) = test_db().await;
    let provider = spawn_provider(TokenMode::Success {
        refresh_token: Some("r".to_string()),
    })
    .await;
    let manager = test_manager(&db, &provider.base_url);

    db.put_credential(&CredentialRow {
        user_id: USER.to_string(),
        encrypted_payload: vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x11, 0x22, 0x33,
                                0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb],
        expiry: Utc::now().to_rfc3339(),
        updated_at: Utc::now().to_rfc3339(),
    })
    .await
    .unwrap();

    // Undecryptable rows are treated as absent and removed.
    assert!(manager.get_credential(USER).await.unwrap().is_none());
    assert!(db.get_credential(USER).await.unwrap().is_none());
}

#[tokio::test]
async fn test_revoke_combines_remote_and_local_outcomes() {
    let (db, _dir) = test_db().await;
    let provider = spawn_provider(TokenMode::Success {
        refresh_token: Some("r".to_string()),
    })
    .await;
    let manager = test_manager(&db, &provider.base_url);

    let token_uri = format!("{}/token", provider.base_url);
    seed_credential(&db, &test_cipher(), USER, &token_uri, Utc::now() + Duration::hours(1)).await;

    assert!(manager.revoke(USER, None).await.unwrap());
    assert_eq!(provider.revoke_calls(), 1);
    assert!(db.get_credential(USER).await.unwrap().is_none());

    // Nothing stored and nothing to revoke remotely: both outcomes false.
    assert!(!manager.revoke(USER, None).await.unwrap());
}
