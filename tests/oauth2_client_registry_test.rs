// ABOUTME: Client registry tests: registration validation, owner scoping, update, delete cascade
// ABOUTME: Verifies secrets are stored hashed and deactivation revokes issued credentials
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use bazaar_oauth_server::config::ScopeCatalog;
use bazaar_oauth_server::errors::ErrorCode;
use bazaar_oauth_server::oauth2::client_registration::ClientRegistrationManager;
use bazaar_oauth_server::oauth2::models::{
    ApprovalRequest, ClientRegistrationRequest, ClientUpdateRequest, GrantType, TokenRequest,
};
use common::{register_test_client, test_database, test_server, CALLBACK};
use std::sync::Arc;

fn manager(db: &Arc<bazaar_oauth_server::database::Database>) -> ClientRegistrationManager {
    ClientRegistrationManager::new(Arc::clone(db), ScopeCatalog::marketplace())
}

fn registration(name: &str, redirect_uris: Vec<String>) -> ClientRegistrationRequest {
    ClientRegistrationRequest {
        name: name.to_owned(),
        description: None,
        redirect_uris,
        grant_types: None,
        scopes: Some(vec!["read:services".to_owned()]),
    }
}

#[tokio::test]
async fn registration_returns_secret_once_and_stores_hash() {
    let db = test_database().await;
    let clients = manager(&db);

    let response = clients
        .register_client("owner_1", registration("My App", vec![CALLBACK.to_owned()]))
        .await
        .unwrap();

    assert!(response.client_id.starts_with("client_"));
    assert!(!response.client_secret.is_empty());
    assert_eq!(response.grant_types, vec![GrantType::AuthorizationCode]);

    // Stored record carries an Argon2 hash, never the plaintext
    let stored = db.get_client(&response.client_id).await.unwrap().unwrap();
    assert!(stored.client_secret_hash.starts_with("$argon2"));
    assert_ne!(stored.client_secret_hash, response.client_secret);

    // Credentials round-trip through validation
    let validated = clients
        .validate_client(&response.client_id, &response.client_secret)
        .await
        .unwrap();
    assert_eq!(validated.name, "My App");
}

#[tokio::test]
async fn registration_validation() {
    let db = test_database().await;
    let clients = manager(&db);

    // Empty name
    let err = clients
        .register_client("owner_1", registration("  ", vec![CALLBACK.to_owned()]))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    // No redirect URIs
    let err = clients
        .register_client("owner_1", registration("App", vec![]))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    // Plain http to a non-loopback host
    let err = clients
        .register_client(
            "owner_1",
            registration("App", vec!["http://app.example.com/cb".to_owned()]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    // Unknown scope
    let mut request = registration("App", vec![CALLBACK.to_owned()]);
    request.scopes = Some(vec!["read:mars".to_owned()]);
    let err = clients.register_client("owner_1", request).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
    assert!(err.message.contains("read:mars"));
}

#[tokio::test]
async fn listing_and_lookup_are_owner_scoped() {
    let db = test_database().await;
    let clients = manager(&db);

    let mine = clients
        .register_client("owner_1", registration("Mine", vec![CALLBACK.to_owned()]))
        .await
        .unwrap();
    clients
        .register_client("owner_2", registration("Theirs", vec![CALLBACK.to_owned()]))
        .await
        .unwrap();

    let listed = clients.list_clients("owner_1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Mine");

    // Someone else's client is indistinguishable from a missing one
    let err = clients
        .get_owned_client(&mine.client_id, "owner_2")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn update_applies_only_mutable_fields() {
    let db = test_database().await;
    let clients = manager(&db);

    let created = clients
        .register_client("owner_1", registration("App", vec![CALLBACK.to_owned()]))
        .await
        .unwrap();

    let summary = clients
        .update_client(
            &created.client_id,
            "owner_1",
            ClientUpdateRequest {
                name: Some("Renamed".to_owned()),
                description: Some("Now with a description".to_owned()),
                redirect_uris: Some(vec!["https://new.example.com/cb".to_owned()]),
                scopes: Some(vec!["read:services".to_owned(), "read:vendors".to_owned()]),
            },
        )
        .await
        .unwrap();

    assert_eq!(summary.name, "Renamed");
    assert_eq!(summary.redirect_uris, vec!["https://new.example.com/cb"]);
    assert_eq!(summary.scopes.len(), 2);

    // Credentials survive the update
    let validated = clients
        .validate_client(&created.client_id, &created.client_secret)
        .await;
    assert!(validated.is_ok());

    // Invalid replacement values are rejected before any write
    let err = clients
        .update_client(
            &created.client_id,
            "owner_1",
            ClientUpdateRequest {
                redirect_uris: Some(vec!["http://evil.example.com/cb".to_owned()]),
                ..ClientUpdateRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    // Non-owner update is a 404
    let err = clients
        .update_client(
            &created.client_id,
            "owner_2",
            ClientUpdateRequest {
                name: Some("Hijacked".to_owned()),
                ..ClientUpdateRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn delete_deactivates_and_revokes_everything() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let clients = manager(&db);

    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
    )
    .await;

    // Issue a live token through the full flow
    let redirect = server
        .approve(
            "user_1",
            &ApprovalRequest {
                client_id: client.client_id.clone(),
                redirect_uri: CALLBACK.to_owned(),
                scope: "read:services".to_owned(),
                state: None,
                code_challenge: None,
                approved: true,
            },
        )
        .await
        .unwrap();
    let code = url::Url::parse(&redirect)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let tokens = server
        .token(TokenRequest {
            grant_type: "authorization_code".to_owned(),
            code: Some(code),
            redirect_uri: Some(CALLBACK.to_owned()),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scope: None,
            refresh_token: None,
            code_verifier: None,
        })
        .await
        .unwrap();

    clients
        .delete_client(&client.client_id, "owner_1")
        .await
        .unwrap();

    // Tokens issued through the client are dead
    let access = server
        .tokens()
        .validate_access_token(&tokens.access_token)
        .await
        .unwrap();
    assert!(access.is_none());

    // The client can no longer authenticate
    let err = clients
        .validate_client(&client.client_id, &client.client_secret)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client");

    // Its consents are gone
    let consent = db.get_consent("user_1", &client.client_id).await.unwrap();
    assert!(consent.is_none());

    // Deleting again (or as another owner) is a 404
    let err = clients
        .delete_client(&client.client_id, "owner_1")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}
