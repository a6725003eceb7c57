// ABOUTME: Refresh-token rotation and client-credentials grant tests
// ABOUTME: Rotation invalidates the presented pair; reuse of a rotated token always fails
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use bazaar_oauth_server::oauth2::models::{
    ApprovalRequest, AuthorizationCode, GrantType, TokenRequest, TokenResponse,
};
use bazaar_oauth_server::oauth2::tokens::TokenManager;
use chrono::{Duration, Utc};
use common::{register_test_client, test_database, test_server, CALLBACK};
use std::sync::Arc;

fn extract_code(redirect: &str) -> String {
    let url = url::Url::parse(redirect).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .expect("code parameter")
}

async fn issue_initial_tokens(
    server: &bazaar_oauth_server::oauth2::endpoints::AuthorizationServer,
    client_id: &str,
    client_secret: &str,
) -> TokenResponse {
    let redirect = server
        .approve(
            "user_1",
            &ApprovalRequest {
                client_id: client_id.to_owned(),
                redirect_uri: CALLBACK.to_owned(),
                scope: "read:services".to_owned(),
                state: None,
                code_challenge: None,
                approved: true,
            },
        )
        .await
        .unwrap();

    server
        .token(TokenRequest {
            grant_type: "authorization_code".to_owned(),
            code: Some(extract_code(&redirect)),
            redirect_uri: Some(CALLBACK.to_owned()),
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            scope: None,
            refresh_token: None,
            code_verifier: None,
        })
        .await
        .unwrap()
}

fn refresh_request(client_id: &str, secret: &str, refresh_token: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "refresh_token".to_owned(),
        code: None,
        redirect_uri: None,
        client_id: client_id.to_owned(),
        client_secret: secret.to_owned(),
        scope: None,
        refresh_token: Some(refresh_token.to_owned()),
        code_verifier: None,
    }
}

#[tokio::test]
async fn rotation_issues_new_pair_and_revokes_old() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
    )
    .await;

    let initial = issue_initial_tokens(&server, &client.client_id, &client.client_secret).await;
    let old_refresh = initial.refresh_token.clone().unwrap();

    let rotated = server
        .token(refresh_request(
            &client.client_id,
            &client.client_secret,
            &old_refresh,
        ))
        .await
        .unwrap();

    assert_ne!(rotated.access_token, initial.access_token);
    assert_ne!(rotated.refresh_token.as_deref(), Some(old_refresh.as_str()));
    assert_eq!(rotated.scope, "read:services");

    // The old pair is dead: access token invalid, refresh token unusable
    let old_access = server
        .tokens()
        .validate_access_token(&initial.access_token)
        .await
        .unwrap();
    assert!(old_access.is_none());

    let err = server
        .token(refresh_request(
            &client.client_id,
            &client.client_secret,
            &old_refresh,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");

    // The new pair works
    let new_access = server
        .tokens()
        .validate_access_token(&rotated.access_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(new_access.user_id.as_deref(), Some("user_1"));
}

#[tokio::test]
async fn refresh_rejects_other_clients() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
    )
    .await;
    let other = register_test_client(
        &db,
        "owner_2",
        &["read:services"],
        vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
    )
    .await;

    let initial = issue_initial_tokens(&server, &client.client_id, &client.client_secret).await;
    let refresh = initial.refresh_token.unwrap();

    let err = server
        .token(refresh_request(
            &other.client_id,
            &other.client_secret,
            &refresh,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn expired_refresh_token_is_rejected() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
    )
    .await;

    // A token manager with a negative refresh lifetime mints pairs whose
    // refresh window is already over
    let short_refresh = TokenManager::new(Arc::clone(&db), 3600, -1);
    let now = Utc::now();
    let code = AuthorizationCode {
        code: "rotation-seed".to_owned(),
        client_id: client.client_id.clone(),
        user_id: "user_1".to_owned(),
        redirect_uri: CALLBACK.to_owned(),
        scopes: vec!["read:services".to_owned()],
        code_challenge: None,
        used: true,
        expires_at: now + Duration::seconds(600),
        created_at: now,
    };
    let mut tx = db.begin().await.unwrap();
    let tokens = short_refresh.issue_for_code(&mut tx, &code).await.unwrap();
    tx.commit().await.unwrap();
    let refresh = tokens.refresh_token.unwrap();

    let err = server
        .token(refresh_request(
            &client.client_id,
            &client.client_secret,
            &refresh,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    assert!(err.error_description.unwrap().contains("expired"));

    // The rejected presentation still revoked the record
    let record = db.get_token_by_refresh(&refresh).await.unwrap().unwrap();
    assert!(record.revoked);
}

#[tokio::test]
async fn missing_refresh_token_is_invalid_request() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::RefreshToken],
    )
    .await;

    let mut request = refresh_request(&client.client_id, &client.client_secret, "x");
    request.refresh_token = None;
    let err = server.token(request).await.unwrap_err();
    assert_eq!(err.error, "invalid_request");
}

#[tokio::test]
async fn client_credentials_grant() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services", "read:vendors"],
        vec![GrantType::ClientCredentials],
    )
    .await;

    let request = |scope: Option<&str>| TokenRequest {
        grant_type: "client_credentials".to_owned(),
        code: None,
        redirect_uri: None,
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
        scope: scope.map(std::borrow::ToOwned::to_owned),
        refresh_token: None,
        code_verifier: None,
    };

    let tokens = server.token(request(Some("read:services"))).await.unwrap();
    assert_eq!(tokens.scope, "read:services");
    assert!(tokens.refresh_token.is_none());

    // No user behind the token
    let record = server
        .tokens()
        .validate_access_token(&tokens.access_token)
        .await
        .unwrap()
        .unwrap();
    assert!(record.user_id.is_none());

    // Absent scope defaults to the client's full allowed set
    let tokens = server.token(request(None)).await.unwrap();
    assert_eq!(tokens.scope, "read:services read:vendors");

    // Scope escalation is refused
    let err = server.token(request(Some("write:wallet"))).await.unwrap_err();
    assert_eq!(err.error, "invalid_scope");
}

#[tokio::test]
async fn revocation_kills_pair_and_is_idempotent() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
    )
    .await;

    let initial = issue_initial_tokens(&server, &client.client_id, &client.client_secret).await;
    let refresh = initial.refresh_token.clone().unwrap();

    let revoke = |token: String, hint: Option<&str>| {
        bazaar_oauth_server::oauth2::models::RevokeRequest {
            token,
            token_type_hint: hint.map(std::borrow::ToOwned::to_owned),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
        }
    };

    // Revoking by refresh token kills the whole record
    server
        .revoke(revoke(refresh.clone(), Some("refresh_token")))
        .await
        .unwrap();

    let access = server
        .tokens()
        .validate_access_token(&initial.access_token)
        .await
        .unwrap();
    assert!(access.is_none());

    let err = server
        .token(refresh_request(
            &client.client_id,
            &client.client_secret,
            &refresh,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");

    // Second revocation and unknown tokens both succeed silently
    server
        .revoke(revoke(refresh, Some("refresh_token")))
        .await
        .unwrap();
    server.revoke(revoke("no-such-token".to_owned(), None)).await.unwrap();

    // Wrong hint still finds the token
    let second = issue_initial_tokens(&server, &client.client_id, &client.client_secret).await;
    server
        .revoke(revoke(second.access_token.clone(), Some("refresh_token")))
        .await
        .unwrap();
    let access = server
        .tokens()
        .validate_access_token(&second.access_token)
        .await
        .unwrap();
    assert!(access.is_none());
}
