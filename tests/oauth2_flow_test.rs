// ABOUTME: End-to-end authorization-code flow tests: authorize, consent, exchange, replay
// ABOUTME: Exercises validation ordering and the single-use code invariant
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use bazaar_oauth_server::oauth2::codes::CodeManager;
use bazaar_oauth_server::oauth2::models::{
    ApprovalRequest, AuthorizeOutcome, AuthorizeRequest, GrantType, TokenRequest,
};
use common::{register_test_client, test_database, test_server, CALLBACK};
use std::sync::Arc;

fn authorize_request(client_id: &str, scope: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: "code".to_owned(),
        client_id: client_id.to_owned(),
        redirect_uri: CALLBACK.to_owned(),
        scope: scope.to_owned(),
        state: Some("state-xyz".to_owned()),
        code_challenge: None,
        code_challenge_method: None,
    }
}

fn token_request(client_id: &str, client_secret: &str, code: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".to_owned(),
        code: Some(code.to_owned()),
        redirect_uri: Some(CALLBACK.to_owned()),
        client_id: client_id.to_owned(),
        client_secret: client_secret.to_owned(),
        scope: None,
        refresh_token: None,
        code_verifier: None,
    }
}

fn extract_code(redirect: &str) -> String {
    let url = url::Url::parse(redirect).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .expect("code parameter")
}

#[tokio::test]
async fn first_authorization_requires_consent() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode],
    )
    .await;

    let outcome = server
        .authorize("user_1", &authorize_request(&client.client_id, "read:services"))
        .await
        .unwrap();

    match outcome {
        AuthorizeOutcome::ConsentRequired(screen) => {
            assert_eq!(screen.client.id, client.client_id);
            assert_eq!(screen.requested_scopes.len(), 1);
            assert_eq!(screen.requested_scopes[0].scope, "read:services");
            assert_eq!(screen.auth_params.state.as_deref(), Some("state-xyz"));
        }
        AuthorizeOutcome::Redirect(url) => panic!("expected consent screen, got redirect {url}"),
    }
}

#[tokio::test]
async fn approval_issues_code_and_consent_covers_next_request() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services", "write:services"],
        vec![GrantType::AuthorizationCode],
    )
    .await;

    let redirect = server
        .approve(
            "user_1",
            &ApprovalRequest {
                client_id: client.client_id.clone(),
                redirect_uri: CALLBACK.to_owned(),
                scope: "read:services".to_owned(),
                state: Some("s1".to_owned()),
                code_challenge: None,
                approved: true,
            },
        )
        .await
        .unwrap();

    assert!(redirect.contains("code="));
    assert!(redirect.contains("state=s1"));

    // Consent now covers the same scope: no screen on the next request
    let outcome = server
        .authorize("user_1", &authorize_request(&client.client_id, "read:services"))
        .await
        .unwrap();
    assert!(matches!(outcome, AuthorizeOutcome::Redirect(_)));

    // A wider scope set still needs a new approval
    let outcome = server
        .authorize(
            "user_1",
            &authorize_request(&client.client_id, "read:services write:services"),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, AuthorizeOutcome::ConsentRequired(_)));
}

#[tokio::test]
async fn denial_redirects_with_access_denied() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode],
    )
    .await;

    let err = server
        .approve(
            "user_1",
            &ApprovalRequest {
                client_id: client.client_id,
                redirect_uri: CALLBACK.to_owned(),
                scope: "read:services".to_owned(),
                state: Some("s2".to_owned()),
                code_challenge: None,
                approved: false,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.error.error, "access_denied");
    let target = err.redirect.expect("redirect target");
    assert_eq!(target.uri, CALLBACK);
    assert_eq!(target.state.as_deref(), Some("s2"));
}

#[tokio::test]
async fn code_exchange_and_replay_rejection() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode],
    )
    .await;

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
    let code = extract_code(&redirect);

    let tokens = server
        .token(token_request(
            &client.client_id,
            &client.client_secret,
            &code,
        ))
        .await
        .unwrap();

    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.expires_in, 3600);
    assert_eq!(tokens.scope, "read:services");
    assert!(tokens.refresh_token.is_some());

    // Second redemption of the same code fails
    let err = server
        .token(token_request(
            &client.client_id,
            &client.client_secret,
            &code,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn exchange_checks_client_redirect_and_credentials() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode],
    )
    .await;
    let other = register_test_client(
        &db,
        "owner_2",
        &["read:services"],
        vec![GrantType::AuthorizationCode],
    )
    .await;

    // Wrong secret
    let mut request = token_request(&client.client_id, "wrong-secret", "whatever");
    let err = server.token(request.clone()).await.unwrap_err();
    assert_eq!(err.error, "invalid_client");

    // Unknown code
    request.client_secret = client.client_secret.clone();
    let err = server.token(request).await.unwrap_err();
    assert_eq!(err.error, "invalid_grant");

    // Code issued to a different client
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
    let code = extract_code(&redirect);

    let err = server
        .token(token_request(&other.client_id, &other.client_secret, &code))
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");

    // Redirect mismatch on a fresh code
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
    let code = extract_code(&redirect);

    let mut request = token_request(&client.client_id, &client.client_secret, &code);
    request.redirect_uri = Some("https://evil.example.com/cb".to_owned());
    let err = server.token(request).await.unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn authorize_validation_ordering() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode],
    )
    .await;

    // Unknown client: error is direct, never a redirect
    let err = server
        .authorize("user_1", &authorize_request("client_nope", "read:services"))
        .await
        .unwrap_err();
    assert_eq!(err.error.error, "invalid_request");
    assert!(err.redirect.is_none());

    // Unregistered redirect URI: also direct
    let mut request = authorize_request(&client.client_id, "read:services");
    request.redirect_uri = "https://evil.example.com/cb".to_owned();
    let err = server.authorize("user_1", &request).await.unwrap_err();
    assert!(err.redirect.is_none());

    // Bad response_type after redirect validation: delivered by redirect
    let mut request = authorize_request(&client.client_id, "read:services");
    request.response_type = "token".to_owned();
    let err = server.authorize("user_1", &request).await.unwrap_err();
    assert_eq!(err.error.error, "unsupported_response_type");
    assert!(err.redirect.is_some());

    // Scope outside the client's allowed set
    let err = server
        .authorize("user_1", &authorize_request(&client.client_id, "read:wallet"))
        .await
        .unwrap_err();
    assert_eq!(err.error.error, "invalid_scope");

    // Scope not in the catalog at all
    let err = server
        .authorize("user_1", &authorize_request(&client.client_id, "read:mars"))
        .await
        .unwrap_err();
    assert_eq!(err.error.error, "invalid_scope");
}

#[tokio::test]
async fn authorize_refuses_clients_without_the_code_grant() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let machine = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::ClientCredentials],
    )
    .await;

    // A machine-only client cannot enter the authorize flow
    let err = server
        .authorize(
            "user_1",
            &authorize_request(&machine.client_id, "read:services"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error.error, "unauthorized_client");
    assert!(err.redirect.is_some());

    // An approval decision is refused the same way, before any consent or
    // code is persisted
    let err = server
        .approve(
            "user_1",
            &ApprovalRequest {
                client_id: machine.client_id.clone(),
                redirect_uri: CALLBACK.to_owned(),
                scope: "read:services".to_owned(),
                state: None,
                code_challenge: None,
                approved: true,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error.error, "unauthorized_client");

    let consent = db.get_consent("user_1", &machine.client_id).await.unwrap();
    assert!(consent.is_none());
}

#[tokio::test]
async fn expired_code_is_rejected_and_stays_burned() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode],
    )
    .await;

    // A code manager with a negative lifetime mints already-expired codes
    let expired_codes = CodeManager::new(Arc::clone(&db), -10);
    let active = server
        .clients()
        .get_active_client(&client.client_id)
        .await
        .unwrap();
    let code = expired_codes
        .issue(&active, "user_1", CALLBACK, vec!["read:services".to_owned()], None)
        .await
        .unwrap();

    let err = server
        .token(token_request(
            &client.client_id,
            &client.client_secret,
            &code.code,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    assert!(err.error_description.unwrap().contains("expired"));

    // The failed attempt consumed the code
    let stored = db.get_auth_code(&code.code).await.unwrap().unwrap();
    assert!(stored.used);
}

#[tokio::test]
async fn abandoned_exchange_rolls_the_burn_back() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode],
    )
    .await;

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
    let code = extract_code(&redirect);

    // Redeem inside a transaction that never commits, as happens when
    // storing the replacement tokens fails mid-exchange
    let codes = CodeManager::new(Arc::clone(&db), 600);
    let mut tx = db.begin().await.unwrap();
    let record = codes
        .redeem(&mut tx, &code, &client.client_id, CALLBACK, None)
        .await
        .unwrap();
    assert_eq!(record.user_id, "user_1");
    drop(tx);

    // The rollback left the code unspent, so a real exchange still works
    let tokens = server
        .token(token_request(
            &client.client_id,
            &client.client_secret,
            &code,
        ))
        .await
        .unwrap();
    assert_eq!(tokens.scope, "read:services");
}

#[tokio::test]
async fn unsupported_grant_type_is_rejected() {
    let db = test_database().await;
    let server = test_server(Arc::clone(&db));
    let client = register_test_client(
        &db,
        "owner_1",
        &["read:services"],
        vec![GrantType::AuthorizationCode],
    )
    .await;

    let mut request = token_request(&client.client_id, &client.client_secret, "x");
    request.grant_type = "password".to_owned();
    let err = server.token(request).await.unwrap_err();
    assert_eq!(err.error, "unsupported_grant_type");

    // Registered for authorization_code only: client_credentials is refused
    let mut request = token_request(&client.client_id, &client.client_secret, "x");
    request.grant_type = "client_credentials".to_owned();
    request.code = None;
    let err = server.token(request).await.unwrap_err();
    assert_eq!(err.error, "unauthorized_client");
}
