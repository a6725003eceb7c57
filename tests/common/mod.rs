// ABOUTME: Shared helpers for integration tests
// ABOUTME: In-memory database setup, server assembly, and client registration shortcuts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]
#![allow(missing_docs)]

use bazaar_oauth_server::config::{
    AuthConfig, CorsConfig, DatabaseConfig, OAuth2ServerConfig, ScopeCatalog, ServerConfig,
};
use bazaar_oauth_server::database::Database;
use bazaar_oauth_server::oauth2::client_registration::ClientRegistrationManager;
use bazaar_oauth_server::oauth2::endpoints::AuthorizationServer;
use bazaar_oauth_server::oauth2::models::{
    ClientRegistrationRequest, ClientRegistrationResponse, GrantType,
};
use bazaar_oauth_server::resources::ServerResources;
use std::sync::Arc;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";

/// Open a fresh in-memory database with migrations applied
pub async fn test_database() -> Arc<Database> {
    Arc::new(
        Database::new("sqlite::memory:")
            .await
            .expect("in-memory database"),
    )
}

/// Standard OAuth server configuration for tests
pub fn test_oauth2_config() -> OAuth2ServerConfig {
    OAuth2ServerConfig {
        issuer_url: "http://127.0.0.1:8080".to_owned(),
        auth_code_ttl_secs: 600,
        access_token_ttl_secs: 3600,
        refresh_token_ttl_secs: 2_592_000,
        scopes: ScopeCatalog::marketplace(),
    }
}

/// Assemble an authorization server over the given database
pub fn test_server(database: Arc<Database>) -> AuthorizationServer {
    AuthorizationServer::new(database, &test_oauth2_config())
}

/// Full server config for router-level tests
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_owned(),
        http_port: 8080,
        database: DatabaseConfig {
            url: "sqlite::memory:".to_owned(),
        },
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_owned(),
            session_expiry_hours: 24,
        },
        oauth2_server: test_oauth2_config(),
        cors: CorsConfig {
            allowed_origins: "*".to_owned(),
        },
    }
}

/// Shared resources over a fresh in-memory database
pub async fn test_resources() -> Arc<ServerResources> {
    let database = Database::new("sqlite::memory:")
        .await
        .expect("in-memory database");
    Arc::new(ServerResources::new(database, test_config()))
}

/// Register a client with the given scopes and grant types, returning the
/// one-time registration response (including the plaintext secret)
pub async fn register_test_client(
    database: &Arc<Database>,
    owner: &str,
    scopes: &[&str],
    grant_types: Vec<GrantType>,
) -> ClientRegistrationResponse {
    let manager =
        ClientRegistrationManager::new(Arc::clone(database), ScopeCatalog::marketplace());

    manager
        .register_client(
            owner,
            ClientRegistrationRequest {
                name: "Test Client".to_owned(),
                description: Some("Integration test client".to_owned()),
                redirect_uris: vec!["https://app.example.com/callback".to_owned()],
                grant_types: Some(grant_types),
                scopes: Some(scopes.iter().map(|s| (*s).to_owned()).collect()),
            },
        )
        .await
        .expect("client registration")
}

pub const CALLBACK: &str = "https://app.example.com/callback";
