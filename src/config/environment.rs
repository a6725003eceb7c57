// ABOUTME: Environment-based configuration with typed sub-configs and validation
// ABOUTME: Builds the process-wide read-only scope catalog injected into every component
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! Environment configuration
//!
//! All runtime settings come from environment variables (with a `.env` file
//! honored in development). The OAuth scope catalog and token lifetimes are
//! constructed once here and passed by reference into each component; nothing
//! mutates them after startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

/// The super-scope that satisfies any scope requirement
pub const ADMIN_SCOPE: &str = "admin:all";

/// Scope catalog entries for the marketplace API surface
const SCOPE_CATALOG: &[(&str, &str)] = &[
    ("read:services", "View services and listings"),
    ("write:services", "Create and update services"),
    ("delete:services", "Delete services"),
    ("read:vendors", "View vendor profiles"),
    ("write:vendors", "Update vendor profiles"),
    ("read:subscriptions", "View subscription information"),
    ("write:subscriptions", "Create and manage subscriptions"),
    ("read:messages", "View messages"),
    ("write:messages", "Send messages"),
    ("read:wallet", "View wallet balance and transactions"),
    ("write:wallet", "Perform wallet operations"),
    ("read:users", "View user profile information"),
    ("write:users", "Update user profile"),
    (ADMIN_SCOPE, "Full administrative access"),
];

/// Read-only catalog of the scopes this server can issue.
///
/// Constructed once at startup and shared by reference; components never
/// mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeCatalog {
    entries: Vec<(String, String)>,
}

impl ScopeCatalog {
    /// Build the marketplace scope catalog
    #[must_use]
    pub fn marketplace() -> Self {
        Self {
            entries: SCOPE_CATALOG
                .iter()
                .map(|(s, d)| ((*s).to_owned(), (*d).to_owned()))
                .collect(),
        }
    }

    /// Whether `scope` is a known scope
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.entries.iter().any(|(s, _)| s == scope)
    }

    /// Human-readable description for a scope, if known
    #[must_use]
    pub fn describe(&self, scope: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s == scope)
            .map(|(_, d)| d.as_str())
    }

    /// All `(scope, description)` pairs, in catalog order
    #[must_use]
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Return the subset of `scopes` that is not in the catalog
    #[must_use]
    pub fn unknown_scopes<'a>(&self, scopes: &'a [String]) -> Vec<&'a str> {
        scopes
            .iter()
            .filter(|s| !self.contains(s))
            .map(String::as_str)
            .collect()
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,
}

/// First-party session authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for session JWTs
    pub jwt_secret: String,
    /// Session token lifetime in hours
    pub session_expiry_hours: i64,
}

/// OAuth 2.0 authorization server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2ServerConfig {
    /// Issuer URL advertised in the RFC 8414 discovery document
    pub issuer_url: String,
    /// Authorization code lifetime in seconds
    pub auth_code_ttl_secs: i64,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: i64,
    /// Scope catalog for this deployment
    pub scopes: ScopeCatalog,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins, or "*" for any
    pub allowed_origins: String,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// HTTP API port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Session authentication configuration
    pub auth: AuthConfig,
    /// OAuth 2.0 server configuration
    pub oauth2_server: OAuth2ServerConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a numeric variable fails to parse or the JWT
    /// secret is missing outside of development.
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env file found or failed to load: {}", e);
        }

        let host = env_var_or("HTTP_HOST", "127.0.0.1");
        let http_port: u16 = env_var_or("HTTP_PORT", "8080")
            .parse()
            .context("Invalid HTTP_PORT value")?;

        let jwt_secret = env::var("JWT_SECRET")
            .context("JWT_SECRET must be set for session token verification")?;

        let config = Self {
            http_port,
            database: DatabaseConfig {
                url: env_var_or("DATABASE_URL", "sqlite:data/bazaar_oauth.db"),
            },
            auth: AuthConfig {
                jwt_secret,
                session_expiry_hours: env_var_or("SESSION_EXPIRY_HOURS", "24")
                    .parse()
                    .context("Invalid SESSION_EXPIRY_HOURS value")?,
            },
            oauth2_server: OAuth2ServerConfig {
                issuer_url: env_var_or(
                    "OAUTH_ISSUER_URL",
                    &format!("http://{host}:{http_port}"),
                ),
                auth_code_ttl_secs: 600,
                access_token_ttl_secs: 3600,
                refresh_token_ttl_secs: 2_592_000,
                scopes: ScopeCatalog::marketplace(),
            },
            cors: CorsConfig {
                allowed_origins: env_var_or("CORS_ALLOWED_ORIGINS", "*"),
            },
            host,
        };

        Ok(config)
    }

    /// One-line summary for startup logging
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "host={} http_port={} database={} scopes={}",
            self.host,
            self.http_port,
            self.database.url,
            self.oauth2_server.scopes.entries().len()
        )
    }
}
