// ABOUTME: Shared server resources constructed once at startup and handed to every route
// ABOUTME: One Arc<ServerResources> is the axum state for the whole router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! Shared server resources

use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::database::Database;
use crate::middleware::OAuthMiddleware;
use crate::oauth2::endpoints::AuthorizationServer;
use std::sync::Arc;

/// Container for all shared server state
pub struct ServerResources {
    /// Database connection pool
    pub database: Arc<Database>,
    /// Session JWT manager for first-party users
    pub auth_manager: AuthManager,
    /// OAuth 2.0 authorization server
    pub oauth2: Arc<AuthorizationServer>,
    /// Bearer-token middleware for resource routes
    pub oauth_middleware: OAuthMiddleware,
    /// Server configuration
    pub config: Arc<ServerConfig>,
}

impl ServerResources {
    /// Assemble shared resources from the database and configuration
    #[must_use]
    pub fn new(database: Database, config: ServerConfig) -> Self {
        let database = Arc::new(database);
        let auth_manager = AuthManager::new(
            &config.auth.jwt_secret,
            config.auth.session_expiry_hours,
        );
        let oauth2 = Arc::new(AuthorizationServer::new(
            Arc::clone(&database),
            &config.oauth2_server,
        ));
        let oauth_middleware = OAuthMiddleware::new(Arc::clone(&oauth2));

        Self {
            database,
            auth_manager,
            oauth2,
            oauth_middleware,
            config: Arc::new(config),
        }
    }
}
