// ABOUTME: Resource-server middleware: bearer token extraction, validation, and scope checks
// ABOUTME: The admin:all super-scope satisfies every scope requirement
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! # OAuth Resource Middleware
//!
//! Marketplace API routes protect themselves with these helpers: extract the
//! bearer token from the `Authorization` header, validate it in a single
//! token lookup, and gate the handler on the scopes the token carries.
//! Missing or invalid credentials surface as 401, a valid token without the
//! required scope as 403.

use crate::config::ADMIN_SCOPE;
use crate::errors::{AppError, AppResult};
use crate::oauth2::endpoints::AuthorizationServer;
use axum::http::HeaderMap;
use std::sync::Arc;

/// Request context derived from a validated access token
#[derive(Debug, Clone)]
pub struct OAuthContext {
    /// Resource owner, absent for client-credentials tokens
    pub user_id: Option<String>,
    /// Client the token was issued to
    pub client_id: String,
    /// Scopes the token carries
    pub scopes: Vec<String>,
}

impl OAuthContext {
    /// Whether the token carries `scope` (or the admin super-scope)
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope || s == ADMIN_SCOPE)
    }

    /// Whether the token carries every scope in `required`
    #[must_use]
    pub fn has_all_scopes(&self, required: &[&str]) -> bool {
        required.iter().all(|s| self.has_scope(s))
    }

    /// Whether the token carries at least one scope in `required`
    #[must_use]
    pub fn has_any_scope(&self, required: &[&str]) -> bool {
        required.iter().any(|s| self.has_scope(s))
    }
}

/// OAuth bearer-token middleware for resource routes
#[derive(Clone)]
pub struct OAuthMiddleware {
    oauth2: Arc<AuthorizationServer>,
}

impl OAuthMiddleware {
    /// Create the middleware over the shared authorization server
    #[must_use]
    pub const fn new(oauth2: Arc<AuthorizationServer>) -> Self {
        Self { oauth2 }
    }

    /// Authenticate a request from its headers.
    ///
    /// # Errors
    /// Returns `AuthRequired` when no bearer token is present and
    /// `AuthInvalid` for unknown, revoked, or expired tokens.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AppResult<OAuthContext> {
        let token = extract_bearer_token(headers)
            .ok_or_else(|| AppError::auth_required("Access token required"))?;

        self.validate(token).await
    }

    /// Authenticate a request when a token is present; anonymous requests
    /// pass through as `None`. A token that is present but invalid is still
    /// rejected.
    ///
    /// # Errors
    /// Returns `AuthInvalid` for unknown, revoked, or expired tokens.
    pub async fn authenticate_optional(
        &self,
        headers: &HeaderMap,
    ) -> AppResult<Option<OAuthContext>> {
        match extract_bearer_token(headers) {
            Some(token) => Ok(Some(self.validate(token).await?)),
            None => Ok(None),
        }
    }

    async fn validate(&self, token: &str) -> AppResult<OAuthContext> {
        let record = self
            .oauth2
            .tokens()
            .validate_access_token(token)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Rejected invalid or expired access token");
                AppError::auth_invalid("Invalid or expired access token")
            })?;

        Ok(OAuthContext {
            user_id: record.user_id,
            client_id: record.client_id,
            scopes: record.scopes,
        })
    }
}

/// Require every scope in `required`
///
/// # Errors
/// Returns `PermissionDenied` naming the missing scopes.
pub fn require_scopes(context: &OAuthContext, required: &[&str]) -> AppResult<()> {
    if context.has_all_scopes(required) {
        return Ok(());
    }

    let missing: Vec<&str> = required
        .iter()
        .filter(|s| !context.has_scope(s))
        .copied()
        .collect();

    tracing::warn!(client_id = %context.client_id, missing = ?missing, "Insufficient scope");

    Err(AppError::permission_denied(format!(
        "Insufficient scope: requires {}",
        missing.join(", ")
    )))
}

/// Require at least one scope in `required`
///
/// # Errors
/// Returns `PermissionDenied` when none of the scopes is present.
pub fn require_any_scope(context: &OAuthContext, required: &[&str]) -> AppResult<()> {
    if context.has_any_scope(required) {
        return Ok(());
    }

    tracing::warn!(client_id = %context.client_id, required = ?required, "Insufficient scope");

    Err(AppError::permission_denied(format!(
        "Insufficient scope: requires one of {}",
        required.join(", ")
    )))
}

/// Require that the token was granted by `resource_user_id`. Tokens carrying
/// the admin super-scope bypass the ownership check; client-credentials
/// tokens (no user) never pass it.
///
/// # Errors
/// Returns `PermissionDenied` when the token belongs to a different user.
pub fn require_same_user(context: &OAuthContext, resource_user_id: &str) -> AppResult<()> {
    if context.scopes.iter().any(|s| s == ADMIN_SCOPE) {
        return Ok(());
    }

    if context.user_id.as_deref() == Some(resource_user_id) {
        return Ok(());
    }

    Err(AppError::permission_denied(
        "Access restricted to the resource owner",
    ))
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}
