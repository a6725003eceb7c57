// ABOUTME: Authorization code lifecycle: issuance and single-use redemption
// ABOUTME: Redemption burns the code first, then checks bindings, expiry, and PKCE on the burned record
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

use super::models::{AuthorizationCode, OAuth2Error, OAuthClient};
use super::secrets;
use crate::database::{CodeConsumption, Database};
use chrono::{Duration, Utc};
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;

/// Authorization code manager
pub struct CodeManager {
    database: Arc<Database>,
    ttl_secs: i64,
}

impl CodeManager {
    /// Create a new code manager with the configured code lifetime
    #[must_use]
    pub const fn new(database: Arc<Database>, ttl_secs: i64) -> Self {
        Self { database, ttl_secs }
    }

    /// Issue a single-use authorization code bound to a client, user,
    /// redirect URI, scope set, and optional PKCE challenge.
    ///
    /// # Errors
    /// Returns `server_error` if generation or storage fails.
    pub async fn issue(
        &self,
        client: &OAuthClient,
        user_id: &str,
        redirect_uri: &str,
        scopes: Vec<String>,
        code_challenge: Option<String>,
    ) -> Result<AuthorizationCode, OAuth2Error> {
        let now = Utc::now();
        let code = AuthorizationCode {
            code: secrets::generate_opaque_token().map_err(|e| {
                tracing::error!(error = %e, "Failed to generate authorization code");
                OAuth2Error::server_error("Failed to generate authorization code")
            })?,
            client_id: client.client_id.clone(),
            user_id: user_id.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            scopes,
            code_challenge,
            used: false,
            expires_at: now + Duration::seconds(self.ttl_secs),
            created_at: now,
        };

        self.database.store_auth_code(&code).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to store authorization code");
            OAuth2Error::server_error("Failed to store authorization code")
        })?;

        tracing::debug!(client_id = %code.client_id, user_id = %user_id, "Issued authorization code");

        Ok(code)
    }

    /// Redeem an authorization code for the token endpoint, inside the
    /// exchange transaction.
    ///
    /// Consumption is atomic and happens before any other check: a code that
    /// reaches this point is burned whether or not the bindings hold, so a
    /// failed redemption cannot be retried with corrected parameters. The
    /// caller commits the transaction on every validation outcome and rolls
    /// back only when storing the replacement tokens fails, so a code is
    /// never left spent without its tokens.
    ///
    /// # Errors
    /// Returns `invalid_grant` for unknown, reused, expired, or mismatched
    /// codes and for PKCE failures.
    pub async fn redeem(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthorizationCode, OAuth2Error> {
        let consumed = self
            .database
            .consume_auth_code(tx, code)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Authorization code lookup failed");
                OAuth2Error::server_error("Authorization code lookup failed")
            })?;

        let record = match consumed {
            CodeConsumption::Consumed(record) => record,
            CodeConsumption::AlreadyUsed => {
                tracing::warn!(client_id = %client_id, "Replay of consumed authorization code");
                return Err(OAuth2Error::invalid_grant("Authorization code already used"));
            }
            CodeConsumption::NotFound => {
                return Err(OAuth2Error::invalid_grant("Invalid authorization code"));
            }
        };

        if record.client_id != client_id {
            tracing::warn!(client_id = %client_id, "Authorization code presented by wrong client");
            return Err(OAuth2Error::invalid_grant(
                "Authorization code was issued to a different client",
            ));
        }

        if record.redirect_uri != redirect_uri {
            return Err(OAuth2Error::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }

        if Utc::now() > record.expires_at {
            return Err(OAuth2Error::invalid_grant("Authorization code expired"));
        }

        if let Some(ref challenge) = record.code_challenge {
            let Some(verifier) = code_verifier else {
                return Err(OAuth2Error::invalid_grant("code_verifier is required"));
            };
            if !secrets::verify_pkce_challenge(verifier, challenge) {
                tracing::warn!(client_id = %client_id, "PKCE verification failed");
                return Err(OAuth2Error::invalid_grant("PKCE verification failed"));
            }
        }

        Ok(record)
    }
}
