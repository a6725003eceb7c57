// ABOUTME: Token issuance, rotation, validation, and RFC 7009 revocation
// ABOUTME: Refresh rotation revokes atomically before reissuing; revocation is idempotent
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

use super::models::{
    join_scopes, AuthorizationCode, OAuth2Error, OAuthClient, TokenRecord, TokenResponse,
};
use super::secrets;
use crate::database::Database;
use crate::errors::AppResult;
use chrono::{Duration, Utc};
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;

/// Token type in RFC 6749 responses
const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Access and refresh token manager
pub struct TokenManager {
    database: Arc<Database>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenManager {
    /// Create a new token manager with the configured lifetimes
    #[must_use]
    pub const fn new(database: Arc<Database>, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            database,
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Issue an access/refresh token pair for a redeemed authorization code,
    /// inside the exchange transaction. A storage failure here rolls the
    /// whole exchange back, leaving the code unspent.
    ///
    /// # Errors
    /// Returns `server_error` if generation or storage fails.
    pub async fn issue_for_code(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        code: &AuthorizationCode,
    ) -> Result<TokenResponse, OAuth2Error> {
        let record = self
            .build_record(
                &code.client_id,
                Some(code.user_id.clone()),
                code.scopes.clone(),
                true,
            )
            .map_err(|e| {
                tracing::error!(error = %e, "Token generation failed");
                OAuth2Error::server_error("Token generation failed")
            })?;

        self.database
            .store_token_in(tx, &record)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to store token record");
                OAuth2Error::server_error("Failed to store token record")
            })?;

        tracing::info!(client_id = %code.client_id, user_id = %code.user_id, "Issued tokens for authorization code");

        Ok(Self::response(&record, self.access_ttl_secs))
    }

    /// Rotate a refresh token.
    ///
    /// The presented token is revoked in one atomic statement before any
    /// other check; of any number of concurrent presentations, exactly one
    /// receives a new pair. Client binding and refresh expiry are checked
    /// afterwards, and the revocation is committed even when those checks
    /// fail. The replacement insert runs in the same transaction, so a
    /// storage failure rolls the revocation back and the old pair stays
    /// usable.
    ///
    /// # Errors
    /// Returns `invalid_grant` for unknown, reused, expired, or
    /// wrong-client refresh tokens.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &OAuthClient,
    ) -> Result<TokenResponse, OAuth2Error> {
        let server_error = |e: anyhow::Error| {
            tracing::error!(error = %e, "Refresh token rotation failed");
            OAuth2Error::server_error("Refresh token rotation failed")
        };

        let mut tx = self.database.begin().await.map_err(server_error)?;

        let rotation = self.rotate_in(&mut tx, refresh_token, client).await;

        match rotation {
            Ok(response) => {
                tx.commit().await.map_err(|e| server_error(e.into()))?;

                tracing::info!(client_id = %client.client_id, "Rotated refresh token");

                Ok(response)
            }
            Err(e) => {
                // Keep the revocation for reused, mismatched, or expired
                // tokens; storage errors drop the transaction instead
                if e.error != "server_error" {
                    tx.commit().await.map_err(|e| server_error(e.into()))?;
                }
                Err(e)
            }
        }
    }

    async fn rotate_in(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        refresh_token: &str,
        client: &OAuthClient,
    ) -> Result<TokenResponse, OAuth2Error> {
        let old = self
            .database
            .consume_refresh_token(tx, refresh_token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Refresh token lookup failed");
                OAuth2Error::server_error("Refresh token lookup failed")
            })?
            .ok_or_else(|| {
                tracing::warn!(client_id = %client.client_id, "Refresh with unknown or already rotated token");
                OAuth2Error::invalid_grant("Invalid refresh token")
            })?;

        if old.client_id != client.client_id {
            tracing::warn!(client_id = %client.client_id, "Refresh token presented by wrong client");
            return Err(OAuth2Error::invalid_grant(
                "Refresh token was issued to a different client",
            ));
        }

        if old
            .refresh_token_expires_at
            .is_none_or(|exp| Utc::now() > exp)
        {
            return Err(OAuth2Error::invalid_grant("Refresh token expired"));
        }

        let record = self
            .build_record(&old.client_id, old.user_id.clone(), old.scopes, true)
            .map_err(|e| {
                tracing::error!(error = %e, "Token generation failed");
                OAuth2Error::server_error("Token generation failed")
            })?;

        self.database
            .store_token_in(tx, &record)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to store token record");
                OAuth2Error::server_error("Failed to store token record")
            })?;

        Ok(Self::response(&record, self.access_ttl_secs))
    }

    /// Issue an access token for the client-credentials grant. No user, no
    /// refresh token.
    ///
    /// # Errors
    /// Returns `invalid_scope` if a requested scope exceeds the client's
    /// allowed set, or `server_error` on generation or storage failure.
    pub async fn client_credentials(
        &self,
        client: &OAuthClient,
        requested_scopes: Vec<String>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let disallowed = client.disallowed_scopes(&requested_scopes);
        if !disallowed.is_empty() {
            return Err(OAuth2Error::invalid_scope(format!(
                "Scopes not allowed for this client: {}",
                disallowed.join(", ")
            )));
        }

        let record = self
            .build_record(&client.client_id, None, requested_scopes, false)
            .map_err(|e| {
                tracing::error!(error = %e, "Token generation failed");
                OAuth2Error::server_error("Token generation failed")
            })?;

        self.store(&record).await?;

        tracing::info!(client_id = %client.client_id, "Issued client-credentials token");

        Ok(Self::response(&record, self.access_ttl_secs))
    }

    /// Validate an access token for the resource-server middleware.
    ///
    /// Returns `None` for unknown, revoked, or expired tokens; one lookup,
    /// all checks against the returned record.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn validate_access_token(&self, token: &str) -> AppResult<Option<TokenRecord>> {
        let record = self.database.get_token_by_access(token).await?;

        Ok(record.filter(|r| !r.revoked && Utc::now() <= r.access_token_expires_at))
    }

    /// RFC 7009 revocation. The record is flagged revoked whichever of its
    /// token values was presented; unknown and already-revoked tokens
    /// succeed silently, as do tokens belonging to another client.
    ///
    /// # Errors
    /// Returns `server_error` if a database operation fails.
    pub async fn revoke(
        &self,
        client: &OAuthClient,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> Result<(), OAuth2Error> {
        let server_error = |e: anyhow::Error| {
            tracing::error!(error = %e, "Token revocation failed");
            OAuth2Error::server_error("Token revocation failed")
        };

        // The hint orders the lookup; a miss falls through to the other kind
        let record = if token_type_hint == Some("refresh_token") {
            match self
                .database
                .get_token_by_refresh(token)
                .await
                .map_err(server_error)?
            {
                Some(r) => Some(r),
                None => self
                    .database
                    .get_token_by_access(token)
                    .await
                    .map_err(server_error)?,
            }
        } else {
            match self
                .database
                .get_token_by_access(token)
                .await
                .map_err(server_error)?
            {
                Some(r) => Some(r),
                None => self
                    .database
                    .get_token_by_refresh(token)
                    .await
                    .map_err(server_error)?,
            }
        };

        let Some(record) = record else {
            tracing::debug!(client_id = %client.client_id, "Revocation of unknown token");
            return Ok(());
        };

        // RFC 7009: do not reveal other clients' tokens through errors
        if record.client_id != client.client_id {
            tracing::warn!(client_id = %client.client_id, "Revocation attempt on another client's token");
            return Ok(());
        }

        let revoked = self
            .database
            .revoke_token_by_access(&record.access_token)
            .await
            .map_err(server_error)?;

        if revoked {
            tracing::info!(client_id = %client.client_id, "Revoked token");
        }

        Ok(())
    }

    fn build_record(
        &self,
        client_id: &str,
        user_id: Option<String>,
        scopes: Vec<String>,
        with_refresh: bool,
    ) -> anyhow::Result<TokenRecord> {
        let now = Utc::now();
        let refresh_token = if with_refresh {
            Some(secrets::generate_opaque_token()?)
        } else {
            None
        };

        Ok(TokenRecord {
            access_token: secrets::generate_opaque_token()?,
            refresh_token,
            client_id: client_id.to_owned(),
            user_id,
            scopes,
            access_token_expires_at: now + Duration::seconds(self.access_ttl_secs),
            refresh_token_expires_at: with_refresh
                .then(|| now + Duration::seconds(self.refresh_ttl_secs)),
            revoked: false,
            created_at: now,
        })
    }

    async fn store(&self, record: &TokenRecord) -> Result<(), OAuth2Error> {
        self.database.store_token(record).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to store token record");
            OAuth2Error::server_error("Failed to store token record")
        })
    }

    fn response(record: &TokenRecord, expires_in: i64) -> TokenResponse {
        TokenResponse {
            access_token: record.access_token.clone(),
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            expires_in,
            refresh_token: record.refresh_token.clone(),
            scope: join_scopes(&record.scopes),
        }
    }
}
