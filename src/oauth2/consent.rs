// ABOUTME: User consent management: coverage checks, cumulative grants, and revocation
// ABOUTME: A consent stores the union of every scope the user has approved for a client
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

use super::models::{Consent, OAuth2Error};
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// One consent as shown to the granting user
#[derive(Debug, Serialize)]
pub struct ConsentView {
    /// Client the grant applies to
    pub client_id: String,
    /// Client display name, when the client still exists
    pub client_name: Option<String>,
    /// All granted scopes
    pub scopes: Vec<String>,
    /// First grant instant
    pub granted_at: DateTime<Utc>,
    /// Last grant instant
    pub updated_at: DateTime<Utc>,
}

/// Consent manager
pub struct ConsentManager {
    database: Arc<Database>,
}

impl ConsentManager {
    /// Create a new consent manager
    #[must_use]
    pub const fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Whether an existing consent already covers every requested scope.
    ///
    /// When it does, the authorization endpoint skips the consent screen.
    ///
    /// # Errors
    /// Returns `server_error` if the lookup fails.
    pub async fn covers(
        &self,
        user_id: &str,
        client_id: &str,
        requested: &[String],
    ) -> Result<bool, OAuth2Error> {
        let consent = self
            .database
            .get_consent(user_id, client_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Consent lookup failed");
                OAuth2Error::server_error("Consent lookup failed")
            })?;

        Ok(consent.is_some_and(|c| requested.iter().all(|s| c.scopes.contains(s))))
    }

    /// Record an approval, merging the new scopes into any existing grant
    ///
    /// # Errors
    /// Returns `server_error` if persistence fails.
    pub async fn grant(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: &[String],
    ) -> Result<Consent, OAuth2Error> {
        let consent = self
            .database
            .upsert_consent(user_id, client_id, scopes)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to store consent");
                OAuth2Error::server_error("Failed to store consent")
            })?;

        tracing::info!(user_id = %user_id, client_id = %client_id, "Recorded consent grant");

        Ok(consent)
    }

    /// List a user's consents with client display names
    ///
    /// # Errors
    /// Returns an error if a database query fails.
    pub async fn list(&self, user_id: &str) -> AppResult<Vec<ConsentView>> {
        let consents = self.database.list_consents_for_user(user_id).await?;

        let mut views = Vec::with_capacity(consents.len());
        for consent in consents {
            let client_name = self
                .database
                .get_client(&consent.client_id)
                .await?
                .map(|c| c.name);

            views.push(ConsentView {
                client_id: consent.client_id,
                client_name,
                scopes: consent.scopes,
                granted_at: consent.granted_at,
                updated_at: consent.updated_at,
            });
        }

        Ok(views)
    }

    /// Withdraw a consent, revoking that client's tokens and burning its
    /// pending codes for this user
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if the user has no consent for the client.
    pub async fn revoke(&self, user_id: &str, client_id: &str) -> AppResult<()> {
        let revoked = self
            .database
            .revoke_consent_cascade(user_id, client_id)
            .await?;

        if !revoked {
            return Err(AppError::not_found("No consent found for this client"));
        }

        tracing::info!(user_id = %user_id, client_id = %client_id, "Revoked consent and associated credentials");
        Ok(())
    }
}
