// ABOUTME: OAuth client registry: registration, owner-scoped CRUD, and credential checks
// ABOUTME: Plaintext secrets exist only in the registration response; storage holds Argon2id hashes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

use super::models::{
    ClientRegistrationRequest, ClientRegistrationResponse, ClientSummary, ClientUpdateRequest,
    GrantType, OAuth2Error, OAuthClient,
};
use super::secrets;
use crate::config::ScopeCatalog;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use chrono::Utc;
use std::sync::Arc;

/// OAuth 2.0 client registration manager
pub struct ClientRegistrationManager {
    database: Arc<Database>,
    scopes: ScopeCatalog,
}

impl ClientRegistrationManager {
    /// Create a new client registration manager
    #[must_use]
    pub const fn new(database: Arc<Database>, scopes: ScopeCatalog) -> Self {
        Self { database, scopes }
    }

    /// Register a new OAuth client owned by `owner_user_id`.
    ///
    /// The response is the only place the plaintext secret ever appears.
    ///
    /// # Errors
    /// Returns an error if validation fails or the client cannot be stored.
    pub async fn register_client(
        &self,
        owner_user_id: &str,
        request: ClientRegistrationRequest,
    ) -> AppResult<ClientRegistrationResponse> {
        self.validate_registration_request(&request)?;

        let client_id = secrets::generate_client_id()?;
        let client_secret = secrets::generate_opaque_token()?;
        let client_secret_hash = secrets::hash_client_secret(&client_secret)?;

        // Only authorization_code by default; machine grants are opt-in
        let grant_types = request
            .grant_types
            .unwrap_or_else(|| vec![GrantType::AuthorizationCode]);
        let allowed_scopes = request.scopes.unwrap_or_default();

        let now = Utc::now();
        let client = OAuthClient {
            client_id: client_id.clone(),
            client_secret_hash,
            name: request.name,
            description: request.description.unwrap_or_default(),
            owner_user_id: owner_user_id.to_owned(),
            redirect_uris: request.redirect_uris,
            grant_types,
            scopes: allowed_scopes,
            active: true,
            created_at: now,
            updated_at: now,
        };

        self.database.store_client(&client).await.map_err(|e| {
            tracing::error!(error = %e, client_id = %client_id, "Failed to store client registration");
            AppError::database("Failed to store client registration")
        })?;

        tracing::info!(client_id = %client_id, owner = %owner_user_id, "Registered OAuth client");

        Ok(ClientRegistrationResponse {
            client_id: client.client_id,
            client_secret,
            name: client.name,
            description: client.description,
            redirect_uris: client.redirect_uris,
            grant_types: client.grant_types,
            scopes: client.scopes,
            created_at: client.created_at,
        })
    }

    /// Get a client the caller owns
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if the client does not exist or belongs to
    /// someone else; ownership is not revealed either way.
    pub async fn get_owned_client(
        &self,
        client_id: &str,
        owner_user_id: &str,
    ) -> AppResult<OAuthClient> {
        let client = self
            .database
            .get_client(client_id)
            .await?
            .filter(|c| c.owner_user_id == owner_user_id)
            .ok_or_else(|| AppError::not_found("OAuth client not found"))?;

        Ok(client)
    }

    /// List the caller's clients, newest first
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_clients(&self, owner_user_id: &str) -> AppResult<Vec<ClientSummary>> {
        let clients = self.database.list_clients_by_owner(owner_user_id).await?;
        Ok(clients.into_iter().map(ClientSummary::from).collect())
    }

    /// Apply an owner update to a client. Only name, description, redirect
    /// URIs, and allowed scopes are mutable.
    ///
    /// # Errors
    /// Returns an error if validation fails, the client is not owned by the
    /// caller, or persistence fails.
    pub async fn update_client(
        &self,
        client_id: &str,
        owner_user_id: &str,
        update: ClientUpdateRequest,
    ) -> AppResult<ClientSummary> {
        if let Some(ref uris) = update.redirect_uris {
            Self::validate_redirect_uris(uris)?;
        }
        if let Some(ref scopes) = update.scopes {
            self.validate_scopes(scopes)?;
        }

        let mut client = self.get_owned_client(client_id, owner_user_id).await?;

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(AppError::invalid_input("Client name must not be empty"));
            }
            client.name = name;
        }
        if let Some(description) = update.description {
            client.description = description;
        }
        if let Some(redirect_uris) = update.redirect_uris {
            client.redirect_uris = redirect_uris;
        }
        if let Some(scopes) = update.scopes {
            client.scopes = scopes;
        }
        client.updated_at = Utc::now();

        let updated = self.database.update_client(&client).await?;
        if !updated {
            return Err(AppError::not_found("OAuth client not found"));
        }

        Ok(ClientSummary::from(client))
    }

    /// Deactivate a client and revoke everything issued through it
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if the client does not exist, is already
    /// inactive, or belongs to someone else.
    pub async fn delete_client(&self, client_id: &str, owner_user_id: &str) -> AppResult<()> {
        let deleted = self
            .database
            .delete_client_cascade(client_id, owner_user_id)
            .await?;

        if !deleted {
            return Err(AppError::not_found("OAuth client not found"));
        }

        tracing::info!(client_id = %client_id, "Deactivated OAuth client and revoked its credentials");
        Ok(())
    }

    /// Look up an active client for the authorization endpoint
    ///
    /// # Errors
    /// Returns `invalid_request` for unknown or inactive clients.
    pub async fn get_active_client(&self, client_id: &str) -> Result<OAuthClient, OAuth2Error> {
        let client = self
            .database
            .get_client(client_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Client lookup failed");
                OAuth2Error::server_error("Client lookup failed")
            })?
            .filter(|c| c.active)
            .ok_or_else(|| OAuth2Error::invalid_request("Unknown client"))?;

        Ok(client)
    }

    /// Validate client credentials for the token endpoint.
    ///
    /// The secret check goes through Argon2 verification, which compares
    /// digests in constant time. Unknown client, inactive client, and wrong
    /// secret are indistinguishable to the caller.
    ///
    /// # Errors
    /// Returns `invalid_client` when authentication fails.
    pub async fn validate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<OAuthClient, OAuth2Error> {
        let client = self
            .database
            .get_client(client_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Client lookup failed");
                OAuth2Error::server_error("Client lookup failed")
            })?
            .filter(|c| c.active)
            .ok_or_else(|| {
                tracing::warn!(client_id = %client_id, "Token request from unknown or inactive client");
                OAuth2Error::invalid_client()
            })?;

        if !secrets::verify_client_secret(client_secret, &client.client_secret_hash) {
            tracing::warn!(client_id = %client_id, "Client secret validation failed");
            return Err(OAuth2Error::invalid_client());
        }

        Ok(client)
    }

    fn validate_registration_request(&self, request: &ClientRegistrationRequest) -> AppResult<()> {
        if request.name.trim().is_empty() {
            return Err(AppError::invalid_input("Client name is required"));
        }

        Self::validate_redirect_uris(&request.redirect_uris)?;

        if let Some(ref scopes) = request.scopes {
            self.validate_scopes(scopes)?;
        }

        Ok(())
    }

    fn validate_redirect_uris(uris: &[String]) -> AppResult<()> {
        if uris.is_empty() {
            return Err(AppError::invalid_input(
                "At least one redirect_uri is required",
            ));
        }

        for uri in uris {
            if !Self::is_valid_redirect_uri(uri) {
                return Err(AppError::invalid_input(format!(
                    "Invalid redirect_uri: {uri}"
                )));
            }
        }

        Ok(())
    }

    fn validate_scopes(&self, scopes: &[String]) -> AppResult<()> {
        let unknown = self.scopes.unknown_scopes(scopes);
        if !unknown.is_empty() {
            return Err(AppError::invalid_input(format!(
                "Unknown scopes: {}",
                unknown.join(", ")
            )));
        }
        Ok(())
    }

    /// Redirect URIs must be absolute, carry no fragment or wildcard, and
    /// use https except for loopback hosts (RFC 6749 section 3.1.2.2).
    fn is_valid_redirect_uri(uri: &str) -> bool {
        if uri.trim().is_empty() || uri.contains('#') || uri.contains('*') {
            return false;
        }

        let Ok(parsed) = url::Url::parse(uri) else {
            tracing::warn!(uri = %uri, "Rejected malformed redirect_uri");
            return false;
        };

        let is_loopback = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1"));

        match parsed.scheme() {
            "https" => true,
            "http" => is_loopback,
            _ => false,
        }
    }
}
