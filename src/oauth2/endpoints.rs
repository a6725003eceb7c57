// ABOUTME: Protocol orchestration for the authorize, approval, token, and revocation endpoints
// ABOUTME: Decides when errors travel by redirect versus direct response, per RFC 6749 section 4.1.2.1
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! # Authorization Server Endpoints
//!
//! [`AuthorizationServer`] wires the client registry, code manager, token
//! manager, and consent manager together behind the protocol endpoints. It
//! owns the validation ordering of the authorize flow: client identity and
//! redirect URI are checked before anything else, because errors may only be
//! delivered by redirect once the redirect target itself is trustworthy.

use super::client_registration::ClientRegistrationManager;
use super::codes::CodeManager;
use super::consent::ConsentManager;
use super::models::{
    split_scopes, ApprovalRequest, AuthParams, AuthorizeOutcome, AuthorizeRequest, ConsentClient,
    ConsentScreen, GrantType, OAuth2Error, OAuthClient, RevokeRequest, ScopeDescription,
    TokenRequest, TokenResponse,
};
use super::tokens::TokenManager;
use crate::config::{OAuth2ServerConfig, ScopeCatalog};
use crate::database::Database;
use std::sync::Arc;

/// PKCE challenge method supported by this server
const PKCE_METHOD_S256: &str = "S256";

/// Where an authorize-flow error should be delivered
#[derive(Debug, Clone)]
pub struct RedirectTarget {
    /// Validated redirect URI
    pub uri: String,
    /// State to echo back
    pub state: Option<String>,
}

/// An authorize-flow failure, carrying the redirect target when the
/// client and redirect URI were validated before the failure
#[derive(Debug)]
pub struct AuthorizeError {
    /// Protocol error
    pub error: OAuth2Error,
    /// Redirect target, absent when the redirect URI itself is untrusted
    pub redirect: Option<RedirectTarget>,
}

impl AuthorizeError {
    fn direct(error: OAuth2Error) -> Self {
        Self {
            error,
            redirect: None,
        }
    }

    fn redirected(error: OAuth2Error, uri: &str, state: Option<&String>) -> Self {
        Self {
            error,
            redirect: Some(RedirectTarget {
                uri: uri.to_owned(),
                state: state.cloned(),
            }),
        }
    }
}

/// OAuth 2.0 authorization server facade
pub struct AuthorizationServer {
    database: Arc<Database>,
    clients: ClientRegistrationManager,
    codes: CodeManager,
    tokens: TokenManager,
    consents: ConsentManager,
    scopes: ScopeCatalog,
}

impl AuthorizationServer {
    /// Assemble the authorization server from shared storage and config
    #[must_use]
    pub fn new(database: Arc<Database>, config: &OAuth2ServerConfig) -> Self {
        Self {
            clients: ClientRegistrationManager::new(
                Arc::clone(&database),
                config.scopes.clone(),
            ),
            codes: CodeManager::new(Arc::clone(&database), config.auth_code_ttl_secs),
            tokens: TokenManager::new(
                Arc::clone(&database),
                config.access_token_ttl_secs,
                config.refresh_token_ttl_secs,
            ),
            consents: ConsentManager::new(Arc::clone(&database)),
            scopes: config.scopes.clone(),
            database,
        }
    }

    /// Client registry operations
    #[must_use]
    pub const fn clients(&self) -> &ClientRegistrationManager {
        &self.clients
    }

    /// Consent operations
    #[must_use]
    pub const fn consents(&self) -> &ConsentManager {
        &self.consents
    }

    /// Token operations
    #[must_use]
    pub const fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Handle a GET /oauth/authorize request for an authenticated user.
    ///
    /// When the user's existing consent covers every requested scope, a
    /// fresh code is issued and the outcome is a redirect; otherwise the
    /// outcome is the consent screen payload.
    ///
    /// # Errors
    /// Returns an [`AuthorizeError`]; the redirect target is set only after
    /// the client and redirect URI have been validated.
    pub async fn authorize(
        &self,
        user_id: &str,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizeOutcome, AuthorizeError> {
        let (client, scopes) = self.validate_authorize_request(request).await?;

        let covered = self
            .consents
            .covers(user_id, &client.client_id, &scopes)
            .await
            .map_err(|e| {
                AuthorizeError::redirected(e, &request.redirect_uri, request.state.as_ref())
            })?;

        if covered {
            let code = self
                .codes
                .issue(
                    &client,
                    user_id,
                    &request.redirect_uri,
                    scopes,
                    request.code_challenge.clone(),
                )
                .await
                .map_err(|e| {
                    AuthorizeError::redirected(e, &request.redirect_uri, request.state.as_ref())
                })?;

            let url = build_code_redirect(&request.redirect_uri, &code.code, request.state.as_ref());
            return Ok(AuthorizeOutcome::Redirect(url));
        }

        let requested_scopes = scopes
            .iter()
            .map(|s| ScopeDescription {
                scope: s.clone(),
                description: self.scopes.describe(s).unwrap_or_default().to_owned(),
            })
            .collect();

        Ok(AuthorizeOutcome::ConsentRequired(Box::new(ConsentScreen {
            client: ConsentClient {
                id: client.client_id,
                name: client.name,
                description: client.description,
            },
            requested_scopes,
            auth_params: AuthParams {
                client_id: request.client_id.clone(),
                redirect_uri: request.redirect_uri.clone(),
                response_type: request.response_type.clone(),
                scope: request.scope.clone(),
                state: request.state.clone(),
                code_challenge: request.code_challenge.clone(),
                code_challenge_method: request.code_challenge_method.clone(),
            },
        })))
    }

    /// Handle a POST /oauth/authorize approval decision.
    ///
    /// Approval records the consent (cumulatively) and issues a code; denial
    /// is delivered to the client as an `access_denied` redirect.
    ///
    /// # Errors
    /// Returns an [`AuthorizeError`] for validation failures and denials.
    pub async fn approve(
        &self,
        user_id: &str,
        request: &ApprovalRequest,
    ) -> Result<String, AuthorizeError> {
        let client = self
            .clients
            .get_active_client(&request.client_id)
            .await
            .map_err(AuthorizeError::direct)?;

        if !client.redirect_uris.contains(&request.redirect_uri) {
            return Err(AuthorizeError::direct(OAuth2Error::invalid_request(
                "redirect_uri is not registered for this client",
            )));
        }

        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(AuthorizeError::redirected(
                OAuth2Error::unauthorized_client(
                    "Client is not registered for the authorization_code grant",
                ),
                &request.redirect_uri,
                request.state.as_ref(),
            ));
        }

        if !request.approved {
            tracing::info!(user_id = %user_id, client_id = %client.client_id, "User denied authorization");
            return Err(AuthorizeError::redirected(
                OAuth2Error::access_denied(),
                &request.redirect_uri,
                request.state.as_ref(),
            ));
        }

        let scopes = self
            .validate_scope_request(&client, &request.scope)
            .map_err(|e| {
                AuthorizeError::redirected(e, &request.redirect_uri, request.state.as_ref())
            })?;

        self.consents
            .grant(user_id, &client.client_id, &scopes)
            .await
            .map_err(|e| {
                AuthorizeError::redirected(e, &request.redirect_uri, request.state.as_ref())
            })?;

        let code = self
            .codes
            .issue(
                &client,
                user_id,
                &request.redirect_uri,
                scopes,
                request.code_challenge.clone(),
            )
            .await
            .map_err(|e| {
                AuthorizeError::redirected(e, &request.redirect_uri, request.state.as_ref())
            })?;

        Ok(build_code_redirect(
            &request.redirect_uri,
            &code.code,
            request.state.as_ref(),
        ))
    }

    /// Handle a POST /oauth/token request, dispatching on `grant_type`
    ///
    /// # Errors
    /// Returns an RFC 6749 protocol error.
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, OAuth2Error> {
        let grant_type: GrantType = request.grant_type.parse()?;

        let client = self
            .clients
            .validate_client(&request.client_id, &request.client_secret)
            .await?;

        if !client.allows_grant(grant_type) {
            return Err(OAuth2Error::unauthorized_client(format!(
                "Client is not registered for the {grant_type} grant"
            )));
        }

        match grant_type {
            GrantType::AuthorizationCode => {
                let code = request
                    .code
                    .as_deref()
                    .ok_or_else(|| OAuth2Error::invalid_request("code is required"))?;
                let redirect_uri = request
                    .redirect_uri
                    .as_deref()
                    .ok_or_else(|| OAuth2Error::invalid_request("redirect_uri is required"))?;

                self.exchange_code(
                    code,
                    &client,
                    redirect_uri,
                    request.code_verifier.as_deref(),
                )
                .await
            }
            GrantType::RefreshToken => {
                let refresh_token = request
                    .refresh_token
                    .as_deref()
                    .ok_or_else(|| OAuth2Error::invalid_request("refresh_token is required"))?;

                self.tokens.refresh(refresh_token, &client).await
            }
            GrantType::ClientCredentials => {
                // Absent scope defaults to everything the client registered
                let scopes = match request.scope.as_deref() {
                    Some(scope) if !scope.trim().is_empty() => split_scopes(scope),
                    _ => client.scopes.clone(),
                };

                self.tokens.client_credentials(&client, scopes).await
            }
        }
    }

    /// Exchange an authorization code for a token pair as one transactional
    /// unit: the burn and the token insert commit together. A validation
    /// failure commits the burn alone; a failed insert rolls the burn back
    /// so the code is never spent without tokens.
    async fn exchange_code(
        &self,
        code: &str,
        client: &OAuthClient,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let server_error = |e: anyhow::Error| {
            tracing::error!(error = %e, "Code exchange failed");
            OAuth2Error::server_error("Code exchange failed")
        };

        let mut tx = self.database.begin().await.map_err(server_error)?;

        match self
            .codes
            .redeem(&mut tx, code, &client.client_id, redirect_uri, code_verifier)
            .await
        {
            Ok(record) => {
                let response = self.tokens.issue_for_code(&mut tx, &record).await?;
                tx.commit().await.map_err(|e| server_error(e.into()))?;
                Ok(response)
            }
            Err(e) => {
                // Keep the burn for replayed, mismatched, expired, and PKCE
                // failures; storage errors drop the transaction instead
                if e.error != "server_error" {
                    tx.commit().await.map_err(|e| server_error(e.into()))?;
                }
                Err(e)
            }
        }
    }

    /// Handle a POST /oauth/revoke request (RFC 7009)
    ///
    /// # Errors
    /// Returns `invalid_client` when client authentication fails; token
    /// lookup misses are not errors.
    pub async fn revoke(&self, request: RevokeRequest) -> Result<(), OAuth2Error> {
        let client = self
            .clients
            .validate_client(&request.client_id, &request.client_secret)
            .await?;

        self.tokens
            .revoke(&client, &request.token, request.token_type_hint.as_deref())
            .await
    }

    /// Validate the authorize request, returning the client and the parsed
    /// scope list. Client and redirect URI come first; every later failure
    /// carries the (now trusted) redirect target.
    async fn validate_authorize_request(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<(OAuthClient, Vec<String>), AuthorizeError> {
        let client = self
            .clients
            .get_active_client(&request.client_id)
            .await
            .map_err(AuthorizeError::direct)?;

        if !client.redirect_uris.contains(&request.redirect_uri) {
            return Err(AuthorizeError::direct(OAuth2Error::invalid_request(
                "redirect_uri is not registered for this client",
            )));
        }

        let redirected = |error: OAuth2Error| {
            AuthorizeError::redirected(error, &request.redirect_uri, request.state.as_ref())
        };

        if request.response_type != "code" {
            return Err(redirected(OAuth2Error::unsupported_response_type()));
        }

        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(redirected(OAuth2Error::unauthorized_client(
                "Client is not registered for the authorization_code grant",
            )));
        }

        let scopes = self
            .validate_scope_request(&client, &request.scope)
            .map_err(redirected)?;

        match (
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        ) {
            (None, None) => {}
            (Some(challenge), Some(PKCE_METHOD_S256)) if !challenge.is_empty() => {}
            (Some(_), Some(_)) => {
                return Err(redirected(OAuth2Error::invalid_request(
                    "Only the S256 code_challenge_method is supported",
                )));
            }
            _ => {
                return Err(redirected(OAuth2Error::invalid_request(
                    "code_challenge and code_challenge_method must be supplied together",
                )));
            }
        }

        Ok((client, scopes))
    }

    /// Parse and check a requested scope string against the catalog and the
    /// client's allowed set
    fn validate_scope_request(
        &self,
        client: &OAuthClient,
        scope: &str,
    ) -> Result<Vec<String>, OAuth2Error> {
        let scopes = split_scopes(scope);
        if scopes.is_empty() {
            return Err(OAuth2Error::invalid_request("scope is required"));
        }

        let unknown = self.scopes.unknown_scopes(&scopes);
        if !unknown.is_empty() {
            return Err(OAuth2Error::invalid_scope(format!(
                "Unknown scopes: {}",
                unknown.join(", ")
            )));
        }

        let disallowed = client.disallowed_scopes(&scopes);
        if !disallowed.is_empty() {
            return Err(OAuth2Error::invalid_scope(format!(
                "Scopes not allowed for this client: {}",
                disallowed.join(", ")
            )));
        }

        Ok(scopes)
    }
}

/// Append `code` and optional `state` to a redirect URI
fn build_code_redirect(redirect_uri: &str, code: &str, state: Option<&String>) -> String {
    append_query(redirect_uri, &[("code", Some(code)), ("state", state.map(String::as_str))])
}

/// Append an RFC 6749 error to a redirect URI
#[must_use]
pub fn build_error_redirect(target: &RedirectTarget, error: &OAuth2Error) -> String {
    append_query(
        &target.uri,
        &[
            ("error", Some(error.error.as_str())),
            ("error_description", error.error_description.as_deref()),
            ("state", target.state.as_deref()),
        ],
    )
}

fn append_query(uri: &str, params: &[(&str, Option<&str>)]) -> String {
    // The URI was validated at registration; fall back to raw appending if
    // it fails to reparse
    match url::Url::parse(uri) {
        Ok(mut url) => {
            {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in params {
                    if let Some(value) = value {
                        pairs.append_pair(key, value);
                    }
                }
            }
            url.into()
        }
        Err(_) => {
            let query: Vec<String> = params
                .iter()
                .filter_map(|(key, value)| {
                    value.map(|v| format!("{key}={}", urlencoding::encode(v)))
                })
                .collect();
            format!("{uri}?{}", query.join("&"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_redirect_carries_state() {
        let url = build_code_redirect(
            "https://app.example.com/callback",
            "abc123",
            Some(&"xyz".to_owned()),
        );
        assert_eq!(
            url,
            "https://app.example.com/callback?code=abc123&state=xyz"
        );
    }

    #[test]
    fn test_code_redirect_without_state() {
        let url = build_code_redirect("https://app.example.com/callback", "abc123", None);
        assert_eq!(url, "https://app.example.com/callback?code=abc123");
    }

    #[test]
    fn test_error_redirect() {
        let target = RedirectTarget {
            uri: "https://app.example.com/callback".to_owned(),
            state: Some("xyz".to_owned()),
        };
        let url = build_error_redirect(&target, &OAuth2Error::access_denied());
        assert!(url.starts_with("https://app.example.com/callback?error=access_denied"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn test_append_preserves_existing_query() {
        let url = build_code_redirect("https://app.example.com/cb?keep=1", "abc", None);
        assert!(url.contains("keep=1"));
        assert!(url.contains("code=abc"));
    }
}
