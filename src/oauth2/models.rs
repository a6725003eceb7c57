// ABOUTME: OAuth 2.0 data models for clients, codes, tokens, consents, and wire types
// ABOUTME: Implements RFC 6749/7009 request and response structures plus protocol errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported OAuth 2.0 grant types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization-code grant (with optional PKCE)
    AuthorizationCode,
    /// Refresh-token grant (rotation on every use)
    RefreshToken,
    /// Client-credentials grant (machine-to-machine)
    ClientCredentials,
}

impl GrantType {
    /// Wire name of this grant type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = OAuth2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "refresh_token" => Ok(Self::RefreshToken),
            "client_credentials" => Ok(Self::ClientCredentials),
            _ => Err(OAuth2Error::unsupported_grant_type()),
        }
    }
}

/// A registered OAuth 2.0 client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Opaque, globally unique client identifier
    pub client_id: String,
    /// Argon2id PHC hash of the client secret; the plaintext is returned
    /// exactly once at registration
    pub client_secret_hash: String,
    /// Display name
    pub name: String,
    /// Optional description shown on the consent screen
    pub description: String,
    /// User that owns (and may mutate) this client
    pub owner_user_id: String,
    /// Exact-match absolute redirect URIs
    pub redirect_uris: Vec<String>,
    /// Grant types this client may use
    pub grant_types: Vec<GrantType>,
    /// Scopes this client may request
    pub scopes: Vec<String>,
    /// Soft-deactivation flag; inactive clients fail all credential checks
    pub active: bool,
    /// When this client was registered
    pub created_at: DateTime<Utc>,
    /// When this client was last updated
    pub updated_at: DateTime<Utc>,
}

impl OAuthClient {
    /// Whether this client is allowed to use `grant_type`
    #[must_use]
    pub fn allows_grant(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Return requested scopes that exceed this client's allowed set
    #[must_use]
    pub fn disallowed_scopes<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|s| !self.scopes.contains(s))
            .map(String::as_str)
            .collect()
    }
}

/// A single-use authorization code
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// High-entropy opaque code value
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// User that granted the authorization
    pub user_id: String,
    /// Redirect URI the code is bound to
    pub redirect_uri: String,
    /// Scopes granted with this code
    pub scopes: Vec<String>,
    /// PKCE S256 challenge, if the authorization request carried one
    pub code_challenge: Option<String>,
    /// Single-use flag; flips false -> true exactly once
    pub used: bool,
    /// Expiry instant (created + 600s)
    pub expires_at: DateTime<Utc>,
    /// Creation instant
    pub created_at: DateTime<Utc>,
}

/// A persisted access/refresh token pair.
///
/// `refresh_token` is absent for the client-credentials grant; `user_id` is
/// absent for the same reason. Records are never hard-deleted, only flagged
/// `revoked`.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    /// Opaque access token (primary key)
    pub access_token: String,
    /// Opaque refresh token, when the grant produces one
    pub refresh_token: Option<String>,
    /// Issuing client
    pub client_id: String,
    /// Resource owner, absent for client-credentials tokens
    pub user_id: Option<String>,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Access token expiry (created + 3600s)
    pub access_token_expires_at: DateTime<Utc>,
    /// Refresh token expiry (created + 30 days), when present
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    /// Revocation flag
    pub revoked: bool,
    /// Creation instant
    pub created_at: DateTime<Utc>,
}

/// A user's cumulative scope grant for one client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consent {
    /// Granting user
    pub user_id: String,
    /// Client the grant applies to
    pub client_id: String,
    /// All scopes ever granted (cumulative until revoked)
    pub scopes: Vec<String>,
    /// First grant instant
    pub granted_at: DateTime<Utc>,
    /// Last grant instant
    pub updated_at: DateTime<Utc>,
}

/// Client registration request
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Display name (required)
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Redirect URIs (at least one absolute URI)
    pub redirect_uris: Vec<String>,
    /// Grant types; defaults to `authorization_code` only
    pub grant_types: Option<Vec<GrantType>>,
    /// Scopes the client may request; defaults to none
    pub scopes: Option<Vec<String>>,
}

/// Client registration response; the only place the plaintext secret appears
#[derive(Debug, Serialize)]
pub struct ClientRegistrationResponse {
    /// Generated client identifier
    pub client_id: String,
    /// Plaintext client secret, shown exactly once
    pub client_secret: String,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
    /// Registered redirect URIs
    pub redirect_uris: Vec<String>,
    /// Allowed grant types
    pub grant_types: Vec<GrantType>,
    /// Allowed scopes
    pub scopes: Vec<String>,
    /// Registration instant
    pub created_at: DateTime<Utc>,
}

/// Owner-facing client view (never carries the secret or its hash)
#[derive(Debug, Serialize)]
pub struct ClientSummary {
    /// Client identifier
    pub client_id: String,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
    /// Registered redirect URIs
    pub redirect_uris: Vec<String>,
    /// Allowed grant types
    pub grant_types: Vec<GrantType>,
    /// Allowed scopes
    pub scopes: Vec<String>,
    /// Whether the client is active
    pub active: bool,
    /// Registration instant
    pub created_at: DateTime<Utc>,
    /// Last update instant
    pub updated_at: DateTime<Utc>,
}

impl From<OAuthClient> for ClientSummary {
    fn from(client: OAuthClient) -> Self {
        Self {
            client_id: client.client_id,
            name: client.name,
            description: client.description,
            redirect_uris: client.redirect_uris,
            grant_types: client.grant_types,
            scopes: client.scopes,
            active: client.active,
            created_at: client.created_at,
            updated_at: client.updated_at,
        }
    }
}

/// Typed patch for client updates; only these fields are owner-mutable
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientUpdateRequest {
    /// New display name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Replacement redirect URI set
    pub redirect_uris: Option<Vec<String>>,
    /// Replacement allowed-scope set
    pub scopes: Option<Vec<String>>,
}

/// OAuth 2.0 authorization request (query parameters of GET /oauth/authorize)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// Response type; only `code` is supported
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for the response
    pub redirect_uri: String,
    /// Requested scopes, space-separated
    pub scope: String,
    /// State parameter for CSRF protection, echoed back
    pub state: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method; only `S256` is supported
    pub code_challenge_method: Option<String>,
}

/// User decision on a pending authorization (POST /oauth/authorize)
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalRequest {
    /// Client identifier
    pub client_id: String,
    /// Redirect URI from the original request
    pub redirect_uri: String,
    /// Scopes the user saw, space-separated
    pub scope: String,
    /// State parameter, echoed back
    pub state: Option<String>,
    /// PKCE code challenge from the original request
    pub code_challenge: Option<String>,
    /// Whether the user approved
    #[serde(default)]
    pub approved: bool,
}

/// One scope with its catalog description, for consent rendering
#[derive(Debug, Serialize)]
pub struct ScopeDescription {
    /// Scope name
    pub scope: String,
    /// Human-readable description
    pub description: String,
}

/// Client details shown on the consent screen
#[derive(Debug, Serialize)]
pub struct ConsentClient {
    /// Client identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
}

/// Structured consent-screen payload returned when consent is pending
#[derive(Debug, Serialize)]
pub struct ConsentScreen {
    /// Client requesting access
    pub client: ConsentClient,
    /// Scopes being requested, with descriptions
    pub requested_scopes: Vec<ScopeDescription>,
    /// Original request parameters, echoed for the approval form
    pub auth_params: AuthParams,
}

/// Authorization parameters echoed back to the consent form
#[derive(Debug, Serialize)]
pub struct AuthParams {
    /// Client identifier
    pub client_id: String,
    /// Redirect URI
    pub redirect_uri: String,
    /// Response type
    pub response_type: String,
    /// Requested scopes
    pub scope: String,
    /// State, if provided
    pub state: Option<String>,
    /// PKCE challenge, if provided
    pub code_challenge: Option<String>,
    /// PKCE method, if provided
    pub code_challenge_method: Option<String>,
}

/// Outcome of a validated authorization request
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Consent already covers the request: redirect with a fresh code
    Redirect(String),
    /// User must approve: render this consent screen
    ConsentRequired(Box<ConsentScreen>),
}

/// OAuth 2.0 token request (form or JSON body of POST /oauth/token)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// Grant type (`authorization_code`, `refresh_token`, `client_credentials`)
    pub grant_type: String,
    /// Authorization code (for `authorization_code`)
    pub code: Option<String>,
    /// Redirect URI (must match the code's binding)
    pub redirect_uri: Option<String>,
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Requested scopes (for `client_credentials`)
    pub scope: Option<String>,
    /// Refresh token (for `refresh_token`)
    pub refresh_token: Option<String>,
    /// PKCE code verifier (for `authorization_code`)
    pub code_verifier: Option<String>,
}

/// OAuth 2.0 token response (RFC 6749 §5.1)
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Opaque access token
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token, absent for client-credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scopes, space-separated
    pub scope: String,
}

/// Token revocation request (RFC 7009)
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    /// Token to revoke
    pub token: String,
    /// Hint: `access_token` (default) or `refresh_token`
    pub token_type_hint: Option<String>,
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

/// OAuth 2.0 error response (RFC 6749 §5.2)
#[derive(Debug, Clone, Serialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuth2Error {
    fn new(error: &str, description: impl Into<String>) -> Self {
        Self {
            error: error.to_owned(),
            error_description: Some(description.into()),
        }
    }

    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new("invalid_request", description)
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client() -> Self {
        Self::new("invalid_client", "Client authentication failed")
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new("invalid_grant", description)
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new("invalid_scope", description)
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self::new("unsupported_grant_type", "Grant type not supported")
    }

    /// Create an `unsupported_response_type` error
    #[must_use]
    pub fn unsupported_response_type() -> Self {
        Self::new("unsupported_response_type", "Only the code response type is supported")
    }

    /// Create an `unauthorized_client` error (client not registered for a grant)
    #[must_use]
    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self::new("unauthorized_client", description)
    }

    /// Create an `access_denied` error (user declined consent)
    #[must_use]
    pub fn access_denied() -> Self {
        Self::new("access_denied", "User denied authorization")
    }

    /// Create a `server_error` error (persistence or transport failure)
    #[must_use]
    pub fn server_error(description: impl Into<String>) -> Self {
        Self::new("server_error", description)
    }

    /// HTTP status for this protocol error
    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        if self.error == "server_error" {
            http::StatusCode::INTERNAL_SERVER_ERROR
        } else {
            http::StatusCode::BAD_REQUEST
        }
    }
}

impl fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(d) => write!(f, "{}: {d}", self.error),
            None => f.write_str(&self.error),
        }
    }
}

impl std::error::Error for OAuth2Error {}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        (self.http_status(), axum::Json(self)).into_response()
    }
}

/// Join scopes into the space-separated wire form
#[must_use]
pub fn join_scopes(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Split a space-separated scope string into a scope list
#[must_use]
pub fn split_scopes(scope: &str) -> Vec<String> {
    scope
        .split_whitespace()
        .map(std::borrow::ToOwned::to_owned)
        .collect()
}
