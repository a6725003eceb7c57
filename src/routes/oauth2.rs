// ABOUTME: HTTP surface of the OAuth 2.0 authorization server
// ABOUTME: Client management, authorize/approve, token, revoke, userinfo, consents, and discovery
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! # OAuth 2.0 Routes
//!
//! Three kinds of callers share this surface:
//! - first-party users with a session JWT (client management, authorize,
//!   consent management), responses in the `{success, data}` envelope
//! - OAuth clients speaking RFC 6749/7009 (token, revoke), raw protocol
//!   envelopes, form or JSON bodies
//! - resource requests with an OAuth bearer token (userinfo)
//!
//! ## Endpoints
//!
//! - `GET /.well-known/oauth-authorization-server` - RFC 8414 discovery
//! - `POST /oauth/clients` - register a client (secret shown once)
//! - `GET /oauth/clients` - list own clients
//! - `GET/PUT/DELETE /oauth/clients/:client_id` - manage an owned client
//! - `GET /oauth/authorize` - start the authorization-code flow
//! - `POST /oauth/authorize` - submit the consent decision
//! - `POST /oauth/token` - redeem codes, rotate refresh tokens, client credentials
//! - `POST /oauth/revoke` - RFC 7009 revocation
//! - `GET /oauth/userinfo` - claims for the token's user
//! - `GET /oauth/scopes` - the scope catalog
//! - `GET /oauth/consents` / `DELETE /oauth/consents/:client_id` - consent management

use crate::auth::Claims;
use crate::errors::{AppError, AppResult};
use crate::oauth2::endpoints::{build_error_redirect, AuthorizeError};
use crate::oauth2::models::{
    ApprovalRequest, AuthorizeOutcome, AuthorizeRequest, ClientRegistrationRequest,
    ClientUpdateRequest, OAuth2Error, RevokeRequest, TokenRequest,
};
use crate::resources::ServerResources;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// OAuth 2.0 routes implementation
pub struct OAuth2Routes;

impl OAuth2Routes {
    /// Create all OAuth 2.0 routes
    #[must_use]
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/.well-known/oauth-authorization-server",
                get(Self::handle_discovery),
            )
            .route(
                "/oauth/clients",
                post(Self::handle_register_client).get(Self::handle_list_clients),
            )
            .route(
                "/oauth/clients/:client_id",
                get(Self::handle_get_client)
                    .put(Self::handle_update_client)
                    .delete(Self::handle_delete_client),
            )
            .route(
                "/oauth/authorize",
                get(Self::handle_authorize).post(Self::handle_approve),
            )
            .route("/oauth/token", post(Self::handle_token))
            .route("/oauth/revoke", post(Self::handle_revoke))
            .route("/oauth/userinfo", get(Self::handle_userinfo))
            .route("/oauth/scopes", get(Self::handle_scopes))
            .route("/oauth/consents", get(Self::handle_list_consents))
            .route(
                "/oauth/consents/:client_id",
                axum::routing::delete(Self::handle_revoke_consent),
            )
            .with_state(resources)
    }

    /// Validate the session JWT carried in the Authorization header
    fn authenticate_session(
        headers: &HeaderMap,
        resources: &Arc<ServerResources>,
    ) -> AppResult<Claims> {
        let token = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::auth_required("Session token required"))?;

        resources
            .auth_manager
            .validate_token(token)
            .map_err(|e| AppError::auth_invalid(format!("Session validation failed: {e}")))
    }

    async fn handle_discovery(State(resources): State<Arc<ServerResources>>) -> Response {
        let config = &resources.config.oauth2_server;
        let issuer = config.issuer_url.trim_end_matches('/');

        let scopes: Vec<&str> = config
            .scopes
            .entries()
            .iter()
            .map(|(s, _)| s.as_str())
            .collect();

        Json(serde_json::json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/oauth/authorize"),
            "token_endpoint": format!("{issuer}/oauth/token"),
            "revocation_endpoint": format!("{issuer}/oauth/revoke"),
            "userinfo_endpoint": format!("{issuer}/oauth/userinfo"),
            "registration_endpoint": format!("{issuer}/oauth/clients"),
            "scopes_supported": scopes,
            "response_types_supported": ["code"],
            "grant_types_supported": ["authorization_code", "refresh_token", "client_credentials"],
            "token_endpoint_auth_methods_supported": ["client_secret_post"],
            "code_challenge_methods_supported": ["S256"],
        }))
        .into_response()
    }

    async fn handle_register_client(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<ClientRegistrationRequest>,
    ) -> Result<Response, AppError> {
        let claims = Self::authenticate_session(&headers, &resources)?;

        let registration = resources
            .oauth2
            .clients()
            .register_client(&claims.sub, request)
            .await?;

        Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "data": registration,
                "message": "Store the client_secret now; it is not shown again",
            })),
        )
            .into_response())
    }

    async fn handle_list_clients(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let claims = Self::authenticate_session(&headers, &resources)?;

        let clients = resources.oauth2.clients().list_clients(&claims.sub).await?;

        Ok(Json(serde_json::json!({ "success": true, "data": clients })).into_response())
    }

    async fn handle_get_client(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(client_id): Path<String>,
    ) -> Result<Response, AppError> {
        let claims = Self::authenticate_session(&headers, &resources)?;

        let client = resources
            .oauth2
            .clients()
            .get_owned_client(&client_id, &claims.sub)
            .await?;

        let summary = crate::oauth2::models::ClientSummary::from(client);

        Ok(Json(serde_json::json!({ "success": true, "data": summary })).into_response())
    }

    async fn handle_update_client(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(client_id): Path<String>,
        Json(update): Json<ClientUpdateRequest>,
    ) -> Result<Response, AppError> {
        let claims = Self::authenticate_session(&headers, &resources)?;

        let summary = resources
            .oauth2
            .clients()
            .update_client(&client_id, &claims.sub, update)
            .await?;

        Ok(Json(serde_json::json!({ "success": true, "data": summary })).into_response())
    }

    async fn handle_delete_client(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(client_id): Path<String>,
    ) -> Result<Response, AppError> {
        let claims = Self::authenticate_session(&headers, &resources)?;

        resources
            .oauth2
            .clients()
            .delete_client(&client_id, &claims.sub)
            .await?;

        Ok(Json(serde_json::json!({
            "success": true,
            "message": "Client deactivated and its tokens revoked",
        }))
        .into_response())
    }

    async fn handle_authorize(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(request): Query<AuthorizeRequest>,
    ) -> Result<Response, AppError> {
        let claims = Self::authenticate_session(&headers, &resources)?;

        match resources.oauth2.authorize(&claims.sub, &request).await {
            Ok(AuthorizeOutcome::Redirect(url)) => {
                Ok(Json(serde_json::json!({ "redirect": url })).into_response())
            }
            Ok(AuthorizeOutcome::ConsentRequired(screen)) => Ok(Json(serde_json::json!({
                "consent_required": true,
                "client": screen.client,
                "requested_scopes": screen.requested_scopes,
                "auth_params": screen.auth_params,
            }))
            .into_response()),
            Err(e) => Ok(authorize_error_response(&e)),
        }
    }

    async fn handle_approve(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<ApprovalRequest>,
    ) -> Result<Response, AppError> {
        let claims = Self::authenticate_session(&headers, &resources)?;

        match resources.oauth2.approve(&claims.sub, &request).await {
            Ok(url) => Ok(Json(serde_json::json!({ "redirect": url })).into_response()),
            Err(e) => Ok(authorize_error_response(&e)),
        }
    }

    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        let request: TokenRequest = match parse_protocol_body(&headers, &body) {
            Ok(request) => request,
            Err(e) => return e.into_response(),
        };

        match resources.oauth2.token(request).await {
            Ok(tokens) => (
                StatusCode::OK,
                [(header::CACHE_CONTROL, "no-store")],
                Json(tokens),
            )
                .into_response(),
            Err(e) => e.into_response(),
        }
    }

    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        let request: RevokeRequest = match parse_protocol_body(&headers, &body) {
            Ok(request) => request,
            Err(e) => return e.into_response(),
        };

        match resources.oauth2.revoke(request).await {
            Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
            Err(e) => e.into_response(),
        }
    }

    async fn handle_userinfo(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let context = resources.oauth_middleware.authenticate(&headers).await?;

        let user_id = context.user_id.clone().ok_or_else(|| {
            AppError::permission_denied("Token carries no user context")
        })?;

        let mut claims = serde_json::json!({ "sub": user_id });

        // Email and name require the read:users scope
        if context.has_scope("read:users") {
            if let Some(user) = resources.database.get_user(&user_id).await? {
                claims["email"] = serde_json::json!(user.email);
                claims["name"] = serde_json::json!(user.display_name);
            }
        }

        Ok(Json(claims).into_response())
    }

    async fn handle_scopes(State(resources): State<Arc<ServerResources>>) -> Response {
        let scopes: Vec<serde_json::Value> = resources
            .config
            .oauth2_server
            .scopes
            .entries()
            .iter()
            .map(|(scope, description)| {
                serde_json::json!({ "scope": scope, "description": description })
            })
            .collect();

        Json(serde_json::json!({ "success": true, "data": scopes })).into_response()
    }

    async fn handle_list_consents(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let claims = Self::authenticate_session(&headers, &resources)?;

        let consents = resources.oauth2.consents().list(&claims.sub).await?;

        Ok(Json(serde_json::json!({ "success": true, "data": consents })).into_response())
    }

    async fn handle_revoke_consent(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(client_id): Path<String>,
    ) -> Result<Response, AppError> {
        let claims = Self::authenticate_session(&headers, &resources)?;

        resources
            .oauth2
            .consents()
            .revoke(&claims.sub, &client_id)
            .await?;

        Ok(Json(serde_json::json!({
            "success": true,
            "message": "Consent revoked and associated tokens invalidated",
        }))
        .into_response())
    }
}

/// Deliver an authorize-flow failure: by redirect when the redirect target
/// was validated before the failure, as a direct protocol error otherwise
fn authorize_error_response(error: &AuthorizeError) -> Response {
    match &error.redirect {
        Some(target) => {
            let url = build_error_redirect(target, &error.error);
            Json(serde_json::json!({ "redirect": url })).into_response()
        }
        None => error.error.clone().into_response(),
    }
}

/// Parse a token-endpoint style body, accepting both form encoding and JSON
fn parse_protocol_body<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: &str,
) -> Result<T, OAuth2Error> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    let parsed = if content_type.starts_with("application/json") {
        serde_json::from_str(body).map_err(|e| e.to_string())
    } else {
        serde_urlencoded::from_str(body).map_err(|e| e.to_string())
    };

    parsed.map_err(|e| {
        tracing::debug!(error = %e, "Malformed token endpoint body");
        OAuth2Error::invalid_request("Malformed request body")
    })
}
