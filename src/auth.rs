// ABOUTME: JWT-based session authentication for first-party marketplace users
// ABOUTME: Validates the bearer session tokens used by client-management and consent endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! # Session Authentication
//!
//! The marketplace frontend logs users in through an upstream identity
//! provider and presents an HS256 session JWT to this server. The OAuth
//! endpoints that act on behalf of an end user (client registration,
//! authorization, consent revocation) treat that session token as their
//! identity input; everything third-party goes through OAuth access tokens
//! instead (see [`crate::middleware::oauth`]).

use crate::models::User;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Audience claim stamped into session tokens
const SESSION_AUDIENCE: &str = "bazaar-api";

/// `JWT` claims for user session tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// User email
    pub email: String,
    /// Display name, if any
    pub name: Option<String>,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Audience (who the token is intended for)
    pub aud: String,
}

/// Authentication manager for session JWTs
#[derive(Clone)]
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_expiry_hours: i64,
}

impl AuthManager {
    /// Create a new authentication manager from the shared HS256 secret
    #[must_use]
    pub fn new(jwt_secret: &str, session_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            session_expiry_hours,
        }
    }

    /// Generate a session token for a user
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails.
    pub fn generate_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.session_expiry_hours)).timestamp(),
            aud: SESSION_AUDIENCE.to_owned(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to encode session token")
    }

    /// Validate a session token and return its claims
    ///
    /// # Errors
    /// Returns an error if the signature is invalid, the token is expired,
    /// or the audience does not match.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_audience(&[SESSION_AUDIENCE]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .context("Session token validation failed")?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AuthManager {
        AuthManager::new("test-secret", 24)
    }

    #[test]
    fn test_generate_and_validate_roundtrip() {
        let user = User::new("user_1", "vendor@example.com");
        let token = manager().generate_token(&user).unwrap();
        let claims = manager().validate_token(&token).unwrap();
        assert_eq!(claims.sub, "user_1");
        assert_eq!(claims.email, "vendor@example.com");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let user = User::new("user_1", "vendor@example.com");
        let token = manager().generate_token(&user).unwrap();
        let other = AuthManager::new("other-secret", 24);
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let user = User::new("user_1", "vendor@example.com");
        let expired = AuthManager::new("test-secret", -1);
        let token = expired.generate_token(&user).unwrap();
        assert!(manager().validate_token(&token).is_err());
    }
}
