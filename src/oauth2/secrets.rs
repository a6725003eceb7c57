// ABOUTME: Cryptographic primitives for the OAuth server: random identifiers, secret hashing, PKCE
// ABOUTME: All random material comes from ring's SystemRandom; comparisons on secrets are constant-time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! Token and secret generation
//!
//! Access tokens, refresh tokens, authorization codes, and client secrets are
//! opaque base64url strings with 256 bits of entropy. Client secrets are
//! stored only as Argon2id PHC hashes. PKCE verification follows RFC 7636
//! S256 with a constant-time digest comparison.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Bytes of entropy in every generated credential
const CREDENTIAL_ENTROPY_BYTES: usize = 32;

/// Generate an opaque base64url credential with 256 bits of entropy
///
/// # Errors
/// Returns an error if the system RNG fails.
pub fn generate_opaque_token() -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; CREDENTIAL_ENTROPY_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| anyhow!("System RNG failure"))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a client identifier with a recognizable prefix
///
/// # Errors
/// Returns an error if the system RNG fails.
pub fn generate_client_id() -> Result<String> {
    Ok(format!("client_{}", generate_opaque_token()?))
}

/// Hash a client secret with Argon2id, producing a PHC string
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_client_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash client secret: {e}"))?;
    Ok(hash.to_string())
}

/// Verify a client secret against its stored PHC hash
#[must_use]
pub fn verify_client_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// Compute the S256 code challenge for a PKCE verifier
#[must_use]
pub fn pkce_s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Verify a PKCE code verifier against the stored S256 challenge.
///
/// The derived challenge is compared to the stored one in constant time.
#[must_use]
pub fn verify_pkce_challenge(verifier: &str, stored_challenge: &str) -> bool {
    let derived = pkce_s256_challenge(verifier);
    derived
        .as_bytes()
        .ct_eq(stored_challenge.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_tokens_are_unique() {
        let a = generate_opaque_token().unwrap();
        let b = generate_opaque_token().unwrap();
        assert_ne!(a, b);
        assert!(a.len() >= 40);
    }

    #[test]
    fn test_client_id_prefix() {
        let id = generate_client_id().unwrap();
        assert!(id.starts_with("client_"));
    }

    #[test]
    fn test_secret_hash_verify() {
        let secret = generate_opaque_token().unwrap();
        let hash = hash_client_secret(&secret).unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_client_secret(&secret, &hash));
        assert!(!verify_client_secret("wrong-secret", &hash));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_client_secret("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_pkce_s256_known_vector() {
        // RFC 7636 appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            pkce_s256_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert!(verify_pkce_challenge(
            verifier,
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        ));
        assert!(!verify_pkce_challenge("some-other-verifier", "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"));
    }
}
