// ABOUTME: OAuth 2.0 authorization server implementation (RFC 6749, 7009, 7636)
// ABOUTME: Client registry, auth codes, token issuance/rotation, consent, and endpoint orchestration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! OAuth 2.0 authorization server
//!
//! Module layout mirrors the protocol surface:
//! - [`models`]: persisted records, request/response types, protocol errors
//! - [`secrets`]: random identifiers, secret hashing, PKCE digests
//! - [`client_registration`]: client registry CRUD and credential checks
//! - [`codes`]: single-use authorization code issue/redeem
//! - [`tokens`]: access/refresh token issuance, rotation, validation, revocation
//! - [`consent`]: per-user per-client scope grants
//! - [`endpoints`]: authorization orchestration and the token endpoint dispatcher

pub mod client_registration;
pub mod codes;
pub mod consent;
pub mod endpoints;
pub mod models;
pub mod secrets;
pub mod tokens;
