// ABOUTME: Main library entry point for the Bazaar marketplace OAuth 2.0 authorization server
// ABOUTME: Provides client registration, authorization-code/refresh/client-credentials grants, and scope middleware
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

#![deny(unsafe_code)]

//! # Bazaar OAuth Server
//!
//! The OAuth 2.0 authorization server embedded in the Bazaar marketplace
//! backend. It implements:
//!
//! - **Client registration**: owner-scoped CRUD over OAuth client records
//! - **Authorization-code grant** with PKCE (S256) and single-use codes
//! - **Refresh-token grant** with mandatory rotation
//! - **Client-credentials grant** for machine-to-machine access
//! - **Token revocation** (RFC 7009) and user consent management
//! - **Resource-server middleware** the rest of the marketplace API uses to
//!   gate routes on token scopes
//!
//! First-party end-user login is out of scope: the server validates session
//! JWTs issued by [`auth::AuthManager`] as its identity input and treats the
//! marketplace domain purely as a consumer of issued access tokens.

pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod oauth2;
pub mod resources;
pub mod routes;
