// ABOUTME: Request middleware for the resource-server side of the marketplace API
// ABOUTME: OAuth bearer-token authentication and scope enforcement live here
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! Request middleware

pub mod cors;
pub mod oauth;

pub use oauth::{OAuthContext, OAuthMiddleware};
