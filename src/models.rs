// ABOUTME: Core user data model shared by session auth and the user-info endpoint
// ABOUTME: Users are identified by opaque string ids supplied by the upstream login system
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! Common data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A marketplace user as seen by this server.
///
/// User identity originates in the upstream login system; this server only
/// stores what the `userinfo` endpoint needs to answer scope-gated claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Opaque user id (upstream uid)
    pub id: String,
    /// Primary email address
    pub email: String,
    /// Display name, if the user set one
    pub display_name: Option<String>,
    /// When this record was first seen
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user record
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: None,
            created_at: Utc::now(),
        }
    }
}
