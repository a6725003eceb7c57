// ABOUTME: Configuration module for environment-driven server settings
// ABOUTME: Exposes ServerConfig and the read-only OAuth scope catalog
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! Server configuration loaded from the environment at startup.

pub mod environment;

pub use environment::{
    AuthConfig, CorsConfig, DatabaseConfig, OAuth2ServerConfig, ScopeCatalog, ServerConfig,
    ADMIN_SCOPE,
};
