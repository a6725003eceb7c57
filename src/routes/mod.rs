// ABOUTME: HTTP route registration for the marketplace OAuth server
// ABOUTME: Each route group is a unit struct with a routes() constructor; this module merges them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! HTTP routes

pub mod health;
pub mod oauth2;

use crate::middleware::cors::setup_cors;
use crate::resources::ServerResources;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the complete application router
#[must_use]
pub fn router(resources: Arc<ServerResources>) -> Router {
    let cors = setup_cors(&resources.config);
    Router::new()
        .merge(health::HealthRoutes::routes(Arc::clone(&resources)))
        .merge(oauth2::OAuth2Routes::routes(resources))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
