// ABOUTME: SQLite persistence layer for clients, codes, tokens, consents, and users
// ABOUTME: Owns schema migration and all SQL; invariant-bearing mutations are single conditional statements
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! # Database Management
//!
//! All persistent state lives in SQLite behind a shared connection pool.
//! Single-use and revocation invariants are enforced in the database itself:
//! consuming an authorization code and rotating a refresh token are each one
//! conditional `UPDATE ... RETURNING` statement, so concurrent redemptions of
//! the same credential resolve to exactly one winner regardless of
//! interleaving.

mod clients;
mod codes;
mod consents;
mod tokens;
mod users;

pub use codes::CodeConsumption;

use anyhow::Result;
use sqlx::{Pool, Sqlite, SqlitePool, Transaction};

/// Database manager for OAuth server storage
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and run migrations
    ///
    /// # Errors
    /// Returns an error if the connection or a migration fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        let pool = SqlitePool::connect(&connection_options).await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Begin a transaction for multi-statement units such as code exchange
    /// and refresh rotation
    ///
    /// # Errors
    /// Returns an error if a connection cannot be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Run database migrations
    ///
    /// # Errors
    /// Returns an error if table or index creation fails.
    pub async fn migrate(&self) -> Result<()> {
        self.migrate_users().await?;
        self.migrate_clients().await?;
        self.migrate_auth_codes().await?;
        self.migrate_tokens().await?;
        self.migrate_consents().await?;

        Ok(())
    }
}
