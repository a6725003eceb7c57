// ABOUTME: Access/refresh token storage with atomic rotation and idempotent revocation
// ABOUTME: Rotation revokes the old record via conditional UPDATE ... RETURNING before a new insert
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

use super::Database;
use crate::oauth2::models::TokenRecord;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Row, Sqlite, Transaction};

fn token_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TokenRecord> {
    let scopes: String = row.try_get("scopes")?;

    Ok(TokenRecord {
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        client_id: row.try_get("client_id")?,
        user_id: row.try_get("user_id")?,
        scopes: serde_json::from_str(&scopes).context("Malformed scopes column")?,
        access_token_expires_at: row.try_get("access_token_expires_at")?,
        refresh_token_expires_at: row.try_get("refresh_token_expires_at")?,
        revoked: row.try_get("revoked")?,
        created_at: row.try_get("created_at")?,
    })
}

fn insert_token(token: &TokenRecord) -> Result<sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>>> {
    Ok(sqlx::query(
        r"
        INSERT INTO oauth2_tokens (
            access_token, refresh_token, client_id, user_id, scopes,
            access_token_expires_at, refresh_token_expires_at, revoked, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ",
    )
    .bind(&token.access_token)
    .bind(&token.refresh_token)
    .bind(&token.client_id)
    .bind(&token.user_id)
    .bind(serde_json::to_string(&token.scopes)?)
    .bind(token.access_token_expires_at)
    .bind(token.refresh_token_expires_at)
    .bind(token.revoked)
    .bind(token.created_at))
}

impl Database {
    /// Create the token table and its refresh lookup index
    pub(super) async fn migrate_tokens(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth2_tokens (
                access_token TEXT PRIMARY KEY,
                refresh_token TEXT,
                client_id TEXT NOT NULL,
                user_id TEXT,
                scopes TEXT NOT NULL,
                access_token_expires_at DATETIME NOT NULL,
                refresh_token_expires_at DATETIME,
                revoked BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_oauth2_tokens_refresh ON oauth2_tokens(refresh_token) WHERE refresh_token IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth2_tokens_client ON oauth2_tokens(client_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth2_tokens_user_client ON oauth2_tokens(user_id, client_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a newly issued token pair
    ///
    /// # Errors
    /// Returns an error if serialization or the insert fails.
    pub async fn store_token(&self, token: &TokenRecord) -> Result<()> {
        insert_token(token)?.execute(&self.pool).await?;

        Ok(())
    }

    /// Store a token pair inside the caller's transaction. Used by code
    /// exchange and refresh rotation so the consuming statement and this
    /// insert commit or roll back as one unit.
    ///
    /// # Errors
    /// Returns an error if serialization or the insert fails.
    pub async fn store_token_in(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        token: &TokenRecord,
    ) -> Result<()> {
        insert_token(token)?.execute(&mut **tx).await?;

        Ok(())
    }

    /// Look up a token record by access token value
    ///
    /// # Errors
    /// Returns an error if the query fails or a column is malformed.
    pub async fn get_token_by_access(&self, access_token: &str) -> Result<Option<TokenRecord>> {
        let row = sqlx::query("SELECT * FROM oauth2_tokens WHERE access_token = $1")
            .bind(access_token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    /// Look up a token record by refresh token value
    ///
    /// # Errors
    /// Returns an error if the query fails or a column is malformed.
    pub async fn get_token_by_refresh(&self, refresh_token: &str) -> Result<Option<TokenRecord>> {
        let row = sqlx::query("SELECT * FROM oauth2_tokens WHERE refresh_token = $1")
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    /// Atomically revoke a live token record by its refresh token inside the
    /// caller's transaction, returning the record that was revoked.
    ///
    /// This is the rotation primitive: exactly one concurrent caller gets
    /// `Some`, everyone else sees the token as already revoked. The caller
    /// checks client binding and refresh expiry on the returned record and
    /// commits so the revocation stands when those checks fail; rolling back
    /// (on a failed replacement insert) leaves the old token live.
    ///
    /// # Errors
    /// Returns an error if the query fails or a column is malformed.
    pub async fn consume_refresh_token(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        refresh_token: &str,
    ) -> Result<Option<TokenRecord>> {
        let row = sqlx::query(
            r"
            UPDATE oauth2_tokens SET revoked = 1
            WHERE refresh_token = $1 AND revoked = 0
            RETURNING *
            ",
        )
        .bind(refresh_token)
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    /// Revoke a token record by access token value. Returns whether a live
    /// record was revoked; revoking an unknown or already-revoked token is
    /// not an error.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn revoke_token_by_access(&self, access_token: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE oauth2_tokens SET revoked = 1 WHERE access_token = $1 AND revoked = 0",
        )
        .bind(access_token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke a token record by refresh token value. Same idempotent
    /// semantics as [`Database::revoke_token_by_access`].
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn revoke_token_by_refresh(&self, refresh_token: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE oauth2_tokens SET revoked = 1 WHERE refresh_token = $1 AND revoked = 0",
        )
        .bind(refresh_token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke every live token a user granted to one client. Used when the
    /// user withdraws consent.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn revoke_tokens_for_user_client(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE oauth2_tokens SET revoked = 1 WHERE user_id = $1 AND client_id = $2 AND revoked = 0",
        )
        .bind(user_id)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
