// ABOUTME: Authorization code storage with atomic single-use consumption
// ABOUTME: Consumption is one conditional UPDATE ... RETURNING so concurrent redeems get one winner
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

use super::Database;
use crate::oauth2::models::AuthorizationCode;
use anyhow::{Context, Result};
use sqlx::{Row, Sqlite, Transaction};

/// Result of an atomic authorization-code consumption attempt
#[derive(Debug)]
pub enum CodeConsumption {
    /// This caller won the flip from unused to used
    Consumed(AuthorizationCode),
    /// The code exists but was consumed earlier
    AlreadyUsed,
    /// No such code
    NotFound,
}

fn code_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AuthorizationCode> {
    let scopes: String = row.try_get("scopes")?;

    Ok(AuthorizationCode {
        code: row.try_get("code")?,
        client_id: row.try_get("client_id")?,
        user_id: row.try_get("user_id")?,
        redirect_uri: row.try_get("redirect_uri")?,
        scopes: serde_json::from_str(&scopes).context("Malformed scopes column")?,
        code_challenge: row.try_get("code_challenge")?,
        used: row.try_get("used")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Database {
    /// Create the authorization code table
    pub(super) async fn migrate_auth_codes(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth2_auth_codes (
                code TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scopes TEXT NOT NULL,
                code_challenge TEXT,
                used BOOLEAN NOT NULL DEFAULT 0,
                expires_at DATETIME NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth2_auth_codes_client ON oauth2_auth_codes(client_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a freshly issued authorization code
    ///
    /// # Errors
    /// Returns an error if serialization or the insert fails.
    pub async fn store_auth_code(&self, code: &AuthorizationCode) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO oauth2_auth_codes (
                code, client_id, user_id, redirect_uri, scopes,
                code_challenge, used, expires_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.user_id)
        .bind(&code.redirect_uri)
        .bind(serde_json::to_string(&code.scopes)?)
        .bind(&code.code_challenge)
        .bind(code.used)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Atomically consume an authorization code inside the caller's
    /// transaction.
    ///
    /// The used flag flips in a single conditional statement; only one
    /// concurrent caller observes [`CodeConsumption::Consumed`]. Binding,
    /// expiry, and PKCE checks happen in the caller against the returned
    /// record. The caller decides the transaction's fate: committing makes
    /// the burn durable, rolling back (on a later storage failure) leaves
    /// the code unspent so no code is ever consumed without its tokens.
    ///
    /// # Errors
    /// Returns an error if the query fails or a column is malformed.
    pub async fn consume_auth_code(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        code: &str,
    ) -> Result<CodeConsumption> {
        let row = sqlx::query(
            r"
            UPDATE oauth2_auth_codes SET used = 1
            WHERE code = $1 AND used = 0
            RETURNING *
            ",
        )
        .bind(code)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = row {
            return Ok(CodeConsumption::Consumed(code_from_row(&row)?));
        }

        let exists = sqlx::query("SELECT 1 FROM oauth2_auth_codes WHERE code = $1")
            .bind(code)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(if exists.is_some() {
            CodeConsumption::AlreadyUsed
        } else {
            CodeConsumption::NotFound
        })
    }

    /// Look up a code without consuming it (test and inspection use)
    ///
    /// # Errors
    /// Returns an error if the query fails or a column is malformed.
    pub async fn get_auth_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        let row = sqlx::query("SELECT * FROM oauth2_auth_codes WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(code_from_row).transpose()
    }
}
