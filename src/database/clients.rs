// ABOUTME: OAuth client registry storage with owner-scoped mutation
// ABOUTME: Client deletion is a soft deactivation plus token/consent cascade in one transaction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

use super::Database;
use crate::oauth2::models::{GrantType, OAuthClient};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, Sqlite};

fn client_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<OAuthClient> {
    let redirect_uris: String = row.try_get("redirect_uris")?;
    let grant_types: String = row.try_get("grant_types")?;
    let scopes: String = row.try_get("scopes")?;

    Ok(OAuthClient {
        client_id: row.try_get("client_id")?,
        client_secret_hash: row.try_get("client_secret_hash")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        owner_user_id: row.try_get("owner_user_id")?,
        redirect_uris: serde_json::from_str(&redirect_uris)
            .context("Malformed redirect_uris column")?,
        grant_types: serde_json::from_str::<Vec<GrantType>>(&grant_types)
            .context("Malformed grant_types column")?,
        scopes: serde_json::from_str(&scopes).context("Malformed scopes column")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Database {
    /// Create the OAuth client table
    pub(super) async fn migrate_clients(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth2_clients (
                client_id TEXT PRIMARY KEY,
                client_secret_hash TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                owner_user_id TEXT NOT NULL,
                redirect_uris TEXT NOT NULL,
                grant_types TEXT NOT NULL,
                scopes TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth2_clients_owner ON oauth2_clients(owner_user_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a newly registered client
    ///
    /// # Errors
    /// Returns an error if serialization or the insert fails.
    pub async fn store_client(&self, client: &OAuthClient) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO oauth2_clients (
                client_id, client_secret_hash, name, description, owner_user_id,
                redirect_uris, grant_types, scopes, active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(&client.name)
        .bind(&client.description)
        .bind(&client.owner_user_id)
        .bind(serde_json::to_string(&client.redirect_uris)?)
        .bind(serde_json::to_string(&client.grant_types)?)
        .bind(serde_json::to_string(&client.scopes)?)
        .bind(client.active)
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a client by id (active or not)
    ///
    /// # Errors
    /// Returns an error if the query fails or a column is malformed.
    pub async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        let row = sqlx::query("SELECT * FROM oauth2_clients WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(client_from_row).transpose()
    }

    /// List all clients owned by a user, newest first
    ///
    /// # Errors
    /// Returns an error if the query fails or a column is malformed.
    pub async fn list_clients_by_owner(&self, owner_user_id: &str) -> Result<Vec<OAuthClient>> {
        let rows = sqlx::query(
            "SELECT * FROM oauth2_clients WHERE owner_user_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner_user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(client_from_row).collect()
    }

    /// Persist owner-mutable fields of a client.
    ///
    /// The owner check is part of the statement, so a non-owner update
    /// affects zero rows. Returns whether a row was updated.
    ///
    /// # Errors
    /// Returns an error if serialization or the update fails.
    pub async fn update_client(&self, client: &OAuthClient) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE oauth2_clients SET
                name = $3,
                description = $4,
                redirect_uris = $5,
                scopes = $6,
                updated_at = $7
            WHERE client_id = $1 AND owner_user_id = $2
            ",
        )
        .bind(&client.client_id)
        .bind(&client.owner_user_id)
        .bind(&client.name)
        .bind(&client.description)
        .bind(serde_json::to_string(&client.redirect_uris)?)
        .bind(serde_json::to_string(&client.scopes)?)
        .bind(client.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deactivate a client and invalidate everything issued through it.
    ///
    /// One transaction: the client row flips inactive, its live tokens are
    /// revoked, its unused codes are burned, and its consents are deleted.
    /// Returns whether the client existed and was owned by `owner_user_id`.
    ///
    /// # Errors
    /// Returns an error if any statement in the transaction fails.
    pub async fn delete_client_cascade(
        &self,
        client_id: &str,
        owner_user_id: &str,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let deactivated = sqlx::query::<Sqlite>(
            r"
            UPDATE oauth2_clients SET active = 0, updated_at = $3
            WHERE client_id = $1 AND owner_user_id = $2 AND active = 1
            ",
        )
        .bind(client_id)
        .bind(owner_user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if deactivated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE oauth2_tokens SET revoked = 1 WHERE client_id = $1 AND revoked = 0")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE oauth2_auth_codes SET used = 1 WHERE client_id = $1 AND used = 0")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM oauth2_consents WHERE client_id = $1")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }
}
