// ABOUTME: Per-user per-client consent storage with cumulative scope grants
// ABOUTME: Revoking consent also revokes that pair's tokens and codes in one transaction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

use super::Database;
use crate::oauth2::models::Consent;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, Sqlite};

fn consent_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Consent> {
    let scopes: String = row.try_get("scopes")?;

    Ok(Consent {
        user_id: row.try_get("user_id")?,
        client_id: row.try_get("client_id")?,
        scopes: serde_json::from_str(&scopes).context("Malformed scopes column")?,
        granted_at: row.try_get("granted_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Database {
    /// Create the consent table
    pub(super) async fn migrate_consents(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth2_consents (
                user_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                scopes TEXT NOT NULL,
                granted_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, client_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a user's consent for one client
    ///
    /// # Errors
    /// Returns an error if the query fails or a column is malformed.
    pub async fn get_consent(&self, user_id: &str, client_id: &str) -> Result<Option<Consent>> {
        let row = sqlx::query(
            "SELECT * FROM oauth2_consents WHERE user_id = $1 AND client_id = $2",
        )
        .bind(user_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(consent_from_row).transpose()
    }

    /// List all of a user's consents, newest grant first
    ///
    /// # Errors
    /// Returns an error if the query fails or a column is malformed.
    pub async fn list_consents_for_user(&self, user_id: &str) -> Result<Vec<Consent>> {
        let rows = sqlx::query(
            "SELECT * FROM oauth2_consents WHERE user_id = $1 ORDER BY granted_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(consent_from_row).collect()
    }

    /// Merge newly approved scopes into a user's consent for a client.
    ///
    /// Grants are cumulative: the stored set becomes the union of the
    /// existing set and `scopes`. The read and write share one transaction
    /// so concurrent approvals cannot drop each other's scopes.
    ///
    /// # Errors
    /// Returns an error if any statement in the transaction fails.
    pub async fn upsert_consent(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: &[String],
    ) -> Result<Consent> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let existing = sqlx::query::<Sqlite>(
            "SELECT * FROM oauth2_consents WHERE user_id = $1 AND client_id = $2",
        )
        .bind(user_id)
        .bind(client_id)
        .fetch_optional(&mut *tx)
        .await?;

        let consent = match existing {
            Some(row) => {
                let mut consent = consent_from_row(&row)?;
                for scope in scopes {
                    if !consent.scopes.contains(scope) {
                        consent.scopes.push(scope.clone());
                    }
                }
                consent.updated_at = now;

                sqlx::query(
                    "UPDATE oauth2_consents SET scopes = $3, updated_at = $4 WHERE user_id = $1 AND client_id = $2",
                )
                .bind(user_id)
                .bind(client_id)
                .bind(serde_json::to_string(&consent.scopes)?)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                consent
            }
            None => {
                let consent = Consent {
                    user_id: user_id.to_owned(),
                    client_id: client_id.to_owned(),
                    scopes: scopes.to_vec(),
                    granted_at: now,
                    updated_at: now,
                };

                sqlx::query(
                    "INSERT INTO oauth2_consents (user_id, client_id, scopes, granted_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(user_id)
                .bind(client_id)
                .bind(serde_json::to_string(&consent.scopes)?)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                consent
            }
        };

        tx.commit().await?;

        Ok(consent)
    }

    /// Withdraw a user's consent for a client and invalidate what it backed.
    ///
    /// One transaction: the consent row is deleted, that pair's live tokens
    /// are revoked, and its unused codes are burned. Returns whether a
    /// consent existed.
    ///
    /// # Errors
    /// Returns an error if any statement in the transaction fails.
    pub async fn revoke_consent_cascade(&self, user_id: &str, client_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query::<Sqlite>(
            "DELETE FROM oauth2_consents WHERE user_id = $1 AND client_id = $2",
        )
        .bind(user_id)
        .bind(client_id)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE oauth2_tokens SET revoked = 1 WHERE user_id = $1 AND client_id = $2 AND revoked = 0",
        )
        .bind(user_id)
        .bind(client_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE oauth2_auth_codes SET used = 1 WHERE user_id = $1 AND client_id = $2 AND used = 0",
        )
        .bind(user_id)
        .bind(client_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }
}
