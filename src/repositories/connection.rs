//! Connection repository for database operations
//!
//! Encapsulates SeaORM operations for the connections table, including
//! token encryption at rest and the conditional-write discipline used to
//! serialize concurrent token refreshes.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{
    CryptoKey, decrypt_connection_tokens, encrypt_connection_tokens, is_encrypted_payload,
};
use crate::models::connection::{self, Entity as Connection, PROVIDER_GOOGLE_BUSINESS};

/// Repository for connection database operations
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Crypto key for token encryption
    pub crypto_key: CryptoKey,
}

impl ConnectionRepository {
    /// Creates a new ConnectionRepository instance
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Finds the Google Business connection for an account, if one exists.
    pub async fn find_by_account(&self, account_id: &Uuid) -> Result<Option<connection::Model>> {
        Ok(Connection::find()
            .filter(connection::Column::AccountId.eq(*account_id))
            .filter(connection::Column::Provider.eq(PROVIDER_GOOGLE_BUSINESS))
            .one(&*self.db)
            .await?)
    }

    /// Retrieves a connection by its ID.
    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<connection::Model>> {
        Ok(Connection::find_by_id(*id).one(&*self.db).await?)
    }

    /// Creates a connection with encrypted tokens.
    pub async fn create_with_tokens(
        &self,
        account_id: Uuid,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        scope: Option<String>,
    ) -> Result<connection::Model> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        // Skeleton model carrying the AAD inputs (account, provider).
        let template = connection::Model {
            id,
            account_id,
            provider: PROVIDER_GOOGLE_BUSINESS.to_string(),
            status: "active".to_string(),
            access_token_ciphertext: None,
            refresh_token_ciphertext: None,
            token_type: "Bearer".to_string(),
            scope: scope.clone(),
            expires_at: expires_at.map(Into::into),
            last_error: None,
            revision: 0,
            created_at: now.into(),
            updated_at: now.into(),
        };

        let (access_ciphertext, refresh_ciphertext) =
            encrypt_connection_tokens(&self.crypto_key, &template, access_token, refresh_token)
                .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let active = connection::ActiveModel {
            id: Set(id),
            account_id: Set(account_id),
            provider: Set(PROVIDER_GOOGLE_BUSINESS.to_string()),
            status: Set("active".to_string()),
            access_token_ciphertext: Set(access_ciphertext),
            refresh_token_ciphertext: Set(refresh_ciphertext),
            token_type: Set("Bearer".to_string()),
            scope: Set(scope),
            expires_at: Set(expires_at.map(Into::into)),
            last_error: Set(None),
            revision: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        active.insert(&*self.db).await?;

        let fetched = Connection::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("connection not persisted"))
    }

    /// Decrypts the (access, refresh) token pair from a connection model.
    pub async fn decrypt_tokens(
        &self,
        connection: &connection::Model,
    ) -> Result<(Option<String>, Option<String>)> {
        let has_legacy = connection
            .access_token_ciphertext
            .as_ref()
            .is_some_and(|token| !is_encrypted_payload(token))
            || connection
                .refresh_token_ciphertext
                .as_ref()
                .is_some_and(|token| !is_encrypted_payload(token));

        if has_legacy {
            tracing::warn!(
                account_id = %connection.account_id,
                connection_id = %connection.id,
                "Legacy plaintext tokens detected, consider migrating to encrypted format"
            );
        }

        decrypt_connection_tokens(&self.crypto_key, connection).map_err(|e| {
            tracing::error!(
                account_id = %connection.account_id,
                connection_id = %connection.id,
                "Token decryption failed"
            );
            anyhow!("Token decryption failed: {}", e)
        })
    }

    /// Conditionally stores a refreshed token set, serialized on `revision`.
    ///
    /// The update only applies if no concurrent refresh has bumped the
    /// revision since `connection` was read. Returns the refreshed row on
    /// success, or `None` when the compare-and-swap lost the race (the
    /// caller should re-read and use the winner's token).
    pub async fn store_refreshed_tokens(
        &self,
        connection: &connection::Model,
        access_token: &str,
        rotated_refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<connection::Model>> {
        let (access_ciphertext, refresh_ciphertext) = encrypt_connection_tokens(
            &self.crypto_key,
            connection,
            Some(access_token),
            rotated_refresh_token,
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let now = Utc::now();
        let mut update = Connection::update_many()
            .col_expr(
                connection::Column::AccessTokenCiphertext,
                Expr::value(access_ciphertext),
            )
            .col_expr(connection::Column::ExpiresAt, Expr::value(expires_at))
            .col_expr(connection::Column::Status, Expr::value("active"))
            .col_expr(
                connection::Column::LastError,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                connection::Column::Revision,
                Expr::value(connection.revision + 1),
            )
            .col_expr(connection::Column::UpdatedAt, Expr::value(now));

        // Only overwrite the refresh token when the provider rotated it.
        if refresh_ciphertext.is_some() {
            update = update.col_expr(
                connection::Column::RefreshTokenCiphertext,
                Expr::value(refresh_ciphertext),
            );
        }

        let result = update
            .filter(connection::Column::Id.eq(connection.id))
            .filter(connection::Column::Revision.eq(connection.revision))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        self.get_by_id(&connection.id).await
    }

    /// Marks a connection with a terminal status and error detail.
    pub async fn mark_status(
        &self,
        connection_id: &Uuid,
        status: &str,
        last_error: Option<&str>,
    ) -> Result<()> {
        Connection::update_many()
            .col_expr(connection::Column::Status, Expr::value(status))
            .col_expr(
                connection::Column::LastError,
                Expr::value(last_error.map(str::to_string)),
            )
            .col_expr(connection::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(connection::Column::Id.eq(*connection_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Deletes the connection for an account (explicit disconnect).
    pub async fn delete_by_account(&self, account_id: &Uuid) -> Result<bool> {
        let result = Connection::delete_many()
            .filter(connection::Column::AccountId.eq(*account_id))
            .filter(connection::Column::Provider.eq(PROVIDER_GOOGLE_BUSINESS))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
