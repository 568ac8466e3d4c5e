use std::sync::Arc;

use evesync_core::{CharacterId, Clock, SystemClock, Timestamp, TokenId};
use futures_util::TryStreamExt;
use sqlx::{FromRow, SqlitePool};

use crate::{
    Database, StoreError,
    db::{character_id_from_sqlite, character_id_to_sqlite, timestamp_from_sqlite},
    vault::CredentialVault,
};

/// A token with its secrets already decrypted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub id: TokenId,
    pub character_id: Option<CharacterId>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<Timestamp>,
}

/// A token row exactly as persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredToken {
    pub id: TokenId,
    pub character_id: Option<CharacterId>,
    pub access_token_enc: String,
    pub refresh_token_enc: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSummary {
    pub id: TokenId,
    pub character_id: Option<CharacterId>,
    pub scope: Option<String>,
    pub has_refresh_token: bool,
    pub expires_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharacterBinding {
    Bound,
    AlreadyBound,
    Conflict { existing: CharacterId },
}

/// Persistent OAuth tokens. Secrets go through the vault on the way in and
/// on the way out; plaintext never reaches a column.
#[derive(Clone)]
pub struct TokenStore {
    pool: SqlitePool,
    vault: CredentialVault,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl TokenStore {
    pub fn new(database: &Database, vault: CredentialVault) -> Self {
        Self {
            pool: database.pool().clone(),
            vault,
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamps created/updated times from `clock` instead of the system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn create_token(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        scope: Option<&str>,
        expires_at: Option<Timestamp>,
    ) -> Result<TokenId, StoreError> {
        let access_token_enc = self.vault.encrypt(access_token)?;
        let refresh_token_enc = self.vault.encrypt_optional(refresh_token)?;
        let expires_at = expires_at.map(Timestamp::as_epoch_millis);
        let now = self.clock.now().as_epoch_millis();

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO esi_tokens (
                character_id,
                access_token_enc,
                refresh_token_enc,
                scope,
                expires_at_epoch_millis,
                created_at_epoch_millis,
                updated_at_epoch_millis
            )
            VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?5)
            RETURNING id
            "#,
        )
        .bind(access_token_enc)
        .bind(refresh_token_enc)
        .bind(scope)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        log::debug!("created token {id}");
        Ok(TokenId(id))
    }

    pub async fn get_token(&self, id: TokenId) -> Result<TokenRecord, StoreError> {
        let stored = self.get_stored_token(id).await?;

        Ok(TokenRecord {
            id: stored.id,
            character_id: stored.character_id,
            access_token: self.vault.decrypt(&stored.access_token_enc)?,
            refresh_token: self
                .vault
                .decrypt_optional(stored.refresh_token_enc.as_deref())?,
            scope: stored.scope,
            expires_at: stored.expires_at,
        })
    }

    pub async fn get_stored_token(&self, id: TokenId) -> Result<StoredToken, StoreError> {
        let row: Option<DbTokenRow> = sqlx::query_as(
            r#"
            SELECT
                id,
                character_id,
                access_token_enc,
                refresh_token_enc,
                scope,
                expires_at_epoch_millis,
                created_at_epoch_millis,
                updated_at_epoch_millis
            FROM esi_tokens
            WHERE id = ?1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::TokenNotFound(id))?.try_into()
    }

    pub async fn update_tokens(
        &self,
        id: TokenId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<Timestamp>,
    ) -> Result<(), StoreError> {
        let access_token_enc = self.vault.encrypt(access_token)?;
        let refresh_token_enc = self.vault.encrypt_optional(refresh_token)?;
        let expires_at = expires_at.map(Timestamp::as_epoch_millis);
        let now = self.clock.now().as_epoch_millis();

        let result = sqlx::query(
            r#"
            UPDATE esi_tokens
            SET access_token_enc = ?1,
                refresh_token_enc = COALESCE(?2, refresh_token_enc),
                expires_at_epoch_millis = ?3,
                updated_at_epoch_millis = ?4
            WHERE id = ?5
            "#,
        )
        .bind(access_token_enc)
        .bind(refresh_token_enc)
        .bind(expires_at)
        .bind(now)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TokenNotFound(id));
        }

        log::debug!("replaced secrets for token {id}");
        Ok(())
    }

    /// Records the verified character once; a later, different identity is
    /// reported and left alone.
    pub async fn set_character_identity(
        &self,
        id: TokenId,
        character_id: CharacterId,
    ) -> Result<CharacterBinding, StoreError> {
        let raw_character_id = character_id_to_sqlite(character_id)?;
        let now = self.clock.now().as_epoch_millis();

        let result = sqlx::query(
            r#"
            UPDATE esi_tokens
            SET character_id = ?1,
                updated_at_epoch_millis = ?2
            WHERE id = ?3 AND character_id IS NULL
            "#,
        )
        .bind(raw_character_id)
        .bind(now)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            log::debug!("bound token {id} to character {character_id}");
            return Ok(CharacterBinding::Bound);
        }

        let existing: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT character_id FROM esi_tokens WHERE id = ?1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        // Identities are never cleared, so a skipped update means the row is
        // missing or already bound.
        match existing {
            Some((Some(raw),)) if raw == raw_character_id => Ok(CharacterBinding::AlreadyBound),
            Some((Some(raw),)) => {
                let existing = character_id_from_sqlite(raw)?;
                log::warn!(
                    "token {id} is bound to character {existing}; ignoring verified character {character_id}"
                );
                Ok(CharacterBinding::Conflict { existing })
            }
            _ => Err(StoreError::TokenNotFound(id)),
        }
    }

    pub async fn list_tokens(&self) -> Result<Vec<TokenSummary>, StoreError> {
        let mut rows = sqlx::query_as::<_, DbTokenRow>(
            r#"
            SELECT
                id,
                character_id,
                access_token_enc,
                refresh_token_enc,
                scope,
                expires_at_epoch_millis,
                created_at_epoch_millis,
                updated_at_epoch_millis
            FROM esi_tokens
            ORDER BY id ASC
            "#,
        )
        .fetch(&self.pool);

        let mut summaries = Vec::new();
        while let Some(row) = rows.try_next().await? {
            let stored = StoredToken::try_from(row)?;
            summaries.push(TokenSummary {
                id: stored.id,
                character_id: stored.character_id,
                scope: stored.scope,
                has_refresh_token: stored.refresh_token_enc.is_some(),
                expires_at: stored.expires_at,
                updated_at: stored.updated_at,
            });
        }

        Ok(summaries)
    }
}

#[derive(Debug, FromRow)]
struct DbTokenRow {
    id: i64,
    character_id: Option<i64>,
    access_token_enc: String,
    refresh_token_enc: Option<String>,
    scope: Option<String>,
    expires_at_epoch_millis: Option<i64>,
    created_at_epoch_millis: i64,
    updated_at_epoch_millis: i64,
}

impl TryFrom<DbTokenRow> for StoredToken {
    type Error = StoreError;

    fn try_from(value: DbTokenRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TokenId(value.id),
            character_id: value
                .character_id
                .map(character_id_from_sqlite)
                .transpose()?,
            access_token_enc: value.access_token_enc,
            refresh_token_enc: value.refresh_token_enc,
            scope: value.scope,
            expires_at: value
                .expires_at_epoch_millis
                .map(timestamp_from_sqlite)
                .transpose()?,
            created_at: timestamp_from_sqlite(value.created_at_epoch_millis)?,
            updated_at: timestamp_from_sqlite(value.updated_at_epoch_millis)?,
        })
    }
}
