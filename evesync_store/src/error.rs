use evesync_core::TokenId;

use crate::vault::VaultError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("token {0} not found")]
    TokenNotFound(TokenId),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("character id {0} does not fit into sqlite INTEGER")]
    CharacterIdOverflow(u64),

    #[error("character id {0} is negative in sqlite record")]
    NegativeCharacterId(i64),

    #[error("epoch millis {0} is out of range")]
    InvalidEpochMillis(i64),
}
