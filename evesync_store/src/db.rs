use std::{path::Path, time::Duration};

use evesync_core::{CharacterId, Timestamp};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};

use crate::StoreError;

/// Shared sqlite pool with the schema migrated.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(database_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(connect_options)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        log::debug!("store schema migrated");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn character_id_to_sqlite(character_id: CharacterId) -> Result<i64, StoreError> {
    i64::try_from(character_id.0).map_err(|_| StoreError::CharacterIdOverflow(character_id.0))
}

pub(crate) fn character_id_from_sqlite(raw: i64) -> Result<CharacterId, StoreError> {
    let value = u64::try_from(raw).map_err(|_| StoreError::NegativeCharacterId(raw))?;
    Ok(CharacterId(value))
}

pub(crate) fn timestamp_from_sqlite(epoch_millis: i64) -> Result<Timestamp, StoreError> {
    Timestamp::from_epoch_millis(epoch_millis).ok_or(StoreError::InvalidEpochMillis(epoch_millis))
}
