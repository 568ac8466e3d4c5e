use evesync_core::{
    AssetPayload, CharacterId, IndustryJobPayload, ItemId, JobId, LocationId, RawPayload,
    Timestamp, TypeId,
};
use futures_util::TryStreamExt;
use sqlx::{FromRow, SqlitePool};

use crate::{
    Database, StoreError,
    db::{character_id_from_sqlite, character_id_to_sqlite, timestamp_from_sqlite},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRecord {
    pub item_id: ItemId,
    pub character_id: CharacterId,
    pub type_id: TypeId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub synced_at: Timestamp,
    pub payload: RawPayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndustryJobRecord {
    pub job_id: JobId,
    pub character_id: CharacterId,
    pub product_type_id: Option<TypeId>,
    pub output_location_id: LocationId,
    pub status: String,
    pub synced_at: Timestamp,
    pub payload: RawPayload,
}

/// Local cache of remote assets and industry jobs.
///
/// Every row write is its own statement: an interrupted run leaves the rows
/// it already wrote and nothing half-written. Rows missing from a later run
/// are kept.
#[derive(Clone, Debug)]
pub struct SyncStore {
    pool: SqlitePool,
}

impl SyncStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    pub async fn upsert_asset(
        &self,
        character_id: CharacterId,
        asset: &AssetPayload,
        synced_at: Timestamp,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO esi_assets (
                item_id,
                character_id,
                type_id,
                location_id,
                quantity,
                synced_at_epoch_millis,
                payload_json
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (item_id) DO UPDATE SET
                quantity = excluded.quantity,
                synced_at_epoch_millis = excluded.synced_at_epoch_millis,
                payload_json = excluded.payload_json
            "#,
        )
        .bind(asset.item_id.0)
        .bind(character_id_to_sqlite(character_id)?)
        .bind(asset.type_id.0)
        .bind(asset.location_id.0)
        .bind(asset.quantity)
        .bind(synced_at.as_epoch_millis())
        .bind(asset.raw.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_assets(
        &self,
        character_id: CharacterId,
        assets: &[AssetPayload],
        synced_at: Timestamp,
    ) -> Result<usize, StoreError> {
        for asset in assets {
            self.upsert_asset(character_id, asset, synced_at).await?;
        }
        Ok(assets.len())
    }

    pub async fn upsert_industry_job(
        &self,
        character_id: CharacterId,
        job: &IndustryJobPayload,
        synced_at: Timestamp,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO esi_industry_jobs (
                job_id,
                character_id,
                product_type_id,
                output_location_id,
                status,
                synced_at_epoch_millis,
                payload_json
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (job_id) DO UPDATE SET
                status = excluded.status,
                synced_at_epoch_millis = excluded.synced_at_epoch_millis,
                payload_json = excluded.payload_json
            "#,
        )
        .bind(job.job_id.0)
        .bind(character_id_to_sqlite(character_id)?)
        .bind(job.product_type_id.map(|type_id| type_id.0))
        .bind(job.output_location_id.0)
        .bind(job.status.as_str())
        .bind(synced_at.as_epoch_millis())
        .bind(job.raw.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_industry_jobs(
        &self,
        character_id: CharacterId,
        jobs: &[IndustryJobPayload],
        synced_at: Timestamp,
    ) -> Result<usize, StoreError> {
        for job in jobs {
            self.upsert_industry_job(character_id, job, synced_at).await?;
        }
        Ok(jobs.len())
    }

    pub async fn get_asset(&self, item_id: ItemId) -> Result<Option<AssetRecord>, StoreError> {
        let row: Option<DbAssetRow> = sqlx::query_as(
            r#"
            SELECT item_id, character_id, type_id, location_id, quantity,
                   synced_at_epoch_millis, payload_json
            FROM esi_assets
            WHERE item_id = ?1
            "#,
        )
        .bind(item_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AssetRecord::try_from).transpose()
    }

    pub async fn list_assets(
        &self,
        character_id: CharacterId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<AssetRecord>, StoreError> {
        let mut rows = sqlx::query_as::<_, DbAssetRow>(
            r#"
            SELECT item_id, character_id, type_id, location_id, quantity,
                   synced_at_epoch_millis, payload_json
            FROM esi_assets
            WHERE character_id = ?1
            ORDER BY item_id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(character_id_to_sqlite(character_id)?)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch(&self.pool);

        let mut records = Vec::new();
        while let Some(row) = rows.try_next().await? {
            records.push(AssetRecord::try_from(row)?);
        }

        Ok(records)
    }

    pub async fn get_industry_job(
        &self,
        job_id: JobId,
    ) -> Result<Option<IndustryJobRecord>, StoreError> {
        let row: Option<DbIndustryJobRow> = sqlx::query_as(
            r#"
            SELECT job_id, character_id, product_type_id, output_location_id, status,
                   synced_at_epoch_millis, payload_json
            FROM esi_industry_jobs
            WHERE job_id = ?1
            "#,
        )
        .bind(job_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(IndustryJobRecord::try_from).transpose()
    }

    pub async fn list_industry_jobs(
        &self,
        character_id: CharacterId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<IndustryJobRecord>, StoreError> {
        let mut rows = sqlx::query_as::<_, DbIndustryJobRow>(
            r#"
            SELECT job_id, character_id, product_type_id, output_location_id, status,
                   synced_at_epoch_millis, payload_json
            FROM esi_industry_jobs
            WHERE character_id = ?1
            ORDER BY job_id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(character_id_to_sqlite(character_id)?)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch(&self.pool);

        let mut records = Vec::new();
        while let Some(row) = rows.try_next().await? {
            records.push(IndustryJobRecord::try_from(row)?);
        }

        Ok(records)
    }
}

#[derive(Debug, FromRow)]
struct DbAssetRow {
    item_id: i64,
    character_id: i64,
    type_id: i32,
    location_id: i64,
    quantity: i64,
    synced_at_epoch_millis: i64,
    payload_json: String,
}

impl TryFrom<DbAssetRow> for AssetRecord {
    type Error = StoreError;

    fn try_from(value: DbAssetRow) -> Result<Self, Self::Error> {
        Ok(Self {
            item_id: ItemId(value.item_id),
            character_id: character_id_from_sqlite(value.character_id)?,
            type_id: TypeId(value.type_id),
            location_id: LocationId(value.location_id),
            quantity: value.quantity,
            synced_at: timestamp_from_sqlite(value.synced_at_epoch_millis)?,
            payload: RawPayload::from_json_text(value.payload_json),
        })
    }
}

#[derive(Debug, FromRow)]
struct DbIndustryJobRow {
    job_id: i64,
    character_id: i64,
    product_type_id: Option<i32>,
    output_location_id: i64,
    status: String,
    synced_at_epoch_millis: i64,
    payload_json: String,
}

impl TryFrom<DbIndustryJobRow> for IndustryJobRecord {
    type Error = StoreError;

    fn try_from(value: DbIndustryJobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            job_id: JobId(value.job_id),
            character_id: character_id_from_sqlite(value.character_id)?,
            product_type_id: value.product_type_id.map(TypeId),
            output_location_id: LocationId(value.output_location_id),
            status: value.status,
            synced_at: timestamp_from_sqlite(value.synced_at_epoch_millis)?,
            payload: RawPayload::from_json_text(value.payload_json),
        })
    }
}
