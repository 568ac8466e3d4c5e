use evesync_core::{CategoryId, GroupId, TypeId};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::{Database, StoreError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TypeInfo {
    pub type_id: TypeId,
    pub name: String,
    pub group_id: Option<GroupId>,
    pub market_group_id: Option<i32>,
    pub volume: Option<f64>,
    pub portion_size: Option<i32>,
    pub base_price: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub group_id: GroupId,
    pub name: String,
    pub category_id: Option<CategoryId>,
}

/// Read-only view over the imported SDE tables. `None` means the id is not
/// present in the export.
#[derive(Clone, Debug)]
pub struct ReferenceStore {
    pool: SqlitePool,
}

impl ReferenceStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    pub async fn type_info(&self, type_id: TypeId) -> Result<Option<TypeInfo>, StoreError> {
        let row: Option<DbTypeRow> = sqlx::query_as(
            r#"
            SELECT type_id, name, group_id, market_group_id, volume, portion_size, base_price
            FROM sde_types
            WHERE type_id = ?1
            "#,
        )
        .bind(type_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TypeInfo::from))
    }

    pub async fn group_info(&self, group_id: GroupId) -> Result<Option<GroupInfo>, StoreError> {
        let row: Option<DbGroupRow> = sqlx::query_as(
            r#"
            SELECT group_id, name, category_id
            FROM sde_groups
            WHERE group_id = ?1
            "#,
        )
        .bind(group_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(GroupInfo::from))
    }

    pub async fn type_name(&self, type_id: TypeId) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM sde_types WHERE type_id = ?1")
            .bind(type_id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(name,)| name))
    }
}

#[derive(Debug, FromRow)]
struct DbTypeRow {
    type_id: i32,
    name: String,
    group_id: Option<i32>,
    market_group_id: Option<i32>,
    volume: Option<f64>,
    portion_size: Option<i32>,
    base_price: Option<f64>,
}

impl From<DbTypeRow> for TypeInfo {
    fn from(value: DbTypeRow) -> Self {
        Self {
            type_id: TypeId(value.type_id),
            name: value.name,
            group_id: value.group_id.map(GroupId),
            market_group_id: value.market_group_id,
            volume: value.volume,
            portion_size: value.portion_size,
            base_price: value.base_price,
        }
    }
}

#[derive(Debug, FromRow)]
struct DbGroupRow {
    group_id: i32,
    name: String,
    category_id: Option<i32>,
}

impl From<DbGroupRow> for GroupInfo {
    fn from(value: DbGroupRow) -> Self {
        Self {
            group_id: GroupId(value.group_id),
            name: value.name,
            category_id: value.category_id.map(CategoryId),
        }
    }
}
