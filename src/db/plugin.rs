use anyhow::{anyhow, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::instrument;

use super::Pool;
use crate::model::{LocalId, PluginDirectoryModel, PluginDirectoryType};

fn entry_from_row(row: &SqliteRow) -> Result<PluginDirectoryModel> {
    let raw: String = row.try_get("directory_type")?;
    let directory_type = PluginDirectoryType::parse(&raw)
        .ok_or_else(|| anyhow!("unknown plugin directory type '{raw}'"))?;
    Ok(PluginDirectoryModel {
        id: Some(LocalId(row.try_get("id")?)),
        name: row.try_get("name")?,
        directory_type,
    })
}

#[instrument(skip_all)]
pub async fn insert_plugin_directory(
    pool: &Pool,
    entry: &PluginDirectoryModel,
) -> Result<PluginDirectoryModel> {
    let id: i64 =
        sqlx::query("INSERT INTO plugin_directory (name, directory_type) VALUES (?, ?) RETURNING id")
            .bind(&entry.name)
            .bind(entry.directory_type.as_str())
            .fetch_one(pool)
            .await?
            .get("id");
    Ok(PluginDirectoryModel {
        id: Some(LocalId(id)),
        ..entry.clone()
    })
}

/// Replaces a whole directory listing in one transaction, keeping the given order.
#[instrument(skip_all)]
pub async fn replace_plugin_directory(
    pool: &Pool,
    directory_type: PluginDirectoryType,
    names: &[String],
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM plugin_directory WHERE directory_type = ?")
        .bind(directory_type.as_str())
        .execute(&mut *tx)
        .await?;
    let mut inserted = 0;
    for name in names {
        inserted += sqlx::query("INSERT INTO plugin_directory (name, directory_type) VALUES (?, ?)")
            .bind(name)
            .bind(directory_type.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

#[instrument(skip_all)]
pub async fn get_plugin_directory(
    pool: &Pool,
    directory_type: PluginDirectoryType,
) -> Result<Vec<PluginDirectoryModel>> {
    let rows = sqlx::query(
        "SELECT id, name, directory_type FROM plugin_directory WHERE directory_type = ? ORDER BY id",
    )
    .bind(directory_type.as_str())
    .fetch_all(pool)
    .await?;
    rows.iter().map(entry_from_row).collect()
}

#[instrument(skip_all)]
pub async fn delete_plugin_directory(pool: &Pool, directory_type: PluginDirectoryType) -> Result<u64> {
    let res = sqlx::query("DELETE FROM plugin_directory WHERE directory_type = ?")
        .bind(directory_type.as_str())
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
