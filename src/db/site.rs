use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, instrument};

use super::Pool;
use crate::model::{LocalId, RemoteId, SiteModel};

const SITE_COLUMNS: &str = "id, site_id, self_hosted_site_id, name, url, xmlrpc_url, \
                            is_wpcom, is_jetpack_connected, is_visible";

fn site_from_row(row: &SqliteRow) -> Result<SiteModel> {
    Ok(SiteModel {
        id: Some(LocalId(row.try_get("id")?)),
        site_id: row.try_get::<Option<i64>, _>("site_id")?.map(RemoteId),
        self_hosted_site_id: row.try_get("self_hosted_site_id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        xmlrpc_url: row.try_get("xmlrpc_url")?,
        is_wpcom: row.try_get("is_wpcom")?,
        is_jetpack_connected: row.try_get("is_jetpack_connected")?,
        is_visible: row.try_get("is_visible")?,
    })
}

async fn find_existing(conn: &mut SqliteConnection, site: &SiteModel) -> Result<Option<SiteModel>> {
    let row = if let Some(id) = site.id {
        sqlx::query(&format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await?
    } else if let Some(remote) = site.site_id {
        sqlx::query(&format!("SELECT {SITE_COLUMNS} FROM sites WHERE site_id = ?"))
            .bind(remote.0)
            .fetch_optional(&mut *conn)
            .await?
    } else if !site.url.is_empty() {
        sqlx::query(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE site_id IS NULL AND url = ?"
        ))
        .bind(&site.url)
        .fetch_optional(&mut *conn)
        .await?
    } else {
        None
    };
    row.as_ref().map(site_from_row).transpose()
}

/// Inserts or overwrites one site. Returns the stored site and the number of rows changed.
pub(crate) async fn upsert_site(
    conn: &mut SqliteConnection,
    site: &SiteModel,
) -> Result<(SiteModel, u64)> {
    let Some(existing) = find_existing(conn, site).await? else {
        let id: i64 = sqlx::query(
            "INSERT INTO sites (site_id, self_hosted_site_id, name, url, xmlrpc_url, \
             is_wpcom, is_jetpack_connected, is_visible) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(site.site_id.map(|r| r.0))
        .bind(site.self_hosted_site_id)
        .bind(&site.name)
        .bind(&site.url)
        .bind(&site.xmlrpc_url)
        .bind(site.is_wpcom)
        .bind(site.is_jetpack_connected)
        .bind(site.is_visible)
        .fetch_one(&mut *conn)
        .await?
        .get("id");
        let stored = SiteModel {
            id: Some(LocalId(id)),
            ..site.clone()
        };
        return Ok((stored, 1));
    };

    let incoming = SiteModel {
        id: existing.id,
        ..site.clone()
    };
    if incoming == existing {
        return Ok((existing, 0));
    }
    let res = sqlx::query(
        "UPDATE sites SET site_id = ?, self_hosted_site_id = ?, name = ?, url = ?, xmlrpc_url = ?, \
         is_wpcom = ?, is_jetpack_connected = ?, is_visible = ? WHERE id = ?",
    )
    .bind(incoming.site_id.map(|r| r.0))
    .bind(incoming.self_hosted_site_id)
    .bind(&incoming.name)
    .bind(&incoming.url)
    .bind(&incoming.xmlrpc_url)
    .bind(incoming.is_wpcom)
    .bind(incoming.is_jetpack_connected)
    .bind(incoming.is_visible)
    .bind(existing.id.map(|i| i.0))
    .execute(&mut *conn)
    .await?;
    Ok((incoming, res.rows_affected()))
}

#[instrument(skip_all)]
pub async fn insert_or_update_site(pool: &Pool, site: &SiteModel) -> Result<(SiteModel, u64)> {
    let mut tx = pool.begin().await?;
    let result = upsert_site(&mut tx, site)
        .await
        .with_context(|| format!("failed to store site {}", site.url))?;
    tx.commit().await?;
    Ok(result)
}

/// Stores a fetched site list in one transaction. Returns the number of rows changed.
#[instrument(skip_all)]
pub async fn insert_or_update_sites(pool: &Pool, sites: &[SiteModel]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut changed = 0;
    for site in sites {
        let (_, rows) = upsert_site(&mut tx, site)
            .await
            .with_context(|| format!("failed to store site {}", site.url))?;
        changed += rows;
    }
    tx.commit().await?;
    debug!(fetched = sites.len(), changed, "sites reconciled");
    Ok(changed)
}

#[instrument(skip_all)]
pub async fn get_sites(pool: &Pool) -> Result<Vec<SiteModel>> {
    let rows = sqlx::query(&format!("SELECT {SITE_COLUMNS} FROM sites ORDER BY id"))
        .fetch_all(pool)
        .await?;
    rows.iter().map(site_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_jetpack_sites(pool: &Pool) -> Result<Vec<SiteModel>> {
    let rows = sqlx::query(&format!(
        "SELECT {SITE_COLUMNS} FROM sites WHERE is_jetpack_connected = 1 AND is_wpcom = 0 ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(site_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_sites_count(pool: &Pool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM sites")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn get_site_by_local_id(pool: &Pool, id: LocalId) -> Result<Option<SiteModel>> {
    let row = sqlx::query(&format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(site_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn get_site_by_remote_id(pool: &Pool, site_id: RemoteId) -> Result<Option<SiteModel>> {
    let row = sqlx::query(&format!("SELECT {SITE_COLUMNS} FROM sites WHERE site_id = ?"))
        .bind(site_id.0)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(site_from_row).transpose()
}

/// Deletes a site's posts, themes and the site row itself.
async fn purge_site(conn: &mut SqliteConnection, id: LocalId) -> Result<u64> {
    let posts = sqlx::query("DELETE FROM posts WHERE local_site_id = ?")
        .bind(id.0)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let themes = sqlx::query("DELETE FROM themes WHERE local_site_id = ?")
        .bind(id.0)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let sites = sqlx::query("DELETE FROM sites WHERE id = ?")
        .bind(id.0)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    debug!(site = %id, posts, themes, "site purged");
    Ok(sites)
}

#[instrument(skip_all)]
pub async fn delete_site(pool: &Pool, id: LocalId) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let removed = purge_site(&mut tx, id)
        .await
        .with_context(|| format!("failed to remove site {id}"))?;
    tx.commit().await?;
    Ok(removed)
}

#[instrument(skip_all)]
pub async fn site_exists(pool: &Pool, id: LocalId) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM sites WHERE id = ?")
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Sites reached through WordPress.com (hosted or Jetpack-connected). These are
/// the ones dropped on sign-out; self-hosted sites stay.
#[instrument(skip_all)]
pub async fn get_wpcom_and_jetpack_site_ids(pool: &Pool) -> Result<Vec<LocalId>> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM sites WHERE is_wpcom = 1 OR is_jetpack_connected = 1 ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids.into_iter().map(LocalId).collect())
}

/// Purges several sites with their posts and themes in one transaction.
#[instrument(skip_all)]
pub async fn delete_sites(pool: &Pool, ids: &[LocalId]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut removed = 0;
    for id in ids {
        removed += purge_site(&mut tx, *id)
            .await
            .with_context(|| format!("failed to remove site {id}"))?;
    }
    tx.commit().await?;
    Ok(removed)
}
