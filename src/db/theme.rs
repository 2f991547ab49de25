use std::collections::HashSet;

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, instrument};

use super::Pool;
use crate::model::{LocalId, ThemeModel};

const THEME_COLUMNS: &str = "id, local_site_id, theme_id, name, description, author_name, \
                             author_url, screenshot_url, demo_url, version, stylesheet, \
                             price_text, free, active, is_wpcom_theme";

fn theme_from_row(row: &SqliteRow) -> Result<ThemeModel> {
    Ok(ThemeModel {
        id: Some(LocalId(row.try_get("id")?)),
        local_site_id: row.try_get::<Option<i64>, _>("local_site_id")?.map(LocalId),
        theme_id: row.try_get("theme_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        author_name: row.try_get("author_name")?,
        author_url: row.try_get("author_url")?,
        screenshot_url: row.try_get("screenshot_url")?,
        demo_url: row.try_get("demo_url")?,
        version: row.try_get("version")?,
        stylesheet: row.try_get("stylesheet")?,
        price_text: row.try_get("price_text")?,
        free: row.try_get("free")?,
        active: row.try_get("active")?,
        is_wpcom_theme: row.try_get("is_wpcom_theme")?,
    })
}

/// Scopes a theme to a site, or to the WordPress.com catalogue when `site` is `None`.
fn scoped(theme: &ThemeModel, site: Option<LocalId>) -> ThemeModel {
    ThemeModel {
        local_site_id: site,
        is_wpcom_theme: site.is_none(),
        ..theme.clone()
    }
}

async fn list_scope(conn: &mut SqliteConnection, site: Option<LocalId>) -> Result<Vec<ThemeModel>> {
    let rows = sqlx::query(&format!(
        "SELECT {THEME_COLUMNS} FROM themes WHERE local_site_id IS ? ORDER BY id"
    ))
    .bind(site.map(|s| s.0))
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(theme_from_row).collect()
}

async fn find_in_scope(
    conn: &mut SqliteConnection,
    site: Option<LocalId>,
    theme_id: &str,
) -> Result<Option<ThemeModel>> {
    let row = sqlx::query(&format!(
        "SELECT {THEME_COLUMNS} FROM themes WHERE local_site_id IS ? AND theme_id = ? ORDER BY id LIMIT 1"
    ))
    .bind(site.map(|s| s.0))
    .bind(theme_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(theme_from_row).transpose()
}

async fn insert_theme(conn: &mut SqliteConnection, theme: &ThemeModel) -> Result<ThemeModel> {
    let id: i64 = sqlx::query(
        "INSERT INTO themes (local_site_id, theme_id, name, description, author_name, author_url, \
         screenshot_url, demo_url, version, stylesheet, price_text, free, active, is_wpcom_theme) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(theme.local_site_id.map(|s| s.0))
    .bind(&theme.theme_id)
    .bind(&theme.name)
    .bind(&theme.description)
    .bind(&theme.author_name)
    .bind(&theme.author_url)
    .bind(&theme.screenshot_url)
    .bind(&theme.demo_url)
    .bind(&theme.version)
    .bind(&theme.stylesheet)
    .bind(&theme.price_text)
    .bind(theme.free)
    .bind(theme.active)
    .bind(theme.is_wpcom_theme)
    .fetch_one(&mut *conn)
    .await?
    .get("id");
    Ok(ThemeModel {
        id: Some(LocalId(id)),
        ..theme.clone()
    })
}

async fn update_theme(conn: &mut SqliteConnection, id: LocalId, theme: &ThemeModel) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE themes SET local_site_id = ?, theme_id = ?, name = ?, description = ?, \
         author_name = ?, author_url = ?, screenshot_url = ?, demo_url = ?, version = ?, \
         stylesheet = ?, price_text = ?, free = ?, active = ?, is_wpcom_theme = ? WHERE id = ?",
    )
    .bind(theme.local_site_id.map(|s| s.0))
    .bind(&theme.theme_id)
    .bind(&theme.name)
    .bind(&theme.description)
    .bind(&theme.author_name)
    .bind(&theme.author_url)
    .bind(&theme.screenshot_url)
    .bind(&theme.demo_url)
    .bind(&theme.version)
    .bind(&theme.stylesheet)
    .bind(&theme.price_text)
    .bind(theme.free)
    .bind(theme.active)
    .bind(theme.is_wpcom_theme)
    .bind(id.0)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected())
}

/// Inserts or overwrites one theme in its scope. Returns the stored theme and rows changed.
async fn upsert_in_scope(
    conn: &mut SqliteConnection,
    site: Option<LocalId>,
    theme: &ThemeModel,
) -> Result<(ThemeModel, u64)> {
    let incoming = scoped(theme, site);
    match find_in_scope(conn, site, &incoming.theme_id).await? {
        Some(existing) => {
            let incoming = ThemeModel {
                id: existing.id,
                ..incoming
            };
            if incoming == existing {
                return Ok((existing, 0));
            }
            let id = existing.id.context("stored theme without id")?;
            let rows = update_theme(conn, id, &incoming).await?;
            Ok((incoming, rows))
        }
        None => Ok((insert_theme(conn, &incoming).await?, 1)),
    }
}

/// Makes the cached scope match `themes` exactly, preserving local ids of themes
/// that are still present. Returns the number of rows inserted, updated or deleted.
async fn reconcile_scope(
    conn: &mut SqliteConnection,
    site: Option<LocalId>,
    themes: &[ThemeModel],
) -> Result<u64> {
    let mut changed = 0;
    let mut seen = HashSet::new();
    for theme in themes {
        if !seen.insert(theme.theme_id.as_str()) {
            continue;
        }
        let (_, rows) = upsert_in_scope(conn, site, theme).await?;
        changed += rows;
    }
    for stale in list_scope(conn, site).await? {
        if seen.contains(stale.theme_id.as_str()) {
            continue;
        }
        if let Some(id) = stale.id {
            changed += sqlx::query("DELETE FROM themes WHERE id = ?")
                .bind(id.0)
                .execute(&mut *conn)
                .await?
                .rows_affected();
        }
    }
    Ok(changed)
}

#[instrument(skip_all)]
pub async fn replace_wpcom_themes(pool: &Pool, themes: &[ThemeModel]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let changed = reconcile_scope(&mut tx, None, themes)
        .await
        .context("failed to store WordPress.com themes")?;
    tx.commit().await?;
    debug!(fetched = themes.len(), changed, "WordPress.com themes reconciled");
    Ok(changed)
}

#[instrument(skip_all)]
pub async fn replace_site_themes(pool: &Pool, site: LocalId, themes: &[ThemeModel]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let changed = reconcile_scope(&mut tx, Some(site), themes)
        .await
        .with_context(|| format!("failed to store themes for site {site}"))?;
    tx.commit().await?;
    debug!(site = %site, fetched = themes.len(), changed, "site themes reconciled");
    Ok(changed)
}

#[instrument(skip_all)]
pub async fn insert_or_update_site_theme(
    pool: &Pool,
    site: LocalId,
    theme: &ThemeModel,
) -> Result<ThemeModel> {
    let mut tx = pool.begin().await?;
    let (stored, _) = upsert_in_scope(&mut tx, Some(site), theme).await?;
    tx.commit().await?;
    Ok(stored)
}

/// Marks `theme` active for `site` and every other theme of that site inactive.
#[instrument(skip_all)]
pub async fn set_active_theme(pool: &Pool, site: LocalId, theme: &ThemeModel) -> Result<ThemeModel> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE themes SET active = 0 WHERE local_site_id = ? AND theme_id != ?")
        .bind(site.0)
        .bind(&theme.theme_id)
        .execute(&mut *tx)
        .await?;
    let active = ThemeModel {
        active: true,
        ..theme.clone()
    };
    let (stored, _) = upsert_in_scope(&mut tx, Some(site), &active)
        .await
        .with_context(|| format!("failed to activate {} on site {site}", theme.theme_id))?;
    tx.commit().await?;
    Ok(stored)
}

#[instrument(skip_all)]
pub async fn get_wpcom_themes(pool: &Pool) -> Result<Vec<ThemeModel>> {
    let mut conn = pool.acquire().await?;
    list_scope(&mut conn, None).await
}

#[instrument(skip_all)]
pub async fn get_themes_for_site(pool: &Pool, site: LocalId) -> Result<Vec<ThemeModel>> {
    let mut conn = pool.acquire().await?;
    list_scope(&mut conn, Some(site)).await
}

#[instrument(skip_all)]
pub async fn get_active_theme_for_site(pool: &Pool, site: LocalId) -> Result<Option<ThemeModel>> {
    let row = sqlx::query(&format!(
        "SELECT {THEME_COLUMNS} FROM themes WHERE local_site_id = ? AND active = 1 LIMIT 1"
    ))
    .bind(site.0)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(theme_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn get_wpcom_theme_by_theme_id(pool: &Pool, theme_id: &str) -> Result<Option<ThemeModel>> {
    let mut conn = pool.acquire().await?;
    find_in_scope(&mut conn, None, theme_id).await
}

#[instrument(skip_all)]
pub async fn get_installed_theme_by_theme_id(
    pool: &Pool,
    site: LocalId,
    theme_id: &str,
) -> Result<Option<ThemeModel>> {
    let mut conn = pool.acquire().await?;
    find_in_scope(&mut conn, Some(site), theme_id).await
}

#[instrument(skip_all)]
pub async fn get_theme_by_local_id(pool: &Pool, id: LocalId) -> Result<Option<ThemeModel>> {
    let row = sqlx::query(&format!("SELECT {THEME_COLUMNS} FROM themes WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(theme_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn delete_site_theme(pool: &Pool, site: LocalId, theme_id: &str) -> Result<u64> {
    let res = sqlx::query("DELETE FROM themes WHERE local_site_id = ? AND theme_id = ?")
        .bind(site.0)
        .bind(theme_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Removes one cached theme, by local id when it has one, otherwise by scope and theme id.
#[instrument(skip_all)]
pub async fn remove_theme(pool: &Pool, theme: &ThemeModel) -> Result<u64> {
    let res = match theme.id {
        Some(id) => {
            sqlx::query("DELETE FROM themes WHERE id = ?")
                .bind(id.0)
                .execute(pool)
                .await?
        }
        None => {
            sqlx::query("DELETE FROM themes WHERE local_site_id IS ? AND theme_id = ?")
                .bind(theme.local_site_id.map(|s| s.0))
                .bind(&theme.theme_id)
                .execute(pool)
                .await?
        }
    };
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn remove_site_themes(pool: &Pool, site: LocalId) -> Result<u64> {
    let res = sqlx::query("DELETE FROM themes WHERE local_site_id = ?")
        .bind(site.0)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_pool;

    const SITE: LocalId = LocalId(3);

    fn themes(ids: &[&str]) -> Vec<ThemeModel> {
        ids.iter().map(|id| ThemeModel::new(*id, id.to_uppercase())).collect()
    }

    #[tokio::test]
    async fn reconcile_preserves_local_ids_and_drops_stale() {
        let pool = setup_pool().await;
        let changed = replace_site_themes(&pool, SITE, &themes(&["edin", "twentyfifteen"]))
            .await
            .unwrap();
        assert_eq!(changed, 2);
        let edin = get_installed_theme_by_theme_id(&pool, SITE, "edin")
            .await
            .unwrap()
            .unwrap();

        let changed = replace_site_themes(&pool, SITE, &themes(&["edin", "edin", "karuna"]))
            .await
            .unwrap();
        // karuna inserted, twentyfifteen deleted, edin untouched
        assert_eq!(changed, 2);
        let stored = get_themes_for_site(&pool, SITE).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, edin.id);
        assert!(stored.iter().all(|t| t.local_site_id == Some(SITE) && !t.is_wpcom_theme));
    }

    #[tokio::test]
    async fn activation_is_exclusive_per_site() {
        let pool = setup_pool().await;
        replace_site_themes(&pool, SITE, &themes(&["a", "b"])).await.unwrap();
        replace_site_themes(&pool, LocalId(4), &themes(&["a"])).await.unwrap();
        set_active_theme(&pool, LocalId(4), &ThemeModel::new("a", "A")).await.unwrap();

        set_active_theme(&pool, SITE, &ThemeModel::new("b", "B")).await.unwrap();
        let active = set_active_theme(&pool, SITE, &ThemeModel::new("a", "A")).await.unwrap();
        assert!(active.active);

        let current = get_active_theme_for_site(&pool, SITE).await.unwrap().unwrap();
        assert_eq!(current.theme_id, "a");
        let b = get_installed_theme_by_theme_id(&pool, SITE, "b").await.unwrap().unwrap();
        assert!(!b.active);
        // other sites keep their own active theme
        assert!(get_active_theme_for_site(&pool, LocalId(4)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn site_removal_leaves_wpcom_catalogue() {
        let pool = setup_pool().await;
        replace_wpcom_themes(&pool, &themes(&["a", "b", "c"])).await.unwrap();
        replace_site_themes(&pool, SITE, &themes(&["a"])).await.unwrap();

        assert_eq!(remove_site_themes(&pool, SITE).await.unwrap(), 1);
        assert_eq!(get_wpcom_themes(&pool).await.unwrap().len(), 3);
        let b = get_wpcom_theme_by_theme_id(&pool, "b").await.unwrap().unwrap();
        assert!(b.is_wpcom_theme && b.local_site_id.is_none());

        assert_eq!(remove_theme(&pool, &b).await.unwrap(), 1);
        assert!(get_theme_by_local_id(&pool, b.id.unwrap()).await.unwrap().is_none());
    }
}
