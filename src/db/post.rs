use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, instrument};

use super::Pool;
use crate::model::{LocalId, PostModel, RemoteId};

/// How an incoming remote post is merged into an existing cached one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    Overwrite,
    /// Cached posts flagged `is_locally_changed` are left untouched.
    KeepLocalChanges,
}

const POST_COLUMNS: &str = "id, local_site_id, remote_post_id, title, content, excerpt, status, \
                            date_created, is_page, is_local_draft, is_locally_changed";

fn post_from_row(row: &SqliteRow) -> Result<PostModel> {
    Ok(PostModel {
        id: Some(LocalId(row.try_get("id")?)),
        local_site_id: LocalId(row.try_get("local_site_id")?),
        remote_post_id: row.try_get::<Option<i64>, _>("remote_post_id")?.map(RemoteId),
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        excerpt: row.try_get("excerpt")?,
        status: row.try_get("status")?,
        date_created: row.try_get("date_created")?,
        is_page: row.try_get("is_page")?,
        is_local_draft: row.try_get("is_local_draft")?,
        is_locally_changed: row.try_get("is_locally_changed")?,
    })
}

async fn find_existing(conn: &mut SqliteConnection, post: &PostModel) -> Result<Option<PostModel>> {
    let row = if let Some(id) = post.id {
        sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await?
    } else if let Some(remote) = post.remote_post_id {
        sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE local_site_id = ? AND remote_post_id = ? \
             ORDER BY id LIMIT 1"
        ))
        .bind(post.local_site_id.0)
        .bind(remote.0)
        .fetch_optional(&mut *conn)
        .await?
    } else {
        None
    };
    row.as_ref().map(post_from_row).transpose()
}

async fn insert_post(conn: &mut SqliteConnection, post: &PostModel) -> Result<PostModel> {
    let id: i64 = sqlx::query(
        "INSERT INTO posts (local_site_id, remote_post_id, title, content, excerpt, status, \
         date_created, is_page, is_local_draft, is_locally_changed) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(post.local_site_id.0)
    .bind(post.remote_post_id.map(|r| r.0))
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.excerpt)
    .bind(&post.status)
    .bind(&post.date_created)
    .bind(post.is_page)
    .bind(post.is_local_draft)
    .bind(post.is_locally_changed)
    .fetch_one(&mut *conn)
    .await?
    .get("id");
    Ok(PostModel {
        id: Some(LocalId(id)),
        ..post.clone()
    })
}

pub(crate) async fn upsert_post(
    conn: &mut SqliteConnection,
    post: &PostModel,
    policy: MergePolicy,
) -> Result<(PostModel, u64)> {
    let Some(existing) = find_existing(conn, post).await? else {
        return Ok((insert_post(conn, post).await?, 1));
    };
    if policy == MergePolicy::KeepLocalChanges && existing.is_locally_changed {
        return Ok((existing, 0));
    }
    let incoming = PostModel {
        id: existing.id,
        ..post.clone()
    };
    if incoming.same_content(&existing) {
        return Ok((existing, 0));
    }
    let id = existing.id.context("stored post without id")?;
    let res = sqlx::query(
        "UPDATE posts SET local_site_id = ?, remote_post_id = ?, title = ?, content = ?, excerpt = ?, \
         status = ?, date_created = ?, is_page = ?, is_local_draft = ?, is_locally_changed = ? \
         WHERE id = ?",
    )
    .bind(incoming.local_site_id.0)
    .bind(incoming.remote_post_id.map(|r| r.0))
    .bind(&incoming.title)
    .bind(&incoming.content)
    .bind(&incoming.excerpt)
    .bind(&incoming.status)
    .bind(&incoming.date_created)
    .bind(incoming.is_page)
    .bind(incoming.is_local_draft)
    .bind(incoming.is_locally_changed)
    .bind(id.0)
    .execute(&mut *conn)
    .await?;
    Ok((incoming, res.rows_affected()))
}

/// Always inserts a new row and returns the post with its local id set.
#[instrument(skip_all)]
pub async fn insert_post_for_result(pool: &Pool, post: &PostModel) -> Result<PostModel> {
    let mut conn = pool.acquire().await?;
    insert_post(&mut conn, post).await.context("failed to insert post")
}

/// Matches on local id, else on remote id within the site. `None` is a no-op.
/// Returns the number of rows changed.
#[instrument(skip_all)]
pub async fn insert_or_update_post(
    pool: &Pool,
    post: Option<&PostModel>,
    policy: MergePolicy,
) -> Result<u64> {
    let Some(post) = post else {
        return Ok(0);
    };
    let (_, rows) = store_post(pool, post, policy).await?;
    Ok(rows)
}

/// Like [`insert_or_update_post`], also returning the post as cached afterwards.
#[instrument(skip_all)]
pub async fn store_post(pool: &Pool, post: &PostModel, policy: MergePolicy) -> Result<(PostModel, u64)> {
    let mut tx = pool.begin().await?;
    let result = upsert_post(&mut tx, post, policy)
        .await
        .context("failed to store post")?;
    tx.commit().await?;
    Ok(result)
}

/// Reconciles one fetched page of posts (or pages) for a site. When `first_page`
/// is set, uploaded posts without local changes are dropped first so that posts
/// deleted remotely disappear. Returns the number of rows changed.
#[instrument(skip_all)]
pub async fn replace_fetched_posts(
    pool: &Pool,
    site: LocalId,
    pages: bool,
    posts: &[PostModel],
    first_page: bool,
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    if first_page {
        delete_uploaded(&mut tx, site, pages).await?;
    }
    let mut changed = 0;
    for post in posts {
        let post = PostModel {
            local_site_id: site,
            is_page: pages,
            ..post.clone()
        };
        let (_, rows) = upsert_post(&mut tx, &post, MergePolicy::KeepLocalChanges)
            .await
            .with_context(|| format!("failed to store fetched post {:?}", post.remote_post_id))?;
        changed += rows;
    }
    tx.commit().await?;
    debug!(site = %site, pages, fetched = posts.len(), changed, "posts reconciled");
    Ok(changed)
}

async fn delete_uploaded(conn: &mut SqliteConnection, site: LocalId, pages: bool) -> Result<u64> {
    let res = sqlx::query(
        "DELETE FROM posts WHERE local_site_id = ? AND is_page = ? \
         AND is_local_draft = 0 AND is_locally_changed = 0",
    )
    .bind(site.0)
    .bind(pages)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected())
}

/// Removes uploaded posts (or pages) of a site, keeping local drafts and local changes.
#[instrument(skip_all)]
pub async fn delete_uploaded_posts_for_site(pool: &Pool, site: LocalId, pages: bool) -> Result<u64> {
    let mut conn = pool.acquire().await?;
    delete_uploaded(&mut conn, site, pages).await
}

#[instrument(skip_all)]
pub async fn delete_post(pool: &Pool, post: &PostModel) -> Result<u64> {
    let res = match (post.id, post.remote_post_id) {
        (Some(id), _) => {
            sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id.0)
                .execute(pool)
                .await?
        }
        (None, Some(remote)) => {
            sqlx::query("DELETE FROM posts WHERE local_site_id = ? AND remote_post_id = ?")
                .bind(post.local_site_id.0)
                .bind(remote.0)
                .execute(pool)
                .await?
        }
        (None, None) => return Ok(0),
    };
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn delete_all_posts(pool: &Pool) -> Result<u64> {
    let res = sqlx::query("DELETE FROM posts").execute(pool).await?;
    Ok(res.rows_affected())
}

async fn list_for_site(pool: &Pool, site: LocalId, pages: bool) -> Result<Vec<PostModel>> {
    let rows = sqlx::query(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE local_site_id = ? AND is_page = ? ORDER BY id"
    ))
    .bind(site.0)
    .bind(pages)
    .fetch_all(pool)
    .await?;
    rows.iter().map(post_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_posts_for_site(pool: &Pool, site: LocalId) -> Result<Vec<PostModel>> {
    list_for_site(pool, site, false).await
}

#[instrument(skip_all)]
pub async fn get_pages_for_site(pool: &Pool, site: LocalId) -> Result<Vec<PostModel>> {
    list_for_site(pool, site, true).await
}

async fn count_for_site(pool: &Pool, site: LocalId, pages: bool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE local_site_id = ? AND is_page = ?")
        .bind(site.0)
        .bind(pages)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn get_posts_count_for_site(pool: &Pool, site: LocalId) -> Result<i64> {
    count_for_site(pool, site, false).await
}

#[instrument(skip_all)]
pub async fn get_pages_count_for_site(pool: &Pool, site: LocalId) -> Result<i64> {
    count_for_site(pool, site, true).await
}

/// Uploaded posts (or pages) of a site: everything except local drafts.
#[instrument(skip_all)]
pub async fn get_uploaded_count_for_site(pool: &Pool, site: LocalId, pages: bool) -> Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM posts WHERE local_site_id = ? AND is_page = ? AND is_local_draft = 0",
    )
    .bind(site.0)
    .bind(pages)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn get_uploaded_posts_count_for_site(pool: &Pool, site: LocalId) -> Result<i64> {
    get_uploaded_count_for_site(pool, site, false).await
}

#[instrument(skip_all)]
pub async fn get_posts_count(pool: &Pool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn get_post_by_local_id(pool: &Pool, id: LocalId) -> Result<Option<PostModel>> {
    let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(post_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn get_post_by_remote_id(
    pool: &Pool,
    site: LocalId,
    remote: RemoteId,
) -> Result<Option<PostModel>> {
    let row = sqlx::query(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE local_site_id = ? AND remote_post_id = ? ORDER BY id LIMIT 1"
    ))
    .bind(site.0)
    .bind(remote.0)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(post_from_row).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_pool;

    fn remote_post(site: i64, remote: i64, title: &str) -> PostModel {
        PostModel {
            remote_post_id: Some(RemoteId(remote)),
            title: title.into(),
            status: "publish".into(),
            ..PostModel::new(LocalId(site))
        }
    }

    #[tokio::test]
    async fn first_page_replaces_uploaded_posts_only() {
        let pool = setup_pool().await;
        let site = LocalId(6);
        replace_fetched_posts(&pool, site, false, &[remote_post(6, 1, "one"), remote_post(6, 2, "two")], true)
            .await
            .unwrap();
        let mut draft = PostModel::new(site);
        draft.is_local_draft = true;
        insert_post_for_result(&pool, &draft).await.unwrap();
        let mut page = remote_post(6, 9, "a page");
        page.is_page = true;
        insert_post_for_result(&pool, &page).await.unwrap();

        let changed = replace_fetched_posts(&pool, site, false, &[remote_post(6, 3, "three")], true)
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let posts = get_posts_for_site(&pool, site).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().any(|p| p.is_local_draft));
        assert_eq!(get_pages_count_for_site(&pool, site).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn load_more_keeps_previous_page() {
        let pool = setup_pool().await;
        let site = LocalId(6);
        replace_fetched_posts(&pool, site, false, &[remote_post(6, 1, "one")], true)
            .await
            .unwrap();
        replace_fetched_posts(&pool, site, false, &[remote_post(6, 2, "two")], false)
            .await
            .unwrap();
        assert_eq!(get_uploaded_posts_count_for_site(&pool, site).await.unwrap(), 2);
        let two = get_post_by_remote_id(&pool, site, RemoteId(2)).await.unwrap().unwrap();
        assert_eq!(two.title, "two");
    }
}
