use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ensure_site_cached, record_or_error, require_local_id, rows_or_error};
use crate::action::{
    Action, ActionDomain, ActionId, ActionType, FetchPostsPayload, PostAction, RemotePostPayload,
};
use crate::bus::EventBus;
use crate::db::{self, MergePolicy, Pool};
use crate::dispatcher::ActionHandler;
use crate::error::{SyncError, SyncErrorKind};
use crate::event::{ChangeEvent, OnPostChanged, OnPostResult};
use crate::lock::SiteLocks;
use crate::model::{LocalId, PostModel, RemoteId, SiteModel};
use crate::network::PostClient;

pub struct PostStore {
    pool: Pool,
    client: Arc<dyn PostClient>,
    bus: Arc<EventBus>,
    locks: Arc<SiteLocks>,
}

struct FetchOutcome {
    rows: u64,
    can_load_more: bool,
}

impl PostStore {
    pub fn new(
        pool: Pool,
        client: Arc<dyn PostClient>,
        bus: Arc<EventBus>,
        locks: Arc<SiteLocks>,
    ) -> Self {
        Self {
            pool,
            client,
            bus,
            locks,
        }
    }

    pub async fn get_posts_for_site(&self, site: &SiteModel) -> Result<Vec<PostModel>> {
        match site.id {
            Some(id) => db::post::get_posts_for_site(&self.pool, id).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_pages_for_site(&self, site: &SiteModel) -> Result<Vec<PostModel>> {
        match site.id {
            Some(id) => db::post::get_pages_for_site(&self.pool, id).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_posts_count_for_site(&self, site: &SiteModel) -> Result<i64> {
        match site.id {
            Some(id) => db::post::get_posts_count_for_site(&self.pool, id).await,
            None => Ok(0),
        }
    }

    pub async fn get_pages_count_for_site(&self, site: &SiteModel) -> Result<i64> {
        match site.id {
            Some(id) => db::post::get_pages_count_for_site(&self.pool, id).await,
            None => Ok(0),
        }
    }

    pub async fn get_uploaded_posts_count_for_site(&self, site: &SiteModel) -> Result<i64> {
        match site.id {
            Some(id) => db::post::get_uploaded_posts_count_for_site(&self.pool, id).await,
            None => Ok(0),
        }
    }

    pub async fn get_post_by_local_id(&self, id: LocalId) -> Result<Option<PostModel>> {
        db::post::get_post_by_local_id(&self.pool, id).await
    }

    pub async fn get_post_by_remote_id(
        &self,
        site: &SiteModel,
        remote: RemoteId,
    ) -> Result<Option<PostModel>> {
        match site.id {
            Some(id) => db::post::get_post_by_remote_id(&self.pool, id, remote).await,
            None => Ok(None),
        }
    }

    async fn fetch_posts(&self, payload: &FetchPostsPayload, pages: bool) -> Result<FetchOutcome, SyncError> {
        let site_id = require_local_id(&payload.site)?;
        let offset = if payload.load_more {
            let cached = db::post::get_uploaded_count_for_site(&self.pool, site_id, pages)
                .await
                .map_err(SyncError::storage)?;
            u32::try_from(cached).unwrap_or(u32::MAX)
        } else {
            0
        };
        let page = self.client.fetch_posts(&payload.site, pages, offset).await?;
        let _guard = self.locks.acquire(Some(site_id)).await;
        ensure_site_cached(&self.pool, site_id).await?;
        let rows = db::post::replace_fetched_posts(
            &self.pool,
            site_id,
            pages,
            &page.posts,
            !payload.load_more,
        )
        .await
        .map_err(SyncError::storage)?;
        debug!(site = %site_id, pages, offset, rows, "post page fetched");
        Ok(FetchOutcome {
            rows,
            can_load_more: page.can_load_more,
        })
    }

    async fn fetch_post(&self, payload: &RemotePostPayload) -> Result<u64, SyncError> {
        let site_id = require_local_id(&payload.site)?;
        let remote = payload.post.remote_post_id.ok_or_else(|| {
            SyncError::new(
                SyncErrorKind::Storage,
                "post has no remote id; push it before fetching it",
            )
        })?;
        let fetched = self.client.fetch_post(&payload.site, remote).await?;
        let _guard = self.locks.acquire(Some(site_id)).await;
        ensure_site_cached(&self.pool, site_id).await?;
        let (_, rows) = db::post::store_post(
            &self.pool,
            &PostModel {
                local_site_id: site_id,
                ..fetched
            },
            MergePolicy::Overwrite,
        )
        .await
        .map_err(SyncError::storage)?;
        Ok(rows)
    }

    async fn push_post(&self, payload: &RemotePostPayload) -> Result<PostModel, SyncError> {
        let site_id = require_local_id(&payload.site)?;
        let uploaded = self.client.push_post(&payload.site, &payload.post).await?;
        let merged = PostModel {
            id: payload.post.id,
            local_site_id: site_id,
            is_page: payload.post.is_page,
            is_local_draft: false,
            is_locally_changed: false,
            ..uploaded
        };
        let _guard = self.locks.acquire(Some(site_id)).await;
        ensure_site_cached(&self.pool, site_id).await?;
        let (stored, _) = db::post::store_post(&self.pool, &merged, MergePolicy::Overwrite)
            .await
            .map_err(SyncError::storage)?;
        Ok(stored)
    }

    async fn delete_post(&self, payload: &RemotePostPayload) -> Result<PostModel, SyncError> {
        let site_id = require_local_id(&payload.site)?;
        self.client.delete_post(&payload.site, &payload.post).await?;
        let _guard = self.locks.acquire(Some(site_id)).await;
        db::post::delete_post(&self.pool, &payload.post)
            .await
            .map_err(SyncError::storage)?;
        Ok(payload.post.clone())
    }

    async fn update_post(&self, post: &PostModel) -> Result<u64, SyncError> {
        let _guard = self.locks.acquire(Some(post.local_site_id)).await;
        db::post::insert_or_update_post(&self.pool, Some(post), MergePolicy::Overwrite)
            .await
            .map_err(SyncError::storage)
    }

    async fn remove_post(&self, post: &PostModel) -> Result<u64, SyncError> {
        let _guard = self.locks.acquire(Some(post.local_site_id)).await;
        db::post::delete_post(&self.pool, post)
            .await
            .map_err(SyncError::storage)
    }

    async fn remove_all_posts(&self) -> Result<u64, SyncError> {
        db::post::delete_all_posts(&self.pool)
            .await
            .map_err(SyncError::storage)
    }

    fn changed(origin: ActionType, result: Result<u64, SyncError>) -> ChangeEvent {
        let (rows_affected, error) = rows_or_error(result);
        ChangeEvent::PostChanged(OnPostChanged {
            origin,
            rows_affected,
            can_load_more: false,
            error,
        })
    }
}

#[async_trait]
impl ActionHandler for PostStore {
    fn domain(&self) -> ActionDomain {
        ActionDomain::Post
    }

    async fn handle(&self, id: ActionId, action: Action) {
        let origin = action.action_type();
        let Action::Post(action) = action else {
            warn!(?origin, "post store received a foreign action");
            return;
        };

        let event = match action {
            PostAction::FetchPosts(payload) | PostAction::FetchPages(payload) => {
                let pages = origin == ActionType::FetchPages;
                match self.fetch_posts(&payload, pages).await {
                    Ok(outcome) => ChangeEvent::PostChanged(OnPostChanged {
                        origin,
                        rows_affected: outcome.rows,
                        can_load_more: outcome.can_load_more,
                        error: None,
                    }),
                    Err(err) => Self::changed(origin, Err(err)),
                }
            }
            PostAction::FetchPost(payload) => Self::changed(origin, self.fetch_post(&payload).await),
            PostAction::PushPost(payload) => {
                let result = self.push_post(&payload).await;
                let (post, error) = record_or_error(result, payload.post);
                ChangeEvent::PostUploaded(OnPostResult { origin, post, error })
            }
            PostAction::DeletePost(payload) => {
                let result = self.delete_post(&payload).await;
                let (post, error) = record_or_error(result, payload.post);
                ChangeEvent::PostDeleted(OnPostResult { origin, post, error })
            }
            PostAction::UpdatePost(post) => Self::changed(origin, self.update_post(&post).await),
            PostAction::RemovePost(post) => Self::changed(origin, self.remove_post(&post).await),
            PostAction::RemoveAllPosts => Self::changed(origin, self.remove_all_posts().await),
        };
        self.bus.emit_for(id, event);
    }
}
