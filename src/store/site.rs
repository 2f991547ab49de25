use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{require_local_id, rows_or_error};
use crate::action::{Action, ActionDomain, ActionId, SiteAction};
use crate::bus::EventBus;
use crate::db::{self, Pool};
use crate::dispatcher::ActionHandler;
use crate::error::SyncError;
use crate::event::{ChangeEvent, OnSitesChanged};
use crate::lock::SiteLocks;
use crate::model::{LocalId, RemoteId, SiteModel};
use crate::network::SiteClient;

pub struct SiteStore {
    pool: Pool,
    client: Arc<dyn SiteClient>,
    bus: Arc<EventBus>,
    locks: Arc<SiteLocks>,
}

impl SiteStore {
    pub fn new(
        pool: Pool,
        client: Arc<dyn SiteClient>,
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

    pub async fn get_sites(&self) -> Result<Vec<SiteModel>> {
        db::site::get_sites(&self.pool).await
    }

    pub async fn get_sites_count(&self) -> Result<i64> {
        db::site::get_sites_count(&self.pool).await
    }

    pub async fn get_jetpack_sites(&self) -> Result<Vec<SiteModel>> {
        db::site::get_jetpack_sites(&self.pool).await
    }

    pub async fn get_site_by_local_id(&self, id: LocalId) -> Result<Option<SiteModel>> {
        db::site::get_site_by_local_id(&self.pool, id).await
    }

    pub async fn get_site_by_remote_id(&self, site_id: RemoteId) -> Result<Option<SiteModel>> {
        db::site::get_site_by_remote_id(&self.pool, site_id).await
    }

    async fn fetch_sites(&self) -> Result<u64, SyncError> {
        let sites = self.client.fetch_sites().await?;
        let _guard = self.locks.acquire(None).await;
        let changed = db::site::insert_or_update_sites(&self.pool, &sites)
            .await
            .map_err(SyncError::storage)?;
        info!(fetched = sites.len(), changed, "sites fetched");
        Ok(changed)
    }

    async fn update_site(&self, site: &SiteModel) -> Result<u64, SyncError> {
        let _guard = self.locks.acquire(site.id).await;
        let (_, changed) = db::site::insert_or_update_site(&self.pool, site)
            .await
            .map_err(SyncError::storage)?;
        Ok(changed)
    }

    async fn remove_site(&self, site: &SiteModel) -> Result<u64, SyncError> {
        let site_id = require_local_id(site)?;
        let _guard = self.locks.acquire(Some(site_id)).await;
        let removed = db::site::delete_site(&self.pool, site_id)
            .await
            .map_err(SyncError::storage)?;
        info!(site = %site_id, removed, "site removed");
        Ok(removed)
    }

    async fn remove_wpcom_and_jetpack_sites(&self) -> Result<u64, SyncError> {
        let _list_guard = self.locks.acquire(None).await;
        let ids = db::site::get_wpcom_and_jetpack_site_ids(&self.pool)
            .await
            .map_err(SyncError::storage)?;
        let _guards = self.locks.acquire_all(&ids).await;
        let removed = db::site::delete_sites(&self.pool, &ids)
            .await
            .map_err(SyncError::storage)?;
        info!(removed, "WordPress.com and Jetpack sites removed");
        Ok(removed)
    }
}

#[async_trait]
impl ActionHandler for SiteStore {
    fn domain(&self) -> ActionDomain {
        ActionDomain::Site
    }

    async fn handle(&self, id: ActionId, action: Action) {
        let origin = action.action_type();
        let Action::Site(action) = action else {
            warn!(?origin, "site store received a foreign action");
            return;
        };

        let event = match action {
            SiteAction::FetchSites => {
                let (rows_affected, error) = rows_or_error(self.fetch_sites().await);
                ChangeEvent::SiteChanged(OnSitesChanged { origin, rows_affected, error })
            }
            SiteAction::UpdateSite(site) => {
                let (rows_affected, error) = rows_or_error(self.update_site(&site).await);
                ChangeEvent::SiteChanged(OnSitesChanged { origin, rows_affected, error })
            }
            SiteAction::RemoveSite(site) => {
                let (rows_affected, error) = rows_or_error(self.remove_site(&site).await);
                ChangeEvent::SiteRemoved(OnSitesChanged { origin, rows_affected, error })
            }
            SiteAction::RemoveWpComAndJetpackSites => {
                let (rows_affected, error) =
                    rows_or_error(self.remove_wpcom_and_jetpack_sites().await);
                ChangeEvent::SiteRemoved(OnSitesChanged { origin, rows_affected, error })
            }
        };
        self.bus.emit_for(id, event);
    }
}
