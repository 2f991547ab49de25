use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{ensure_site_cached, record_or_error, require_local_id, rows_or_error};
use crate::action::{Action, ActionDomain, ActionId, ActionType, SiteThemePayload, ThemeAction};
use crate::bus::EventBus;
use crate::db::{self, Pool};
use crate::dispatcher::ActionHandler;
use crate::error::SyncError;
use crate::event::{ChangeEvent, OnThemeRemoved, OnThemeResult, OnThemesChanged};
use crate::lock::SiteLocks;
use crate::model::{SiteModel, ThemeModel};
use crate::network::ThemeClient;

pub struct ThemeStore {
    pool: Pool,
    client: Arc<dyn ThemeClient>,
    bus: Arc<EventBus>,
    locks: Arc<SiteLocks>,
}

impl ThemeStore {
    pub fn new(
        pool: Pool,
        client: Arc<dyn ThemeClient>,
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

    pub async fn get_wpcom_themes(&self) -> Result<Vec<ThemeModel>> {
        db::theme::get_wpcom_themes(&self.pool).await
    }

    pub async fn get_wpcom_theme_by_theme_id(&self, theme_id: &str) -> Result<Option<ThemeModel>> {
        db::theme::get_wpcom_theme_by_theme_id(&self.pool, theme_id).await
    }

    /// Empty for a site that was never stored.
    pub async fn get_themes_for_site(&self, site: &SiteModel) -> Result<Vec<ThemeModel>> {
        match site.id {
            Some(id) => db::theme::get_themes_for_site(&self.pool, id).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_active_theme_for_site(&self, site: &SiteModel) -> Result<Option<ThemeModel>> {
        match site.id {
            Some(id) => db::theme::get_active_theme_for_site(&self.pool, id).await,
            None => Ok(None),
        }
    }

    pub async fn get_installed_theme_by_theme_id(
        &self,
        site: &SiteModel,
        theme_id: &str,
    ) -> Result<Option<ThemeModel>> {
        match site.id {
            Some(id) => db::theme::get_installed_theme_by_theme_id(&self.pool, id, theme_id).await,
            None => Ok(None),
        }
    }

    async fn fetch_wpcom_themes(&self) -> Result<u64, SyncError> {
        let themes = self.client.fetch_wpcom_themes().await?;
        let _guard = self.locks.acquire(None).await;
        db::theme::replace_wpcom_themes(&self.pool, &themes)
            .await
            .map_err(SyncError::storage)
    }

    async fn fetch_installed_themes(&self, site: &SiteModel) -> Result<u64, SyncError> {
        let site_id = require_local_id(site)?;
        let themes = self.client.fetch_installed_themes(site).await?;
        let _guard = self.locks.acquire(Some(site_id)).await;
        ensure_site_cached(&self.pool, site_id).await?;
        let changed = db::theme::replace_site_themes(&self.pool, site_id, &themes)
            .await
            .map_err(SyncError::storage)?;
        info!(site = %site_id, fetched = themes.len(), changed, "installed themes fetched");
        Ok(changed)
    }

    async fn fetch_current_theme(&self, site: &SiteModel) -> Result<ThemeModel, SyncError> {
        let site_id = require_local_id(site)?;
        let current = self.client.fetch_current_theme(site).await?;
        let _guard = self.locks.acquire(Some(site_id)).await;
        ensure_site_cached(&self.pool, site_id).await?;
        db::theme::set_active_theme(&self.pool, site_id, &current)
            .await
            .map_err(SyncError::storage)
    }

    async fn activate_theme(&self, payload: &SiteThemePayload) -> Result<ThemeModel, SyncError> {
        let site_id = require_local_id(&payload.site)?;
        let activated = self
            .client
            .activate_theme(&payload.site, &payload.theme)
            .await?;
        let _guard = self.locks.acquire(Some(site_id)).await;
        ensure_site_cached(&self.pool, site_id).await?;
        let stored = db::theme::set_active_theme(&self.pool, site_id, &activated)
            .await
            .map_err(SyncError::storage)?;
        info!(site = %site_id, theme = %stored.theme_id, "theme activated");
        Ok(stored)
    }

    fn ensure_manageable(site: &SiteModel) -> Result<(), SyncError> {
        if site.supports_theme_management() {
            Ok(())
        } else {
            Err(SyncError::capability(format!(
                "themes can only be installed or deleted on Jetpack sites, not {}",
                site.url
            )))
        }
    }

    async fn install_theme(&self, payload: &SiteThemePayload) -> Result<ThemeModel, SyncError> {
        let site_id = require_local_id(&payload.site)?;
        Self::ensure_manageable(&payload.site)?;
        let installed = self
            .client
            .install_theme(&payload.site, &payload.theme)
            .await?;
        let _guard = self.locks.acquire(Some(site_id)).await;
        ensure_site_cached(&self.pool, site_id).await?;
        db::theme::insert_or_update_site_theme(&self.pool, site_id, &installed)
            .await
            .map_err(SyncError::storage)
    }

    async fn delete_theme(&self, payload: &SiteThemePayload) -> Result<ThemeModel, SyncError> {
        let site_id = require_local_id(&payload.site)?;
        Self::ensure_manageable(&payload.site)?;
        let deleted = self
            .client
            .delete_theme(&payload.site, &payload.theme)
            .await?;
        let _guard = self.locks.acquire(Some(site_id)).await;
        db::theme::delete_site_theme(&self.pool, site_id, &payload.theme.theme_id)
            .await
            .map_err(SyncError::storage)?;
        Ok(ThemeModel {
            id: None,
            local_site_id: Some(site_id),
            theme_id: payload.theme.theme_id.clone(),
            ..deleted
        })
    }

    async fn remove_theme(&self, theme: &ThemeModel) -> Result<u64, SyncError> {
        let _guard = self.locks.acquire(theme.local_site_id).await;
        db::theme::remove_theme(&self.pool, theme)
            .await
            .map_err(SyncError::storage)
    }

    async fn remove_site_themes(&self, site: &SiteModel) -> Result<u64, SyncError> {
        let site_id = require_local_id(site)?;
        let _guard = self.locks.acquire(Some(site_id)).await;
        db::theme::remove_site_themes(&self.pool, site_id)
            .await
            .map_err(SyncError::storage)
    }

    fn theme_result(origin: ActionType, payload: SiteThemePayload, result: Result<ThemeModel, SyncError>) -> OnThemeResult {
        let (theme, error) = record_or_error(result, payload.theme);
        OnThemeResult {
            origin,
            site: payload.site,
            theme,
            error,
        }
    }
}

#[async_trait]
impl ActionHandler for ThemeStore {
    fn domain(&self) -> ActionDomain {
        ActionDomain::Theme
    }

    async fn handle(&self, id: ActionId, action: Action) {
        let origin = action.action_type();
        let Action::Theme(action) = action else {
            warn!(?origin, "theme store received a foreign action");
            return;
        };

        let event = match action {
            ThemeAction::FetchWpComThemes => {
                let (rows_affected, error) = rows_or_error(self.fetch_wpcom_themes().await);
                ChangeEvent::WpComThemesChanged(OnThemesChanged {
                    origin,
                    site: None,
                    rows_affected,
                    error,
                })
            }
            ThemeAction::FetchInstalledThemes(site) => {
                let (rows_affected, error) = rows_or_error(self.fetch_installed_themes(&site).await);
                ChangeEvent::SiteThemesChanged(OnThemesChanged {
                    origin,
                    site: Some(site),
                    rows_affected,
                    error,
                })
            }
            ThemeAction::FetchCurrentTheme(site) => {
                let result = self.fetch_current_theme(&site).await;
                let (theme, error) = match result {
                    Ok(theme) => (Some(theme), None),
                    Err(err) => (None, Some(err)),
                };
                ChangeEvent::CurrentThemeFetched(OnThemeResult {
                    origin,
                    site,
                    theme,
                    error,
                })
            }
            ThemeAction::ActivateTheme(payload) => {
                let result = self.activate_theme(&payload).await;
                ChangeEvent::ThemeActivated(Self::theme_result(origin, payload, result))
            }
            ThemeAction::InstallTheme(payload) => {
                let result = self.install_theme(&payload).await;
                ChangeEvent::ThemeInstalled(Self::theme_result(origin, payload, result))
            }
            ThemeAction::DeleteTheme(payload) => {
                let result = self.delete_theme(&payload).await;
                ChangeEvent::ThemeDeleted(Self::theme_result(origin, payload, result))
            }
            ThemeAction::RemoveTheme(theme) => {
                let (_, error) = rows_or_error(self.remove_theme(&theme).await);
                ChangeEvent::ThemeRemoved(OnThemeRemoved {
                    origin,
                    theme,
                    error,
                })
            }
            ThemeAction::RemoveSiteThemes(site) => {
                let (rows_affected, error) = rows_or_error(self.remove_site_themes(&site).await);
                ChangeEvent::SiteThemesChanged(OnThemesChanged {
                    origin,
                    site: Some(site),
                    rows_affected,
                    error,
                })
            }
        };
        self.bus.emit_for(id, event);
    }
}
