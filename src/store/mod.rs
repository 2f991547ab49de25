//! Stores own one domain each: they handle its actions, reconcile the local
//! cache with client results and emit change-events.
//!
//! Failed actions emit exactly one event with `error` set. Cache writes only
//! happen after the client call succeeded, inside one transaction, so a
//! failure leaves the cache as it was.
//!
//! All stores share one [`SiteLocks`](crate::lock::SiteLocks). Site-scoped
//! writes take the site's lock and then check the site is still cached, so a
//! site removed while a request was in flight does not get records back.

pub mod post;
pub mod site;
pub mod theme;

pub use post::PostStore;
pub use site::SiteStore;
pub use theme::ThemeStore;

use crate::db::{self, Pool};
use crate::error::{SyncError, SyncErrorKind};
use crate::model::{LocalId, SiteModel};

pub(crate) fn require_local_id(site: &SiteModel) -> Result<LocalId, SyncError> {
    site.id.ok_or_else(|| {
        SyncError::new(
            SyncErrorKind::Storage,
            format!("site {} has not been stored locally", site.url),
        )
    })
}

/// Call with the site's lock held.
pub(crate) async fn ensure_site_cached(pool: &Pool, site: LocalId) -> Result<(), SyncError> {
    if db::site::site_exists(pool, site)
        .await
        .map_err(SyncError::storage)?
    {
        Ok(())
    } else {
        Err(SyncError::new(
            SyncErrorKind::Storage,
            format!("site {site} was removed from the cache, result discarded"),
        ))
    }
}

pub(crate) fn rows_or_error(result: Result<u64, SyncError>) -> (u64, Option<SyncError>) {
    match result {
        Ok(rows) => (rows, None),
        Err(err) => (0, Some(err)),
    }
}

/// On failure the event still carries `fallback` so subscribers know which record failed.
pub(crate) fn record_or_error<T>(result: Result<T, SyncError>, fallback: T) -> (Option<T>, Option<SyncError>) {
    match result {
        Ok(record) => (Some(record), None),
        Err(err) => (Some(fallback), Some(err)),
    }
}
