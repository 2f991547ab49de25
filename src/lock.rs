use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::LocalId;

/// Keyed async lock serializing cache writes per site.
///
/// One instance is shared by every store, so purging a site waits for any
/// theme or post reconciliation of that site and vice versa. `None` keys the
/// site-independent collections (e.g. the WordPress.com theme catalogue).
#[derive(Debug, Default)]
pub struct SiteLocks {
    locks: Mutex<HashMap<Option<LocalId>, Arc<AsyncMutex<()>>>>,
}

impl SiteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, site: Option<LocalId>) -> OwnedMutexGuard<()> {
        self.lock_for(site).lock_owned().await
    }

    /// Locks several sites at once, always in ascending id order.
    pub async fn acquire_all(&self, sites: &[LocalId]) -> Vec<OwnedMutexGuard<()>> {
        let mut sites = sites.to_vec();
        sites.sort();
        sites.dedup();
        let mut guards = Vec::with_capacity(sites.len());
        for site in sites {
            guards.push(self.acquire(Some(site)).await);
        }
        guards
    }

    fn lock_for(&self, site: Option<LocalId>) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Entries nobody holds or waits on are dropped so removed sites do not linger.
        locks.retain(|key, lock| *key == site || Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(site).or_default())
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_site_is_serialized() {
        let locks = Arc::new(SiteLocks::new());
        let guard = locks.acquire(Some(LocalId(1))).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire(Some(LocalId(1))).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // Other sites and the global collection are independent.
        let _other = locks.acquire(Some(LocalId(2))).await;
        let _global = locks.acquire(None).await;

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = SiteLocks::new();
        for id in 1..=5 {
            let _g = locks.acquire(Some(LocalId(id))).await;
        }
        let held = locks.acquire(Some(LocalId(7))).await;
        assert_eq!(locks.tracked(), 1);

        let _other = locks.acquire(Some(LocalId(8))).await;
        assert_eq!(locks.tracked(), 2);
        drop(held);
    }

    #[tokio::test]
    async fn acquire_all_blocks_single_site_writers() {
        let locks = Arc::new(SiteLocks::new());
        let guards = locks.acquire_all(&[LocalId(3), LocalId(1), LocalId(3)]).await;
        assert_eq!(guards.len(), 2);

        let writer = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire(Some(LocalId(3))).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        drop(guards);
        tokio::time::timeout(Duration::from_secs(5), writer)
            .await
            .unwrap()
            .unwrap();
    }
}
