use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::future::join_all;
use tracing::debug;

use super::WatchCache;
use crate::{
    connection::Dial, error::Result, gvr::ResourceIdentity, scope::ScopeKey, shutdown::Shutdown,
};

/// Watch caches of one scope, one per requested resource kind.
pub struct ScopeCacheSet {
    scope: ScopeKey,
    resync: Duration,
    dial: Arc<dyn Dial>,
    caches: Mutex<HashMap<ResourceIdentity, Arc<dyn WatchCache>>>,
}

impl ScopeCacheSet {
    pub fn new(dial: Arc<dyn Dial>, resync: Duration, scope: ScopeKey) -> Self {
        Self {
            scope,
            resync,
            dial,
            caches: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    pub fn resync(&self) -> Duration {
        self.resync
    }

    fn caches(&self) -> MutexGuard<'_, HashMap<ResourceIdentity, Arc<dyn WatchCache>>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cache for `gvr`, building it on first request.
    ///
    /// Newly built caches are not started; see [`ScopeCacheSet::start`].
    pub fn for_resource(&self, gvr: &ResourceIdentity) -> Option<Arc<dyn WatchCache>> {
        let mut caches = self.caches();
        if let Some(cache) = caches.get(gvr) {
            return Some(Arc::clone(cache));
        }

        let cache = self.dial.watch_cache(gvr, &self.scope, self.resync)?;
        debug!(%gvr, scope = %self.scope, "watch cache created");
        caches.insert(gvr.clone(), Arc::clone(&cache));
        Some(cache)
    }

    /// Returns the cache for `gvr` without building it.
    pub fn cache(&self, gvr: &ResourceIdentity) -> Option<Arc<dyn WatchCache>> {
        self.caches().get(gvr).cloned()
    }

    /// Drops the cache for `gvr`; the next request builds a fresh one.
    pub fn forget(&self, gvr: &ResourceIdentity) -> Option<Arc<dyn WatchCache>> {
        self.caches().remove(gvr)
    }

    pub fn resources(&self) -> Vec<ResourceIdentity> {
        self.caches().keys().cloned().collect()
    }

    /// Starts every cache that has not been started yet.
    ///
    /// Stops at the first cache that fails to start.
    pub fn start(&self, shutdown: &Shutdown) -> Result<()> {
        let caches: Vec<_> = self.caches().values().cloned().collect();
        for cache in caches {
            cache.start(shutdown)?;
        }
        Ok(())
    }

    /// Waits until every owned cache received its initial listing.
    pub async fn wait_for_sync(&self, shutdown: &Shutdown) -> HashMap<ResourceIdentity, bool> {
        let pending: Vec<_> = self
            .caches()
            .iter()
            .map(|(gvr, cache)| (gvr.clone(), cache.wait_for_sync(shutdown)))
            .collect();

        let (gvrs, syncs): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        gvrs.into_iter().zip(join_all(syncs).await).collect()
    }
}

impl fmt::Debug for ScopeCacheSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeCacheSet")
            .field("scope", &self.scope)
            .field("resync", &self.resync)
            .field("resources", &self.resources())
            .finish()
    }
}
