use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::future::join_all;
use kube::{ResourceExt, api::DynamicObject};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ScopeCacheSet, WatchCache};
use crate::{
    connection::Connection,
    error::{Error, Result},
    forward::{Forwarder, Forwarders},
    gvr::{ResourceIdentity, namespaced},
    scope::ScopeKey,
    selector::{Selector, SelectorExt},
    shutdown::{self, Shutdown, Trigger},
};

/// Interval at which caches relist when no options are given.
pub const DEFAULT_RESYNC: Duration = Duration::from_secs(10 * 60);

/// Resource kinds requested as soon as a scope cache set is created.
pub const WARM_UP: [&str; 4] = [
    "v1/pods",
    "apiextensions.k8s.io/v1/customresourcedefinitions",
    "rbac.authorization.k8s.io/v1/clusterroles",
    "rbac.authorization.k8s.io/v1/roles",
];

/// Factory settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Seconds between full relists of every cache; `0` disables relisting.
    pub resync_secs: u64,
}

impl Options {
    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            resync_secs: DEFAULT_RESYNC.as_secs(),
        }
    }
}

struct State {
    trigger: Trigger,
    scopes: HashMap<ScopeKey, Arc<ScopeCacheSet>>,
    active: Option<ScopeKey>,
}

impl State {
    fn is_cluster_wide(&self) -> bool {
        self.scopes.contains_key(&ScopeKey::AllNamespaces)
    }
}

/// Tracks watch caches per scope and the port-forwards of a session.
///
/// Reads go through an authorization check before touching any cache. Cache
/// sets are created lazily, one per scope; once an all-namespaces set exists
/// every scope is served from it.
///
/// Creating cache sets starts their background synchronization. Kube-backed
/// caches need a tokio runtime for that; without one, creation fails with
/// [`Error::NoRuntime`].
pub struct Factory {
    conn: Arc<dyn Connection>,
    options: Options,
    shutdown: Shutdown,
    state: Mutex<State>,
    forwarders: Mutex<Forwarders>,
}

impl Factory {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self::with_options(conn, Options::default())
    }

    pub fn with_options(conn: Arc<dyn Connection>, options: Options) -> Self {
        let (trigger, shutdown) = shutdown::channel();
        Self {
            conn,
            options,
            shutdown,
            state: Mutex::new(State {
                trigger,
                scopes: HashMap::new(),
                active: None,
            }),
            forwarders: Mutex::new(Forwarders::new()),
        }
    }

    /// Returns the factory connection.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Signal fired on [`Factory::terminate`].
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> MutexGuard<'_, Forwarders> {
        self.forwarders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lists cached objects of `gvr` in scope `ns`.
    ///
    /// The cluster-scoped and all-namespaces scopes list every cached object;
    /// a namespace scope lists that namespace only.
    pub async fn list(
        &self,
        gvr: impl Into<ResourceIdentity>,
        ns: impl Into<ScopeKey>,
        sel: &Selector,
    ) -> Result<Vec<Arc<DynamicObject>>> {
        let (gvr, scope) = (gvr.into(), ns.into());
        self.authorize(&scope, &gvr, "list").await?;

        let cache = self.for_resource(&scope, &gvr)?;
        Ok(cache.list(scope.namespace(), sel))
    }

    /// Gets a cached object of `gvr` by `namespace/name` path.
    ///
    /// Cluster-scoped objects are addressed as `-/name`; bare names are looked
    /// up without namespace.
    pub async fn get(
        &self,
        gvr: impl Into<ResourceIdentity>,
        path: &str,
        sel: &Selector,
    ) -> Result<Arc<DynamicObject>> {
        let gvr = gvr.into();
        let (ns, name) = namespaced(path);
        let scope = ScopeKey::from(ns);
        self.authorize(&scope, &gvr, "get").await?;

        let cache = self.for_resource(&scope, &gvr)?;
        debug!(%gvr, scope = %scope, path, "get");
        cache
            .get(scope.namespace(), &name)
            .filter(|obj| sel.matches(obj.labels()))
            .ok_or(Error::NotFound {
                resource: gvr,
                name: path.to_string(),
            })
    }

    async fn authorize(&self, scope: &ScopeKey, gvr: &ResourceIdentity, verb: &str) -> Result<()> {
        match self.conn.can_i(scope, gvr, &[verb]).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(verb, %gvr, scope = %scope, "access denied");
                Err(Error::AccessDenied {
                    verb: verb.to_string(),
                    scope: scope.clone(),
                    resource: gvr.clone(),
                })
            }
            Err(source) => Err(Error::AuthCheckFailed {
                resource: gvr.clone(),
                source,
            }),
        }
    }

    /// Waits until every owned cache received its initial listing.
    ///
    /// There is no timeout; wrap the call to bound it. Returns `false` if some
    /// cache could not sync, e.g. because the factory was terminated.
    pub async fn wait_for_sync(&self) -> bool {
        let sets: Vec<_> = self.state().scopes.values().cloned().collect();
        let synced = join_all(sets.iter().map(|set| set.wait_for_sync(&self.shutdown))).await;
        synced.iter().all(|caches| caches.values().all(|ok| *ok))
    }

    /// Starts every owned cache set.
    pub fn init(&self) {
        self.start();
    }

    /// Starts background synchronization of every owned cache.
    ///
    /// Already running caches are left alone.
    pub fn start(&self) {
        let sets: Vec<_> = self.state().scopes.values().cloned().collect();
        for set in sets {
            debug!(scope = %set.scope(), "starting cache set");
            if let Err(error) = set.start(&self.shutdown) {
                warn!(%error, scope = %set.scope(), "failed to start cache set");
            }
        }
    }

    /// Stops every cache and port-forward.
    ///
    /// The factory cannot create caches afterwards. Calling it again is a no-op.
    pub fn terminate(&self) {
        let scopes = {
            let mut state = self.state();
            if state.trigger.fire() {
                debug!("cache factory terminated");
            }
            std::mem::take(&mut state.scopes)
        };
        drop(scopes);

        if let Err(error) = self.registry().terminate_all() {
            warn!(%error, "failed to stop port-forwards");
        }
    }

    /// Makes `ns` the active scope, creating its cache set if needed.
    ///
    /// Nothing is created while an all-namespaces cache set exists.
    pub fn set_active(&self, ns: impl Into<ScopeKey>) -> Result<()> {
        let scope = ns.into();
        let mut state = self.state();
        if !state.is_cluster_wide() {
            self.ensure(&mut state, &scope)?;
        }
        state.active = Some(scope);
        Ok(())
    }

    pub fn active(&self) -> Option<ScopeKey> {
        self.state().active.clone()
    }

    pub fn is_cluster_wide(&self) -> bool {
        self.state().is_cluster_wide()
    }

    /// Scopes that currently own a cache set.
    pub fn scopes(&self) -> Vec<ScopeKey> {
        let mut scopes: Vec<_> = self.state().scopes.keys().cloned().collect();
        scopes.sort();
        scopes
    }

    /// Returns the cache set of `scope` without creating it.
    pub fn scope_set(&self, scope: &ScopeKey) -> Option<Arc<ScopeCacheSet>> {
        self.state().scopes.get(scope).cloned()
    }

    /// Returns the cache set serving `scope`, creating, warming and starting it
    /// on first access.
    pub fn ensure_scope(&self, scope: &ScopeKey) -> Result<Arc<ScopeCacheSet>> {
        let mut state = self.state();
        self.ensure(&mut state, scope)
    }

    fn ensure(&self, state: &mut State, scope: &ScopeKey) -> Result<Arc<ScopeCacheSet>> {
        if state.trigger.is_fired() {
            return Err(Error::Terminated);
        }
        let scope = if state.is_cluster_wide() {
            ScopeKey::AllNamespaces
        } else {
            scope.clone()
        };
        if let Some(set) = state.scopes.get(&scope) {
            return Ok(Arc::clone(set));
        }

        let set = Arc::new(ScopeCacheSet::new(
            self.conn.dial()?,
            self.options.resync(),
            scope.clone(),
        ));
        debug!(scope = %scope, "cache set created");
        for gvr in WARM_UP.map(ResourceIdentity::parse) {
            // Kinds that fail to warm up are built on first real access.
            if set.for_resource(&gvr).is_none() {
                debug!(%gvr, scope = %scope, "warm-up skipped");
            }
        }
        set.start(&self.shutdown)?;
        state.scopes.insert(scope, Arc::clone(&set));

        Ok(set)
    }

    /// Returns the started cache of `gvr` serving `scope`.
    ///
    /// A cache whose kind turned out not to be served is dropped and reported
    /// as missing; the next request builds it again.
    pub fn for_resource(
        &self,
        scope: &ScopeKey,
        gvr: &ResourceIdentity,
    ) -> Result<Arc<dyn WatchCache>> {
        let set = self.ensure_scope(scope)?;
        let cache = set
            .for_resource(gvr)
            .ok_or_else(|| Error::CacheNotFound(gvr.clone()))?;
        if !cache.served() {
            set.forget(gvr);
            debug!(%gvr, scope = %set.scope(), "dropped cache of unserved resource");
            return Err(Error::CacheNotFound(gvr.clone()));
        }
        cache.start(&self.shutdown)?;
        Ok(cache)
    }

    /// Requests the cache of `gvr` in `ns` ahead of its first use.
    pub fn preload(&self, ns: impl Into<ScopeKey>, gvr: impl Into<ResourceIdentity>) {
        let (scope, gvr) = (ns.into(), gvr.into());
        if let Err(error) = self.for_resource(&scope, &gvr) {
            debug!(%error, %gvr, scope = %scope, "preload failed");
        }
    }

    /// Logs and returns the scopes owning a cache set.
    pub fn dump(&self) -> Vec<ScopeKey> {
        let scopes = self.scopes();
        for scope in &scopes {
            debug!(scope = %scope, "cache set");
        }
        scopes
    }

    /// Logs and returns the store keys of the cache of `gvr` in `ns`.
    pub fn show(
        &self,
        ns: impl Into<ScopeKey>,
        gvr: impl Into<ResourceIdentity>,
    ) -> Result<Vec<String>> {
        let (scope, gvr) = (ns.into(), gvr.into());
        let mut keys = self.for_resource(&scope, &gvr)?.keys();
        keys.sort();
        for key in &keys {
            debug!(%gvr, scope = %scope, key = %key, "cached");
        }
        Ok(keys)
    }

    /// Registers a port-forward, stopping any other one under the same path.
    pub fn register_forwarder(&self, fwd: Arc<dyn Forwarder>) {
        self.registry().register(fwd);
    }

    /// Stops and forgets the port-forward at `path`.
    pub fn delete_forwarder(&self, path: &str) {
        if let Err(error) = self.registry().unregister(path) {
            warn!(%error, path, "failed to stop port-forward");
        }
    }

    pub fn forwarder_for(&self, path: &str) -> Option<Arc<dyn Forwarder>> {
        self.registry().lookup(path)
    }

    pub fn forwarders(&self) -> Vec<Arc<dyn Forwarder>> {
        self.registry().all()
    }
}

impl Drop for Factory {
    fn drop(&mut self) {
        self.terminate();
    }
}
