use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, StreamExt, future::BoxFuture};
use kube::{
    Api, Client, ResourceExt,
    api::{ApiResource, DynamicObject},
    core::GroupVersion,
    discovery::{self, Scope},
    runtime::{
        WatchStreamExt,
        reflector::{ObjectRef, Store, store::Writer},
        watcher,
    },
};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::WatchCache;
use crate::{
    error::{Error, Result},
    gvr::ResourceIdentity,
    retry::{RetryPolicy, retry_with_policy},
    scope::ScopeKey,
    selector::{Selector, SelectorExt},
    shutdown::Shutdown,
};

/// Pause before a watch whose stream ended is rebuilt.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Watch cache mirroring one resource kind with a kube reflector.
///
/// The store is keyed by an `ApiResource` built from the identity alone, so
/// lookups never depend on discovery. Discovery runs in the background task
/// to learn the kind and whether the resource is namespaced.
pub struct ReflectorCache {
    gvr: ResourceIdentity,
    scope: ScopeKey,
    resync: Duration,
    client: Client,
    dyntype: ApiResource,
    store: Store<DynamicObject>,
    writer: Mutex<Option<Writer<DynamicObject>>>,
    served: Arc<AtomicBool>,
}

impl ReflectorCache {
    pub fn new(client: Client, gvr: ResourceIdentity, scope: ScopeKey, resync: Duration) -> Self {
        let dyntype = gvr.to_api_resource();
        let writer = Writer::new(dyntype.clone());
        let store = writer.as_reader();
        Self {
            gvr,
            scope,
            resync,
            client,
            dyntype,
            store,
            writer: Mutex::new(Some(writer)),
            served: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn store(&self) -> &Store<DynamicObject> {
        &self.store
    }
}

impl WatchCache for ReflectorCache {
    fn gvr(&self) -> &ResourceIdentity {
        &self.gvr
    }

    fn start(&self, shutdown: &Shutdown) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let Some(writer) = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };

        debug!(gvr = %self.gvr, scope = %self.scope, "starting watch cache");
        runtime.spawn(sync(
            self.client.clone(),
            self.gvr.clone(),
            self.scope.clone(),
            self.resync,
            writer,
            self.served.clone(),
            shutdown.clone(),
        ));
        Ok(())
    }

    fn served(&self) -> bool {
        self.served.load(Ordering::Acquire)
    }

    fn wait_for_sync(&self, shutdown: &Shutdown) -> BoxFuture<'static, bool> {
        let store = self.store.clone();
        let shutdown = shutdown.clone();
        async move {
            tokio::select! {
                ready = store.wait_until_ready() => ready.is_ok(),
                _ = shutdown.signaled() => false,
            }
        }
        .boxed()
    }

    fn list(&self, namespace: Option<&str>, selector: &Selector) -> Vec<Arc<DynamicObject>> {
        self.store
            .state()
            .into_iter()
            .filter(|obj| namespace.is_none() || obj.namespace().as_deref() == namespace)
            .filter(|obj| selector.matches(obj.labels()))
            .collect()
    }

    fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<DynamicObject>> {
        let mut key = ObjectRef::new_with(name, self.dyntype.clone());
        if let Some(ns) = namespace {
            key = key.within(ns);
        }
        self.store.get(&key)
    }

    fn keys(&self) -> Vec<String> {
        self.store
            .state()
            .iter()
            .map(|obj| match obj.namespace() {
                Some(ns) => format!("{ns}/{}", obj.name_any()),
                None => obj.name_any(),
            })
            .collect()
    }
}

/// Resolves the watch api for `gvr`, consulting discovery for kind and scope.
async fn resolve_api(
    client: &Client,
    gvr: &ResourceIdentity,
    scope: &ScopeKey,
) -> Result<Option<Api<DynamicObject>>, kube::Error> {
    let gv = GroupVersion::gv(&gvr.group, &gvr.version);
    let group = discovery::pinned_group(client, &gv).await?;
    let found = group
        .versioned_resources(&gvr.version)
        .into_iter()
        .find(|(ar, _)| ar.plural == gvr.resource);

    Ok(found.map(|(ar, caps)| match (caps.scope, scope.namespace()) {
        (Scope::Namespaced, Some(ns)) => Api::namespaced_with(client.clone(), ns, &ar),
        _ => Api::all_with(client.clone(), &ar),
    }))
}

/// Runs discovery until it answers; transient failures are retried with backoff.
///
/// `None` means the cluster does not serve the kind, or refused to describe it.
async fn discover(
    client: &Client,
    gvr: &ResourceIdentity,
    scope: &ScopeKey,
) -> Option<Api<DynamicObject>> {
    let policy = RetryPolicy::persistent();
    match retry_with_policy(&policy, || resolve_api(client, gvr, scope)).await {
        Ok(Some(api)) => Some(api),
        Ok(None) => {
            warn!(%gvr, "resource is not served by the cluster");
            None
        }
        Err(error) => {
            warn!(%error, %gvr, "discovery failed");
            None
        }
    }
}

/// Feeds the store until shutdown, relisting every `resync` interval.
async fn sync(
    client: Client,
    gvr: ResourceIdentity,
    scope: ScopeKey,
    resync: Duration,
    mut writer: Writer<DynamicObject>,
    served: Arc<AtomicBool>,
    shutdown: Shutdown,
) {
    let api = tokio::select! {
        api = discover(&client, &gvr, &scope) => api,
        _ = shutdown.clone().signaled() => return,
    };
    let Some(api) = api else {
        // Dropping the writer releases every sync waiter.
        served.store(false, Ordering::Release);
        return;
    };

    loop {
        let mut events = watcher(api.clone(), watcher::Config::default())
            .default_backoff()
            .boxed();
        let resync_after = async {
            if resync.is_zero() {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(resync).await;
        };
        tokio::pin!(resync_after);

        loop {
            tokio::select! {
                _ = shutdown.clone().signaled() => {
                    debug!(%gvr, scope = %scope, "watch cache stopped");
                    return;
                }
                _ = &mut resync_after => {
                    debug!(%gvr, scope = %scope, "resyncing");
                    break;
                }
                event = events.next() => match event {
                    Some(Ok(event)) => writer.apply_watcher_event(&event),
                    Some(Err(error)) => warn!(%error, %gvr, "watch failed"),
                    None => {
                        debug!(%gvr, scope = %scope, "watch stream ended, restarting");
                        tokio::select! {
                            _ = tokio::time::sleep(RESTART_DELAY) => break,
                            _ = shutdown.clone().signaled() => return,
                        }
                    }
                },
            }
        }
    }
}
