use std::sync::Arc;

use futures::future::BoxFuture;
use kube::api::DynamicObject;

use crate::{error::Result, gvr::ResourceIdentity, selector::Selector, shutdown::Shutdown};

mod factory;
mod reflector;
mod scope_set;

pub use factory::{DEFAULT_RESYNC, Factory, Options, WARM_UP};
pub use reflector::ReflectorCache;
pub use scope_set::ScopeCacheSet;

/// A live local mirror of one resource kind in one scope.
pub trait WatchCache: Send + Sync {
    fn gvr(&self) -> &ResourceIdentity;

    /// Starts background synchronization until `shutdown` fires.
    ///
    /// Starting an already started cache does nothing. Kube-backed caches fail
    /// with [`Error::NoRuntime`](crate::Error::NoRuntime) outside a tokio runtime.
    fn start(&self, shutdown: &Shutdown) -> Result<()>;

    /// Whether the cluster serves this kind.
    ///
    /// Turns `false` once discovery reports the kind as missing or refuses it;
    /// such a cache never syncs and should be rebuilt.
    fn served(&self) -> bool;

    /// Resolves once the initial listing has been received.
    ///
    /// Resolves to `false` if `shutdown` fires first or synchronization ended
    /// without ever completing.
    fn wait_for_sync(&self, shutdown: &Shutdown) -> BoxFuture<'static, bool>;

    /// Lists cached objects, restricted to `namespace` when given.
    fn list(&self, namespace: Option<&str>, selector: &Selector) -> Vec<Arc<DynamicObject>>;

    /// Looks up a cached object by namespace and name.
    fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<DynamicObject>>;

    /// Store keys (`namespace/name`, or `name` for cluster-scoped objects).
    fn keys(&self) -> Vec<String>;
}
