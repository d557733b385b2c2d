use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;

use crate::{
    error::{BoxError, Result},
    gvr::ResourceIdentity,
    scope::ScopeKey,
    watch::WatchCache,
};

mod client;
pub use client::{KubeConnection, KubeDial};

/// Checks what the current user can or cannot do to a resource.
pub trait Authorizer: Send + Sync {
    /// Returns `Ok(true)` if the user may perform every verb on `gvr` in `scope`.
    ///
    /// Verbs are checked in order and checking stops at the first denied verb.
    /// A failure to complete the check is an `Err`, never a denial.
    fn can_i<'a>(
        &'a self,
        scope: &'a ScopeKey,
        gvr: &'a ResourceIdentity,
        verbs: &'a [&'a str],
    ) -> BoxFuture<'a, Result<bool, BoxError>>;
}

/// Connection to an api server.
pub trait Connection: Authorizer {
    /// Returns a handle used to build watch caches.
    fn dial(&self) -> Result<Arc<dyn Dial>>;
}

/// Builds watch caches against a dialed api server.
pub trait Dial: Send + Sync {
    /// Builds a not yet started watch cache for `gvr` in `scope`.
    ///
    /// Returns `None` when no cache can be built for the identity.
    fn watch_cache(
        &self,
        gvr: &ResourceIdentity,
        scope: &ScopeKey,
        resync: Duration,
    ) -> Option<Arc<dyn WatchCache>>;
}
