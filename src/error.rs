use crate::{gvr::ResourceIdentity, scope::ScopeKey};

/// Boxed error reported by collaborators (authorizers, dialers, forwarders).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("user has insufficient access to {verb} {resource} in scope {scope:?}")]
    AccessDenied {
        verb: String,
        scope: ScopeKey,
        resource: ResourceIdentity,
    },

    #[error("failed to check access to {resource}")]
    AuthCheckFailed {
        resource: ResourceIdentity,
        #[source]
        source: BoxError,
    },

    #[error("no resource cache for {0}")]
    CacheNotFound(ResourceIdentity),

    #[error("{resource} {name:?} not found")]
    NotFound {
        resource: ResourceIdentity,
        name: String,
    },

    #[error("unable to connect to api server")]
    Dial(#[source] BoxError),

    #[error("cache factory has been terminated")]
    Terminated,

    #[error("watch caches must be started within a tokio runtime")]
    NoRuntime,

    #[error("port-forward {path} failed")]
    Forward {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Kube(#[from] kube::Error),
}
