use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::future::BoxFuture;
use k8s_openapi::api::{
    authorization::v1::{ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec},
    core::v1::Namespace,
};
use kube::{
    Api, Client, Config,
    api::{ListParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
};
use tracing::{debug, warn};

use super::{Authorizer, Connection, Dial};
use crate::{
    error::{BoxError, Error, Result},
    gvr::ResourceIdentity,
    retry::{ApiRetryExt, RetryPolicy},
    scope::ScopeKey,
    watch::{ReflectorCache, WatchCache},
};

/// Connection to the api server described by a kubeconfig context.
///
/// The client is built on first dial and reused afterwards.
pub struct KubeConnection {
    config: Config,
    client: Mutex<Option<Client>>,
    retry: RetryPolicy,
}

impl KubeConnection {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: Mutex::new(None),
            retry: RetryPolicy::default(),
        }
    }

    /// Connects to the cluster of the inferred default configuration.
    pub async fn try_default() -> Result<Self> {
        let config = Config::infer().await.map_err(|e| Error::Dial(e.into()))?;
        Ok(Self::new(config))
    }

    /// Connects to the cluster of a kubeconfig context.
    ///
    /// When `context` is `None`, the current context of the kubeconfig is used.
    pub async fn from_context(context: Option<String>) -> Result<Self> {
        let context = crate::determine_context(&context).map_err(|e| Error::Dial(e.into()))?;
        let kubeconfig = Kubeconfig::read().map_err(|e| Error::Dial(e.into()))?;
        let options = KubeConfigOptions {
            context: Some(context),
            ..Default::default()
        };
        let config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| Error::Dial(e.into()))?;
        Ok(Self::new(config))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the api client, building it on first use.
    pub fn client(&self) -> Result<Client> {
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = client.as_ref() {
            return Ok(client.clone());
        }
        let built = Client::try_from(self.config.clone()).map_err(|e| Error::Dial(e.into()))?;
        *client = Some(built.clone());
        Ok(built)
    }

    /// Drops the cached client so the next dial reconnects.
    pub fn reset(&self) {
        *self.client.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Lists the names of every namespace of the cluster.
    pub async fn valid_namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client()?);
        let list = api
            .list_with_retry(self.retry, &ListParams::default())
            .await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn review(
        &self,
        scope: &ScopeKey,
        gvr: &ResourceIdentity,
        verbs: &[&str],
    ) -> Result<bool, BoxError> {
        debug!(scope = %scope, %gvr, ?verbs, "checking access");
        let api: Api<SelfSubjectAccessReview> = Api::all(self.client()?);
        let mut attributes = access_attributes(scope, gvr);

        for verb in verbs {
            attributes.verb = Some(verb.to_string());
            let review = SelfSubjectAccessReview {
                spec: SelfSubjectAccessReviewSpec {
                    resource_attributes: Some(attributes.clone()),
                    ..Default::default()
                },
                ..Default::default()
            };
            let resp = api
                .create_with_retry(self.retry, &PostParams::default(), &review)
                .await
                .inspect_err(|error| warn!(%error, "access review failed"))?;
            let allowed = resp.status.is_some_and(|status| status.allowed);
            if !allowed {
                debug!(verb, %gvr, "access denied");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Review attributes for `gvr` in `scope`; both sentinels review cluster-wide.
fn access_attributes(scope: &ScopeKey, gvr: &ResourceIdentity) -> ResourceAttributes {
    ResourceAttributes {
        namespace: scope.namespace().map(str::to_string),
        group: Some(gvr.group.clone()),
        version: Some(gvr.version.clone()),
        resource: Some(gvr.resource.clone()),
        ..Default::default()
    }
}

impl Authorizer for KubeConnection {
    fn can_i<'a>(
        &'a self,
        scope: &'a ScopeKey,
        gvr: &'a ResourceIdentity,
        verbs: &'a [&'a str],
    ) -> BoxFuture<'a, Result<bool, BoxError>> {
        Box::pin(self.review(scope, gvr, verbs))
    }
}

impl Connection for KubeConnection {
    fn dial(&self) -> Result<Arc<dyn Dial>> {
        Ok(Arc::new(KubeDial::new(self.client()?)))
    }
}

/// Builds reflector-backed caches with a kube client.
#[derive(Clone)]
pub struct KubeDial {
    client: Client,
}

impl KubeDial {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Dial for KubeDial {
    fn watch_cache(
        &self,
        gvr: &ResourceIdentity,
        scope: &ScopeKey,
        resync: Duration,
    ) -> Option<Arc<dyn WatchCache>> {
        if !gvr.is_complete() {
            return None;
        }
        Some(Arc::new(ReflectorCache::new(
            self.client.clone(),
            gvr.clone(),
            scope.clone(),
            resync,
        )))
    }
}
