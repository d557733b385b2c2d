//! Fakes of the connection, watch cache and port-forward collaborators.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use kube::{
    ResourceExt,
    api::{DynamicObject, ObjectMeta},
};

use crate::{
    connection::{Authorizer, Connection, Dial},
    error::{BoxError, Error, Result},
    forward::{ForwardState, Forwarder},
    gvr::ResourceIdentity,
    scope::ScopeKey,
    selector::{Selector, SelectorExt},
    shutdown::Shutdown,
    watch::WatchCache,
};

pub fn object(ns: Option<&str>, name: &str, labels: &[(&str, &str)]) -> DynamicObject {
    DynamicObject {
        types: None,
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: ns.map(str::to_string),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        },
        data: serde_json::Value::Null,
    }
}

pub struct FakeCache {
    gvr: ResourceIdentity,
    objects: Vec<Arc<DynamicObject>>,
    sync_delay: Duration,
    served: bool,
    start_fails: bool,
    started: AtomicUsize,
    synced: Arc<AtomicBool>,
    queries: AtomicUsize,
}

impl FakeCache {
    pub fn starts(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

impl WatchCache for FakeCache {
    fn gvr(&self) -> &ResourceIdentity {
        &self.gvr
    }

    fn start(&self, _shutdown: &Shutdown) -> Result<()> {
        if self.start_fails {
            return Err(Error::NoRuntime);
        }
        let _ = self
            .started
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst);
        Ok(())
    }

    fn served(&self) -> bool {
        self.served
    }

    fn wait_for_sync(&self, shutdown: &Shutdown) -> BoxFuture<'static, bool> {
        let (delay, synced, shutdown) = (self.sync_delay, self.synced.clone(), shutdown.clone());
        async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    synced.store(true, Ordering::SeqCst);
                    true
                }
                _ = shutdown.signaled() => false,
            }
        }
        .boxed()
    }

    fn list(&self, namespace: Option<&str>, selector: &Selector) -> Vec<Arc<DynamicObject>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.objects
            .iter()
            .filter(|obj| namespace.is_none() || obj.namespace().as_deref() == namespace)
            .filter(|obj| selector.matches(obj.labels()))
            .cloned()
            .collect()
    }

    fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<DynamicObject>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.objects
            .iter()
            .find(|obj| obj.namespace().as_deref() == namespace && obj.name_any() == name)
            .cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.objects
            .iter()
            .map(|obj| match obj.namespace() {
                Some(ns) => format!("{ns}/{}", obj.name_any()),
                None => obj.name_any(),
            })
            .collect()
    }
}

/// Builds [`FakeCache`]s and remembers every one of them.
#[derive(Default)]
pub struct FakeDial {
    objects: HashMap<ResourceIdentity, Vec<Arc<DynamicObject>>>,
    delays: HashMap<ScopeKey, Duration>,
    unserved: Vec<ResourceIdentity>,
    start_fails: bool,
    built: Mutex<Vec<(ScopeKey, Arc<FakeCache>)>>,
}

impl FakeDial {
    pub fn with_object(mut self, gvr: &str, obj: DynamicObject) -> Self {
        self.objects
            .entry(ResourceIdentity::parse(gvr))
            .or_default()
            .push(Arc::new(obj));
        self
    }

    pub fn with_sync_delay(mut self, scope: ScopeKey, delay: Duration) -> Self {
        self.delays.insert(scope, delay);
        self
    }

    /// Caches built for `gvr` report the kind as not served.
    pub fn with_unserved(mut self, gvr: &str) -> Self {
        self.unserved.push(ResourceIdentity::parse(gvr));
        self
    }

    /// Caches fail to start as if no runtime were running.
    pub fn with_failing_start(mut self) -> Self {
        self.start_fails = true;
        self
    }

    /// Number of caches built so far.
    pub fn built(&self) -> usize {
        self.built.lock().unwrap().len()
    }

    pub fn cache(&self, scope: &ScopeKey, gvr: &ResourceIdentity) -> Option<Arc<FakeCache>> {
        self.built
            .lock()
            .unwrap()
            .iter()
            .find(|(s, cache)| s == scope && cache.gvr() == gvr)
            .map(|(_, cache)| cache.clone())
    }

    pub fn caches(&self, scope: &ScopeKey) -> Vec<Arc<FakeCache>> {
        self.built
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == scope)
            .map(|(_, cache)| cache.clone())
            .collect()
    }

    /// Store queries across every cache.
    pub fn queries(&self) -> usize {
        self.built
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cache)| cache.queries())
            .sum()
    }
}

impl Dial for FakeDial {
    fn watch_cache(
        &self,
        gvr: &ResourceIdentity,
        scope: &ScopeKey,
        _resync: Duration,
    ) -> Option<Arc<dyn WatchCache>> {
        if !gvr.is_complete() {
            return None;
        }
        let cache = Arc::new(FakeCache {
            gvr: gvr.clone(),
            objects: self.objects.get(gvr).cloned().unwrap_or_default(),
            sync_delay: self.delays.get(scope).copied().unwrap_or_default(),
            served: !self.unserved.contains(gvr),
            start_fails: self.start_fails,
            started: AtomicUsize::new(0),
            synced: Arc::new(AtomicBool::new(false)),
            queries: AtomicUsize::new(0),
        });
        self.built.lock().unwrap().push((scope.clone(), cache.clone()));
        Some(cache)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
    Fail,
}

pub struct FakeConnection {
    dial: Arc<FakeDial>,
    access: Mutex<Access>,
    dial_fails: AtomicBool,
    dials: AtomicUsize,
    checks: Mutex<Vec<(ScopeKey, ResourceIdentity, Vec<String>)>>,
}

impl FakeConnection {
    pub fn new(dial: FakeDial) -> Self {
        Self {
            dial: Arc::new(dial),
            access: Mutex::new(Access::Allow),
            dial_fails: AtomicBool::new(false),
            dials: AtomicUsize::new(0),
            checks: Mutex::new(Vec::new()),
        }
    }

    pub fn set_access(&self, access: Access) {
        *self.access.lock().unwrap() = access;
    }

    pub fn fail_dial(&self) {
        self.dial_fails.store(true, Ordering::SeqCst);
    }

    pub fn fake_dial(&self) -> &FakeDial {
        &self.dial
    }

    /// Number of scope cache sets dialed for.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> Vec<(ScopeKey, ResourceIdentity, Vec<String>)> {
        self.checks.lock().unwrap().clone()
    }
}

impl Authorizer for FakeConnection {
    fn can_i<'a>(
        &'a self,
        scope: &'a ScopeKey,
        gvr: &'a ResourceIdentity,
        verbs: &'a [&'a str],
    ) -> BoxFuture<'a, Result<bool, BoxError>> {
        self.checks.lock().unwrap().push((
            scope.clone(),
            gvr.clone(),
            verbs.iter().map(|v| v.to_string()).collect(),
        ));
        let access = *self.access.lock().unwrap();
        async move {
            match access {
                Access::Allow => Ok(true),
                Access::Deny => Ok(false),
                Access::Fail => Err("connection refused".into()),
            }
        }
        .boxed()
    }
}

impl Connection for FakeConnection {
    fn dial(&self) -> Result<Arc<dyn Dial>> {
        if self.dial_fails.load(Ordering::SeqCst) {
            return Err(Error::Dial("no route to host".into()));
        }
        self.dials.fetch_add(1, Ordering::SeqCst);
        Ok(self.dial.clone())
    }
}

pub struct FakeForwarder {
    path: String,
    stopped: AtomicBool,
    stops: AtomicUsize,
    fails: bool,
}

impl FakeForwarder {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            stopped: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
            fails: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fails = true;
        self
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Forwarder for FakeForwarder {
    fn path(&self) -> &str {
        &self.path
    }

    fn state(&self) -> ForwardState {
        if self.stopped.load(Ordering::SeqCst) {
            ForwardState::Stopped
        } else {
            ForwardState::Running
        }
    }

    fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        if self.fails {
            return Err(Error::Forward {
                path: self.path.clone(),
                source: "tunnel closed".into(),
            });
        }
        Ok(())
    }
}
