use std::{collections::HashMap, fmt, sync::Arc};

use tracing::{debug, warn};

use crate::error::Result;

mod pod;
pub use pod::PodForward;

/// Lifecycle state of a port-forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardState {
    Running,
    Stopped,
}

impl fmt::Display for ForwardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardState::Running => f.write_str("running"),
            ForwardState::Stopped => f.write_str("stopped"),
        }
    }
}

/// A live tunnel to a container port.
pub trait Forwarder: Send + Sync {
    /// Registry key, `namespace/pod/container`.
    fn path(&self) -> &str;

    fn state(&self) -> ForwardState;

    /// Stops forwarding. Stopping a stopped forward does nothing.
    fn stop(&self) -> Result<()>;
}

/// Builds the registry key of a container port-forward.
pub fn forward_path(namespace: &str, pod: &str, container: &str) -> String {
    format!("{namespace}/{pod}/{container}")
}

/// Port-forwards keyed by path.
#[derive(Default)]
pub struct Forwarders(HashMap<String, Arc<dyn Forwarder>>);

impl Forwarders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `fwd` under its path.
    ///
    /// A different forward already registered under that path is stopped
    /// first; a failure to stop it is logged and does not prevent the
    /// registration.
    pub fn register(&mut self, fwd: Arc<dyn Forwarder>) {
        let path = fwd.path().to_string();
        if let Some(prev) = self.0.insert(path.clone(), Arc::clone(&fwd)) {
            if Arc::ptr_eq(&prev, &fwd) {
                return;
            }
            debug!(path = %path, "replacing port-forward");
            if let Err(error) = prev.stop() {
                warn!(%error, path = %path, "failed to stop replaced port-forward");
            }
        }
    }

    /// Stops and removes the forward at `path`, if any.
    pub fn unregister(&mut self, path: &str) -> Result<()> {
        match self.0.remove(path) {
            Some(fwd) => fwd.stop(),
            None => Ok(()),
        }
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<dyn Forwarder>> {
        self.0.get(path).cloned()
    }

    /// Every registered forward, in no particular order.
    pub fn all(&self) -> Vec<Arc<dyn Forwarder>> {
        self.0.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stops and removes every forward.
    ///
    /// All forwards are stopped even if some fail; the first failure is returned.
    pub fn terminate_all(&mut self) -> Result<()> {
        let mut first = None;
        for (path, fwd) in self.0.drain() {
            if let Err(error) = fwd.stop() {
                warn!(%error, path = %path, "failed to stop port-forward");
                first.get_or_insert(error);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
