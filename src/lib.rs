#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use k8s_openapi;
pub use kube;

pub mod alias;
pub mod connection;
pub mod error;
pub mod forward;
pub mod gvr;
pub mod retry;
pub mod scope;
pub mod selector;
pub mod shutdown;
pub mod watch;

#[cfg(test)]
mod testing;

pub use alias::{Alias, aliases, resolve_alias};
pub use connection::{Authorizer, Connection, Dial, KubeConnection};
pub use error::{Error, Result};
pub use forward::{ForwardState, Forwarder, Forwarders, PodForward};
pub use gvr::ResourceIdentity;
pub use scope::ScopeKey;
pub use selector::Selector;
pub use watch::{Factory, Options, ScopeCacheSet, WatchCache};

use kube::config::Kubeconfig;

/// Detects the Kubernetes context based on the provided `context` argument.
///
/// Context determination follows this priority:
/// 1. Uses the context if explicitly specified.
/// 2. Retrieves the current context from the kubeconfig file.
///
/// # Errors
/// Returns an error if the kubeconfig file cannot be read or if no current context is set in the kubeconfig.
pub fn determine_context(context: &Option<String>) -> anyhow::Result<String> {
    match context {
        Some(context) => Ok(context.to_string()),
        _ => {
            let kubeconfig = Kubeconfig::read()?;
            Ok(kubeconfig
                .current_context
                .ok_or_else(|| anyhow::anyhow!("current_context is not set"))?)
        }
    }
}

/// Determines the Kubernetes namespace based on the provided `namespace` and `context`.
///
/// Namespace determination follows this priority:
/// 1. Uses the namespace if explicitly specified.
/// 2. Retrieves the default namespace associated with the current context from kubeconfig.
/// 3. Uses "default".
pub fn determine_namespace(namespace: Option<String>, context: &str) -> String {
    if let Some(ns) = namespace {
        return ns;
    }

    match Kubeconfig::read() {
        Ok(kubeconfig) => namespace_of(&kubeconfig, context),
        Err(_) => String::from("default"),
    }
}

fn namespace_of(kubeconfig: &Kubeconfig, context: &str) -> String {
    kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == context)
        .and_then(|context| {
            context
                .context
                .as_ref()
                .and_then(|ctx| ctx.namespace.clone())
        })
        .unwrap_or_else(|| String::from("default"))
}
