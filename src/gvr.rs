use std::fmt;

use kube::{api::ApiResource, core::GroupVersionKind};
use tracing::trace;

/// Group, version and plural resource name identifying a class of objects.
///
/// The textual form is `<group>/<version>/<resource>`, or `<version>/<resource>`
/// for the core group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl ResourceIdentity {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// Parse a textual resource identifier.
    ///
    /// Never fails. Identifiers with fewer than three segments get an empty
    /// group prepended; whatever is still missing stays empty, so an unknown
    /// combination only fails once it is used against the cluster.
    pub fn parse(gvr: &str) -> Self {
        trace!(gvr, "resolving resource identity");
        let mut tokens: Vec<&str> = gvr.split('/').collect();
        if tokens.len() < 3 {
            tokens.insert(0, "");
        }
        let token = |i: usize| tokens.get(i).copied().unwrap_or_default().to_string();

        Self {
            group: token(0),
            version: token(1),
            resource: token(2),
        }
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Whether the identity names something that could exist on a cluster.
    pub fn is_complete(&self) -> bool {
        !self.version.is_empty() && !self.resource.is_empty()
    }

    /// Build a kube `ApiResource` for this identity.
    ///
    /// The kind is unknown until discovery runs, so it is left empty; list and
    /// watch URLs only need the group, version and plural.
    pub fn to_api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, "");
        ApiResource::from_gvk_with_plural(&gvk, &self.resource)
    }
}

impl From<&str> for ResourceIdentity {
    fn from(gvr: &str) -> Self {
        Self::parse(gvr)
    }
}

impl From<&ApiResource> for ResourceIdentity {
    fn from(ar: &ApiResource) -> Self {
        Self::new(&ar.group, &ar.version, &ar.plural)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// Split a `namespace/name` path.
///
/// Everything before the last `/` is the namespace, with separators trimmed
/// from both ends. A path without separator is a bare name.
pub fn namespaced(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(idx) => (
            path[..idx].trim_matches('/').to_string(),
            path[idx + 1..].to_string(),
        ),
        None => (String::new(), path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ResourceIdentity, namespaced};

    #[test]
    fn parses_grouped_identity() {
        assert_eq!(
            ResourceIdentity::parse("apps/v1/deployments"),
            ResourceIdentity::new("apps", "v1", "deployments")
        );
    }

    #[test]
    fn parses_core_identity() {
        let gvr = ResourceIdentity::parse("v1/pods");
        assert_eq!(gvr, ResourceIdentity::new("", "v1", "pods"));
        assert_eq!(gvr.api_version(), "v1");
        assert_eq!(gvr.to_string(), "v1/pods");
    }

    #[test]
    fn degrades_malformed_identity() {
        let gvr = ResourceIdentity::parse("pods");
        assert_eq!(gvr, ResourceIdentity::new("", "pods", ""));
        assert!(!gvr.is_complete());

        let gvr = ResourceIdentity::parse("");
        assert_eq!(gvr, ResourceIdentity::default());

        let gvr = ResourceIdentity::parse("a/b/c/d");
        assert_eq!(gvr, ResourceIdentity::new("a", "b", "c"));
    }

    #[test]
    fn round_trips_display() {
        let gvr = ResourceIdentity::parse("rbac.authorization.k8s.io/v1/roles");
        assert_eq!(gvr.to_string(), "rbac.authorization.k8s.io/v1/roles");
        assert_eq!(ResourceIdentity::from(&gvr.to_api_resource()), gvr);
    }

    #[test]
    fn splits_paths() {
        assert_eq!(
            namespaced("default/pod-abc"),
            ("default".to_string(), "pod-abc".to_string())
        );
        assert_eq!(namespaced("pod-abc"), (String::new(), "pod-abc".to_string()));
        assert_eq!(
            namespaced("/kube-system//coredns"),
            ("kube-system".to_string(), "coredns".to_string())
        );
        assert_eq!(namespaced("-/admin"), ("-".to_string(), "admin".to_string()));
    }
}
