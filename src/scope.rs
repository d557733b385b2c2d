use std::fmt;

/// Textual sentinel for the all-namespaces scope.
pub const ALL_NAMESPACES: &str = "";
/// Textual sentinel for cluster-scoped resources.
pub const CLUSTER_SCOPE: &str = "-";

/// Scope over which a cache set is maintained.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKey {
    /// Every namespace, i.e. a cluster-wide cache.
    AllNamespaces,
    /// Resources without a namespace.
    ClusterScoped,
    Namespace(String),
}

impl ScopeKey {
    /// Namespace the scope restricts listings to, if any.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            ScopeKey::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    pub fn is_all_namespaces(&self) -> bool {
        matches!(self, ScopeKey::AllNamespaces)
    }

    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, ScopeKey::ClusterScoped)
    }
}

impl From<&str> for ScopeKey {
    fn from(ns: &str) -> Self {
        match ns {
            ALL_NAMESPACES => ScopeKey::AllNamespaces,
            CLUSTER_SCOPE => ScopeKey::ClusterScoped,
            ns => ScopeKey::Namespace(ns.to_string()),
        }
    }
}

impl From<String> for ScopeKey {
    fn from(ns: String) -> Self {
        match ns.as_str() {
            ALL_NAMESPACES | CLUSTER_SCOPE => ScopeKey::from(ns.as_str()),
            _ => ScopeKey::Namespace(ns),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::AllNamespaces => f.write_str(ALL_NAMESPACES),
            ScopeKey::ClusterScoped => f.write_str(CLUSTER_SCOPE),
            ScopeKey::Namespace(ns) => f.write_str(ns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ScopeKey;

    #[test]
    fn parses_sentinels() {
        assert_eq!(ScopeKey::from(""), ScopeKey::AllNamespaces);
        assert_eq!(ScopeKey::from("-"), ScopeKey::ClusterScoped);
        assert_eq!(
            ScopeKey::from(String::from("default")),
            ScopeKey::Namespace("default".into())
        );
    }

    #[test]
    fn displays_textual_form() {
        assert_eq!(ScopeKey::AllNamespaces.to_string(), "");
        assert_eq!(ScopeKey::ClusterScoped.to_string(), "-");
        assert_eq!(ScopeKey::from("kube-system").to_string(), "kube-system");
        assert_eq!(ScopeKey::from("kube-system").namespace(), Some("kube-system"));
        assert_eq!(ScopeKey::ClusterScoped.namespace(), None);
    }
}
