use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResource;

use crate::gvr::ResourceIdentity;

/// A discovered resource and the commands that refer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub gvr: ResourceIdentity,
    pub aliases: Vec<String>,
}

/// Identity of a discovered API resource.
///
/// Discovery reports the core group either empty or as `core`; both map to
/// the empty group.
pub fn identity_of(api_resource: &APIResource) -> ResourceIdentity {
    let group = match api_resource.group.as_deref() {
        Some("core") | None => "",
        Some(group) => group,
    };
    ResourceIdentity::new(
        group,
        api_resource.version.as_deref().unwrap_or_default(),
        &api_resource.name,
    )
}

/// Checks if the given `api_resource` matches the `target` resource name.
/// Matching is done against the resource's name, singular name, short names, and group-qualified name.
pub fn resource_matches_target(target: &str, api_resource: &APIResource) -> bool {
    api_resource.name == target
        || api_resource.singular_name == target
        || api_resource
            .short_names
            .as_ref()
            .is_some_and(|short_names| short_names.iter().any(|name| name == target))
        || api_resource
            .group
            .as_ref()
            .is_some_and(|group| format!("{}.{}", api_resource.name, group) == target)
}

/// Resolve a command such as `po` or `deploy` into a resource identity.
pub fn resolve_alias(target: &str, api_resources: &[APIResource]) -> Option<ResourceIdentity> {
    api_resources
        .iter()
        .filter(|api_resource| !is_subresource(api_resource))
        .find(|api_resource| resource_matches_target(target, api_resource))
        .map(identity_of)
}

/// Lists every discovered resource with its aliases, sorted by identity.
pub fn aliases(api_resources: &[APIResource]) -> Vec<Alias> {
    let mut aliases: Vec<Alias> = api_resources
        .iter()
        .filter(|api_resource| !is_subresource(api_resource))
        .map(|api_resource| {
            let mut names = vec![api_resource.name.clone()];
            if !api_resource.singular_name.is_empty() {
                names.push(api_resource.singular_name.clone());
            }
            names.extend(api_resource.short_names.iter().flatten().cloned());
            if let Some(group) = api_resource.group.as_deref().filter(|g| !g.is_empty()) {
                names.push(format!("{}.{}", api_resource.name, group));
            }
            let mut seen = std::collections::HashSet::new();
            names.retain(|name| seen.insert(name.clone()));

            Alias {
                gvr: identity_of(api_resource),
                aliases: names,
            }
        })
        .collect();
    aliases.sort_by(|a, b| a.gvr.cmp(&b.gvr));
    aliases
}

fn is_subresource(api_resource: &APIResource) -> bool {
    api_resource.name.contains('/')
}
