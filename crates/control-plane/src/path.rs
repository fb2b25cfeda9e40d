use std::collections::HashMap;

use tracing::warn;

use crate::error::ResolveError;
use crate::model::RouteRule;

const WILDCARD_SUFFIX: &str = "/**";

pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Resolves `relative_path` of `service_id` into the gateway's public path
/// space, using the first active route registered for that service.
///
/// A path that already sits under the route prefix is returned unchanged,
/// which keeps resolution idempotent. The cost is that an api path which
/// itself starts with the prefix is not prefixed again: `/admin/user`
/// under `/admin/**` stays `/admin/user`, not `/admin/admin/user`.
pub fn resolve_full_path(routes: &[RouteRule], service_id: &str, relative_path: &str) -> String {
    let normalized = normalize_path(relative_path);
    match routes.iter().find(|route| route.serves(service_id)) {
        Some(route) => compose(&route.path, normalized),
        None => normalized,
    }
}

fn route_prefix(pattern: &str) -> &str {
    pattern
        .strip_suffix(WILDCARD_SUFFIX)
        .unwrap_or(pattern)
        .trim_end_matches('/')
}

fn compose(pattern: &str, normalized: String) -> String {
    let prefix = route_prefix(pattern);
    if prefix.is_empty() {
        return normalized;
    }
    // already inside the route's public space
    if normalized == prefix
        || normalized
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
    {
        return normalized;
    }
    format!("{prefix}{normalized}")
}

/// Route set indexed by service id, built once per refresh cycle.
#[derive(Clone, Debug, Default)]
pub struct PathComposer {
    patterns: HashMap<String, String>,
    ambiguities: Vec<ResolveError>,
}

impl PathComposer {
    pub fn new(routes: &[RouteRule]) -> Self {
        let mut patterns: HashMap<String, String> = HashMap::new();
        let mut kept_names: HashMap<String, String> = HashMap::new();
        let mut ambiguities = Vec::new();

        for route in routes.iter().filter(|route| route.is_active()) {
            let Some(service_id) = route.service_id.as_deref() else {
                continue;
            };
            match patterns.get(service_id) {
                None => {
                    patterns.insert(service_id.to_string(), route.path.clone());
                    kept_names.insert(service_id.to_string(), route.route_name.clone());
                }
                Some(existing) if existing != &route.path => {
                    let err = ResolveError::AmbiguousRouteMapping {
                        service_id: service_id.to_string(),
                        kept: kept_names.get(service_id).cloned().unwrap_or_default(),
                        ignored: route.route_name.clone(),
                    };
                    warn!(service_id, error = %err, "ambiguous route mapping");
                    ambiguities.push(err);
                }
                Some(_) => {}
            }
        }

        Self {
            patterns,
            ambiguities,
        }
    }

    pub fn full_path(&self, service_id: &str, relative_path: &str) -> String {
        let normalized = normalize_path(relative_path);
        match self.patterns.get(service_id) {
            Some(pattern) => compose(pattern, normalized),
            None => normalized,
        }
    }

    pub fn ambiguities(&self) -> &[ResolveError] {
        &self.ambiguities
    }
}
