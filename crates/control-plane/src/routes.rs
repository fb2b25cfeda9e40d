use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ResolverSettings;
use crate::error::ResolveError;
use crate::model::{RateLimitBinding, RouteRule};
use crate::outcome::Resolution;
use crate::path::PathComposer;
use crate::rate_limit::{IntervalUnit, TokenBucket};
use crate::repository::PolicyStore;

const LOAD_BALANCED_SCHEME: &str = "lb://";
const STRIP_PREFIX_PARTS: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteTarget {
    LoadBalanced { service_id: String },
    Url { url: String },
}

impl RouteTarget {
    /// Literal url when one is configured, the load-balanced service otherwise.
    pub fn select(url: Option<&str>, service_id: &str) -> Self {
        match url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => RouteTarget::Url {
                url: url.to_string(),
            },
            None => RouteTarget::LoadBalanced {
                service_id: service_id.to_string(),
            },
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::LoadBalanced { service_id } => {
                write!(f, "{LOAD_BALANCED_SCHEME}{service_id}")
            }
            RouteTarget::Url { url } => f.write_str(url),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum RouteFilter {
    StripPrefix {
        parts: u32,
    },
    RequestRateLimiter {
        replenish_rate: u64,
        burst_capacity: u64,
        key_resolver: String,
    },
}

impl RouteFilter {
    pub fn name(&self) -> &'static str {
        match self {
            RouteFilter::StripPrefix { .. } => "StripPrefix",
            RouteFilter::RequestRateLimiter { .. } => "RequestRateLimiter",
        }
    }

    pub fn parameters(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        match self {
            RouteFilter::StripPrefix { parts } => {
                params.insert("parts".to_string(), parts.to_string());
            }
            RouteFilter::RequestRateLimiter {
                replenish_rate,
                burst_capacity,
                key_resolver,
            } => {
                params.insert("replenish_rate".to_string(), replenish_rate.to_string());
                params.insert("burst_capacity".to_string(), burst_capacity.to_string());
                params.insert("key_resolver".to_string(), key_resolver.clone());
            }
        }
        params
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPredicate {
    pub pattern: String,
    pub name: String,
    pub rate_limited: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitMeta {
    pub policy_id: i64,
    pub policy_name: String,
    pub api_code: String,
    pub api_category: String,
    pub interval_unit: IntervalUnit,
    pub quota: u64,
    pub bucket: TokenBucket,
    pub ttl_seconds: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRoute {
    pub id: String,
    /// Evaluation rank; lower is matched first.
    pub order: usize,
    pub predicate: PathPredicate,
    pub target: RouteTarget,
    pub filters: Vec<RouteFilter>,
    pub rate_limit: Option<RateLimitMeta>,
    pub retryable: bool,
}

impl ResolvedRoute {
    pub fn uri(&self) -> String {
        self.target.to_string()
    }
}

pub struct RouteResolver {
    store: Arc<dyn PolicyStore>,
    settings: ResolverSettings,
}

impl RouteResolver {
    pub fn new(store: Arc<dyn PolicyStore>, settings: ResolverSettings) -> Self {
        Self { store, settings }
    }

    pub fn load_routes(&self) -> Resolution<Vec<ResolvedRoute>> {
        let rules = match self.store.load_active_routes() {
            Ok(rules) => rules,
            Err(err) => {
                warn!(error = %err, "loading routes failed");
                return Resolution::degraded(err.into());
            }
        };
        let composer = PathComposer::new(&rules);
        self.load_routes_with(&rules, &composer)
    }

    /// Route pass against an already-read route set.
    pub(crate) fn load_routes_with(
        &self,
        rules: &[RouteRule],
        composer: &PathComposer,
    ) -> Resolution<Vec<ResolvedRoute>> {
        let bindings = match self.store.load_rate_limit_bindings() {
            Ok(bindings) => bindings,
            Err(err) => {
                warn!(error = %err, "loading rate limit bindings failed");
                return Resolution::degraded(err.into());
            }
        };
        resolve_routes(rules, &bindings, composer, &self.settings)
    }
}

/// Emits one entry per rate-limited binding followed by one per active
/// route whose pattern no rate-limited entry already claims.
pub fn resolve_routes(
    rules: &[RouteRule],
    bindings: &[RateLimitBinding],
    composer: &PathComposer,
    settings: &ResolverSettings,
) -> Resolution<Vec<ResolvedRoute>> {
    let mut routes = Vec::with_capacity(bindings.len() + rules.len());
    let mut skipped = Vec::new();

    for binding in bindings {
        match rate_limited_route(binding, composer, settings, routes.len()) {
            Ok(route) => routes.push(route),
            Err(err) => {
                warn!(
                    api_id = binding.api_id,
                    policy_id = binding.policy_id,
                    error = %err,
                    "skipping rate limit binding"
                );
                skipped.push(err);
            }
        }
    }
    let limited = routes.len();

    let claimed: HashSet<String> = routes
        .iter()
        .map(|route| route.predicate.pattern.clone())
        .collect();
    for rule in rules.iter().filter(|rule| rule.is_active()) {
        if claimed.contains(&rule.path) {
            continue;
        }
        let order = routes.len();
        routes.push(generic_route(rule, order));
    }

    info!(
        rate_limited = limited,
        generic = routes.len() - limited,
        skipped = skipped.len(),
        "resolved routes"
    );
    Resolution::loaded(routes).with_skipped(skipped)
}

fn rate_limited_route(
    binding: &RateLimitBinding,
    composer: &PathComposer,
    settings: &ResolverSettings,
    order: usize,
) -> Result<ResolvedRoute, ResolveError> {
    let unit: IntervalUnit = binding.interval_unit.parse()?;
    let quota = binding.limit_quota.max(0) as u64;
    let bucket = TokenBucket::for_quota(unit, quota);
    let full_path = composer.full_path(&binding.service_id, &binding.path);

    Ok(ResolvedRoute {
        id: binding.api_id.to_string(),
        order,
        predicate: PathPredicate {
            pattern: full_path,
            name: binding.api_name.clone(),
            rate_limited: true,
        },
        target: RouteTarget::select(binding.url.as_deref(), &binding.service_id),
        filters: vec![
            RouteFilter::StripPrefix {
                parts: STRIP_PREFIX_PARTS,
            },
            RouteFilter::RequestRateLimiter {
                replenish_rate: bucket.replenish_rate,
                burst_capacity: bucket.burst_capacity,
                key_resolver: settings.key_resolver.clone(),
            },
        ],
        rate_limit: Some(RateLimitMeta {
            policy_id: binding.policy_id,
            policy_name: binding.policy_name.clone(),
            api_code: binding.api_code.clone(),
            api_category: binding.api_category.clone(),
            interval_unit: unit,
            quota,
            bucket,
            ttl_seconds: unit.ttl_seconds(),
        }),
        retryable: false,
    })
}

fn generic_route(rule: &RouteRule, order: usize) -> ResolvedRoute {
    let name = if rule.route_name.trim().is_empty() {
        rule.route_id.to_string()
    } else {
        rule.route_name.clone()
    };
    let service_id = rule.service_id.as_deref().unwrap_or_default();

    ResolvedRoute {
        id: name.clone(),
        order,
        predicate: PathPredicate {
            pattern: rule.path.clone(),
            name,
            rate_limited: false,
        },
        target: RouteTarget::select(rule.url.as_deref(), service_id),
        filters: vec![RouteFilter::StripPrefix {
            parts: STRIP_PREFIX_PARTS,
        }],
        rate_limit: None,
        retryable: rule.retryable,
    }
}
