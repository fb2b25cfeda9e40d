use std::sync::Arc;

use control_plane::{
    AuthorityResource, InMemoryPolicyStore, IntervalUnit, IpListEntry, IpListKind, PolicyStore,
    PolicyTables, RateLimitBinding, ResolveError, ResolverSettings, RouteFilter, RouteResolver,
    RouteRule, RouteTarget, StoreError,
};

fn route(route_id: i64, service_id: &str, path: &str, url: Option<&str>) -> RouteRule {
    RouteRule {
        route_id,
        route_name: service_id.to_string(),
        service_id: Some(service_id.to_string()),
        url: url.map(str::to_string),
        path: path.to_string(),
        strip_prefix: 1,
        retryable: false,
        persist: false,
        status: 1,
    }
}

fn binding(api_id: i64, service_id: &str, path: &str, quota: i64, unit: &str) -> RateLimitBinding {
    RateLimitBinding {
        policy_id: 100,
        policy_name: "default".to_string(),
        limit_quota: quota,
        interval_unit: unit.to_string(),
        api_id,
        api_code: format!("api-{api_id}"),
        api_name: format!("API {api_id}"),
        api_category: "default".to_string(),
        service_id: service_id.to_string(),
        path: path.to_string(),
        url: None,
    }
}

fn resolver(tables: PolicyTables) -> RouteResolver {
    RouteResolver::new(InMemoryPolicyStore::shared(tables), ResolverSettings::default())
}

struct UnavailableStore;

impl PolicyStore for UnavailableStore {
    fn load_active_routes(&self) -> Result<Vec<RouteRule>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn load_rate_limit_bindings(&self) -> Result<Vec<RateLimitBinding>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn load_authority_resources(&self) -> Result<Vec<AuthorityResource>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn load_ip_list(&self, _kind: IpListKind) -> Result<Vec<IpListEntry>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[test]
fn rate_limited_entries_come_before_generic_routes() {
    let resolution = resolver(PolicyTables {
        routes: vec![
            route(1, "svc1", "/svc1/**", None),
            route(2, "svc2", "/svc2/**", Some("http://10.0.0.1:8080")),
        ],
        rate_limit_bindings: vec![binding(10, "svc1", "/users", 120, "minutes")],
        ..PolicyTables::default()
    })
    .load_routes();

    assert!(!resolution.is_degraded());
    let routes = resolution.value();
    assert_eq!(routes.len(), 3);

    let limited = &routes[0];
    assert_eq!(limited.id, "10");
    assert_eq!(limited.order, 0);
    assert_eq!(limited.predicate.pattern, "/svc1/users");
    assert!(limited.predicate.rate_limited);
    assert_eq!(limited.uri(), "lb://svc1");
    assert_eq!(
        limited.filters,
        vec![
            RouteFilter::StripPrefix { parts: 1 },
            RouteFilter::RequestRateLimiter {
                replenish_rate: 2,
                burst_capacity: 4,
                key_resolver: "path".to_string(),
            },
        ]
    );
    let meta = limited.rate_limit.as_ref().expect("rate limit meta");
    assert_eq!(meta.interval_unit, IntervalUnit::Minutes);
    assert_eq!(meta.ttl_seconds, 130);

    assert_eq!(routes[1].predicate.pattern, "/svc1/**");
    assert_eq!(routes[1].filters, vec![RouteFilter::StripPrefix { parts: 1 }]);
    assert!(routes[1].rate_limit.is_none());
    assert_eq!(routes[2].uri(), "http://10.0.0.1:8080");
    assert_eq!(
        routes.iter().map(|route| route.order).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
}

#[test]
fn binding_url_overrides_load_balancing() {
    let mut explicit = binding(10, "svc1", "/users", 60, "seconds");
    explicit.url = Some("http://upstream:9000".to_string());
    let resolution = resolver(PolicyTables {
        rate_limit_bindings: vec![explicit],
        ..PolicyTables::default()
    })
    .load_routes();

    let route = &resolution.value()[0];
    assert_eq!(
        route.target,
        RouteTarget::Url {
            url: "http://upstream:9000".to_string()
        }
    );
    // no route for svc1, so the api path is used as is
    assert_eq!(route.predicate.pattern, "/users");
}

#[test]
fn unsupported_unit_skips_only_that_binding() {
    let resolution = resolver(PolicyTables {
        routes: vec![route(1, "svc1", "/svc1/**", None)],
        rate_limit_bindings: vec![
            binding(10, "svc1", "/users", 120, "fortnights"),
            binding(11, "svc1", "/orders", 120, "hours"),
        ],
        ..PolicyTables::default()
    })
    .load_routes();

    assert!(!resolution.is_degraded());
    assert_eq!(
        resolution.skipped(),
        &[ResolveError::UnsupportedIntervalUnit("fortnights".to_string())]
    );
    let ids: Vec<&str> = resolution.value().iter().map(|route| route.id.as_str()).collect();
    assert_eq!(ids, vec!["11", "svc1"]);
}

#[test]
fn generic_route_already_claimed_by_binding_is_not_duplicated() {
    let resolution = resolver(PolicyTables {
        routes: vec![
            route(1, "svc1", "/svc1/**", None),
            route(2, "svc2", "/svc2/**", None),
        ],
        rate_limit_bindings: vec![binding(10, "svc1", "/**", 600, "minutes")],
        ..PolicyTables::default()
    })
    .load_routes();

    let patterns: Vec<&str> = resolution
        .value()
        .iter()
        .map(|route| route.predicate.pattern.as_str())
        .collect();
    assert_eq!(patterns, vec!["/svc1/**", "/svc2/**"]);
    assert!(resolution.value()[0].rate_limit.is_some());
}

#[test]
fn store_failure_degrades_to_no_routes() {
    let resolver = RouteResolver::new(Arc::new(UnavailableStore), ResolverSettings::default());
    let resolution = resolver.load_routes();
    assert!(resolution.is_degraded());
    assert!(resolution.value().is_empty());
    assert!(matches!(
        resolution.error(),
        Some(ResolveError::StoreUnavailable(_))
    ));
}

#[test]
fn loading_twice_yields_the_same_routes() {
    let resolver = resolver(PolicyTables {
        routes: vec![route(1, "svc1", "/svc1/**", None)],
        rate_limit_bindings: vec![binding(10, "svc1", "/users", 120, "minutes")],
        ..PolicyTables::default()
    });
    assert_eq!(
        resolver.load_routes().into_value(),
        resolver.load_routes().into_value()
    );
}

#[test]
fn key_resolver_comes_from_settings() {
    let store = InMemoryPolicyStore::shared(PolicyTables {
        rate_limit_bindings: vec![binding(10, "svc1", "/users", 120, "minutes")],
        ..PolicyTables::default()
    });
    let settings = ResolverSettings {
        key_resolver: "remote-addr".to_string(),
    };
    let routes = RouteResolver::new(store, settings).load_routes().into_value();
    let params = routes[0].filters[1].parameters();
    assert_eq!(params.get("key_resolver").map(String::as_str), Some("remote-addr"));
    assert_eq!(params.get("replenish_rate").map(String::as_str), Some("2"));
    assert_eq!(params.get("burst_capacity").map(String::as_str), Some("4"));
}

#[test]
fn filters_serialize_with_their_name() {
    let filter = RouteFilter::RequestRateLimiter {
        replenish_rate: 1,
        burst_capacity: 2,
        key_resolver: "path".to_string(),
    };
    let value = serde_json::to_value(&filter).expect("json");
    assert_eq!(value["name"], "RequestRateLimiter");
    assert_eq!(value["burst_capacity"], 2);
    assert_eq!(filter.name(), "RequestRateLimiter");
}
