use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use control_plane::{
    open_store, IpListKind, PolicyStore, RefreshCoordinator, ResolverSettings, RouteFilter,
    SqlitePolicyStore, StoreError, SystemConfigLoader,
};

const SEED: &str = "
INSERT INTO gateway_route
    (route_id, route_name, path, service_id, url, strip_prefix, retryable, is_persist, status)
VALUES
    (1, 'svc1', '/svc1/**', 'svc1', NULL, 1, 0, 0, 1),
    (2, 'svc2', '/svc2/**', 'svc2', 'http://10.0.0.2:8080', 1, 1, 0, 1),
    (3, 'old', '/old/**', 'old', NULL, 1, 0, 0, 0);
INSERT INTO base_api (api_id, api_code, api_name, api_category, service_id, path) VALUES
    (10, 'users', 'List users', 'user', 'svc1', '/users'),
    (11, 'orders', 'Orders', 'order', 'svc2', 'orders'),
    (12, 'noop', 'No path', 'misc', 'svc1', NULL);
INSERT INTO gateway_rate_limit
    (policy_id, policy_name, limit_quota, interval_unit, policy_type)
VALUES
    (100, 'per-minute', 120, 'MINUTES', 'url'),
    (101, 'by-ip', 10, 'SECONDS', 'ip');
INSERT INTO gateway_rate_limit_api (policy_id, api_id) VALUES (100, 10), (101, 11);
INSERT INTO base_authority (authority_id, authority, api_id, status) VALUES
    (1000, 'ROLE_A', 10, 1),
    (1001, 'ROLE_B', 10, 1),
    (1002, 'ROLE_C', 12, 1),
    (1003, 'ROLE_D', 11, 0);
INSERT INTO gateway_ip_limit (policy_id, policy_name, policy_type, ip_address) VALUES
    (200, 'deny-scan', 0, '10.0.0.1, 10.0.0.2'),
    (201, 'office', 1, '192.168.1.0/24');
INSERT INTO gateway_ip_limit_api (policy_id, api_id) VALUES (200, 10), (201, 11);
";

fn seeded_store() -> SqlitePolicyStore {
    let store = SqlitePolicyStore::open(":memory:", 1000).expect("open sqlite");
    store.ensure_schema().expect("schema");
    store.execute_batch(SEED).expect("seed");
    store
}

#[test]
fn schema_is_idempotent() {
    let store = SqlitePolicyStore::open(":memory:", 1000).expect("open sqlite");
    store.ensure_schema().expect("schema");
    store.ensure_schema().expect("schema again");
    assert!(store.load_active_routes().expect("routes").is_empty());
}

#[test]
fn loads_only_active_routes() {
    let routes = seeded_store().load_active_routes().expect("routes");
    let ids: Vec<i64> = routes.iter().map(|route| route.route_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(routes[0].url, None);
    assert_eq!(routes[1].url.as_deref(), Some("http://10.0.0.2:8080"));
    assert!(routes[1].retryable);
}

#[test]
fn loads_url_scoped_rate_limit_bindings() {
    let bindings = seeded_store().load_rate_limit_bindings().expect("bindings");
    assert_eq!(bindings.len(), 1);
    let binding = &bindings[0];
    assert_eq!(binding.policy_id, 100);
    assert_eq!(binding.limit_quota, 120);
    assert_eq!(binding.interval_unit, "MINUTES");
    assert_eq!(binding.api_code, "users");
    assert_eq!(binding.service_id, "svc1");
    assert_eq!(binding.path, "/users");
    assert_eq!(binding.url, None);
}

#[test]
fn loads_enabled_authorities() {
    let resources = seeded_store().load_authority_resources().expect("authorities");
    let names: Vec<&str> = resources.iter().map(|item| item.authority.as_str()).collect();
    assert_eq!(names, vec!["ROLE_A", "ROLE_B", "ROLE_C"]);
    assert_eq!(resources[2].path, None);
}

#[test]
fn ip_lists_are_filtered_by_kind() {
    let store = seeded_store();
    let black = store.load_ip_list(IpListKind::Black).expect("blacklist");
    assert_eq!(black.len(), 1);
    assert_eq!(black[0].policy_name, "deny-scan");
    assert_eq!(black[0].ip_addresses, vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(black[0].kind, IpListKind::Black);

    let white = store.load_ip_list(IpListKind::White).expect("whitelist");
    assert_eq!(white.len(), 1);
    assert_eq!(white[0].service_id, "svc2");
    assert_eq!(white[0].path.as_deref(), Some("orders"));
}

#[test]
fn refresh_over_sqlite_resolves_full_snapshot() {
    let coordinator =
        RefreshCoordinator::new(Arc::new(seeded_store()), ResolverSettings::default());
    let report = coordinator.refresh();
    assert!(!report.is_degraded());

    let snapshot = coordinator.snapshot();
    let patterns: Vec<&str> = snapshot
        .routes
        .iter()
        .map(|route| route.predicate.pattern.as_str())
        .collect();
    assert_eq!(patterns, vec!["/svc1/users", "/svc1/**", "/svc2/**"]);
    assert_eq!(
        snapshot.routes[0].filters[1],
        RouteFilter::RequestRateLimiter {
            replenish_rate: 2,
            burst_capacity: 4,
            key_resolver: "path".to_string(),
        }
    );
    assert_eq!(snapshot.routes[2].uri(), "http://10.0.0.2:8080");

    assert_eq!(snapshot.authorities.len(), 1);
    assert_eq!(snapshot.authorities["/svc1/users"].len(), 2);
    assert_eq!(snapshot.ip_blacklist[0].path.as_deref(), Some("/svc1/users"));
    assert_eq!(snapshot.ip_whitelist[0].path.as_deref(), Some("/svc2/orders"));
}

#[test]
fn open_store_uses_sqlite_path_without_dsn() {
    let config = SystemConfigLoader::from_str("[storage]\nsqlite_path = \":memory:\"\n")
        .expect("config");
    let store = open_store(&config.store_settings()).expect("store");
    assert!(store.load_active_routes().expect("routes").is_empty());
    assert!(store.load_ip_list(IpListKind::White).expect("ip").is_empty());
}

#[test]
fn open_store_accepts_sqlite_dsn() {
    let config = SystemConfigLoader::from_str("[storage]\ndsn = \"sqlite::memory:\"\n")
        .expect("config");
    let store = open_store(&config.store_settings()).expect("store");
    assert!(store.load_authority_resources().expect("authorities").is_empty());
}

fn scratch_db(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir().join(format!("{name}-{}-{nanos}.sqlite", std::process::id()))
}

#[test]
fn locked_database_times_out_as_unavailable() {
    let path = scratch_db("gateway-lock");
    let path_str = path.to_str().expect("utf-8 temp path");
    let store = SqlitePolicyStore::open(path_str, 200).expect("open sqlite");
    store.ensure_schema().expect("schema");
    store.execute_batch(SEED).expect("seed");

    let holder = rusqlite::Connection::open(&path).expect("second connection");
    holder.execute_batch("BEGIN EXCLUSIVE;").expect("exclusive lock");

    let started = Instant::now();
    let err = store.load_active_routes().expect_err("locked");
    let elapsed = started.elapsed();
    assert!(matches!(err, StoreError::Unavailable(_)), "{err:?}");
    assert!(elapsed >= Duration::from_millis(150), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");

    holder.execute_batch("COMMIT;").expect("release lock");
    assert_eq!(store.load_active_routes().expect("routes").len(), 2);

    drop(holder);
    drop(store);
    let _ = std::fs::remove_file(&path);
}
