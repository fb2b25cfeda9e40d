use control_plane::{resolve_full_path, PathComposer, ResolveError, RouteRule};

fn route(route_id: i64, name: &str, service_id: &str, path: &str) -> RouteRule {
    RouteRule {
        route_id,
        route_name: name.to_string(),
        service_id: Some(service_id.to_string()),
        url: None,
        path: path.to_string(),
        strip_prefix: 1,
        retryable: false,
        persist: false,
        status: 1,
    }
}

#[test]
fn wildcard_is_replaced_by_relative_path() {
    let routes = vec![route(1, "svc1", "svc1", "/svc1/**")];
    assert_eq!(resolve_full_path(&routes, "svc1", "/users"), "/svc1/users");
    assert_eq!(resolve_full_path(&routes, "svc1", "users"), "/svc1/users");
}

#[test]
fn prefix_before_wildcard_is_kept_verbatim() {
    let routes = vec![route(1, "admin", "admin-provider", "/api/admin/**")];
    assert_eq!(
        resolve_full_path(&routes, "admin-provider", "menu/list"),
        "/api/admin/menu/list"
    );
}

#[test]
fn unknown_service_returns_normalized_path() {
    let routes = vec![route(1, "svc1", "svc1", "/svc1/**")];
    assert_eq!(resolve_full_path(&routes, "other", "users"), "/users");
    assert_eq!(resolve_full_path(&[], "svc1", "/users"), "/users");
}

#[test]
fn inactive_routes_are_ignored() {
    let mut inactive = route(1, "svc1", "svc1", "/svc1/**");
    inactive.status = 0;
    assert_eq!(resolve_full_path(&[inactive], "svc1", "/users"), "/users");
}

#[test]
fn resolving_a_full_path_again_is_stable() {
    let routes = vec![
        route(1, "svc1", "svc1", "/svc1/**"),
        route(2, "svc2", "svc2", "/api/svc2/**"),
    ];
    for (service, path) in [("svc1", "/users"), ("svc2", "orders/1"), ("none", "x")] {
        let once = resolve_full_path(&routes, service, path);
        let twice = resolve_full_path(&routes, service, &once);
        assert_eq!(once, twice);
    }
}

#[test]
fn similar_prefix_is_not_treated_as_resolved() {
    let routes = vec![route(1, "svc1", "svc1", "/svc1/**")];
    assert_eq!(
        resolve_full_path(&routes, "svc1", "/svc1x/users"),
        "/svc1/svc1x/users"
    );
}

#[test]
fn root_wildcard_route_leaves_path_unchanged() {
    let routes = vec![route(1, "root", "root", "/**")];
    assert_eq!(resolve_full_path(&routes, "root", "health"), "/health");
}

#[test]
fn first_active_route_wins_and_conflict_is_reported() {
    let routes = vec![
        route(1, "first", "svc1", "/a/**"),
        route(2, "second", "svc1", "/b/**"),
    ];
    assert_eq!(resolve_full_path(&routes, "svc1", "/x"), "/a/x");

    let composer = PathComposer::new(&routes);
    assert_eq!(composer.full_path("svc1", "/x"), "/a/x");
    assert_eq!(
        composer.ambiguities(),
        &[ResolveError::AmbiguousRouteMapping {
            service_id: "svc1".to_string(),
            kept: "first".to_string(),
            ignored: "second".to_string(),
        }]
    );
}

#[test]
fn duplicate_route_with_same_pattern_is_not_ambiguous() {
    let routes = vec![
        route(1, "first", "svc1", "/a/**"),
        route(2, "copy", "svc1", "/a/**"),
    ];
    assert!(PathComposer::new(&routes).ambiguities().is_empty());
}

#[test]
fn api_path_starting_with_route_prefix_is_not_prefixed_twice() {
    let routes = vec![route(1, "admin", "admin", "/admin/**")];
    assert_eq!(resolve_full_path(&routes, "admin", "/admin/user"), "/admin/user");
    assert_eq!(resolve_full_path(&routes, "admin", "/admin"), "/admin");
    assert_eq!(PathComposer::new(&routes).full_path("admin", "admin/user"), "/admin/user");
}
