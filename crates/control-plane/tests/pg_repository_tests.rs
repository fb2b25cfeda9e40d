use std::time::{Duration, Instant};

use control_plane::{IpListKind, PgPolicyStore, PolicyStore, StoreError};

// nothing listens on port 1, so every connect attempt is refused at once
const REFUSED_DSN: &str = "host=127.0.0.1 port=1 user=gateway dbname=gateway";

#[test]
fn lazy_store_defers_connecting() {
    let store = PgPolicyStore::lazy(REFUSED_DSN, 500).expect("parse dsn");
    assert!(!store.is_connected());
}

#[test]
fn every_query_retries_the_connection() {
    let store = PgPolicyStore::lazy(REFUSED_DSN, 500).expect("parse dsn");
    let started = Instant::now();
    for _ in 0..3 {
        let err = store.load_active_routes().expect_err("no server");
        assert!(matches!(err, StoreError::Unavailable(_)), "{err:?}");
        let err = store.load_ip_list(IpListKind::Black).expect_err("no server");
        assert!(matches!(err, StoreError::Unavailable(_)), "{err:?}");
    }
    assert!(!store.is_connected());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn eager_connect_reports_unavailable() {
    let err = PgPolicyStore::connect(REFUSED_DSN, 500).err().expect("no server");
    assert!(matches!(err, StoreError::Unavailable(_)));
}

#[test]
fn malformed_dsn_is_rejected() {
    let err = PgPolicyStore::lazy("host=db port=notaport", 500).err().expect("bad dsn");
    assert!(matches!(err, StoreError::Unavailable(_)));
}
