use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};

use crate::error::StoreError;
use crate::model::{
    non_blank, split_ip_addresses, AuthorityResource, IpListEntry, IpListKind, RateLimitBinding,
    RouteRule,
};
use crate::repository::PolicyStore;

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS gateway_route (
    route_id BIGINT PRIMARY KEY,
    route_name TEXT NOT NULL,
    path TEXT NOT NULL,
    service_id TEXT,
    url TEXT,
    strip_prefix BIGINT NOT NULL DEFAULT 1,
    retryable BIGINT NOT NULL DEFAULT 0,
    is_persist BIGINT NOT NULL DEFAULT 0,
    status BIGINT NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS base_api (
    api_id BIGINT PRIMARY KEY,
    api_code TEXT NOT NULL,
    api_name TEXT NOT NULL,
    api_category TEXT NOT NULL DEFAULT '',
    service_id TEXT NOT NULL,
    path TEXT
);
CREATE TABLE IF NOT EXISTS gateway_rate_limit (
    policy_id BIGINT PRIMARY KEY,
    policy_name TEXT NOT NULL,
    limit_quota BIGINT NOT NULL,
    interval_unit TEXT NOT NULL,
    policy_type TEXT NOT NULL DEFAULT 'url'
);
CREATE TABLE IF NOT EXISTS gateway_rate_limit_api (
    policy_id BIGINT NOT NULL,
    api_id BIGINT NOT NULL,
    PRIMARY KEY (policy_id, api_id)
);
CREATE TABLE IF NOT EXISTS base_authority (
    authority_id BIGINT PRIMARY KEY,
    authority TEXT NOT NULL,
    api_id BIGINT NOT NULL,
    status BIGINT NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS gateway_ip_limit (
    policy_id BIGINT PRIMARY KEY,
    policy_name TEXT NOT NULL,
    policy_type BIGINT NOT NULL,
    ip_address TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS gateway_ip_limit_api (
    policy_id BIGINT NOT NULL,
    api_id BIGINT NOT NULL,
    PRIMARY KEY (policy_id, api_id)
);";

pub(crate) const SELECT_ROUTES: &str = "SELECT route_id, route_name, path, service_id, url, \
     strip_prefix, retryable, is_persist, status FROM gateway_route WHERE status = 1 \
     ORDER BY route_id";

pub(crate) const SELECT_RATE_LIMIT_BINDINGS: &str = "SELECT i.policy_id, p.policy_name, \
     p.limit_quota, p.interval_unit, a.api_id, a.api_code, a.api_name, a.api_category, \
     a.service_id, a.path, r.url \
     FROM gateway_rate_limit_api AS i \
     INNER JOIN gateway_rate_limit AS p ON i.policy_id = p.policy_id \
     INNER JOIN base_api AS a ON i.api_id = a.api_id \
     INNER JOIN gateway_route AS r ON a.service_id = r.route_name \
     WHERE p.policy_type = 'url' \
     ORDER BY i.policy_id, a.api_id";

pub(crate) const SELECT_AUTHORITIES: &str = "SELECT au.authority_id, au.authority, \
     a.service_id, a.path \
     FROM base_authority AS au \
     INNER JOIN base_api AS a ON au.api_id = a.api_id \
     WHERE au.status = 1 \
     ORDER BY au.authority_id";

const SELECT_IP_LIST: &str = "SELECT p.policy_id, p.policy_name, p.ip_address, a.api_id, \
     a.service_id, a.path \
     FROM gateway_ip_limit_api AS i \
     INNER JOIN gateway_ip_limit AS p ON i.policy_id = p.policy_id \
     INNER JOIN base_api AS a ON i.api_id = a.api_id \
     WHERE p.policy_type = ?1 \
     ORDER BY p.policy_id, a.api_id";

pub struct SqlitePolicyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePolicyStore {
    pub fn open(path: &str, query_timeout_ms: u64) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(unavailable)?;
        conn.busy_timeout(Duration::from_millis(query_timeout_ms))
            .map_err(unavailable)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.execute_batch(SCHEMA)
    }

    /// Runs raw statements, used for migrations and seeding.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(sql).map_err(unavailable)
    }

    fn query<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>, StoreError>
    where
        P: rusqlite::Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(unavailable)?;
        let rows = stmt.query_map(params, map).map_err(unavailable)?;
        // rows are stepped lazily, so lock timeouts can surface here too
        rows.collect::<Result<Vec<_>, _>>().map_err(row_error)
    }
}

impl PolicyStore for SqlitePolicyStore {
    fn load_active_routes(&self) -> Result<Vec<RouteRule>, StoreError> {
        self.query(SELECT_ROUTES, [], |row| {
            Ok(RouteRule {
                route_id: row.get(0)?,
                route_name: row.get(1)?,
                path: row.get(2)?,
                service_id: non_blank(row.get(3)?),
                url: non_blank(row.get(4)?),
                strip_prefix: row.get(5)?,
                retryable: row.get::<_, i64>(6)? != 0,
                persist: row.get::<_, i64>(7)? != 0,
                status: row.get(8)?,
            })
        })
    }

    fn load_rate_limit_bindings(&self) -> Result<Vec<RateLimitBinding>, StoreError> {
        self.query(SELECT_RATE_LIMIT_BINDINGS, [], |row| {
            Ok(RateLimitBinding {
                policy_id: row.get(0)?,
                policy_name: row.get(1)?,
                limit_quota: row.get(2)?,
                interval_unit: row.get(3)?,
                api_id: row.get(4)?,
                api_code: row.get(5)?,
                api_name: row.get(6)?,
                api_category: row.get(7)?,
                service_id: row.get(8)?,
                path: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                url: non_blank(row.get(10)?),
            })
        })
    }

    fn load_authority_resources(&self) -> Result<Vec<AuthorityResource>, StoreError> {
        self.query(SELECT_AUTHORITIES, [], |row| {
            Ok(AuthorityResource {
                authority_id: row.get(0)?,
                authority: row.get(1)?,
                service_id: row.get(2)?,
                path: row.get(3)?,
            })
        })
    }

    fn load_ip_list(&self, kind: IpListKind) -> Result<Vec<IpListEntry>, StoreError> {
        self.query(SELECT_IP_LIST, params![kind.policy_type()], |row| {
            let raw: String = row.get(2)?;
            Ok(IpListEntry {
                policy_id: row.get(0)?,
                policy_name: row.get(1)?,
                kind,
                ip_addresses: split_ip_addresses(&raw),
                api_id: row.get(3)?,
                service_id: row.get(4)?,
                path: row.get(5)?,
            })
        })
    }
}

fn unavailable(err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn row_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(..) => unavailable(err),
        other => StoreError::Mapping(other.to_string()),
    }
}
