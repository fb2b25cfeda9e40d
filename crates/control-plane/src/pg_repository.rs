use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use postgres::types::ToSql;
use postgres::{Client, Config, NoTls, Row};
use tracing::warn;

use crate::error::StoreError;
use crate::model::{
    non_blank, split_ip_addresses, AuthorityResource, IpListEntry, IpListKind, RateLimitBinding,
    RouteRule,
};
use crate::repository::PolicyStore;
use crate::sqlite_repository::{
    SCHEMA, SELECT_AUTHORITIES, SELECT_RATE_LIMIT_BINDINGS, SELECT_ROUTES,
};

const SELECT_IP_LIST: &str = "SELECT p.policy_id, p.policy_name, p.ip_address, a.api_id, \
     a.service_id, a.path \
     FROM gateway_ip_limit_api AS i \
     INNER JOIN gateway_ip_limit AS p ON i.policy_id = p.policy_id \
     INNER JOIN base_api AS a ON i.api_id = a.api_id \
     WHERE p.policy_type = $1 \
     ORDER BY p.policy_id, a.api_id";

/// Blocking postgres adapter. The client is opened on first use and
/// replaced when the server closes the connection.
pub struct PgPolicyStore {
    config: Config,
    client: Arc<Mutex<Option<Client>>>,
}

impl PgPolicyStore {
    /// Connects with both the connect and per-statement timeouts set to
    /// `query_timeout_ms`.
    pub fn connect(dsn: &str, query_timeout_ms: u64) -> Result<Self, StoreError> {
        let store = Self::lazy(dsn, query_timeout_ms)?;
        store.with_client(|_| Ok(()))?;
        Ok(store)
    }

    /// Parses `dsn` without opening a connection.
    pub fn lazy(dsn: &str, query_timeout_ms: u64) -> Result<Self, StoreError> {
        let mut config: Config = dsn
            .parse()
            .map_err(|err: postgres::Error| StoreError::Unavailable(err.to_string()))?;
        config
            .connect_timeout(Duration::from_millis(query_timeout_ms))
            .options(&format!("-c statement_timeout={query_timeout_ms}"));
        Ok(Self {
            config,
            client: Arc::new(Mutex::new(None)),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.client
            .lock()
            .as_ref()
            .is_some_and(|client| !client.is_closed())
    }

    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_client(|client| client.batch_execute(SCHEMA))
    }

    /// Runs `op` on a live client. A closed connection is dropped and the
    /// call retried once on a fresh one.
    fn with_client<T, F>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut(&mut Client) -> Result<T, postgres::Error>,
    {
        let mut slot = self.client.lock();
        let mut retried = false;
        loop {
            if slot.as_ref().map_or(true, Client::is_closed) {
                if slot.is_some() {
                    warn!("postgres connection closed, reconnecting");
                }
                *slot = None;
                *slot = Some(self.config.connect(NoTls).map_err(unavailable)?);
            }
            let client = slot
                .as_mut()
                .ok_or_else(|| StoreError::Unavailable("no postgres connection".to_string()))?;
            match op(client) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_closed() && !retried => {
                    warn!(error = %err, "postgres connection lost, retrying once");
                    retried = true;
                    *slot = None;
                }
                Err(err) => return Err(unavailable(err)),
            }
        }
    }

    fn query<T, F>(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        map: F,
    ) -> Result<Vec<T>, StoreError>
    where
        F: Fn(&Row) -> Result<T, postgres::Error>,
    {
        let rows = self.with_client(|client| client.query(sql, params))?;
        rows.iter()
            .map(|row| map(row).map_err(|err| StoreError::Mapping(err.to_string())))
            .collect()
    }
}

impl PolicyStore for PgPolicyStore {
    fn load_active_routes(&self) -> Result<Vec<RouteRule>, StoreError> {
        self.query(SELECT_ROUTES, &[], |row| {
            Ok(RouteRule {
                route_id: row.try_get(0)?,
                route_name: row.try_get(1)?,
                path: row.try_get(2)?,
                service_id: non_blank(row.try_get(3)?),
                url: non_blank(row.try_get(4)?),
                strip_prefix: row.try_get(5)?,
                retryable: row.try_get::<_, i64>(6)? != 0,
                persist: row.try_get::<_, i64>(7)? != 0,
                status: row.try_get(8)?,
            })
        })
    }

    fn load_rate_limit_bindings(&self) -> Result<Vec<RateLimitBinding>, StoreError> {
        self.query(SELECT_RATE_LIMIT_BINDINGS, &[], |row| {
            Ok(RateLimitBinding {
                policy_id: row.try_get(0)?,
                policy_name: row.try_get(1)?,
                limit_quota: row.try_get(2)?,
                interval_unit: row.try_get(3)?,
                api_id: row.try_get(4)?,
                api_code: row.try_get(5)?,
                api_name: row.try_get(6)?,
                api_category: row.try_get(7)?,
                service_id: row.try_get(8)?,
                path: row.try_get::<_, Option<String>>(9)?.unwrap_or_default(),
                url: non_blank(row.try_get(10)?),
            })
        })
    }

    fn load_authority_resources(&self) -> Result<Vec<AuthorityResource>, StoreError> {
        self.query(SELECT_AUTHORITIES, &[], |row| {
            Ok(AuthorityResource {
                authority_id: row.try_get(0)?,
                authority: row.try_get(1)?,
                service_id: row.try_get(2)?,
                path: row.try_get(3)?,
            })
        })
    }

    fn load_ip_list(&self, kind: IpListKind) -> Result<Vec<IpListEntry>, StoreError> {
        let policy_type = kind.policy_type();
        self.query(SELECT_IP_LIST, &[&policy_type], |row| {
            let raw: String = row.try_get(2)?;
            Ok(IpListEntry {
                policy_id: row.try_get(0)?,
                policy_name: row.try_get(1)?,
                kind,
                ip_addresses: split_ip_addresses(&raw),
                api_id: row.try_get(3)?,
                service_id: row.try_get(4)?,
                path: row.try_get(5)?,
            })
        })
    }
}

fn unavailable(err: postgres::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}
