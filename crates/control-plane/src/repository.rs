use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::config::StoreSettings;
use crate::error::StoreError;
use crate::model::{AuthorityResource, IpListEntry, IpListKind, RateLimitBinding, RouteRule};
use crate::pg_repository::PgPolicyStore;
use crate::sqlite_repository::SqlitePolicyStore;

/// Read-only query surface over the gateway configuration tables.
pub trait PolicyStore: Send + Sync {
    fn load_active_routes(&self) -> Result<Vec<RouteRule>, StoreError>;
    fn load_rate_limit_bindings(&self) -> Result<Vec<RateLimitBinding>, StoreError>;
    fn load_authority_resources(&self) -> Result<Vec<AuthorityResource>, StoreError>;
    fn load_ip_list(&self, kind: IpListKind) -> Result<Vec<IpListEntry>, StoreError>;
}

#[derive(Clone, Debug, Default)]
pub struct PolicyTables {
    pub routes: Vec<RouteRule>,
    pub rate_limit_bindings: Vec<RateLimitBinding>,
    pub authority_resources: Vec<AuthorityResource>,
    pub ip_lists: Vec<IpListEntry>,
}

#[derive(Clone, Default)]
pub struct InMemoryPolicyStore {
    tables: Arc<RwLock<PolicyTables>>,
}

impl InMemoryPolicyStore {
    pub fn new(tables: PolicyTables) -> Self {
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    pub fn shared(tables: PolicyTables) -> Arc<Self> {
        Arc::new(Self::new(tables))
    }

    pub fn set_tables(&self, tables: PolicyTables) {
        *self.tables.write() = tables;
    }

    pub fn set_routes(&self, routes: Vec<RouteRule>) {
        self.tables.write().routes = routes;
    }

    pub fn set_rate_limit_bindings(&self, bindings: Vec<RateLimitBinding>) {
        self.tables.write().rate_limit_bindings = bindings;
    }

    pub fn set_authority_resources(&self, resources: Vec<AuthorityResource>) {
        self.tables.write().authority_resources = resources;
    }

    pub fn set_ip_lists(&self, entries: Vec<IpListEntry>) {
        self.tables.write().ip_lists = entries;
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn load_active_routes(&self) -> Result<Vec<RouteRule>, StoreError> {
        Ok(self
            .tables
            .read()
            .routes
            .iter()
            .filter(|route| route.is_active())
            .cloned()
            .collect())
    }

    fn load_rate_limit_bindings(&self) -> Result<Vec<RateLimitBinding>, StoreError> {
        Ok(self.tables.read().rate_limit_bindings.clone())
    }

    fn load_authority_resources(&self) -> Result<Vec<AuthorityResource>, StoreError> {
        Ok(self.tables.read().authority_resources.clone())
    }

    fn load_ip_list(&self, kind: IpListKind) -> Result<Vec<IpListEntry>, StoreError> {
        Ok(self
            .tables
            .read()
            .ip_lists
            .iter()
            .filter(|entry| entry.kind == kind)
            .cloned()
            .collect())
    }
}

/// Opens the store selected by `storage.dsn`: none uses
/// `storage.sqlite_path`, a `sqlite:` dsn opens that file, anything else
/// is handed to postgres. The schema is created when missing.
pub fn open_store(settings: &StoreSettings) -> Result<Arc<dyn PolicyStore>, StoreError> {
    let timeout_ms = settings.query_timeout.as_millis() as u64;
    let store: Arc<dyn PolicyStore> = match settings.dsn.as_deref().map(str::trim) {
        None => sqlite_store(&settings.sqlite_path, timeout_ms)?,
        Some(dsn) => match sqlite_path_from_dsn(dsn) {
            Some(path) => sqlite_store(path, timeout_ms)?,
            None => {
                let store = PgPolicyStore::connect(dsn, timeout_ms)?;
                store.ensure_schema()?;
                info!(timeout_ms, "opened postgres policy store");
                Arc::new(store)
            }
        },
    };
    Ok(store)
}

fn sqlite_store(path: &str, timeout_ms: u64) -> Result<Arc<dyn PolicyStore>, StoreError> {
    let store = SqlitePolicyStore::open(path, timeout_ms)?;
    store.ensure_schema()?;
    info!(path, timeout_ms, "opened sqlite policy store");
    Ok(Arc::new(store))
}

fn sqlite_path_from_dsn(dsn: &str) -> Option<&str> {
    let scheme = dsn.get(..7)?;
    if !scheme.eq_ignore_ascii_case("sqlite:") {
        return None;
    }
    let rest = &dsn[7..];
    Some(rest.strip_prefix("//").unwrap_or(rest))
}
