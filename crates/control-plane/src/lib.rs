pub mod authority;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod model;
pub mod outcome;
pub mod path;
pub mod pg_repository;
pub mod rate_limit;
pub mod repository;
pub mod routes;
pub mod snapshot;
pub mod sqlite_repository;
pub mod static_config;

pub use authority::{build_authority_map, resolve_ip_entries, AuthorityMap, AuthorityResolver};
pub use config::{
    ConfigError, NotifySettings, ResolverSettings, StoreSettings, SystemConfig, SystemConfigLoader,
};
pub use coordinator::{RefreshCoordinator, RefreshReport, RefreshState};
pub use error::{ResolveError, StoreError};
pub use events::{
    ChangeChannel, ChangeHandler, InMemoryChangeChannel, RedisChangeListener, SubscriptionId,
    ROUTE_REFRESH_TOPIC,
};
pub use model::{
    AuthorityResource, IpListEntry, IpListKind, RateLimitBinding, RateLimitPolicy, RouteRule,
};
pub use outcome::{CategoryStatus, Resolution};
pub use path::{normalize_path, resolve_full_path, PathComposer};
pub use pg_repository::PgPolicyStore;
pub use rate_limit::{token_bucket_params, IntervalUnit, TokenBucket};
pub use repository::{open_store, InMemoryPolicyStore, PolicyStore, PolicyTables};
pub use routes::{
    resolve_routes, PathPredicate, RateLimitMeta, ResolvedRoute, RouteFilter, RouteResolver,
    RouteTarget,
};
pub use snapshot::{ConfigSnapshot, SnapshotSummary};
pub use sqlite_repository::SqlitePolicyStore;
pub use static_config::{ConfigKey, ValueKind, CONFIG_KEYS};
