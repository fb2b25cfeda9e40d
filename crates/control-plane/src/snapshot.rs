use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::authority::AuthorityMap;
use crate::model::IpListEntry;
use crate::routes::ResolvedRoute;

/// Everything one refresh cycle produced. Never mutated after publication.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConfigSnapshot {
    pub generation: u64,
    pub loaded_at_ms: u64,
    pub routes: Vec<ResolvedRoute>,
    pub authorities: AuthorityMap,
    pub ip_blacklist: Vec<IpListEntry>,
    pub ip_whitelist: Vec<IpListEntry>,
}

impl ConfigSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        generation: u64,
        routes: Vec<ResolvedRoute>,
        authorities: AuthorityMap,
        ip_blacklist: Vec<IpListEntry>,
        ip_whitelist: Vec<IpListEntry>,
    ) -> Self {
        Self {
            generation,
            loaded_at_ms: now_ms(),
            routes,
            authorities,
            ip_blacklist,
            ip_whitelist,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
            && self.authorities.is_empty()
            && self.ip_blacklist.is_empty()
            && self.ip_whitelist.is_empty()
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            generation: self.generation,
            loaded_at_ms: self.loaded_at_ms,
            routes: self.routes.len(),
            rate_limited_routes: self
                .routes
                .iter()
                .filter(|route| route.rate_limit.is_some())
                .count(),
            authority_paths: self.authorities.len(),
            ip_blacklist: self.ip_blacklist.len(),
            ip_whitelist: self.ip_whitelist.len(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub generation: u64,
    pub loaded_at_ms: u64,
    pub routes: usize,
    pub rate_limited_routes: usize,
    pub authority_paths: usize,
    pub ip_blacklist: usize,
    pub ip_whitelist: usize,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
