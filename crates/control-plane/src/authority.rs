use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{info, warn};

use crate::model::{AuthorityResource, IpListEntry, IpListKind};
use crate::outcome::Resolution;
use crate::path::PathComposer;
use crate::repository::PolicyStore;

/// Full path pattern to the authority tokens required to call it.
pub type AuthorityMap = BTreeMap<String, BTreeSet<String>>;

pub struct AuthorityResolver {
    store: Arc<dyn PolicyStore>,
}

impl AuthorityResolver {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    pub fn load_authority_map(&self) -> Resolution<AuthorityMap> {
        match self.store.load_active_routes() {
            Ok(rules) => self.load_authority_map_with(&PathComposer::new(&rules)),
            Err(err) => {
                warn!(error = %err, "loading routes for authorities failed");
                Resolution::degraded(err.into())
            }
        }
    }

    pub fn load_ip_list(&self, kind: IpListKind) -> Resolution<Vec<IpListEntry>> {
        match self.store.load_active_routes() {
            Ok(rules) => self.load_ip_list_with(kind, &PathComposer::new(&rules)),
            Err(err) => {
                warn!(list = %kind, error = %err, "loading routes for ip list failed");
                Resolution::degraded(err.into())
            }
        }
    }

    pub(crate) fn load_authority_map_with(
        &self,
        composer: &PathComposer,
    ) -> Resolution<AuthorityMap> {
        match self.store.load_authority_resources() {
            Ok(resources) => {
                let map = build_authority_map(&resources, composer);
                info!(resources = resources.len(), paths = map.len(), "resolved authorities");
                Resolution::loaded(map)
            }
            Err(err) => {
                warn!(error = %err, "loading authority resources failed");
                Resolution::degraded(err.into())
            }
        }
    }

    pub(crate) fn load_ip_list_with(
        &self,
        kind: IpListKind,
        composer: &PathComposer,
    ) -> Resolution<Vec<IpListEntry>> {
        match self.store.load_ip_list(kind) {
            Ok(entries) => {
                let resolved = resolve_ip_entries(entries, composer);
                info!(list = %kind, entries = resolved.len(), "resolved ip list");
                Resolution::loaded(resolved)
            }
            Err(err) => {
                warn!(list = %kind, error = %err, "loading ip list failed");
                Resolution::degraded(err.into())
            }
        }
    }
}

pub fn build_authority_map(
    resources: &[AuthorityResource],
    composer: &PathComposer,
) -> AuthorityMap {
    let mut map = AuthorityMap::new();
    for resource in resources {
        let Some(path) = usable_path(resource.path.as_deref()) else {
            continue;
        };
        let full_path = composer.full_path(&resource.service_id, path);
        map.entry(full_path)
            .or_default()
            .insert(resource.authority.clone());
    }
    map
}

/// Drops rows without a path and rewrites the rest to full paths.
pub fn resolve_ip_entries(entries: Vec<IpListEntry>, composer: &PathComposer) -> Vec<IpListEntry> {
    entries
        .into_iter()
        .filter_map(|mut entry| {
            let full_path = {
                let path = usable_path(entry.path.as_deref())?;
                composer.full_path(&entry.service_id, path)
            };
            entry.path = Some(full_path);
            Some(entry)
        })
        .collect()
}

fn usable_path(path: Option<&str>) -> Option<&str> {
    path.map(str::trim).filter(|path| !path.is_empty())
}
