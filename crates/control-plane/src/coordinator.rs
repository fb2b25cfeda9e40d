use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};

use crate::authority::{AuthorityMap, AuthorityResolver};
use crate::config::ResolverSettings;
use crate::error::ResolveError;
use crate::events::{ChangeChannel, ChangeHandler, SubscriptionId};
use crate::model::{IpListEntry, IpListKind};
use crate::outcome::{CategoryStatus, Resolution};
use crate::path::PathComposer;
use crate::repository::PolicyStore;
use crate::routes::{ResolvedRoute, RouteResolver};
use crate::snapshot::ConfigSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Idle,
    Refreshing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Generation published after this cycle.
    pub generation: u64,
    /// False when the previous snapshot was kept because the route set
    /// could not be read.
    pub installed: bool,
    pub routes: CategoryStatus,
    pub authorities: CategoryStatus,
    pub ip_blacklist: CategoryStatus,
    pub ip_whitelist: CategoryStatus,
    pub ambiguities: Vec<String>,
    pub elapsed_ms: u64,
}

impl RefreshReport {
    fn retained(generation: u64, err: &ResolveError, started: Instant) -> Self {
        let status = CategoryStatus::Degraded {
            error: err.to_string(),
        };
        Self {
            generation,
            installed: false,
            routes: status.clone(),
            authorities: status.clone(),
            ip_blacklist: status.clone(),
            ip_whitelist: status,
            ambiguities: Vec::new(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.installed
            || self.routes.is_degraded()
            || self.authorities.is_degraded()
            || self.ip_blacklist.is_degraded()
            || self.ip_whitelist.is_degraded()
    }
}

/// Owns the published snapshot. Readers load it without locking; refreshes
/// are serialized and publish with a single pointer swap.
pub struct RefreshCoordinator {
    store: Arc<dyn PolicyStore>,
    routes: RouteResolver,
    authorities: AuthorityResolver,
    current: ArcSwap<ConfigSnapshot>,
    refresh_lock: Mutex<()>,
    pending: AtomicBool,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn PolicyStore>, settings: ResolverSettings) -> Self {
        Self {
            routes: RouteResolver::new(store.clone(), settings),
            authorities: AuthorityResolver::new(store.clone()),
            store,
            current: ArcSwap::from_pointee(ConfigSnapshot::empty()),
            refresh_lock: Mutex::new(()),
            pending: AtomicBool::new(false),
        }
    }

    pub fn shared(store: Arc<dyn PolicyStore>, settings: ResolverSettings) -> Arc<Self> {
        Arc::new(Self::new(store, settings))
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn resolved_routes(&self) -> Vec<ResolvedRoute> {
        self.current.load().routes.clone()
    }

    pub fn authority_map(&self) -> AuthorityMap {
        self.current.load().authorities.clone()
    }

    pub fn ip_blacklist(&self) -> Vec<IpListEntry> {
        self.current.load().ip_blacklist.clone()
    }

    pub fn ip_whitelist(&self) -> Vec<IpListEntry> {
        self.current.load().ip_whitelist.clone()
    }

    pub fn state(&self) -> RefreshState {
        if self.refresh_lock.is_locked() {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Recomputes every category and publishes the result. Waits for an
    /// in-flight refresh to finish first.
    pub fn refresh(&self) -> RefreshReport {
        let guard = self.refresh_lock.lock();
        self.pending.store(false, Ordering::Release);
        let mut report = self.refresh_locked();
        while self.pending.swap(false, Ordering::AcqRel) {
            report = self.refresh_locked();
        }
        drop(guard);
        // a notification may have landed between the last check and unlock
        if self.pending.load(Ordering::Acquire) {
            if let Some(latest) = self.request_refresh() {
                report = latest;
            }
        }
        report
    }

    /// Coalescing variant used for change notifications. Returns `None` when
    /// another thread is refreshing; that thread runs one more cycle.
    pub fn request_refresh(&self) -> Option<RefreshReport> {
        self.pending.store(true, Ordering::Release);
        let mut last = None;
        loop {
            let Some(guard) = self.refresh_lock.try_lock() else {
                return last;
            };
            while self.pending.swap(false, Ordering::AcqRel) {
                last = Some(self.refresh_locked());
            }
            drop(guard);
            if !self.pending.load(Ordering::Acquire) {
                return last;
            }
        }
    }

    pub fn subscribe_to(
        self: &Arc<Self>,
        channel: &dyn ChangeChannel,
        topic: &str,
    ) -> SubscriptionId {
        channel.subscribe(topic, self.clone())
    }

    fn refresh_locked(&self) -> RefreshReport {
        let started = Instant::now();
        let previous = self.current.load().generation;

        let rules = match self.store.load_active_routes() {
            Ok(rules) => rules,
            Err(err) => {
                let err = ResolveError::from(err);
                error!(
                    generation = previous,
                    error = %err,
                    "route set unavailable, keeping snapshot"
                );
                return RefreshReport::retained(previous, &err, started);
            }
        };

        let composer = PathComposer::new(&rules);
        let routes = self.routes.load_routes_with(&rules, &composer);
        let authorities = self.authorities.load_authority_map_with(&composer);
        let ip_blacklist = self.authorities.load_ip_list_with(IpListKind::Black, &composer);
        let ip_whitelist = self.authorities.load_ip_list_with(IpListKind::White, &composer);

        let (routes, routes_status) = split(routes, Vec::len);
        let (authorities, authorities_status) = split(authorities, AuthorityMap::len);
        let (ip_blacklist, blacklist_status) = split(ip_blacklist, Vec::len);
        let (ip_whitelist, whitelist_status) = split(ip_whitelist, Vec::len);

        let generation = previous + 1;
        let snapshot =
            ConfigSnapshot::new(generation, routes, authorities, ip_blacklist, ip_whitelist);
        let summary = snapshot.summary();
        self.current.store(Arc::new(snapshot));

        let report = RefreshReport {
            generation,
            installed: true,
            routes: routes_status,
            authorities: authorities_status,
            ip_blacklist: blacklist_status,
            ip_whitelist: whitelist_status,
            ambiguities: composer.ambiguities().iter().map(ToString::to_string).collect(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            generation,
            routes = summary.routes,
            authority_paths = summary.authority_paths,
            ip_blacklist = summary.ip_blacklist,
            ip_whitelist = summary.ip_whitelist,
            degraded = report.is_degraded(),
            elapsed_ms = report.elapsed_ms,
            "snapshot published"
        );
        report
    }
}

impl ChangeHandler for RefreshCoordinator {
    fn on_change(&self, topic: &str) {
        info!(topic, "change notification received");
        self.request_refresh();
    }
}

fn split<T>(resolution: Resolution<T>, count: impl Fn(&T) -> usize) -> (T, CategoryStatus) {
    let (value, degraded, skipped) = resolution.into_parts();
    let status = CategoryStatus::from_parts(count(&value), degraded.as_ref(), &skipped);
    (value, status)
}
