use std::path::{Path, PathBuf};
use std::sync::Arc;

use control_plane::{
    open_store, InMemoryChangeChannel, RedisChangeListener, RefreshCoordinator, SystemConfig,
    SystemConfigLoader, ROUTE_REFRESH_TOPIC,
};
use tracing::{info, warn};

use crate::error::AppError;

pub struct AppState {
    pub config_path: PathBuf,
    pub config_raw: String,
    pub config: SystemConfig,
    pub admin_token: Option<String>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub changes: Arc<InMemoryChangeChannel>,
}

impl AppState {
    /// Opens the store, wires the coordinator to the change channel and
    /// resolves the first snapshot when `refresh.on_start` is set.
    pub fn from_config(
        config_path: PathBuf,
        config_raw: String,
        config: SystemConfig,
    ) -> Result<Self, AppError> {
        let store = open_store(&config.store_settings())?;
        let coordinator = RefreshCoordinator::shared(store, config.resolver_settings());
        let changes = InMemoryChangeChannel::shared();
        coordinator.subscribe_to(changes.as_ref(), ROUTE_REFRESH_TOPIC);

        if config.refresh_on_start() {
            let report = coordinator.refresh();
            info!(
                generation = report.generation,
                degraded = report.is_degraded(),
                "initial snapshot resolved"
            );
        }

        start_change_listener(&config, changes.clone());

        let admin_token = config.admin_token();
        Ok(Self {
            config_path,
            config_raw,
            config,
            admin_token,
            coordinator,
            changes,
        })
    }
}

fn start_change_listener(config: &SystemConfig, changes: Arc<InMemoryChangeChannel>) {
    let settings = config.notify_settings();
    let Some(redis_url) = settings.redis_url else {
        info!("notify.redis_url empty, refresh only on demand");
        return;
    };
    let spawned = RedisChangeListener::new(&redis_url, &settings.channel)
        .map_err(|err| err.to_string())
        .and_then(|listener| listener.spawn(changes).map_err(|err| err.to_string()));
    if let Err(err) = spawned {
        warn!(channel = %settings.channel, error = %err, "change listener not started");
    }
}

pub fn load_config(path: &Path) -> Result<(String, SystemConfig), AppError> {
    let raw = std::fs::read_to_string(path)?;
    let config = SystemConfigLoader::from_str(&raw)?;
    Ok((raw, config))
}

pub fn create_default_config(path: &Path) -> Result<String, AppError> {
    let content = default_config_template();
    std::fs::write(path, content.as_bytes())?;
    Ok(content)
}

pub fn default_config_template() -> String {
    let lines = [
        "storage = { dsn = \"\", sqlite_path = \"gateway.sqlite\", query_timeout_ms = 3000 }",
        "notify = { redis_url = \"\", channel = \"gateway:route-refresh\" }",
        "gateway = { key_resolver = \"path\" }",
        "refresh = { on_start = true }",
        "security = { admin_token = \"\" }",
    ];
    format!("{}\n", lines.join("\n"))
}
