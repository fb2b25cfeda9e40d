use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::static_config::{config_key, ValueKind};

pub const DEFAULT_KEY_RESOLVER: &str = "path";
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 3000;

/// Validated configuration, keyed by dotted path (`storage.dsn`). Missing
/// keys read as their registered default.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    values: BTreeMap<String, String>,
}

impl SystemConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_string(&self, key: &str) -> String {
        self.raw(key).unwrap_or_default()
    }

    pub fn get_number(&self, key: &str) -> i64 {
        self.raw(key)
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value as i64)
            .unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.raw(key).is_some_and(|value| value == "true")
    }

    /// Keys present in the file, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn store_settings(&self) -> StoreSettings {
        let timeout_ms = match self.get_number("storage.query_timeout_ms") {
            value if value > 0 => value as u64,
            _ => DEFAULT_QUERY_TIMEOUT_MS,
        };
        StoreSettings {
            dsn: non_empty(self.get_string("storage.dsn")),
            sqlite_path: self.get_string("storage.sqlite_path"),
            query_timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn notify_settings(&self) -> NotifySettings {
        NotifySettings {
            redis_url: non_empty(self.get_string("notify.redis_url")),
            channel: self.get_string("notify.channel"),
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            key_resolver: non_empty(self.get_string("gateway.key_resolver"))
                .unwrap_or_else(|| DEFAULT_KEY_RESOLVER.to_string()),
        }
    }

    pub fn refresh_on_start(&self) -> bool {
        self.get_bool("refresh.on_start")
    }

    /// `None` disables admin authentication.
    pub fn admin_token(&self) -> Option<String> {
        non_empty(self.get_string("security.admin_token"))
    }

    fn raw(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| config_key(key).map(|item| item.default_value.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreSettings {
    /// Postgres or `sqlite:` dsn; `None` opens `sqlite_path`.
    pub dsn: Option<String>,
    pub sqlite_path: String,
    pub query_timeout: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifySettings {
    pub redis_url: Option<String>,
    pub channel: String,
}

/// Values the resolvers read from configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Name of the key resolver the proxy's rate limiter buckets requests by.
    pub key_resolver: String,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            key_resolver: DEFAULT_KEY_RESOLVER.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("type mismatch for key {key}: expected {expected}")]
    TypeMismatch { key: String, expected: ValueKind },
}

pub struct SystemConfigLoader;

impl SystemConfigLoader {
    /// Parses TOML and checks every leaf against the registered keys. The
    /// first offending key fails the whole load.
    pub fn from_str(input: &str) -> Result<SystemConfig, ConfigError> {
        let root: toml::Table =
            toml::from_str(input).map_err(|err| ConfigError::Parse(err.to_string()))?;
        let mut values = BTreeMap::new();
        collect_table(&mut values, "", &root)?;
        Ok(SystemConfig { values })
    }
}

fn collect_table(
    values: &mut BTreeMap<String, String>,
    prefix: &str,
    table: &toml::Table,
) -> Result<(), ConfigError> {
    for (name, value) in table {
        let key = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        let leaf = match value {
            toml::Value::Table(nested) => {
                collect_table(values, &key, nested)?;
                continue;
            }
            toml::Value::String(text) => Some((ValueKind::Text, text.clone())),
            toml::Value::Integer(number) => Some((ValueKind::Number, number.to_string())),
            toml::Value::Float(number) => Some((ValueKind::Number, number.to_string())),
            toml::Value::Boolean(flag) => Some((ValueKind::Flag, flag.to_string())),
            _ => None,
        };
        let Some(item) = config_key(&key) else {
            return Err(ConfigError::UnknownKey(key));
        };
        let Some((_, text)) = leaf.filter(|(kind, _)| *kind == item.kind) else {
            return Err(ConfigError::TypeMismatch {
                key,
                expected: item.kind,
            });
        };
        values.insert(key, text);
    }
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
