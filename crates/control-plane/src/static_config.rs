use std::fmt;

/// TOML value shape a key accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Number,
    Flag,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Text => f.write_str("string"),
            ValueKind::Number => f.write_str("number"),
            ValueKind::Flag => f.write_str("boolean"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConfigKey {
    pub key: &'static str,
    pub description: &'static str,
    pub kind: ValueKind,
    pub default_value: &'static str,
}

pub static CONFIG_KEYS: &[ConfigKey] = &[
    ConfigKey {
        key: "storage.dsn",
        description: "Configuration database connection string",
        kind: ValueKind::Text,
        default_value: "",
    },
    ConfigKey {
        key: "storage.sqlite_path",
        description: "SQLite database path (used when storage.dsn is empty)",
        kind: ValueKind::Text,
        default_value: "gateway.sqlite",
    },
    ConfigKey {
        key: "storage.query_timeout_ms",
        description: "Upper bound for a single configuration query",
        kind: ValueKind::Number,
        default_value: "3000",
    },
    ConfigKey {
        key: "notify.redis_url",
        description: "Redis connection string for route change notifications",
        kind: ValueKind::Text,
        default_value: "",
    },
    ConfigKey {
        key: "notify.channel",
        description: "Pub/sub channel carrying route change notifications",
        kind: ValueKind::Text,
        default_value: "gateway:route-refresh",
    },
    ConfigKey {
        key: "gateway.key_resolver",
        description: "Key resolver referenced by generated rate limiter filters",
        kind: ValueKind::Text,
        default_value: "path",
    },
    ConfigKey {
        key: "refresh.on_start",
        description: "Resolve a snapshot before serving",
        kind: ValueKind::Flag,
        default_value: "true",
    },
    ConfigKey {
        key: "security.admin_token",
        description: "Token required on admin requests (disabled when empty)",
        kind: ValueKind::Text,
        default_value: "",
    },
];

pub fn config_key(key: &str) -> Option<&'static ConfigKey> {
    CONFIG_KEYS.iter().find(|item| item.key == key)
}
