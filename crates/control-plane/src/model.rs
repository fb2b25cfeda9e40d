use std::fmt;

use serde::{Deserialize, Serialize};

pub const STATUS_ACTIVE: i64 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub route_id: i64,
    pub route_name: String,
    pub service_id: Option<String>,
    pub url: Option<String>,
    pub path: String,
    pub strip_prefix: i64,
    pub retryable: bool,
    pub persist: bool,
    pub status: i64,
}

impl RouteRule {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    pub fn serves(&self, service_id: &str) -> bool {
        self.is_active() && self.service_id.as_deref() == Some(service_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub policy_id: i64,
    pub policy_name: String,
    pub limit_quota: i64,
    pub interval_unit: String,
    pub policy_type: String,
}

/// One API bound to one URL-scoped policy, joined with the route of the
/// API's service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitBinding {
    pub policy_id: i64,
    pub policy_name: String,
    pub limit_quota: i64,
    pub interval_unit: String,
    pub api_id: i64,
    pub api_code: String,
    pub api_name: String,
    pub api_category: String,
    pub service_id: String,
    pub path: String,
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityResource {
    pub authority_id: i64,
    pub authority: String,
    pub service_id: String,
    pub path: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpListKind {
    Black,
    White,
}

impl IpListKind {
    /// Value of `policy_type` in the ip policy table.
    pub fn policy_type(self) -> i64 {
        match self {
            IpListKind::Black => 0,
            IpListKind::White => 1,
        }
    }
}

impl fmt::Display for IpListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpListKind::Black => f.write_str("black"),
            IpListKind::White => f.write_str("white"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpListEntry {
    pub policy_id: i64,
    pub policy_name: String,
    pub kind: IpListKind,
    pub ip_addresses: Vec<String>,
    pub api_id: i64,
    pub service_id: String,
    pub path: Option<String>,
}

pub(crate) fn split_ip_addresses(raw: &str) -> Vec<String> {
    raw.split([',', ';', '\n'])
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
