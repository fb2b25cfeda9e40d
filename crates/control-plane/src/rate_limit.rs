use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

pub const SECONDS_IN_MINUTE: u64 = 60;
pub const SECONDS_IN_HOUR: u64 = 3600;
pub const SECONDS_IN_DAY: u64 = 24 * 3600;

const SECOND_TTL: u64 = 10;
const MINUTE_TTL: u64 = 2 * 60 + 10;
const HOUR_TTL: u64 = 2 * 3600 + 10;
const DAY_TTL: u64 = 2 * 3600 * 24 + 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    /// Normalization window the quota is divided by.
    pub fn window_seconds(self) -> u64 {
        match self {
            IntervalUnit::Seconds | IntervalUnit::Minutes => SECONDS_IN_MINUTE,
            IntervalUnit::Hours => SECONDS_IN_HOUR,
            IntervalUnit::Days => SECONDS_IN_DAY,
        }
    }

    /// Cache lifetime of counters kept for a policy of this unit.
    pub fn ttl_seconds(self) -> u64 {
        match self {
            IntervalUnit::Seconds => SECOND_TTL,
            IntervalUnit::Minutes => MINUTE_TTL,
            IntervalUnit::Hours => HOUR_TTL,
            IntervalUnit::Days => DAY_TTL,
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = ResolveError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "seconds" => Ok(IntervalUnit::Seconds),
            "minutes" => Ok(IntervalUnit::Minutes),
            "hours" => Ok(IntervalUnit::Hours),
            "days" => Ok(IntervalUnit::Days),
            _ => Err(ResolveError::UnsupportedIntervalUnit(value.to_string())),
        }
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntervalUnit::Seconds => "seconds",
            IntervalUnit::Minutes => "minutes",
            IntervalUnit::Hours => "hours",
            IntervalUnit::Days => "days",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBucket {
    pub replenish_rate: u64,
    pub burst_capacity: u64,
}

impl TokenBucket {
    pub fn for_quota(unit: IntervalUnit, quota: u64) -> Self {
        let replenish_rate = (quota / unit.window_seconds()).max(1);
        Self {
            replenish_rate,
            burst_capacity: replenish_rate.saturating_mul(2),
        }
    }
}

/// Converts a quota per interval unit into token-bucket parameters.
/// Negative quotas are treated as zero and end up at the floor rate.
pub fn token_bucket_params(interval_unit: &str, quota: i64) -> Result<TokenBucket, ResolveError> {
    let unit: IntervalUnit = interval_unit.parse()?;
    Ok(TokenBucket::for_quota(unit, quota.max(0) as u64))
}
