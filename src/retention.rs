// ABOUTME: Sampling-period buckets and the retention-days-per-period lookup table
// ABOUTME: Layers built-in defaults, an optional TOML file, and CLI overrides

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Sampling-frequency bucket for a series. `WaterYear` is an alias of `Annual`
/// for retention purposes and is normalized away before any table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Unknown,
    SubDaily,
    Daily,
    Monthly,
    Annual,
    WaterYear,
}

impl Period {
    /// Collapse equivalent buckets (`WaterYear` == `Annual`).
    pub fn normalize(self) -> Period {
        match self {
            Period::WaterYear => Period::Annual,
            other => other,
        }
    }

    /// Map a source-declared computation period string to a bucket.
    /// Unrecognized values fall back to `Unknown`.
    pub fn from_hint(hint: Option<&str>) -> Period {
        match hint {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "points" | "minutes" | "hourly" | "sub-daily" | "subdaily" => Period::SubDaily,
                "daily" => Period::Daily,
                "monthly" => Period::Monthly,
                "annual" => Period::Annual,
                "wateryear" | "water-year" => Period::WaterYear,
                _ => Period::Unknown,
            },
            None => Period::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Unknown => "unknown",
            Period::SubDaily => "sub-daily",
            Period::Daily => "daily",
            Period::Monthly => "monthly",
            Period::Annual => "annual",
            Period::WaterYear => "water-year",
        }
    }

    fn parse_key(key: &str) -> Result<Period> {
        let period = Period::from_hint(Some(key));
        if period == Period::Unknown && !key.eq_ignore_ascii_case("unknown") {
            bail!(
                "Unknown period '{}'. Valid periods: sub-daily, daily, monthly, annual, water-year, unknown",
                key
            );
        }
        Ok(period)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum historical span to keep per period, in days. 0 means unlimited.
#[derive(Debug, Clone)]
pub struct RetentionTable {
    days: HashMap<Period, u32>,
}

impl Default for RetentionTable {
    fn default() -> Self {
        let mut days = HashMap::new();
        days.insert(Period::SubDaily, 400);
        days.insert(Period::Daily, 400);
        days.insert(Period::Monthly, 1830);
        days.insert(Period::Annual, 0);
        days.insert(Period::Unknown, 0);
        Self { days }
    }
}

#[derive(Deserialize)]
struct RetentionFile {
    #[serde(default)]
    retention: HashMap<String, u32>,
}

impl RetentionTable {
    /// Maximum retention days for a period. A period with no entry falls back
    /// to the `Unknown` policy, which defaults to unlimited (0).
    pub fn max_days(&self, period: Period) -> u32 {
        let period = period.normalize();
        match self.days.get(&period) {
            Some(days) => *days,
            None => self.days.get(&Period::Unknown).copied().unwrap_or(0),
        }
    }

    pub fn set(&mut self, period: Period, days: u32) {
        self.days.insert(period.normalize(), days);
    }

    /// Apply overrides from a TOML config file:
    ///
    /// ```toml
    /// [retention]
    /// daily = 400
    /// annual = 0
    /// ```
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read retention config {:?}", path))?;
        let parsed: RetentionFile = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse retention config {:?}", path))?;
        for (key, days) in parsed.retention {
            self.set(Period::parse_key(&key)?, days);
        }
        Ok(())
    }

    /// Apply `period=days` overrides from the CLI, e.g. `daily=400`.
    pub fn apply_overrides(&mut self, pairs: &[String]) -> Result<()> {
        for pair in pairs {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                anyhow::anyhow!("Retention override must be 'period=days', got '{}'", pair)
            })?;
            let days: u32 = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid retention days in '{}'", pair))?;
            self.set(Period::parse_key(key.trim())?, days);
        }
        Ok(())
    }
}
