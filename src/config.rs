use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

pub const PAYBACK_MONTHS: &str = "payback_months";
pub const FORECAST_UPLIFT: &str = "forecast_uplift";
pub const FORECAST_LOOKBACK_MONTHS: &str = "forecast_lookback_months";
pub const COVERAGE_LOOKBACK_MONTHS: &str = "coverage_lookback_months";
pub const BOOK_TO_BILL_FALLBACK: &str = "book_to_bill_fallback";
pub const NRR_FALLBACK: &str = "nrr_fallback";
pub const CURRENCY_UNIT: &str = "currency_unit";
pub const CACHE_TTL_SECS: &str = "cache_ttl_secs";

/// Upper bound for the trailing lookbacks, in months.
pub const MAX_LOOKBACK_MONTHS: u32 = 120;

/// Every key `config set` accepts.
pub const KNOWN_KEYS: &[&str] = &[
    PAYBACK_MONTHS,
    FORECAST_UPLIFT,
    FORECAST_LOOKBACK_MONTHS,
    COVERAGE_LOOKBACK_MONTHS,
    BOOK_TO_BILL_FALLBACK,
    NRR_FALLBACK,
    CURRENCY_UNIT,
    CACHE_TTL_SECS,
];

/// Policy constants for the aggregation rules.
///
/// Any of them can be overridden through the `app_config` table
/// (`execkpi config set <key> <value>`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    /// Static payback figure reported as-is.
    pub payback_months: f64,
    /// Multiplier applied to the trailing recognized average when forecasting.
    pub forecast_uplift: f64,
    pub forecast_lookback_months: u32,
    /// Denominator window for coverage months, independent of the requested range.
    pub coverage_lookback_months: u32,
    pub book_to_bill_fallback: f64,
    pub nrr_fallback: f64,
    pub currency_unit: String,
    pub cache_ttl_secs: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            payback_months: 9.0,
            forecast_uplift: 1.02,
            forecast_lookback_months: 3,
            coverage_lookback_months: 6,
            book_to_bill_fallback: 1.0,
            nrr_fallback: 1.0,
            currency_unit: "¥".to_string(),
            cache_ttl_secs: 30,
        }
    }
}

impl Policy {
    /// Build a policy from stored key/value overrides. Unknown keys and values
    /// that fail to parse are logged and skipped.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut policy = Self::default();
        for (key, value) in pairs {
            if let Err(e) = policy.apply(key, value) {
                log::warn!("Ignoring config {key}={value}: {e}");
            }
        }
        policy
    }

    /// Apply one override in place.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            PAYBACK_MONTHS => self.payback_months = parse_f64(key, value)?,
            FORECAST_UPLIFT => self.forecast_uplift = parse_f64(key, value)?,
            FORECAST_LOOKBACK_MONTHS => self.forecast_lookback_months = parse_months(key, value)?,
            COVERAGE_LOOKBACK_MONTHS => self.coverage_lookback_months = parse_months(key, value)?,
            BOOK_TO_BILL_FALLBACK => self.book_to_bill_fallback = parse_f64(key, value)?,
            NRR_FALLBACK => self.nrr_fallback = parse_f64(key, value)?,
            CURRENCY_UNIT => self.currency_unit = value.trim().to_string(),
            CACHE_TTL_SECS => {
                self.cache_ttl_secs = value
                    .trim()
                    .parse()
                    .map_err(|_| Error::Config(format!("{key} must be a whole number of seconds")))?
            }
            _ => return Err(Error::Config(format!("unknown config key: {key}"))),
        }
        Ok(())
    }

    /// Check a key/value pair without keeping the result.
    pub fn validate(key: &str, value: &str) -> Result<()> {
        Self::default().apply(key, value)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_f64(key: &str, value: &str) -> Result<f64> {
    let v: f64 = value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a number, got '{value}'")))?;
    if !v.is_finite() {
        return Err(Error::Config(format!("{key} must be finite")));
    }
    Ok(v)
}

fn parse_months(key: &str, value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(n) if (1..=MAX_LOOKBACK_MONTHS).contains(&n) => Ok(n),
        _ => Err(Error::Config(format!(
            "{key} must be between 1 and {MAX_LOOKBACK_MONTHS} months, got '{value}'"
        ))),
    }
}
