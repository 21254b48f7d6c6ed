use anyhow::Context;
use karts_types::domain::pricing::PricingPolicy;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SIGN_IN_LATENCY: Duration = Duration::from_millis(1500);
pub const DEFAULT_SIGN_UP_LATENCY: Duration = Duration::from_millis(2000);

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub sign_in_latency: Duration,
    pub sign_up_latency: Duration,
    pub pricing: PricingPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            sign_in_latency: DEFAULT_SIGN_IN_LATENCY,
            sign_up_latency: DEFAULT_SIGN_UP_LATENCY,
            pricing: PricingPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let sign_in_latency = parse_millis(&lookup, "KARTS_SIGN_IN_LATENCY_MS")?
            .unwrap_or(defaults.sign_in_latency);
        let sign_up_latency = parse_millis(&lookup, "KARTS_SIGN_UP_LATENCY_MS")?
            .unwrap_or(defaults.sign_up_latency);
        let pricing = PricingPolicy {
            delivery_fee: parse_decimal(&lookup, "KARTS_DELIVERY_FEE")?
                .unwrap_or(defaults.pricing.delivery_fee),
            service_fee: parse_decimal(&lookup, "KARTS_SERVICE_FEE")?
                .unwrap_or(defaults.pricing.service_fee),
            tax_rate: parse_decimal(&lookup, "KARTS_TAX_RATE")?
                .unwrap_or(defaults.pricing.tax_rate),
        };
        Ok(Self {
            database_url,
            sign_in_latency,
            sign_up_latency,
            pricing,
        })
    }
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<Duration>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .with_context(|| format!("{key} must be a whole number of milliseconds, got {raw:?}"))
        })
        .transpose()
}

fn parse_decimal(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<Decimal>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value = Decimal::from_str(raw.trim())
        .with_context(|| format!("{key} must be a decimal amount, got {raw:?}"))?;
    if value < Decimal::ZERO {
        anyhow::bail!("{key} must not be negative, got {value}");
    }
    Ok(Some(value))
}
