//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Brokerage credentials never live in the file: they are discovered from
//! the environment by [`crate::accounts::AccountRegistry`]. Other secrets
//! (the webhook URL) are referenced by env-var name and resolved at runtime.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::accounts::{PAPER_BASE_URL, REAL_BASE_URL};
use crate::types::Mode;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub trading: TradingConfig,
    pub broker: BrokerConfig,
    pub risk: RiskConfig,
    pub scalp: ScalpConfig,
    pub schedule: ScheduleConfig,
    pub notify: NotifyConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TradingConfig {
    pub mode: Mode,
    /// Directory holding token and scalp state files.
    pub data_dir: PathBuf,
    /// Explicit real account number; the first discovered one otherwise.
    pub real_account: Option<String>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Paper,
            data_dir: PathBuf::from("data"),
            real_account: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub real_base_url: String,
    pub paper_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            real_base_url: REAL_BASE_URL.to_string(),
            paper_base_url: PAPER_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Static order-size bounds. Read-only, process-wide.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub min_order_amount: Decimal,
    pub max_order_amount: Decimal,
    pub default_order_amount: Decimal,
    pub max_positions_per_day: usize,
    pub scalp_entry_amount: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_order_amount: dec!(100000),
            max_order_amount: dec!(5000000),
            default_order_amount: dec!(1000000),
            max_positions_per_day: 3,
            scalp_entry_amount: dec!(100000),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScalpConfig {
    pub enabled: bool,
    /// Scans run only inside `[window_start, window_end)`.
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    /// Percent.
    pub min_change_rate: Decimal,
    /// Percent.
    pub max_change_rate: Decimal,
    /// Strictly greater than this.
    pub min_volume: u64,
    pub approval_timeout_secs: u64,
}

impl Default for ScalpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_start: hm(9, 0),
            window_end: hm(15, 0),
            min_change_rate: dec!(5),
            max_change_rate: dec!(20),
            min_volume: 100_000,
            approval_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub daily_job_at: NaiveTime,
    pub scan_interval_mins: u32,
    pub liquidate_at: NaiveTime,
    pub weekdays_only: bool,
    pub tick_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_job_at: hm(8, 30),
            scan_interval_mins: 10,
            liquidate_at: hm(15, 20),
            weekdays_only: true,
            tick_secs: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NotifyConfig {
    /// Name of the env var holding a Discord-compatible webhook URL.
    pub webhook_url_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    /// Listen address. Loopback unless deliberately exposed.
    pub bind: String,
    pub port: u16,
    /// Name of the env var holding the shared token required by the
    /// approval and halt routes. Without it those routes refuse everything.
    pub token_env: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 8088,
            token_env: Some("AUTOTRADER_DASHBOARD_TOKEN".to_string()),
        }
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text and validate it.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject bounds that would make sizing non-monotonic.
    pub fn validate(&self) -> Result<()> {
        let r = &self.risk;
        if r.min_order_amount <= Decimal::ZERO {
            anyhow::bail!("risk.min_order_amount must be positive");
        }
        if !(r.min_order_amount <= r.default_order_amount
            && r.default_order_amount <= r.max_order_amount)
        {
            anyhow::bail!(
                "risk amounts must satisfy min <= default <= max (got {} / {} / {})",
                r.min_order_amount,
                r.default_order_amount,
                r.max_order_amount
            );
        }
        if self.scalp.window_start >= self.scalp.window_end {
            anyhow::bail!("scalp.window_start must be before scalp.window_end");
        }
        if self.scalp.min_change_rate > self.scalp.max_change_rate {
            anyhow::bail!("scalp.min_change_rate must not exceed scalp.max_change_rate");
        }
        if self.schedule.scan_interval_mins == 0 {
            anyhow::bail!("schedule.scan_interval_mins must be at least 1");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Webhook URL, if one is configured and present in the environment.
    pub fn webhook_url(&self) -> Option<String> {
        self.notify
            .webhook_url_env
            .as_deref()
            .and_then(|name| Self::resolve_env(name).ok())
            .filter(|url| !url.is_empty())
    }

    /// Dashboard control token, if one is configured and present.
    pub fn dashboard_token(&self) -> Option<String> {
        self.dashboard
            .token_env
            .as_deref()
            .and_then(|name| Self::resolve_env(name).ok())
            .filter(|token| !token.trim().is_empty())
    }
}
