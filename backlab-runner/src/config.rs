//! Serializable run configuration.
//!
//! A run is described by a TOML file:
//!
//! ```toml
//! [run]
//! start_date = "2023-01-02"
//! end_date = "2023-12-29"
//! initial_capital = 100000000.0
//! fractional_shares = false
//! risk_free_rate = 0.035
//! instruments = ["005930", "000660"]
//!
//! [cost]
//! slippage_rate = 0.001
//! commission_rate = 0.00015
//! tax_rate = 0.0018
//!
//! [strategy]
//! type = "trailing_stop"
//! lookback = 20
//! stop = { mode = "volatility", multiplier = 2.0, min_pct = 0.05, max_pct = 0.15 }
//! ```

use backlab_core::engine::EngineConfig;
use backlab_core::execution::CostConfig;
use backlab_core::policy::{Policy, Sizing};
use backlab_core::EngineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Content hash of a canonical config. Equal configs share a run id.
pub type RunId = String;

pub const DEFAULT_RISK_FREE_RATE: f64 = 0.035;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<EngineError> for ConfigError {
    fn from(e: EngineError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

/// `[run]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSection {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    #[serde(default)]
    pub fractional_shares: bool,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Calendar days of history loaded before `start_date` so indicators
    /// are warm on the first trading day.
    #[serde(default)]
    pub warmup_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Instruments to trade. May instead come from a universe file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instruments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
}

fn default_risk_free_rate() -> f64 {
    DEFAULT_RISK_FREE_RATE
}

/// Everything needed to reproduce one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub run: RunSection,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub strategy: Policy,
}

impl RunConfig {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, initial_capital: f64) -> Self {
        Self {
            run: RunSection {
                start_date,
                end_date,
                initial_capital,
                fractional_shares: false,
                risk_free_rate: DEFAULT_RISK_FREE_RATE,
                warmup_days: 0,
                label: None,
                instruments: Vec::new(),
                benchmark: None,
            },
            cost: CostConfig::default(),
            strategy: Policy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: Policy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cost(mut self, cost: CostConfig) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_instruments<I, S>(mut self, instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run.instruments = instruments.into_iter().map(Into::into).collect();
        self
    }

    /// Parse and validate a TOML config.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Checks that do not need price data. Strategy parameters that refer
    /// to instruments are checked against `run.instruments` when present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine_config().validate()?;
        if !self.run.risk_free_rate.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "risk_free_rate must be finite, got {}",
                self.run.risk_free_rate
            )));
        }
        if !self.run.instruments.is_empty() {
            self.strategy
                .validate(&self.run.instruments)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    pub fn sizing(&self) -> Sizing {
        if self.run.fractional_shares {
            Sizing::Fractional
        } else {
            Sizing::WholeUnits
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.run.start_date, self.run.end_date, self.run.initial_capital)
            .with_cost(self.cost)
            .with_sizing(self.sizing())
    }

    /// First date to request from the provider, including warmup.
    pub fn history_start(&self) -> NaiveDate {
        self.run.start_date - chrono::Duration::days(i64::from(self.run.warmup_days))
    }

    /// BLAKE3 hash of the canonical JSON form.
    pub fn run_id(&self) -> RunId {
        let canonical = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }

    /// Display label: explicit label or the strategy name.
    pub fn label(&self) -> String {
        self.run
            .label
            .clone()
            .unwrap_or_else(|| self.strategy.name().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlab_core::policy::{ReentryRule, StopRule};

    const MINIMAL: &str = r#"
[run]
start_date = "2024-01-02"
end_date = "2024-06-28"
initial_capital = 1000000.0
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = RunConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.cost, CostConfig::frictionless());
        assert_eq!(config.strategy, Policy::default());
        assert!(!config.run.fractional_shares);
        assert!((config.run.risk_free_rate - 0.035).abs() < 1e-12);
        assert_eq!(config.history_start(), config.run.start_date);
    }

    #[test]
    fn strategy_table_selects_policy_and_params() {
        let toml = format!(
            "{MINIMAL}\n[cost]\nslippage_rate = 0.001\ntax_rate = 0.0018\n\n\
             [strategy]\ntype = \"trailing_stop\"\nlookback = 15\ncooldown = 3\n\
             reentry = \"after_cooldown\"\nstop = {{ mode = \"fixed\", pct = 0.05 }}\n"
        );
        let config = RunConfig::from_toml(&toml).unwrap();
        assert!((config.cost.slippage_rate - 0.001).abs() < 1e-12);
        assert_eq!(config.cost.commission_rate, 0.0);
        match config.strategy {
            Policy::TrailingStop(p) => {
                assert_eq!(p.lookback, 15);
                assert_eq!(p.cooldown, 3);
                assert_eq!(p.reentry, ReentryRule::AfterCooldown);
                assert_eq!(p.stop, StopRule::Fixed { pct: 0.05 });
            }
            other => panic!("expected trailing_stop, got {}", other.name()),
        }
    }

    #[test]
    fn unknown_strategy_type_is_a_parse_error() {
        let toml = format!("{MINIMAL}\n[strategy]\ntype = \"martingale\"\n");
        assert!(matches!(
            RunConfig::from_toml(&toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn reversed_dates_are_invalid() {
        let toml = r#"
[run]
start_date = "2024-06-28"
end_date = "2024-01-02"
initial_capital = 1000.0
"#;
        assert!(matches!(
            RunConfig::from_toml(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn negative_cost_rate_is_invalid() {
        let toml = format!("{MINIMAL}\n[cost]\ncommission_rate = -0.01\n");
        assert!(matches!(
            RunConfig::from_toml(&toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn custom_weights_outside_instruments_are_invalid() {
        let toml = r#"
[run]
start_date = "2024-01-02"
end_date = "2024-06-28"
initial_capital = 1000.0
instruments = ["A", "B"]

[strategy]
type = "custom_weights"
weights = { A = 0.5, Z = 0.5 }
"#;
        assert!(matches!(
            RunConfig::from_toml(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn run_id_is_deterministic_and_param_sensitive() {
        let a = RunConfig::from_toml(MINIMAL).unwrap();
        let b = RunConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(a.run_id(), b.run_id());
        assert_eq!(a.run_id().len(), 64);

        let mut c = a.clone();
        c.run.initial_capital = 2_000_000.0;
        assert_ne!(a.run_id(), c.run_id());
    }

    #[test]
    fn toml_round_trip() {
        let config = RunConfig::from_toml(MINIMAL)
            .unwrap()
            .with_instruments(["A", "B"])
            .with_cost(CostConfig::new(0.001, 0.0002, 0.002));
        let text = config.to_toml().unwrap();
        assert_eq!(RunConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn warmup_moves_history_start_back() {
        let mut config = RunConfig::from_toml(MINIMAL).unwrap();
        config.run.warmup_days = 30;
        assert_eq!(
            config.history_start(),
            NaiveDate::from_ymd_opt(2023, 12, 3).unwrap()
        );
    }

    #[test]
    fn fractional_flag_maps_to_sizing() {
        let mut config = RunConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.sizing(), Sizing::WholeUnits);
        config.run.fractional_shares = true;
        assert_eq!(config.engine_config().sizing, Sizing::Fractional);
    }
}
