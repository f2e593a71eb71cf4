use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub cooling: CoolingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_session_dir")]
    pub session_dir: String,
    #[serde(default = "default_csv_log_path")]
    pub csv_log_path: String,
    #[serde(default = "default_markets_url")]
    pub markets_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    #[serde(default = "default_station_name")]
    pub name: String,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_series_ticker")]
    pub series_ticker: String,
    #[serde(default = "default_msn_url")]
    pub msn_url: String,
}

/// Weighting and confidence policy for the morning forecast consensus.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default = "default_weight")]
    pub default_weight: f64,
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,
    #[serde(default = "default_priority_sources")]
    pub priority_sources: Vec<String>,
    #[serde(default = "default_tolerance")]
    pub priority_tolerance: f64,
    #[serde(default = "default_tolerance")]
    pub agreement_tolerance: f64,
    #[serde(default = "default_priority_base_confidence")]
    pub priority_base_confidence: f64,
    #[serde(default = "default_base_confidence")]
    pub base_confidence: f64,
    #[serde(default = "default_penalty_divisor")]
    pub penalty_divisor: f64,
    #[serde(default = "default_max_penalty")]
    pub max_penalty: f64,
    #[serde(default = "default_single_source_factor")]
    pub single_source_factor: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_detected_confidence")]
    pub detected_confidence: f64,
    #[serde(default = "default_timed_out_confidence")]
    pub timed_out_confidence: f64,
    #[serde(default = "default_forecast_confidence")]
    pub forecast_confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoolingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_peak_hour")]
    pub max_peak_hour: u32,
    #[serde(default = "default_min_eval_hour")]
    pub min_eval_hour: u32,
    #[serde(default = "default_cooling_confidence")]
    pub confidence: f64,
}

fn default_database_path() -> String { "data/hightemp.db".to_string() }
fn default_session_dir() -> String { "data/monitoring".to_string() }
fn default_csv_log_path() -> String { "data/decisions.csv".to_string() }
fn default_markets_url() -> String { "https://api.elections.kalshi.com/trade-api/v2".to_string() }

fn default_station_name() -> String { "Central Park".to_string() }
fn default_latitude() -> f64 { 40.7831 }
fn default_longitude() -> f64 { -73.9712 }
fn default_utc_offset_hours() -> i32 { -5 }
fn default_timezone() -> String { "America/New_York".to_string() }
fn default_series_ticker() -> String { "KXHIGHNY".to_string() }
fn default_msn_url() -> String { "https://www.msn.com/en-us/weather/forecast/in-New-York,NY".to_string() }

fn default_weight() -> f64 { 1.0 }
fn default_weights() -> BTreeMap<String, f64> {
    [
        ("Foreca", 2.0),
        ("AerisWeather", 2.0),
        ("WeatherChannel", 2.0),
        ("MSN", 2.0),
        ("NWS", 1.5),
        ("OpenMeteo", 1.0),
    ]
    .into_iter()
    .map(|(name, w)| (name.to_string(), w))
    .collect()
}
fn default_priority_sources() -> Vec<String> {
    ["Foreca", "AerisWeather", "WeatherChannel", "MSN"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_tolerance() -> f64 { 1.0 }
fn default_priority_base_confidence() -> f64 { 0.85 }
fn default_base_confidence() -> f64 { 0.70 }
fn default_penalty_divisor() -> f64 { 3.0 }
fn default_max_penalty() -> f64 { 0.30 }
fn default_single_source_factor() -> f64 { 0.8 }

fn default_true() -> bool { true }
fn default_poll_interval() -> u64 { 300 }
fn default_max_polls() -> u32 { 12 }
fn default_window_minutes() -> i64 { 60 }
fn default_fetch_timeout() -> u64 { 10 }
fn default_detected_confidence() -> f64 { 0.90 }
fn default_timed_out_confidence() -> f64 { 0.75 }
fn default_forecast_confidence() -> f64 { 0.60 }

fn default_max_peak_hour() -> u32 { 1 }
fn default_min_eval_hour() -> u32 { 2 }
fn default_cooling_confidence() -> f64 { 0.99 }

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            session_dir: default_session_dir(),
            csv_log_path: default_csv_log_path(),
            markets_url: default_markets_url(),
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: default_station_name(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            utc_offset_hours: default_utc_offset_hours(),
            timezone: default_timezone(),
            series_ticker: default_series_ticker(),
            msn_url: default_msn_url(),
        }
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            default_weight: default_weight(),
            weights: default_weights(),
            priority_sources: default_priority_sources(),
            priority_tolerance: default_tolerance(),
            agreement_tolerance: default_tolerance(),
            priority_base_confidence: default_priority_base_confidence(),
            base_confidence: default_base_confidence(),
            penalty_divisor: default_penalty_divisor(),
            max_penalty: default_max_penalty(),
            single_source_factor: default_single_source_factor(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
            max_polls: default_max_polls(),
            window_minutes: default_window_minutes(),
            fetch_timeout_secs: default_fetch_timeout(),
            detected_confidence: default_detected_confidence(),
            timed_out_confidence: default_timed_out_confidence(),
            forecast_confidence: default_forecast_confidence(),
        }
    }
}

impl Default for CoolingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_peak_hour: default_max_peak_hour(),
            min_eval_hour: default_min_eval_hour(),
            confidence: default_cooling_confidence(),
        }
    }
}

impl StationConfig {
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .with_context(|| format!("Invalid utc_offset_hours: {}", self.utc_offset_hours))
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub markets_url: Option<String>,
    pub nws_user_agent: String,
    pub database_path: Option<String>,
    pub weatherapi_key: Option<String>,
    pub openweathermap_api_key: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects policies that would break the confidence ladder or the poll loop bounds.
    pub fn validate(&self) -> Result<()> {
        let m = &self.monitoring;
        if !(m.detected_confidence > m.timed_out_confidence
            && m.timed_out_confidence > m.forecast_confidence)
        {
            bail!(
                "monitoring confidences must be strictly ordered detected > timed_out > forecast, got {} / {} / {}",
                m.detected_confidence,
                m.timed_out_confidence,
                m.forecast_confidence
            );
        }
        if m.max_polls == 0 {
            bail!("monitoring.max_polls must be at least 1");
        }
        if self.consensus.default_weight <= 0.0 {
            bail!("consensus.default_weight must be positive");
        }
        if let Some((name, w)) = self.consensus.weights.iter().find(|(_, w)| **w <= 0.0) {
            bail!("consensus weight for {} must be positive, got {}", name, w);
        }
        if self.consensus.penalty_divisor <= 0.0 {
            bail!("consensus.penalty_divisor must be positive");
        }
        self.station.utc_offset()?;
        Ok(())
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            markets_url: std::env::var("KALSHI_MARKETS_URL").ok(),
            nws_user_agent: std::env::var("NWS_USER_AGENT")
                .unwrap_or_else(|_| "HighTempBot/1.0".to_string()),
            database_path: std::env::var("HIGHTEMP_DATABASE_PATH").ok(),
            weatherapi_key: non_empty_var("WEATHERAPI_KEY"),
            openweathermap_api_key: non_empty_var("OPENWEATHERMAP_API_KEY"),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.monitoring.max_polls, 12);
        assert_eq!(config.consensus.weights.get("MSN"), Some(&2.0));
        assert_eq!(config.cooling.max_peak_hour, 1);
        assert!(config.station.msn_url.starts_with("https://www.msn.com/"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [monitoring]
            poll_interval_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.monitoring.poll_interval_secs, 30);
        assert_eq!(config.monitoring.window_minutes, 60);
    }

    #[test]
    fn test_rejects_unordered_confidence_ladder() {
        let result = Config::from_toml(
            r#"
            [monitoring]
            detected_confidence = 0.70
            timed_out_confidence = 0.75
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_non_positive_weight() {
        let result = Config::from_toml(
            r#"
            [consensus.weights]
            NWS = 0.0
            "#,
        );
        assert!(result.is_err());
    }
}
