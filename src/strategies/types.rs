use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::data::types::TemperatureObservation;
use crate::market::types::MarketRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    ConsensusForecast,
    ObservedPeak,
    CoolingTrendObserved,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::ConsensusForecast => "consensus_forecast",
            Strategy::ObservedPeak => "observed_peak",
            Strategy::CoolingTrendObserved => "cooling_trend_observed",
        };
        write!(f, "{}", name)
    }
}

impl Strategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "consensus_forecast" => Some(Strategy::ConsensusForecast),
            "observed_peak" => Some(Strategy::ObservedPeak),
            "cooling_trend_observed" => Some(Strategy::CoolingTrendObserved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// NaN when there were no samples.
    pub value: f64,
    pub confidence: f64,
    pub agreement_rate: f64,
    /// Signed `temperature - value` per source.
    pub deviations: BTreeMap<String, f64>,
    pub sample_count: usize,
}

impl ConsensusResult {
    pub fn is_usable(&self) -> bool {
        self.sample_count > 0 && self.value.is_finite()
    }
}

/// Which rung of the confidence ladder a monitoring result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakBasis {
    DecliningTrend,
    HighestObserved,
    Forecast,
}

impl fmt::Display for PeakBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeakBasis::DecliningTrend => "declining_trend",
            PeakBasis::HighestObserved => "highest_observed",
            PeakBasis::Forecast => "forecast",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringResult {
    pub detected_max_temp: f64,
    pub detected_max_time: DateTime<FixedOffset>,
    pub confidence: f64,
    pub basis: PeakBasis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorState {
    Idle,
    WaitingForWindow,
    Monitoring,
    Detected,
    TimedOut,
    Closed,
}

/// Why the poll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEnd {
    Detected,
    TimedOut,
    Cancelled,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEnd::Detected => "detected",
            SessionEnd::TimedOut => "timed_out",
            SessionEnd::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Frozen record of one day's monitoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSession {
    pub date: NaiveDate,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub predicted_max_hour: u32,
    pub predicted_max_temp: f64,
    pub observations: Vec<TemperatureObservation>,
    pub detected_max_temp: f64,
    pub detected_max_time: DateTime<FixedOffset>,
    pub confidence: f64,
    pub basis: PeakBasis,
    pub end_reason: SessionEnd,
    pub polls: u32,
    pub decided_bucket: MarketRange,
}

impl MonitoringSession {
    pub fn result(&self) -> MonitoringResult {
        MonitoringResult {
            detected_max_temp: self.detected_max_temp,
            detected_max_time: self.detected_max_time,
            confidence: self.confidence,
            basis: self.basis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDecision {
    pub date: NaiveDate,
    pub temperature_estimate: f64,
    pub confidence: f64,
    pub matched_range: MarketRange,
    pub strategy_used: Strategy,
}
