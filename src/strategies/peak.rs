//! Declining-trend detection over the primary station's readings.
//!
//! With primary readings `.., a, b, c` (oldest to newest) a decline is
//! declared when `c < b && b <= a`. The detected peak is then the highest
//! primary reading of the whole session, earliest on ties. Secondary-model
//! readings are recorded but never gate detection or the fallback.

use chrono::{DateTime, FixedOffset};

use crate::config::MonitoringConfig;
use crate::data::types::{ObservationSource, TemperatureObservation};
use crate::strategies::types::{MonitoringResult, PeakBasis};
use crate::strategies::window::ObservationWindow;

const TREND_LENGTH: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Undetermined,
    DecliningTrend { peak: TemperatureObservation },
}

impl Detection {
    pub fn is_declining(&self) -> bool {
        matches!(self, Detection::DecliningTrend { .. })
    }
}

/// Fixed confidence for each rung of the fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceLadder {
    pub detected: f64,
    pub timed_out: f64,
    pub forecast: f64,
}

impl Default for ConfidenceLadder {
    fn default() -> Self {
        Self::from(&MonitoringConfig::default())
    }
}

impl From<&MonitoringConfig> for ConfidenceLadder {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            detected: config.detected_confidence,
            timed_out: config.timed_out_confidence,
            forecast: config.forecast_confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PeakDetector {
    ladder: ConfidenceLadder,
}

impl PeakDetector {
    pub fn new(ladder: ConfidenceLadder) -> Self {
        Self { ladder }
    }

    pub fn ladder(&self) -> ConfidenceLadder {
        self.ladder
    }

    pub fn detect(&self, window: &ObservationWindow) -> Detection {
        let recent = window.last_of(ObservationSource::PrimaryObservationStation, TREND_LENGTH);
        if recent.len() < TREND_LENGTH {
            return Detection::Undetermined;
        }

        let (a, b, c) = (recent[0].temperature, recent[1].temperature, recent[2].temperature);
        if !(c < b && b <= a) {
            return Detection::Undetermined;
        }

        match highest_primary(window) {
            Some(peak) => Detection::DecliningTrend { peak: peak.clone() },
            None => Detection::Undetermined,
        }
    }

    /// Turn a detection (or the lack of one) into a result using the fallback ladder.
    pub fn resolve(
        &self,
        detection: &Detection,
        window: &ObservationWindow,
        predicted_max_temp: f64,
        now: DateTime<FixedOffset>,
    ) -> MonitoringResult {
        if let Detection::DecliningTrend { peak } = detection {
            return MonitoringResult {
                detected_max_temp: peak.temperature,
                detected_max_time: peak.timestamp,
                confidence: self.ladder.detected,
                basis: PeakBasis::DecliningTrend,
            };
        }

        match highest_primary(window) {
            Some(peak) => MonitoringResult {
                detected_max_temp: peak.temperature,
                detected_max_time: peak.timestamp,
                confidence: self.ladder.timed_out,
                basis: PeakBasis::HighestObserved,
            },
            None => MonitoringResult {
                detected_max_temp: predicted_max_temp,
                detected_max_time: now,
                confidence: self.ladder.forecast,
                basis: PeakBasis::Forecast,
            },
        }
    }
}

/// Highest primary reading, earliest on ties.
pub fn highest_primary(window: &ObservationWindow) -> Option<&TemperatureObservation> {
    window
        .of(ObservationSource::PrimaryObservationStation)
        .fold(None, |best: Option<&TemperatureObservation>, o| match best {
            Some(b) if o.temperature <= b.temperature => Some(b),
            _ => Some(o),
        })
}
