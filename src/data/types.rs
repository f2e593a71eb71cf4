use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One provider's forecast for the day's high.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSample {
    pub source: String,
    pub temperature: f64,
    pub observed_at: DateTime<FixedOffset>,
}

impl ForecastSample {
    pub fn new(source: impl Into<String>, temperature: f64, observed_at: DateTime<FixedOffset>) -> Self {
        Self {
            source: source.into(),
            temperature,
            observed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObservationSource {
    /// Authoritative station feed the market settles on.
    PrimaryObservationStation,
    SecondaryModel,
}

impl fmt::Display for ObservationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationSource::PrimaryObservationStation => write!(f, "primary"),
            ObservationSource::SecondaryModel => write!(f, "secondary"),
        }
    }
}

impl ObservationSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(ObservationSource::PrimaryObservationStation),
            "secondary" => Some(ObservationSource::SecondaryModel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureObservation {
    pub timestamp: DateTime<FixedOffset>,
    pub source: ObservationSource,
    pub temperature: f64,
    pub is_forecast: bool,
}

/// Forecast shape of the day: when and how hot the high is expected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakForecast {
    pub hour: u32,
    pub temperature: f64,
}

impl PeakForecast {
    /// Picks the hottest hour from `(hour, temp)` pairs; the earliest hour wins ties.
    pub fn from_hourly(hourly: &[(u32, f64)]) -> Option<Self> {
        let mut best: Option<PeakForecast> = None;
        for &(hour, temperature) in hourly {
            if temperature.is_nan() {
                continue;
            }
            match best {
                Some(b) if temperature <= b.temperature => {}
                _ => best = Some(PeakForecast { hour, temperature }),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_forecast_earliest_tie() {
        let hourly = vec![(0, 50.0), (13, 58.0), (14, 58.0), (15, 57.0)];
        let peak = PeakForecast::from_hourly(&hourly).unwrap();
        assert_eq!(peak.hour, 13);
        assert_eq!(peak.temperature, 58.0);
    }

    #[test]
    fn test_peak_forecast_empty() {
        assert!(PeakForecast::from_hourly(&[]).is_none());
    }

    #[test]
    fn test_observation_source_round_trip_label() {
        for tag in [
            ObservationSource::PrimaryObservationStation,
            ObservationSource::SecondaryModel,
        ] {
            assert_eq!(ObservationSource::parse(&tag.to_string()), Some(tag));
        }
    }
}
