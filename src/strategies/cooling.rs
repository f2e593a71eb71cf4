use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use tracing::{debug, info};

use crate::config::CoolingConfig;
use crate::data::types::PeakForecast;

/// A day whose maximum already happened around midnight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoolingOpportunity {
    pub observed_temp: f64,
    pub max_temp_hour: u32,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct CoolingTrendDetector {
    config: CoolingConfig,
}

impl CoolingTrendDetector {
    pub fn new(config: CoolingConfig) -> Self {
        Self { config }
    }

    /// True when the forecast puts the daily maximum in the first hours of the day.
    pub fn is_cooling_day(&self, peak: &PeakForecast) -> bool {
        self.config.enabled && peak.hour <= self.config.max_peak_hour
    }

    /// True once the early peak can have been observed.
    pub fn observation_available(&self, date: NaiveDate, now: DateTime<FixedOffset>) -> bool {
        let today = now.date_naive();
        today > date || (today == date && now.hour() >= self.config.min_eval_hour)
    }

    /// Evaluate a cooling-trend opportunity.
    ///
    /// `observed` is the station reading taken after the early peak; without it
    /// the day is not eligible and the caller moves on to the next strategy.
    pub fn evaluate(
        &self,
        date: NaiveDate,
        now: DateTime<FixedOffset>,
        peak: Option<&PeakForecast>,
        observed: Option<f64>,
    ) -> Option<CoolingOpportunity> {
        let peak = peak?;
        if !self.is_cooling_day(peak) {
            debug!("Not a cooling day: forecast max at {}:00", peak.hour);
            return None;
        }
        if !self.observation_available(date, now) {
            info!(
                "Cooling day but still early ({}), waiting for observed data",
                now.format("%H:%M")
            );
            return None;
        }
        let observed_temp = match observed {
            Some(t) if t.is_finite() => t,
            _ => {
                info!("Cooling day but no observed temperature available");
                return None;
            }
        };

        info!(
            "Cooling trend: forecast max at {}:00, observed {:.1}°F",
            peak.hour, observed_temp
        );
        Some(CoolingOpportunity {
            observed_temp,
            max_temp_hour: peak.hour,
            confidence: self.config.confidence,
        })
    }
}

impl Default for CoolingTrendDetector {
    fn default() -> Self {
        Self::new(CoolingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 5).unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 1, day, hour, 0, 0)
            .unwrap()
    }

    fn early_peak() -> PeakForecast {
        PeakForecast { hour: 0, temperature: 48.0 }
    }

    #[test]
    fn test_early_peak_after_eval_hour_is_eligible() {
        let detector = CoolingTrendDetector::default();
        let opp = detector
            .evaluate(date(), at(5, 3), Some(&early_peak()), Some(47.5))
            .unwrap();
        assert_eq!(opp.observed_temp, 47.5);
        assert_eq!(opp.confidence, 0.99);
        assert_eq!(opp.max_temp_hour, 0);
    }

    #[test]
    fn test_too_early_in_the_day() {
        let detector = CoolingTrendDetector::default();
        assert!(detector
            .evaluate(date(), at(5, 1), Some(&early_peak()), Some(47.5))
            .is_none());
        // Next day is always past the peak.
        assert!(detector
            .evaluate(date(), at(6, 0), Some(&early_peak()), Some(47.5))
            .is_some());
    }

    #[test]
    fn test_afternoon_peak_not_eligible() {
        let detector = CoolingTrendDetector::default();
        let peak = PeakForecast { hour: 15, temperature: 60.0 };
        assert!(detector.evaluate(date(), at(5, 16), Some(&peak), Some(59.0)).is_none());
        assert!(!detector.is_cooling_day(&PeakForecast { hour: 2, temperature: 60.0 }));
        assert!(detector.is_cooling_day(&PeakForecast { hour: 1, temperature: 60.0 }));
    }

    #[test]
    fn test_missing_inputs_fall_through() {
        let detector = CoolingTrendDetector::default();
        assert!(detector.evaluate(date(), at(5, 3), None, Some(47.5)).is_none());
        assert!(detector.evaluate(date(), at(5, 3), Some(&early_peak()), None).is_none());
    }

    #[test]
    fn test_disabled() {
        let detector = CoolingTrendDetector::new(CoolingConfig {
            enabled: false,
            ..CoolingConfig::default()
        });
        assert!(detector
            .evaluate(date(), at(5, 3), Some(&early_peak()), Some(47.5))
            .is_none());
    }
}
