use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::data::types::PeakForecast;
use crate::error::DecisionError;
use crate::market::range::{classify, parse_listings};
use crate::market::types::{MarketListing, MarketRange};
use crate::monitoring::metrics;
use crate::strategies::consensus::ConsensusEstimator;
use crate::strategies::cooling::CoolingTrendDetector;
use crate::strategies::monitor::{ContinuousMonitor, MonitorPlan};
use crate::strategies::types::{MonitoringResult, MonitoringSession, Strategy, TradingDecision};

/// Frozen snapshot of everything known about one trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayInputs {
    pub date: NaiveDate,
    pub now: DateTime<FixedOffset>,
    /// Morning forecast per source; missing sources are simply absent.
    pub forecasts: BTreeMap<String, f64>,
    pub peak_forecast: Option<PeakForecast>,
    /// Current primary station reading, used by the cooling strategy.
    pub observed_now: Option<f64>,
    pub listings: Vec<MarketListing>,
}

/// Result of a full day: the decision plus the monitoring session if one ran.
#[derive(Debug)]
pub struct DayOutcome {
    pub decision: Result<TradingDecision, DecisionError>,
    pub session: Option<MonitoringSession>,
}

/// Picks a strategy for the day and maps its estimate onto a market range.
///
/// Order: cooling trend, then observed peak, then forecast consensus.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    consensus: ConsensusEstimator,
    cooling: CoolingTrendDetector,
}

impl DecisionEngine {
    pub fn new(consensus: ConsensusEstimator, cooling: CoolingTrendDetector) -> Self {
        Self { consensus, cooling }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ConsensusEstimator::from_config(&config.consensus),
            CoolingTrendDetector::new(config.cooling.clone()),
        )
    }

    fn cooling_estimate(&self, inputs: &DayInputs) -> Option<(f64, f64)> {
        self.cooling
            .evaluate(
                inputs.date,
                inputs.now,
                inputs.peak_forecast.as_ref(),
                inputs.observed_now,
            )
            .map(|opp| (opp.observed_temp, opp.confidence))
    }

    /// Pure selection over a frozen snapshot.
    pub fn decide(
        &self,
        inputs: &DayInputs,
        monitoring: Option<&MonitoringResult>,
    ) -> Result<TradingDecision, DecisionError> {
        let (value, confidence, strategy) = if let Some((v, c)) = self.cooling_estimate(inputs) {
            (v, c, Strategy::CoolingTrendObserved)
        } else if let Some(result) = monitoring {
            (result.detected_max_temp, result.confidence, Strategy::ObservedPeak)
        } else {
            let consensus = self.consensus.estimate(&inputs.forecasts);
            if !consensus.is_usable() {
                return Err(DecisionError::InsufficientData(format!(
                    "no forecast samples for {}",
                    inputs.date
                )));
            }
            info!(
                "Consensus {:.1}°F from {} sources (agreement {:.0}%)",
                consensus.value,
                consensus.sample_count,
                consensus.agreement_rate * 100.0
            );
            (consensus.value, consensus.confidence, Strategy::ConsensusForecast)
        };

        let ranges = parse_listings(&inputs.listings);
        let matched = match_range(value, &ranges)?;

        metrics::record_decision(strategy);
        info!(
            "Decision for {}: {:.1}°F -> {} ({}, confidence {:.0}%)",
            inputs.date,
            value,
            matched,
            strategy,
            confidence * 100.0
        );

        Ok(TradingDecision {
            date: inputs.date,
            temperature_estimate: value,
            confidence,
            matched_range: matched.clone(),
            strategy_used: strategy,
        })
    }

    /// Run the whole day: cooling check, optional live monitoring, decision.
    ///
    /// The monitor only runs when no cooling opportunity exists and an hourly
    /// peak forecast is available to place the window.
    pub async fn decide_day(
        &self,
        inputs: &DayInputs,
        monitor: Option<ContinuousMonitor>,
        cancel: CancellationToken,
    ) -> DayOutcome {
        let mut session = None;

        if self.cooling_estimate(inputs).is_none() {
            match (monitor, inputs.peak_forecast) {
                (Some(monitor), Some(peak)) => {
                    let plan = MonitorPlan { date: inputs.date, peak };
                    let ranges = parse_listings(&inputs.listings);
                    let report = monitor.run(&plan, &ranges, cancel).await;
                    session = Some(report.session);
                }
                (Some(_), None) => {
                    warn!("No hourly peak forecast, skipping live monitoring");
                }
                (None, _) => {}
            }
        }

        let monitoring = session.as_ref().map(MonitoringSession::result);
        DayOutcome {
            decision: self.decide(inputs, monitoring.as_ref()),
            session,
        }
    }
}

fn match_range(value: f64, ranges: &[MarketRange]) -> Result<&MarketRange, DecisionError> {
    classify(value, ranges).ok_or_else(|| {
        warn!("{:.1}°F matches none of {} market ranges, no trade", value, ranges.len());
        DecisionError::NotFound(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{ConsensusConfig, MonitoringConfig};
    use crate::data::sources::stubs::ScriptedFeed;
    use crate::market::range::fixtures::daily_listings;
    use crate::strategies::consensus::{ConfidencePolicy, WeightPolicy};
    use crate::strategies::types::{PeakBasis, SessionEnd};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 5, hour, 0, 0)
            .unwrap()
    }

    fn forecasts(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, t)| (s.to_string(), *t)).collect()
    }

    fn scenario_engine() -> DecisionEngine {
        let weights = WeightPolicy {
            per_source_weight: forecasts(&[("NWS", 2.0), ("MSN", 2.0)]),
            default_weight: 1.0,
        };
        let policy = ConfidencePolicy {
            priority_sources: vec!["NWS".to_string(), "MSN".to_string()],
            ..ConfidencePolicy::from(&ConsensusConfig::default())
        };
        DecisionEngine::new(ConsensusEstimator::new(weights, policy), CoolingTrendDetector::default())
    }

    fn scenario_inputs() -> DayInputs {
        DayInputs {
            date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            now: at(9),
            forecasts: forecasts(&[("OpenMeteo", 57.0), ("NWS", 58.0), ("MSN", 58.5)]),
            peak_forecast: Some(PeakForecast { hour: 14, temperature: 58.5 }),
            observed_now: Some(45.0),
            listings: vec![
                MarketListing::new("T-57", "57° to 58°"),
                MarketListing::new("T-58", "58° to 59°"),
                MarketListing::new("T-59", "59° to 60°"),
            ],
        }
    }

    #[test]
    fn test_consensus_scenario_end_to_end() {
        let decision = scenario_engine().decide(&scenario_inputs(), None).unwrap();
        assert_eq!(decision.strategy_used, Strategy::ConsensusForecast);
        assert!((decision.temperature_estimate - 58.0).abs() < 1e-9);
        assert!((decision.confidence - 0.635).abs() < 1e-3);
        // 58.0 sits on the shared boundary; the first listed range wins.
        assert_eq!(decision.matched_range.ticker, "T-57");
    }

    #[test]
    fn test_decide_is_idempotent() {
        let engine = scenario_engine();
        let inputs = scenario_inputs();
        let first = engine.decide(&inputs, None).unwrap();
        let second = engine.decide(&inputs.clone(), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());
        assert_eq!(
            first.temperature_estimate.to_bits(),
            second.temperature_estimate.to_bits()
        );
    }

    #[test]
    fn test_observed_peak_preferred_over_consensus() {
        let result = MonitoringResult {
            detected_max_temp: 59.4,
            detected_max_time: at(14),
            confidence: 0.90,
            basis: PeakBasis::DecliningTrend,
        };
        let decision = scenario_engine().decide(&scenario_inputs(), Some(&result)).unwrap();
        assert_eq!(decision.strategy_used, Strategy::ObservedPeak);
        assert_eq!(decision.matched_range.ticker, "T-59");
        assert_eq!(decision.confidence, 0.90);
    }

    #[test]
    fn test_cooling_preferred_over_everything() {
        let mut inputs = scenario_inputs();
        inputs.now = at(3);
        inputs.peak_forecast = Some(PeakForecast { hour: 0, temperature: 58.2 });
        inputs.observed_now = Some(58.4);
        let result = MonitoringResult {
            detected_max_temp: 59.4,
            detected_max_time: at(14),
            confidence: 0.90,
            basis: PeakBasis::DecliningTrend,
        };

        let decision = scenario_engine().decide(&inputs, Some(&result)).unwrap();
        assert_eq!(decision.strategy_used, Strategy::CoolingTrendObserved);
        assert_eq!(decision.temperature_estimate, 58.4);
        assert_eq!(decision.confidence, 0.99);
        assert_eq!(decision.matched_range.ticker, "T-58");
    }

    #[test]
    fn test_no_matching_range_is_not_found() {
        let mut inputs = scenario_inputs();
        inputs.forecasts = forecasts(&[("OpenMeteo", 70.0)]);
        let err = scenario_engine().decide(&inputs, None).unwrap_err();
        assert_eq!(err, DecisionError::NotFound(70.0));
    }

    #[test]
    fn test_no_forecasts_is_insufficient_data() {
        let mut inputs = scenario_inputs();
        inputs.forecasts.clear();
        let err = scenario_engine().decide(&inputs, None).unwrap_err();
        assert!(matches!(err, DecisionError::InsufficientData(_)));
    }

    #[test]
    fn test_unparseable_listing_is_skipped() {
        let mut inputs = scenario_inputs();
        inputs.listings.insert(0, MarketListing::new("T-BAD", "around 58 degrees"));
        let decision = scenario_engine().decide(&inputs, None).unwrap();
        assert_eq!(decision.matched_range.ticker, "T-57");
    }

    #[tokio::test]
    async fn test_decide_day_with_monitor() {
        let engine = scenario_engine();
        let mut inputs = scenario_inputs();
        inputs.listings = daily_listings();

        let clock = Arc::new(ManualClock::new(at(13)));
        let monitor = ContinuousMonitor::new(MonitoringConfig::default(), clock)
            .with_feed(Box::new(ScriptedFeed::primary(&[58.0, 59.0, 59.0, 58.0])));

        let outcome = engine.decide_day(&inputs, Some(monitor), CancellationToken::new()).await;
        let session = outcome.session.unwrap();
        assert_eq!(session.end_reason, SessionEnd::Detected);

        let decision = outcome.decision.unwrap();
        assert_eq!(decision.strategy_used, Strategy::ObservedPeak);
        assert_eq!(decision.temperature_estimate, 59.0);
        assert_eq!(decision.matched_range.ticker, "KXHIGHNY-25JAN05-B59.5");
        assert_eq!(session.decided_bucket, decision.matched_range);
    }

    #[tokio::test]
    async fn test_cancelled_monitor_still_decides() {
        let engine = scenario_engine();
        let inputs = scenario_inputs();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let clock = Arc::new(ManualClock::new(at(9)));
        let monitor = ContinuousMonitor::new(MonitoringConfig::default(), clock)
            .with_feed(Box::new(ScriptedFeed::primary(&[58.0])));

        let outcome = engine.decide_day(&inputs, Some(monitor), cancel).await;
        let session = outcome.session.unwrap();
        assert_eq!(session.end_reason, SessionEnd::Cancelled);
        assert_eq!(session.basis, PeakBasis::Forecast);

        let decision = outcome.decision.unwrap();
        assert_eq!(decision.strategy_used, Strategy::ObservedPeak);
        assert_eq!(decision.temperature_estimate, 58.5);
        assert_eq!(decision.confidence, 0.60);
        assert_eq!(decision.matched_range.ticker, "T-58");
    }

    #[tokio::test]
    async fn test_decide_day_without_monitor_uses_consensus() {
        let outcome = scenario_engine()
            .decide_day(&scenario_inputs(), None, CancellationToken::new())
            .await;
        assert!(outcome.session.is_none());
        assert_eq!(outcome.decision.unwrap().strategy_used, Strategy::ConsensusForecast);
    }
}
