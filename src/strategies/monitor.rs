//! Poll loop around the forecast peak hour.
//!
//! ```text
//! Idle -> WaitingForWindow -> Monitoring -> Detected | TimedOut -> Closed
//! ```
//!
//! The loop is single-threaded: one tick fetches every feed concurrently, then
//! appends the successful readings in feed order before running the detector.
//! Cancellation is honoured at every suspension point and still yields a
//! finalized session built from whatever was collected.

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::MonitoringConfig;
use crate::data::sources::ObservationFeed;
use crate::data::types::{PeakForecast, TemperatureObservation};
use crate::error::SourceError;
use crate::market::range::classify;
use crate::market::types::MarketRange;
use crate::monitoring::metrics;
use crate::strategies::peak::{ConfidenceLadder, Detection, PeakDetector};
use crate::strategies::types::{MonitorState, MonitoringSession, SessionEnd};
use crate::strategies::window::ObservationWindow;

/// Receives the frozen session once the monitor closes.
pub trait SessionSink: Send + Sync {
    fn record_session(&self, session: &MonitoringSession) -> Result<()>;
}

/// What the monitor needs to know about the day before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorPlan {
    pub date: NaiveDate,
    pub peak: PeakForecast,
}

/// Session plus the states it passed through.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub session: MonitoringSession,
    pub trace: Vec<MonitorState>,
}

pub struct ContinuousMonitor {
    config: MonitoringConfig,
    clock: Arc<dyn Clock>,
    feeds: Vec<Box<dyn ObservationFeed>>,
    sinks: Vec<Arc<dyn SessionSink>>,
    detector: PeakDetector,
    window: ObservationWindow,
    state: MonitorState,
    trace: Vec<MonitorState>,
}

enum Wait {
    Elapsed,
    Cancelled,
}

impl ContinuousMonitor {
    pub fn new(config: MonitoringConfig, clock: Arc<dyn Clock>) -> Self {
        let detector = PeakDetector::new(ConfidenceLadder::from(&config));
        Self {
            config,
            clock,
            feeds: Vec::new(),
            sinks: Vec::new(),
            detector,
            window: ObservationWindow::new(),
            state: MonitorState::Idle,
            trace: vec![MonitorState::Idle],
        }
    }

    pub fn with_feed(mut self, feed: Box<dyn ObservationFeed>) -> Self {
        self.feeds.push(feed);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    fn transition(&mut self, next: MonitorState) {
        debug!("monitor {:?} -> {:?}", self.state, next);
        self.state = next;
        self.trace.push(next);
    }

    /// Start and end of the monitoring window in market-local time.
    pub fn window_bounds(&self, plan: &MonitorPlan) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
        let offset = *self.clock.now().offset();
        let naive_start = plan
            .date
            .and_hms_opt(plan.peak.hour.min(23), 0, 0)
            .unwrap_or_else(|| plan.date.and_time(chrono::NaiveTime::MIN));
        let start = offset
            .from_local_datetime(&naive_start)
            .single()
            .unwrap_or_else(|| self.clock.now());
        (start, start + Duration::minutes(self.config.window_minutes))
    }

    async fn wait_until(&self, deadline: DateTime<FixedOffset>, cancel: &CancellationToken) -> Wait {
        tokio::select! {
            _ = cancel.cancelled() => Wait::Cancelled,
            _ = self.clock.sleep_until(deadline) => Wait::Elapsed,
        }
    }

    /// Fetch every feed concurrently; failures are dropped per feed.
    async fn poll_feeds(&self) -> Vec<(usize, f64)> {
        let timeout = std::time::Duration::from_secs(self.config.fetch_timeout_secs);
        let fetches = self.feeds.iter().enumerate().map(|(i, feed)| async move {
            let result = match tokio::time::timeout(timeout, feed.fetch_current()).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(feed.name().to_string())),
            };
            (i, result)
        });

        let mut readings = Vec::new();
        for (i, result) in join_all(fetches).await {
            match result {
                Ok(temp) if temp.is_finite() => readings.push((i, temp)),
                Ok(temp) => warn!("{} returned non-finite reading {}", self.feeds[i].name(), temp),
                Err(e) => {
                    metrics::record_source_failure(self.feeds[i].name());
                    warn!("Observation skipped this tick: {}", e);
                }
            }
        }
        readings
    }

    /// One tick: fetch, append in feed order, detect.
    async fn tick(&mut self, cancel: &CancellationToken) -> Option<Detection> {
        let timestamp = self.clock.now();
        let readings = tokio::select! {
            _ = cancel.cancelled() => return None,
            readings = self.poll_feeds() => readings,
        };
        metrics::record_poll();

        for (i, temperature) in readings {
            let feed = &self.feeds[i];
            info!("[{}] {} ({}): {:.1}°F", timestamp.format("%H:%M:%S"), feed.name(), feed.tag(), temperature);
            let obs = TemperatureObservation {
                timestamp,
                source: feed.tag(),
                temperature,
                is_forecast: false,
            };
            self.window.push(obs);
        }

        Some(self.detector.detect(&self.window))
    }

    /// Run the day's session to completion (or cancellation) and close it.
    ///
    /// `ranges` is the day's market set used to label the decided bucket;
    /// with an empty set the integer-degree bucket is recorded instead.
    pub async fn run(
        mut self,
        plan: &MonitorPlan,
        ranges: &[MarketRange],
        cancel: CancellationToken,
    ) -> MonitorReport {
        let start_time = self.clock.now();
        let (window_start, window_end) = self.window_bounds(plan);

        info!(
            "Monitoring plan for {}: predicted max {:.1}°F at {}:00, window {} to {}",
            plan.date,
            plan.peak.temperature,
            plan.peak.hour,
            window_start.format("%H:%M"),
            window_end.format("%H:%M")
        );

        let mut end = SessionEnd::TimedOut;
        let mut detection = Detection::Undetermined;
        let mut polls: u32 = 0;

        if cancel.is_cancelled() {
            end = SessionEnd::Cancelled;
        } else if self.clock.now() < window_start {
            self.transition(MonitorState::WaitingForWindow);
            info!("Waiting until {} for the monitoring window", window_start.format("%H:%M"));
            if let Wait::Cancelled = self.wait_until(window_start, &cancel).await {
                end = SessionEnd::Cancelled;
            }
        }

        if end != SessionEnd::Cancelled {
            self.transition(MonitorState::Monitoring);
            let interval = Duration::seconds(self.config.poll_interval_secs as i64);

            while polls < self.config.max_polls && self.clock.now() < window_end {
                let tick_start = self.clock.now();
                polls += 1;
                debug!("poll #{}", polls);

                match self.tick(&cancel).await {
                    None => {
                        end = SessionEnd::Cancelled;
                        break;
                    }
                    Some(d) if d.is_declining() => {
                        detection = d;
                        end = SessionEnd::Detected;
                        break;
                    }
                    Some(_) => {}
                }

                let next_tick = tick_start + interval;
                if polls >= self.config.max_polls || next_tick >= window_end {
                    break;
                }
                if let Wait::Cancelled = self.wait_until(next_tick, &cancel).await {
                    end = SessionEnd::Cancelled;
                    break;
                }
            }
        }

        match end {
            SessionEnd::Detected => self.transition(MonitorState::Detected),
            SessionEnd::TimedOut | SessionEnd::Cancelled => self.transition(MonitorState::TimedOut),
        }

        let session = self.finalize(plan, start_time, &detection, end, polls, ranges);
        self.transition(MonitorState::Closed);

        for sink in &self.sinks {
            if let Err(e) = sink.record_session(&session) {
                warn!("Failed to record monitoring session: {:#}", e);
            }
        }

        MonitorReport {
            session,
            trace: self.trace,
        }
    }

    fn finalize(
        &mut self,
        plan: &MonitorPlan,
        start_time: DateTime<FixedOffset>,
        detection: &Detection,
        end: SessionEnd,
        polls: u32,
        ranges: &[MarketRange],
    ) -> MonitoringSession {
        let end_time = self.clock.now();
        let result = self
            .detector
            .resolve(detection, &self.window, plan.peak.temperature, end_time);

        let decided_bucket = classify(result.detected_max_temp, ranges)
            .cloned()
            .unwrap_or_else(|| MarketRange::degree_bucket(result.detected_max_temp));

        info!(
            "Monitoring {}: {} observations over {} polls, max {:.1}°F at {} ({}, confidence {:.0}%), bucket {}",
            end,
            self.window.len(),
            polls,
            result.detected_max_temp,
            result.detected_max_time.format("%H:%M"),
            result.basis,
            result.confidence * 100.0,
            decided_bucket
        );

        let observations = std::mem::take(&mut self.window).into_observations();

        MonitoringSession {
            date: plan.date,
            start_time,
            end_time,
            predicted_max_hour: plan.peak.hour,
            predicted_max_temp: plan.peak.temperature,
            observations,
            detected_max_temp: result.detected_max_temp,
            detected_max_time: result.detected_max_time,
            confidence: result.confidence,
            basis: result.basis,
            end_reason: end,
            polls,
            decided_bucket,
        }
    }
}
