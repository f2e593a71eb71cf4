use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::data::types::ObservationSource;
use crate::error::SourceError;

/// A provider of the day's forecast high in °F.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_forecast(&self, date: NaiveDate) -> Result<f64, SourceError>;
}

/// A live temperature reading feed polled during the monitoring window.
#[async_trait]
pub trait ObservationFeed: Send + Sync {
    fn name(&self) -> &str;

    fn tag(&self) -> ObservationSource;

    async fn fetch_current(&self) -> Result<f64, SourceError>;
}

/// Ordered list of forecast providers.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Box<dyn ForecastSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Box<dyn ForecastSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Fetch every registered source concurrently, each bounded by `timeout`.
    ///
    /// Failed or timed-out sources are left out of the mapping.
    pub async fn collect(&self, date: NaiveDate, timeout: Duration) -> BTreeMap<String, f64> {
        let fetches = self.sources.iter().map(|source| async move {
            let result = match tokio::time::timeout(timeout, source.fetch_forecast(date)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(source.name().to_string())),
            };
            (source.name().to_string(), result)
        });

        let mut forecasts = BTreeMap::new();
        for (name, result) in join_all(fetches).await {
            match result {
                Ok(temp) if temp.is_finite() => {
                    debug!("{}: {:.1}°F", name, temp);
                    forecasts.insert(name, temp);
                }
                Ok(temp) => warn!("{} returned non-finite temperature {}, skipping", name, temp),
                Err(e) => warn!("Forecast source skipped: {}", e),
            }
        }
        forecasts
    }
}


#[cfg(test)]
mod tests {
    use super::stubs::*;
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 5).unwrap()
    }

    #[tokio::test]
    async fn test_collect_skips_failed_sources() {
        let mut registry = SourceRegistry::new();
        registry
            .register(Box::new(FixedForecast { name: "OpenMeteo".into(), value: Some(57.0) }))
            .register(Box::new(FixedForecast { name: "NWS".into(), value: None }))
            .register(Box::new(FixedForecast { name: "MSN".into(), value: Some(58.5) }));

        let forecasts = registry.collect(date(), Duration::from_secs(1)).await;
        assert_eq!(forecasts.len(), 2);
        assert_eq!(forecasts.get("OpenMeteo"), Some(&57.0));
        assert!(!forecasts.contains_key("NWS"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_times_out_hanging_source() {
        let mut registry = SourceRegistry::new();
        registry
            .register(Box::new(HangingForecast))
            .register(Box::new(FixedForecast { name: "NWS".into(), value: Some(58.0) }));

        let forecasts = registry.collect(date(), Duration::from_secs(10)).await;
        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts.get("NWS"), Some(&58.0));
    }

    #[tokio::test]
    async fn test_empty_registry_yields_empty_mapping() {
        let registry = SourceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.collect(date(), Duration::from_secs(1)).await.is_empty());
    }
}
