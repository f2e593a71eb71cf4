use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::data::sources::{ForecastSource, ObservationFeed};
use crate::data::types::{ObservationSource, PeakForecast};
use crate::error::SourceError;

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";
const NWS_URL: &str = "https://api.weather.gov";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

#[derive(Debug, Clone, Copy)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Shared HTTP plumbing for the Open-Meteo and NWS endpoints.
pub struct WeatherClient {
    client: Client,
    coords: Coordinates,
    user_agent: String,
    timezone: String,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoDaily {
    daily: OpenMeteoDailySeries,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoDailySeries {
    time: Vec<String>,
    temperature_2m_max: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoHourly {
    hourly: OpenMeteoHourlySeries,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoHourlySeries {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoCurrent {
    current: OpenMeteoCurrentValues,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoCurrentValues {
    temperature_2m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NwsPoint {
    properties: NwsPointProperties,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct NwsPointProperties {
    forecast: String,
    observationStations: String,
}

#[derive(Debug, Deserialize)]
struct NwsForecast {
    properties: NwsForecastProperties,
}

#[derive(Debug, Deserialize)]
struct NwsForecastProperties {
    periods: Vec<NwsPeriod>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct NwsPeriod {
    startTime: String,
    isDaytime: bool,
    temperature: f64,
    temperatureUnit: String,
}

#[derive(Debug, Deserialize)]
struct NwsStations {
    features: Vec<NwsStation>,
}

#[derive(Debug, Deserialize)]
struct NwsStation {
    id: String,
}

#[derive(Debug, Deserialize)]
struct NwsObservation {
    properties: NwsObservationProperties,
}

#[derive(Debug, Deserialize)]
struct NwsObservationProperties {
    temperature: NwsQuantity,
}

#[derive(Debug, Deserialize)]
struct NwsQuantity {
    value: Option<f64>,
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

impl WeatherClient {
    pub fn new(coords: Coordinates, user_agent: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            coords,
            user_agent,
            timezone: "America/New_York".to_string(),
        })
    }

    pub fn with_timezone(mut self, timezone: &str) -> Self {
        self.timezone = timezone.to_string();
        self
    }

    pub fn coords(&self) -> Coordinates {
        self.coords
    }

    pub(crate) async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()?;

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// Raw page body fetched with a browser user agent, for sites without an API.
    pub(crate) async fn get_page(&self, url: &str) -> Result<String> {
        self.client
            .get(url)
            .header("User-Agent", BROWSER_USER_AGENT)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()?
            .text()
            .await
            .with_context(|| format!("Failed to read page from {}", url))
    }

    fn open_meteo_query(&self, extra: &[(&'static str, &str)]) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("latitude", self.coords.lat.to_string()),
            ("longitude", self.coords.lon.to_string()),
            ("temperature_unit", "fahrenheit".to_string()),
            ("timezone", self.timezone.clone()),
        ];
        query.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));
        query
    }

    /// Open-Meteo daily maximum for `date`.
    pub async fn open_meteo_daily_max(&self, date: NaiveDate) -> Result<f64> {
        let query = self.open_meteo_query(&[("daily", "temperature_2m_max"), ("forecast_days", "3")]);
        let response: OpenMeteoDaily = self.get_json(OPEN_METEO_URL, &query).await?;

        let target = date.format("%Y-%m-%d").to_string();
        response
            .daily
            .time
            .iter()
            .zip(response.daily.temperature_2m_max.iter())
            .find(|(day, _)| **day == target)
            .and_then(|(_, temp)| *temp)
            .with_context(|| format!("No Open-Meteo daily max for {}", target))
    }

    /// Hourly forecast for `date` reduced to the predicted peak hour and value.
    pub async fn open_meteo_peak(&self, date: NaiveDate) -> Result<PeakForecast> {
        let query = self.open_meteo_query(&[("hourly", "temperature_2m"), ("forecast_days", "2")]);
        let response: OpenMeteoHourly = self.get_json(OPEN_METEO_URL, &query).await?;

        let hourly = hourly_for_date(&response.hourly.time, &response.hourly.temperature_2m, date);
        PeakForecast::from_hourly(&hourly)
            .with_context(|| format!("No hourly forecast for {}", date))
    }

    pub async fn open_meteo_current(&self) -> Result<f64> {
        let query = self.open_meteo_query(&[("current", "temperature_2m")]);
        let response: OpenMeteoCurrent = self.get_json(OPEN_METEO_URL, &query).await?;
        response
            .current
            .temperature_2m
            .context("Open-Meteo current temperature missing")
    }

    async fn nws_point(&self) -> Result<NwsPoint> {
        let url = format!("{}/points/{},{}", NWS_URL, self.coords.lat, self.coords.lon);
        self.get_json(&url, &[]).await
    }

    /// NWS daytime period temperature for `date`.
    pub async fn nws_daytime_forecast(&self, date: NaiveDate) -> Result<f64> {
        let point = self.nws_point().await?;
        let forecast: NwsForecast = self.get_json(&point.properties.forecast, &[]).await?;

        let target = date.format("%Y-%m-%d").to_string();
        let period = forecast
            .properties
            .periods
            .iter()
            .find(|p| p.isDaytime && p.startTime.starts_with(&target))
            .with_context(|| format!("No NWS daytime period for {}", target))?;

        Ok(if period.temperatureUnit == "C" {
            celsius_to_fahrenheit(period.temperature)
        } else {
            period.temperature
        })
    }

    /// Latest reading from the nearest NWS observation station, in °F.
    pub async fn nws_latest_observation(&self) -> Result<f64> {
        let point = self.nws_point().await?;
        let stations: NwsStations = self.get_json(&point.properties.observationStations, &[]).await?;
        let station = stations
            .features
            .first()
            .context("No NWS observation stations")?;

        let url = format!("{}/observations/latest", station.id);
        let observation: NwsObservation = self.get_json(&url, &[]).await?;
        observation
            .properties
            .temperature
            .value
            .map(celsius_to_fahrenheit)
            .context("NWS observation has no temperature")
    }
}

/// Extract `(hour, temp)` pairs for `date` from ISO `YYYY-MM-DDTHH:MM` timestamps.
fn hourly_for_date(times: &[String], temps: &[Option<f64>], date: NaiveDate) -> Vec<(u32, f64)> {
    let target = date.format("%Y-%m-%d").to_string();
    times
        .iter()
        .zip(temps.iter())
        .filter(|(t, _)| t.starts_with(&target))
        .filter_map(|(t, temp)| {
            let hour = t.get(11..13)?.parse::<u32>().ok()?;
            Some((hour, (*temp)?))
        })
        .collect()
}

pub struct OpenMeteoForecast {
    client: Arc<WeatherClient>,
}

impl OpenMeteoForecast {
    pub fn new(client: Arc<WeatherClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ForecastSource for OpenMeteoForecast {
    fn name(&self) -> &str {
        "OpenMeteo"
    }

    async fn fetch_forecast(&self, date: NaiveDate) -> Result<f64, SourceError> {
        self.client
            .open_meteo_daily_max(date)
            .await
            .map_err(|e| SourceError::fetch(self.name(), format!("{:#}", e)))
    }
}

pub struct NwsForecastSource {
    client: Arc<WeatherClient>,
}

impl NwsForecastSource {
    pub fn new(client: Arc<WeatherClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ForecastSource for NwsForecastSource {
    fn name(&self) -> &str {
        "NWS"
    }

    async fn fetch_forecast(&self, date: NaiveDate) -> Result<f64, SourceError> {
        self.client
            .nws_daytime_forecast(date)
            .await
            .map_err(|e| SourceError::fetch(self.name(), format!("{:#}", e)))
    }
}

/// Primary feed: the station the market settles on.
pub struct NwsStationFeed {
    client: Arc<WeatherClient>,
}

impl NwsStationFeed {
    pub fn new(client: Arc<WeatherClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObservationFeed for NwsStationFeed {
    fn name(&self) -> &str {
        "NWS"
    }

    fn tag(&self) -> ObservationSource {
        ObservationSource::PrimaryObservationStation
    }

    async fn fetch_current(&self) -> Result<f64, SourceError> {
        self.client
            .nws_latest_observation()
            .await
            .map_err(|e| SourceError::fetch(self.name(), format!("{:#}", e)))
    }
}

pub struct OpenMeteoCurrentFeed {
    client: Arc<WeatherClient>,
}

impl OpenMeteoCurrentFeed {
    pub fn new(client: Arc<WeatherClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObservationFeed for OpenMeteoCurrentFeed {
    fn name(&self) -> &str {
        "OpenMeteo"
    }

    fn tag(&self) -> ObservationSource {
        ObservationSource::SecondaryModel
    }

    async fn fetch_current(&self) -> Result<f64, SourceError> {
        self.client
            .open_meteo_current()
            .await
            .map_err(|e| SourceError::fetch(self.name(), format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celsius_to_fahrenheit() {
        assert!((celsius_to_fahrenheit(0.0) - 32.0).abs() < 1e-9);
        assert!((celsius_to_fahrenheit(14.4) - 57.92).abs() < 0.01);
    }

    #[test]
    fn test_hourly_for_date_filters_day_and_nulls() {
        let times: Vec<String> = [
            "2025-01-04T23:00",
            "2025-01-05T00:00",
            "2025-01-05T01:00",
            "2025-01-05T14:00",
            "2025-01-06T00:00",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let temps = vec![Some(40.0), Some(45.0), None, Some(52.0), Some(60.0)];

        let date = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        let hourly = hourly_for_date(&times, &temps, date);
        assert_eq!(hourly, vec![(0, 45.0), (14, 52.0)]);
    }

    #[test]
    fn test_nws_observation_parses_null_temperature() {
        let json = r#"{"properties": {"temperature": {"value": null, "unitCode": "wmoUnit:degC"}}}"#;
        let obs: NwsObservation = serde_json::from_str(json).unwrap();
        assert!(obs.properties.temperature.value.is_none());
    }
}
