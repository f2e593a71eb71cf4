//! Forecast providers beyond Open-Meteo and NWS.
//!
//! MSN and The Weather Channel have no public API, so their pages are fetched
//! and the day's high is pulled out with a regex. WeatherAPI and
//! OpenWeatherMap need an API key and are only registered when one is set.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};

use crate::data::sources::ForecastSource;
use crate::data::weather::WeatherClient;
use crate::error::SourceError;

const WEATHER_CHANNEL_URL: &str = "https://weather.com/weather/today/l";
const WEATHERAPI_URL: &str = "https://api.weatherapi.com/v1/forecast.json";
const OPENWEATHERMAP_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

const MSN_PATTERNS: [&str; 3] = [
    r#""temperature[Mm]ax[Ff]"[:\s]+(\d+)"#,
    r#""[Hh]igh[Tt]emp"[:\s]+(\d+)"#,
    r#"high["\s:]+(\d+)"#,
];

const WEATHER_CHANNEL_PATTERN: &str = r#"data-testid="TemperatureValue"[^>]*>\s*(-?\d+)"#;

fn msn_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| MSN_PATTERNS.iter().filter_map(|p| Regex::new(p).ok()).collect())
}

fn weather_channel_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(WEATHER_CHANNEL_PATTERN).ok()).as_ref()
}

/// Today's high from an MSN forecast page; patterns are tried in order.
pub fn extract_msn_high(page: &str) -> Option<f64> {
    msn_patterns()
        .iter()
        .find_map(|re| re.captures(page)?.get(1)?.as_str().parse().ok())
}

/// The first `TemperatureValue` on a Weather Channel "today" page is the high.
pub fn extract_weather_channel_high(page: &str) -> Option<f64> {
    weather_channel_pattern()?
        .captures(page)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

#[derive(Debug, Deserialize)]
struct WeatherApiResponse {
    forecast: WeatherApiForecastDays,
}

#[derive(Debug, Deserialize)]
struct WeatherApiForecastDays {
    forecastday: Vec<WeatherApiDay>,
}

#[derive(Debug, Deserialize)]
struct WeatherApiDay {
    date: String,
    day: WeatherApiDayValues,
}

#[derive(Debug, Deserialize)]
struct WeatherApiDayValues {
    maxtemp_f: f64,
}

fn weatherapi_max_for_date(response: &WeatherApiResponse, date: NaiveDate) -> Option<f64> {
    let target = date.format("%Y-%m-%d").to_string();
    response
        .forecast
        .forecastday
        .iter()
        .find(|d| d.date == target)
        .map(|d| d.day.maxtemp_f)
}

#[derive(Debug, Deserialize)]
struct OpenWeatherMapResponse {
    list: Vec<OpenWeatherMapEntry>,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherMapEntry {
    dt_txt: String,
    main: OpenWeatherMapMain,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherMapMain {
    temp_max: f64,
}

/// Highest 3-hourly `temp_max` falling on `date`.
fn openweathermap_max_for_date(response: &OpenWeatherMapResponse, date: NaiveDate) -> Option<f64> {
    let target = date.format("%Y-%m-%d").to_string();
    response
        .list
        .iter()
        .filter(|e| e.dt_txt.starts_with(&target))
        .map(|e| e.main.temp_max)
        .fold(None, |max: Option<f64>, t| Some(max.map_or(t, |m| m.max(t))))
}

fn to_source_error(name: &str, e: anyhow::Error) -> SourceError {
    SourceError::fetch(name, format!("{:#}", e))
}

/// MSN Weather page for the station's city. Only today's page is available.
pub struct MsnForecast {
    client: Arc<WeatherClient>,
    url: String,
}

impl MsnForecast {
    pub fn new(client: Arc<WeatherClient>, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl ForecastSource for MsnForecast {
    fn name(&self) -> &str {
        "MSN"
    }

    async fn fetch_forecast(&self, _date: NaiveDate) -> Result<f64, SourceError> {
        let page = self
            .client
            .get_page(&self.url)
            .await
            .map_err(|e| to_source_error(self.name(), e))?;
        extract_msn_high(&page).ok_or_else(|| SourceError::MissingValue(self.name().to_string()))
    }
}

pub struct WeatherChannelForecast {
    client: Arc<WeatherClient>,
}

impl WeatherChannelForecast {
    pub fn new(client: Arc<WeatherClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ForecastSource for WeatherChannelForecast {
    fn name(&self) -> &str {
        "WeatherChannel"
    }

    async fn fetch_forecast(&self, _date: NaiveDate) -> Result<f64, SourceError> {
        let coords = self.client.coords();
        let url = format!("{}/{:.2},{:.2}", WEATHER_CHANNEL_URL, coords.lat, coords.lon);
        let page = self
            .client
            .get_page(&url)
            .await
            .map_err(|e| to_source_error(self.name(), e))?;
        extract_weather_channel_high(&page)
            .ok_or_else(|| SourceError::MissingValue(self.name().to_string()))
    }
}

pub struct WeatherApiForecast {
    client: Arc<WeatherClient>,
    api_key: String,
}

impl WeatherApiForecast {
    pub fn new(client: Arc<WeatherClient>, api_key: String) -> Self {
        Self { client, api_key }
    }

    async fn daily_max(&self, date: NaiveDate) -> Result<f64> {
        let coords = self.client.coords();
        let query = [
            ("key", self.api_key.clone()),
            ("q", format!("{},{}", coords.lat, coords.lon)),
            ("days", "3".to_string()),
        ];
        let response: WeatherApiResponse = self.client.get_json(WEATHERAPI_URL, &query).await?;
        weatherapi_max_for_date(&response, date)
            .with_context(|| format!("No WeatherAPI forecast for {}", date))
    }
}

#[async_trait]
impl ForecastSource for WeatherApiForecast {
    fn name(&self) -> &str {
        "WeatherAPI"
    }

    async fn fetch_forecast(&self, date: NaiveDate) -> Result<f64, SourceError> {
        self.daily_max(date)
            .await
            .map_err(|e| to_source_error(self.name(), e))
    }
}

pub struct OpenWeatherMapForecast {
    client: Arc<WeatherClient>,
    api_key: String,
}

impl OpenWeatherMapForecast {
    pub fn new(client: Arc<WeatherClient>, api_key: String) -> Self {
        Self { client, api_key }
    }

    async fn daily_max(&self, date: NaiveDate) -> Result<f64> {
        let coords = self.client.coords();
        let query = [
            ("lat", coords.lat.to_string()),
            ("lon", coords.lon.to_string()),
            ("appid", self.api_key.clone()),
            ("units", "imperial".to_string()),
        ];
        let response: OpenWeatherMapResponse = self.client.get_json(OPENWEATHERMAP_URL, &query).await?;
        openweathermap_max_for_date(&response, date)
            .with_context(|| format!("No OpenWeatherMap forecast for {}", date))
    }
}

#[async_trait]
impl ForecastSource for OpenWeatherMapForecast {
    fn name(&self) -> &str {
        "OpenWeatherMap"
    }

    async fn fetch_forecast(&self, date: NaiveDate) -> Result<f64, SourceError> {
        self.daily_max(date)
            .await
            .map_err(|e| to_source_error(self.name(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 5).unwrap()
    }

    fn client() -> Arc<WeatherClient> {
        let coords = crate::data::weather::Coordinates {
            lat: 40.7831,
            lon: -73.9712,
        };
        Arc::new(
            WeatherClient::new(coords, "test-agent".to_string(), std::time::Duration::from_secs(1))
                .unwrap(),
        )
    }

    #[test]
    fn test_scraped_sources_are_weighted_priority_sources() {
        let config = crate::config::ConsensusConfig::default();
        let sources: Vec<Box<dyn ForecastSource>> = vec![
            Box::new(MsnForecast::new(client(), "https://example.test/msn".to_string())),
            Box::new(WeatherChannelForecast::new(client())),
        ];
        for source in &sources {
            assert!(config.priority_sources.iter().any(|p| p == source.name()));
            assert_eq!(config.weights.get(source.name()), Some(&2.0));
        }
    }

    #[test]
    fn test_msn_patterns_in_order() {
        let page = r#"<script>{"highTemp": 61, "temperatureMaxF": 59}</script>"#;
        assert_eq!(extract_msn_high(page), Some(59.0));

        let page = r#"<div data-x="1">{"HighTemp":  60}</div>"#;
        assert_eq!(extract_msn_high(page), Some(60.0));

        assert_eq!(extract_msn_high("<html>no numbers here</html>"), None);
    }

    #[test]
    fn test_weather_channel_first_value_is_high() {
        let page = r#"<span data-testid="TemperatureValue" class="x">58°</span>
                      <span data-testid="TemperatureValue" class="x">41°</span>"#;
        assert_eq!(extract_weather_channel_high(page), Some(58.0));
        assert_eq!(extract_weather_channel_high("<span>58°</span>"), None);
    }

    #[test]
    fn test_weatherapi_picks_requested_day() {
        let json = r#"{"forecast": {"forecastday": [
            {"date": "2025-01-05", "day": {"maxtemp_f": 57.2}},
            {"date": "2025-01-06", "day": {"maxtemp_f": 49.0}}
        ]}}"#;
        let response: WeatherApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(weatherapi_max_for_date(&response, date()), Some(57.2));
        assert_eq!(weatherapi_max_for_date(&response, date().pred_opt().unwrap()), None);
    }

    #[test]
    fn test_openweathermap_max_over_day() {
        let json = r#"{"list": [
            {"dt_txt": "2025-01-04 21:00:00", "main": {"temp_max": 70.0}},
            {"dt_txt": "2025-01-05 12:00:00", "main": {"temp_max": 55.5}},
            {"dt_txt": "2025-01-05 18:00:00", "main": {"temp_max": 58.1}},
            {"dt_txt": "2025-01-05 21:00:00", "main": {"temp_max": 56.0}}
        ]}"#;
        let response: OpenWeatherMapResponse = serde_json::from_str(json).unwrap();
        assert_eq!(openweathermap_max_for_date(&response, date()), Some(58.1));
        assert_eq!(openweathermap_max_for_date(&response, date().succ_opt().unwrap()), None);
    }
}
