use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hightemp_bot::clock::{Clock, SystemClock};
use hightemp_bot::config::{Config, EnvConfig};
use hightemp_bot::data::providers::{
    MsnForecast, OpenWeatherMapForecast, WeatherApiForecast, WeatherChannelForecast,
};
use hightemp_bot::data::sources::SourceRegistry;
use hightemp_bot::data::weather::{
    Coordinates, NwsForecastSource, NwsStationFeed, OpenMeteoCurrentFeed, OpenMeteoForecast, WeatherClient,
};
use hightemp_bot::market::kalshi::KalshiClient;
use hightemp_bot::market::range::{parse_listings, settled_range};
use hightemp_bot::monitoring::logger::CsvLogger;
use hightemp_bot::monitoring::metrics;
use hightemp_bot::storage::export::JsonSessionExporter;
use hightemp_bot::storage::persistence::SessionDatabase;
use hightemp_bot::strategies::decision::{DayInputs, DecisionEngine};
use hightemp_bot::strategies::monitor::ContinuousMonitor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🌡️  High temperature bot starting...");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = if Path::new(&config_path).exists() {
        info!("Loading configuration from {}", config_path);
        Config::load(&config_path)?
    } else {
        warn!("{} not found, using defaults", config_path);
        let config = Config::default();
        config.validate()?;
        config
    };
    let env_config = EnvConfig::load()?;

    let station = &config.station;
    let clock = Arc::new(SystemClock::new(station.utc_offset()?));
    let date = clock.now().date_naive();
    info!("Trading day {} for {} ({})", date, station.name, station.series_ticker);

    let database_path = env_config
        .database_path
        .clone()
        .unwrap_or_else(|| config.system.database_path.clone());
    info!("Initializing database: {}", database_path);
    let db = Arc::new(SessionDatabase::new(&database_path)?);
    let csv = CsvLogger::new(config.system.csv_log_path.clone())?;

    let fetch_timeout = Duration::from_secs(config.monitoring.fetch_timeout_secs);
    let weather = Arc::new(
        WeatherClient::new(
            Coordinates {
                lat: station.latitude,
                lon: station.longitude,
            },
            env_config.nws_user_agent.clone(),
            fetch_timeout,
        )?
        .with_timezone(&station.timezone),
    );

    // Morning forecasts
    let mut registry = SourceRegistry::new();
    registry
        .register(Box::new(OpenMeteoForecast::new(weather.clone())))
        .register(Box::new(NwsForecastSource::new(weather.clone())))
        .register(Box::new(WeatherChannelForecast::new(weather.clone())))
        .register(Box::new(MsnForecast::new(weather.clone(), station.msn_url.clone())));
    if let Some(key) = env_config.weatherapi_key.clone() {
        registry.register(Box::new(WeatherApiForecast::new(weather.clone(), key)));
    }
    if let Some(key) = env_config.openweathermap_api_key.clone() {
        registry.register(Box::new(OpenWeatherMapForecast::new(weather.clone(), key)));
    }
    let forecasts = registry.collect(date, fetch_timeout).await;
    info!("Collected {} of {} forecasts", forecasts.len(), registry.len());

    // Market set
    let markets_url = env_config
        .markets_url
        .clone()
        .unwrap_or_else(|| config.system.markets_url.clone());
    let kalshi = KalshiClient::new(markets_url, fetch_timeout)?;
    let listings = match kalshi.fetch_event_markets(&station.series_ticker, date).await {
        Ok(listings) => listings,
        Err(e) => {
            warn!("Could not fetch market listings: {:#}", e);
            Vec::new()
        }
    };

    let peak_forecast = match weather.open_meteo_peak(date).await {
        Ok(peak) => {
            info!("Predicted max {:.1}°F at {}:00", peak.temperature, peak.hour);
            Some(peak)
        }
        Err(e) => {
            warn!("Could not fetch hourly forecast: {:#}", e);
            None
        }
    };

    let observed_now = match weather.nws_latest_observation().await {
        Ok(temp) => Some(temp),
        Err(e) => {
            warn!("Could not fetch current observation: {:#}", e);
            None
        }
    };

    let monitor = config.monitoring.enabled.then(|| {
        ContinuousMonitor::new(config.monitoring.clone(), clock.clone())
            .with_feed(Box::new(NwsStationFeed::new(weather.clone())))
            .with_feed(Box::new(OpenMeteoCurrentFeed::new(weather.clone())))
            .with_sink(db.clone())
            .with_sink(Arc::new(JsonSessionExporter::new(&config.system.session_dir)))
    });

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, closing the monitoring session...");
            shutdown.cancel();
        }
    });

    let inputs = DayInputs {
        date,
        now: clock.now(),
        forecasts,
        peak_forecast,
        observed_now,
        listings,
    };

    let engine = DecisionEngine::from_config(&config);
    let outcome = engine.decide_day(&inputs, monitor, cancel).await;

    match &outcome.decision {
        Ok(decision) => {
            db.insert_decision(decision)?;
            csv.log_decision(decision)?;
            info!(
                "✅ {} -> {} via {} ({:.0}% confidence)",
                decision.date,
                decision.matched_range,
                decision.strategy_used,
                decision.confidence * 100.0
            );
        }
        Err(e) => {
            csv.log_event(&e.to_string())?;
            info!("No decision for {}: {}", date, e);
        }
    }

    let ranges = parse_listings(&inputs.listings);
    if let Some(settled) = settled_range(&ranges, &inputs.listings) {
        info!("Market already settled on {}", settled);
    }

    let rendered = metrics::render();
    if !rendered.is_empty() {
        tracing::debug!("metrics:\n{}", rendered);
    }

    info!("Shutting down...");
    Ok(())
}
