use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::data::types::{ObservationSource, TemperatureObservation};
use crate::market::types::MarketRange;
use crate::strategies::monitor::SessionSink;
use crate::strategies::types::{MonitoringSession, Strategy, TradingDecision};

/// SQLite store for decisions and monitoring sessions.
pub struct SessionDatabase {
    conn: Mutex<Connection>,
}

impl SessionDatabase {
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                temperature_estimate REAL NOT NULL,
                confidence REAL NOT NULL,
                ticker TEXT NOT NULL,
                subtitle TEXT NOT NULL,
                range_low REAL,
                range_high REAL,
                strategy TEXT NOT NULL,
                recorded_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                start_time TIMESTAMP NOT NULL,
                end_time TIMESTAMP NOT NULL,
                predicted_max_hour INTEGER NOT NULL,
                predicted_max_temp REAL NOT NULL,
                detected_max_temp REAL NOT NULL,
                detected_max_time TIMESTAMP NOT NULL,
                confidence REAL NOT NULL,
                basis TEXT NOT NULL,
                end_reason TEXT NOT NULL,
                polls INTEGER NOT NULL,
                decided_bucket TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                timestamp TIMESTAMP NOT NULL,
                source TEXT NOT NULL,
                temperature REAL NOT NULL,
                is_forecast INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY(session_id) REFERENCES sessions(id)
            );

            CREATE INDEX IF NOT EXISTS idx_decisions_date ON decisions(date);
            CREATE INDEX IF NOT EXISTS idx_sessions_date ON sessions(date);
            CREATE INDEX IF NOT EXISTS idx_observations_session ON observations(session_id);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Insert a decision; open-ended range bounds are stored as NULL.
    pub fn insert_decision(&self, decision: &TradingDecision) -> Result<i64> {
        let conn = self.lock()?;
        let range = &decision.matched_range;
        conn.execute(
            "INSERT INTO decisions (date, temperature_estimate, confidence, ticker, subtitle, range_low, range_high, strategy, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                decision.date.to_string(),
                decision.temperature_estimate,
                decision.confidence,
                range.ticker,
                range.subtitle,
                finite(range.low),
                finite(range.high),
                decision.strategy_used.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn decisions_for_date(&self, date: NaiveDate) -> Result<Vec<TradingDecision>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT temperature_estimate, confidence, ticker, subtitle, range_low, range_high, strategy
             FROM decisions
             WHERE date = ?1
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![date.to_string()], |row| {
            Ok((
                row.get::<_, f64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<f64>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut decisions = Vec::new();
        for row in rows {
            let (estimate, confidence, ticker, subtitle, low, high, strategy) = row?;
            let strategy_used = Strategy::parse(&strategy)
                .ok_or_else(|| anyhow!("unknown strategy in database: {}", strategy))?;
            decisions.push(TradingDecision {
                date,
                temperature_estimate: estimate,
                confidence,
                matched_range: MarketRange {
                    ticker,
                    subtitle,
                    low: low.unwrap_or(f64::NEG_INFINITY),
                    high: high.unwrap_or(f64::INFINITY),
                },
                strategy_used,
            });
        }
        Ok(decisions)
    }

    /// Insert a session and its observations in one transaction.
    pub fn insert_session(&self, session: &MonitoringSession) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO sessions (date, start_time, end_time, predicted_max_hour, predicted_max_temp,
                                   detected_max_temp, detected_max_time, confidence, basis, end_reason,
                                   polls, decided_bucket)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                session.date.to_string(),
                session.start_time.to_rfc3339(),
                session.end_time.to_rfc3339(),
                session.predicted_max_hour,
                session.predicted_max_temp,
                session.detected_max_temp,
                session.detected_max_time.to_rfc3339(),
                session.confidence,
                session.basis.to_string(),
                session.end_reason.to_string(),
                session.polls,
                session.decided_bucket.subtitle,
            ],
        )?;
        let session_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO observations (session_id, timestamp, source, temperature, is_forecast)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for obs in &session.observations {
                stmt.execute(params![
                    session_id,
                    obs.timestamp.to_rfc3339(),
                    obs.source.to_string(),
                    obs.temperature,
                    obs.is_forecast,
                ])?;
            }
        }

        tx.commit()?;
        debug!(
            "Stored session {} for {} with {} observations",
            session_id,
            session.date,
            session.observations.len()
        );
        Ok(session_id)
    }

    pub fn observations_for_session(&self, session_id: i64) -> Result<Vec<TemperatureObservation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, source, temperature, is_forecast
             FROM observations
             WHERE session_id = ?1
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;

        let mut observations = Vec::new();
        for row in rows {
            let (timestamp, source, temperature, is_forecast) = row?;
            observations.push(TemperatureObservation {
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .with_context(|| format!("Bad observation timestamp: {}", timestamp))?,
                source: ObservationSource::parse(&source)
                    .ok_or_else(|| anyhow!("unknown observation source: {}", source))?,
                temperature,
                is_forecast,
            });
        }
        Ok(observations)
    }

    pub fn count_sessions(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl SessionSink for SessionDatabase {
    fn record_session(&self, session: &MonitoringSession) -> Result<()> {
        self.insert_session(session).map(|_| ())
    }
}

fn finite(bound: f64) -> Option<f64> {
    bound.is_finite().then_some(bound)
}
