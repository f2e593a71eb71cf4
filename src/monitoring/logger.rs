use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;

use crate::strategies::types::TradingDecision;

const HEADER: &str = "timestamp,date,strategy,temperature_estimate,confidence,ticker,subtitle";

pub struct CsvLogger {
    log_path: String,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        // Create CSV file with headers if it doesn't exist
        if !std::path::Path::new(&log_path).exists() {
            if let Some(parent) = std::path::Path::new(&log_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)
                .with_context(|| format!("Failed to create {}", log_path))?;

            writeln!(file, "{}", HEADER)?;
        }

        Ok(Self { log_path })
    }

    /// Append one decision row.
    pub fn log_decision(&self, decision: &TradingDecision) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        writeln!(
            file,
            "{},{},{},{:.2},{:.3},{},\"{}\"",
            Utc::now().to_rfc3339(),
            decision.date,
            decision.strategy_used,
            decision.temperature_estimate,
            decision.confidence,
            decision.matched_range.ticker,
            decision.matched_range.subtitle
        )?;

        Ok(())
    }

    /// Log a day that ended without a decision.
    pub fn log_event(&self, event: &str) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        writeln!(file, "{},EVENT,\"{}\",,,,", Utc::now().to_rfc3339(), event)?;

        Ok(())
    }
}
