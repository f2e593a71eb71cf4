use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::strategies::monitor::SessionSink;
use crate::strategies::types::MonitoringSession;

/// Writes each session to `monitoring_YYYY-MM-DD.json` under a directory.
pub struct JsonSessionExporter {
    dir: PathBuf,
}

impl JsonSessionExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, session: &MonitoringSession) -> PathBuf {
        self.dir
            .join(format!("monitoring_{}.json", session.date.format("%Y-%m-%d")))
    }

    pub fn export(&self, session: &MonitoringSession) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(session);
        let json = serde_json::to_string_pretty(session)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Session saved to {}", path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<MonitoringSession> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

impl SessionSink for JsonSessionExporter {
    fn record_session(&self, session: &MonitoringSession) -> Result<()> {
        self.export(session).map(|_| ())
    }
}
