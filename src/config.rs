use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine configuration with tunable capture and streaming knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Capture device to acquire on session start.
    pub device_index: u32,

    /// Pacing of the capture loop; one frame is read per tick.
    pub capture_interval_ms: u64,

    /// Force a session into its stop path if no frame arrives within this
    /// window. `None` disables the watchdog entirely.
    pub stall_timeout_secs: Option<u64>,

    /// Quality of the annotated JPEG frames published to stream consumers.
    pub jpeg_quality: u8,

    /// Broadcast buffer per session; slow stream consumers skip frames once
    /// they fall this far behind.
    pub stream_buffer: usize,

    /// Location of the report database.
    pub database_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            capture_interval_ms: 200,
            stall_timeout_secs: Some(10),
            jpeg_quality: 80,
            stream_buffer: 16,
            database_path: PathBuf::from("focuswatch.sqlite3"),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file is missing or unreadable as config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Ok(serde_json::from_str(&contents).unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write config to {}", path.display()))
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_secs.map(Duration::from_secs)
    }

    /// Verbose-diagnostics toggle, read from the environment.
    pub fn debug_mode() -> bool {
        std::env::var("FOCUSWATCH_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}
