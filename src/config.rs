//! Coordinator configuration.
//!
//! Everything here deserializes from JSON with per-field defaults, so a config
//! file only needs the keys it overrides:
//!
//! ```json
//! { "cache_capacity": 8, "playback": { "muted": true, "segment": { "end": 6.0 } } }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::segment::PlaybackSegment;

/// Default peak bitrate cap, bits per second
pub const DEFAULT_PEAK_BITRATE: f64 = 10000.0;

/// Global playback settings, read on every play/pause rather than baked into resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub muted: bool,
    /// Replay from the start after reaching the end
    pub loop_on_end: bool,
    pub peak_bitrate_cap: f64,
    /// Trim applied to every newly loaded clip and on every loop
    pub segment: Option<PlaybackSegment>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            muted: false,
            loop_on_end: true,
            peak_bitrate_cap: DEFAULT_PEAK_BITRATE,
            segment: None,
        }
    }
}

/// System memory floor that triggers cache reclaim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryWatch {
    /// Reclaim when available memory drops below this (MB)
    pub min_available_mb: u64,
    /// Minimum time between memory reads (ms)
    pub interval_ms: u64,
}

impl Default for MemoryWatch {
    fn default() -> Self {
        Self {
            min_available_mb: 256,
            interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Max resources kept in the cache (min 1)
    pub cache_capacity: usize,
    /// Probe worker threads, 0 = auto
    pub probe_threads: usize,
    /// Entries kept when reclaiming under memory pressure
    pub pressure_retain: usize,
    /// Poll system memory while processing events; off when absent
    pub memory_watch: Option<MemoryWatch>,
    pub playback: PlaybackSettings,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 24,
            probe_threads: 0,
            pressure_retain: 1,
            memory_watch: None,
            playback: PlaybackSettings::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Parse coordinator config")
    }

    /// Load config from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Read config {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Serialize coordinator config")
    }

    /// Worker count after resolving "auto" (leave most cores to the UI)
    pub fn resolved_probe_threads(&self) -> usize {
        if self.probe_threads > 0 {
            self.probe_threads
        } else {
            (num_cpus::get() / 4).clamp(1, 4)
        }
    }
}
