//! System memory watcher that turns low available memory into cache reclaim.
//!
//! Mobile-style hosts deliver memory warnings themselves and call
//! `PlaybackCoordinator::on_memory_pressure`. Desktop hosts have no such
//! signal, so the coordinator can poll this monitor while processing events.

use log::{debug, info};
use std::time::{Duration, Instant};
use sysinfo::System;

use crate::config::MemoryWatch;

const MB: u64 = 1024 * 1024;

#[derive(Debug)]
pub struct MemoryMonitor {
    sys: System,
    min_available_bytes: u64,
    interval: Duration,
    last_check: Option<Instant>,
    last_available: u64,
}

impl MemoryMonitor {
    pub fn new(watch: &MemoryWatch) -> Self {
        info!(
            "MemoryMonitor init: floor={} MB, interval={} ms",
            watch.min_available_mb, watch.interval_ms
        );
        Self {
            sys: System::new(),
            min_available_bytes: watch.min_available_mb.saturating_mul(MB),
            interval: Duration::from_millis(watch.interval_ms),
            last_check: None,
            last_available: 0,
        }
    }

    /// Read memory if the interval elapsed; true when below the floor.
    ///
    /// Returns false without reading when called again too soon.
    pub fn poll(&mut self) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_check
            && now.duration_since(last) < self.interval
        {
            return false;
        }
        self.last_check = Some(now);
        self.sys.refresh_memory();
        self.last_available = self.sys.available_memory();
        self.evaluate(self.last_available)
    }

    fn evaluate(&self, available: u64) -> bool {
        let low = available < self.min_available_bytes;
        if low {
            debug!(
                "Memory pressure: available={} MB, floor={} MB",
                available / MB,
                self.min_available_bytes / MB
            );
        }
        low
    }

    /// Available memory at the last read (bytes)
    pub fn last_available(&self) -> u64 {
        self.last_available
    }
}
