//! Playback trim window applied to every clip in the feed.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Optional start/end trim, in seconds.
///
/// Either bound may be absent. Negative or non-finite bounds are ignored
/// when converted to media time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackSegment {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl PlaybackSegment {
    pub fn new(start: Option<f64>, end: Option<f64>) -> Self {
        Self { start, end }
    }

    /// Segment that only trims the beginning
    pub fn starting_at(secs: f64) -> Self {
        Self { start: Some(secs), end: None }
    }

    /// Segment that only trims the tail
    pub fn ending_at(secs: f64) -> Self {
        Self { start: None, end: Some(secs) }
    }

    pub fn start_time(&self) -> Option<Duration> {
        self.start.and_then(|s| Duration::try_from_secs_f64(s).ok())
    }

    pub fn end_time(&self) -> Option<Duration> {
        self.end.and_then(|s| Duration::try_from_secs_f64(s).ok())
    }

    pub fn is_empty(&self) -> bool {
        self.start_time().is_none() && self.end_time().is_none()
    }
}
