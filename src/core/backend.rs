//! Seam between the coordinator and the native media framework.
//!
//! The coordinator never touches a concrete player. A backend probes assets on
//! worker threads and builds player/item handles on the coordination thread;
//! hosts hand in output surfaces that can show a player.
//!
//! Threading contract:
//! - `MediaBackend::probe` runs on a probe worker and may block
//! - everything else is called from the thread that owns the coordinator
//! - items report status changes and end-of-playback through the `EventSender`
//!   registered with `ItemHandle::add_observer`

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use super::events::EventSender;

/// Identity of a playable item, unique per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Identity of an output surface (the layer a cell draws video into).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Readiness of a playable item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Unknown,
    ReadyToPlay,
    Failed(String),
}

impl ItemStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ItemStatus::ReadyToPlay)
    }
}

/// Asset loading and handle construction errors
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// Source string is not a URL
    InvalidUrl(String),
    /// Asset loaded but reports it cannot be played
    NotPlayable(String),
    /// Probe was cancelled by the backend
    Cancelled,
    /// Transport failure while reading the asset
    Io(String),
    /// Backend received a probed asset of a type it did not produce
    HandleMismatch(&'static str),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::InvalidUrl(e) => write!(f, "Invalid URL: {}", e),
            ProbeError::NotPlayable(e) => write!(f, "Asset not playable: {}", e),
            ProbeError::Cancelled => write!(f, "Probe cancelled"),
            ProbeError::Io(e) => write!(f, "I/O error: {}", e),
            ProbeError::HandleMismatch(expected) => {
                write!(f, "Probed asset is not a {}", expected)
            }
        }
    }
}

impl std::error::Error for ProbeError {}

/// Result of a successful probe, handed back to the backend on the coordination thread.
pub struct ProbedAsset {
    url: Url,
    payload: Box<dyn Any + Send>,
}

impl ProbedAsset {
    pub fn new<T: Any + Send>(url: Url, payload: T) -> Self {
        Self {
            url,
            payload: Box::new(payload),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Recover the backend's payload. Fails if the asset came from another backend.
    pub fn downcast<T: Any>(self) -> Result<(Url, T), ProbeError> {
        match self.payload.downcast::<T>() {
            Ok(payload) => Ok((self.url, *payload)),
            Err(_) => Err(ProbeError::HandleMismatch(std::any::type_name::<T>())),
        }
    }
}

impl fmt::Debug for ProbedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbedAsset").field("url", &self.url.as_str()).finish()
    }
}

/// A loaded media item (one per player).
pub trait ItemHandle: Send + Sync {
    fn id(&self) -> ItemId;
    fn status(&self) -> ItemStatus;
    fn current_time(&self) -> Duration;
    fn seek(&self, to: Duration);
    /// Position where forward playback stops. `None` plays to the natural end.
    fn set_forward_end_time(&self, end: Option<Duration>);
    fn set_peak_bitrate(&self, bits_per_sec: f64);
    /// Fresh item over the same asset, starting at zero
    fn duplicate(&self) -> Arc<dyn ItemHandle>;
    /// Start posting `ItemStatus` and `ReachedEnd` events to `events`.
    ///
    /// The current status must be posted once right away.
    fn add_observer(&self, events: EventSender);
    fn remove_observer(&self);
}

/// A player bound to exactly one item.
pub trait PlayerHandle: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn set_muted(&self, muted: bool);
    fn is_playing(&self) -> bool;
}

/// Native asset loading and handle construction.
pub trait MediaBackend: Send + Sync + 'static {
    /// Check that the asset behind `url` is playable. Runs on a probe worker.
    fn probe(&self, url: &Url) -> Result<ProbedAsset, ProbeError>;

    /// Build an item from a probed asset.
    fn make_item(&self, asset: ProbedAsset) -> Result<Arc<dyn ItemHandle>, ProbeError>;

    /// Build a player whose current item is `item`.
    fn make_player(&self, item: Arc<dyn ItemHandle>) -> Arc<dyn PlayerHandle>;
}

/// Something a player can render into (a cell's video layer).
pub trait OutputSurface: Send + Sync {
    fn id(&self) -> SurfaceId;
    /// Show `player`, or nothing for `None`.
    fn attach_player(&self, player: Option<Arc<dyn PlayerHandle>>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_ids_unique() {
        let a = ItemId::next();
        let b = ItemId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn test_asset_downcast() {
        let url = Url::parse("https://cdn.example.com/a.mp4").unwrap();
        let asset = ProbedAsset::new(url.clone(), 42u32);
        let (back, payload) = asset.downcast::<u32>().unwrap();
        assert_eq!(back, url);
        assert_eq!(payload, 42);

        let asset = ProbedAsset::new(url, 42u32);
        assert!(matches!(
            asset.downcast::<String>(),
            Err(ProbeError::HandleMismatch(_))
        ));
    }
}
