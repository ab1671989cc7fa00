//! Core engine modules - backend seam, cache, coordinator, focus
//!
//! These modules form the playback engine, independent of any UI toolkit.

pub mod backend;
pub mod coordinator;
pub mod events;
pub mod focus;
pub mod memory;
pub mod observers;
pub mod resource;
pub mod resource_cache;
pub mod segment;
pub mod workers;

// Re-exports for convenience
pub use backend::{ItemHandle, ItemId, ItemStatus, MediaBackend, OutputSurface, PlayerHandle, ProbeError, ProbedAsset, SurfaceId};
pub use coordinator::{ActiveBinding, PlaybackCoordinator};
pub use events::{EventSender, MediaEvent};
pub use focus::{FeedHost, FocusPolicy, PlaybackControl, Rect, VideoContainer};
pub use resource::{PlayIntent, VideoResource};
pub use resource_cache::CacheStats;
pub use segment::PlaybackSegment;
