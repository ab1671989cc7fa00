//! FEEDPLAY - Video resource cache and autoplay focus coordinator for scrolling feeds
//!
//! Re-exports all modules for use by binary targets.

// Core engine (backend seam, cache, coordinator, focus)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod sim;

// Re-export commonly used types from core
pub use config::{CoordinatorConfig, MemoryWatch, PlaybackSettings};
pub use core::coordinator::PlaybackCoordinator;
pub use core::focus::{FeedHost, FocusPolicy, PlaybackControl, Rect, VideoContainer};
pub use core::resource::VideoResource;
pub use core::segment::PlaybackSegment;
