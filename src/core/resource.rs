//! One playable instance (player + item) for one URL.
//!
//! Resources are shared as `Arc<VideoResource>`: the cache, the surface that
//! shows the player, and any caller of `lookup` can hold one. Evicting a
//! resource from the cache never stops playback for the remaining holders.

use log::trace;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::backend::{ItemHandle, ItemId, ItemStatus, MediaBackend, PlayerHandle};
use super::segment::PlaybackSegment;
use crate::config::PlaybackSettings;

/// Last play/pause request made on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayIntent {
    #[default]
    Unset,
    Playing,
    Paused,
}

pub struct VideoResource {
    url: String,
    player: Arc<dyn PlayerHandle>,
    item: Arc<dyn ItemHandle>,
    intent: Mutex<PlayIntent>,
    segment: Mutex<Option<PlaybackSegment>>,
}

impl std::fmt::Debug for VideoResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoResource")
            .field("url", &self.url)
            .field("item", &self.item.id())
            .field("intent", &self.intent())
            .finish()
    }
}

impl VideoResource {
    /// Wrap a player whose current item is `item`
    pub fn new(url: impl Into<String>, player: Arc<dyn PlayerHandle>, item: Arc<dyn ItemHandle>) -> Self {
        Self {
            url: url.into(),
            player,
            item,
            intent: Mutex::new(PlayIntent::Unset),
            segment: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn player(&self) -> Arc<dyn PlayerHandle> {
        Arc::clone(&self.player)
    }

    pub fn item(&self) -> Arc<dyn ItemHandle> {
        Arc::clone(&self.item)
    }

    pub fn item_id(&self) -> ItemId {
        self.item.id()
    }

    pub fn status(&self) -> ItemStatus {
        self.item.status()
    }

    pub fn is_ready(&self) -> bool {
        self.item.status().is_ready()
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    pub fn intent(&self) -> PlayIntent {
        *self.intent.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn segment(&self) -> Option<PlaybackSegment> {
        *self.segment.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current_time(&self) -> Duration {
        self.item.current_time()
    }

    fn set_intent(&self, intent: PlayIntent) {
        *self.intent.lock().unwrap_or_else(|e| e.into_inner()) = intent;
    }

    fn apply_settings(&self, settings: &PlaybackSettings) {
        self.player.set_muted(settings.muted);
        self.item.set_peak_bitrate(settings.peak_bitrate_cap);
    }

    /// Start playback if the item is ready.
    ///
    /// The request is remembered either way; an item that is not ready yet
    /// starts later from the readiness handler.
    pub fn play(&self, settings: &PlaybackSettings) {
        self.apply_settings(settings);
        self.set_intent(PlayIntent::Playing);

        if self.item.status().is_ready() {
            self.player.play();
            trace!("Playing {} ({})", self.url, self.item.id());
        } else {
            trace!("Play deferred, not ready: {} ({})", self.url, self.item.id());
        }
    }

    pub fn pause(&self, settings: &PlaybackSettings) {
        self.apply_settings(settings);
        self.player.pause();
        self.set_intent(PlayIntent::Paused);
    }

    /// Rewind to zero and pause
    pub fn stop(&self, settings: &PlaybackSettings) {
        self.item.seek(Duration::ZERO);
        self.pause(settings);
    }

    pub fn seek(&self, to: Duration) {
        self.item.seek(to);
    }

    /// Seek to the segment start and cap forward playback at its end.
    pub fn apply_segment(&self, segment: &PlaybackSegment) {
        if let Some(start) = segment.start_time() {
            self.item.seek(start);
        }
        if let Some(end) = segment.end_time() {
            self.item.set_forward_end_time(Some(end));
        }
        *self.segment.lock().unwrap_or_else(|e| e.into_inner()) = Some(*segment);
    }

    /// Loop back after reaching the end: rewind, reapply the trim, resume.
    pub fn restart_loop(&self, segment: Option<&PlaybackSegment>) {
        self.item.seek(Duration::ZERO);
        if let Some(segment) = segment {
            self.apply_segment(segment);
        }
        self.player.play();
        self.set_intent(PlayIntent::Playing);
    }

    /// Independent copy for detached use: new player over a duplicated item,
    /// positioned where this one currently is.
    pub fn duplicate(&self, backend: &dyn MediaBackend) -> VideoResource {
        let item = self.item.duplicate();
        let player = backend.make_player(Arc::clone(&item));
        item.seek(self.item.current_time());
        VideoResource::new(self.url.clone(), player, item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBackend;

    fn resource(backend: &SimBackend, url: &str) -> VideoResource {
        let (player, item) = backend.handles_for(url);
        VideoResource::new(url, player, item)
    }

    #[test]
    fn test_play_requires_ready() {
        let backend = SimBackend::new().manual_readiness();
        let res = resource(&backend, "https://cdn.example.com/a.mp4");
        let settings = PlaybackSettings::default();

        res.play(&settings);
        assert!(!res.is_playing());
        assert_eq!(res.intent(), PlayIntent::Playing);

        backend.item("https://cdn.example.com/a.mp4").unwrap().set_status(ItemStatus::ReadyToPlay);
        res.play(&settings);
        assert!(res.is_playing());
    }

    #[test]
    fn test_pause_applies_settings() {
        let backend = SimBackend::new();
        let url = "https://cdn.example.com/b.mp4";
        let res = resource(&backend, url);
        let settings = PlaybackSettings {
            muted: true,
            peak_bitrate_cap: 2500.0,
            ..Default::default()
        };

        res.play(&PlaybackSettings::default());
        assert!(res.is_playing());
        res.pause(&settings);
        assert!(!res.is_playing());
        assert_eq!(res.intent(), PlayIntent::Paused);

        let player = backend.player(url).unwrap();
        let item = backend.item(url).unwrap();
        assert!(player.is_muted());
        assert_eq!(item.peak_bitrate(), 2500.0);
    }

    #[test]
    fn test_stop_rewinds() {
        let backend = SimBackend::new();
        let res = resource(&backend, "https://cdn.example.com/c.mp4");
        let settings = PlaybackSettings::default();

        res.play(&settings);
        backend.tick(Duration::from_secs(3));
        assert_eq!(res.current_time(), Duration::from_secs(3));

        res.stop(&settings);
        assert_eq!(res.current_time(), Duration::ZERO);
        assert!(!res.is_playing());
    }

    #[test]
    fn test_apply_segment_idempotent() {
        let backend = SimBackend::new();
        let url = "https://cdn.example.com/d.mp4";
        let res = resource(&backend, url);
        let seg = PlaybackSegment::new(Some(2.0), Some(5.0));

        res.apply_segment(&seg);
        res.apply_segment(&seg);

        let item = backend.item(url).unwrap();
        assert_eq!(res.current_time(), Duration::from_secs(2));
        assert_eq!(item.forward_end_time(), Some(Duration::from_secs(5)));
        assert_eq!(res.segment(), Some(seg));
    }

    #[test]
    fn test_duplicate_keeps_position() {
        let backend = SimBackend::new();
        let url = "https://cdn.example.com/e.mp4";
        let res = resource(&backend, url);
        res.play(&PlaybackSettings::default());
        backend.tick(Duration::from_millis(1500));

        let copy = res.duplicate(&backend);
        assert_eq!(copy.url(), url);
        assert_ne!(copy.item_id(), res.item_id());
        assert_eq!(copy.current_time(), Duration::from_millis(1500));
        assert!(!copy.is_playing());

        // Copy plays independently
        copy.play(&PlaybackSettings::default());
        res.pause(&PlaybackSettings::default());
        assert!(copy.is_playing());
        assert!(!res.is_playing());
    }
}
