//! Playback coordinator: loading, single-focus binding, readiness, looping.
//!
//! **Architecture**: one coordinator per app session, constructed by the
//! composition root and owned by the UI thread. All cache and binding state
//! is mutated through `&mut self`, so the owning thread is the coordination
//! context and no locks guard it. Work that may block (asset probes) runs on
//! `ProbeWorkers` and comes back as events through the inbox.
//!
//! # Binding
//!
//! At most one (URL, surface) pair is active. `play` overwrites it;
//! `pause`/`stop`/`detach` clear it when they target the bound pair.
//! The binding holds its resource, so a clip evicted from the cache while on
//! screen can still be paused, and is retired when focus moves elsewhere.
//!
//! # Readiness
//!
//! Observers are registered on the active item exactly once per session.
//! Registration delivers the item's current status, later changes arrive as
//! events, so a play request made before the item was ready completes from a
//! single ordered path:
//!
//! - ready: play if the item still belongs to the active binding and the last
//!   request on it was "play"
//! - end: loop back (seek zero, reapply trim, resume) when looping is on
//! - foreground: replay the active binding
//!
//! Stale signals (focus already moved on) fail the identity check and are dropped.

use log::{debug, error, info, trace, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::backend::{ItemId, ItemStatus, MediaBackend, OutputSurface, ProbeError, ProbedAsset, SurfaceId};
use super::events::{inbox, EventInbox, EventSender, MediaEvent};
use super::focus::{PlaybackControl, VideoContainer};
use super::memory::MemoryMonitor;
use super::observers::ObservationRegistry;
use super::resource::{PlayIntent, VideoResource};
use super::resource_cache::{CacheStats, ResourceCache};
use super::segment::PlaybackSegment;
use super::workers::ProbeWorkers;
use crate::config::{CoordinatorConfig, PlaybackSettings};

/// The (URL, surface) pair that currently owns playback
#[derive(Clone)]
pub struct ActiveBinding {
    pub url: String,
    pub surface: Arc<dyn OutputSurface>,
    /// Resource shown on the surface; `None` while the URL is still loading
    pub resource: Option<Arc<VideoResource>>,
}

impl std::fmt::Debug for ActiveBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveBinding")
            .field("url", &self.url)
            .field("surface", &self.surface.id())
            .field("item", &self.resource.as_ref().map(|r| r.item_id()))
            .finish()
    }
}

pub struct PlaybackCoordinator {
    backend: Arc<dyn MediaBackend>,
    cache: ResourceCache,
    settings: PlaybackSettings,
    binding: Option<ActiveBinding>,
    observers: ObservationRegistry,
    events: EventSender,
    inbox: EventInbox,
    workers: ProbeWorkers,
    memory: Option<MemoryMonitor>,
    pressure_retain: usize,
}

impl std::fmt::Debug for PlaybackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackCoordinator")
            .field("binding", &self.binding)
            .field("cache", &self.cache.stats())
            .field("observed", &self.observers.observed_count())
            .field("settings", &self.settings)
            .finish()
    }
}

impl PlaybackCoordinator {
    pub fn new(backend: Arc<dyn MediaBackend>, config: CoordinatorConfig) -> Self {
        let (events, inbox) = inbox();
        let workers = ProbeWorkers::new(config.resolved_probe_threads());
        let memory = config.memory_watch.as_ref().map(MemoryMonitor::new);

        info!(
            "PlaybackCoordinator init: cache={}, probe threads={}, memory watch={}",
            config.cache_capacity,
            workers.threads(),
            memory.is_some()
        );

        Self {
            backend,
            cache: ResourceCache::new(config.cache_capacity),
            settings: config.playback,
            binding: None,
            observers: ObservationRegistry::new(),
            events,
            inbox,
            workers,
            memory,
            pressure_retain: config.pressure_retain,
        }
    }

    pub fn with_defaults(backend: Arc<dyn MediaBackend>) -> Self {
        Self::new(backend, CoordinatorConfig::default())
    }

    /// Handle for backends and hosts to post signals into the inbox
    pub fn event_sender(&self) -> EventSender {
        self.events.clone()
    }

    // === Settings ===

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.settings.muted = muted;
    }

    pub fn set_loop_on_end(&mut self, enabled: bool) {
        self.settings.loop_on_end = enabled;
    }

    pub fn set_peak_bitrate_cap(&mut self, bits_per_sec: f64) {
        self.settings.peak_bitrate_cap = bits_per_sec;
    }

    /// Trim for clips loaded from now on (and for every loop)
    pub fn set_global_segment(&mut self, segment: Option<PlaybackSegment>) {
        self.settings.segment = segment;
    }

    // === Loading ===

    /// Start loading `url` unless it is cached or already loading.
    ///
    /// Accepts absolute URLs and absolute file paths (probed as `file://`).
    /// Returns true when a probe was started. Anything else is dropped.
    pub fn ensure_loaded(&mut self, url: &str) -> bool {
        let Some(parsed) = resolve_source(url) else {
            warn!("Dropping unresolvable video URL {:?}", url);
            return false;
        };
        if !self.cache.begin_probe(url) {
            trace!("Load skipped, cached or in flight: {}", url);
            return false;
        }

        debug!("Probing {}", url);
        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        let key = url.to_string();
        self.workers.execute(move || {
            let result = backend.probe(&parsed);
            events.send(MediaEvent::ProbeFinished { url: key, result });
        });
        true
    }

    /// Host-facing alias of `ensure_loaded`
    pub fn request_load(&mut self, url: &str) -> bool {
        self.ensure_loaded(url)
    }

    /// Cached resource, without touching focus or LRU order
    pub fn lookup(&self, url: &str) -> Option<Arc<VideoResource>> {
        self.cache.peek(url)
    }

    /// Independent copy of a cached resource (own player, same position)
    pub fn detached_copy(&self, url: &str) -> Option<VideoResource> {
        self.cache
            .peek(url)
            .map(|res| res.duplicate(self.backend.as_ref()))
    }

    /// Drop a cached resource; the next request loads it again.
    ///
    /// A bound resource keeps playing on its surface until released.
    pub fn invalidate(&mut self, url: &str) {
        let Some(res) = self.cache.remove(url) else {
            return;
        };
        if self.is_bound(&res) {
            self.on_evicted(&res);
        } else {
            self.observers.unobserve(&res);
        }
        debug!("Invalidated {}", url);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn is_loading(&self, url: &str) -> bool {
        self.cache.is_in_flight(url)
    }

    // === Focus ===

    pub fn active_binding(&self) -> Option<&ActiveBinding> {
        self.binding.as_ref()
    }

    pub fn active_url(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.url.as_str())
    }

    pub fn active_surface(&self) -> Option<SurfaceId> {
        self.binding.as_ref().map(|b| b.surface.id())
    }

    pub fn is_observing(&self, url: &str) -> bool {
        self.observers.is_observed(url)
    }

    fn active_resource(&self) -> Option<Arc<VideoResource>> {
        self.binding.as_ref().and_then(|b| b.resource.clone())
    }

    fn is_cached(&self, res: &Arc<VideoResource>) -> bool {
        self.cache
            .peek(res.url())
            .is_some_and(|cached| Arc::ptr_eq(&cached, res))
    }

    fn is_bound(&self, res: &Arc<VideoResource>) -> bool {
        self.active_resource()
            .is_some_and(|bound| Arc::ptr_eq(&bound, res))
    }

    /// Make (url, surface) the only active binding and start playback.
    ///
    /// A URL that is not cached yet gets loaded; playback starts when the
    /// probe finishes, provided the binding is still the same. A previously
    /// bound resource that already left the cache is paused here, since no
    /// later lookup can reach it.
    pub fn play(&mut self, surface: Arc<dyn OutputSurface>, url: &str) {
        let previous = self.binding.take().and_then(|b| b.resource);
        let resource = self.cache.get(url);

        if let Some(old) = &previous
            && resource
                .as_ref()
                .map_or(old.url() != url, |new| !Arc::ptr_eq(old, new))
            && !self.is_cached(old)
        {
            self.retire(old, false);
        }

        let bound = match resource {
            Some(res) => {
                surface.attach_player(Some(res.player()));
                res.play(&self.settings);
                self.observers.observe(&res, &self.events);
                Some(res)
            }
            None => match previous.filter(|old| old.url() == url) {
                // Evicted while on screen: keep using it, it still has its observer
                Some(held) => {
                    surface.attach_player(Some(held.player()));
                    held.play(&self.settings);
                    Some(held)
                }
                None => {
                    self.ensure_loaded(url);
                    None
                }
            },
        };

        self.binding = Some(ActiveBinding {
            url: url.to_string(),
            surface,
            resource: bound,
        });
    }

    pub fn pause(&mut self, surface: &dyn OutputSurface, url: &str) {
        self.release(surface.id(), url, false);
    }

    /// Pause and rewind to zero
    pub fn stop(&mut self, surface: &dyn OutputSurface, url: &str) {
        self.release(surface.id(), url, true);
    }

    /// Pause the container's clip and take the player off its surface
    pub fn detach(&mut self, container: &dyn VideoContainer) {
        let Some(url) = container.video_url() else {
            return;
        };
        let surface = container.surface();
        self.release(surface.id(), &url, false);
        surface.attach_player(None);
    }

    fn release(&mut self, surface: SurfaceId, url: &str, rewind: bool) {
        let mut held = None;
        if let Some(binding) = &self.binding
            && binding.url == url
        {
            if binding.surface.id() != surface {
                // Same clip is on screen in another cell and that cell owns it
                trace!("Release ignored, {} is bound to another surface", url);
                return;
            }
            held = self.binding.take().and_then(|b| b.resource);
        }

        if let Some(res) = self.cache.peek(url) {
            if rewind {
                res.stop(&self.settings);
            } else {
                res.pause(&self.settings);
            }
            self.observers.unobserve(&res);
        }
        if let Some(res) = held
            && !self.is_cached(&res)
        {
            self.retire(&res, rewind);
        }
    }

    /// Pause a resource that is no longer cached and drop its observer
    fn retire(&self, res: &VideoResource, rewind: bool) {
        if rewind {
            res.stop(&self.settings);
        } else {
            res.pause(&self.settings);
        }
        res.item().remove_observer();
        debug!("Retired uncached {} ({})", res.url(), res.item_id());
    }

    // === Signals ===

    /// App returned to the foreground: resume the active binding
    pub fn on_foreground(&mut self) {
        let Some(binding) = self.binding.clone() else {
            return;
        };
        debug!("Foreground, resuming {}", binding.url);
        self.play(binding.surface, &binding.url);
    }

    /// Reclaim cached resources down to the configured retain count
    pub fn on_memory_pressure(&mut self) {
        let evicted = self.cache.reclaim(self.pressure_retain);
        if !evicted.is_empty() {
            info!("Memory pressure: released {} video resources", evicted.len());
        }
        for res in &evicted {
            self.on_evicted(res);
        }
    }

    fn on_evicted(&mut self, res: &VideoResource) {
        // Observers stay on the item; only pause/stop/detach remove them
        self.observers.mark_evicted(res.url());
        debug!("Evicted {} ({})", res.url(), res.item_id());
    }

    /// Handle everything queued in the inbox. Returns the number of events handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.inbox.try_next() {
            self.handle_event(event);
            handled += 1;
        }
        self.check_memory();
        handled
    }

    /// Like `process_events`, but first waits up to `timeout` for an event to arrive.
    pub fn wait_events(&mut self, timeout: Duration) -> usize {
        match self.inbox.next_timeout(timeout) {
            Some(event) => {
                self.handle_event(event);
                1 + self.process_events()
            }
            None => {
                self.check_memory();
                0
            }
        }
    }

    fn check_memory(&mut self) {
        let low = self.memory.as_mut().map(|m| m.poll()).unwrap_or(false);
        if low {
            self.on_memory_pressure();
        }
    }

    fn handle_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::ProbeFinished { url, result } => self.handle_probe_finished(url, result),
            MediaEvent::ItemStatus { item, status } => self.handle_item_status(item, status),
            MediaEvent::ReachedEnd { item } => self.handle_reached_end(item),
            MediaEvent::Foreground => self.on_foreground(),
            MediaEvent::MemoryPressure => self.on_memory_pressure(),
        }
    }

    fn handle_probe_finished(&mut self, url: String, result: Result<ProbedAsset, ProbeError>) {
        self.cache.finish_probe(&url);

        let asset = match result {
            Ok(asset) => asset,
            Err(e) => {
                warn!("Failed to load video asset {}: {}", url, e);
                return;
            }
        };

        let item = match self.backend.make_item(asset) {
            Ok(item) => item,
            Err(ProbeError::HandleMismatch(expected)) => {
                error!("Backend handed back a foreign asset for {} (expected {})", url, expected);
                debug_assert!(false, "media backend produced an asset that is not a {}", expected);
                return;
            }
            Err(e) => {
                warn!("Failed to create item for {}: {}", url, e);
                return;
            }
        };
        let player = self.backend.make_player(Arc::clone(&item));
        let resource = Arc::new(VideoResource::new(url.clone(), player, item));
        if let Some(segment) = &self.settings.segment {
            resource.apply_segment(segment);
        }

        if let Some(evicted) = self.cache.insert(resource) {
            self.on_evicted(&evicted);
        }

        // play() may have run before the asset was ready
        if let Some(binding) = self.binding.clone()
            && binding.url == url
        {
            self.play(binding.surface, &url);
        }
    }

    fn handle_item_status(&mut self, item: ItemId, status: ItemStatus) {
        match status {
            ItemStatus::ReadyToPlay => {
                let Some(res) = self.active_resource() else {
                    trace!("Ready signal without active binding: {}", item);
                    return;
                };
                if res.item_id() != item {
                    trace!("Stale ready signal ignored: {}", item);
                    return;
                }
                if res.intent() == PlayIntent::Playing {
                    res.play(&self.settings);
                }
            }
            ItemStatus::Failed(reason) => warn!("Video item failed: {} ({})", item, reason),
            ItemStatus::Unknown => trace!("Video item status unknown: {}", item),
        }
    }

    fn handle_reached_end(&mut self, item: ItemId) {
        if !self.settings.loop_on_end {
            return;
        }
        let Some(res) = self.active_resource() else {
            return;
        };
        if res.item_id() != item {
            return;
        }
        trace!("Looping {}", res.url());
        res.restart_loop(self.settings.segment.as_ref());
    }
}

/// Parse a source string: absolute URL, or absolute path as a `file://` URL
fn resolve_source(source: &str) -> Option<Url> {
    match Url::parse(source) {
        Ok(url) => Some(url),
        Err(_) if Path::new(source).is_absolute() => Url::from_file_path(source).ok(),
        Err(_) => None,
    }
}

impl PlaybackControl for PlaybackCoordinator {
    fn play(&mut self, surface: Arc<dyn OutputSurface>, url: &str) {
        PlaybackCoordinator::play(self, surface, url);
    }

    fn pause(&mut self, surface: &dyn OutputSurface, url: &str) {
        PlaybackCoordinator::pause(self, surface, url);
    }

    fn stop(&mut self, surface: &dyn OutputSurface, url: &str) {
        PlaybackCoordinator::stop(self, surface, url);
    }

    fn resume_foreground(&mut self) {
        self.on_foreground();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::{ItemHandle, PlayerHandle};
    use crate::core::focus::{FocusPolicy, Rect};
    use crate::sim::{SimBackend, SimCell, SimFeed, SimSurface};
    use std::time::Instant;

    const U1: &str = "https://cdn.example.com/clips/1.mp4";
    const U2: &str = "https://cdn.example.com/clips/2.mp4";
    const U3: &str = "https://cdn.example.com/clips/3.mp4";

    fn setup(backend: SimBackend, config: CoordinatorConfig) -> (Arc<SimBackend>, PlaybackCoordinator) {
        let backend = Arc::new(backend);
        let coord = PlaybackCoordinator::new(backend.clone(), config);
        (backend, coord)
    }

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            probe_threads: 2,
            ..Default::default()
        }
    }

    /// Pump events until `cond` holds or 5s pass
    fn wait_until(coord: &mut PlaybackCoordinator, cond: impl Fn(&PlaybackCoordinator) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond(coord) {
                return true;
            }
            coord.wait_events(Duration::from_millis(10));
        }
        cond(coord)
    }

    fn load(coord: &mut PlaybackCoordinator, url: &str) -> Arc<VideoResource> {
        coord.ensure_loaded(url);
        assert!(wait_until(coord, |c| c.lookup(url).is_some()), "{} never loaded", url);
        coord.lookup(url).unwrap()
    }

    #[test]
    fn test_lookup_unknown_is_none() {
        let (_backend, coord) = setup(SimBackend::new(), config());
        assert!(coord.lookup(U1).is_none());
        assert!(coord.active_url().is_none());
    }

    #[test]
    fn test_single_probe_in_flight() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        let gate = backend.hold_probes();

        assert!(coord.ensure_loaded(U1));
        assert!(!coord.ensure_loaded(U1));
        assert!(coord.is_loading(U1));

        gate.release();
        let res = load(&mut coord, U1);
        assert_eq!(res.url(), U1);
        assert_eq!(backend.probe_count(), 1);
        assert_eq!(coord.cache_stats().probes_started, 1);

        // Cached now: no new probe
        assert!(!coord.ensure_loaded(U1));
        assert_eq!(backend.probe_count(), 1);
    }

    #[test]
    fn test_malformed_url_dropped() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        assert!(!coord.ensure_loaded("not a url"));
        assert!(!coord.is_loading("not a url"));
        assert_eq!(backend.probe_count(), 0);
        assert!(coord.lookup("not a url").is_none());
    }

    #[test]
    fn test_failed_probe_retries_cleanly() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        backend.fail_probe(U1);

        assert!(coord.ensure_loaded(U1));
        assert!(wait_until(&mut coord, |c| !c.is_loading(U1)));
        assert!(coord.lookup(U1).is_none());

        backend.restore_probe(U1);
        assert!(coord.ensure_loaded(U1));
        load(&mut coord, U1);
        assert_eq!(backend.probe_count(), 2);
    }

    #[test]
    fn test_cancelled_probe_leaves_no_resource() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        backend.cancel_probe(U2);
        coord.ensure_loaded(U2);
        assert!(wait_until(&mut coord, |c| !c.is_loading(U2)));
        assert!(coord.lookup(U2).is_none());
    }

    #[test]
    fn test_play_replaces_binding() {
        let (_backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());
        let s2 = Arc::new(SimSurface::new());
        load(&mut coord, U1);
        load(&mut coord, U2);

        coord.play(s1.clone(), U1);
        assert_eq!(coord.active_url(), Some(U1));
        assert_eq!(coord.active_surface(), Some(s1.id()));

        coord.play(s2.clone(), U2);
        assert_eq!(coord.active_url(), Some(U2));
        assert_eq!(coord.active_surface(), Some(s2.id()));
    }

    #[test]
    fn test_play_before_load_starts_when_ready() {
        let (_backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());

        coord.play(s1.clone(), U1);
        assert!(coord.lookup(U1).is_none());
        assert!(wait_until(&mut coord, |c| c.lookup(U1).map(|r| r.is_playing()).unwrap_or(false)));
        assert!(s1.is_showing_playback());
        assert!(coord.is_observing(U1));
    }

    #[test]
    fn test_loaded_after_focus_moved_stays_paused() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());
        let s2 = Arc::new(SimSurface::new());
        let gate = backend.hold_probes();

        coord.play(s1.clone(), U1);
        coord.play(s2.clone(), U2);
        gate.release();

        assert!(wait_until(&mut coord, |c| c.lookup(U1).is_some() && c.lookup(U2).is_some()));
        coord.process_events();
        assert!(!coord.lookup(U1).unwrap().is_playing());
        assert!(coord.lookup(U2).unwrap().is_playing());
        assert!(!s1.has_player());
    }

    #[test]
    fn test_ready_signal_completes_deferred_play() {
        let (backend, mut coord) = setup(SimBackend::new().manual_readiness(), config());
        let s1 = Arc::new(SimSurface::new());
        let res = load(&mut coord, U1);

        coord.play(s1.clone(), U1);
        coord.process_events();
        assert!(!res.is_playing());
        assert_eq!(res.intent(), PlayIntent::Playing);

        backend.item(U1).unwrap().set_status(ItemStatus::ReadyToPlay);
        coord.process_events();
        assert!(res.is_playing());
    }

    #[test]
    fn test_stale_ready_signal_ignored() {
        let (backend, mut coord) = setup(SimBackend::new().manual_readiness(), config());
        let s1 = Arc::new(SimSurface::new());
        let s2 = Arc::new(SimSurface::new());
        let r1 = load(&mut coord, U1);
        load(&mut coord, U2);

        coord.play(s1.clone(), U1);
        coord.play(s2.clone(), U2);
        coord.process_events();

        backend.item(U1).unwrap().set_status(ItemStatus::ReadyToPlay);
        coord.process_events();
        assert!(!r1.is_playing());
    }

    #[test]
    fn test_failed_status_is_not_fatal() {
        let (backend, mut coord) = setup(SimBackend::new().manual_readiness(), config());
        let s1 = Arc::new(SimSurface::new());
        let res = load(&mut coord, U1);
        coord.play(s1.clone(), U1);

        backend.item(U1).unwrap().set_status(ItemStatus::Failed("decode error".into()));
        coord.process_events();
        assert!(!res.is_playing());
        assert_eq!(coord.active_url(), Some(U1));
    }

    #[test]
    fn test_pause_then_play_resumes_position() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());
        let res = load(&mut coord, U1);

        coord.play(s1.clone(), U1);
        backend.tick(Duration::from_secs(3));
        coord.pause(s1.as_ref(), U1);
        assert!(coord.active_url().is_none());
        assert!(!coord.is_observing(U1));
        backend.tick(Duration::from_secs(2));

        coord.play(s1.clone(), U1);
        assert!(res.is_playing());
        assert_eq!(res.current_time(), Duration::from_secs(3));
    }

    #[test]
    fn test_stop_always_rewinds() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());
        let res = load(&mut coord, U1);

        coord.play(s1.clone(), U1);
        backend.tick(Duration::from_secs(4));
        coord.stop(s1.as_ref(), U1);
        assert_eq!(res.current_time(), Duration::ZERO);
        assert!(!res.is_playing());

        // Stop on an already paused resource still rewinds
        res.seek(Duration::from_secs(2));
        coord.stop(s1.as_ref(), U1);
        assert_eq!(res.current_time(), Duration::ZERO);
    }

    #[test]
    fn test_pause_of_other_binding_keeps_focus() {
        let (_backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());
        let s2 = Arc::new(SimSurface::new());
        let r1 = load(&mut coord, U1);
        load(&mut coord, U2);

        coord.play(s1.clone(), U1);
        coord.pause(s2.as_ref(), U2);
        assert_eq!(coord.active_url(), Some(U1));
        assert!(r1.is_playing());

        // Same URL in another cell does not steal the playback
        coord.pause(s2.as_ref(), U1);
        assert_eq!(coord.active_url(), Some(U1));
        assert!(r1.is_playing());
    }

    #[test]
    fn test_observers_registered_once() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());
        load(&mut coord, U1);

        coord.play(s1.clone(), U1);
        coord.play(s1.clone(), U1);
        coord.play(s1.clone(), U1);
        coord.process_events();
        let item = backend.item(U1).unwrap();
        assert_eq!(item.observer_registrations(), 1);

        coord.pause(s1.as_ref(), U1);
        coord.pause(s1.as_ref(), U1);
        assert!(!item.has_observer());

        coord.play(s1.clone(), U1);
        assert_eq!(item.observer_registrations(), 2);
    }

    #[test]
    fn test_eviction_of_active_resource() {
        let cfg = CoordinatorConfig {
            cache_capacity: 1,
            ..config()
        };
        let (backend, mut coord) = setup(SimBackend::new(), cfg);
        let s1 = Arc::new(SimSurface::new());
        let r1 = load(&mut coord, U1);
        coord.play(s1.clone(), U1);
        assert!(coord.is_observing(U1));

        load(&mut coord, U2);
        assert!(coord.lookup(U1).is_none());
        assert!(!coord.is_observing(U1));
        // Surface still holds the player
        assert!(r1.is_playing());
        assert!(s1.is_showing_playback());

        // The binding still reaches the evicted resource
        coord.pause(s1.as_ref(), U1);
        assert!(coord.active_url().is_none());
        assert!(!r1.is_playing());
        assert!(!backend.item(U1).unwrap().has_observer());
        coord.stop(s1.as_ref(), U1);
    }

    #[test]
    fn test_evicted_active_clip_stops_when_focus_moves() {
        let cfg = CoordinatorConfig {
            cache_capacity: 1,
            ..config()
        };
        let (backend, mut coord) = setup(SimBackend::new(), cfg);
        let urls: Vec<String> = vec![U1.to_string(), U2.to_string(), U3.to_string()];
        let mut feed = SimFeed::new(&urls, 400.0, 400.0, 800.0);
        let mut policy = FocusPolicy::new();

        load(&mut coord, U1);
        assert_eq!(policy.on_scroll(&feed, &mut coord), Some(0));
        coord.process_events();
        load(&mut coord, U2);
        assert!(coord.lookup(U1).is_none());
        assert!(backend.player(U1).unwrap().is_playing());

        // Row 0 scrolls fully out of view, row 1 takes focus
        feed.scroll_to(400.0);
        assert_eq!(policy.on_scroll(&feed, &mut coord), Some(1));
        coord.process_events();

        assert!(!backend.player(U1).unwrap().is_playing());
        assert!(!backend.item(U1).unwrap().has_observer());
        assert!(backend.player(U2).unwrap().is_playing());
        assert_eq!(coord.active_url(), Some(U2));
    }

    #[test]
    fn test_evicted_active_clip_resumes_on_foreground() {
        let cfg = CoordinatorConfig {
            cache_capacity: 1,
            ..config()
        };
        let (backend, mut coord) = setup(SimBackend::new(), cfg);
        let s1 = Arc::new(SimSurface::new());
        let r1 = load(&mut coord, U1);
        coord.play(s1.clone(), U1);
        load(&mut coord, U2);

        backend.player(U1).unwrap().pause();
        coord.on_foreground();
        assert!(r1.is_playing());
        // Still the held resource, no reload
        assert!(!coord.is_loading(U1));
        let bound = coord.active_binding().and_then(|b| b.resource.clone()).unwrap();
        assert!(Arc::ptr_eq(&bound, &r1));
    }

    #[test]
    fn test_invalidated_active_clip_can_be_paused() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());
        let r1 = load(&mut coord, U1);
        coord.play(s1.clone(), U1);

        coord.invalidate(U1);
        assert!(coord.lookup(U1).is_none());
        assert!(r1.is_playing());

        coord.pause(s1.as_ref(), U1);
        assert!(!r1.is_playing());
        assert!(coord.active_url().is_none());
        assert!(!backend.item(U1).unwrap().has_observer());
    }

    #[test]
    fn test_reload_replaces_evicted_active_clip() {
        let cfg = CoordinatorConfig {
            cache_capacity: 1,
            ..config()
        };
        let (backend, mut coord) = setup(SimBackend::new(), cfg);
        let s1 = Arc::new(SimSurface::new());
        let r1 = load(&mut coord, U1);
        coord.play(s1.clone(), U1);
        coord.invalidate(U1);

        // Prefetch brings a fresh copy while the old one is still bound
        let fresh = load(&mut coord, U1);
        assert_ne!(fresh.item_id(), r1.item_id());
        assert!(fresh.is_playing());
        assert!(!r1.is_playing());
        assert!(coord.is_observing(U1));
        assert_eq!(backend.probe_count(), 2);
    }

    #[test]
    #[cfg(unix)]
    fn test_absolute_path_source_accepted() {
        let (_backend, mut coord) = setup(SimBackend::new(), config());
        let path = "/var/mobile/clips/local.mp4";
        load(&mut coord, path);
        assert!(coord.lookup(path).is_some());
        assert!(!coord.ensure_loaded("clips/relative.mp4"));
    }

    struct ForeignAssetBackend(SimBackend);

    impl MediaBackend for ForeignAssetBackend {
        fn probe(&self, url: &Url) -> Result<ProbedAsset, ProbeError> {
            self.0.probe(url)
        }

        fn make_item(&self, _asset: ProbedAsset) -> Result<Arc<dyn ItemHandle>, ProbeError> {
            Err(ProbeError::HandleMismatch("SimAsset"))
        }

        fn make_player(&self, item: Arc<dyn ItemHandle>) -> Arc<dyn PlayerHandle> {
            self.0.make_player(item)
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not a SimAsset")]
    fn test_foreign_asset_fatal_in_debug() {
        let backend = Arc::new(ForeignAssetBackend(SimBackend::new()));
        let mut coord = PlaybackCoordinator::new(backend, config());
        coord.ensure_loaded(U1);
        wait_until(&mut coord, |c| !c.is_loading(U1));
    }

    #[test]
    fn test_loop_reapplies_segment() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        coord.set_global_segment(Some(PlaybackSegment::new(Some(2.0), Some(5.0))));
        let s1 = Arc::new(SimSurface::new());
        let res = load(&mut coord, U1);
        assert_eq!(res.current_time(), Duration::from_secs(2));

        coord.play(s1.clone(), U1);
        coord.process_events();
        backend.tick(Duration::from_secs(4));
        assert!(!res.is_playing());
        assert_eq!(res.current_time(), Duration::from_secs(5));

        coord.process_events();
        assert!(res.is_playing());
        assert_eq!(res.current_time(), Duration::from_secs(2));
        assert_eq!(backend.item(U1).unwrap().forward_end_time(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_no_loop_when_disabled() {
        let backend = SimBackend::new().with_duration(Duration::from_secs(3));
        let (backend, mut coord) = setup(backend, config());
        coord.set_loop_on_end(false);
        let s1 = Arc::new(SimSurface::new());
        let res = load(&mut coord, U1);

        coord.play(s1.clone(), U1);
        backend.tick(Duration::from_secs(5));
        coord.process_events();
        assert!(!res.is_playing());
        assert_eq!(res.current_time(), Duration::from_secs(3));
    }

    #[test]
    fn test_foreground_resumes_binding() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());
        let res = load(&mut coord, U1);
        coord.play(s1.clone(), U1);

        // OS paused the player while in background
        backend.player(U1).unwrap().pause();
        assert!(!res.is_playing());

        coord.event_sender().foreground();
        coord.process_events();
        assert!(res.is_playing());

        // Nothing bound: foreground is a no-op
        coord.pause(s1.as_ref(), U1);
        coord.on_foreground();
        assert!(!res.is_playing());
    }

    #[test]
    fn test_detach_unbinds_surface() {
        let (_backend, mut coord) = setup(SimBackend::new(), config());
        let surface = Arc::new(SimSurface::new());
        let cell = SimCell::new(Some(U1.to_string()), Some(Rect::default()), surface.clone());
        let res = load(&mut coord, U1);

        coord.play(surface.clone(), U1);
        assert!(surface.has_player());

        coord.detach(&cell);
        assert!(!surface.has_player());
        assert!(!res.is_playing());
        assert!(coord.active_url().is_none());
        assert!(!coord.is_observing(U1));

        // No URL: nothing to do
        let empty = SimCell::new(None, None, Arc::new(SimSurface::new()));
        coord.detach(&empty);
    }

    #[test]
    fn test_memory_pressure_reclaims() {
        let cfg = CoordinatorConfig {
            cache_capacity: 8,
            pressure_retain: 1,
            ..config()
        };
        let (_backend, mut coord) = setup(SimBackend::new(), cfg);
        load(&mut coord, U1);
        load(&mut coord, U2);
        load(&mut coord, U3);

        coord.event_sender().memory_pressure();
        coord.process_events();
        assert_eq!(coord.cache_stats().len, 1);
        assert!(coord.lookup(U3).is_some());
    }

    #[test]
    fn test_settings_read_at_play_time() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());
        load(&mut coord, U1);

        coord.set_muted(true);
        coord.set_peak_bitrate_cap(4000.0);
        coord.play(s1.clone(), U1);
        assert!(backend.player(U1).unwrap().is_muted());
        assert_eq!(backend.item(U1).unwrap().peak_bitrate(), 4000.0);

        coord.set_muted(false);
        coord.pause(s1.as_ref(), U1);
        assert!(!backend.player(U1).unwrap().is_muted());
    }

    #[test]
    fn test_detached_copy_and_invalidate() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        let s1 = Arc::new(SimSurface::new());
        let res = load(&mut coord, U1);
        coord.play(s1.clone(), U1);
        backend.tick(Duration::from_secs(1));

        let copy = coord.detached_copy(U1).unwrap();
        assert_eq!(copy.current_time(), Duration::from_secs(1));
        assert_ne!(copy.item_id(), res.item_id());
        assert!(coord.detached_copy(U2).is_none());

        coord.invalidate(U1);
        assert!(coord.lookup(U1).is_none());
        assert!(!coord.is_observing(U1));
        assert!(coord.ensure_loaded(U1));
    }

    #[test]
    fn test_focus_policy_drives_coordinator() {
        let (backend, mut coord) = setup(SimBackend::new(), config());
        let urls: Vec<String> = vec![U1.to_string(), U2.to_string(), U3.to_string()];
        for u in &urls {
            load(&mut coord, u);
        }
        // 400px rows in an 800px viewport scrolled by 100: row 1 fully visible
        let mut feed = SimFeed::new(&urls, 400.0, 400.0, 800.0);
        feed.scroll_to(100.0);
        let mut policy = FocusPolicy::new();

        assert_eq!(policy.on_scroll(&feed, &mut coord), Some(1));
        coord.process_events();
        assert_eq!(coord.active_url(), Some(U2));
        assert!(backend.player(U2).unwrap().is_playing());
        assert!(!backend.player(U1).unwrap().is_playing());
        assert_eq!(coord.lookup(U1).unwrap().intent(), PlayIntent::Paused);
        assert_eq!(coord.lookup(U3).unwrap().intent(), PlayIntent::Paused);

        feed.scroll_to(0.0);
        assert_eq!(policy.on_scroll(&feed, &mut coord), Some(0));
        assert_eq!(coord.active_url(), Some(U1));
        assert!(!backend.player(U2).unwrap().is_playing());

        policy.on_disappear(&feed, &mut coord);
        assert!(coord.active_url().is_none());
        assert!(!backend.player(U1).unwrap().is_playing());
    }
}
