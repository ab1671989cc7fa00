//! In-memory media backend with a virtual clock.
//!
//! Used by the tests and by the `feedplay-sim` binary. Nothing here decodes
//! video: items only track status, position and trim, players only track
//! play/pause/mute. Time advances when `SimBackend::tick` is called.
//!
//! # Probe control
//!
//! - `SimBackend::fail_probe(url)` / `cancel_probe(url)`: make a URL unplayable
//! - `SimBackend::hold_probes()`: block every probe until the returned gate is released
//! - `SimBackend::manual_readiness()`: new items stay `Unknown` until `SimItem::set_status`

use crossbeam_channel::{Receiver, Sender};
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use url::Url;

use crate::core::backend::{
    ItemHandle, ItemId, ItemStatus, MediaBackend, OutputSurface, PlayerHandle, ProbeError,
    ProbedAsset, SurfaceId,
};
use crate::core::events::EventSender;
use crate::core::focus::{FeedHost, Rect, VideoContainer};

/// Default clip length
const DEFAULT_DURATION: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    NotPlayable,
    Cancelled,
}

/// Payload carried from `probe` to `make_item`
#[derive(Debug)]
struct SimAsset {
    url: String,
}

/// Weak index of live handles; whoever holds the `Arc`s decides their lifetime
#[derive(Default)]
struct SimRegistry {
    items: Mutex<Vec<Weak<SimItem>>>,
    players: Mutex<Vec<Weak<SimPlayer>>>,
}

impl SimRegistry {
    fn add_item(&self, item: &Arc<SimItem>) {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(item));
    }

    fn add_player(&self, player: &Arc<SimPlayer>) {
        self.players
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(player));
    }

    /// Live items, dropping dead entries
    fn live_items(&self) -> Vec<Arc<SimItem>> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.retain(|w| w.strong_count() > 0);
        items.iter().filter_map(Weak::upgrade).collect()
    }

    /// Live players, dropping dead entries
    fn live_players(&self) -> Vec<Arc<SimPlayer>> {
        let mut players = self.players.lock().unwrap_or_else(|e| e.into_inner());
        players.retain(|w| w.strong_count() > 0);
        players.iter().filter_map(Weak::upgrade).collect()
    }

    fn find_item(&self, id: ItemId) -> Option<Arc<SimItem>> {
        self.live_items().into_iter().find(|i| i.id == id)
    }
}

struct SimConfig {
    auto_ready: bool,
    duration: Duration,
    probe_delay: Option<Duration>,
    outcomes: HashMap<String, ProbeOutcome>,
    gate: Option<Receiver<()>>,
}

/// Simulated media framework
pub struct SimBackend {
    registry: Arc<SimRegistry>,
    config: Mutex<SimConfig>,
    probes: AtomicUsize,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimBackend")
            .field("probes", &self.probe_count())
            .finish()
    }
}

impl SimBackend {
    /// Backend whose probes succeed immediately and whose items are ready on creation
    pub fn new() -> Self {
        Self {
            registry: Arc::new(SimRegistry::default()),
            config: Mutex::new(SimConfig {
                auto_ready: true,
                duration: DEFAULT_DURATION,
                probe_delay: None,
                outcomes: HashMap::new(),
                gate: None,
            }),
            probes: AtomicUsize::new(0),
        }
    }

    /// New items start `Unknown`; tests flip them with `SimItem::set_status`
    pub fn manual_readiness(self) -> Self {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).auto_ready = false;
        self
    }

    pub fn with_duration(self, duration: Duration) -> Self {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).duration = duration;
        self
    }

    /// Sleep this long in every probe (network latency)
    pub fn with_probe_delay(self, delay: Duration) -> Self {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).probe_delay = Some(delay);
        self
    }

    pub fn fail_probe(&self, url: &str) {
        self.set_outcome(url, ProbeOutcome::NotPlayable);
    }

    pub fn cancel_probe(&self, url: &str) {
        self.set_outcome(url, ProbeOutcome::Cancelled);
    }

    /// Let probes for `url` succeed again
    pub fn restore_probe(&self, url: &str) {
        self.config
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .outcomes
            .remove(url);
    }

    fn set_outcome(&self, url: &str, outcome: ProbeOutcome) {
        self.config
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .outcomes
            .insert(url.to_string(), outcome);
    }

    /// Block all probes until the gate is released or dropped
    pub fn hold_probes(&self) -> ProbeGate {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.config.lock().unwrap_or_else(|e| e.into_inner()).gate = Some(rx);
        ProbeGate { tx }
    }

    /// Number of probes started so far
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Oldest live item for `url` (duplicates come later)
    pub fn item(&self, url: &str) -> Option<Arc<SimItem>> {
        self.registry.live_items().into_iter().find(|i| i.url == url)
    }

    /// Oldest live player for `url`
    pub fn player(&self, url: &str) -> Option<Arc<SimPlayer>> {
        self.registry.live_players().into_iter().find(|p| p.url() == url)
    }

    /// Number of items still held by someone
    pub fn live_item_count(&self) -> usize {
        self.registry.live_items().len()
    }

    /// Build a player/item pair directly, skipping the probe
    pub fn handles_for(&self, url: &str) -> (Arc<dyn PlayerHandle>, Arc<dyn ItemHandle>) {
        let item: Arc<dyn ItemHandle> = self.new_item(url);
        let player = self.make_player(Arc::clone(&item));
        (player, item)
    }

    fn new_item(&self, url: &str) -> Arc<SimItem> {
        let (auto_ready, duration) = {
            let config = self.config.lock().unwrap_or_else(|e| e.into_inner());
            (config.auto_ready, config.duration)
        };
        let status = if auto_ready {
            ItemStatus::ReadyToPlay
        } else {
            ItemStatus::Unknown
        };
        let item = Arc::new(SimItem::new(url, duration, status, Arc::downgrade(&self.registry)));
        self.registry.add_item(&item);
        item
    }

    /// Advance the virtual clock for every playing player.
    ///
    /// Items that hit their end stop and post `ReachedEnd`.
    pub fn tick(&self, dt: Duration) {
        for player in self.registry.live_players() {
            if !player.is_playing() {
                continue;
            }
            let Some(item) = player.sim_item.as_ref() else {
                continue;
            };
            if item.advance(dt) {
                player.playing.store(false, Ordering::SeqCst);
                trace!("Sim item reached end: {} ({})", item.url, item.id);
                item.post_end();
            }
        }
    }
}

impl MediaBackend for SimBackend {
    fn probe(&self, url: &Url) -> Result<ProbedAsset, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);

        let (gate, delay) = {
            let config = self.config.lock().unwrap_or_else(|e| e.into_inner());
            (config.gate.clone(), config.probe_delay)
        };
        if let Some(gate) = gate {
            // Returns once a release token arrives or the gate is dropped
            let _ = gate.recv();
        }
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let outcome = self
            .config
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .outcomes
            .get(url.as_str())
            .copied();
        match outcome {
            Some(ProbeOutcome::NotPlayable) => Err(ProbeError::NotPlayable(url.to_string())),
            Some(ProbeOutcome::Cancelled) => Err(ProbeError::Cancelled),
            None => {
                debug!("Sim probe ok: {}", url);
                Ok(ProbedAsset::new(
                    url.clone(),
                    SimAsset {
                        url: url.to_string(),
                    },
                ))
            }
        }
    }

    fn make_item(&self, asset: ProbedAsset) -> Result<Arc<dyn ItemHandle>, ProbeError> {
        let (_, asset) = asset.downcast::<SimAsset>()?;
        let item: Arc<dyn ItemHandle> = self.new_item(&asset.url);
        Ok(item)
    }

    fn make_player(&self, item: Arc<dyn ItemHandle>) -> Arc<dyn PlayerHandle> {
        let sim_item = self.registry.find_item(item.id());
        let player = Arc::new(SimPlayer {
            item,
            sim_item,
            playing: AtomicBool::new(false),
            muted: AtomicBool::new(false),
        });
        self.registry.add_player(&player);
        player
    }
}

/// Holds simulated probes until released
#[derive(Debug)]
pub struct ProbeGate {
    tx: Sender<()>,
}

impl ProbeGate {
    /// Let one waiting probe through
    pub fn release_one(&self) {
        let _ = self.tx.send(());
    }

    /// Let every probe through from now on
    pub fn release(self) {
        drop(self);
    }
}

struct ItemState {
    status: ItemStatus,
    position: Duration,
    forward_end: Option<Duration>,
    peak_bitrate: f64,
    observer: Option<EventSender>,
    registrations: usize,
}

/// Simulated playable item
pub struct SimItem {
    id: ItemId,
    url: String,
    duration: Duration,
    registry: Weak<SimRegistry>,
    state: Mutex<ItemState>,
}

impl SimItem {
    fn new(url: &str, duration: Duration, status: ItemStatus, registry: Weak<SimRegistry>) -> Self {
        Self {
            id: ItemId::next(),
            url: url.to_string(),
            duration,
            registry,
            state: Mutex::new(ItemState {
                status,
                position: Duration::ZERO,
                forward_end: None,
                peak_bitrate: 0.0,
                observer: None,
                registrations: 0,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ItemState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Change readiness and notify the observer, if any
    pub fn set_status(&self, status: ItemStatus) {
        let observer = {
            let mut state = self.state();
            state.status = status.clone();
            state.observer.clone()
        };
        if let Some(observer) = observer {
            observer.item_status(self.id, status);
        }
    }

    pub fn forward_end_time(&self) -> Option<Duration> {
        self.state().forward_end
    }

    pub fn peak_bitrate(&self) -> f64 {
        self.state().peak_bitrate
    }

    pub fn has_observer(&self) -> bool {
        self.state().observer.is_some()
    }

    /// How many times an observer was registered over the item's lifetime
    pub fn observer_registrations(&self) -> usize {
        self.state().registrations
    }

    /// Position where forward playback stops
    pub fn end_position(&self) -> Duration {
        let state = self.state();
        state
            .forward_end
            .map(|end| end.min(self.duration))
            .unwrap_or(self.duration)
    }

    /// Returns true when the end was reached
    fn advance(&self, dt: Duration) -> bool {
        let end = self.end_position();
        let mut state = self.state();
        state.position = (state.position + dt).min(end);
        state.position >= end
    }

    /// Post `ReachedEnd` as the framework would
    pub fn post_end(&self) {
        let observer = self.state().observer.clone();
        if let Some(observer) = observer {
            observer.reached_end(self.id);
        }
    }
}

impl ItemHandle for SimItem {
    fn id(&self) -> ItemId {
        self.id
    }

    fn status(&self) -> ItemStatus {
        self.state().status.clone()
    }

    fn current_time(&self) -> Duration {
        self.state().position
    }

    fn seek(&self, to: Duration) {
        let to = to.min(self.duration);
        self.state().position = to;
    }

    fn set_forward_end_time(&self, end: Option<Duration>) {
        self.state().forward_end = end;
    }

    fn set_peak_bitrate(&self, bits_per_sec: f64) {
        self.state().peak_bitrate = bits_per_sec;
    }

    fn duplicate(&self) -> Arc<dyn ItemHandle> {
        let copy: Arc<SimItem> = Arc::new(SimItem::new(
            &self.url,
            self.duration,
            self.status(),
            self.registry.clone(),
        ));
        if let Some(registry) = self.registry.upgrade() {
            registry.add_item(&copy);
        }
        copy
    }

    fn add_observer(&self, events: EventSender) {
        let status = {
            let mut state = self.state();
            state.observer = Some(events.clone());
            state.registrations += 1;
            state.status.clone()
        };
        events.item_status(self.id, status);
    }

    fn remove_observer(&self) {
        self.state().observer = None;
    }
}

/// Simulated player
pub struct SimPlayer {
    item: Arc<dyn ItemHandle>,
    sim_item: Option<Arc<SimItem>>,
    playing: AtomicBool,
    muted: AtomicBool,
}

impl SimPlayer {
    pub fn url(&self) -> &str {
        self.sim_item.as_ref().map(|i| i.url()).unwrap_or_default()
    }

    pub fn item_id(&self) -> ItemId {
        self.item.id()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }
}

impl PlayerHandle for SimPlayer {
    fn play(&self) {
        self.playing.store(true, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

/// Simulated video layer
#[derive(Default)]
pub struct SimSurface {
    id: SurfaceId,
    player: Mutex<Option<Arc<dyn PlayerHandle>>>,
}

impl std::fmt::Debug for SimSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimSurface")
            .field("id", &self.id)
            .field("has_player", &self.has_player())
            .finish()
    }
}

impl SimSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_player(&self) -> bool {
        self.player.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// True when the attached player is currently playing
    pub fn is_showing_playback(&self) -> bool {
        self.player
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.is_playing())
            .unwrap_or(false)
    }
}

impl OutputSurface for SimSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn attach_player(&self, player: Option<Arc<dyn PlayerHandle>>) {
        *self.player.lock().unwrap_or_else(|e| e.into_inner()) = player;
    }
}

/// Simulated list cell
#[derive(Debug)]
pub struct SimCell {
    url: Mutex<Option<String>>,
    rect: Mutex<Option<Rect>>,
    surface: Arc<SimSurface>,
}

impl SimCell {
    pub fn new(url: Option<String>, rect: Option<Rect>, surface: Arc<SimSurface>) -> Self {
        Self {
            url: Mutex::new(url),
            rect: Mutex::new(rect),
            surface,
        }
    }

    pub fn set_url(&self, url: Option<String>) {
        *self.url.lock().unwrap_or_else(|e| e.into_inner()) = url;
    }

    pub fn set_rect(&self, rect: Option<Rect>) {
        *self.rect.lock().unwrap_or_else(|e| e.into_inner()) = rect;
    }

    pub fn sim_surface(&self) -> Arc<SimSurface> {
        Arc::clone(&self.surface)
    }
}

impl VideoContainer for SimCell {
    fn video_url(&self) -> Option<String> {
        self.url.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn bounding_rect(&self) -> Option<Rect> {
        *self.rect.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn surface(&self) -> Arc<dyn OutputSurface> {
        self.surface.clone()
    }
}

/// Vertical list of equally tall rows, scrolled by an offset
#[derive(Debug)]
pub struct SimFeed {
    cells: Vec<Arc<SimCell>>,
    row_height: f64,
    viewport: Rect,
    offset: f64,
}

impl SimFeed {
    /// One row per URL, viewport at the top
    pub fn new(urls: &[String], row_height: f64, viewport_width: f64, viewport_height: f64) -> Self {
        let cells = urls
            .iter()
            .map(|u| Arc::new(SimCell::new(Some(u.clone()), None, Arc::new(SimSurface::new()))))
            .collect();
        let mut feed = Self {
            cells,
            row_height,
            viewport: Rect::new(0.0, 0.0, viewport_width, viewport_height),
            offset: 0.0,
        };
        feed.layout();
        feed
    }

    fn layout(&mut self) {
        for (idx, cell) in self.cells.iter().enumerate() {
            let frame = Rect::new(0.0, idx as f64 * self.row_height, self.viewport.width, self.row_height);
            cell.set_rect(Some(frame.offset(0.0, -self.offset)));
        }
    }

    /// Largest offset that still shows content
    pub fn max_offset(&self) -> f64 {
        (self.cells.len() as f64 * self.row_height - self.viewport.height).max(0.0)
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn scroll_to(&mut self, offset: f64) {
        self.offset = offset.clamp(0.0, self.max_offset());
        self.layout();
    }

    pub fn scroll_by(&mut self, dy: f64) {
        self.scroll_to(self.offset + dy);
    }

    pub fn cell(&self, idx: usize) -> Option<Arc<SimCell>> {
        self.cells.get(idx).cloned()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FeedHost for SimFeed {
    type Key = usize;

    fn visible_containers(&self) -> Vec<(usize, Arc<dyn VideoContainer>)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.bounding_rect()
                    .map(|r| self.viewport.intersects(&r))
                    .unwrap_or(false)
            })
            .map(|(idx, c)| {
                let container: Arc<dyn VideoContainer> = c.clone();
                (idx, container)
            })
            .collect()
    }

    fn viewport_bounds(&self) -> Rect {
        self.viewport
    }
}
