//! Picks the one visible container that should autoplay.
//!
//! The host reports its visible containers in visual order (top to bottom,
//! leading index first). The first one whose rect lies fully inside the
//! viewport wins; everything else is paused. Ties cannot happen: iteration
//! order decides.
//!
//! Host lifecycle mapping:
//! - scroll / appear: `on_scroll` / `on_appear` (recompute focus)
//! - disappear / background: `on_disappear` / `on_background` (pause all)
//! - foreground: `on_foreground` (resume binding, then recompute)

use log::debug;
use std::fmt::Debug;
use std::sync::Arc;

use super::backend::OutputSurface;

/// Axis-aligned rectangle in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// True when `other` lies entirely inside `self` (edges may touch)
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        other.x < self.max_x()
            && other.max_x() > self.x
            && other.y < self.max_y()
            && other.max_y() > self.y
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// A cell that can show a video
pub trait VideoContainer {
    /// Clip URL, `None` for cells without video
    fn video_url(&self) -> Option<String>;
    /// Frame relative to the viewport, `None` when the host cannot tell
    fn bounding_rect(&self) -> Option<Rect>;
    fn surface(&self) -> Arc<dyn OutputSurface>;
}

/// The scrolling list that owns the containers
pub trait FeedHost {
    type Key: Clone + PartialEq + Debug;

    /// Visible containers in visual order
    fn visible_containers(&self) -> Vec<(Self::Key, Arc<dyn VideoContainer>)>;

    fn viewport_bounds(&self) -> Rect;
}

/// Commands the focus policy issues.
pub trait PlaybackControl {
    fn play(&mut self, surface: Arc<dyn OutputSurface>, url: &str);
    fn pause(&mut self, surface: &dyn OutputSurface, url: &str);
    fn stop(&mut self, surface: &dyn OutputSurface, url: &str);
    /// App came back to the foreground
    fn resume_foreground(&mut self) {}
}

/// Index of the focus winner: first container with a URL and a rect fully inside `viewport`
pub fn select_focus<K>(viewport: &Rect, containers: &[(K, Arc<dyn VideoContainer>)]) -> Option<usize> {
    containers.iter().position(|(_, c)| {
        c.video_url().is_some()
            && c.bounding_rect()
                .map(|r| viewport.contains_rect(&r))
                .unwrap_or(false)
    })
}

/// Focus tracker for one scrolling list.
#[derive(Debug, Clone)]
pub struct FocusPolicy<K> {
    focused: Option<K>,
}

impl<K> Default for FocusPolicy<K> {
    fn default() -> Self {
        Self { focused: None }
    }
}

impl<K: Clone + PartialEq + Debug> FocusPolicy<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of the container that won the last `play_focused`
    pub fn focused(&self) -> Option<&K> {
        self.focused.as_ref()
    }

    /// Play the focus winner and pause every other visible container.
    pub fn play_focused<H, C>(&mut self, host: &H, control: &mut C) -> Option<K>
    where
        H: FeedHost<Key = K>,
        C: PlaybackControl,
    {
        let containers = host.visible_containers();
        let winner = select_focus(&host.viewport_bounds(), &containers);

        for (idx, (_, container)) in containers.iter().enumerate() {
            // Cells without a clip take no part in playback
            let Some(url) = container.video_url() else {
                continue;
            };
            let surface = container.surface();
            if Some(idx) == winner {
                control.play(surface, &url);
            } else {
                control.pause(surface.as_ref(), &url);
            }
        }

        let focused = winner.map(|idx| containers[idx].0.clone());
        if focused != self.focused {
            debug!("Focus moved: {:?} -> {:?}", self.focused, focused);
        }
        self.focused = focused.clone();
        focused
    }

    pub fn pause_all<H, C>(&mut self, host: &H, control: &mut C)
    where
        H: FeedHost<Key = K>,
        C: PlaybackControl,
    {
        for (_, container) in host.visible_containers() {
            if let Some(url) = container.video_url() {
                control.pause(container.surface().as_ref(), &url);
            }
        }
        self.focused = None;
    }

    pub fn stop_all<H, C>(&mut self, host: &H, control: &mut C)
    where
        H: FeedHost<Key = K>,
        C: PlaybackControl,
    {
        for (_, container) in host.visible_containers() {
            if let Some(url) = container.video_url() {
                control.stop(container.surface().as_ref(), &url);
            }
        }
        self.focused = None;
    }

    pub fn on_appear<H: FeedHost<Key = K>, C: PlaybackControl>(&mut self, host: &H, control: &mut C) -> Option<K> {
        self.play_focused(host, control)
    }

    pub fn on_scroll<H: FeedHost<Key = K>, C: PlaybackControl>(&mut self, host: &H, control: &mut C) -> Option<K> {
        self.play_focused(host, control)
    }

    pub fn on_disappear<H: FeedHost<Key = K>, C: PlaybackControl>(&mut self, host: &H, control: &mut C) {
        self.pause_all(host, control)
    }

    pub fn on_background<H: FeedHost<Key = K>, C: PlaybackControl>(&mut self, host: &H, control: &mut C) {
        self.pause_all(host, control)
    }

    pub fn on_foreground<H: FeedHost<Key = K>, C: PlaybackControl>(&mut self, host: &H, control: &mut C) -> Option<K> {
        control.resume_foreground();
        self.play_focused(host, control)
    }
}
