//! Which URLs currently have status/end observers registered on their item.
//!
//! Observers are registered when a resource starts playing under the active
//! binding and removed on pause/stop/detach. Keeping one flag per URL makes
//! both operations idempotent, so an item never gets two observers and a
//! removal never targets an item that has none.

use log::trace;
use std::collections::HashMap;

use super::events::EventSender;
use super::resource::VideoResource;

#[derive(Debug, Default)]
pub struct ObservationRegistry {
    observing: HashMap<String, bool>,
}

impl ObservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_observed(&self, url: &str) -> bool {
        self.observing.get(url).copied().unwrap_or(false)
    }

    /// Register observers on the resource's item unless already registered.
    ///
    /// Returns true when a registration happened.
    pub fn observe(&mut self, resource: &VideoResource, events: &EventSender) -> bool {
        if self.is_observed(resource.url()) {
            return false;
        }
        resource.item().add_observer(events.clone());
        self.observing.insert(resource.url().to_string(), true);
        trace!("Observing {} ({})", resource.url(), resource.item_id());
        true
    }

    /// Remove observers from the resource's item if registered.
    ///
    /// Returns true when a removal happened.
    pub fn unobserve(&mut self, resource: &VideoResource) -> bool {
        if !self.is_observed(resource.url()) {
            return false;
        }
        resource.item().remove_observer();
        self.observing.insert(resource.url().to_string(), false);
        trace!("Stopped observing {} ({})", resource.url(), resource.item_id());
        true
    }

    /// Forget the flag for an evicted resource without touching its item.
    pub fn mark_evicted(&mut self, url: &str) {
        if let Some(flag) = self.observing.get_mut(url) {
            *flag = false;
        }
    }

    /// Number of URLs with live observers
    pub fn observed_count(&self) -> usize {
        self.observing.values().filter(|v| **v).count()
    }
}
