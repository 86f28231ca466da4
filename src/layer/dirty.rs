//! Dirty tracking for layers whose composited output changed.

use std::collections::HashMap;

/// Receives a notification the first time a clean layer becomes dirty.
pub trait DirtyListener {
    fn layer_dirtied(&mut self, layer: &str, generation: u32);
}

/// Tracks dirty events and per-layer generation counters.
///
/// Generation counters increment each time a clean layer is dirtied, so
/// caches of compound results can compare generations instead of
/// subscribing.
#[derive(Default)]
pub struct DirtyTracker {
    /// Generation counters for cache invalidation
    generations: HashMap<String, u32>,
    /// Layers dirtied since the last `take_events`
    events: Vec<String>,
    listeners: Vec<Box<dyn DirtyListener>>,
}

impl DirtyTracker {
    /// Create a tracker with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for dirty events.
    pub fn subscribe(&mut self, listener: Box<dyn DirtyListener>) {
        self.listeners.push(listener);
    }

    /// Record that `layer` went from clean to dirty. Returns the new generation.
    pub fn notify(&mut self, layer: &str) -> u32 {
        let generation = self.generations.entry(layer.to_string()).or_insert(0);
        *generation = generation.wrapping_add(1);
        let generation = *generation;

        self.events.push(layer.to_string());
        for listener in &mut self.listeners {
            listener.layer_dirtied(layer, generation);
        }
        generation
    }

    /// Current generation counter for a layer.
    pub fn generation(&self, layer: &str) -> u32 {
        self.generations.get(layer).copied().unwrap_or(0)
    }

    /// Take pending dirty events (clears the event list).
    pub fn take_events(&mut self) -> Vec<String> {
        std::mem::take(&mut self.events)
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Drop bookkeeping for a removed layer.
    pub fn forget(&mut self, layer: &str) {
        self.generations.remove(layer);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for DirtyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirtyTracker")
            .field("generations", &self.generations)
            .field("events", &self.events)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
