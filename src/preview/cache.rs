//! Preview cache store
//!
//! Four key-indexed stores (small bitmaps, large bitmaps, in-flight keys,
//! error messages) that together hold the state of every preview. All
//! mutation goes through `&mut self`, so a reader always sees a key either
//! before or after a transition, never halfway.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use lru::LruCache;

use super::key::PreviewKey;
use super::types::{Bitmap, PreviewState};

/// Decides which ready previews to drop as new ones arrive
pub trait EvictionPolicy: Send {
    /// A key just became ready; return keys to evict
    fn on_ready(&mut self, key: &PreviewKey) -> Vec<PreviewKey>;

    /// A ready key was used again
    fn touch(&mut self, key: &PreviewKey);
}

/// Keep everything for the life of the process
#[derive(Debug, Default)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn on_ready(&mut self, _key: &PreviewKey) -> Vec<PreviewKey> {
        Vec::new()
    }

    fn touch(&mut self, _key: &PreviewKey) {}
}

/// Keep at most `capacity` ready previews, least recently used first out
pub struct LruBound {
    order: LruCache<PreviewKey, ()>,
}

impl LruBound {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            order: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.order.cap().get()
    }
}

impl EvictionPolicy for LruBound {
    fn on_ready(&mut self, key: &PreviewKey) -> Vec<PreviewKey> {
        match self.order.push(key.clone(), ()) {
            Some((evicted, ())) if evicted != *key => vec![evicted],
            _ => Vec::new(),
        }
    }

    fn touch(&mut self, key: &PreviewKey) {
        self.order.promote(key);
    }
}

/// Single source of truth for preview state
pub struct PreviewStore {
    small: HashMap<PreviewKey, Arc<Bitmap>>,
    large: HashMap<PreviewKey, Arc<Bitmap>>,
    in_flight: HashSet<PreviewKey>,
    errors: HashMap<PreviewKey, String>,
    policy: Box<dyn EvictionPolicy>,
}

impl Default for PreviewStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl PreviewStore {
    /// Store that never evicts
    #[must_use]
    pub fn unbounded() -> Self {
        Self::with_policy(Box::new(Unbounded))
    }

    /// Store holding at most `capacity` ready previews
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self::with_policy(Box::new(LruBound::new(capacity)))
    }

    #[must_use]
    pub fn with_policy(policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            small: HashMap::new(),
            large: HashMap::new(),
            in_flight: HashSet::new(),
            errors: HashMap::new(),
            policy,
        }
    }

    /// Current state of a key
    #[must_use]
    pub fn get(&self, key: &PreviewKey) -> PreviewState {
        if self.in_flight.contains(key) {
            return PreviewState::Pending;
        }
        if let Some(message) = self.errors.get(key) {
            return PreviewState::Failed {
                message: message.clone(),
            };
        }
        match (self.small.get(key), self.large.get(key)) {
            (Some(small), Some(large)) => PreviewState::Ready {
                small: Arc::clone(small),
                large: Arc::clone(large),
            },
            _ => PreviewState::Idle,
        }
    }

    /// Record that a render for `key` is in flight
    pub fn mark_pending(&mut self, key: &PreviewKey) {
        self.errors.remove(key);
        self.in_flight.insert(key.clone());
    }

    /// Cache both bitmaps and supersede the in-flight marker
    pub fn set_ready(&mut self, key: &PreviewKey, small: Bitmap, large: Bitmap) {
        self.in_flight.remove(key);
        self.errors.remove(key);
        self.small.insert(key.clone(), Arc::new(small));
        self.large.insert(key.clone(), Arc::new(large));

        for evicted in self.policy.on_ready(key) {
            debug!("Evicting preview {evicted}");
            self.small.remove(&evicted);
            self.large.remove(&evicted);
        }
    }

    /// Record a failure and supersede the in-flight marker
    pub fn set_failed(&mut self, key: &PreviewKey, message: impl Into<String>) {
        self.in_flight.remove(key);
        self.small.remove(key);
        self.large.remove(key);
        self.errors.insert(key.clone(), message.into());
    }

    /// Drop the in-flight marker without a terminal result
    pub fn clear_pending(&mut self, key: &PreviewKey) {
        self.in_flight.remove(key);
    }

    /// Tell the eviction policy a ready key is still in use
    pub fn touch(&mut self, key: &PreviewKey) {
        if self.small.contains_key(key) {
            self.policy.touch(key);
        }
    }

    #[must_use]
    pub fn small_bitmap(&self, key: &PreviewKey) -> Option<Arc<Bitmap>> {
        if self.in_flight.contains(key) {
            return None;
        }
        self.small.get(key).cloned()
    }

    #[must_use]
    pub fn large_bitmap(&self, key: &PreviewKey) -> Option<Arc<Bitmap>> {
        if self.in_flight.contains(key) {
            return None;
        }
        self.large.get(key).cloned()
    }

    #[must_use]
    pub fn is_pending(&self, key: &PreviewKey) -> bool {
        self.in_flight.contains(key)
    }

    #[must_use]
    pub fn error(&self, key: &PreviewKey) -> Option<&str> {
        if self.in_flight.contains(key) {
            return None;
        }
        self.errors.get(key).map(String::as_str)
    }

    /// Number of keys currently rendering
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of ready previews
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.small.len()
    }

    /// Number of failed previews
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.errors.len()
    }
}
