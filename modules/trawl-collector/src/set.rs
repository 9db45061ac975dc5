use std::collections::HashMap;

use trawl_common::{Artifact, CandidateItem, Fields};

/// One entry of a [`CollectedSet`]: the first sighting of a key.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedItem {
    pub key: String,
    pub payload: Fields,
    /// Captured on first sighting, if the viewport supports capture.
    pub artifact: Option<Artifact>,
    /// Zero-based index of the pass that discovered the key.
    pub discovered_in_pass: u32,
}

/// Discovery-ordered set of items keyed by natural key.
///
/// Grows monotonically; a key seen again keeps its first payload.
#[derive(Debug, Clone, Default)]
pub struct CollectedSet {
    items: Vec<CollectedItem>,
    index: HashMap<String, usize>,
}

impl CollectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&CollectedItem> {
        self.index.get(key).map(|&i| &self.items[i])
    }

    /// Insert a first sighting. Returns false (and changes nothing) when the
    /// key is already present.
    pub fn insert(
        &mut self,
        candidate: CandidateItem,
        artifact: Option<Artifact>,
        pass: u32,
    ) -> bool {
        if self.index.contains_key(&candidate.key) {
            return false;
        }
        self.index.insert(candidate.key.clone(), self.items.len());
        self.items.push(CollectedItem {
            key: candidate.key,
            payload: candidate.payload,
            artifact,
            discovered_in_pass: pass,
        });
        true
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectedItem> {
        self.items.iter()
    }

    pub fn into_items(self) -> Vec<CollectedItem> {
        self.items
    }
}

impl IntoIterator for CollectedSet {
    type Item = CollectedItem;
    type IntoIter = std::vec::IntoIter<CollectedItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Per-run scan progress. Drives termination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollState {
    pub passes_completed: u32,
    pub consecutive_empty_passes: u32,
}

impl ScrollState {
    /// Account for one finished pass that added `newly_added` keys.
    pub fn record_pass(&mut self, newly_added: usize) {
        self.passes_completed += 1;
        if newly_added > 0 {
            self.consecutive_empty_passes = 0;
        } else {
            self.consecutive_empty_passes += 1;
        }
    }
}
