use serde::{Deserialize, Serialize};

use crate::tracker::Tracker;

/// Archived trackers, most recently archived first. Stored order is the
/// only order; nothing here sorts or deduplicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct History(Vec<Tracker>);

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(trackers: Vec<Tracker>) -> Self {
        Self(trackers)
    }

    /// Prepends. Callers must not add the same tracker id twice.
    pub fn add(&mut self, tracker: Tracker) {
        self.0.insert(0, tracker);
    }

    /// Removes every entry with `id` and returns how many went away.
    pub fn remove(&mut self, id: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|tracker| tracker.id != id);
        before - self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tracker> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Tracker;
    type IntoIter = std::slice::Iter<'a, Tracker>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
