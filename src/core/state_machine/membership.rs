//! Bucket storage: `state -> members` plus the reverse `member -> state` index.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

pub(super) struct Membership<S, T> {
    buckets: HashMap<S, HashSet<T>>,
    location: HashMap<T, S>,
}

impl<S, T> Membership<S, T>
where
    S: Copy + Eq + Hash + Ord,
    T: Clone + Eq + Hash,
{
    pub fn new(states: impl IntoIterator<Item = S>) -> Self {
        Self {
            buckets: states.into_iter().map(|s| (s, HashSet::new())).collect(),
            location: HashMap::new(),
        }
    }

    /// Move every object into `to`, removing it from whichever bucket held
    /// it. Cost is proportional to `objects`, not to the population.
    pub fn move_all(&mut self, objects: &[T], to: S) {
        for object in objects {
            match self.location.insert(object.clone(), to) {
                Some(from) if from == to => continue,
                Some(from) => {
                    if let Some(bucket) = self.buckets.get_mut(&from) {
                        bucket.remove(object);
                    }
                }
                None => {}
            }
            self.buckets.entry(to).or_default().insert(object.clone());
        }
    }

    pub fn snapshot(&self, state: S) -> HashSet<T> {
        self.buckets.get(&state).cloned().unwrap_or_default()
    }

    pub fn len(&self, state: S) -> usize {
        self.buckets.get(&state).map_or(0, HashSet::len)
    }

    pub fn counts(&self) -> BTreeMap<S, usize> {
        self.buckets.iter().map(|(s, b)| (*s, b.len())).collect()
    }

    pub fn state_of(&self, object: &T) -> Option<S> {
        self.location.get(object).copied()
    }

    pub fn total(&self) -> usize {
        self.location.len()
    }
}
