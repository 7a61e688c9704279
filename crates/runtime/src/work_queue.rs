//! Keyed priority queue for deferred work such as terrain tile builds.
//!
//! Ordering is `(priority, insertion sequence)`: smaller priorities run first
//! and equal priorities keep insertion order. Keys are unique, so re-queuing a
//! key only lowers its priority instead of duplicating the work.
//!
//! Vec-backed; queues here hold tens of entries per frame.

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WorkQueueFull {
    pub max_len: usize,
}

impl std::fmt::Display for WorkQueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "work queue full (max_len={})", self.max_len)
    }
}

impl std::error::Error for WorkQueueFull {}

#[derive(Debug)]
struct Entry<K, T> {
    key: K,
    priority: f64,
    id: WorkId,
    cost_units: u32,
    payload: T,
}

#[derive(Debug)]
pub struct WorkQueue<K, T> {
    next_id: u64,
    entries: Vec<Entry<K, T>>,
    max_len: Option<usize>,
}

impl<K, T> Default for WorkQueue<K, T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
            max_len: None,
        }
    }
}

impl<K: PartialEq, T> WorkQueue<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.iter().any(|e| e.key == *key)
    }

    /// Queues `payload` under `key`.
    ///
    /// An already-queued key keeps its payload and id; its priority becomes the
    /// smaller of the two.
    pub fn push(
        &mut self,
        key: K,
        priority: f64,
        cost_units: u32,
        payload: T,
    ) -> Result<WorkId, WorkQueueFull> {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.key == key) {
            existing.priority = existing.priority.min(priority);
            return Ok(existing.id);
        }
        if let Some(max_len) = self.max_len
            && self.entries.len() >= max_len
        {
            return Err(WorkQueueFull { max_len });
        }

        let id = WorkId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push(Entry {
            key,
            priority,
            id,
            cost_units,
            payload,
        });
        Ok(id)
    }

    pub fn cancel(&mut self, key: &K) -> Option<T> {
        let idx = self.entries.iter().position(|e| e.key == *key)?;
        Some(self.entries.remove(idx).payload)
    }

    /// Drops every entry the predicate rejects, e.g. tiles that left the view.
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.entries.retain(|e| keep(&e.key));
    }

    fn best_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.priority.total_cmp(&b.priority).then_with(|| a.id.cmp(&b.id))
            })
            .map(|(idx, _)| idx)
    }

    pub fn pop_next(&mut self) -> Option<(K, T)> {
        let idx = self.best_index()?;
        let entry = self.entries.remove(idx);
        Some((entry.key, entry.payload))
    }

    /// Pops the next entry only if `budget` covers its cost.
    ///
    /// An entry that is too expensive blocks the queue for this budget rather
    /// than letting cheaper, lower-priority work jump ahead.
    pub fn pop_next_with_budget(
        &mut self,
        budget: &mut crate::budget::FrameBudget,
    ) -> Option<(K, T)> {
        let idx = self.best_index()?;
        if !budget.try_consume(self.entries[idx].cost_units) {
            return None;
        }
        let entry = self.entries.remove(idx);
        Some((entry.key, entry.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::{WorkQueue, WorkQueueFull};
    use crate::budget::FrameBudget;

    #[test]
    fn nearest_runs_first_ties_in_insertion_order() {
        let mut q = WorkQueue::new();
        q.push("far", 900.0, 1, ()).unwrap();
        q.push("a", 10.0, 1, ()).unwrap();
        q.push("b", 10.0, 1, ()).unwrap();

        assert_eq!(q.pop_next().map(|(k, _)| k), Some("a"));
        assert_eq!(q.pop_next().map(|(k, _)| k), Some("b"));
        assert_eq!(q.pop_next().map(|(k, _)| k), Some("far"));
        assert!(q.pop_next().is_none());
    }

    #[test]
    fn requeue_keeps_one_entry_and_lowers_priority() {
        let mut q = WorkQueue::new();
        let first = q.push("tile", 50.0, 1, 1).unwrap();
        q.push("other", 20.0, 1, 2).unwrap();
        let again = q.push("tile", 5.0, 1, 3).unwrap();

        assert_eq!(first, again);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop_next(), Some(("tile", 1)));
    }

    #[test]
    fn retain_and_cancel_remove_entries() {
        let mut q = WorkQueue::new();
        q.push(1, 0.0, 1, "a").unwrap();
        q.push(2, 0.0, 1, "b").unwrap();
        q.push(3, 0.0, 1, "c").unwrap();
        q.retain(|k| *k != 2);
        assert_eq!(q.cancel(&3), Some("c"));
        assert!(!q.contains(&3));
        assert_eq!(q.pop_next(), Some((1, "a")));
        assert!(q.is_empty());
    }

    #[test]
    fn backpressure_rejects_when_full() {
        let mut q = WorkQueue::with_max_len(1);
        q.push("a", 0.0, 1, ()).unwrap();
        assert_eq!(q.push("b", 0.0, 1, ()), Err(WorkQueueFull { max_len: 1 }));
        // re-queuing a present key is not new work
        assert!(q.push("a", 0.0, 1, ()).is_ok());
    }

    #[test]
    fn nan_priority_sorts_last() {
        let mut q = WorkQueue::new();
        q.push("nan", f64::NAN, 1, ()).unwrap();
        q.push("near", -1.0, 1, ()).unwrap();
        assert_eq!(q.pop_next().map(|(k, _)| k), Some("near"));
        assert_eq!(q.pop_next().map(|(k, _)| k), Some("nan"));
    }

    #[test]
    fn expensive_head_blocks_budget() {
        let mut q = WorkQueue::new();
        q.push("expensive", 0.0, 2, ()).unwrap();
        q.push("cheap", 1.0, 1, ()).unwrap();

        let mut budget = FrameBudget::new(1);
        assert!(q.pop_next_with_budget(&mut budget).is_none());
        assert_eq!(q.len(), 2);

        let mut budget = FrameBudget::new(3);
        assert_eq!(q.pop_next_with_budget(&mut budget).map(|(k, _)| k), Some("expensive"));
        assert_eq!(q.pop_next_with_budget(&mut budget).map(|(k, _)| k), Some("cheap"));
        assert!(budget.is_exhausted());
    }
}
